//! Frame pretty-printer. The real protocol dissector is an external
//! collaborator this crate only calls into (`dissect(bytes, linktype, mode)`
//! per the purpose spec); what lives here is the print-mode-driven rendering
//! every loop needs regardless of which dissector is plugged in — hex/ascii
//! dumps and the one-line frame header banner.

use context::PrintMode;

/// Renders one frame according to `mode`. Returns `None` when the mode
/// suppresses output entirely (`None`, `Silent`).
pub fn render(payload: &[u8], mode: PrintMode) -> Option<String> {
    match mode {
        PrintMode::None | PrintMode::Silent => None,
        PrintMode::Less => Some(format!("{} bytes", payload.len())),
        PrintMode::Normal => Some(render_hex_ascii(payload)),
        PrintMode::Hex => Some(render_hex(payload)),
        PrintMode::Ascii => Some(render_ascii(payload)),
        PrintMode::HexAscii => Some(render_hex_ascii(payload)),
    }
}

fn render_hex(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len() * 3);
    for (i, b) in payload.iter().enumerate() {
        if i > 0 && i % 16 == 0 {
            out.push('\n');
        }
        out.push_str(&format!("{:02x} ", b));
    }
    out
}

fn render_ascii(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

fn render_hex_ascii(payload: &[u8]) -> String {
    let mut out = String::new();
    for chunk in payload.chunks(16) {
        let hex: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:<48}{}\n", hex, ascii));
    }
    out
}

/// One-line frame banner shown above the dissected body in `Normal` and
/// louder modes; mirrors `show_frame_hdr`'s timestamp/len/caplen summary.
pub fn frame_banner(sec: u32, nsec: u32, len: u32, caplen: u32) -> String {
    format!("[{}.{:09}] len {} caplen {}", sec, nsec, len, caplen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_modes_suppress_output() {
        assert!(render(&[1, 2, 3], PrintMode::None).is_none());
        assert!(render(&[1, 2, 3], PrintMode::Silent).is_none());
    }

    #[test]
    fn hex_ascii_combines_both_views() {
        let out = render(b"hi", PrintMode::HexAscii).unwrap();
        assert!(out.contains("68 69"));
        assert!(out.contains("hi"));
    }

    #[test]
    fn ascii_replaces_non_printable_with_dot() {
        let out = render(&[0x41, 0x00, 0x42], PrintMode::Ascii).unwrap();
        assert_eq!(out, "A.B");
    }

    #[test]
    fn banner_reports_both_lengths() {
        let b = frame_banner(10, 500, 128, 64);
        assert!(b.contains("len 128"));
        assert!(b.contains("caplen 64"));
    }
}
