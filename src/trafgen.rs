//! File→file translation output: renders each capture record as a
//! trafgen-style byte-array block, ten hex bytes per line.

use std::io::{self, Write};

/// Writes one `{\n  0x.., 0x.., ...\n}\n\n` block for `payload`.
pub fn write_block<W: Write>(mut w: W, payload: &[u8]) -> io::Result<()> {
    writeln!(w, "{{")?;
    for chunk in payload.chunks(10) {
        let line: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
        writeln!(w, "  {},", line.join(", "))?;
    }
    writeln!(w, "}}")?;
    writeln!(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_ten_bytes_per_line() {
        let payload: Vec<u8> = (0..25).collect();
        let mut out = Vec::new();
        write_block(&mut out, &payload).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| l.starts_with("  0x")).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].matches("0x").count(), 10);
        assert_eq!(lines[2].matches("0x").count(), 5);
    }

    #[test]
    fn block_is_braced_and_blank_line_terminated() {
        let mut out = Vec::new();
        write_block(&mut out, &[0xab]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("{\n"));
        assert!(text.contains("0xab"));
        assert!(text.ends_with("}\n\n"));
    }
}
