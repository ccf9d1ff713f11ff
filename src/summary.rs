//! Per-run counters, printed once at teardown (`netsniff-ng.c`'s closing
//! `printf("%12lu packets...")` block), kept as plain data here so tests can
//! assert on it without scraping stdout.

use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub packets_seen: u64,
    pub packets_dropped: u64,
    pub bytes: u64,
    pub truncated: u64,
}

impl Summary {
    pub fn new() -> Summary {
        Summary::default()
    }

    pub fn record_frame(&mut self, caplen: u32) {
        self.packets_seen += 1;
        self.bytes += caplen as u64;
    }

    pub fn record_drop(&mut self) {
        self.packets_dropped += 1;
    }

    pub fn record_truncated(&mut self) {
        self.truncated += 1;
    }

    pub fn render(&self, elapsed: Duration) -> String {
        format!("{}", SummaryReport { s: *self, elapsed })
    }
}

struct SummaryReport {
    s: Summary,
    elapsed: Duration,
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{:12} packets seen", self.s.packets_seen)?;
        writeln!(f, "{:12} packets dropped", self.s.packets_dropped)?;
        writeln!(f, "{:12} packets truncated", self.s.truncated)?;
        writeln!(f, "{:12} bytes total", self.s.bytes)?;
        write!(
            f,
            "{:12} sec, {} usec in total",
            self.elapsed.as_secs(),
            self.elapsed.subsec_micros()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut s = Summary::new();
        s.record_frame(64);
        s.record_frame(128);
        s.record_drop();
        s.record_truncated();
        assert_eq!(s.packets_seen, 2);
        assert_eq!(s.bytes, 192);
        assert_eq!(s.packets_dropped, 1);
        assert_eq!(s.truncated, 1);
    }

    #[test]
    fn render_includes_all_fields() {
        let mut s = Summary::new();
        s.record_frame(10);
        let text = s.render(Duration::from_millis(1500));
        assert!(text.contains("packets seen"));
        assert!(text.contains("bytes total"));
        assert!(text.contains("1 sec"));
    }
}
