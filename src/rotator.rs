//! Component D: capture-file rotation. Only instantiated when the output
//! endpoint is a directory and dumping is active.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use context::DumpMode;
use timer;

/// Tracks the two rotation triggers (time-interval, byte-interval) and
/// names the next file when one fires.
pub struct Rotator {
    dir: PathBuf,
    prefix: String,
    mode: DumpMode,
    bytes_since_rotation: u64,
}

impl Rotator {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, mode: DumpMode) -> Rotator {
        Rotator {
            dir: dir.into(),
            prefix: prefix.into(),
            mode,
            bytes_since_rotation: 0,
        }
    }

    /// Arms the rotate timer for time-interval mode; a no-op under size mode,
    /// which has no timer and is driven entirely by `on_record_written`.
    /// Callers must install the signal handlers (`timer::install_signal_handlers`)
    /// before calling this — arming alone does not bind SIGALRM.
    pub fn arm(&self) -> ::error::Result<()> {
        if let DumpMode::Interval { seconds } = self.mode {
            timer::arm_interval(Duration::from_secs(seconds))?;
        }
        Ok(())
    }

    /// Call after every accepted record is written; under size mode this is
    /// what actually decides when to rotate.
    pub fn on_record_written(&mut self, caplen: u32) -> bool {
        if let DumpMode::Size { bytes } = self.mode {
            self.bytes_since_rotation += caplen as u64;
            if self.bytes_since_rotation >= bytes {
                self.bytes_since_rotation = 0;
                return true;
            }
        }
        false
    }

    /// Whether the timer-driven rotate flag fired since it was last consumed.
    pub fn timer_due(&self) -> bool {
        matches!(self.mode, DumpMode::Interval { .. }) && timer::take_rotate_due()
    }

    /// Computes the next file's path: `<dir>/<prefix><unix-epoch-seconds>.pcap`.
    /// Named at the moment of rotation, never upfront, so two rotations in the
    /// same process never collide on a stale timestamp.
    pub fn next_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.dir.join(format!("{}{}.pcap", self.prefix, secs))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mode_triggers_once_threshold_crossed() {
        let mut r = Rotator::new("/tmp", "dump-", DumpMode::Size { bytes: 100 });
        assert!(!r.on_record_written(60));
        assert!(r.on_record_written(60));
        // counter reset after rotation.
        assert!(!r.on_record_written(10));
    }

    #[test]
    fn interval_mode_never_triggers_from_record_counting() {
        let mut r = Rotator::new("/tmp", "dump-", DumpMode::Interval { seconds: 30 });
        for _ in 0..1000 {
            assert!(!r.on_record_written(9000));
        }
    }

    #[test]
    fn next_path_uses_prefix_and_dir() {
        let r = Rotator::new("/var/log/caps", "eth0-", DumpMode::Size { bytes: 1 });
        let p = r.next_path();
        assert!(p.starts_with("/var/log/caps"));
        assert!(p.file_name().unwrap().to_str().unwrap().starts_with("eth0-"));
        assert!(p.extension().unwrap() == "pcap");
    }
}
