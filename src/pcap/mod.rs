//! Component B: the capture-file codec. One interface (`read_hdr`, `write_hdr`,
//! `read_record`, `write_record`, `flush`) backed by three strategies —
//! buffered, memory-mapped, and scatter/gather — chosen by [`crate::dispatch`].

pub mod buffered;
pub mod mapped;
pub mod scatter_gather;

use context::Magic;
use error::{Error, Result};

pub use self::buffered::BufferedBackend;
pub use self::mapped::MappedBackend;
pub use self::scatter_gather::ScatterGatherBackend;

/// Fixed 24-byte capture-file global header. The magic pins both byte order
/// and which [`RecordHeader`] flavor follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub linktype: u32,
}

pub const GLOBAL_HEADER_SIZE: usize = 24;

impl GlobalHeader {
    pub fn new(magic: Magic, snaplen: u32, linktype: u32) -> GlobalHeader {
        GlobalHeader {
            magic: magic.as_magic(),
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen,
            linktype,
        }
    }

    pub fn to_bytes(&self) -> [u8; GLOBAL_HEADER_SIZE] {
        let mut out = [0u8; GLOBAL_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_ne_bytes());
        out[4..6].copy_from_slice(&self.version_major.to_ne_bytes());
        out[6..8].copy_from_slice(&self.version_minor.to_ne_bytes());
        out[8..12].copy_from_slice(&self.thiszone.to_ne_bytes());
        out[12..16].copy_from_slice(&self.sigfigs.to_ne_bytes());
        out[16..20].copy_from_slice(&self.snaplen.to_ne_bytes());
        out[20..24].copy_from_slice(&self.linktype.to_ne_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<GlobalHeader> {
        if buf.len() < GLOBAL_HEADER_SIZE {
            return Err(Error::Malformed {
                reason: "short global header".into(),
            });
        }
        let magic = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        // Validate the magic even though the caller may re-derive `Magic` from
        // it separately; an unknown magic must fail fast at setup.
        Magic::from_magic(magic)?;
        Ok(GlobalHeader {
            magic,
            version_major: u16::from_ne_bytes([buf[4], buf[5]]),
            version_minor: u16::from_ne_bytes([buf[6], buf[7]]),
            thiszone: i32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            sigfigs: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
            snaplen: u32::from_ne_bytes([buf[16], buf[17], buf[18], buf[19]]),
            linktype: u32::from_ne_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }
}

/// Canonical per-record metadata, independent of on-disk flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMeta {
    pub sec: u32,
    pub subsec: u32,
    pub caplen: u32,
    pub len: u32,
    pub ifindex: u32,
    pub protocol: u16,
    pub pkt_type: u8,
    pub cpu: u8,
    pub tsc: u64,
}

impl FrameMeta {
    pub fn hdr_size(magic: Magic) -> usize {
        match magic {
            Magic::Default | Magic::Nsec => 16,
            Magic::Kuznetzov => 24,
            Magic::Borkmann => 32,
        }
    }

    pub fn to_bytes(&self, magic: Magic) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::hdr_size(magic));
        out.extend_from_slice(&self.sec.to_ne_bytes());
        out.extend_from_slice(&self.subsec.to_ne_bytes());
        out.extend_from_slice(&self.caplen.to_ne_bytes());
        out.extend_from_slice(&self.len.to_ne_bytes());
        if matches!(magic, Magic::Kuznetzov | Magic::Borkmann) {
            out.extend_from_slice(&self.ifindex.to_ne_bytes());
            out.extend_from_slice(&self.protocol.to_ne_bytes());
            out.push(self.pkt_type);
            out.push(self.cpu);
        }
        if matches!(magic, Magic::Borkmann) {
            out.extend_from_slice(&self.tsc.to_ne_bytes());
        }
        out
    }

    pub fn from_bytes(magic: Magic, buf: &[u8]) -> Result<FrameMeta> {
        let need = Self::hdr_size(magic);
        if buf.len() < need {
            return Err(Error::Malformed {
                reason: "short record header".into(),
            });
        }
        let sec = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let subsec = u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let caplen = u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let len = u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let mut meta = FrameMeta {
            sec,
            subsec,
            caplen,
            len,
            ifindex: 0,
            protocol: 0,
            pkt_type: 0,
            cpu: 0,
            tsc: 0,
        };
        if matches!(magic, Magic::Kuznetzov | Magic::Borkmann) {
            meta.ifindex = u32::from_ne_bytes([buf[16], buf[17], buf[18], buf[19]]);
            meta.protocol = u16::from_ne_bytes([buf[20], buf[21]]);
            meta.pkt_type = buf[22];
            meta.cpu = buf[23];
        }
        if matches!(magic, Magic::Borkmann) {
            meta.tsc = u64::from_ne_bytes([
                buf[24], buf[25], buf[26], buf[27], buf[28], buf[29], buf[30], buf[31],
            ]);
        }
        Ok(meta)
    }
}

/// The operations every capture-file I/O strategy implements. Matches the
/// original's `pcap_file_ops` function-pointer table, expressed as a trait.
pub trait CaptureBackend {
    fn read_global_header(&mut self) -> Result<GlobalHeader>;
    fn write_global_header(&mut self, hdr: &GlobalHeader) -> Result<()>;

    /// Reads one record into `buf`. `Ok(None)` means clean end-of-file.
    fn read_record(&mut self, magic: Magic, buf: &mut [u8]) -> Result<Option<(FrameMeta, usize)>>;

    fn write_record(&mut self, magic: Magic, meta: &FrameMeta, payload: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_header_round_trips() {
        let hdr = GlobalHeader::new(Magic::Default, 65535, 1);
        let bytes = hdr.to_bytes();
        assert_eq!(bytes.len(), GLOBAL_HEADER_SIZE);
        let back = GlobalHeader::from_bytes(&bytes).unwrap();
        assert_eq!(hdr, back);
    }

    #[test]
    fn frame_meta_round_trips_all_flavors() {
        for magic in [Magic::Default, Magic::Nsec, Magic::Kuznetzov, Magic::Borkmann] {
            let meta = FrameMeta {
                sec: 1,
                subsec: 2,
                caplen: 64,
                len: 128,
                ifindex: 3,
                protocol: 0x0800,
                pkt_type: 1,
                cpu: 0,
                tsc: 0xdead_beef,
            };
            let bytes = meta.to_bytes(magic);
            assert_eq!(bytes.len(), FrameMeta::hdr_size(magic));
            let back = FrameMeta::from_bytes(magic, &bytes).unwrap();
            assert_eq!(back.sec, meta.sec);
            assert_eq!(back.caplen, meta.caplen);
            assert_eq!(back.len, meta.len);
            if matches!(magic, Magic::Kuznetzov | Magic::Borkmann) {
                assert_eq!(back.ifindex, meta.ifindex);
                assert_eq!(back.protocol, meta.protocol);
            }
            if matches!(magic, Magic::Borkmann) {
                assert_eq!(back.tsc, meta.tsc);
            }
        }
    }

    #[test]
    fn unknown_magic_global_header_is_rejected() {
        let mut hdr = GlobalHeader::new(Magic::Default, 1, 1).to_bytes();
        hdr[0..4].copy_from_slice(&0xdead_beefu32.to_ne_bytes());
        assert!(GlobalHeader::from_bytes(&hdr).is_err());
    }
}
