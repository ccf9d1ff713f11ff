//! Straightforward read/write-syscall backend; no batching, no mapping.

use std::fs::File;
use std::io::{Read, Write};

use context::Magic;
use error::{Error, Result};

use super::{CaptureBackend, FrameMeta, GlobalHeader, GLOBAL_HEADER_SIZE};

pub struct BufferedBackend {
    file: File,
}

impl BufferedBackend {
    pub fn new(file: File) -> BufferedBackend {
        BufferedBackend { file }
    }
}

impl CaptureBackend for BufferedBackend {
    fn read_global_header(&mut self) -> Result<GlobalHeader> {
        let mut buf = [0u8; GLOBAL_HEADER_SIZE];
        self.file.read_exact(&mut buf)?;
        GlobalHeader::from_bytes(&buf)
    }

    fn write_global_header(&mut self, hdr: &GlobalHeader) -> Result<()> {
        self.file.write_all(&hdr.to_bytes())?;
        Ok(())
    }

    fn read_record(&mut self, magic: Magic, buf: &mut [u8]) -> Result<Option<(FrameMeta, usize)>> {
        let hdr_size = FrameMeta::hdr_size(magic);
        let mut hdr_buf = vec![0u8; hdr_size];
        match self.file.read(&mut hdr_buf)? {
            0 => return Ok(None),
            n if n < hdr_size => {
                return Err(Error::Malformed {
                    reason: "truncated record header".into(),
                })
            }
            _ => {}
        }
        let meta = FrameMeta::from_bytes(magic, &hdr_buf)?;
        if meta.caplen == 0 || meta.caplen as usize > buf.len() {
            return Err(Error::Malformed {
                reason: format!("caplen {} out of bounds", meta.caplen),
            });
        }
        self.file.read_exact(&mut buf[..meta.caplen as usize])?;
        Ok(Some((meta, meta.caplen as usize)))
    }

    fn write_record(&mut self, magic: Magic, meta: &FrameMeta, payload: &[u8]) -> Result<()> {
        self.file.write_all(&meta.to_bytes(magic))?;
        self.file.write_all(payload)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::Magic;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pcap");

        let meta = FrameMeta {
            sec: 10,
            subsec: 20,
            caplen: 4,
            len: 4,
            ifindex: 0,
            protocol: 0,
            pkt_type: 0,
            cpu: 0,
            tsc: 0,
        };

        {
            let f = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .unwrap();
            let mut backend = BufferedBackend::new(f);
            backend
                .write_global_header(&GlobalHeader::new(Magic::Default, 65535, 1))
                .unwrap();
            backend.write_record(Magic::Default, &meta, &[1, 2, 3, 4]).unwrap();
            backend.flush().unwrap();
        }

        {
            let f = std::fs::File::open(&path).unwrap();
            let mut backend = BufferedBackend::new(f);
            let hdr = backend.read_global_header().unwrap();
            assert_eq!(hdr.snaplen, 65535);

            let mut buf = [0u8; 128];
            let (got_meta, n) = backend.read_record(Magic::Default, &mut buf).unwrap().unwrap();
            assert_eq!(n, 4);
            assert_eq!(&buf[..4], &[1, 2, 3, 4]);
            assert_eq!(got_meta.sec, 10);

            assert!(backend.read_record(Magic::Default, &mut buf).unwrap().is_none());
        }
    }
}
