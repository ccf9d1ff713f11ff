//! Memory-mapped backend: the file is extended in large steps and mapped
//! directly, so reads and writes touch the mapping rather than going through
//! `read`/`write` syscalls. Not usable against a stream — [`crate::dispatch`]
//! downgrades to scatter/gather whenever an endpoint is stdin/stdout.

use std::fs::File;

use memmap2::{Mmap, MmapMut};

use context::Magic;
use error::Result;

use super::{CaptureBackend, FrameMeta, GlobalHeader, GLOBAL_HEADER_SIZE};

const GROW_STEP: u64 = 64 * 1024 * 1024;

enum Map {
    ReadOnly(Mmap),
    Writable(MmapMut),
}

impl Map {
    fn as_slice(&self) -> &[u8] {
        match self {
            Map::ReadOnly(m) => &m[..],
            Map::Writable(m) => &m[..],
        }
    }
}

pub struct MappedBackend {
    file: File,
    map: Map,
    /// Logical end-of-data offset; for write mode this lags the mapping's
    /// capacity (which is grown ahead in `GROW_STEP` chunks).
    pos: u64,
    writable: bool,
}

impl MappedBackend {
    pub fn open_read(file: File) -> Result<MappedBackend> {
        let map = unsafe { Mmap::map(&file)? };
        Ok(MappedBackend {
            file,
            map: Map::ReadOnly(map),
            pos: 0,
            writable: false,
        })
    }

    pub fn open_write(file: File) -> Result<MappedBackend> {
        file.set_len(GROW_STEP)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(MappedBackend {
            file,
            map: Map::Writable(map),
            pos: 0,
            writable: true,
        })
    }

    fn ensure_capacity(&mut self, extra: u64) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        let cap = self.map.as_slice().len() as u64;
        if self.pos + extra > cap {
            let new_len = cap + ((self.pos + extra - cap) / GROW_STEP + 1) * GROW_STEP;
            self.file.set_len(new_len)?;
            self.map = Map::Writable(unsafe { MmapMut::map_mut(&self.file)? });
        }
        Ok(())
    }

    fn write_at(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_capacity(bytes.len() as u64)?;
        if let Map::Writable(m) = &mut self.map {
            let start = self.pos as usize;
            m[start..start + bytes.len()].copy_from_slice(bytes);
        }
        self.pos += bytes.len() as u64;
        Ok(())
    }
}

impl CaptureBackend for MappedBackend {
    fn read_global_header(&mut self) -> Result<GlobalHeader> {
        let slice = self.map.as_slice();
        let hdr = GlobalHeader::from_bytes(&slice[..GLOBAL_HEADER_SIZE])?;
        self.pos = GLOBAL_HEADER_SIZE as u64;
        Ok(hdr)
    }

    fn write_global_header(&mut self, hdr: &GlobalHeader) -> Result<()> {
        self.write_at(&hdr.to_bytes())
    }

    fn read_record(&mut self, magic: Magic, buf: &mut [u8]) -> Result<Option<(FrameMeta, usize)>> {
        let hdr_size = FrameMeta::hdr_size(magic);
        let slice = self.map.as_slice();
        let start = self.pos as usize;
        if start + hdr_size > slice.len() {
            return Ok(None);
        }
        let meta = FrameMeta::from_bytes(magic, &slice[start..start + hdr_size])?;
        if meta.caplen == 0 {
            return Ok(None);
        }
        let data_start = start + hdr_size;
        let data_end = data_start + meta.caplen as usize;
        if meta.caplen as usize > buf.len() || data_end > slice.len() {
            return Err(::error::Error::Malformed {
                reason: format!("caplen {} out of bounds", meta.caplen),
            });
        }
        buf[..meta.caplen as usize].copy_from_slice(&slice[data_start..data_end]);
        self.pos = data_end as u64;
        Ok(Some((meta, meta.caplen as usize)))
    }

    fn write_record(&mut self, magic: Magic, meta: &FrameMeta, payload: &[u8]) -> Result<()> {
        self.write_at(&meta.to_bytes(magic))?;
        self.write_at(payload)
    }

    fn flush(&mut self) -> Result<()> {
        if self.writable {
            // Trim the trailing grow-ahead padding before syncing.
            self.file.set_len(self.pos)?;
            if let Map::Writable(m) = &self.map {
                m.flush()?;
            }
        }
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
        let path = dir.path().join("mapped.pcap");

        {
            let f = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .unwrap();
            let mut backend = MappedBackend::open_write(f).unwrap();
            backend
                .write_global_header(&GlobalHeader::new(Magic::Default, 65535, 1))
                .unwrap();
            let meta = FrameMeta {
                sec: 5,
                subsec: 0,
                caplen: 3,
                len: 3,
                ifindex: 0,
                protocol: 0,
                pkt_type: 0,
                cpu: 0,
                tsc: 0,
            };
            backend.write_record(Magic::Default, &meta, &[9, 8, 7]).unwrap();
            backend.flush().unwrap();
        }

        let f = std::fs::File::open(&path).unwrap();
        let mut backend = MappedBackend::open_read(f).unwrap();
        let hdr = backend.read_global_header().unwrap();
        assert_eq!(hdr.snaplen, 65535);
        let mut buf = [0u8; 16];
        let (meta, n) = backend.read_record(Magic::Default, &mut buf).unwrap().unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[9, 8, 7]);
        assert_eq!(meta.sec, 5);
        assert!(backend.read_record(Magic::Default, &mut buf).unwrap().is_none());
    }
}
