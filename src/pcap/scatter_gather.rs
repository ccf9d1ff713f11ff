//! Vectored-I/O backend: batches reads/writes across a fixed pool of aligned
//! buffers and amortizes the `readv`/`writev` syscall cost. Grounded on the
//! original's `pcap_sg.c`, generalized to a safe owned-buffer pool instead of
//! a single process-wide static `iovec[1024]`.

use std::fs::File;
use std::os::unix::io::{AsRawFd, RawFd};

use nix::sys::uio::{readv, writev, IoVec};

use context::Magic;
use error::{Error, Result};

use super::{CaptureBackend, FrameMeta, GlobalHeader, GLOBAL_HEADER_SIZE};

const POOL_SIZE: usize = 1024;

pub struct ScatterGatherBackend {
    file: File,
    bufs: Vec<Vec<u8>>,
    buf_len: usize,
    /// Bytes actually containing valid data in each buffer, for reads.
    filled: Vec<usize>,
    /// Bytes queued for the next `writev`, for writes.
    queued: Vec<usize>,
    slot: usize,
    off_rd: usize,
    primed: bool,
}

impl ScatterGatherBackend {
    pub fn new(file: File, jumbo: bool) -> ScatterGatherBackend {
        let buf_len = if jumbo {
            16 * page_size::get()
        } else {
            3 * page_size::get()
        };
        ScatterGatherBackend {
            file,
            bufs: (0..POOL_SIZE).map(|_| vec![0u8; buf_len]).collect(),
            buf_len,
            filled: vec![0; POOL_SIZE],
            queued: vec![0; POOL_SIZE],
            slot: 0,
            off_rd: 0,
            primed: false,
        }
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn refill(&mut self) -> Result<()> {
        let fd = self.fd();
        let mut iov: Vec<IoVec<&mut [u8]>> = self.bufs.iter_mut().map(|b| IoVec::from_mut_slice(b)).collect();
        let n = readv(fd, &mut iov)?;
        let mut remaining = n;
        for filled in self.filled.iter_mut() {
            let take = remaining.min(self.buf_len);
            *filled = take;
            remaining -= take;
        }
        self.slot = 0;
        self.off_rd = 0;
        self.primed = true;
        Ok(())
    }

    /// Reads exactly `need` bytes out of the pool into `dst`, crossing at most
    /// the buffers necessary, refilling the pool when the cursor wraps.
    fn take(&mut self, dst: &mut [u8]) -> Result<bool> {
        let need = dst.len();
        let mut got = 0;
        while got < need {
            let avail = self.filled[self.slot].saturating_sub(self.off_rd);
            if avail == 0 {
                // Nothing left in this buffer; either EOF or boundary crossing.
                if self.filled[self.slot] < self.buf_len {
                    return Ok(false); // short read from the kernel: clean EOF.
                }
                self.slot += 1;
                self.off_rd = 0;
                if self.slot == POOL_SIZE {
                    self.refill()?;
                }
                continue;
            }
            let take = avail.min(need - got);
            dst[got..got + take]
                .copy_from_slice(&self.bufs[self.slot][self.off_rd..self.off_rd + take]);
            self.off_rd += take;
            got += take;
        }
        Ok(true)
    }
}

impl CaptureBackend for ScatterGatherBackend {
    fn read_global_header(&mut self) -> Result<GlobalHeader> {
        if !self.primed {
            self.refill()?;
        }
        let mut buf = [0u8; GLOBAL_HEADER_SIZE];
        if !self.take(&mut buf)? {
            return Err(Error::Malformed {
                reason: "short global header".into(),
            });
        }
        GlobalHeader::from_bytes(&buf)
    }

    fn write_global_header(&mut self, hdr: &GlobalHeader) -> Result<()> {
        use std::io::Write;
        self.file.write_all(&hdr.to_bytes())?;
        Ok(())
    }

    fn read_record(&mut self, magic: Magic, buf: &mut [u8]) -> Result<Option<(FrameMeta, usize)>> {
        if !self.primed {
            self.refill()?;
        }
        let hdr_size = FrameMeta::hdr_size(magic);
        let mut hdr_buf = vec![0u8; hdr_size];
        if !self.take(&mut hdr_buf)? {
            return Ok(None);
        }
        let meta = FrameMeta::from_bytes(magic, &hdr_buf)?;
        if meta.caplen == 0 || meta.caplen as usize > buf.len() {
            return Err(Error::Malformed {
                reason: format!("caplen {} out of bounds", meta.caplen),
            });
        }
        if !self.take(&mut buf[..meta.caplen as usize])? {
            return Err(Error::Malformed {
                reason: "truncated record payload".into(),
            });
        }
        Ok(Some((meta, meta.caplen as usize)))
    }

    fn write_record(&mut self, magic: Magic, meta: &FrameMeta, payload: &[u8]) -> Result<()> {
        if self.slot == POOL_SIZE {
            self.flush_queued()?;
        }
        let hdr_bytes = meta.to_bytes(magic);
        let rec_len = hdr_bytes.len() + payload.len();
        if rec_len > self.buf_len {
            return Err(Error::Fatal {
                reason: format!("record of {} bytes exceeds sg buffer capacity {}", rec_len, self.buf_len),
            });
        }
        let buf = &mut self.bufs[self.slot];
        buf[..hdr_bytes.len()].copy_from_slice(&hdr_bytes);
        buf[hdr_bytes.len()..rec_len].copy_from_slice(payload);
        self.queued[self.slot] = rec_len;
        self.slot += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_queued()?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl ScatterGatherBackend {
    fn flush_queued(&mut self) -> Result<()> {
        if self.slot == 0 {
            return Ok(());
        }
        let fd = self.fd();
        let iov: Vec<IoVec<&[u8]>> = self.bufs[..self.slot]
            .iter()
            .zip(self.queued[..self.slot].iter())
            .map(|(b, &len)| IoVec::from_slice(&b[..len]))
            .collect();
        writev(fd, &iov)?;
        self.slot = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::Magic;
    use std::io::Seek;

    fn meta(caplen: u32) -> FrameMeta {
        FrameMeta {
            sec: 1,
            subsec: 0,
            caplen,
            len: caplen,
            ifindex: 0,
            protocol: 0,
            pkt_type: 0,
            cpu: 0,
            tsc: 0,
        }
    }

    #[test]
    fn write_then_read_back_small_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sg.pcap");

        {
            let f = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .unwrap();
            let mut backend = ScatterGatherBackend::new(f, false);
            backend
                .write_global_header(&GlobalHeader::new(Magic::Default, 65535, 1))
                .unwrap();
            for i in 0..5u8 {
                backend
                    .write_record(Magic::Default, &meta(4), &[i; 4])
                    .unwrap();
            }
            backend.flush().unwrap();
        }

        let mut f = std::fs::File::open(&path).unwrap();
        f.seek(std::io::SeekFrom::Start(0)).unwrap();
        let mut backend = ScatterGatherBackend::new(f, false);
        let hdr = backend.read_global_header().unwrap();
        assert_eq!(hdr.snaplen, 65535);

        let mut buf = [0u8; 128];
        for i in 0..5u8 {
            let (_meta, n) = backend.read_record(Magic::Default, &mut buf).unwrap().unwrap();
            assert_eq!(n, 4);
            assert_eq!(&buf[..4], &[i; 4]);
        }
        assert!(backend.read_record(Magic::Default, &mut buf).unwrap().is_none());
    }

    #[test]
    fn record_exceeding_buffer_capacity_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sg.pcap");
        let f = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        let mut backend = ScatterGatherBackend::new(f, false);
        let huge = vec![0u8; backend.buf_len + 1];
        assert!(backend.write_record(Magic::Default, &meta(huge.len() as u32), &huge).is_err());
    }
}
