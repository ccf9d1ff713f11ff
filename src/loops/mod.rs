//! Component G: the four setup → run → teardown loops the dispatcher chooses
//! between. Each submodule owns exactly one of the shapes from the mode
//! table; this module holds what all four share: backend construction,
//! `poll`-based suspension, and the stop-flag check.

pub mod bridge;
pub mod file_to_tx;
pub mod file_to_txt;
pub mod rx_to_file;

use std::fs::{File, OpenOptions};
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::Path;

use context::{Backend, Endpoint};
use error::{Error, Result};
use pcap::{BufferedBackend, CaptureBackend, MappedBackend, ScatterGatherBackend};

pub fn open_backend_for_write(path: &Path, backend: Backend, jumbo: bool) -> Result<Box<dyn CaptureBackend>> {
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    open_backend(file, backend, jumbo, true)
}

pub fn open_backend_for_read(path: &Path, backend: Backend, jumbo: bool) -> Result<Box<dyn CaptureBackend>> {
    let file = OpenOptions::new().read(true).open(path)?;
    open_backend(file, backend, jumbo, false)
}

/// Resolves a file-shaped endpoint (path or stdio) into an open `File` for
/// writing, without going through a real path for the `"-"` sentinel.
pub fn file_for_endpoint_write(e: &Endpoint) -> Result<File> {
    match e {
        Endpoint::Stdio => Ok(unsafe { File::from_raw_fd(libc::STDOUT_FILENO) }),
        Endpoint::Path(p) => Ok(OpenOptions::new().create(true).write(true).truncate(true).open(p)?),
        other => Err(Error::Config {
            reason: format!("endpoint {:?} is not a file target", other),
        }),
    }
}

pub fn file_for_endpoint_read(e: &Endpoint) -> Result<File> {
    match e {
        Endpoint::Stdio => Ok(unsafe { File::from_raw_fd(libc::STDIN_FILENO) }),
        Endpoint::Path(p) => Ok(OpenOptions::new().read(true).open(p)?),
        other => Err(Error::Config {
            reason: format!("endpoint {:?} is not a file source", other),
        }),
    }
}

pub fn backend_for_file(file: File, backend: Backend, jumbo: bool, write: bool) -> Result<Box<dyn CaptureBackend>> {
    open_backend(file, backend, jumbo, write)
}

fn open_backend(file: File, backend: Backend, jumbo: bool, write: bool) -> Result<Box<dyn CaptureBackend>> {
    Ok(match backend {
        Backend::Buffered => Box::new(BufferedBackend::new(file)),
        Backend::ScatterGather => Box::new(ScatterGatherBackend::new(file, jumbo)),
        Backend::Mapped => {
            if write {
                Box::new(MappedBackend::open_write(file)?)
            } else {
                Box::new(MappedBackend::open_read(file)?)
            }
        }
    })
}

/// Blocks until `fd` is readable or a signal interrupts the call (the stop
/// flag and the rotate/flush handlers are both observed on return). This is
/// the single suspension point every RX-driven loop uses.
pub fn wait_readable(fd: RawFd) -> Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, -1) };
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(());
        }
        return Err(Error::Io { inner: err });
    }
    Ok(())
}
