use std::io;

use nix;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Error taxonomy for the capture/replay/forwarding engine.
///
/// Setup-time variants (`Config`, `NoDevice`, `PrivDrop`, and `Malformed` raised while
/// reading a file header) are fatal before any ring is mapped. `Io` raised inside the
/// hot loop is always fatal: a short write to a capture file can't be retried because
/// the file is positional. `Malformed` raised while reading a record ends the run the
/// same way end-of-file would.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "invalid configuration: {}", reason)]
    Config { reason: String },

    #[fail(display = "I/O error: {}", inner)]
    Io { inner: io::Error },

    #[fail(display = "malformed capture data: {}", reason)]
    Malformed { reason: String },

    #[fail(display = "unrecognized capture-file magic: {:#x}", magic)]
    Magic { magic: u32 },

    #[fail(display = "device unavailable: {}", reason)]
    NoDevice { reason: String },

    #[fail(display = "could not drop privileges: {}", reason)]
    PrivDrop { reason: String },

    #[fail(display = "fatal protocol violation: {}", reason)]
    Fatal { reason: String },
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::Io { inner }
    }
}

impl From<nix::Error> for Error {
    fn from(inner: nix::Error) -> Self {
        Error::Io {
            inner: io::Error::from(inner),
        }
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(inner: std::ffi::NulError) -> Self {
        Error::Config {
            reason: format!("interface name contains a NUL byte: {}", inner),
        }
    }
}
