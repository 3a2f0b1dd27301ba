use std::io;
use std::path::PathBuf;

/// Failures moving reports between a host and a device node.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device node could not be created.
    #[error("cannot create device node {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    /// No device is listening at the node.
    #[error("cannot attach to device node {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    /// A host attach attempt failed.
    #[error("host attach failed: {0}")]
    Accept(io::Error),

    /// The report stream failed.
    #[error("report stream error: {0}")]
    Io(#[from] io::Error),

    #[error("device node path is {len} bytes, limit is {max}: {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// The underlying I/O error, with path context folded into the message.
    pub fn into_io(self) -> io::Error {
        match self {
            TransportError::Accept(source) | TransportError::Io(source) => source,
            TransportError::Bind { ref path, ref source }
            | TransportError::Connect { ref path, ref source } => {
                io::Error::new(source.kind(), format!("{}: {source}", path.display()))
            }
            TransportError::PathTooLong { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, self.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
