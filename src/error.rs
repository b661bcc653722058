use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

use serde_json::Error as JsonError;

#[cfg(feature = "cluster")]
use crate::cluster::ClusterError;

/// The common result type between most library functions.
///
/// The library exposes functions which, for a result type, exposes only one
/// type, rather than the usual 2 (`Result<T, Error>`). This is because all
/// functions that return a result return lapis's [`Error`], so this is
/// implied, and a "simpler" result is used.
pub type Result<T> = std::result::Result<T, Error>;

/// A common error enum returned by most of the library's functionality
/// within a custom [`Result`].
///
/// Failures raised by a message handler surface to the `tell` caller through
/// the [`Handler`] and [`Other`] variants; everything the runtime itself can
/// fail with has a dedicated variant.
///
/// [`Handler`]: Error::Handler
/// [`Other`]: Error::Other
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A message handler failed. The message is surfaced to the `tell`
    /// caller verbatim; for remote dispatches it is the rendered form of
    /// the error raised on the owning node.
    Handler(String),
    /// Some other error. This is only used by handlers that want to fail a
    /// dispatch without a richer payload.
    Other(&'static str),
    /// A dispatch to a non-reentrant activation could not acquire the
    /// activation's semaphore within
    /// [`REENTRANCY_TIMEOUT`](crate::constants::REENTRANCY_TIMEOUT).
    ReentrancyTimeout,
    /// An `std::io` error.
    Io(IoError),
    /// An error from the `serde_json` crate while marshalling handler
    /// arguments or results.
    Json(JsonError),
    /// An error from the [`cluster`] module.
    ///
    /// [`cluster`]: crate::cluster
    #[cfg(feature = "cluster")]
    Cluster(ClusterError),
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

#[cfg(feature = "cluster")]
impl From<ClusterError> for Error {
    fn from(e: ClusterError) -> Error {
        Error::Cluster(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Handler(msg) => write!(f, "handler failed: {msg}"),
            Error::Other(msg) => f.write_str(msg),
            Error::ReentrancyTimeout => {
                f.write_str("timed out waiting for a non-reentrant activation")
            },
            Error::Io(inner) => fmt::Display::fmt(inner, f),
            Error::Json(inner) => fmt::Display::fmt(inner, f),
            #[cfg(feature = "cluster")]
            Error::Cluster(inner) => fmt::Display::fmt(inner, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(inner) => Some(inner),
            Error::Json(inner) => Some(inner),
            #[cfg(feature = "cluster")]
            Error::Cluster(inner) => Some(inner),
            _ => None,
        }
    }
}
