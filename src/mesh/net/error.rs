use core::fmt;

use tokio::sync::{mpsc::error::SendError, oneshot::error::RecvError};

use super::identity::PeerKey;

/// Errors surfaced by the mesh networking layer.
///
/// Clonable so that one dial failure can be delivered verbatim to every
/// caller that coalesced onto the dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The link pool is shutting down or gone; no links are handed out.
    PoolClosed,
    /// The transport gave up on a dial after its configured timeout.
    DialTimeout,
    /// The remote endpoint could not be reached.
    Refused { addr: String },
    /// The dialed endpoint authenticated as a different peer than expected.
    KeyMismatch { wanted: PeerKey, got: PeerKey },
    /// The link was already closed when the operation was attempted.
    LinkClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolClosed => write!(f, "link pool is shut down"),
            Error::DialTimeout => write!(f, "dial timed out"),
            Error::Refused { addr } => write!(f, "connection to {addr} refused"),
            Error::KeyMismatch { wanted, got } => {
                write!(f, "dialed peer {wanted} but reached {got}")
            }
            Error::LinkClosed => write!(f, "link is closed"),
        }
    }
}

impl std::error::Error for Error {}

// A send failing means the task owning the receiving end has exited, and
// the only task that ever exits is the pool dispatcher.
impl<T> From<SendError<T>> for Error {
    fn from(_: SendError<T>) -> Self {
        Error::PoolClosed
    }
}

impl From<RecvError> for Error {
    fn from(_: RecvError) -> Self {
        Error::PoolClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_endpoint() {
        let err = Error::Refused { addr: "1.1.1.1".into() };
        assert_eq!(err.to_string(), "connection to 1.1.1.1 refused");
        assert_eq!(Error::PoolClosed.to_string(), "link pool is shut down");
    }
}
