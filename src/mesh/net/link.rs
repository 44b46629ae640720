use core::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use tokio::sync::mpsc;
use tracing::debug;

use super::{
    error::Error,
    identity::{PeerKey, Session},
};

// Ids are never reused within a process, so bookkeeping can tell a replaced
// link from its replacement.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one link handle for the lifetime of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// One live, authenticated connection to a remote peer.
///
/// Can be cloned to obtain another handle to the same link. Whoever opened
/// the link holds the outbound frame receiver and moves the bytes; every
/// other holder just queues frames and asks questions.
#[derive(Clone)]
pub struct Link {
    shared: Arc<Shared>,
}

struct Shared {
    id: LinkId,
    peer: PeerKey,
    addr: String,
    session: Session,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

impl Link {
    /// Creates a link and hands back the outbound frame stream the creator
    /// drains into the wire.
    pub fn open(
        addr: impl Into<String>,
        peer: PeerKey,
        session: Session,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let link = Self {
            shared: Arc::new(Shared {
                id: LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed)),
                peer,
                addr: addr.into(),
                session,
                outbound,
                closed: AtomicBool::new(false),
            }),
        };
        (link, outbound_rx)
    }

    pub fn id(&self) -> LinkId {
        self.shared.id
    }

    pub fn peer(&self) -> PeerKey {
        self.shared.peer
    }

    /// The address this link was established against.
    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    /// Queues one frame for delivery. Fails once the link is closed or the
    /// transport has dropped its end of the queue.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::LinkClosed);
        }
        self.shared
            .outbound
            .send(frame)
            .map_err(|_| Error::LinkClosed)
    }

    /// Closes the link. Callable from either side, any number of times;
    /// only the first call does anything.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!(link = %self.shared.id, peer = %self.shared.peer, "link closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Link({} -> {} at {})",
            self.shared.id, self.shared.peer, self.shared.addr
        )
    }
}
