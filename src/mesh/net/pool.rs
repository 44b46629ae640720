use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{
    dispatch::Dispatcher,
    error::Error,
    identity::PeerKey,
    link::Link,
    transport::Transport,
};

/// Where the pool is in its lifecycle. Only ever moves forward.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PoolState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// One caller asking for a link, carrying the private channel its answer
/// goes down. Replies are fired, never awaited, so a slow or vanished
/// caller cannot stall anyone else.
pub(crate) struct LinkRequest {
    pub(crate) addr: String,
    pub(crate) peer: PeerKey,
    pub(crate) reply: oneshot::Sender<Result<Link, Error>>,
}

/// Hands out at most one live link per remote peer.
///
/// All bookkeeping lives on a dispatcher task spawned at startup; handles
/// only post events to it and await replies. Cloning is cheap and every
/// clone talks to the same pool.
#[derive(Clone)]
pub struct LinkPool {
    request_tx: mpsc::UnboundedSender<LinkRequest>,
    shutdown_tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
    closed: Arc<AtomicBool>,
}

impl LinkPool {
    /// Spawns the pool over `transport`. `local` is this node's own key;
    /// it only ever shows up in log output.
    pub fn start(transport: Arc<dyn Transport>, local: PeerKey) -> Self {
        let incoming_rx = transport.subscribe_incoming();
        let closing_rx = transport.subscribe_closing();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (dialed_tx, dialed_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(local, transport, dialed_tx);
        tokio::spawn(dispatcher.run(
            request_rx,
            dialed_rx,
            incoming_rx,
            closing_rx,
            shutdown_rx,
        ));
        Self {
            request_tx,
            shutdown_tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the live link to `peer`, dialing `addr` if none exists yet.
    ///
    /// Concurrent calls for the same peer share one dial and resolve to
    /// the same link. Fails with [`Error::PoolClosed`] once shutdown has
    /// begun, and with the dial's own error when the transport cannot
    /// reach the peer; a failed dial leaves nothing behind, so the next
    /// call dials afresh.
    pub async fn get_link(&self, addr: &str, peer: PeerKey) -> Result<Link, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }
        let (reply, answer) = oneshot::channel();
        self.request_tx.send(LinkRequest {
            addr: addr.to_owned(),
            peer,
            reply,
        })?;
        answer.await?
    }

    /// Shuts the pool down: every held link is closed, every parked caller
    /// is woken with [`Error::PoolClosed`], and links from dials still in
    /// flight are closed as they land. Returns once all of that has
    /// happened. Safe to call any number of times, from any handle.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("pool shutdown already requested");
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.shutdown_tx.send(ack_tx).is_ok() {
            // the dispatcher acks after its last in-flight dial has landed
            let _ = ack_rx.await;
        }
    }
}
