use std::sync::Arc;

use hashbrown::{hash_map::Entry, HashMap};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, debug_span, trace, Instrument};

use super::{
    error::Error,
    identity::PeerKey,
    link::Link,
    pool::{LinkRequest, PoolState},
    transport::{InboundLink, Transport},
};

/// Outcome of one background dial task, posted back to the dispatcher
/// together with the generation of the dial that produced it.
pub(crate) type DialOutcome = (PeerKey, u64, Result<Link, Error>);

/// Callers parked on a dial in flight. There is at most one of these per
/// peer; every caller that shows up while it exists joins `waiters`. The
/// entry stays in the index until the dial of its generation lands, even
/// after an inbound link has already served the waiters, so a late result
/// can never be taken for a newer dial's.
struct PendingDial {
    generation: u64,
    addr: String,
    waiters: Vec<oneshot::Sender<Result<Link, Error>>>,
}

/// The single task that owns the link index.
///
/// Every mutation of `established` and `pending` happens here, so a
/// request, an inbound link and a finishing dial for the same peer can
/// never interleave; whichever event arrives first wins and the handlers
/// below reconcile the rest. Handling an event never blocks: it moves
/// in-memory state, spawns a dial task, closes a link or fires a oneshot.
pub(crate) struct Dispatcher {
    local: PeerKey,
    transport: Arc<dyn Transport>,
    established: HashMap<PeerKey, Link>,
    pending: HashMap<PeerKey, PendingDial>,
    dials_in_flight: usize,
    next_generation: u64,
    dialed_tx: mpsc::UnboundedSender<DialOutcome>,
    state: PoolState,
}

impl Dispatcher {
    pub(crate) fn new(
        local: PeerKey,
        transport: Arc<dyn Transport>,
        dialed_tx: mpsc::UnboundedSender<DialOutcome>,
    ) -> Self {
        Self {
            local,
            transport,
            established: HashMap::new(),
            pending: HashMap::new(),
            dials_in_flight: 0,
            next_generation: 0,
            dialed_tx,
            state: PoolState::Running,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut request_rx: mpsc::UnboundedReceiver<LinkRequest>,
        mut dialed_rx: mpsc::UnboundedReceiver<DialOutcome>,
        mut incoming_rx: mpsc::UnboundedReceiver<InboundLink>,
        mut closing_rx: mpsc::UnboundedReceiver<Link>,
        mut shutdown_rx: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    ) {
        let span = debug_span!("pool", local = %self.local);
        async move {
            debug!("link pool started");
            let ack = loop {
                select! {
                    Some(req) = request_rx.recv() => self.on_request(req),
                    Some((peer, generation, outcome)) = dialed_rx.recv() => {
                        self.on_dialed(peer, generation, outcome)
                    }
                    Some(inbound) = incoming_rx.recv() => self.on_incoming(inbound),
                    Some(link) = closing_rx.recv() => self.on_closing(link),
                    // recv() yields None once every pool handle is gone;
                    // either way the loop is over
                    ack = shutdown_rx.recv() => break ack,
                }
            };
            self.begin_shutdown();
            // dials still in flight each post exactly one outcome; stay on
            // the channels until the last one has landed so no late link
            // outlives the pool
            while self.dials_in_flight > 0 {
                select! {
                    Some((peer, generation, outcome)) = dialed_rx.recv() => {
                        self.on_dialed(peer, generation, outcome)
                    }
                    Some(inbound) = incoming_rx.recv() => self.on_incoming(inbound),
                    Some(req) = request_rx.recv() => self.on_request(req),
                    Some(link) = closing_rx.recv() => self.on_closing(link),
                    else => break,
                }
            }
            self.state = PoolState::Shutdown;
            debug!("link pool shut down");
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        }
        .instrument(span)
        .await
    }

    fn on_request(&mut self, req: LinkRequest) {
        let LinkRequest { addr, peer, reply } = req;
        if self.state != PoolState::Running {
            let _ = reply.send(Err(Error::PoolClosed));
            return;
        }
        if let Some(link) = self.established.get(&peer) {
            trace!(%peer, link = %link.id(), "request served from index");
            let _ = reply.send(Ok(link.clone()));
            return;
        }
        if let Some(pending) = self.pending.get_mut(&peer) {
            trace!(%peer, "request joins dial in flight");
            pending.waiters.push(reply);
            return;
        }
        debug!(%peer, %addr, "dialing");
        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending.insert(
            peer,
            PendingDial {
                generation,
                addr: addr.clone(),
                waiters: vec![reply],
            },
        );
        self.dials_in_flight += 1;
        let transport = self.transport.clone();
        let dialed_tx = self.dialed_tx.clone();
        let span = debug_span!("dial", %peer, %addr);
        tokio::spawn(
            async move {
                let outcome = transport.dial(&addr, peer).await;
                // the dispatcher consumes every outcome, even while it is
                // draining for shutdown
                let _ = dialed_tx.send((peer, generation, outcome));
            }
            .instrument(span),
        );
    }

    fn on_dialed(&mut self, peer: PeerKey, generation: u64, outcome: Result<Link, Error>) {
        self.dials_in_flight -= 1;
        // only the generation the index still tracks may touch it; anything
        // else is the leftover of an entry shutdown has already drained,
        // and its link has nowhere to go
        let pending = match self.pending.entry(peer) {
            Entry::Occupied(entry) if entry.get().generation == generation => entry.remove(),
            _ => {
                if let Ok(link) = outcome {
                    debug!(%peer, link = %link.id(), "dial result from a dead generation discarded");
                    link.close();
                }
                return;
            }
        };
        match outcome {
            Ok(link) => self.on_dial_ok(peer, link, pending),
            Err(err) => {
                debug!(%peer, addr = %pending.addr, %err, "dial failed");
                for waiter in pending.waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }

    fn on_dial_ok(&mut self, peer: PeerKey, link: Link, pending: PendingDial) {
        if let Some(incumbent) = self.established.get(&peer).cloned() {
            // an inbound link was admitted while this dial ran; its arrival
            // already served the waiters, and the duplicate rule decides
            // which of the two links stays
            let survivor = self.keep_one(peer, incumbent, link);
            for waiter in pending.waiters {
                let _ = waiter.send(Ok(survivor.clone()));
            }
            return;
        }
        debug!(%peer, link = %link.id(), session = %link.session().id(), "dial complete");
        self.established.insert(peer, link.clone());
        for waiter in pending.waiters {
            let _ = waiter.send(Ok(link.clone()));
        }
    }

    fn on_incoming(&mut self, inbound: InboundLink) {
        let InboundLink { link, peer: info } = inbound;
        if self.state != PoolState::Running {
            link.close();
            return;
        }
        let peer = link.peer();
        debug!(
            %peer,
            addr = %info.addr,
            link = %link.id(),
            session = %link.session().id(),
            "inbound link"
        );
        if let Some(incumbent) = self.established.get(&peer).cloned() {
            self.keep_one(peer, incumbent, link);
            return;
        }
        if let Some(pending) = self.pending.get_mut(&peer) {
            // callers parked on the dial get the inbound link right away;
            // the entry itself stays until the dial of its generation
            // lands, so the result faces the duplicate check instead of
            // being taken for a newer dial's
            trace!(%peer, waiters = pending.waiters.len(), "inbound link serves parked callers");
            for waiter in pending.waiters.drain(..) {
                let _ = waiter.send(Ok(link.clone()));
            }
        }
        self.established.insert(peer, link);
    }

    fn on_closing(&mut self, link: Link) {
        let peer = link.peer();
        match self.established.get(&peer) {
            Some(indexed) if indexed.id() == link.id() => {
                debug!(%peer, link = %link.id(), "indexed link ended");
                self.established.remove(&peer);
            }
            Some(_) => {
                trace!(%peer, link = %link.id(), "closing event for a link already replaced")
            }
            None => trace!(%peer, link = %link.id(), "closing event for an unknown peer"),
        }
    }

    /// Reconciles two live links to the same peer: the one with the smaller
    /// session id survives and is indexed, the other is closed. Both
    /// endpoints run this comparison on the same pair of session ids, so
    /// they converge on the same surviving link. An exact tie keeps the
    /// incumbent.
    fn keep_one(&mut self, peer: PeerKey, incumbent: Link, challenger: Link) -> Link {
        if challenger.session().id() < incumbent.session().id() {
            debug!(
                %peer,
                kept = %challenger.id(),
                dropped = %incumbent.id(),
                "duplicate link, replacing the incumbent"
            );
            incumbent.close();
            self.established.insert(peer, challenger.clone());
            challenger
        } else {
            debug!(
                %peer,
                kept = %incumbent.id(),
                dropped = %challenger.id(),
                "duplicate link, keeping the incumbent"
            );
            challenger.close();
            incumbent
        }
    }

    fn begin_shutdown(&mut self) {
        self.state = PoolState::ShuttingDown;
        debug!(
            established = self.established.len(),
            dials = self.dials_in_flight,
            "shutting down"
        );
        for (_, link) in self.established.drain() {
            link.close();
        }
        for (_, pending) in self.pending.drain() {
            for waiter in pending.waiters {
                let _ = waiter.send(Err(Error::PoolClosed));
            }
        }
    }
}
