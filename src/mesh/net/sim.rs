use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::{sync::mpsc, time::sleep};
use tracing::debug;

use crate::mesh::config::MeshConfig;

use super::{
    error::Error,
    identity::{PeerInfo, PeerKey, Session, SessionId},
    link::Link,
    transport::{InboundLink, Transport},
};

/// An in-memory stand-in for a real wire transport.
///
/// Dials complete after a scripted delay with a scripted outcome, inbound
/// and closing events are published by hand, and every link the simulated
/// dialer ever produced stays observable afterwards. Tests and demos drive
/// the link pool end to end with it; nothing here touches a socket.
#[derive(Clone)]
pub struct SimNet {
    shared: Arc<SimShared>,
}

struct SimShared {
    config: MeshConfig,
    dial_delay: Mutex<Duration>,
    dial_result: Mutex<Result<(), Error>>,
    next_session_id: Mutex<Option<SessionId>>,
    next_dial_peer: Mutex<Option<PeerKey>>,
    dial_count: AtomicU32,
    dialed: Mutex<Vec<Link>>,
    // parking the receivers here keeps Link::send working on every link
    // this transport hands out
    outboxes: Mutex<Vec<mpsc::UnboundedReceiver<Vec<u8>>>>,
    incoming_tx: mpsc::UnboundedSender<InboundLink>,
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundLink>>>,
    closing_tx: mpsc::UnboundedSender<Link>,
    closing_rx: Mutex<Option<mpsc::UnboundedReceiver<Link>>>,
}

impl SimNet {
    pub fn new() -> Self {
        Self::with_config(MeshConfig::default())
    }

    pub fn with_config(config: MeshConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (closing_tx, closing_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(SimShared {
                config,
                dial_delay: Mutex::new(Duration::ZERO),
                dial_result: Mutex::new(Ok(())),
                next_session_id: Mutex::new(None),
                next_dial_peer: Mutex::new(None),
                dial_count: AtomicU32::new(0),
                dialed: Mutex::new(Vec::new()),
                outboxes: Mutex::new(Vec::new()),
                incoming_tx,
                incoming_rx: Mutex::new(Some(incoming_rx)),
                closing_tx,
                closing_rx: Mutex::new(Some(closing_rx)),
            }),
        }
    }

    /// How long every simulated dial takes.
    pub fn set_dial_delay(&self, delay: Duration) {
        *self.shared.dial_delay.lock().unwrap() = delay;
    }

    /// Scripted outcome for subsequent dials.
    pub fn set_dial_result(&self, result: Result<(), Error>) {
        *self.shared.dial_result.lock().unwrap() = result;
    }

    /// Session id the next successful dial hands out. Later dials fall
    /// back to random ids.
    pub fn set_next_session_id(&self, id: SessionId) {
        *self.shared.next_session_id.lock().unwrap() = Some(id);
    }

    /// Identity the endpoint reached by the next dial presents. When it
    /// differs from the peer the dial expected, the dial fails the way a
    /// real handshake's key check would.
    pub fn set_next_dial_peer(&self, key: PeerKey) {
        *self.shared.next_dial_peer.lock().unwrap() = Some(key);
    }

    /// How many dials have been started.
    pub fn dial_count(&self) -> u32 {
        self.shared.dial_count.load(Ordering::SeqCst)
    }

    /// Every link the simulated dialer has produced, in dial order.
    pub fn dialed_links(&self) -> Vec<Link> {
        self.shared.dialed.lock().unwrap().clone()
    }

    /// Delivers `link` as if a remote peer had connected in.
    pub fn publish_incoming(&self, link: Link, peer: PeerInfo) {
        self.shared
            .incoming_tx
            .send(InboundLink { link, peer })
            .expect("pool is not listening");
    }

    /// Reports that the session under `link` has ended.
    pub fn publish_closing(&self, link: Link) {
        self.shared
            .closing_tx
            .send(link)
            .expect("pool is not listening");
    }
}

impl Default for SimNet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimNet {
    async fn dial(&self, addr: &str, peer: PeerKey) -> Result<Link, Error> {
        self.shared.dial_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.shared.dial_delay.lock().unwrap();
        let timeout = self.shared.config.dial_timeout;
        if delay >= timeout {
            sleep(timeout).await;
            return Err(Error::DialTimeout);
        }
        sleep(delay).await;
        self.shared.dial_result.lock().unwrap().clone()?;
        // a link that authenticated as someone else is never handed over
        if let Some(got) = self.shared.next_dial_peer.lock().unwrap().take() {
            if got != peer {
                return Err(Error::KeyMismatch { wanted: peer, got });
            }
        }
        let session_id = self
            .shared
            .next_session_id
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(SessionId::random);
        let (link, outbox) = Link::open(addr, peer, Session::new(session_id));
        self.shared.outboxes.lock().unwrap().push(outbox);
        self.shared.dialed.lock().unwrap().push(link.clone());
        debug!(%peer, addr, link = %link.id(), "simulated dial complete");
        Ok(link)
    }

    fn subscribe_incoming(&self) -> mpsc::UnboundedReceiver<InboundLink> {
        self.shared
            .incoming_rx
            .lock()
            .unwrap()
            .take()
            .expect("incoming events already subscribed")
    }

    fn subscribe_closing(&self) -> mpsc::UnboundedReceiver<Link> {
        self.shared
            .closing_rx
            .lock()
            .unwrap()
            .take()
            .expect("closing events already subscribed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_session_id_is_used_once() {
        let net = SimNet::new();
        net.set_next_session_id(SessionId::new(b"abc".as_slice()));
        let peer = PeerKey::from_bytes([1; 32]);
        let first = net.dial("1.1.1.1", peer).await.unwrap();
        assert_eq!(first.session().id(), &SessionId::new(b"abc".as_slice()));
        let second = net.dial("1.1.1.1", peer).await.unwrap();
        assert_ne!(second.session().id(), first.session().id());
        assert_eq!(net.dial_count(), 2);
        assert_eq!(net.dialed_links().len(), 2);
    }

    #[tokio::test]
    async fn dials_slower_than_the_timeout_fail() {
        let config = MeshConfig::builder()
            .dial_timeout(Duration::from_millis(20))
            .build();
        let net = SimNet::with_config(config);
        net.set_dial_delay(Duration::from_millis(200));
        let err = net
            .dial("1.1.1.1", PeerKey::from_bytes([2; 32]))
            .await
            .unwrap_err();
        assert_eq!(err, Error::DialTimeout);
    }
}
