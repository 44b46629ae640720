use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    error::Error,
    identity::{PeerInfo, PeerKey},
    link::Link,
};

/// A freshly accepted inbound link whose handshake already completed.
#[derive(Clone, Debug)]
pub struct InboundLink {
    pub link: Link,
    pub peer: PeerInfo,
}

/// What the link pool requires from the layer that actually moves bytes.
///
/// A successful `dial` yields a link whose `peer()` equals the expected key
/// and whose session id is set; the transport enforces its own dial
/// timeout. Both subscriptions are single-consumer and are taken exactly
/// once, by the pool, at startup.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes an outbound link to `peer` at `addr`.
    async fn dial(&self, addr: &str, peer: PeerKey) -> Result<Link, Error>;

    /// Inbound links accepted by the local listener.
    fn subscribe_incoming(&self) -> mpsc::UnboundedReceiver<InboundLink>;

    /// Links whose underlying session has ended.
    fn subscribe_closing(&self) -> mpsc::UnboundedReceiver<Link>;
}
