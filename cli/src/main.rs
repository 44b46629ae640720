use std::sync::Arc;
use std::time::Duration;

use kt2::Keypair;
use synapse::mesh::config::MeshConfig;
use synapse::mesh::net::identity::{PeerInfo, PeerKey, Session, SessionId};
use synapse::mesh::net::link::Link;
use synapse::mesh::net::pool::LinkPool;
use synapse::mesh::net::sim::SimNet;
use tracing::info;

// Drives a link pool over the simulated transport: a cold dial, a warm get,
// a crossed inbound link and its resolution, then a clean shutdown.

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let local = PeerKey::of(&Keypair::generate(None).public);
    let config = MeshConfig::builder()
        .dial_timeout(Duration::from_secs(5))
        .build();
    let net = SimNet::with_config(config);
    net.set_dial_delay(Duration::from_millis(50));
    let pool = LinkPool::start(Arc::new(net.clone()), local);

    // a cold get dials, a warm get is served from the index
    let peer = PeerKey::of(&Keypair::generate(None).public);
    let link = pool.get_link("10.0.0.1", peer).await.unwrap();
    info!(link = %link.id(), %peer, "dialed");
    let again = pool.get_link("10.0.0.1", peer).await.unwrap();
    info!(link = %again.id(), dials = net.dial_count(), "served from the pool");

    // the peer dialed us at the same time; one of the two links has to go,
    // and a session id of a single zero byte sorts below any generated one
    let (inbound, _outbox) = Link::open(
        "10.0.0.1",
        peer,
        Session::new(SessionId::new(vec![0u8])),
    );
    net.publish_incoming(
        inbound.clone(),
        PeerInfo {
            key: peer,
            addr: "10.0.0.1".into(),
        },
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    let survivor = pool.get_link("10.0.0.1", peer).await.unwrap();
    info!(
        survivor = %survivor.id(),
        dialed_closed = link.is_closed(),
        "crossed links resolved"
    );

    survivor.send(b"ping".to_vec()).unwrap();

    pool.shutdown().await;
    info!(survivor_closed = survivor.is_closed(), "pool drained");
}
