use core::fmt;

use kt2::PublicKey;

/// A peer's identity on the mesh: the blake3 digest of its public key.
///
/// Cheap to copy, hashable and ordered by its byte string, which is what
/// lets it serve as the primary key of all link bookkeeping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey([u8; 32]);

impl PeerKey {
    /// Derives the mesh identity of `public_key`.
    pub fn of(public_key: &PublicKey) -> Self {
        Self(*blake3::hash(&public_key.bytes).as_bytes())
    }

    /// Rebuilds a key from its raw digest, e.g. one read off the wire.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// Four digest bytes are plenty for a log line.
impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerKey(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Byte string identifying one handshake outcome.
///
/// Both ends of a handshake hold the same id, and ids of independent
/// handshakes differ, which makes the id a symmetric tie-breaker: two nodes
/// holding duplicate links order them identically without coordinating.
/// Ordering is plain lexicographic byte order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// A fresh id with enough entropy that collisions never matter.
    pub fn random() -> Self {
        Self(rand::random::<[u8; 16]>().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// The authenticated session a transport handshake produced.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

/// Who an inbound link claims to be, as reported by the transport.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub key: PeerKey,
    pub addr: String,
}

#[cfg(test)]
mod tests {
    use kt2::Keypair;

    use super::*;

    #[test]
    fn key_derivation_is_stable() {
        let keypair = Keypair::generate(None);
        let a = PeerKey::of(&keypair.public);
        let b = PeerKey::of(&keypair.public);
        assert_eq!(a, b);

        let other = PeerKey::of(&Keypair::generate(None).public);
        assert_ne!(a, other);
    }

    #[test]
    fn key_renders_short_hex() {
        let key = PeerKey::from_bytes([0xab; 32]);
        assert_eq!(key.to_string(), "abababab");
        assert_eq!(format!("{key:?}"), format!("PeerKey({})", "ab".repeat(32)));
    }

    #[test]
    fn session_ids_order_by_bytes() {
        let low = SessionId::new(b"110".as_slice());
        let high = SessionId::new(b"111".as_slice());
        assert!(low < high);
        // a strict prefix sorts before its extension
        assert!(SessionId::new(b"11".as_slice()) < low);
        assert_ne!(SessionId::random(), SessionId::random());
    }
}
