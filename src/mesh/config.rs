use std::time::Duration;

use typed_builder::TypedBuilder;

/// Port mesh listeners bind when the configuration does not say otherwise.
pub const MESH_PORT: u16 = 4817;

/// Tunables for the mesh networking layer.
///
/// Transports take a copy at construction and own every timeout; the link
/// pool itself is configured by nothing but the local peer key it logs
/// under.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MeshConfig {
    /// Port the local node listens on.
    #[builder(default = MESH_PORT)]
    pub listen_port: u16,
    /// Network the node belongs to. Nodes never hold links across networks.
    #[builder(default = 0)]
    pub network_id: u32,
    /// How long a transport lets a dial run before failing it.
    #[builder(default = Duration::from_secs(60))]
    pub dial_timeout: Duration,
    /// How long an idle link is kept before the transport ends its session.
    #[builder(default = Duration::from_secs(48 * 60 * 60))]
    pub keepalive: Duration,
    /// How long request/response protocols wait on the remote side.
    #[builder(default = Duration::from_secs(15))]
    pub response_timeout: Duration,
    /// Well-known peers dialed when the node starts with an empty mesh.
    #[builder(default)]
    pub bootstrap: Vec<String>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = MeshConfig::default();
        assert_eq!(config.listen_port, MESH_PORT);
        assert_eq!(config.dial_timeout, Duration::from_secs(60));
        assert_eq!(config.keepalive, Duration::from_secs(172_800));
        assert!(config.bootstrap.is_empty());
    }

    #[test]
    fn builder_overrides_stick() {
        let config = MeshConfig::builder()
            .dial_timeout(Duration::from_millis(250))
            .bootstrap(vec!["10.0.0.1".into()])
            .build();
        assert_eq!(config.dial_timeout, Duration::from_millis(250));
        assert_eq!(config.bootstrap, vec!["10.0.0.1".to_string()]);
        assert_eq!(config.listen_port, MESH_PORT);
    }
}
