//! Synapse keeps a node's live, authenticated links to its peers: one link
//! per remote identity, shared by every caller, no matter how outbound
//! dials and inbound connections race each other.

pub mod mesh;
