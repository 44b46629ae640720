pub mod config;
pub mod net;

// Links to remote peers are a shared resource: gossip wants the same peer a
// sync round is already talking to, and the remote end may be dialing us at
// the exact moment we dial it. Rather than guard the link table with locks,
// the mesh layer hands the table to a single task and turns every access
// into a message. The owner of the table never blocks while holding it, so
// a burst of requests becomes a queue rather than contention, and a race
// between a dial and an inbound link collapses into whichever event the
// owner happens to see first.

// Duplicate links are reconciled by comparing session ids, which both
// endpoints learned from the same pair of handshakes. Each side keeps the
// link whose session id is smaller and closes the other, so two nodes that
// crossed dials converge on one surviving link without exchanging another
// byte.
