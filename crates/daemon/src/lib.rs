//! Scout daemon library: RPC surface, device identity, TLS, and the run
//! loop. The `scoutd` binary is a thin wrapper over [`server::Daemon`].

pub mod client;
pub mod identity;
pub mod logging;
pub mod rpc;
pub mod server;
pub mod tls;
