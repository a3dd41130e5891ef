//! Wire types for the Scout automation protocol.
//!
//! This crate contains the serde-serializable types that cross process
//! boundaries: the JSON-RPC request/response payloads, the HAR 1.2 document
//! model produced by the network recorder, the browser event stream, and the
//! bridge message envelope exchanged with in-page content scripts.
//!
//! Types in this crate are pure data: no behavior beyond
//! serialization/deserialization and small constructors. The engine that
//! gives them meaning lives in `scout-core`.

pub mod bridge;
pub mod cookie;
pub mod event;
pub mod har;
pub mod rpc;
pub mod session;

pub use bridge::*;
pub use cookie::*;
pub use event::*;
pub use har::*;
pub use rpc::*;
pub use session::*;
