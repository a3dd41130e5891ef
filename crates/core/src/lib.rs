//! Scout session engine.
//!
//! This crate is the machinery between the RPC surface and the browser
//! driver: concurrent session lifecycle ([`SessionManager`], [`Session`]),
//! HAR recording ([`NetworkRecorder`]), request hijacking
//! ([`HijackRegistry`] and friends), bounded event fan-out ([`EventHub`]),
//! and the host↔page [`Bridge`]. It programs exclusively against the
//! `scout-driver` capability traits, so everything here is exercisable with
//! the in-memory test driver.

pub mod bridge;
mod error;
pub mod fanout;
pub mod hijack;
pub mod js;
pub mod manager;
pub mod recorder;
pub mod session;

pub use bridge::{BINDING_NAME, Bridge, BridgeSubscription};
pub use error::{Error, Result};
pub use fanout::{DEFAULT_FANOUT_CAPACITY, EventHub, EventSubscription};
pub use hijack::{Disposition, HijackHandler, HijackRegistry, HijackRouter, InterceptedRequest, ResponseModifier};
pub use manager::SessionManager;
pub use recorder::{NetworkRecorder, RecorderOptions};
pub use session::{HeadersHandle, NavigateOptions, Session};
