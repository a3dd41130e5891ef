//! Browser driver adapter for Scout.
//!
//! This crate is the capability layer between the session engine and a
//! devtools-protocol browser implementation. The engine programs against the
//! [`Launcher`] / [`BrowserDriver`] / [`PageDriver`] traits; the production
//! implementation ([`cdp`]) drives Chromium through `chromiumoxide`, and the
//! `testing` feature provides a scriptable in-memory double for the engine's
//! test suites.
//!
//! The traits are deliberately thin: launch and close a browser, open and
//! close a page, navigate, evaluate, query and mutate page state, pause and
//! dispose of intercepted requests, and expose the devtools event stream.
//! Everything stateful (recording, hijack routing, fan-out, bridging) lives
//! above this seam in `scout-core`.

pub mod cdp;
mod error;
mod events;
#[cfg(feature = "testing")]
pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use error::{DriverError, Result};
pub use events::{DriverEvent, InterceptStages, LifecycleKind, PausedRequest, ResourceTiming};
use scout_protocol::{Cookie, PdfRequest, ScreenshotRequest, SessionOptions, WindowBoundsUpdate, WindowInfo, WindowState};

/// Capacity of the per-page driver event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Launches browser processes. One launcher serves the whole daemon; each
/// launch yields an isolated browser owned by exactly one session.
#[async_trait]
pub trait Launcher: Send + Sync {
	async fn launch(&self, options: &SessionOptions) -> Result<Arc<dyn BrowserDriver>>;
}

/// One live browser process.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
	/// Opens a page on the given URL (use `about:blank` for an empty page).
	async fn open_page(&self, url: &str) -> Result<Arc<dyn PageDriver>>;

	/// False once the browser process has exited or the connection dropped.
	fn is_alive(&self) -> bool;

	/// Closes the browser and waits for the process to exit.
	async fn close(&self) -> Result<()>;
}

/// One page (tab) inside a browser.
///
/// Dispositions for paused requests (`continue_request`, `fulfill_request`,
/// `fail_request`) address requests by the interception ID carried in
/// [`PausedRequest`]; `response_body` uses the network-layer request ID from
/// the loading events.
#[async_trait]
pub trait PageDriver: Send + Sync {
	// Navigation.
	async fn navigate(&self, url: &str) -> Result<()>;
	async fn reload(&self) -> Result<()>;
	async fn back(&self) -> Result<()>;
	async fn forward(&self) -> Result<()>;
	async fn stop_loading(&self) -> Result<()>;

	// Introspection.
	async fn title(&self) -> Result<String>;
	async fn url(&self) -> Result<String>;
	async fn evaluate(&self, expression: &str) -> Result<Value>;
	async fn content(&self) -> Result<String>;

	// Capture.
	async fn screenshot(&self, request: &ScreenshotRequest) -> Result<Vec<u8>>;
	async fn pdf(&self, request: &PdfRequest) -> Result<Vec<u8>>;

	// Network state.
	async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()>;
	async fn set_user_agent(&self, user_agent: &str) -> Result<()>;
	async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;
	async fn cookies(&self) -> Result<Vec<Cookie>>;
	async fn clear_cookies(&self) -> Result<()>;
	async fn set_blocked_urls(&self, patterns: &[String]) -> Result<()>;

	// Host/page plumbing.
	async fn add_binding(&self, name: &str) -> Result<()>;
	async fn add_init_script(&self, source: &str) -> Result<()>;
	async fn set_file_input(&self, selector: &str, files: &[String]) -> Result<()>;

	// Request interception.
	async fn enable_interception(&self, stages: InterceptStages) -> Result<()>;
	async fn disable_interception(&self) -> Result<()>;
	async fn continue_request(&self, interception_id: &str, headers: Option<&[(String, String)]>) -> Result<()>;
	async fn fulfill_request(&self, interception_id: &str, status: u16, headers: &[(String, String)], body: &[u8]) -> Result<()>;
	async fn fail_request(&self, interception_id: &str, reason: &str) -> Result<()>;
	/// Body of a request paused at the response stage.
	async fn paused_response_body(&self, interception_id: &str) -> Result<Vec<u8>>;
	/// Body of a completed request, by network request ID.
	async fn response_body(&self, request_id: &str) -> Result<Vec<u8>>;

	// Window.
	async fn window(&self) -> Result<WindowInfo>;
	async fn set_window(&self, bounds: &WindowBoundsUpdate, state: Option<WindowState>) -> Result<()>;

	/// Hands out the page's event stream. Single consumer: the first call
	/// returns the receiver, later calls return `None`.
	fn take_event_stream(&self) -> Option<mpsc::Receiver<DriverEvent>>;

	async fn close(&self) -> Result<()>;
}
