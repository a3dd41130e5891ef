//! Events emitted by a page driver.
//!
//! Every page exposes a single ordered stream of [`DriverEvent`]s; the
//! session engine pumps it into the recorder, the hijack dispatcher, the
//! bridge, and the subscriber fan-out. Timestamps are the driver's monotonic
//! clock converted to milliseconds.

/// One observation from the browser.
#[derive(Debug, Clone)]
pub enum DriverEvent {
	/// A request was issued by the page.
	RequestWillBeSent {
		request_id: String,
		method: String,
		url: String,
		headers: Vec<(String, String)>,
		post_data: Option<String>,
		/// Wall-clock request start, milliseconds since the Unix epoch.
		wall_time_ms: f64,
		/// Driver monotonic clock, milliseconds.
		monotonic_ms: f64,
	},
	/// Response headers arrived for an in-flight request.
	ResponseReceived {
		request_id: String,
		url: String,
		status: u16,
		status_text: String,
		http_version: String,
		headers: Vec<(String, String)>,
		mime_type: String,
		remote_ip: Option<String>,
		timing: Option<ResourceTiming>,
		monotonic_ms: f64,
	},
	/// The request completed successfully.
	LoadingFinished {
		request_id: String,
		encoded_length: i64,
		monotonic_ms: f64,
	},
	/// The request failed or was aborted.
	LoadingFailed {
		request_id: String,
		error_text: String,
		canceled: bool,
		monotonic_ms: f64,
	},
	/// A request matching an interception pattern is paused and awaits a
	/// disposition.
	RequestPaused(PausedRequest),
	/// `console.*` call inside the page.
	Console { level: String, text: String, source: String },
	/// Document lifecycle transition.
	Lifecycle { kind: LifecycleKind, url: String },
	/// The page invoked a named host binding.
	BindingCalled { name: String, payload: String },
	/// Uncaught exception inside the page.
	PageError { message: String, source: String },
	/// The renderer or browser process died.
	Crashed { reason: String },
}

/// Document lifecycle transitions the driver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
	Load,
	DomContentLoaded,
	/// The main frame committed a new document.
	Navigation,
	FrameStopped,
}

/// Devtools resource timing, millisecond offsets relative to
/// `request_time_s`. Negative values mean the phase did not occur.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceTiming {
	/// Baseline in seconds on the driver's monotonic clock.
	pub request_time_s: f64,
	pub dns_start: f64,
	pub dns_end: f64,
	pub connect_start: f64,
	pub connect_end: f64,
	pub ssl_start: f64,
	pub ssl_end: f64,
	pub send_start: f64,
	pub send_end: f64,
	pub receive_headers_end: f64,
}

/// A request paused by the interception layer.
///
/// `interception_id` addresses the paused request when applying a
/// disposition; `network_id` correlates with the recorder's request IDs when
/// the driver provides it.
#[derive(Debug, Clone)]
pub struct PausedRequest {
	pub interception_id: String,
	pub network_id: Option<String>,
	pub url: String,
	pub method: String,
	pub headers: Vec<(String, String)>,
	pub post_data: Option<String>,
	pub resource_type: String,
	/// Present when paused at the response stage.
	pub response_status: Option<u16>,
	/// Present when paused at the response stage.
	pub response_headers: Option<Vec<(String, String)>>,
}

impl PausedRequest {
	/// True when this pause happened after response headers arrived.
	pub fn is_response_stage(&self) -> bool {
		self.response_status.is_some()
	}
}

/// Which interception stages the driver should pause requests at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptStages {
	pub request: bool,
	pub response: bool,
}

impl InterceptStages {
	pub const REQUEST_ONLY: Self = Self {
		request: true,
		response: false,
	};
	pub const BOTH: Self = Self {
		request: true,
		response: true,
	};
}
