//! Browser event stream messages.
//!
//! Every event observed on a session (network traffic, console output, page
//! lifecycle, page errors) is published to subscribers as a [`BrowserEvent`]:
//! a monotonic timestamp plus one tagged payload. The same shape travels over
//! the `events` streaming RPC.

use serde::{Deserialize, Serialize};

/// One event on a session's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEvent {
	/// Milliseconds since the Unix epoch, non-decreasing per session.
	pub ts_ms: u64,
	#[serde(flatten)]
	pub payload: BrowserEventPayload,
}

/// Tagged event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEventPayload {
	/// A request left the page.
	RequestSent {
		method: String,
		url: String,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		headers: Vec<(String, String)>,
	},
	/// Response headers arrived for a request.
	ResponseReceived {
		url: String,
		status: u16,
		#[serde(default, skip_serializing_if = "String::is_empty")]
		mime_type: String,
		/// Milliseconds from request start to response headers, when known.
		#[serde(skip_serializing_if = "Option::is_none")]
		time_ms: Option<f64>,
	},
	/// A `console.*` call inside the page.
	Console {
		level: String,
		message: String,
		#[serde(default, skip_serializing_if = "String::is_empty")]
		source: String,
	},
	/// Document lifecycle transition.
	PageEvent { kind: PageEventKind, url: String },
	/// Uncaught page error or subresource failure.
	Error {
		message: String,
		#[serde(default, skip_serializing_if = "String::is_empty")]
		source: String,
	},
}

/// Lifecycle transitions surfaced on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageEventKind {
	Load,
	DomContentLoaded,
	/// The page swapped to a new document. Subscriptions survive this
	/// boundary; the event marks it.
	Navigation,
	FrameStop,
}

impl BrowserEvent {
	/// Returns the URL carried by the payload, if any.
	pub fn url(&self) -> Option<&str> {
		match &self.payload {
			BrowserEventPayload::RequestSent { url, .. }
			| BrowserEventPayload::ResponseReceived { url, .. }
			| BrowserEventPayload::PageEvent { url, .. } => Some(url),
			_ => None,
		}
	}
}
