//! Error types for the driver layer.

use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by a browser driver.
#[derive(Debug, Error)]
pub enum DriverError {
	/// The browser process could not be launched.
	#[error("browser launch failed: {0}")]
	Launch(String),

	/// The browser or page is gone; no further operations are possible.
	#[error("browser closed: {0}")]
	Closed(String),

	/// Navigation was rejected or aborted by the browser.
	#[error("navigation failed: {0}")]
	Navigation(String),

	/// Script evaluation raised an exception inside the page.
	#[error("evaluation failed: {0}")]
	Evaluate(String),

	/// A devtools object (node, request, window) was not found.
	#[error("not found: {0}")]
	NotFound(String),

	/// Unexpected devtools response or malformed payload.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// The driver implementation does not support this operation.
	#[error("unsupported operation: {0}")]
	Unsupported(&'static str),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl DriverError {
	/// Returns true when the underlying browser is unusable.
	pub fn is_closed(&self) -> bool {
		matches!(self, DriverError::Closed(_))
	}
}
