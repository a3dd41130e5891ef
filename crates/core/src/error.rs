//! Error taxonomy for the session engine.
//!
//! Every operation returns one of these typed errors; the RPC surface maps
//! them onto stable status codes via [`Error::code`]. Internal invariant
//! violations never panic toward the client; they fold into
//! [`Error::Driver`].

use thiserror::Error;

use scout_driver::DriverError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	// Session errors.
	#[error("session not found: {0}")]
	SessionNotFound(String),

	#[error("session gone: browser process exited")]
	SessionGone,

	#[error("session limit exceeded: {0} sessions already running")]
	SessionLimitExceeded(usize),

	#[error("browser launch failed: {0}")]
	LaunchFailed(String),

	#[error("invalid session configuration: {0}")]
	ConfigInvalid(String),

	// Navigation errors.
	#[error("navigation timeout after {ms}ms: {url}")]
	NavigationTimeout { url: String, ms: u64 },

	#[error("navigation failed: {0}")]
	NavigationFailed(String),

	// Element errors.
	#[error("selector not found: {0}")]
	SelectorNotFound(String),

	#[error("element not interactable: {0}")]
	ElementNotInteractable(String),

	#[error("element detached: {0}")]
	ElementDetached(String),

	// Protocol errors.
	#[error("evaluation failed: {0}")]
	EvalFailed(String),

	#[error("driver error: {0}")]
	Driver(String),

	// Recorder errors.
	#[error("HAR export failed: {0}")]
	ExportFailed(String),

	#[error("recorder is not running")]
	NotRecording,

	// Hijack errors.
	#[error("invalid hijack pattern: {0}")]
	PatternInvalid(String),

	#[error("hijack router already stopped")]
	RouterStopped,

	// Bridge errors.
	#[error("bridge query timed out after {0}ms")]
	QueryTimeout(u64),

	#[error("bridge query failed: {0}")]
	QueryError(String),

	// Transport-adjacent errors surfaced by the engine.
	#[error("deadline exceeded")]
	DeadlineExceeded,

	#[error("operation cancelled")]
	Cancelled,
}

impl Error {
	/// Stable kebab-case code for the RPC error payload.
	pub fn code(&self) -> &'static str {
		match self {
			Error::SessionNotFound(_) => "session-not-found",
			Error::SessionGone => "session-gone",
			Error::SessionLimitExceeded(_) => "session-limit-exceeded",
			Error::LaunchFailed(_) => "launch-failed",
			Error::ConfigInvalid(_) => "config-invalid",
			Error::NavigationTimeout { .. } => "navigation-timeout",
			Error::NavigationFailed(_) => "navigation-failed",
			Error::SelectorNotFound(_) => "selector-not-found",
			Error::ElementNotInteractable(_) => "element-not-interactable",
			Error::ElementDetached(_) => "element-detached",
			Error::EvalFailed(_) => "eval-failed",
			Error::Driver(_) => "driver-error",
			Error::ExportFailed(_) => "export-failed",
			Error::NotRecording => "not-recording",
			Error::PatternInvalid(_) => "pattern-invalid",
			Error::RouterStopped => "router-already-stopped",
			Error::QueryTimeout(_) => "query-timeout",
			Error::QueryError(_) => "query-error",
			Error::DeadlineExceeded => "deadline-exceeded",
			Error::Cancelled => "cancelled",
		}
	}

	/// Returns true when the session can no longer serve any operation.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Error::SessionGone | Error::SessionNotFound(_))
	}
}

impl From<DriverError> for Error {
	fn from(err: DriverError) -> Self {
		match err {
			DriverError::Launch(msg) => Error::LaunchFailed(msg),
			DriverError::Closed(_) => Error::SessionGone,
			DriverError::Navigation(msg) => Error::NavigationFailed(msg),
			DriverError::Evaluate(msg) => Error::EvalFailed(msg),
			DriverError::NotFound(msg) => Error::SelectorNotFound(msg),
			other => Error::Driver(other.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_are_kebab_case() {
		assert_eq!(Error::SessionGone.code(), "session-gone");
		assert_eq!(Error::QueryTimeout(3000).code(), "query-timeout");
		assert_eq!(Error::RouterStopped.code(), "router-already-stopped");
	}

	#[test]
	fn driver_errors_fold_into_taxonomy() {
		assert!(matches!(Error::from(DriverError::Closed("x".into())), Error::SessionGone));
		assert!(matches!(Error::from(DriverError::Launch("x".into())), Error::LaunchFailed(_)));
		assert!(matches!(Error::from(DriverError::Protocol("x".into())), Error::Driver(_)));
	}
}
