//! Session configuration and metadata.

use serde::{Deserialize, Serialize};

/// Options for creating a session. This is the configuration snapshot the
/// session keeps for its lifetime; the daemon fills it from the
/// `session_create` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
	/// Launch the browser without a visible window.
	#[serde(default = "default_true")]
	pub headless: bool,
	/// Suppress common automation fingerprints (launch flags plus an
	/// injected masking script).
	#[serde(default)]
	pub stealth: bool,
	/// URL loaded before `session_create` returns. Empty means `about:blank`.
	#[serde(default)]
	pub initial_url: String,
	/// Start the network recorder with the session.
	#[serde(default)]
	pub record: bool,
	/// Capture response bodies while recording.
	#[serde(default)]
	pub capture_body: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	/// Proxy server URL handed to the browser process.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proxy: Option<String>,
	#[serde(default = "default_window_w")]
	pub window_w: u32,
	#[serde(default = "default_window_h")]
	pub window_h: u32,
	/// Profile directory; a scratch directory is provisioned when empty and
	/// removed with the session.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_data_dir: Option<String>,
	/// Extra browser launch flags, passed through verbatim.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub extra_args: Vec<String>,
	/// Unpacked extension directories to load.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub extensions: Vec<String>,
}

fn default_true() -> bool {
	true
}

fn default_window_w() -> u32 {
	1280
}

fn default_window_h() -> u32 {
	720
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			headless: true,
			stealth: false,
			initial_url: String::new(),
			record: false,
			capture_body: false,
			user_agent: None,
			proxy: None,
			window_w: default_window_w(),
			window_h: default_window_h(),
			user_data_dir: None,
			extra_args: Vec::new(),
			extensions: Vec::new(),
		}
	}
}

/// Minimal per-session metadata returned by `session_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
	pub id: String,
	/// Milliseconds since the Unix epoch.
	pub created_at_ms: u64,
	pub url: String,
	pub title: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn options_default_to_headless_viewport() {
		let opts = SessionOptions::default();
		assert!(opts.headless);
		assert!(!opts.stealth);
		assert_eq!((opts.window_w, opts.window_h), (1280, 720));
	}

	#[test]
	fn options_deserialize_from_sparse_json() {
		let opts: SessionOptions = serde_json::from_str(r#"{"initial_url":"http://t/hello"}"#).unwrap();
		assert!(opts.headless);
		assert_eq!(opts.initial_url, "http://t/hello");
		assert!(opts.extensions.is_empty());
	}
}
