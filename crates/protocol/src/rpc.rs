//! Request/response payload types for the Scout RPC surface.
//!
//! Binary payloads (screenshots, PDFs, HAR archives) travel base64-encoded
//! inside JSON-RPC; the [`b64`] serde helper keeps them `Vec<u8>` in memory.

use serde::{Deserialize, Serialize};

use crate::session::SessionMeta;

/// Base64 codec for `Vec<u8>` fields.
pub mod b64 {
	use base64::Engine;
	use base64::engine::general_purpose::STANDARD;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&STANDARD.encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let text = String::deserialize(deserializer)?;
		STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
	}
}

/// Result of `session_create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResult {
	pub session_id: String,
	pub url: String,
	pub title: String,
}

/// Result of `session_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResult {
	pub sessions: Vec<SessionMeta>,
}

/// Current page coordinates after a navigation-family call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
	pub url: String,
	pub title: String,
}

/// Type tag for an evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalKind {
	String,
	Int,
	Float,
	Bool,
	Null,
	Json,
}

/// Typed result of `page_eval`: the tag plus the JSON-encoded value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
	pub kind: EvalKind,
	pub json: String,
}

impl EvalResult {
	/// Classifies a JSON value into the typed result the RPC returns.
	pub fn from_value(value: &serde_json::Value) -> Self {
		let kind = match value {
			serde_json::Value::Null => EvalKind::Null,
			serde_json::Value::Bool(_) => EvalKind::Bool,
			serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => EvalKind::Int,
			serde_json::Value::Number(_) => EvalKind::Float,
			serde_json::Value::String(_) => EvalKind::String,
			_ => EvalKind::Json,
		};
		Self {
			kind,
			json: value.to_string(),
		}
	}
}

/// Screenshot image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
	#[default]
	Png,
	Jpeg,
}

/// Parameters for `page_screenshot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenshotRequest {
	/// Capture the full scrollable page rather than the viewport.
	#[serde(default)]
	pub full_page: bool,
	#[serde(default)]
	pub format: ImageFormat,
	/// Restrict the capture to the first element matching this selector.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	/// JPEG quality 0-100; ignored for PNG.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quality: Option<u8>,
}

/// Result of `page_screenshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotResult {
	#[serde(with = "b64")]
	pub data: Vec<u8>,
}

/// Parameters for `page_pdf`. All fields optional; defaults follow the
/// driver's print defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub landscape: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub print_background: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scale: Option<f64>,
	/// Inches.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paper_width: Option<f64>,
	/// Inches.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paper_height: Option<f64>,
}

/// Result of `page_pdf`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfResult {
	#[serde(with = "b64")]
	pub data: Vec<u8>,
}

/// Result of `recorder_export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportHarResult {
	/// Serialized HAR 1.2 document.
	#[serde(with = "b64")]
	pub har: Vec<u8>,
	pub entry_count: usize,
}

/// Declarative disposition a remote client attaches to a hijack pattern.
/// Remote clients cannot ship handler closures; these rules compile into
/// handlers inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HijackRule {
	/// Answer with the supplied response; no upstream traffic.
	Fulfill {
		status: u16,
		#[serde(default)]
		headers: Vec<(String, String)>,
		/// Response body; base64-decoded first when `body_base64` is set.
		#[serde(default)]
		body: String,
		#[serde(default)]
		body_base64: bool,
	},
	/// Abort with a driver-recognized error reason (e.g. `"blocked"`).
	Fail { reason: String },
	/// Forward upstream, optionally overriding request headers.
	Continue {
		#[serde(default)]
		set_headers: Vec<(String, String)>,
	},
	/// Forward upstream, then rewrite the response before it reaches the page.
	ModifyResponse {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		set_status: Option<u16>,
		#[serde(default)]
		set_headers: Vec<(String, String)>,
		/// Replacement body; the upstream body is kept when absent.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		body: Option<String>,
	},
}

/// Result of `hijack_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HijackStartResult {
	pub router_id: u64,
}

/// Browser window placement and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfo {
	pub left: i32,
	pub top: i32,
	pub width: u32,
	pub height: u32,
	pub state: WindowState,
}

/// Window display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
	#[default]
	Normal,
	Minimized,
	Maximized,
	Fullscreen,
}

/// Partial bounds update for `window_set`. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowBoundsUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub left: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub width: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub height: Option<u32>,
}

/// Which web storage a storage RPC targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
	Local,
	Session,
}

/// Result of `bridge_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeQueryResult {
	pub result: serde_json::Value,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn b64_round_trips_bytes() {
		let result = ScreenshotResult {
			data: vec![0x89, b'P', b'N', b'G', 0x00, 0xff],
		};
		let json = serde_json::to_string(&result).unwrap();
		assert!(json.contains("iVBOR") || json.contains("\"data\""));
		let back: ScreenshotResult = serde_json::from_str(&json).unwrap();
		assert_eq!(back.data, result.data);
	}

	#[test]
	fn eval_result_classifies_values() {
		assert_eq!(EvalResult::from_value(&json!(null)).kind, EvalKind::Null);
		assert_eq!(EvalResult::from_value(&json!(true)).kind, EvalKind::Bool);
		assert_eq!(EvalResult::from_value(&json!(3)).kind, EvalKind::Int);
		assert_eq!(EvalResult::from_value(&json!(3.5)).kind, EvalKind::Float);
		assert_eq!(EvalResult::from_value(&json!("hi")).kind, EvalKind::String);
		assert_eq!(EvalResult::from_value(&json!({"a": 1})).kind, EvalKind::Json);
		assert_eq!(EvalResult::from_value(&json!({"a": 1})).json, "{\"a\":1}");
	}

	#[test]
	fn hijack_rule_tagged_by_action() {
		let rule: HijackRule = serde_json::from_value(json!({
			"action": "fulfill",
			"status": 200,
			"body": "{\"hijacked\":true}",
		}))
		.unwrap();
		match rule {
			HijackRule::Fulfill { status, body, body_base64, .. } => {
				assert_eq!(status, 200);
				assert!(body.contains("hijacked"));
				assert!(!body_base64);
			}
			other => panic!("unexpected rule: {other:?}"),
		}
	}

	#[test]
	fn window_state_lowercase() {
		assert_eq!(serde_json::to_string(&WindowState::Fullscreen).unwrap(), "\"fullscreen\"");
	}
}
