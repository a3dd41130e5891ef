//! HAR 1.2 document model.
//!
//! The network recorder assembles these types from devtools events and
//! serializes them as the single top-level `log` object defined by the
//! HTTP Archive 1.2 specification. Field names follow the HAR wire format
//! (camelCase); optional fields absent from a transaction are omitted.

use serde::{Deserialize, Serialize};

/// Top-level HAR document: `{"log": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Har {
	pub log: HarLog,
}

/// The `log` object holding creator metadata and the entry list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
	/// Always `"1.2"`.
	pub version: String,
	pub creator: HarCreator,
	pub entries: Vec<HarEntry>,
}

/// Tool that produced the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
	pub name: String,
	pub version: String,
}

/// One completed HTTP transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
	/// RFC 3339 timestamp of the request start, millisecond precision.
	pub started_date_time: String,
	/// Total elapsed time in milliseconds (finalize − start).
	pub time: f64,
	pub request: HarRequest,
	pub response: HarResponse,
	/// HAR requires the object; the recorder has no cache visibility.
	pub cache: HarCache,
	pub timings: HarTimings,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub server_ip_address: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub connection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
	pub method: String,
	pub url: String,
	pub http_version: String,
	pub cookies: Vec<HarCookie>,
	pub headers: Vec<HarHeader>,
	pub query_string: Vec<HarQueryParam>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub post_data: Option<HarPostData>,
	/// -1 when the driver does not expose raw header bytes.
	pub headers_size: i64,
	pub body_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
	pub status: i64,
	pub status_text: String,
	pub http_version: String,
	pub cookies: Vec<HarCookie>,
	pub headers: Vec<HarHeader>,
	pub content: HarContent,
	#[serde(rename = "redirectURL")]
	pub redirect_url: String,
	pub headers_size: i64,
	pub body_size: i64,
}

/// Response body description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
	pub size: i64,
	pub mime_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	/// `"base64"` when `text` is not valid UTF-8 source bytes.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarCache {}

/// Phase timing breakdown in milliseconds. Phases the driver did not
/// measure are 0; `-1` never appears in Scout output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarTimings {
	pub blocked: f64,
	pub dns: f64,
	pub connect: f64,
	pub send: f64,
	pub wait: f64,
	pub receive: f64,
	pub ssl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarHeader {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarQueryParam {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCookie {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
	pub mime_type: String,
	pub text: String,
}

impl Har {
	/// Wraps finalized entries in a versioned log with creator metadata.
	pub fn new(creator_name: &str, creator_version: &str, entries: Vec<HarEntry>) -> Self {
		Self {
			log: HarLog {
				version: "1.2".to_string(),
				creator: HarCreator {
					name: creator_name.to_string(),
					version: creator_version.to_string(),
				},
				entries,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_entry() -> HarEntry {
		HarEntry {
			started_date_time: "2026-01-05T12:00:00.123Z".to_string(),
			time: 42.5,
			request: HarRequest {
				method: "GET".to_string(),
				url: "http://t/json?k=v".to_string(),
				http_version: "http/1.1".to_string(),
				cookies: vec![],
				headers: vec![HarHeader {
					name: "Accept".to_string(),
					value: "*/*".to_string(),
				}],
				query_string: vec![HarQueryParam {
					name: "k".to_string(),
					value: "v".to_string(),
				}],
				post_data: None,
				headers_size: -1,
				body_size: 0,
			},
			response: HarResponse {
				status: 200,
				status_text: "OK".to_string(),
				http_version: "http/1.1".to_string(),
				cookies: vec![],
				headers: vec![],
				content: HarContent {
					size: 9,
					mime_type: "application/json".to_string(),
					text: Some("{\"k\":\"v\"}".to_string()),
					encoding: None,
				},
				redirect_url: String::new(),
				headers_size: -1,
				body_size: 9,
			},
			cache: HarCache::default(),
			timings: HarTimings {
				wait: 30.0,
				receive: 12.5,
				..HarTimings::default()
			},
			server_ip_address: Some("127.0.0.1".to_string()),
			connection: None,
		}
	}

	#[test]
	fn har_serializes_with_version_and_camel_case() {
		let har = Har::new("scout", "0.4.0", vec![sample_entry()]);
		let json = serde_json::to_value(&har).unwrap();

		assert_eq!(json["log"]["version"], "1.2");
		assert_eq!(json["log"]["creator"]["name"], "scout");
		let entry = &json["log"]["entries"][0];
		assert_eq!(entry["startedDateTime"], "2026-01-05T12:00:00.123Z");
		assert_eq!(entry["request"]["queryString"][0]["name"], "k");
		assert_eq!(entry["response"]["content"]["mimeType"], "application/json");
		assert_eq!(entry["response"]["redirectURL"], "");
	}

	#[test]
	fn har_omits_absent_optionals() {
		let har = Har::new("scout", "0.4.0", vec![sample_entry()]);
		let json = serde_json::to_value(&har).unwrap();
		let entry = &json["log"]["entries"][0];

		assert!(entry["request"].get("postData").is_none());
		assert!(entry["response"]["content"].get("encoding").is_none());
		assert!(entry.get("connection").is_none());
	}

	#[test]
	fn har_round_trips() {
		let har = Har::new("scout", "0.4.0", vec![sample_entry()]);
		let json = serde_json::to_string(&har).unwrap();
		let back: Har = serde_json::from_str(&json).unwrap();
		assert_eq!(back.log.entries.len(), 1);
		assert_eq!(back.log.entries[0].response.status, 200);
	}
}
