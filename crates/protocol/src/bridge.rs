//! Bridge message envelope.
//!
//! The bridge gives host code a typed channel to content scripts running
//! inside a page. Every message in either direction is one JSON envelope:
//! a type string, an opaque payload, a timestamp, and (for queries) a
//! correlation ID echoed verbatim by the responder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type the page sends when its content script is ready.
pub const BRIDGE_READY_TYPE: &str = "__bridge_ready";
/// Message type carrying the answer to a correlated query.
pub const QUERY_RESPONSE_TYPE: &str = "__query_response";
/// Host-to-page request to start a DOM mutation observer.
pub const OBSERVE_MUTATIONS_TYPE: &str = "__observe_mutations";
/// Page-to-host batches emitted by an active mutation observer.
pub const MUTATION_TYPE: &str = "mutation";

/// Envelope for every bridge message, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEnvelope {
	/// Message type; dispatch key for event handlers.
	#[serde(rename = "type")]
	pub kind: String,
	/// Opaque structured payload.
	#[serde(default)]
	pub data: Value,
	/// Sender-side timestamp, milliseconds since the Unix epoch.
	#[serde(default)]
	pub ts: u64,
	/// Correlation ID; present on queries and their responses only.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
}

impl BridgeEnvelope {
	/// Fire-and-forget event envelope.
	pub fn event(kind: impl Into<String>, data: Value, ts: u64) -> Self {
		Self {
			kind: kind.into(),
			data,
			ts,
			id: None,
		}
	}

	/// Query envelope carrying a correlation ID.
	pub fn query(kind: impl Into<String>, data: Value, ts: u64, id: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			data,
			ts,
			id: Some(id.into()),
		}
	}
}

/// Payload shape of a `__query_response` message: the echoed correlation ID
/// plus either a result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponseData {
	pub id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn envelope_uses_type_on_the_wire() {
		let envelope = BridgeEnvelope::event("mutation", json!({"n": 3}), 99);
		let json = serde_json::to_value(&envelope).unwrap();
		assert_eq!(json["type"], "mutation");
		assert_eq!(json["data"]["n"], 3);
		assert!(json.get("id").is_none());
	}

	#[test]
	fn query_envelope_carries_id() {
		let envelope = BridgeEnvelope::query("echo-query", json!({"hello": "world"}), 1, "q-1");
		let json = serde_json::to_value(&envelope).unwrap();
		assert_eq!(json["id"], "q-1");
	}

	#[test]
	fn envelope_tolerates_missing_fields() {
		let envelope: BridgeEnvelope = serde_json::from_str(r#"{"type":"__bridge_ready"}"#).unwrap();
		assert_eq!(envelope.kind, BRIDGE_READY_TYPE);
		assert_eq!(envelope.data, Value::Null);
		assert!(envelope.id.is_none());
	}

	#[test]
	fn query_response_data_round_trips() {
		let data = QueryResponseData {
			id: "q-2".to_string(),
			result: Some(json!({"ok": true})),
			error: None,
		};
		let back: QueryResponseData = serde_json::from_str(&serde_json::to_string(&data).unwrap()).unwrap();
		assert_eq!(back.id, "q-2");
		assert!(back.error.is_none());
	}
}
