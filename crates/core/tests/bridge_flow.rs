//! Bridge messaging through a full session against the mock driver.

mod support;

use std::time::Duration;

use scout_core::{BINDING_NAME, Error, NavigateOptions};
use scout_driver::DriverEvent;
use scout_driver::testing::MockPage;
use scout_protocol::BridgeEnvelope;
use serde_json::json;
use std::sync::Arc;
use support::{manager_with_mock, options_with_url, seed_test_site};

/// Recovers the envelope from the dispatch script the bridge evaluated.
fn dispatched_envelopes(page: &MockPage) -> Vec<BridgeEnvelope> {
	page.evaluated()
		.iter()
		.filter_map(|script| {
			let detail = script
				.strip_prefix("window.dispatchEvent(new CustomEvent('__scout_message', { detail: ")?
				.strip_suffix(" }))")?;
			serde_json::from_str(detail).ok()
		})
		.collect()
}

fn answer_query(page: &Arc<MockPage>, envelope: &BridgeEnvelope, result: serde_json::Value) {
	let id = envelope.id.clone().expect("query envelope has id");
	let payload = json!({
		"type": "__query_response",
		"data": { "id": id, "result": result },
		"ts": 1,
	});
	page.emit(DriverEvent::BindingCalled {
		name: BINDING_NAME.to_string(),
		payload: payload.to_string(),
	});
}

#[tokio::test]
async fn query_echo_round_trip() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let page = launcher.last_page().unwrap();

	let session_for_query = Arc::clone(&session);
	let query = tokio::spawn(async move {
		session_for_query
			.bridge_query("echo-query", json!({"hello": "world"}), Duration::from_secs(3))
			.await
	});

	// Wait for the query envelope to hit the page, then echo it back.
	let envelope = loop {
		let envelopes = dispatched_envelopes(&page);
		if let Some(envelope) = envelopes.into_iter().find(|e| e.kind == "echo-query") {
			break envelope;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	};
	assert_eq!(envelope.data, json!({"hello": "world"}));
	answer_query(&page, &envelope, envelope.data.clone());

	let result = query.await.unwrap().unwrap();
	assert_eq!(result, json!({"hello": "world"}));

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn query_timeout_discards_late_response() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let page = launcher.last_page().unwrap();

	let err = session
		.bridge_query("never-answered", json!({}), Duration::from_millis(100))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::QueryTimeout(100)));

	// A response arriving after the timeout is dropped quietly.
	let envelope = dispatched_envelopes(&page)
		.into_iter()
		.find(|e| e.kind == "never-answered")
		.expect("query was dispatched");
	answer_query(&page, &envelope, json!({"late": true}));
	tokio::time::sleep(Duration::from_millis(50)).await;

	// The bridge still serves fresh queries afterwards.
	let session_for_query = Arc::clone(&session);
	let query = tokio::spawn(async move {
		session_for_query.bridge_query("second", json!(1), Duration::from_secs(3)).await
	});
	let envelope = loop {
		if let Some(envelope) = dispatched_envelopes(&page).into_iter().find(|e| e.kind == "second") {
			break envelope;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	};
	answer_query(&page, &envelope, json!("ok"));
	assert_eq!(query.await.unwrap().unwrap(), json!("ok"));

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn query_error_field_maps_to_query_error() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let page = launcher.last_page().unwrap();

	let session_for_query = Arc::clone(&session);
	let query = tokio::spawn(async move {
		session_for_query.bridge_query("explode", json!({}), Duration::from_secs(3)).await
	});

	let envelope = loop {
		if let Some(envelope) = dispatched_envelopes(&page).into_iter().find(|e| e.kind == "explode") {
			break envelope;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	};
	let id = envelope.id.unwrap();
	page.emit(DriverEvent::BindingCalled {
		name: BINDING_NAME.to_string(),
		payload: json!({
			"type": "__query_response",
			"data": { "id": id, "error": "no such handler" },
		})
		.to_string(),
	});

	assert!(matches!(query.await.unwrap(), Err(Error::QueryError(message)) if message == "no such handler"));

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn readiness_tracks_documents() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let page = launcher.last_page().unwrap();

	// Install the bridge, then let the content script announce itself.
	session.bridge_send("warmup", json!({})).await.unwrap();
	assert!(!session.bridge_available().await);

	page.emit(DriverEvent::BindingCalled {
		name: BINDING_NAME.to_string(),
		payload: json!({"type": "__bridge_ready"}).to_string(),
	});
	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	while !session.bridge_available().await {
		assert!(tokio::time::Instant::now() < deadline);
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	// A navigation swaps the document and resets availability.
	session.navigate("http://t/json", NavigateOptions::default()).await.unwrap();
	assert!(!session.bridge_available().await);

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn bridge_installs_binding_and_init_script_once() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	session.bridge_send("a", json!(1)).await.unwrap();
	session.bridge_send("b", json!(2)).await.unwrap();

	let page = launcher.last_page().unwrap();
	assert_eq!(page.bindings(), vec![BINDING_NAME.to_string()]);
	assert_eq!(page.init_scripts().len(), 1);

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn observe_mutations_sends_the_observe_envelope() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	session.bridge_observe_mutations("#list").await.unwrap();

	let page = launcher.last_page().unwrap();
	let envelope = dispatched_envelopes(&page)
		.into_iter()
		.find(|e| e.kind == "__observe_mutations")
		.expect("observe envelope dispatched");
	assert_eq!(envelope.data, json!({"selector": "#list"}));

	let _ = manager.destroy(session.id()).await;
}
