//! End-to-end RPC tests: a real jsonrpsee server over the session engine,
//! driven by the generated client, with the mock driver underneath.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use scout_core::SessionManager;
use scout_daemon::rpc::{ScoutRpcClient, ScoutRpcServer};
use scout_daemon::server::ScoutRpcHandler;
use scout_driver::Launcher;
use scout_driver::testing::{MockDocument, MockLauncher};
use scout_protocol::{BrowserEventPayload, Har, HijackRule, SessionOptions};
use tokio::sync::watch;

async fn spawn_daemon() -> (Arc<MockLauncher>, WsClient, ServerHandle) {
	let launcher = Arc::new(MockLauncher::new());
	launcher.route("http://t/hello", MockDocument::new("<title>Hi</title><body>ok</body>").title("Hi"));
	launcher.route("http://t/json", MockDocument::new("{\"k\":\"v\"}").mime("application/json").title("json"));
	launcher.route("http://t/echo-headers", MockDocument::new("<body>h</body>").title("echo"));

	let manager = SessionManager::new(Arc::clone(&launcher) as Arc<dyn Launcher>, 0);
	let (shutdown_tx, _shutdown_rx) = watch::channel(false);
	let handler = ScoutRpcHandler::new(manager, shutdown_tx);

	let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
	let addr: SocketAddr = server.local_addr().unwrap();
	let handle = server.start(handler.into_rpc());

	let client = WsClientBuilder::default().build(format!("ws://{addr}")).await.unwrap();
	(launcher, client, handle)
}

fn options_with_url(url: &str) -> SessionOptions {
	SessionOptions {
		initial_url: url.to_string(),
		..SessionOptions::default()
	}
}

#[tokio::test]
async fn ping_round_trips() {
	let (_launcher, client, handle) = spawn_daemon().await;
	assert!(client.ping().await.unwrap());
	let _ = handle.stop();
}

#[tokio::test]
async fn create_navigate_title_over_rpc() {
	let (_launcher, client, handle) = spawn_daemon().await;

	let created = client.session_create(options_with_url("http://t/hello")).await.unwrap();
	assert_eq!(created.title, "Hi");
	assert_eq!(created.url, "http://t/hello");

	assert_eq!(client.get_title(created.session_id.clone()).await.unwrap(), "Hi");

	let listed = client.session_list().await.unwrap();
	assert_eq!(listed.sessions.len(), 1);
	assert_eq!(listed.sessions[0].id, created.session_id);

	client.session_destroy(created.session_id).await.unwrap();
	let _ = handle.stop();
}

#[tokio::test]
async fn record_and_export_har_over_rpc() {
	let (_launcher, client, handle) = spawn_daemon().await;

	let options = SessionOptions {
		record: true,
		capture_body: true,
		..SessionOptions::default()
	};
	let created = client.session_create(options).await.unwrap();
	let id = created.session_id;

	client.navigate(id.clone(), "http://t/json".to_string(), false, None).await.unwrap();

	let exported = client.recorder_export(id.clone()).await.unwrap();
	assert!(exported.entry_count >= 1);

	let har: Har = serde_json::from_slice(&exported.har).unwrap();
	let entry = har.log.entries.iter().find(|e| e.request.url == "http://t/json").expect("entry for /json");
	assert_eq!(entry.response.status, 200);
	assert_eq!(entry.response.content.mime_type, "application/json");
	assert_eq!(entry.response.content.text.as_deref(), Some("{\"k\":\"v\"}"));

	client.recorder_clear(id.clone()).await.unwrap();
	assert_eq!(client.recorder_export(id.clone()).await.unwrap().entry_count, 0);

	client.session_destroy(id).await.unwrap();
	let _ = handle.stop();
}

#[tokio::test]
async fn hijack_fulfill_over_rpc() {
	let (launcher, client, handle) = spawn_daemon().await;

	let created = client.session_create(SessionOptions::default()).await.unwrap();
	let id = created.session_id;

	let rule = HijackRule::Fulfill {
		status: 200,
		headers: vec![("content-type".to_string(), "application/json".to_string())],
		body: "{\"hijacked\":true}".to_string(),
		body_base64: false,
	};
	let started = client.hijack_start(id.clone(), "*json*".to_string(), rule).await.unwrap();
	assert!(started.router_id > 0);

	client.navigate(id.clone(), "http://t/json".to_string(), false, None).await.unwrap();
	assert!(client.content(id.clone()).await.unwrap().contains("hijacked"));

	let page = launcher.last_page().unwrap();
	assert!(!page.dispositions().is_empty());

	client.hijack_stop(id.clone(), started.router_id).await.unwrap();
	client.session_destroy(id).await.unwrap();
	let _ = handle.stop();
}

#[tokio::test]
async fn event_stream_over_rpc() {
	let (_launcher, client, handle) = spawn_daemon().await;

	let created = client.session_create(SessionOptions::default()).await.unwrap();
	let id = created.session_id;

	let mut subscription = client.subscribe_events(id.clone()).await.unwrap();
	client.navigate(id.clone(), "http://t/echo-headers".to_string(), false, None).await.unwrap();

	let mut saw_request = false;
	let mut saw_response = false;
	let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
	while !(saw_request && saw_response) {
		let next = tokio::time::timeout_at(deadline, subscription.next()).await.expect("event within 5s");
		let event = next.expect("stream open").expect("valid event");
		match event.payload {
			BrowserEventPayload::RequestSent { ref url, .. } if url.ends_with("/echo-headers") => saw_request = true,
			BrowserEventPayload::ResponseReceived { ref url, .. } if url.ends_with("/echo-headers") => saw_response = true,
			_ => {}
		}
	}

	client.session_destroy(id).await.unwrap();
	let _ = handle.stop();
}

#[tokio::test]
async fn destroy_is_idempotent_with_stable_error_codes() {
	let (_launcher, client, handle) = spawn_daemon().await;

	let created = client.session_create(SessionOptions::default()).await.unwrap();
	let id = created.session_id;

	client.session_destroy(id.clone()).await.unwrap();
	let err = client.session_destroy(id.clone()).await.unwrap_err();
	match err {
		jsonrpsee::core::ClientError::Call(object) => {
			assert_eq!(object.code(), -32001);
			let data: serde_json::Value = serde_json::from_str(object.data().unwrap().get()).unwrap();
			assert_eq!(data["code"], "session-not-found");
		}
		other => panic!("unexpected error: {other:?}"),
	}
	let _ = handle.stop();
}

#[tokio::test]
async fn recorder_errors_map_to_not_recording() {
	let (_launcher, client, handle) = spawn_daemon().await;

	let created = client.session_create(SessionOptions::default()).await.unwrap();
	let id = created.session_id;

	let err = client.recorder_export(id.clone()).await.unwrap_err();
	match err {
		jsonrpsee::core::ClientError::Call(object) => assert_eq!(object.code(), -32041),
		other => panic!("unexpected error: {other:?}"),
	}

	client.recorder_start(id.clone(), false).await.unwrap();
	assert_eq!(client.recorder_export(id.clone()).await.unwrap().entry_count, 0);

	client.session_destroy(id).await.unwrap();
	let _ = handle.stop();
}

#[tokio::test]
async fn eval_returns_typed_results() {
	let (launcher, client, handle) = spawn_daemon().await;

	let created = client.session_create(options_with_url("http://t/hello")).await.unwrap();
	let id = created.session_id;

	let page = launcher.last_page().unwrap();
	page.script_eval("1 + 2", serde_json::json!(3));

	let result = client.eval(id.clone(), "1 + 2".to_string()).await.unwrap();
	assert_eq!(result.kind, scout_protocol::EvalKind::Int);
	assert_eq!(result.json, "3");

	client.session_destroy(id).await.unwrap();
	let _ = handle.stop();
}
