//! Recorder behavior through a full session against the mock driver.

mod support;

use std::time::Duration;

use scout_core::{Error, NavigateOptions, RecorderOptions};
use scout_driver::DriverEvent;
use scout_protocol::{Har, SessionOptions};
use support::{manager_with_mock, seed_test_site};

fn recording_options() -> SessionOptions {
	SessionOptions {
		record: true,
		capture_body: true,
		..SessionOptions::default()
	}
}

#[tokio::test]
async fn recorded_navigation_exports_complete_entry() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(recording_options()).await.unwrap();
	session.navigate("http://t/json", NavigateOptions::default()).await.unwrap();

	let (bytes, count) = session.export_har().unwrap();
	assert_eq!(count, 1);

	let har: Har = serde_json::from_slice(&bytes).unwrap();
	assert_eq!(har.log.version, "1.2");
	let entry = &har.log.entries[0];
	assert_eq!(entry.request.method, "GET");
	assert_eq!(entry.request.url, "http://t/json");
	assert_eq!(entry.response.status, 200);
	assert_eq!(entry.response.content.mime_type, "application/json");
	assert_eq!(entry.response.content.text.as_deref(), Some("{\"k\":\"v\"}"));
	assert!(entry.time >= 0.0);

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn pending_requests_are_absent_from_export() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(recording_options()).await.unwrap();
	session.navigate("http://t/json", NavigateOptions::default()).await.unwrap();

	// A request that never finishes stays pending and must not export.
	let page = launcher.last_page().unwrap();
	page.emit(DriverEvent::RequestWillBeSent {
		request_id: "dangling-1".to_string(),
		method: "GET".to_string(),
		url: "http://t/slow".to_string(),
		headers: Vec::new(),
		post_data: None,
		wall_time_ms: 1_700_000_000_000.0,
		monotonic_ms: 99_000.0,
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	let (bytes, count) = session.export_har().unwrap();
	assert_eq!(count, 1);
	let har: Har = serde_json::from_slice(&bytes).unwrap();
	assert!(har.log.entries.iter().all(|e| e.request.url != "http://t/slow"));

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn orphan_events_without_request_start_are_dropped() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(recording_options()).await.unwrap();
	let page = launcher.last_page().unwrap();

	// Response and completion for an ID the recorder never saw start.
	page.emit(DriverEvent::ResponseReceived {
		request_id: "ghost".to_string(),
		url: "http://t/ghost".to_string(),
		status: 200,
		status_text: "OK".to_string(),
		http_version: "http/1.1".to_string(),
		headers: Vec::new(),
		mime_type: "text/plain".to_string(),
		remote_ip: None,
		timing: None,
		monotonic_ms: 1.0,
	});
	page.emit(DriverEvent::LoadingFinished {
		request_id: "ghost".to_string(),
		encoded_length: 10,
		monotonic_ms: 2.0,
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	let (_, count) = session.export_har().unwrap();
	assert_eq!(count, 0);

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn failed_loads_finalize_with_error_content() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(recording_options()).await.unwrap();
	// Unscripted URL: the mock fails the load.
	let _ = session.navigate("http://t/missing", NavigateOptions { timeout: Duration::from_millis(200), ..NavigateOptions::default() }).await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	let (bytes, count) = session.export_har().unwrap();
	assert_eq!(count, 1);
	let har: Har = serde_json::from_slice(&bytes).unwrap();
	let entry = &har.log.entries[0];
	assert_eq!(entry.response.status, 0);
	assert_eq!(entry.response.content.mime_type, "x-unknown");
	assert!(entry.response.status_text.contains("ERR_NAME_NOT_RESOLVED"));

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn clear_resets_and_recording_resumes() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(recording_options()).await.unwrap();
	session.navigate("http://t/json", NavigateOptions::default()).await.unwrap();
	assert_eq!(session.export_har().unwrap().1, 1);

	session.clear_recorder().unwrap();
	assert_eq!(session.export_har().unwrap().1, 0);

	session.navigate("http://t/hello", NavigateOptions::default()).await.unwrap();
	let (bytes, count) = session.export_har().unwrap();
	assert_eq!(count, 1);
	let har: Har = serde_json::from_slice(&bytes).unwrap();
	assert_eq!(har.log.entries[0].request.url, "http://t/hello");

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn stopped_recorder_exports_but_rejects_mutation() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(recording_options()).await.unwrap();
	session.navigate("http://t/json", NavigateOptions::default()).await.unwrap();

	session.stop_recorder().unwrap();
	assert!(matches!(session.clear_recorder(), Err(Error::NotRecording)));
	assert_eq!(session.export_har().unwrap().1, 1);

	// Traffic after stop is not recorded.
	session.navigate("http://t/hello", NavigateOptions::default()).await.unwrap();
	assert_eq!(session.export_har().unwrap().1, 1);

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn recorder_can_start_after_session_creation() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(SessionOptions::default()).await.unwrap();
	assert!(matches!(session.export_har(), Err(Error::NotRecording)));

	session.start_recorder(RecorderOptions { capture_body: false }).unwrap();
	session.navigate("http://t/json", NavigateOptions::default()).await.unwrap();

	let (bytes, count) = session.export_har().unwrap();
	assert_eq!(count, 1);
	let har: Har = serde_json::from_slice(&bytes).unwrap();
	// Without body capture the content text is absent but sized.
	assert!(har.log.entries[0].response.content.text.is_none());

	let _ = manager.destroy(session.id()).await;
}
