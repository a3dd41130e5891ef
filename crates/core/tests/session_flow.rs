//! Session lifecycle, interaction, and isolation against the mock driver.

mod support;

use std::time::Duration;

use scout_core::{Error, NavigateOptions, js};
use scout_driver::BrowserDriver;
use scout_protocol::{BrowserEventPayload, SessionOptions, StorageKind};
use serde_json::json;
use support::{manager_with_mock, options_with_url, seed_test_site};

#[tokio::test]
async fn create_navigate_title() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let meta = session.meta().await;
	assert_eq!(meta.title, "Hi");
	assert_eq!(meta.url, "http://t/hello");

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn click_then_read_back() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/click")).await.unwrap();
	let page = launcher.last_page().unwrap();
	page.script_eval(js::click("#b"), json!({"ok": true}));
	page.script_eval(js::get_text("#out"), json!({"ok": "done"}));

	session.click("#b").await.unwrap();
	assert_eq!(session.get_text("#out").await.unwrap(), "done");

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn missing_selector_maps_to_selector_not_found() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let page = launcher.last_page().unwrap();
	page.script_eval(js::click("#nope"), json!({"err": "not-found"}));
	page.script_eval(js::click("#disabled"), json!({"err": "not-interactable"}));

	assert!(matches!(session.click("#nope").await, Err(Error::SelectorNotFound(_))));
	assert!(matches!(session.click("#disabled").await, Err(Error::ElementNotInteractable(_))));

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn event_stream_carries_request_and_response() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(SessionOptions::default()).await.unwrap();
	let mut events = session.subscribe_events().unwrap();

	session.navigate("http://t/echo-headers", NavigateOptions::default()).await.unwrap();

	let mut saw_request = false;
	let mut saw_response = false;
	let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
	while !(saw_request && saw_response) {
		let event = tokio::time::timeout_at(deadline, events.recv()).await.expect("event within deadline").expect("stream open");
		match event.payload {
			BrowserEventPayload::RequestSent { ref url, .. } if url.ends_with("/echo-headers") => saw_request = true,
			BrowserEventPayload::ResponseReceived { ref url, .. } if url.ends_with("/echo-headers") => saw_response = true,
			_ => {}
		}
	}
	assert_eq!(events.gap_count(), 0);

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn wait_stable_returns_after_quiet_period() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(SessionOptions::default()).await.unwrap();
	let options = NavigateOptions {
		wait_stable: true,
		timeout: Duration::from_secs(5),
		quiet_period: Duration::from_millis(100),
	};
	session.navigate("http://t/hello", options).await.unwrap();
	assert_eq!(session.title().await.unwrap(), "Hi");

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn sessions_are_isolated() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let recording = SessionOptions {
		record: true,
		..SessionOptions::default()
	};
	let a = manager.create(recording.clone()).await.unwrap();
	let b = manager.create(recording).await.unwrap();

	let mut b_events = b.subscribe_events().unwrap();
	a.navigate("http://t/json", NavigateOptions::default()).await.unwrap();

	// B recorded nothing and saw no events from A's traffic.
	assert_eq!(a.export_har().unwrap().1, 1);
	assert_eq!(b.export_har().unwrap().1, 0);
	assert!(b_events.try_recv().is_none());

	// Distinct browser processes entirely.
	assert_eq!(launcher.launch_count(), 2);

	let _ = manager.destroy(a.id()).await;
	let _ = manager.destroy(b.id()).await;
}

#[tokio::test]
async fn destroy_is_idempotent_and_releases_resources() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let id = session.id().to_string();
	let page = launcher.last_page().unwrap();

	manager.destroy(&id).await.unwrap();
	assert!(page.is_closed());
	assert!(!launcher.browser(0).unwrap().is_alive());
	assert_eq!(manager.len(), 0);

	for _ in 0..3 {
		assert!(matches!(manager.destroy(&id).await, Err(Error::SessionNotFound(_))));
	}
}

#[tokio::test]
async fn session_cap_is_enforced() {
	let (manager, launcher) = manager_with_mock(1);
	seed_test_site(&launcher);

	let first = manager.create(SessionOptions::default()).await.unwrap();
	assert!(matches!(
		manager.create(SessionOptions::default()).await,
		Err(Error::SessionLimitExceeded(1))
	));

	manager.destroy(first.id()).await.unwrap();
	assert!(manager.create(SessionOptions::default()).await.is_ok());
}

#[tokio::test]
async fn dead_browser_reports_session_gone_then_not_found() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(SessionOptions::default()).await.unwrap();
	let id = session.id().to_string();

	launcher.browser(0).unwrap().kill();
	assert!(matches!(manager.lookup(&id), Err(Error::SessionGone)));
	// The terminated session was reaped; the ID no longer resolves.
	assert!(matches!(manager.lookup(&id), Err(Error::SessionNotFound(_))));
}

#[tokio::test]
async fn invalid_options_are_rejected_before_launch() {
	let (manager, launcher) = manager_with_mock(0);
	let options = SessionOptions {
		window_w: 0,
		..SessionOptions::default()
	};
	assert!(matches!(manager.create(options).await, Err(Error::ConfigInvalid(_))));
	assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test]
async fn launch_failure_surfaces_and_leaves_directory_empty() {
	let (manager, launcher) = manager_with_mock(0);
	launcher.fail_next_launch();

	assert!(matches!(manager.create(SessionOptions::default()).await, Err(Error::LaunchFailed(_))));
	assert!(manager.is_empty());
}

#[tokio::test]
async fn shutdown_destroys_all_sessions_within_deadline() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	for _ in 0..3 {
		manager.create(SessionOptions::default()).await.unwrap();
	}
	assert_eq!(manager.len(), 3);

	manager.shutdown(Duration::from_secs(5)).await;
	assert!(manager.is_empty());
	for i in 0..3 {
		assert!(!launcher.browser(i).unwrap().is_alive());
	}
}

#[tokio::test]
async fn destroy_ends_open_event_subscriptions() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let mut events = session.subscribe_events().unwrap();

	manager.destroy(session.id()).await.unwrap();

	// Whatever was queued drains, then the stream ends cleanly.
	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	loop {
		match tokio::time::timeout_at(deadline, events.recv()).await.expect("stream ends promptly") {
			Some(_) => continue,
			None => break,
		}
	}
	assert!(session.subscribe_events().is_err());
}

#[tokio::test]
async fn storage_and_headers_round_trip_through_the_driver() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(options_with_url("http://t/hello")).await.unwrap();
	let page = launcher.last_page().unwrap();
	page.script_eval(js::storage_get(true, "k"), json!({"ok": "v"}));

	session.storage_set(StorageKind::Local, "k", "v").await.unwrap();
	assert_eq!(session.storage_get(StorageKind::Local, "k").await.unwrap().as_deref(), Some("v"));

	let handle = session
		.set_headers(&[("x-scout".to_string(), "1".to_string())])
		.await
		.unwrap();
	assert_eq!(page.extra_headers(), vec![("x-scout".to_string(), "1".to_string())]);
	handle.clear().await.unwrap();
	assert!(page.extra_headers().is_empty());

	let _ = manager.destroy(session.id()).await;
}

#[tokio::test]
async fn window_transitions_insert_restore_between_non_normal_states() {
	let (manager, launcher) = manager_with_mock(0);
	seed_test_site(&launcher);

	let session = manager.create(SessionOptions::default()).await.unwrap();

	session.maximize().await.unwrap();
	assert_eq!(session.window().await.unwrap().state, scout_protocol::WindowState::Maximized);

	// Maximized → fullscreen passes through normal; the final state holds.
	session.fullscreen().await.unwrap();
	assert_eq!(session.window().await.unwrap().state, scout_protocol::WindowState::Fullscreen);

	session.restore().await.unwrap();
	assert_eq!(session.window().await.unwrap().state, scout_protocol::WindowState::Normal);

	let _ = manager.destroy(session.id()).await;
}
