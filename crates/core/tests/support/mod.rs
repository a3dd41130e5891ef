//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use scout_core::SessionManager;
use scout_driver::Launcher;
use scout_driver::testing::{MockDocument, MockLauncher};
use scout_protocol::SessionOptions;

pub fn manager_with_mock(max_sessions: usize) -> (Arc<SessionManager>, Arc<MockLauncher>) {
	let launcher = Arc::new(MockLauncher::new());
	let manager = SessionManager::new(Arc::clone(&launcher) as Arc<dyn Launcher>, max_sessions);
	(manager, launcher)
}

pub fn options_with_url(url: &str) -> SessionOptions {
	SessionOptions {
		initial_url: url.to_string(),
		..SessionOptions::default()
	}
}

pub fn seed_test_site(launcher: &MockLauncher) {
	launcher.route("http://t/hello", MockDocument::new("<title>Hi</title><body>ok</body>").title("Hi"));
	launcher.route("http://t/json", MockDocument::new("{\"k\":\"v\"}").mime("application/json").title("json"));
	launcher.route("http://t/echo-headers", MockDocument::new("<body>headers</body>").title("echo"));
	launcher.route("http://t/click", MockDocument::new("<button id=\"b\">go</button><div id=\"out\"></div>").title("click"));
}
