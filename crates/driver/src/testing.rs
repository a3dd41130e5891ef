//! Scriptable in-memory driver for engine tests.
//!
//! [`MockLauncher`] stands in for a Chromium launcher: tests script documents
//! per URL, then drive the engine exactly as the daemon would. Navigating to
//! a scripted route synthesizes the devtools event sequence a real load
//! produces; with interception enabled, the route pauses first and the
//! applied disposition decides what flows afterwards. Every mutating call is
//! recorded for assertions, and [`MockPage::emit`] injects arbitrary events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
	BrowserDriver, DriverError, DriverEvent, EVENT_CHANNEL_CAPACITY, InterceptStages, Launcher, LifecycleKind, PageDriver, PausedRequest,
	Result,
};
use scout_protocol::{Cookie, PdfRequest, ScreenshotRequest, SessionOptions, WindowBoundsUpdate, WindowInfo, WindowState};

/// A scripted document served by the mock driver.
#[derive(Debug, Clone)]
pub struct MockDocument {
	pub title: String,
	pub body: String,
	pub mime: String,
	pub status: u16,
}

impl MockDocument {
	pub fn new(body: impl Into<String>) -> Self {
		Self {
			title: String::new(),
			body: body.into(),
			mime: "text/html".to_string(),
			status: 200,
		}
	}

	pub fn title(mut self, title: impl Into<String>) -> Self {
		self.title = title.into();
		self
	}

	pub fn mime(mut self, mime: impl Into<String>) -> Self {
		self.mime = mime.into();
		self
	}

	pub fn status(mut self, status: u16) -> Self {
		self.status = status;
		self
	}
}

/// A disposition the engine applied to a paused request.
#[derive(Debug, Clone, PartialEq)]
pub enum MockDisposition {
	Continued { interception_id: String },
	Fulfilled { interception_id: String, status: u16, body: Vec<u8> },
	Failed { interception_id: String, reason: String },
}

#[derive(Default)]
struct SharedRoutes {
	routes: Mutex<HashMap<String, MockDocument>>,
}

/// Launcher double. Script routes before creating sessions; retrieve pages
/// afterwards to inject events and inspect recorded calls.
#[derive(Default)]
pub struct MockLauncher {
	shared: Arc<SharedRoutes>,
	browsers: Mutex<Vec<Arc<MockBrowser>>>,
	fail_next: AtomicBool,
	launches: AtomicU64,
}

impl MockLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Scripts the document served at `url`.
	pub fn route(&self, url: impl Into<String>, document: MockDocument) {
		self.shared.routes.lock().insert(url.into(), document);
	}

	/// Makes the next `launch` fail with a launch error.
	pub fn fail_next_launch(&self) {
		self.fail_next.store(true, Ordering::SeqCst);
	}

	pub fn launch_count(&self) -> u64 {
		self.launches.load(Ordering::SeqCst)
	}

	pub fn browser(&self, index: usize) -> Option<Arc<MockBrowser>> {
		self.browsers.lock().get(index).cloned()
	}

	/// The most recently opened page across all browsers.
	pub fn last_page(&self) -> Option<Arc<MockPage>> {
		self.browsers.lock().iter().rev().find_map(|b| b.last_page())
	}
}

#[async_trait]
impl Launcher for MockLauncher {
	async fn launch(&self, _options: &SessionOptions) -> Result<Arc<dyn BrowserDriver>> {
		if self.fail_next.swap(false, Ordering::SeqCst) {
			return Err(DriverError::Launch("mock launch failure".to_string()));
		}
		self.launches.fetch_add(1, Ordering::SeqCst);
		let browser = Arc::new(MockBrowser {
			shared: Arc::clone(&self.shared),
			pages: Mutex::new(Vec::new()),
			alive: AtomicBool::new(true),
		});
		self.browsers.lock().push(Arc::clone(&browser));
		Ok(browser)
	}
}

/// Browser double: a bag of pages plus a liveness flag tests can flip.
pub struct MockBrowser {
	shared: Arc<SharedRoutes>,
	pages: Mutex<Vec<Arc<MockPage>>>,
	alive: AtomicBool,
}

impl MockBrowser {
	pub fn last_page(&self) -> Option<Arc<MockPage>> {
		self.pages.lock().last().cloned()
	}

	/// Simulates the browser process dying out from under the session.
	pub fn kill(&self) {
		self.alive.store(false, Ordering::SeqCst);
	}
}

#[async_trait]
impl BrowserDriver for MockBrowser {
	async fn open_page(&self, url: &str) -> Result<Arc<dyn PageDriver>> {
		if !self.is_alive() {
			return Err(DriverError::Closed("mock browser killed".to_string()));
		}
		let page = Arc::new(MockPage::new(Arc::clone(&self.shared)));
		if !url.is_empty() && url != "about:blank" {
			page.navigate(url).await?;
		}
		self.pages.lock().push(Arc::clone(&page));
		Ok(page)
	}

	fn is_alive(&self) -> bool {
		self.alive.load(Ordering::SeqCst)
	}

	async fn close(&self) -> Result<()> {
		self.alive.store(false, Ordering::SeqCst);
		Ok(())
	}
}

struct PageState {
	url: String,
	title: String,
	body: String,
	user_agent: Option<String>,
	extra_headers: Vec<(String, String)>,
	blocked_urls: Vec<String>,
	cookies: Vec<Cookie>,
	bindings: Vec<String>,
	init_scripts: Vec<String>,
	interception: Option<InterceptStages>,
	window: WindowInfo,
	closed: bool,
}

/// Page double. All state is inspectable; events are injectable.
pub struct MockPage {
	shared: Arc<SharedRoutes>,
	state: Mutex<PageState>,
	event_tx: mpsc::Sender<DriverEvent>,
	event_rx: Mutex<Option<mpsc::Receiver<DriverEvent>>>,
	eval_responses: Mutex<HashMap<String, Value>>,
	evaluated: Mutex<Vec<String>>,
	navigations: Mutex<Vec<String>>,
	dispositions: Mutex<Vec<MockDisposition>>,
	pending_paused: Mutex<HashMap<String, PausedRequest>>,
	response_bodies: Mutex<HashMap<String, Vec<u8>>>,
	paused_bodies: Mutex<HashMap<String, Vec<u8>>>,
	next_request: AtomicU64,
	clock_ms: AtomicU64,
}

impl MockPage {
	fn new(shared: Arc<SharedRoutes>) -> Self {
		let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
		Self {
			shared,
			state: Mutex::new(PageState {
				url: "about:blank".to_string(),
				title: String::new(),
				body: String::new(),
				user_agent: None,
				extra_headers: Vec::new(),
				blocked_urls: Vec::new(),
				cookies: Vec::new(),
				bindings: Vec::new(),
				init_scripts: Vec::new(),
				interception: None,
				window: WindowInfo {
					left: 0,
					top: 0,
					width: 1280,
					height: 720,
					state: WindowState::Normal,
				},
				closed: false,
			}),
			event_tx,
			event_rx: Mutex::new(Some(event_rx)),
			eval_responses: Mutex::new(HashMap::new()),
			evaluated: Mutex::new(Vec::new()),
			navigations: Mutex::new(Vec::new()),
			dispositions: Mutex::new(Vec::new()),
			pending_paused: Mutex::new(HashMap::new()),
			response_bodies: Mutex::new(HashMap::new()),
			paused_bodies: Mutex::new(HashMap::new()),
			next_request: AtomicU64::new(1),
			clock_ms: AtomicU64::new(1_000),
		}
	}

	/// Injects a raw driver event into the page's stream.
	pub fn emit(&self, event: DriverEvent) {
		let _ = self.event_tx.try_send(event);
	}

	/// Scripts the result of evaluating exactly `expression`.
	pub fn script_eval(&self, expression: impl Into<String>, result: Value) {
		self.eval_responses.lock().insert(expression.into(), result);
	}

	/// Seeds a response body for `response_body` lookups.
	pub fn script_response_body(&self, request_id: impl Into<String>, body: impl Into<Vec<u8>>) {
		self.response_bodies.lock().insert(request_id.into(), body.into());
	}

	/// Seeds a body for response-stage `paused_response_body` lookups.
	pub fn script_paused_body(&self, interception_id: impl Into<String>, body: impl Into<Vec<u8>>) {
		self.paused_bodies.lock().insert(interception_id.into(), body.into());
	}

	pub fn dispositions(&self) -> Vec<MockDisposition> {
		self.dispositions.lock().clone()
	}

	pub fn navigations(&self) -> Vec<String> {
		self.navigations.lock().clone()
	}

	pub fn evaluated(&self) -> Vec<String> {
		self.evaluated.lock().clone()
	}

	pub fn extra_headers(&self) -> Vec<(String, String)> {
		self.state.lock().extra_headers.clone()
	}

	pub fn user_agent(&self) -> Option<String> {
		self.state.lock().user_agent.clone()
	}

	pub fn blocked_urls(&self) -> Vec<String> {
		self.state.lock().blocked_urls.clone()
	}

	pub fn bindings(&self) -> Vec<String> {
		self.state.lock().bindings.clone()
	}

	pub fn init_scripts(&self) -> Vec<String> {
		self.state.lock().init_scripts.clone()
	}

	pub fn interception(&self) -> Option<InterceptStages> {
		self.state.lock().interception
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	fn now_ms(&self) -> f64 {
		self.clock_ms.fetch_add(10, Ordering::SeqCst) as f64
	}

	fn next_request_id(&self) -> String {
		format!("req-{}", self.next_request.fetch_add(1, Ordering::SeqCst))
	}

	async fn send(&self, event: DriverEvent) {
		let _ = self.event_tx.send(event).await;
	}

	/// Emits the response half of a load: headers, completion, lifecycle.
	async fn emit_response_sequence(&self, request_id: &str, url: &str, status: u16, mime: &str, body: &[u8]) {
		self.response_bodies.lock().insert(request_id.to_string(), body.to_vec());
		self.send(DriverEvent::ResponseReceived {
			request_id: request_id.to_string(),
			url: url.to_string(),
			status,
			status_text: if status == 200 { "OK".to_string() } else { String::new() },
			http_version: "http/1.1".to_string(),
			headers: vec![("content-type".to_string(), mime.to_string())],
			mime_type: mime.to_string(),
			remote_ip: Some("127.0.0.1".to_string()),
			timing: None,
			monotonic_ms: self.now_ms(),
		})
		.await;
		self.send(DriverEvent::LoadingFinished {
			request_id: request_id.to_string(),
			encoded_length: body.len() as i64,
			monotonic_ms: self.now_ms(),
		})
		.await;
		self.send(DriverEvent::Lifecycle {
			kind: LifecycleKind::DomContentLoaded,
			url: url.to_string(),
		})
		.await;
		self.send(DriverEvent::Lifecycle {
			kind: LifecycleKind::Load,
			url: url.to_string(),
		})
		.await;
	}
}

#[async_trait]
impl PageDriver for MockPage {
	async fn navigate(&self, url: &str) -> Result<()> {
		if self.state.lock().closed {
			return Err(DriverError::Closed("mock page closed".to_string()));
		}
		self.navigations.lock().push(url.to_string());

		let document = self.shared.routes.lock().get(url).cloned();
		let intercepting = self.state.lock().interception.is_some_and(|s| s.request);
		{
			let mut state = self.state.lock();
			state.url = url.to_string();
			if let Some(doc) = &document {
				state.title = doc.title.clone();
				state.body = doc.body.clone();
			}
		}

		let request_id = self.next_request_id();
		self.send(DriverEvent::Lifecycle {
			kind: LifecycleKind::Navigation,
			url: url.to_string(),
		})
		.await;
		self.send(DriverEvent::RequestWillBeSent {
			request_id: request_id.clone(),
			method: "GET".to_string(),
			url: url.to_string(),
			headers: Vec::new(),
			post_data: None,
			wall_time_ms: 1_700_000_000_000.0 + self.now_ms(),
			monotonic_ms: self.now_ms(),
		})
		.await;

		if intercepting {
			// Pause; the applied disposition drives the rest of the load.
			let interception_id = format!("int-{request_id}");
			let paused = PausedRequest {
				interception_id: interception_id.clone(),
				network_id: Some(request_id),
				url: url.to_string(),
				method: "GET".to_string(),
				headers: Vec::new(),
				post_data: None,
				resource_type: "Document".to_string(),
				response_status: None,
				response_headers: None,
			};
			self.pending_paused.lock().insert(interception_id, paused.clone());
			self.send(DriverEvent::RequestPaused(paused)).await;
			return Ok(());
		}

		let Some(doc) = document else {
			self.send(DriverEvent::LoadingFailed {
				request_id,
				error_text: "net::ERR_NAME_NOT_RESOLVED".to_string(),
				canceled: false,
				monotonic_ms: self.now_ms(),
			})
			.await;
			return Ok(());
		};
		self.emit_response_sequence(&request_id, url, doc.status, &doc.mime, doc.body.as_bytes()).await;
		Ok(())
	}

	async fn reload(&self) -> Result<()> {
		let url = self.state.lock().url.clone();
		self.navigate(&url).await
	}

	async fn back(&self) -> Result<()> {
		Ok(())
	}

	async fn forward(&self) -> Result<()> {
		Ok(())
	}

	async fn stop_loading(&self) -> Result<()> {
		Ok(())
	}

	async fn title(&self) -> Result<String> {
		Ok(self.state.lock().title.clone())
	}

	async fn url(&self) -> Result<String> {
		Ok(self.state.lock().url.clone())
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		self.evaluated.lock().push(expression.to_string());
		if let Some(value) = self.eval_responses.lock().get(expression) {
			return Ok(value.clone());
		}
		Ok(Value::Null)
	}

	async fn content(&self) -> Result<String> {
		Ok(self.state.lock().body.clone())
	}

	async fn screenshot(&self, _request: &ScreenshotRequest) -> Result<Vec<u8>> {
		Ok(b"mock-image".to_vec())
	}

	async fn pdf(&self, _request: &PdfRequest) -> Result<Vec<u8>> {
		Ok(b"%PDF-mock".to_vec())
	}

	async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()> {
		self.state.lock().extra_headers = headers.to_vec();
		Ok(())
	}

	async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
		self.state.lock().user_agent = Some(user_agent.to_string());
		Ok(())
	}

	async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
		self.state.lock().cookies.extend_from_slice(cookies);
		Ok(())
	}

	async fn cookies(&self) -> Result<Vec<Cookie>> {
		Ok(self.state.lock().cookies.clone())
	}

	async fn clear_cookies(&self) -> Result<()> {
		self.state.lock().cookies.clear();
		Ok(())
	}

	async fn set_blocked_urls(&self, patterns: &[String]) -> Result<()> {
		self.state.lock().blocked_urls = patterns.to_vec();
		Ok(())
	}

	async fn add_binding(&self, name: &str) -> Result<()> {
		self.state.lock().bindings.push(name.to_string());
		Ok(())
	}

	async fn add_init_script(&self, source: &str) -> Result<()> {
		self.state.lock().init_scripts.push(source.to_string());
		Ok(())
	}

	async fn set_file_input(&self, _selector: &str, _files: &[String]) -> Result<()> {
		Ok(())
	}

	async fn enable_interception(&self, stages: InterceptStages) -> Result<()> {
		self.state.lock().interception = Some(stages);
		Ok(())
	}

	async fn disable_interception(&self) -> Result<()> {
		self.state.lock().interception = None;
		Ok(())
	}

	async fn continue_request(&self, interception_id: &str, _headers: Option<&[(String, String)]>) -> Result<()> {
		self.dispositions.lock().push(MockDisposition::Continued {
			interception_id: interception_id.to_string(),
		});
		let paused = self.pending_paused.lock().remove(interception_id);
		if let Some(paused) = paused {
			if paused.is_response_stage() {
				return Ok(());
			}
			let document = self.shared.routes.lock().get(&paused.url).cloned();
			let request_id = paused.network_id.unwrap_or_else(|| self.next_request_id());
			match document {
				Some(doc) => {
					self.emit_response_sequence(&request_id, &paused.url, doc.status, &doc.mime, doc.body.as_bytes()).await;
				}
				None => {
					self.send(DriverEvent::LoadingFailed {
						request_id,
						error_text: "net::ERR_NAME_NOT_RESOLVED".to_string(),
						canceled: false,
						monotonic_ms: self.now_ms(),
					})
					.await;
				}
			}
		}
		Ok(())
	}

	async fn fulfill_request(&self, interception_id: &str, status: u16, headers: &[(String, String)], body: &[u8]) -> Result<()> {
		self.dispositions.lock().push(MockDisposition::Fulfilled {
			interception_id: interception_id.to_string(),
			status,
			body: body.to_vec(),
		});
		let paused = self.pending_paused.lock().remove(interception_id);
		if let Some(paused) = paused {
			let mime = headers
				.iter()
				.find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
				.map(|(_, value)| value.clone())
				.unwrap_or_else(|| "text/html".to_string());
			if paused.resource_type == "Document" {
				self.state.lock().body = String::from_utf8_lossy(body).into_owned();
			}
			let request_id = paused.network_id.unwrap_or_else(|| self.next_request_id());
			self.emit_response_sequence(&request_id, &paused.url, status, &mime, body).await;
		}
		Ok(())
	}

	async fn fail_request(&self, interception_id: &str, reason: &str) -> Result<()> {
		self.dispositions.lock().push(MockDisposition::Failed {
			interception_id: interception_id.to_string(),
			reason: reason.to_string(),
		});
		let paused = self.pending_paused.lock().remove(interception_id);
		if let Some(paused) = paused {
			let request_id = paused.network_id.unwrap_or_else(|| self.next_request_id());
			self.send(DriverEvent::LoadingFailed {
				request_id,
				error_text: reason.to_string(),
				canceled: false,
				monotonic_ms: self.now_ms(),
			})
			.await;
		}
		Ok(())
	}

	async fn paused_response_body(&self, interception_id: &str) -> Result<Vec<u8>> {
		self.paused_bodies
			.lock()
			.get(interception_id)
			.cloned()
			.ok_or_else(|| DriverError::NotFound(format!("paused body {interception_id}")))
	}

	async fn response_body(&self, request_id: &str) -> Result<Vec<u8>> {
		self.response_bodies
			.lock()
			.get(request_id)
			.cloned()
			.ok_or_else(|| DriverError::NotFound(format!("response body {request_id}")))
	}

	async fn window(&self) -> Result<WindowInfo> {
		Ok(self.state.lock().window.clone())
	}

	async fn set_window(&self, bounds: &WindowBoundsUpdate, state: Option<WindowState>) -> Result<()> {
		let mut guard = self.state.lock();
		if let Some(state) = state {
			guard.window.state = state;
			return Ok(());
		}
		if let Some(left) = bounds.left {
			guard.window.left = left;
		}
		if let Some(top) = bounds.top {
			guard.window.top = top;
		}
		if let Some(width) = bounds.width {
			guard.window.width = width;
		}
		if let Some(height) = bounds.height {
			guard.window.height = height;
		}
		Ok(())
	}

	fn take_event_stream(&self) -> Option<mpsc::Receiver<DriverEvent>> {
		self.event_rx.lock().take()
	}

	async fn close(&self) -> Result<()> {
		self.state.lock().closed = true;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn scripted_navigation_emits_full_sequence() {
		let launcher = MockLauncher::new();
		launcher.route("http://t/hello", MockDocument::new("<body>ok</body>").title("Hi"));

		let browser = launcher.launch(&SessionOptions::default()).await.unwrap();
		let page = browser.open_page("about:blank").await.unwrap();
		let mut events = page.take_event_stream().unwrap();

		page.navigate("http://t/hello").await.unwrap();
		assert_eq!(page.title().await.unwrap(), "Hi");

		let mut kinds = Vec::new();
		while let Ok(event) = events.try_recv() {
			kinds.push(std::mem::discriminant(&event));
			if matches!(event, DriverEvent::Lifecycle { kind: LifecycleKind::Load, .. }) {
				break;
			}
		}
		assert!(kinds.len() >= 4, "expected request/response/finished/lifecycle, got {}", kinds.len());
	}

	#[tokio::test]
	async fn interception_pauses_then_fulfill_completes() {
		let launcher = MockLauncher::new();
		launcher.route("http://t/json", MockDocument::new("{\"k\":\"v\"}").mime("application/json"));

		let browser = launcher.launch(&SessionOptions::default()).await.unwrap();
		let page = browser.open_page("about:blank").await.unwrap();
		let mut events = page.take_event_stream().unwrap();

		page.enable_interception(InterceptStages::REQUEST_ONLY).await.unwrap();
		page.navigate("http://t/json").await.unwrap();

		let paused = loop {
			match events.recv().await.unwrap() {
				DriverEvent::RequestPaused(paused) => break paused,
				_ => continue,
			}
		};
		page.fulfill_request(&paused.interception_id, 200, &[], b"{\"hijacked\":true}").await.unwrap();

		let status = loop {
			match events.recv().await.unwrap() {
				DriverEvent::ResponseReceived { status, .. } => break status,
				_ => continue,
			}
		};
		assert_eq!(status, 200);
		assert!(page.content().await.unwrap().contains("hijacked"));
	}

	#[tokio::test]
	async fn failed_launch_when_scripted() {
		let launcher = MockLauncher::new();
		launcher.fail_next_launch();
		assert!(launcher.launch(&SessionOptions::default()).await.is_err());
		assert!(launcher.launch(&SessionOptions::default()).await.is_ok());
	}
}
