//! Chromium implementation of the driver traits via `chromiumoxide`.
//!
//! One [`CdpBrowser`] owns one Chromium process and the spawned handler task
//! that pumps its websocket. [`CdpPage`] bridges the page's devtools event
//! listeners onto the single [`DriverEvent`] channel the engine consumes.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::browser::{Bounds, GetWindowForTargetParams, SetWindowBoundsParams, WindowState as CdpWindowState};
use chromiumoxide::cdp::browser_protocol::dom;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{self, EventRequestPaused, HeaderEntry, RequestPattern, RequestStage};
use chromiumoxide::cdp::browser_protocol::network::{
	self, CookieParam, CookieSameSite, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
	Headers, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
	self, CaptureScreenshotFormat, EventDomContentEventFired, EventFrameNavigated, EventFrameStoppedLoading, EventLoadEventFired,
	PrintToPdfParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{self, AddBindingParams, EventBindingCalled, EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::page::ScreenshotParams;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
	BrowserDriver, DriverError, DriverEvent, EVENT_CHANNEL_CAPACITY, InterceptStages, Launcher, LifecycleKind, PageDriver, PausedRequest,
	ResourceTiming, Result,
};
use scout_protocol::{Cookie, ImageFormat, PdfRequest, SameSite, ScreenshotRequest, SessionOptions, WindowBoundsUpdate, WindowInfo, WindowState};

/// Script injected into every new document when stealth mode is on.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
"#;

type EventStreamBox = Pin<Box<dyn Stream<Item = DriverEvent> + Send>>;

/// Launches Chromium processes through `chromiumoxide`.
#[derive(Debug, Default)]
pub struct CdpLauncher;

#[async_trait]
impl Launcher for CdpLauncher {
	async fn launch(&self, options: &SessionOptions) -> Result<Arc<dyn BrowserDriver>> {
		let config = build_config(options)?;
		let (browser, mut handler) = Browser::launch(config).await.map_err(|e| DriverError::Launch(e.to_string()))?;

		let alive = Arc::new(AtomicBool::new(true));
		let alive_flag = Arc::clone(&alive);
		tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if let Err(e) = event {
					tracing::debug!(target = "scout.driver", error = %e, "cdp handler error");
				}
			}
			// Handler stream ends when the browser process goes away.
			alive_flag.store(false, Ordering::SeqCst);
			tracing::debug!(target = "scout.driver", "cdp handler loop ended");
		});

		Ok(Arc::new(CdpBrowser {
			browser: tokio::sync::Mutex::new(Some(browser)),
			stealth: options.stealth,
			alive,
		}))
	}
}

fn build_config(options: &SessionOptions) -> Result<BrowserConfig> {
	let mut builder = BrowserConfig::builder()
		.headless_mode(if options.headless { HeadlessMode::New } else { HeadlessMode::False })
		.window_size(options.window_w, options.window_h)
		.no_sandbox()
		.arg("--disable-dev-shm-usage")
		.arg("--disable-gpu")
		.arg("--no-first-run");

	if options.stealth {
		builder = builder.arg("--disable-blink-features=AutomationControlled");
	}
	if let Some(proxy) = &options.proxy {
		builder = builder.arg(format!("--proxy-server={proxy}"));
	}
	if let Some(dir) = &options.user_data_dir {
		builder = builder.user_data_dir(dir);
	}
	if !options.extensions.is_empty() {
		let list = options.extensions.join(",");
		builder = builder.arg(format!("--disable-extensions-except={list}")).arg(format!("--load-extension={list}"));
	}
	for arg in &options.extra_args {
		builder = builder.arg(arg);
	}

	builder.build().map_err(DriverError::Launch)
}

/// One owned Chromium process.
pub struct CdpBrowser {
	browser: tokio::sync::Mutex<Option<Browser>>,
	stealth: bool,
	alive: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserDriver for CdpBrowser {
	async fn open_page(&self, url: &str) -> Result<Arc<dyn PageDriver>> {
		let guard = self.browser.lock().await;
		let browser = guard.as_ref().ok_or_else(|| DriverError::Closed("browser already closed".to_string()))?;
		let page = browser.new_page(url).await.map_err(|e| DriverError::Launch(e.to_string()))?;
		drop(guard);

		let cdp_page = CdpPage::attach(page).await?;
		if self.stealth {
			cdp_page.add_init_script(STEALTH_SCRIPT).await?;
		}
		Ok(Arc::new(cdp_page))
	}

	fn is_alive(&self) -> bool {
		self.alive.load(Ordering::SeqCst)
	}

	async fn close(&self) -> Result<()> {
		let mut guard = self.browser.lock().await;
		let Some(mut browser) = guard.take() else {
			return Ok(());
		};
		if let Err(e) = browser.close().await {
			tracing::debug!(target = "scout.driver", error = %e, "browser close error");
		}
		// Wait for the process to exit so no orphan survives the session.
		if let Err(e) = browser.wait().await {
			tracing::debug!(target = "scout.driver", error = %e, "browser wait error");
		}
		self.alive.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// One Chromium tab.
pub struct CdpPage {
	page: Page,
	events: Mutex<Option<mpsc::Receiver<DriverEvent>>>,
	current_url: Arc<Mutex<String>>,
}

impl CdpPage {
	/// Enables the devtools domains the engine relies on and starts the
	/// event fan-in task.
	pub async fn attach(page: Page) -> Result<Self> {
		page.execute(network::EnableParams::default()).await.map_err(proto)?;
		page.execute(page::EnableParams::default()).await.map_err(proto)?;
		page.execute(runtime::EnableParams::default()).await.map_err(proto)?;

		let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
		let current_url = Arc::new(Mutex::new(String::from("about:blank")));
		spawn_event_fan_in(&page, tx, Arc::clone(&current_url)).await?;

		Ok(Self {
			page,
			events: Mutex::new(Some(rx)),
			current_url,
		})
	}

	fn lifecycle_url(&self) -> String {
		self.current_url.lock().clone()
	}
}

/// Subscribes to every devtools event the engine consumes and forwards them,
/// mapped to [`DriverEvent`], into one channel.
async fn spawn_event_fan_in(page: &Page, tx: mpsc::Sender<DriverEvent>, current_url: Arc<Mutex<String>>) -> Result<()> {
	let mut streams: Vec<EventStreamBox> = Vec::new();

	let requests = page.event_listener::<EventRequestWillBeSent>().await.map_err(proto)?;
	streams.push(Box::pin(requests.map(|e| DriverEvent::RequestWillBeSent {
		request_id: e.request_id.inner().clone(),
		method: e.request.method.clone(),
		url: e.request.url.clone(),
		headers: headers_to_pairs(&e.request.headers),
		post_data: post_data_text(&e.request.post_data_entries),
		wall_time_ms: e.wall_time.inner() * 1000.0,
		monotonic_ms: e.timestamp.inner() * 1000.0,
	})));

	let responses = page.event_listener::<EventResponseReceived>().await.map_err(proto)?;
	streams.push(Box::pin(responses.map(|e| DriverEvent::ResponseReceived {
		request_id: e.request_id.inner().clone(),
		url: e.response.url.clone(),
		status: e.response.status as u16,
		status_text: e.response.status_text.clone(),
		http_version: e.response.protocol.clone().unwrap_or_else(|| "http/1.1".to_string()),
		headers: headers_to_pairs(&e.response.headers),
		mime_type: e.response.mime_type.clone(),
		remote_ip: e.response.remote_ip_address.clone(),
		timing: e.response.timing.as_ref().map(convert_timing),
		monotonic_ms: e.timestamp.inner() * 1000.0,
	})));

	let finished = page.event_listener::<EventLoadingFinished>().await.map_err(proto)?;
	streams.push(Box::pin(finished.map(|e| DriverEvent::LoadingFinished {
		request_id: e.request_id.inner().clone(),
		encoded_length: e.encoded_data_length as i64,
		monotonic_ms: e.timestamp.inner() * 1000.0,
	})));

	let failed = page.event_listener::<EventLoadingFailed>().await.map_err(proto)?;
	streams.push(Box::pin(failed.map(|e| DriverEvent::LoadingFailed {
		request_id: e.request_id.inner().clone(),
		error_text: e.error_text.clone(),
		canceled: e.canceled.unwrap_or(false),
		monotonic_ms: e.timestamp.inner() * 1000.0,
	})));

	let paused = page.event_listener::<EventRequestPaused>().await.map_err(proto)?;
	streams.push(Box::pin(paused.map(|e| {
		DriverEvent::RequestPaused(PausedRequest {
			interception_id: e.request_id.inner().clone(),
			network_id: e.network_id.as_ref().map(|id| id.inner().clone()),
			url: e.request.url.clone(),
			method: e.request.method.clone(),
			headers: headers_to_pairs(&e.request.headers),
			post_data: post_data_text(&e.request.post_data_entries),
			resource_type: format!("{:?}", e.resource_type),
			response_status: e.response_status_code.map(|code| code as u16),
			response_headers: e
				.response_headers
				.as_ref()
				.map(|entries| entries.iter().map(|h| (h.name.clone(), h.value.clone())).collect()),
		})
	})));

	let console = page.event_listener::<EventConsoleApiCalled>().await.map_err(proto)?;
	streams.push(Box::pin(console.map(|e| DriverEvent::Console {
		level: format!("{:?}", e.r#type).to_lowercase(),
		text: console_text(&e),
		source: String::new(),
	})));

	let exceptions = page.event_listener::<EventExceptionThrown>().await.map_err(proto)?;
	streams.push(Box::pin(exceptions.map(|e| {
		let details = &e.exception_details;
		let message = details
			.exception
			.as_ref()
			.and_then(|obj| obj.description.clone())
			.unwrap_or_else(|| details.text.clone());
		DriverEvent::PageError {
			message,
			source: details.url.clone().unwrap_or_default(),
		}
	})));

	let bindings = page.event_listener::<EventBindingCalled>().await.map_err(proto)?;
	streams.push(Box::pin(bindings.map(|e| DriverEvent::BindingCalled {
		name: e.name.clone(),
		payload: e.payload.clone(),
	})));

	let url_for_load = Arc::clone(&current_url);
	let loads = page.event_listener::<EventLoadEventFired>().await.map_err(proto)?;
	streams.push(Box::pin(loads.map(move |_| DriverEvent::Lifecycle {
		kind: LifecycleKind::Load,
		url: url_for_load.lock().clone(),
	})));

	let url_for_dcl = Arc::clone(&current_url);
	let dom_ready = page.event_listener::<EventDomContentEventFired>().await.map_err(proto)?;
	streams.push(Box::pin(dom_ready.map(move |_| DriverEvent::Lifecycle {
		kind: LifecycleKind::DomContentLoaded,
		url: url_for_dcl.lock().clone(),
	})));

	let url_for_nav = Arc::clone(&current_url);
	let navigated = page.event_listener::<EventFrameNavigated>().await.map_err(proto)?;
	streams.push(Box::pin(navigated.filter_map(move |e| {
		let url_slot = Arc::clone(&url_for_nav);
		let event = if e.frame.parent_id.is_none() {
			*url_slot.lock() = e.frame.url.clone();
			Some(DriverEvent::Lifecycle {
				kind: LifecycleKind::Navigation,
				url: e.frame.url.clone(),
			})
		} else {
			None
		};
		async move { event }
	})));

	let url_for_stop = Arc::clone(&current_url);
	let stopped = page.event_listener::<EventFrameStoppedLoading>().await.map_err(proto)?;
	streams.push(Box::pin(stopped.map(move |_| DriverEvent::Lifecycle {
		kind: LifecycleKind::FrameStopped,
		url: url_for_stop.lock().clone(),
	})));

	let mut all = futures::stream::select_all(streams);
	tokio::spawn(async move {
		while let Some(event) = all.next().await {
			if tx.send(event).await.is_err() {
				break;
			}
		}
	});
	Ok(())
}

#[async_trait]
impl PageDriver for CdpPage {
	async fn navigate(&self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|e| DriverError::Navigation(e.to_string()))?;
		Ok(())
	}

	async fn reload(&self) -> Result<()> {
		self.page.execute(page::ReloadParams::default()).await.map_err(|e| DriverError::Navigation(e.to_string()))?;
		Ok(())
	}

	async fn back(&self) -> Result<()> {
		self.navigate_history(-1).await
	}

	async fn forward(&self) -> Result<()> {
		self.navigate_history(1).await
	}

	async fn stop_loading(&self) -> Result<()> {
		self.page.execute(page::StopLoadingParams::default()).await.map_err(proto)?;
		Ok(())
	}

	async fn title(&self) -> Result<String> {
		let title = self.page.get_title().await.map_err(proto)?;
		Ok(title.unwrap_or_default())
	}

	async fn url(&self) -> Result<String> {
		let url = self.page.url().await.map_err(proto)?;
		Ok(url.unwrap_or_else(|| self.lifecycle_url()))
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		let result = self.page.evaluate(expression).await.map_err(|e| DriverError::Evaluate(e.to_string()))?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	async fn content(&self) -> Result<String> {
		self.page.content().await.map_err(proto)
	}

	async fn screenshot(&self, request: &ScreenshotRequest) -> Result<Vec<u8>> {
		let format = match request.format {
			ImageFormat::Png => CaptureScreenshotFormat::Png,
			ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
		};

		if let Some(selector) = &request.selector {
			let element = self
				.page
				.find_element(selector.as_str())
				.await
				.map_err(|_| DriverError::NotFound(format!("selector '{selector}'")))?;
			return element.screenshot(format).await.map_err(proto);
		}

		let mut builder = ScreenshotParams::builder().format(format).full_page(request.full_page);
		if let Some(quality) = request.quality {
			if request.format == ImageFormat::Jpeg {
				builder = builder.quality(quality as i64);
			}
		}
		self.page.screenshot(builder.build()).await.map_err(proto)
	}

	async fn pdf(&self, request: &PdfRequest) -> Result<Vec<u8>> {
		let mut params = PrintToPdfParams::default();
		params.landscape = request.landscape;
		params.print_background = request.print_background;
		params.scale = request.scale;
		params.paper_width = request.paper_width;
		params.paper_height = request.paper_height;
		self.page.pdf(params).await.map_err(proto)
	}

	async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()> {
		let map: serde_json::Map<String, Value> = headers
			.iter()
			.map(|(name, value)| (name.clone(), Value::String(value.clone())))
			.collect();
		self.page
			.execute(network::SetExtraHttpHeadersParams::new(Headers::new(Value::Object(map))))
			.await
			.map_err(proto)?;
		Ok(())
	}

	async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
		self.page
			.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
			.await
			.map_err(proto)?;
		Ok(())
	}

	async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
		let mut params = Vec::with_capacity(cookies.len());
		for cookie in cookies {
			params.push(convert_cookie_param(cookie)?);
		}
		self.page.execute(network::SetCookiesParams::new(params)).await.map_err(proto)?;
		Ok(())
	}

	async fn cookies(&self) -> Result<Vec<Cookie>> {
		let resp = self.page.execute(network::GetCookiesParams::default()).await.map_err(proto)?;
		Ok(resp.cookies.iter().map(convert_cookie).collect())
	}

	async fn clear_cookies(&self) -> Result<()> {
		self.page
			.execute(network::ClearBrowserCookiesParams::default())
			.await
			.map_err(proto)?;
		Ok(())
	}

	async fn set_blocked_urls(&self, patterns: &[String]) -> Result<()> {
		self.page
			.execute(network::SetBlockedUrLsParams::new(patterns.to_vec()))
			.await
			.map_err(proto)?;
		Ok(())
	}

	async fn add_binding(&self, name: &str) -> Result<()> {
		self.page.execute(AddBindingParams::new(name.to_string())).await.map_err(proto)?;
		Ok(())
	}

	async fn add_init_script(&self, source: &str) -> Result<()> {
		self.page
			.execute(page::AddScriptToEvaluateOnNewDocumentParams::new(source.to_string()))
			.await
			.map_err(proto)?;
		Ok(())
	}

	async fn set_file_input(&self, selector: &str, files: &[String]) -> Result<()> {
		self.page.execute(dom::EnableParams::default()).await.map_err(proto)?;
		let document = self.page.execute(dom::GetDocumentParams::default()).await.map_err(proto)?;
		let found = self
			.page
			.execute(dom::QuerySelectorParams::new(document.root.node_id, selector.to_string()))
			.await
			.map_err(proto)?;

		let mut params = dom::SetFileInputFilesParams::new(files.to_vec());
		params.node_id = Some(found.node_id);
		self.page.execute(params).await.map_err(|_| DriverError::NotFound(format!("file input '{selector}'")))?;
		Ok(())
	}

	async fn enable_interception(&self, stages: InterceptStages) -> Result<()> {
		let mut patterns = Vec::new();
		if stages.request {
			let mut pattern = RequestPattern::default();
			pattern.url_pattern = Some("*".to_string());
			pattern.request_stage = Some(RequestStage::Request);
			patterns.push(pattern);
		}
		if stages.response {
			let mut pattern = RequestPattern::default();
			pattern.url_pattern = Some("*".to_string());
			pattern.request_stage = Some(RequestStage::Response);
			patterns.push(pattern);
		}

		let mut params = fetch::EnableParams::default();
		params.patterns = Some(patterns);
		self.page.execute(params).await.map_err(proto)?;
		Ok(())
	}

	async fn disable_interception(&self) -> Result<()> {
		self.page.execute(fetch::DisableParams::default()).await.map_err(proto)?;
		Ok(())
	}

	async fn continue_request(&self, interception_id: &str, headers: Option<&[(String, String)]>) -> Result<()> {
		let mut params = fetch::ContinueRequestParams::new(fetch_request_id(interception_id));
		if let Some(headers) = headers {
			params.headers = Some(pairs_to_header_entries(headers));
		}
		self.page.execute(params).await.map_err(proto)?;
		Ok(())
	}

	async fn fulfill_request(&self, interception_id: &str, status: u16, headers: &[(String, String)], body: &[u8]) -> Result<()> {
		let mut params = fetch::FulfillRequestParams::new(fetch_request_id(interception_id), status as i64);
		if !headers.is_empty() {
			params.response_headers = Some(pairs_to_header_entries(headers));
		}
		if !body.is_empty() {
			params.body = Some(BASE64.encode(body).into());
		}
		self.page.execute(params).await.map_err(proto)?;
		Ok(())
	}

	async fn fail_request(&self, interception_id: &str, reason: &str) -> Result<()> {
		let params = fetch::FailRequestParams::new(fetch_request_id(interception_id), error_reason(reason));
		self.page.execute(params).await.map_err(proto)?;
		Ok(())
	}

	async fn paused_response_body(&self, interception_id: &str) -> Result<Vec<u8>> {
		let resp = self
			.page
			.execute(fetch::GetResponseBodyParams::new(fetch_request_id(interception_id)))
			.await
			.map_err(proto)?;
		decode_body(&resp.body, resp.base64_encoded)
	}

	async fn response_body(&self, request_id: &str) -> Result<Vec<u8>> {
		let resp = self
			.page
			.execute(network::GetResponseBodyParams::new(request_id.to_string()))
			.await
			.map_err(|_| DriverError::NotFound(format!("response body for request {request_id}")))?;
		decode_body(&resp.body, resp.base64_encoded)
	}

	async fn window(&self) -> Result<WindowInfo> {
		let resp = self.page.execute(GetWindowForTargetParams::default()).await.map_err(proto)?;
		let bounds = &resp.bounds;
		Ok(WindowInfo {
			left: bounds.left.unwrap_or(0) as i32,
			top: bounds.top.unwrap_or(0) as i32,
			width: bounds.width.unwrap_or(0) as u32,
			height: bounds.height.unwrap_or(0) as u32,
			state: match bounds.window_state {
				Some(CdpWindowState::Minimized) => WindowState::Minimized,
				Some(CdpWindowState::Maximized) => WindowState::Maximized,
				Some(CdpWindowState::Fullscreen) => WindowState::Fullscreen,
				_ => WindowState::Normal,
			},
		})
	}

	async fn set_window(&self, bounds: &WindowBoundsUpdate, state: Option<WindowState>) -> Result<()> {
		let resp = self.page.execute(GetWindowForTargetParams::default()).await.map_err(proto)?;
		let window_id = resp.window_id.clone();

		let mut update = Bounds::default();
		// Devtools rejects mixing a non-normal state with explicit geometry.
		if let Some(state) = state {
			update.window_state = Some(match state {
				WindowState::Normal => CdpWindowState::Normal,
				WindowState::Minimized => CdpWindowState::Minimized,
				WindowState::Maximized => CdpWindowState::Maximized,
				WindowState::Fullscreen => CdpWindowState::Fullscreen,
			});
		} else {
			update.left = bounds.left.map(i64::from);
			update.top = bounds.top.map(i64::from);
			update.width = bounds.width.map(i64::from);
			update.height = bounds.height.map(i64::from);
		}

		self.page.execute(SetWindowBoundsParams::new(window_id, update)).await.map_err(proto)?;
		Ok(())
	}

	fn take_event_stream(&self) -> Option<mpsc::Receiver<DriverEvent>> {
		self.events.lock().take()
	}

	async fn close(&self) -> Result<()> {
		self.page.execute(page::CloseParams::default()).await.map_err(proto)?;
		Ok(())
	}
}

impl CdpPage {
	async fn navigate_history(&self, delta: i64) -> Result<()> {
		let history = self.page.execute(page::GetNavigationHistoryParams::default()).await.map_err(proto)?;
		let target = history.current_index + delta;
		let Some(entry) = usize::try_from(target).ok().and_then(|i| history.entries.get(i)) else {
			// Nothing in that direction; a no-op like the browser buttons.
			return Ok(());
		};
		self.page
			.execute(page::NavigateToHistoryEntryParams::new(entry.id))
			.await
			.map_err(|e| DriverError::Navigation(e.to_string()))?;
		Ok(())
	}
}

fn proto(err: impl std::fmt::Display) -> DriverError {
	DriverError::Protocol(err.to_string())
}

fn fetch_request_id(id: &str) -> fetch::RequestId {
	id.to_string().into()
}

fn decode_body(body: &str, base64_encoded: bool) -> Result<Vec<u8>> {
	if base64_encoded {
		BASE64.decode(body.as_bytes()).map_err(|e| DriverError::Protocol(e.to_string()))
	} else {
		Ok(body.as_bytes().to_vec())
	}
}

/// Reconstructs the request body text from the devtools `postDataEntries`
/// (each entry's `bytes` is base64-encoded).
fn post_data_text(entries: &Option<Vec<network::PostDataEntry>>) -> Option<String> {
	let entries = entries.as_ref()?;
	let mut bytes = Vec::new();
	for entry in entries {
		if let Some(chunk) = &entry.bytes {
			let chunk: &str = chunk.as_ref();
			if let Ok(decoded) = BASE64.decode(chunk.as_bytes()) {
				bytes.extend(decoded);
			}
		}
	}
	Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Devtools headers are a JSON object; flatten to pairs.
fn headers_to_pairs(headers: &Headers) -> Vec<(String, String)> {
	let value = serde_json::to_value(headers).unwrap_or(Value::Null);
	match value {
		Value::Object(map) => map
			.into_iter()
			.map(|(name, value)| {
				let value = match value {
					Value::String(s) => s,
					other => other.to_string(),
				};
				(name, value)
			})
			.collect(),
		_ => Vec::new(),
	}
}

fn pairs_to_header_entries(headers: &[(String, String)]) -> Vec<HeaderEntry> {
	headers
		.iter()
		.map(|(name, value)| HeaderEntry {
			name: name.clone(),
			value: value.clone(),
		})
		.collect()
}

fn convert_timing(timing: &network::ResourceTiming) -> ResourceTiming {
	ResourceTiming {
		request_time_s: timing.request_time,
		dns_start: timing.dns_start,
		dns_end: timing.dns_end,
		connect_start: timing.connect_start,
		connect_end: timing.connect_end,
		ssl_start: timing.ssl_start,
		ssl_end: timing.ssl_end,
		send_start: timing.send_start,
		send_end: timing.send_end,
		receive_headers_end: timing.receive_headers_end,
	}
}

fn convert_cookie_param(cookie: &Cookie) -> Result<CookieParam> {
	let mut builder = CookieParam::builder().name(cookie.name.as_str()).value(cookie.value.as_str());
	if let Some(domain) = &cookie.domain {
		builder = builder.domain(domain.as_str());
	}
	if let Some(path) = &cookie.path {
		builder = builder.path(path.as_str());
	}
	if let Some(url) = &cookie.url {
		builder = builder.url(url.as_str());
	}
	let mut param = builder.build().map_err(DriverError::Protocol)?;
	param.expires = cookie.expires.map(TimeSinceEpoch::new);
	param.http_only = cookie.http_only;
	param.secure = cookie.secure;
	param.same_site = cookie.same_site.map(|s| match s {
		SameSite::None => CookieSameSite::None,
		SameSite::Lax => CookieSameSite::Lax,
		SameSite::Strict => CookieSameSite::Strict,
	});
	Ok(param)
}

fn convert_cookie(cookie: &network::Cookie) -> Cookie {
	let expires = cookie.expires;
	Cookie {
		name: cookie.name.clone(),
		value: cookie.value.clone(),
		domain: Some(cookie.domain.clone()),
		path: Some(cookie.path.clone()),
		expires: if expires > 0.0 { Some(expires) } else { None },
		http_only: Some(cookie.http_only),
		secure: Some(cookie.secure),
		same_site: cookie.same_site.as_ref().map(|s| match s {
			CookieSameSite::None => SameSite::None,
			CookieSameSite::Lax => SameSite::Lax,
			CookieSameSite::Strict => SameSite::Strict,
		}),
		url: None,
	}
}

fn error_reason(reason: &str) -> ErrorReason {
	match reason.to_ascii_lowercase().as_str() {
		"aborted" => ErrorReason::Aborted,
		"timedout" | "timeout" => ErrorReason::TimedOut,
		"accessdenied" => ErrorReason::AccessDenied,
		"connectionclosed" => ErrorReason::ConnectionClosed,
		"connectionreset" => ErrorReason::ConnectionReset,
		"connectionrefused" => ErrorReason::ConnectionRefused,
		"connectionaborted" => ErrorReason::ConnectionAborted,
		"connectionfailed" => ErrorReason::ConnectionFailed,
		"namenotresolved" => ErrorReason::NameNotResolved,
		"internetdisconnected" => ErrorReason::InternetDisconnected,
		"addressunreachable" => ErrorReason::AddressUnreachable,
		"blocked" | "blockedbyclient" => ErrorReason::BlockedByClient,
		"blockedbyresponse" => ErrorReason::BlockedByResponse,
		_ => ErrorReason::Failed,
	}
}

/// Flattens console call arguments into one line, the way the devtools
/// frontend renders them.
fn console_text(event: &EventConsoleApiCalled) -> String {
	event
		.args
		.iter()
		.map(|arg| {
			if let Some(value) = &arg.value {
				match value {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				}
			} else if let Some(description) = &arg.description {
				description.clone()
			} else if let Some(unserializable) = &arg.unserializable_value {
				unserializable.inner().clone()
			} else {
				String::from("[unknown]")
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_reason_maps_common_names() {
		assert!(matches!(error_reason("blocked"), ErrorReason::BlockedByClient));
		assert!(matches!(error_reason("TimedOut"), ErrorReason::TimedOut));
		assert!(matches!(error_reason("bogus"), ErrorReason::Failed));
	}

	#[test]
	fn decode_body_handles_both_encodings() {
		assert_eq!(decode_body("hi", false).unwrap(), b"hi");
		assert_eq!(decode_body("aGk=", true).unwrap(), b"hi");
		assert!(decode_body("!!!", true).is_err());
	}
}
