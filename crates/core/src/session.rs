//! Session: the unit of browser isolation.
//!
//! One session owns one browser process and one active page, plus the
//! subsystems layered on it: the event pump that drains the driver's event
//! stream, an optional network recorder, an optional bridge, the hijack
//! registry with its dispatcher task, and the subscriber fan-out. Navigation
//! and hijack mutations serialize on a per-session coordination lock;
//! read-only operations run in parallel; the pump and fan-out never take
//! that lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::bridge::{BINDING_NAME, Bridge};
use crate::error::{Error, Result};
use crate::fanout::{DEFAULT_FANOUT_CAPACITY, EventHub, EventSubscription};
use crate::hijack::{self, HANDLER_DEADLINE, HijackHandler, HijackRegistry, rule_handler};
use crate::js;
use crate::recorder::{NetworkRecorder, RecorderOptions};
use scout_driver::{BrowserDriver, DriverEvent, InterceptStages, Launcher, LifecycleKind, PageDriver};
use scout_protocol::{
	BrowserEventPayload, Cookie, HijackRule, PageEventKind, PdfRequest, ScreenshotRequest, SessionMeta, SessionOptions, StorageKind,
	WindowBoundsUpdate, WindowInfo, WindowState,
};

/// Options for navigation-family operations.
#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
	/// After load, additionally wait for a network quiet period.
	pub wait_stable: bool,
	/// Hard deadline for the whole operation.
	pub timeout: Duration,
	/// Quiet period used by `wait_stable`.
	pub quiet_period: Duration,
}

impl Default for NavigateOptions {
	fn default() -> Self {
		Self {
			wait_stable: false,
			timeout: Duration::from_secs(30),
			quiet_period: Duration::from_millis(500),
		}
	}
}

/// Load state of the current document; generation bumps on every committed
/// navigation.
#[derive(Debug, Clone, Copy, Default)]
struct DocState {
	generation: u64,
	loaded: bool,
}

type RecorderSlot = Arc<RwLock<Option<Arc<NetworkRecorder>>>>;
type BridgeSlot = Arc<RwLock<Option<Arc<Bridge>>>>;

/// Cleanup handle returned by [`Session::set_headers`].
pub struct HeadersHandle {
	page: Arc<dyn PageDriver>,
}

impl HeadersHandle {
	/// Removes the header overrides this handle was issued for.
	pub async fn clear(self) -> Result<()> {
		self.page.set_extra_headers(&[]).await?;
		Ok(())
	}
}

/// One isolated browser session.
pub struct Session {
	id: String,
	created_at_ms: u64,
	options: SessionOptions,
	browser: Arc<dyn BrowserDriver>,
	page: Arc<dyn PageDriver>,
	hub: Arc<EventHub>,
	recorder: RecorderSlot,
	bridge: BridgeSlot,
	hijack: Arc<HijackRegistry>,
	/// Serializes navigation- and hijack-mutating operations.
	nav_lock: AsyncMutex<()>,
	load_rx: watch::Receiver<DocState>,
	/// Milliseconds since `started` of the last observed network activity.
	last_network_ms: Arc<AtomicU64>,
	started: Instant,
	crashed: Arc<AtomicBool>,
	destroyed: AtomicBool,
	pump_task: Mutex<Option<JoinHandle<()>>>,
	dispatch_task: Mutex<Option<JoinHandle<()>>>,
	scratch: Mutex<Option<tempfile::TempDir>>,
}

impl Session {
	/// Launches a browser, opens the page, starts the pump and dispatcher,
	/// and performs the initial navigation. On failure everything launched
	/// so far is torn down before the error returns.
	pub async fn start(id: String, options: SessionOptions, launcher: &Arc<dyn Launcher>) -> Result<Arc<Self>> {
		let mut launch_options = options.clone();
		let scratch = if launch_options.user_data_dir.is_none() {
			let dir = tempfile::Builder::new()
				.prefix("scout-session-")
				.tempdir()
				.map_err(|e| Error::LaunchFailed(format!("scratch dir: {e}")))?;
			launch_options.user_data_dir = Some(dir.path().display().to_string());
			Some(dir)
		} else {
			None
		};

		let browser = launcher.launch(&launch_options).await?;
		let page = match browser.open_page("about:blank").await {
			Ok(page) => page,
			Err(e) => {
				let _ = browser.close().await;
				return Err(e.into());
			}
		};
		let events = page
			.take_event_stream()
			.ok_or_else(|| Error::Driver("driver event stream already taken".to_string()))?;

		if let Some(user_agent) = &options.user_agent {
			page.set_user_agent(user_agent).await?;
		}

		let (load_tx, load_rx) = watch::channel(DocState::default());
		let (paused_tx, paused_rx) = mpsc::channel(64);
		let hub = Arc::new(EventHub::new(DEFAULT_FANOUT_CAPACITY));
		let recorder: RecorderSlot = Arc::new(RwLock::new(None));
		let bridge: BridgeSlot = Arc::new(RwLock::new(None));
		let hijack = Arc::new(HijackRegistry::new());
		let last_network_ms = Arc::new(AtomicU64::new(0));
		let crashed = Arc::new(AtomicBool::new(false));
		let started = Instant::now();

		if options.record {
			*recorder.write() = Some(Arc::new(NetworkRecorder::new(RecorderOptions {
				capture_body: options.capture_body,
			})));
		}

		let dispatch_task = tokio::spawn(hijack::dispatch_loop(paused_rx, Arc::clone(&hijack), Arc::clone(&page), HANDLER_DEADLINE));
		let pump_task = tokio::spawn(run_event_pump(
			events,
			PumpContext {
				hub: Arc::clone(&hub),
				recorder: Arc::clone(&recorder),
				bridge: Arc::clone(&bridge),
				page: Arc::clone(&page),
				paused_tx,
				load_tx,
				last_network_ms: Arc::clone(&last_network_ms),
				started,
				crashed: Arc::clone(&crashed),
			},
		));

		let session = Arc::new(Self {
			id,
			created_at_ms: epoch_ms(),
			options: options.clone(),
			browser,
			page,
			hub,
			recorder,
			bridge,
			hijack,
			nav_lock: AsyncMutex::new(()),
			load_rx,
			last_network_ms,
			started,
			crashed,
			destroyed: AtomicBool::new(false),
			pump_task: Mutex::new(Some(pump_task)),
			dispatch_task: Mutex::new(Some(dispatch_task)),
			scratch: Mutex::new(scratch),
		});

		if !options.initial_url.is_empty() {
			let initial = NavigateOptions::default();
			if let Err(e) = session.navigate(&options.initial_url, initial).await {
				let _ = session.destroy().await;
				return Err(e);
			}
		}

		Ok(session)
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn created_at_ms(&self) -> u64 {
		self.created_at_ms
	}

	pub fn options(&self) -> &SessionOptions {
		&self.options
	}

	/// True once the session can no longer serve operations.
	pub fn is_terminated(&self) -> bool {
		self.destroyed.load(Ordering::SeqCst) || self.crashed.load(Ordering::SeqCst) || !self.browser.is_alive()
	}

	fn ensure_alive(&self) -> Result<()> {
		if self.destroyed.load(Ordering::SeqCst) {
			return Err(Error::SessionNotFound(self.id.clone()));
		}
		if self.crashed.load(Ordering::SeqCst) || !self.browser.is_alive() {
			return Err(Error::SessionGone);
		}
		Ok(())
	}

	/// Minimal metadata snapshot.
	pub async fn meta(&self) -> SessionMeta {
		SessionMeta {
			id: self.id.clone(),
			created_at_ms: self.created_at_ms,
			url: self.page.url().await.unwrap_or_default(),
			title: self.page.title().await.unwrap_or_default(),
		}
	}

	// --- Navigation -----------------------------------------------------

	pub async fn navigate(&self, url: &str, options: NavigateOptions) -> Result<()> {
		self.ensure_alive()?;
		let _guard = self.nav_lock.lock().await;
		let deadline = Instant::now() + options.timeout;

		let generation_before = self.load_rx.borrow().generation;
		self.page.navigate(url).await.map_err(|e| match Error::from(e) {
			Error::NavigationFailed(msg) => Error::NavigationFailed(format!("{url}: {msg}")),
			other => other,
		})?;

		self.wait_loaded_after(generation_before, deadline, url).await?;
		if options.wait_stable {
			self.wait_quiet_until(deadline, options.quiet_period)
				.await
				.map_err(|_| Error::NavigationTimeout {
					url: url.to_string(),
					ms: options.timeout.as_millis() as u64,
				})?;
		}
		Ok(())
	}

	pub async fn reload(&self, options: NavigateOptions) -> Result<()> {
		self.ensure_alive()?;
		let _guard = self.nav_lock.lock().await;
		let deadline = Instant::now() + options.timeout;
		let url = self.page.url().await.unwrap_or_default();

		let generation_before = self.load_rx.borrow().generation;
		self.page.reload().await.map_err(Error::from)?;
		self.wait_loaded_after(generation_before, deadline, &url).await?;
		if options.wait_stable {
			self.wait_quiet_until(deadline, options.quiet_period)
				.await
				.map_err(|_| Error::NavigationTimeout {
					url,
					ms: options.timeout.as_millis() as u64,
				})?;
		}
		Ok(())
	}

	/// History back. A no-op when there is nowhere to go.
	pub async fn back(&self) -> Result<()> {
		self.ensure_alive()?;
		let _guard = self.nav_lock.lock().await;
		self.page.back().await?;
		Ok(())
	}

	/// History forward. A no-op when there is nowhere to go.
	pub async fn forward(&self) -> Result<()> {
		self.ensure_alive()?;
		let _guard = self.nav_lock.lock().await;
		self.page.forward().await?;
		Ok(())
	}

	pub async fn stop(&self) -> Result<()> {
		self.ensure_alive()?;
		self.page.stop_loading().await?;
		Ok(())
	}

	/// Waits until the current document reports load.
	pub async fn wait_load(&self, timeout: Duration) -> Result<()> {
		self.ensure_alive()?;
		let mut rx = self.load_rx.clone();
		tokio::time::timeout(timeout, rx.wait_for(|s| s.loaded))
			.await
			.map_err(|_| Error::DeadlineExceeded)?
			.map_err(|_| Error::SessionGone)?;
		Ok(())
	}

	/// Waits until the page is loaded and the network has been quiet for
	/// `quiet_period`.
	pub async fn wait_stable(&self, timeout: Duration, quiet_period: Duration) -> Result<()> {
		self.ensure_alive()?;
		let deadline = Instant::now() + timeout;
		self.wait_quiet_until(deadline, quiet_period).await.map_err(|_| Error::DeadlineExceeded)
	}

	async fn wait_loaded_after(&self, generation_before: u64, deadline: Instant, url: &str) -> Result<()> {
		let remaining = deadline.saturating_duration_since(Instant::now());
		let mut rx = self.load_rx.clone();
		let waited = tokio::time::timeout(remaining, rx.wait_for(|s| s.generation > generation_before && s.loaded)).await;
		match waited {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(_)) => Err(Error::SessionGone),
			Err(_) => Err(Error::NavigationTimeout {
				url: url.to_string(),
				ms: remaining.as_millis() as u64,
			}),
		}
	}

	async fn wait_quiet_until(&self, deadline: Instant, quiet_period: Duration) -> std::result::Result<(), ()> {
		loop {
			let loaded = self.load_rx.borrow().loaded;
			let since_last = self.elapsed_ms().saturating_sub(self.last_network_ms.load(Ordering::Acquire));
			if loaded && since_last >= quiet_period.as_millis() as u64 {
				return Ok(());
			}
			if Instant::now() >= deadline {
				return Err(());
			}
			tokio::time::sleep(Duration::from_millis(25)).await;
		}
	}

	fn elapsed_ms(&self) -> u64 {
		self.started.elapsed().as_millis() as u64
	}

	// --- Interaction ----------------------------------------------------

	pub async fn click(&self, selector: &str) -> Result<()> {
		self.element_op(&js::click(selector), selector).await.map(|_| ())
	}

	pub async fn double_click(&self, selector: &str) -> Result<()> {
		self.element_op(&js::double_click(selector), selector).await.map(|_| ())
	}

	pub async fn right_click(&self, selector: &str) -> Result<()> {
		self.element_op(&js::right_click(selector), selector).await.map(|_| ())
	}

	pub async fn hover(&self, selector: &str) -> Result<()> {
		self.element_op(&js::hover(selector), selector).await.map(|_| ())
	}

	pub async fn type_text(&self, selector: &str, text: &str, clear_first: bool) -> Result<()> {
		self.element_op(&js::type_text(selector, text, clear_first), selector).await.map(|_| ())
	}

	pub async fn press_key(&self, key: &str) -> Result<()> {
		self.ensure_alive()?;
		self.page.evaluate(&js::press_key(key)).await?;
		Ok(())
	}

	pub async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
		self.element_op(&js::select_option(selector, value), selector).await.map(|_| ())
	}

	pub async fn focus(&self, selector: &str) -> Result<()> {
		self.element_op(&js::focus(selector), selector).await.map(|_| ())
	}

	pub async fn blur(&self, selector: &str) -> Result<()> {
		self.element_op(&js::blur(selector), selector).await.map(|_| ())
	}

	pub async fn scroll_into_view(&self, selector: &str) -> Result<()> {
		self.element_op(&js::scroll_into_view(selector), selector).await.map(|_| ())
	}

	pub async fn set_files(&self, selector: &str, files: &[String]) -> Result<()> {
		self.ensure_alive()?;
		self.page.set_file_input(selector, files).await?;
		Ok(())
	}

	// --- Introspection --------------------------------------------------

	pub async fn title(&self) -> Result<String> {
		self.ensure_alive()?;
		Ok(self.page.title().await?)
	}

	pub async fn url(&self) -> Result<String> {
		self.ensure_alive()?;
		Ok(self.page.url().await?)
	}

	pub async fn get_text(&self, selector: &str) -> Result<String> {
		let value = self.element_op(&js::get_text(selector), selector).await?;
		Ok(value.as_str().map(str::to_string).unwrap_or_default())
	}

	pub async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
		let value = self.element_op(&js::get_attribute(selector, name), selector).await?;
		Ok(value.as_str().map(str::to_string))
	}

	pub async fn get_html(&self, selector: Option<&str>) -> Result<String> {
		match selector {
			Some(sel) => {
				let value = self.element_op(&js::get_html(Some(sel)), sel).await?;
				Ok(value.as_str().map(str::to_string).unwrap_or_default())
			}
			None => {
				self.ensure_alive()?;
				Ok(self.page.content().await?)
			}
		}
	}

	pub async fn eval(&self, script: &str) -> Result<Value> {
		self.ensure_alive()?;
		Ok(self.page.evaluate(script).await?)
	}

	pub async fn element_exists(&self, selector: &str) -> Result<bool> {
		self.ensure_alive()?;
		let value = self.page.evaluate(&js::element_exists(selector)).await?;
		Ok(value.get("ok").and_then(Value::as_bool).unwrap_or(false))
	}

	pub async fn matches_count(&self, selector: &str) -> Result<u64> {
		self.ensure_alive()?;
		let value = self.page.evaluate(&js::matches_count(selector)).await?;
		Ok(value.get("ok").and_then(Value::as_u64).unwrap_or(0))
	}

	async fn element_op(&self, script: &str, selector: &str) -> Result<Value> {
		self.ensure_alive()?;
		let value = self.page.evaluate(script).await?;
		match value.get("err").and_then(Value::as_str) {
			Some("not-found") => Err(Error::SelectorNotFound(selector.to_string())),
			Some("not-interactable") => Err(Error::ElementNotInteractable(selector.to_string())),
			Some("detached") => Err(Error::ElementDetached(selector.to_string())),
			Some(other) => Err(Error::Driver(format!("unexpected element result: {other}"))),
			None => Ok(value.get("ok").cloned().unwrap_or(Value::Null)),
		}
	}

	// --- Capture --------------------------------------------------------

	pub async fn screenshot(&self, request: &ScreenshotRequest) -> Result<Vec<u8>> {
		self.ensure_alive()?;
		Ok(self.page.screenshot(request).await?)
	}

	pub async fn pdf(&self, request: &PdfRequest) -> Result<Vec<u8>> {
		self.ensure_alive()?;
		Ok(self.page.pdf(request).await?)
	}

	pub async fn content(&self) -> Result<String> {
		self.ensure_alive()?;
		Ok(self.page.content().await?)
	}

	// --- Network state --------------------------------------------------

	/// Applies header overrides to every subsequent request; the returned
	/// handle removes them.
	pub async fn set_headers(&self, headers: &[(String, String)]) -> Result<HeadersHandle> {
		self.ensure_alive()?;
		self.page.set_extra_headers(headers).await?;
		Ok(HeadersHandle {
			page: Arc::clone(&self.page),
		})
	}

	pub async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
		self.ensure_alive()?;
		self.page.set_user_agent(user_agent).await?;
		Ok(())
	}

	pub async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
		self.ensure_alive()?;
		self.page.set_cookies(cookies).await?;
		Ok(())
	}

	pub async fn cookies(&self) -> Result<Vec<Cookie>> {
		self.ensure_alive()?;
		Ok(self.page.cookies().await?)
	}

	pub async fn clear_cookies(&self) -> Result<()> {
		self.ensure_alive()?;
		self.page.clear_cookies().await?;
		Ok(())
	}

	pub async fn block_urls(&self, patterns: &[String]) -> Result<()> {
		self.ensure_alive()?;
		self.page.set_blocked_urls(patterns).await?;
		Ok(())
	}

	// --- Storage --------------------------------------------------------

	pub async fn storage_get(&self, kind: StorageKind, key: &str) -> Result<Option<String>> {
		self.ensure_alive()?;
		let value = self.page.evaluate(&js::storage_get(kind == StorageKind::Local, key)).await?;
		Ok(value.get("ok").and_then(Value::as_str).map(str::to_string))
	}

	pub async fn storage_set(&self, kind: StorageKind, key: &str, value: &str) -> Result<()> {
		self.ensure_alive()?;
		self.page.evaluate(&js::storage_set(kind == StorageKind::Local, key, value)).await?;
		Ok(())
	}

	pub async fn storage_clear(&self, kind: StorageKind) -> Result<()> {
		self.ensure_alive()?;
		self.page.evaluate(&js::storage_clear(kind == StorageKind::Local)).await?;
		Ok(())
	}

	// --- Hijack ---------------------------------------------------------

	/// Registers a hijack router. The first running router enables driver
	/// interception for the page.
	pub async fn hijack(&self, pattern: &str, handler: HijackHandler) -> Result<u64> {
		self.ensure_alive()?;
		let _guard = self.nav_lock.lock().await;
		let first = self.hijack.running_count() == 0;
		let id = self.hijack.register(pattern, handler)?;
		if first {
			if let Err(e) = self.page.enable_interception(InterceptStages::BOTH).await {
				self.hijack.stop(id)?;
				return Err(e.into());
			}
		}
		Ok(id)
	}

	/// Registers a declarative rule from the RPC surface.
	pub async fn hijack_rule(&self, pattern: &str, rule: HijackRule) -> Result<u64> {
		self.hijack(pattern, rule_handler(rule)).await
	}

	/// Stops one router; interception is disabled once none remain running.
	pub async fn stop_hijack(&self, router_id: u64) -> Result<()> {
		self.ensure_alive()?;
		let _guard = self.nav_lock.lock().await;
		self.hijack.stop(router_id)?;
		if self.hijack.running_count() == 0 {
			self.page.disable_interception().await?;
		}
		Ok(())
	}

	// --- Recording ------------------------------------------------------

	/// Starts (or restarts) the recorder. A previous recorder's entries are
	/// discarded with it.
	pub fn start_recorder(&self, options: RecorderOptions) -> Result<()> {
		self.ensure_alive()?;
		*self.recorder.write() = Some(Arc::new(NetworkRecorder::new(options)));
		Ok(())
	}

	pub fn stop_recorder(&self) -> Result<()> {
		match self.recorder.read().as_ref() {
			Some(recorder) => {
				recorder.stop();
				Ok(())
			}
			None => Err(Error::NotRecording),
		}
	}

	/// Serializes the archive. Pending transactions are absent; recording
	/// continues unaffected.
	pub fn export_har(&self) -> Result<(Vec<u8>, usize)> {
		match self.recorder.read().as_ref() {
			Some(recorder) => recorder.export(),
			None => Err(Error::NotRecording),
		}
	}

	pub fn clear_recorder(&self) -> Result<()> {
		match self.recorder.read().as_ref() {
			Some(recorder) => recorder.clear(),
			None => Err(Error::NotRecording),
		}
	}

	// --- Window ---------------------------------------------------------

	pub async fn window(&self) -> Result<WindowInfo> {
		self.ensure_alive()?;
		Ok(self.page.window().await?)
	}

	/// Applies explicit bounds, restoring first when the window is in a
	/// non-normal state.
	pub async fn set_window(&self, bounds: &WindowBoundsUpdate) -> Result<()> {
		self.ensure_alive()?;
		let current = self.page.window().await?;
		if current.state != WindowState::Normal {
			self.page.set_window(&WindowBoundsUpdate::default(), Some(WindowState::Normal)).await?;
		}
		self.page.set_window(bounds, None).await?;
		Ok(())
	}

	pub async fn minimize(&self) -> Result<()> {
		self.transition_window(WindowState::Minimized).await
	}

	pub async fn maximize(&self) -> Result<()> {
		self.transition_window(WindowState::Maximized).await
	}

	pub async fn fullscreen(&self) -> Result<()> {
		self.transition_window(WindowState::Fullscreen).await
	}

	pub async fn restore(&self) -> Result<()> {
		self.transition_window(WindowState::Normal).await
	}

	async fn transition_window(&self, target: WindowState) -> Result<()> {
		self.ensure_alive()?;
		let current = self.page.window().await?;
		if current.state == target {
			return Ok(());
		}
		// Between two non-normal states the window must pass through normal.
		if current.state != WindowState::Normal && target != WindowState::Normal {
			self.page.set_window(&WindowBoundsUpdate::default(), Some(WindowState::Normal)).await?;
		}
		self.page.set_window(&WindowBoundsUpdate::default(), Some(target)).await?;
		Ok(())
	}

	// --- Streaming ------------------------------------------------------

	/// Opens a subscription onto the session's event stream.
	pub fn subscribe_events(&self) -> Result<EventSubscription> {
		self.ensure_alive()?;
		self.hub.subscribe().ok_or_else(|| Error::SessionNotFound(self.id.clone()))
	}

	pub fn event_hub(&self) -> &Arc<EventHub> {
		&self.hub
	}

	// --- Bridge ---------------------------------------------------------

	pub async fn bridge_send(&self, kind: &str, payload: Value) -> Result<()> {
		let bridge = self.ensure_bridge().await?;
		bridge.send(kind, payload).await
	}

	pub async fn bridge_query(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
		let bridge = self.ensure_bridge().await?;
		bridge.query(method, params, timeout).await
	}

	pub async fn bridge_observe_mutations(&self, selector: &str) -> Result<()> {
		let bridge = self.ensure_bridge().await?;
		bridge.observe_mutations(selector).await
	}

	pub async fn bridge_available(&self) -> bool {
		self.bridge.read().as_ref().map(|b| b.available()).unwrap_or(false)
	}

	/// The bridge installs lazily on first use.
	pub async fn ensure_bridge(&self) -> Result<Arc<Bridge>> {
		self.ensure_alive()?;
		if let Some(bridge) = self.bridge.read().as_ref() {
			return Ok(Arc::clone(bridge));
		}
		let installed = Bridge::install(Arc::clone(&self.page)).await?;
		let mut slot = self.bridge.write();
		if let Some(existing) = slot.as_ref() {
			// A concurrent caller won the install race.
			return Ok(Arc::clone(existing));
		}
		*slot = Some(Arc::clone(&installed));
		Ok(installed)
	}

	// --- Teardown -------------------------------------------------------

	/// Destroys the session: stops routers and the recorder, closes the
	/// event stream, tears down the page and browser (waiting for process
	/// exit), and removes the scratch directory. Final and idempotent.
	pub async fn destroy(&self) -> Result<()> {
		if self.destroyed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		tracing::debug!(target = "scout.session", id = %self.id, "destroying session");

		self.hijack.stop_all();
		if let Some(recorder) = self.recorder.read().as_ref() {
			recorder.stop();
		}
		self.hub.close();
		self.abort_tasks();

		if let Err(e) = self.page.close().await {
			tracing::debug!(target = "scout.session", id = %self.id, error = %e, "page close failed");
		}
		if let Err(e) = self.browser.close().await {
			tracing::debug!(target = "scout.session", id = %self.id, error = %e, "browser close failed");
		}

		// Scratch dir removal happens on drop; take it now so the removal
		// is tied to destruction rather than the last Arc.
		drop(self.scratch.lock().take());
		Ok(())
	}

	/// Last-resort teardown used when `destroy` overruns the shutdown
	/// deadline: no waiting on the browser process.
	pub fn force_close(&self) {
		self.destroyed.store(true, Ordering::SeqCst);
		self.hijack.stop_all();
		self.hub.close();
		self.abort_tasks();
		let browser = Arc::clone(&self.browser);
		tokio::spawn(async move {
			let _ = browser.close().await;
		});
		drop(self.scratch.lock().take());
	}

	fn abort_tasks(&self) {
		if let Some(task) = self.pump_task.lock().take() {
			task.abort();
		}
		if let Some(task) = self.dispatch_task.lock().take() {
			task.abort();
		}
	}
}

struct PumpContext {
	hub: Arc<EventHub>,
	recorder: RecorderSlot,
	bridge: BridgeSlot,
	page: Arc<dyn PageDriver>,
	paused_tx: mpsc::Sender<scout_driver::PausedRequest>,
	load_tx: watch::Sender<DocState>,
	last_network_ms: Arc<AtomicU64>,
	started: Instant,
	crashed: Arc<AtomicBool>,
}

/// Drains the driver event stream: recorder first, then fan-out, plus the
/// bookkeeping navigation and hijack depend on.
async fn run_event_pump(mut events: mpsc::Receiver<DriverEvent>, ctx: PumpContext) {
	// Network request start times and URLs, for response latency and
	// failure events.
	let mut inflight: HashMap<String, (String, f64)> = HashMap::new();

	while let Some(event) = events.recv().await {
		match event {
			DriverEvent::RequestWillBeSent {
				request_id,
				method,
				url,
				headers,
				post_data,
				wall_time_ms,
				monotonic_ms,
			} => {
				touch_network(&ctx);
				inflight.insert(request_id.clone(), (url.clone(), monotonic_ms));
				if let Some(recorder) = ctx.recorder.read().as_ref() {
					recorder.on_request(&request_id, &method, &url, &headers, post_data.as_deref(), wall_time_ms, monotonic_ms);
				}
				ctx.hub.emit(BrowserEventPayload::RequestSent { method, url, headers });
			}
			DriverEvent::ResponseReceived {
				request_id,
				url,
				status,
				status_text,
				http_version,
				headers,
				mime_type,
				remote_ip,
				timing,
				monotonic_ms,
			} => {
				touch_network(&ctx);
				if let Some(recorder) = ctx.recorder.read().as_ref() {
					recorder.on_response(
						&request_id,
						status,
						&status_text,
						&http_version,
						&headers,
						&mime_type,
						remote_ip.as_deref(),
						timing,
						monotonic_ms,
					);
				}
				let time_ms = inflight.get(&request_id).map(|(_, start)| (monotonic_ms - start).max(0.0));
				ctx.hub.emit(BrowserEventPayload::ResponseReceived {
					url,
					status,
					mime_type,
					time_ms,
				});
			}
			DriverEvent::LoadingFinished {
				request_id,
				encoded_length,
				monotonic_ms,
			} => {
				touch_network(&ctx);
				let recorder = ctx.recorder.read().as_ref().cloned();
				if let Some(recorder) = recorder {
					recorder.on_loading_finished(&request_id, encoded_length, monotonic_ms, ctx.page.as_ref()).await;
				}
				inflight.remove(&request_id);
			}
			DriverEvent::LoadingFailed {
				request_id,
				error_text,
				canceled,
				monotonic_ms,
			} => {
				touch_network(&ctx);
				if let Some(recorder) = ctx.recorder.read().as_ref() {
					recorder.on_loading_failed(&request_id, &error_text, monotonic_ms);
				}
				let url = inflight.remove(&request_id).map(|(url, _)| url).unwrap_or_default();
				if !canceled {
					ctx.hub.emit(BrowserEventPayload::Error {
						message: error_text,
						source: url,
					});
				}
			}
			DriverEvent::RequestPaused(paused) => {
				if ctx.paused_tx.send(paused).await.is_err() {
					// Dispatcher gone; the session is tearing down.
					break;
				}
			}
			DriverEvent::Console { level, text, source } => {
				ctx.hub.emit(BrowserEventPayload::Console {
					level,
					message: text,
					source,
				});
			}
			DriverEvent::Lifecycle { kind, url } => {
				match kind {
					LifecycleKind::Navigation => {
						ctx.load_tx.send_modify(|state| {
							state.generation += 1;
							state.loaded = false;
						});
						if let Some(bridge) = ctx.bridge.read().as_ref() {
							bridge.on_navigation();
						}
					}
					LifecycleKind::Load => {
						ctx.load_tx.send_modify(|state| state.loaded = true);
					}
					_ => {}
				}
				ctx.hub.emit(BrowserEventPayload::PageEvent {
					kind: match kind {
						LifecycleKind::Load => PageEventKind::Load,
						LifecycleKind::DomContentLoaded => PageEventKind::DomContentLoaded,
						LifecycleKind::Navigation => PageEventKind::Navigation,
						LifecycleKind::FrameStopped => PageEventKind::FrameStop,
					},
					url,
				});
			}
			DriverEvent::BindingCalled { name, payload } => {
				if name == BINDING_NAME {
					let bridge = ctx.bridge.read().as_ref().cloned();
					if let Some(bridge) = bridge {
						bridge.handle_binding_payload(&payload);
					}
				}
			}
			DriverEvent::PageError { message, source } => {
				ctx.hub.emit(BrowserEventPayload::Error { message, source });
			}
			DriverEvent::Crashed { reason } => {
				ctx.crashed.store(true, Ordering::SeqCst);
				ctx.hub.emit(BrowserEventPayload::Error {
					message: format!("browser crashed: {reason}"),
					source: String::new(),
				});
			}
		}
	}
}

fn touch_network(ctx: &PumpContext) {
	let elapsed = ctx.started.elapsed().as_millis() as u64;
	ctx.last_network_ms.store(elapsed, Ordering::Release);
}

fn epoch_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
