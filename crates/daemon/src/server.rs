//! Daemon server: RPC handler over the session manager, plus the run loop
//! for the insecure and mutual-TLS listeners.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonrpsee::core::{RpcResult, SubscriptionResult, async_trait};
use jsonrpsee::server::{PendingSubscriptionSink, Server, ServerBuilder, SubscriptionMessage, serve_with_graceful_shutdown, stop_channel};
use jsonrpsee::types::error::ErrorObjectOwned;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::identity::{DeviceIdentity, TrustStore};
use crate::rpc::ScoutRpcServer;
use crate::tls::build_acceptor;
use scout_core::{Error as CoreError, NavigateOptions, RecorderOptions, Session, SessionManager};
use scout_protocol::{
	BridgeQueryResult, Cookie, CreateSessionResult, EvalResult, ExportHarResult, HijackRule, HijackStartResult, ListSessionsResult,
	PageInfo, PdfRequest, PdfResult, ScreenshotRequest, ScreenshotResult, SessionOptions, StorageKind, WindowBoundsUpdate, WindowInfo,
};

const DEFAULT_NAVIGATE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_QUIET_MS: u64 = 500;

/// Maps an engine error onto a stable JSON-RPC error object. The numeric
/// code identifies the taxonomy entry; the data payload repeats it as a
/// kebab-case string.
pub fn rpc_error(err: CoreError) -> ErrorObjectOwned {
	let code = match &err {
		CoreError::SessionNotFound(_) => -32001,
		CoreError::SessionGone => -32002,
		CoreError::SessionLimitExceeded(_) => -32003,
		CoreError::LaunchFailed(_) => -32004,
		CoreError::ConfigInvalid(_) => -32005,
		CoreError::NavigationTimeout { .. } => -32010,
		CoreError::NavigationFailed(_) => -32011,
		CoreError::SelectorNotFound(_) => -32020,
		CoreError::ElementNotInteractable(_) => -32021,
		CoreError::ElementDetached(_) => -32022,
		CoreError::EvalFailed(_) => -32030,
		CoreError::Driver(_) => -32031,
		CoreError::ExportFailed(_) => -32040,
		CoreError::NotRecording => -32041,
		CoreError::PatternInvalid(_) => -32050,
		CoreError::RouterStopped => -32051,
		CoreError::QueryTimeout(_) => -32060,
		CoreError::QueryError(_) => -32061,
		CoreError::DeadlineExceeded => -32070,
		CoreError::Cancelled => -32071,
	};
	ErrorObjectOwned::owned(code, err.to_string(), Some(json!({ "code": err.code() })))
}

/// RPC handler: every method resolves the session and delegates.
pub struct ScoutRpcHandler {
	manager: Arc<SessionManager>,
	shutdown_tx: watch::Sender<bool>,
}

impl ScoutRpcHandler {
	pub fn new(manager: Arc<SessionManager>, shutdown_tx: watch::Sender<bool>) -> Self {
		Self { manager, shutdown_tx }
	}

	fn session(&self, id: &str) -> RpcResult<Arc<Session>> {
		self.manager.lookup(id).map_err(rpc_error)
	}
}

fn navigate_options(wait_stable: bool, timeout_ms: Option<u64>) -> NavigateOptions {
	NavigateOptions {
		wait_stable,
		timeout: Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_NAVIGATE_TIMEOUT_MS)),
		quiet_period: Duration::from_millis(DEFAULT_QUIET_MS),
	}
}

#[async_trait]
impl ScoutRpcServer for ScoutRpcHandler {
	async fn session_create(&self, options: SessionOptions) -> RpcResult<CreateSessionResult> {
		let session = self.manager.create(options).await.map_err(rpc_error)?;
		let meta = session.meta().await;
		Ok(CreateSessionResult {
			session_id: meta.id,
			url: meta.url,
			title: meta.title,
		})
	}

	async fn session_destroy(&self, session_id: String) -> RpcResult<()> {
		self.manager.destroy(&session_id).await.map_err(rpc_error)
	}

	async fn session_list(&self) -> RpcResult<ListSessionsResult> {
		Ok(ListSessionsResult {
			sessions: self.manager.list().await,
		})
	}

	async fn ping(&self) -> RpcResult<bool> {
		Ok(true)
	}

	async fn shutdown(&self) -> RpcResult<()> {
		let _ = self.shutdown_tx.send(true);
		Ok(())
	}

	async fn navigate(&self, session_id: String, url: String, wait_stable: bool, timeout_ms: Option<u64>) -> RpcResult<PageInfo> {
		let session = self.session(&session_id)?;
		session.navigate(&url, navigate_options(wait_stable, timeout_ms)).await.map_err(rpc_error)?;
		let meta = session.meta().await;
		Ok(PageInfo {
			url: meta.url,
			title: meta.title,
		})
	}

	async fn reload(&self, session_id: String, wait_stable: bool, timeout_ms: Option<u64>) -> RpcResult<PageInfo> {
		let session = self.session(&session_id)?;
		session.reload(navigate_options(wait_stable, timeout_ms)).await.map_err(rpc_error)?;
		let meta = session.meta().await;
		Ok(PageInfo {
			url: meta.url,
			title: meta.title,
		})
	}

	async fn back(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.back().await.map_err(rpc_error)
	}

	async fn forward(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.forward().await.map_err(rpc_error)
	}

	async fn stop(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.stop().await.map_err(rpc_error)
	}

	async fn wait_load(&self, session_id: String, timeout_ms: Option<u64>) -> RpcResult<()> {
		self.session(&session_id)?
			.wait_load(Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS)))
			.await
			.map_err(rpc_error)
	}

	async fn wait_stable(&self, session_id: String, timeout_ms: Option<u64>, quiet_ms: Option<u64>) -> RpcResult<()> {
		self.session(&session_id)?
			.wait_stable(
				Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS)),
				Duration::from_millis(quiet_ms.unwrap_or(DEFAULT_QUIET_MS)),
			)
			.await
			.map_err(rpc_error)
	}

	async fn click(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.click(&selector).await.map_err(rpc_error)
	}

	async fn double_click(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.double_click(&selector).await.map_err(rpc_error)
	}

	async fn right_click(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.right_click(&selector).await.map_err(rpc_error)
	}

	async fn hover(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.hover(&selector).await.map_err(rpc_error)
	}

	async fn type_text(&self, session_id: String, selector: String, text: String, clear_first: bool) -> RpcResult<()> {
		self.session(&session_id)?.type_text(&selector, &text, clear_first).await.map_err(rpc_error)
	}

	async fn press_key(&self, session_id: String, key: String) -> RpcResult<()> {
		self.session(&session_id)?.press_key(&key).await.map_err(rpc_error)
	}

	async fn select_option(&self, session_id: String, selector: String, value: String) -> RpcResult<()> {
		self.session(&session_id)?.select_option(&selector, &value).await.map_err(rpc_error)
	}

	async fn focus(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.focus(&selector).await.map_err(rpc_error)
	}

	async fn blur(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.blur(&selector).await.map_err(rpc_error)
	}

	async fn scroll_into_view(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.scroll_into_view(&selector).await.map_err(rpc_error)
	}

	async fn set_files(&self, session_id: String, selector: String, files: Vec<String>) -> RpcResult<()> {
		self.session(&session_id)?.set_files(&selector, &files).await.map_err(rpc_error)
	}

	async fn get_title(&self, session_id: String) -> RpcResult<String> {
		self.session(&session_id)?.title().await.map_err(rpc_error)
	}

	async fn get_url(&self, session_id: String) -> RpcResult<String> {
		self.session(&session_id)?.url().await.map_err(rpc_error)
	}

	async fn get_text(&self, session_id: String, selector: String) -> RpcResult<String> {
		self.session(&session_id)?.get_text(&selector).await.map_err(rpc_error)
	}

	async fn get_attribute(&self, session_id: String, selector: String, name: String) -> RpcResult<Option<String>> {
		self.session(&session_id)?.get_attribute(&selector, &name).await.map_err(rpc_error)
	}

	async fn get_html(&self, session_id: String, selector: Option<String>) -> RpcResult<String> {
		self.session(&session_id)?.get_html(selector.as_deref()).await.map_err(rpc_error)
	}

	async fn eval(&self, session_id: String, script: String) -> RpcResult<EvalResult> {
		let value = self.session(&session_id)?.eval(&script).await.map_err(rpc_error)?;
		Ok(EvalResult::from_value(&value))
	}

	async fn element_exists(&self, session_id: String, selector: String) -> RpcResult<bool> {
		self.session(&session_id)?.element_exists(&selector).await.map_err(rpc_error)
	}

	async fn matches(&self, session_id: String, selector: String) -> RpcResult<u64> {
		self.session(&session_id)?.matches_count(&selector).await.map_err(rpc_error)
	}

	async fn screenshot(&self, session_id: String, request: ScreenshotRequest) -> RpcResult<ScreenshotResult> {
		let data = self.session(&session_id)?.screenshot(&request).await.map_err(rpc_error)?;
		Ok(ScreenshotResult { data })
	}

	async fn pdf(&self, session_id: String, request: PdfRequest) -> RpcResult<PdfResult> {
		let data = self.session(&session_id)?.pdf(&request).await.map_err(rpc_error)?;
		Ok(PdfResult { data })
	}

	async fn content(&self, session_id: String) -> RpcResult<String> {
		self.session(&session_id)?.content().await.map_err(rpc_error)
	}

	async fn recorder_start(&self, session_id: String, capture_body: bool) -> RpcResult<()> {
		self.session(&session_id)?.start_recorder(RecorderOptions { capture_body }).map_err(rpc_error)
	}

	async fn recorder_stop(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.stop_recorder().map_err(rpc_error)
	}

	async fn recorder_export(&self, session_id: String) -> RpcResult<ExportHarResult> {
		let (har, entry_count) = self.session(&session_id)?.export_har().map_err(rpc_error)?;
		Ok(ExportHarResult { har, entry_count })
	}

	async fn recorder_clear(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.clear_recorder().map_err(rpc_error)
	}

	async fn set_headers(&self, session_id: String, headers: Vec<(String, String)>) -> RpcResult<()> {
		// The RPC surface manages override lifetime explicitly; the cleanup
		// handle is a library-level affordance.
		let _handle = self.session(&session_id)?.set_headers(&headers).await.map_err(rpc_error)?;
		Ok(())
	}

	async fn set_user_agent(&self, session_id: String, user_agent: String) -> RpcResult<()> {
		self.session(&session_id)?.set_user_agent(&user_agent).await.map_err(rpc_error)
	}

	async fn set_cookies(&self, session_id: String, cookies: Vec<Cookie>) -> RpcResult<()> {
		self.session(&session_id)?.set_cookies(&cookies).await.map_err(rpc_error)
	}

	async fn get_cookies(&self, session_id: String) -> RpcResult<Vec<Cookie>> {
		self.session(&session_id)?.cookies().await.map_err(rpc_error)
	}

	async fn clear_cookies(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.clear_cookies().await.map_err(rpc_error)
	}

	async fn block_urls(&self, session_id: String, patterns: Vec<String>) -> RpcResult<()> {
		self.session(&session_id)?.block_urls(&patterns).await.map_err(rpc_error)
	}

	async fn storage_get(&self, session_id: String, kind: StorageKind, key: String) -> RpcResult<Option<String>> {
		self.session(&session_id)?.storage_get(kind, &key).await.map_err(rpc_error)
	}

	async fn storage_set(&self, session_id: String, kind: StorageKind, key: String, value: String) -> RpcResult<()> {
		self.session(&session_id)?.storage_set(kind, &key, &value).await.map_err(rpc_error)
	}

	async fn storage_clear(&self, session_id: String, kind: StorageKind) -> RpcResult<()> {
		self.session(&session_id)?.storage_clear(kind).await.map_err(rpc_error)
	}

	async fn hijack_start(&self, session_id: String, pattern: String, rule: HijackRule) -> RpcResult<HijackStartResult> {
		let router_id = self.session(&session_id)?.hijack_rule(&pattern, rule).await.map_err(rpc_error)?;
		Ok(HijackStartResult { router_id })
	}

	async fn hijack_stop(&self, session_id: String, router_id: u64) -> RpcResult<()> {
		self.session(&session_id)?.stop_hijack(router_id).await.map_err(rpc_error)
	}

	async fn window_get(&self, session_id: String) -> RpcResult<WindowInfo> {
		self.session(&session_id)?.window().await.map_err(rpc_error)
	}

	async fn window_set(&self, session_id: String, bounds: WindowBoundsUpdate) -> RpcResult<()> {
		self.session(&session_id)?.set_window(&bounds).await.map_err(rpc_error)
	}

	async fn window_minimize(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.minimize().await.map_err(rpc_error)
	}

	async fn window_maximize(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.maximize().await.map_err(rpc_error)
	}

	async fn window_fullscreen(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.fullscreen().await.map_err(rpc_error)
	}

	async fn window_restore(&self, session_id: String) -> RpcResult<()> {
		self.session(&session_id)?.restore().await.map_err(rpc_error)
	}

	async fn bridge_send(&self, session_id: String, kind: String, payload: Value) -> RpcResult<()> {
		self.session(&session_id)?.bridge_send(&kind, payload).await.map_err(rpc_error)
	}

	async fn bridge_query(&self, session_id: String, method: String, params: Value, timeout_ms: u64) -> RpcResult<BridgeQueryResult> {
		let result = self
			.session(&session_id)?
			.bridge_query(&method, params, Duration::from_millis(timeout_ms))
			.await
			.map_err(rpc_error)?;
		Ok(BridgeQueryResult { result })
	}

	async fn bridge_observe_mutations(&self, session_id: String, selector: String) -> RpcResult<()> {
		self.session(&session_id)?.bridge_observe_mutations(&selector).await.map_err(rpc_error)
	}

	async fn subscribe_events(&self, pending: PendingSubscriptionSink, session_id: String) -> SubscriptionResult {
		let session = self.session(&session_id).map_err(|e| e.to_string())?;
		let mut subscription = session.subscribe_events().map_err(|e| e.to_string())?;
		let sink = pending.accept().await.map_err(|e| e.to_string())?;

		tokio::spawn(async move {
			loop {
				tokio::select! {
					event = subscription.recv() => {
						let Some(event) = event else { break };
						let Ok(message) = SubscriptionMessage::from_json(&event) else { break };
						if sink.send(message).await.is_err() {
							break;
						}
					}
					_ = sink.closed() => break,
				}
			}
			if subscription.gap_count() > 0 {
				debug!(target = "scout.daemon", gaps = subscription.gap_count(), "subscription ended with dropped events");
			}
		});
		Ok(())
	}
}

/// Listener configuration for [`Daemon::run`].
pub struct DaemonConfig {
	pub listen: String,
	pub insecure: bool,
	pub identity_dir: std::path::PathBuf,
	pub max_sessions: usize,
	pub max_message_mib: u32,
	pub shutdown_deadline: Duration,
}

/// The daemon process: one session manager, one listener, signal-driven
/// shutdown.
pub struct Daemon {
	config: DaemonConfig,
	manager: Arc<SessionManager>,
	shutdown_tx: watch::Sender<bool>,
	shutdown_rx: watch::Receiver<bool>,
}

impl Daemon {
	pub fn new(config: DaemonConfig, launcher: Arc<dyn scout_driver::Launcher>) -> Self {
		let manager = SessionManager::new(launcher, config.max_sessions);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		Self {
			config,
			manager,
			shutdown_tx,
			shutdown_rx,
		}
	}

	pub fn manager(&self) -> &Arc<SessionManager> {
		&self.manager
	}

	pub async fn run(mut self) -> Result<()> {
		let max_bytes = self.config.max_message_mib.saturating_mul(1024 * 1024);
		let rpc = ScoutRpcHandler::new(Arc::clone(&self.manager), self.shutdown_tx.clone()).into_rpc();

		if self.config.insecure {
			let server = ServerBuilder::default()
				.max_request_body_size(max_bytes)
				.max_response_body_size(max_bytes)
				.build(&self.config.listen)
				.await
				.with_context(|| format!("binding RPC server on {}", self.config.listen))?;
			let addr = server.local_addr().context("reading local addr")?;
			let handle = server.start(rpc);
			info!(target = "scout.daemon", %addr, "daemon listening (insecure)");

			self.wait_for_shutdown().await;
			self.manager.shutdown(self.config.shutdown_deadline).await;
			let _ = handle.stop();
			handle.stopped().await;
			return Ok(());
		}

		let identity = DeviceIdentity::load_or_generate(&self.config.identity_dir)?;
		let trust = Arc::new(TrustStore::load(&self.config.identity_dir)?);
		if trust.is_empty() {
			warn!(target = "scout.daemon", "trust store is empty; no peer can connect. Enroll one with --trust <device-id>");
		}
		info!(target = "scout.daemon", device_id = %identity.device_id(), "loaded device identity");

		let acceptor = build_acceptor(&identity, trust)?;
		let listener = TcpListener::bind(&self.config.listen)
			.await
			.with_context(|| format!("binding TLS listener on {}", self.config.listen))?;
		let addr = listener.local_addr().context("reading local addr")?;

		let (stop_handle, server_handle) = stop_channel();
		let svc_builder = Server::builder()
			.max_request_body_size(max_bytes)
			.max_response_body_size(max_bytes)
			.to_service_builder();
		info!(target = "scout.daemon", %addr, "daemon listening (mutual TLS)");

		let accept_stop = stop_handle.clone();
		tokio::spawn(async move {
			loop {
				let stream = tokio::select! {
					accepted = listener.accept() => match accepted {
						Ok((stream, _)) => stream,
						Err(e) => {
							debug!(target = "scout.daemon", error = %e, "accept failed");
							continue;
						}
					},
					_ = accept_stop.clone().shutdown() => break,
				};

				let acceptor = acceptor.clone();
				let svc = svc_builder.clone().build(rpc.clone(), stop_handle.clone());
				let conn_stop = stop_handle.clone();
				tokio::spawn(async move {
					match acceptor.accept(stream).await {
						Ok(tls_stream) => {
							let _ = serve_with_graceful_shutdown(tls_stream, svc, conn_stop.shutdown()).await;
						}
						Err(e) => debug!(target = "scout.daemon", error = %e, "TLS handshake failed"),
					}
				});
			}
		});

		self.wait_for_shutdown().await;
		self.manager.shutdown(self.config.shutdown_deadline).await;
		let _ = server_handle.stop();
		server_handle.stopped().await;
		Ok(())
	}

	#[cfg(unix)]
	async fn wait_for_shutdown(&mut self) {
		use tokio::signal::unix::{SignalKind, signal};

		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(s) => s,
			Err(e) => {
				warn!(target = "scout.daemon", error = %e, "failed to install SIGTERM handler");
				let _ = self.shutdown_rx.changed().await;
				return;
			}
		};
		let mut sigint = match signal(SignalKind::interrupt()) {
			Ok(s) => s,
			Err(e) => {
				warn!(target = "scout.daemon", error = %e, "failed to install SIGINT handler");
				let _ = self.shutdown_rx.changed().await;
				return;
			}
		};

		loop {
			tokio::select! {
				_ = self.shutdown_rx.changed() => {
					if *self.shutdown_rx.borrow() {
						info!(target = "scout.daemon", "shutdown requested via RPC");
						break;
					}
				}
				_ = sigterm.recv() => {
					info!(target = "scout.daemon", "received SIGTERM, shutting down");
					break;
				}
				_ = sigint.recv() => {
					info!(target = "scout.daemon", "received SIGINT, shutting down");
					break;
				}
			}
		}
	}

	#[cfg(windows)]
	async fn wait_for_shutdown(&mut self) {
		loop {
			tokio::select! {
				_ = self.shutdown_rx.changed() => {
					if *self.shutdown_rx.borrow() {
						info!(target = "scout.daemon", "shutdown requested via RPC");
						break;
					}
				}
				_ = tokio::signal::ctrl_c() => {
					info!(target = "scout.daemon", "received Ctrl+C, shutting down");
					break;
				}
			}
		}
	}
}
