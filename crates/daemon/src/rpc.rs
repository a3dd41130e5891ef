//! RPC surface of the daemon.
//!
//! Request/response methods map one-to-one onto session-manager and session
//! operations; `events_subscribe` streams a session's [`BrowserEvent`]s
//! until the client disconnects or the session is destroyed. Binary payloads
//! (screenshots, PDFs, HAR archives) travel base64-encoded inside the
//! result structs.

use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use serde_json::Value;

use scout_protocol::{
	BridgeQueryResult, BrowserEvent, Cookie, CreateSessionResult, EvalResult, ExportHarResult, HijackRule, HijackStartResult,
	ListSessionsResult, PageInfo, PdfRequest, PdfResult, ScreenshotRequest, ScreenshotResult, SessionOptions, StorageKind,
	WindowBoundsUpdate, WindowInfo,
};

#[rpc(client, server)]
pub trait ScoutRpc {
	// --- Sessions -------------------------------------------------------

	#[method(name = "session_create")]
	async fn session_create(&self, options: SessionOptions) -> RpcResult<CreateSessionResult>;

	#[method(name = "session_destroy")]
	async fn session_destroy(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "session_list")]
	async fn session_list(&self) -> RpcResult<ListSessionsResult>;

	#[method(name = "daemon_ping")]
	async fn ping(&self) -> RpcResult<bool>;

	#[method(name = "daemon_shutdown")]
	async fn shutdown(&self) -> RpcResult<()>;

	// --- Navigation -----------------------------------------------------

	#[method(name = "page_navigate")]
	async fn navigate(&self, session_id: String, url: String, wait_stable: bool, timeout_ms: Option<u64>) -> RpcResult<PageInfo>;

	#[method(name = "page_reload")]
	async fn reload(&self, session_id: String, wait_stable: bool, timeout_ms: Option<u64>) -> RpcResult<PageInfo>;

	#[method(name = "page_back")]
	async fn back(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "page_forward")]
	async fn forward(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "page_stop")]
	async fn stop(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "page_wait_load")]
	async fn wait_load(&self, session_id: String, timeout_ms: Option<u64>) -> RpcResult<()>;

	#[method(name = "page_wait_stable")]
	async fn wait_stable(&self, session_id: String, timeout_ms: Option<u64>, quiet_ms: Option<u64>) -> RpcResult<()>;

	// --- Interaction ----------------------------------------------------

	#[method(name = "page_click")]
	async fn click(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_double_click")]
	async fn double_click(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_right_click")]
	async fn right_click(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_hover")]
	async fn hover(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_type")]
	async fn type_text(&self, session_id: String, selector: String, text: String, clear_first: bool) -> RpcResult<()>;

	#[method(name = "page_press_key")]
	async fn press_key(&self, session_id: String, key: String) -> RpcResult<()>;

	#[method(name = "page_select_option")]
	async fn select_option(&self, session_id: String, selector: String, value: String) -> RpcResult<()>;

	#[method(name = "page_focus")]
	async fn focus(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_blur")]
	async fn blur(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_scroll_into_view")]
	async fn scroll_into_view(&self, session_id: String, selector: String) -> RpcResult<()>;

	#[method(name = "page_set_files")]
	async fn set_files(&self, session_id: String, selector: String, files: Vec<String>) -> RpcResult<()>;

	// --- Introspection --------------------------------------------------

	#[method(name = "page_get_title")]
	async fn get_title(&self, session_id: String) -> RpcResult<String>;

	#[method(name = "page_get_url")]
	async fn get_url(&self, session_id: String) -> RpcResult<String>;

	#[method(name = "page_get_text")]
	async fn get_text(&self, session_id: String, selector: String) -> RpcResult<String>;

	#[method(name = "page_get_attribute")]
	async fn get_attribute(&self, session_id: String, selector: String, name: String) -> RpcResult<Option<String>>;

	#[method(name = "page_get_html")]
	async fn get_html(&self, session_id: String, selector: Option<String>) -> RpcResult<String>;

	#[method(name = "page_eval")]
	async fn eval(&self, session_id: String, script: String) -> RpcResult<EvalResult>;

	#[method(name = "page_element_exists")]
	async fn element_exists(&self, session_id: String, selector: String) -> RpcResult<bool>;

	#[method(name = "page_matches")]
	async fn matches(&self, session_id: String, selector: String) -> RpcResult<u64>;

	// --- Capture --------------------------------------------------------

	#[method(name = "page_screenshot")]
	async fn screenshot(&self, session_id: String, request: ScreenshotRequest) -> RpcResult<ScreenshotResult>;

	#[method(name = "page_pdf")]
	async fn pdf(&self, session_id: String, request: PdfRequest) -> RpcResult<PdfResult>;

	#[method(name = "page_content")]
	async fn content(&self, session_id: String) -> RpcResult<String>;

	// --- Recording ------------------------------------------------------

	#[method(name = "recorder_start")]
	async fn recorder_start(&self, session_id: String, capture_body: bool) -> RpcResult<()>;

	#[method(name = "recorder_stop")]
	async fn recorder_stop(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "recorder_export")]
	async fn recorder_export(&self, session_id: String) -> RpcResult<ExportHarResult>;

	#[method(name = "recorder_clear")]
	async fn recorder_clear(&self, session_id: String) -> RpcResult<()>;

	// --- Network state --------------------------------------------------

	/// An empty map clears previously applied overrides.
	#[method(name = "net_set_headers")]
	async fn set_headers(&self, session_id: String, headers: Vec<(String, String)>) -> RpcResult<()>;

	#[method(name = "net_set_user_agent")]
	async fn set_user_agent(&self, session_id: String, user_agent: String) -> RpcResult<()>;

	#[method(name = "net_set_cookies")]
	async fn set_cookies(&self, session_id: String, cookies: Vec<Cookie>) -> RpcResult<()>;

	#[method(name = "net_get_cookies")]
	async fn get_cookies(&self, session_id: String) -> RpcResult<Vec<Cookie>>;

	#[method(name = "net_clear_cookies")]
	async fn clear_cookies(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "net_block_urls")]
	async fn block_urls(&self, session_id: String, patterns: Vec<String>) -> RpcResult<()>;

	// --- Storage --------------------------------------------------------

	#[method(name = "storage_get")]
	async fn storage_get(&self, session_id: String, kind: StorageKind, key: String) -> RpcResult<Option<String>>;

	#[method(name = "storage_set")]
	async fn storage_set(&self, session_id: String, kind: StorageKind, key: String, value: String) -> RpcResult<()>;

	#[method(name = "storage_clear")]
	async fn storage_clear(&self, session_id: String, kind: StorageKind) -> RpcResult<()>;

	// --- Hijack ---------------------------------------------------------

	#[method(name = "hijack_start")]
	async fn hijack_start(&self, session_id: String, pattern: String, rule: HijackRule) -> RpcResult<HijackStartResult>;

	#[method(name = "hijack_stop")]
	async fn hijack_stop(&self, session_id: String, router_id: u64) -> RpcResult<()>;

	// --- Window ---------------------------------------------------------

	#[method(name = "window_get")]
	async fn window_get(&self, session_id: String) -> RpcResult<WindowInfo>;

	#[method(name = "window_set")]
	async fn window_set(&self, session_id: String, bounds: WindowBoundsUpdate) -> RpcResult<()>;

	#[method(name = "window_minimize")]
	async fn window_minimize(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "window_maximize")]
	async fn window_maximize(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "window_fullscreen")]
	async fn window_fullscreen(&self, session_id: String) -> RpcResult<()>;

	#[method(name = "window_restore")]
	async fn window_restore(&self, session_id: String) -> RpcResult<()>;

	// --- Bridge ---------------------------------------------------------

	#[method(name = "bridge_send")]
	async fn bridge_send(&self, session_id: String, kind: String, payload: Value) -> RpcResult<()>;

	#[method(name = "bridge_query")]
	async fn bridge_query(&self, session_id: String, method: String, params: Value, timeout_ms: u64) -> RpcResult<BridgeQueryResult>;

	#[method(name = "bridge_observe_mutations")]
	async fn bridge_observe_mutations(&self, session_id: String, selector: String) -> RpcResult<()>;

	// --- Streaming ------------------------------------------------------

	#[subscription(name = "events_subscribe" => "events", unsubscribe = "events_unsubscribe", item = BrowserEvent)]
	async fn subscribe_events(&self, session_id: String) -> SubscriptionResult;
}
