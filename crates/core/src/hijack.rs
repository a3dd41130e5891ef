//! Request hijacking: pattern routers, handler dispatch, dispositions.
//!
//! A session registers any number of [`HijackRouter`]s, each a compiled URL
//! glob plus a synchronous handler. One dispatcher task per session drains
//! paused requests from the driver and offers each to the matching routers
//! in registration order; the first non-[`Disposition::Skip`] disposition is
//! applied through the driver. Handlers run under a per-request deadline; a
//! handler that overruns it forfeits the request, which continues unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use scout_driver::{PageDriver, PausedRequest};
use scout_protocol::HijackRule;

/// Per-request handler deadline.
pub const HANDLER_DEADLINE: Duration = Duration::from_secs(10);

/// What should happen to an intercepted request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Disposition {
	/// Forward upstream unchanged (the default when a handler returns
	/// without deciding).
	#[default]
	Continue,
	/// Answer from the handler without upstream traffic.
	Fulfill {
		status: u16,
		headers: Vec<(String, String)>,
		body: Vec<u8>,
	},
	/// Abort with a driver-recognized error reason.
	Fail { reason: String },
	/// Leave the request to the next matching router.
	Skip,
	/// Forward upstream, then rewrite the response before the page sees it.
	LoadThenModify(ResponseModifier),
}

/// Response rewrite applied by a load-then-modify disposition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseModifier {
	pub set_status: Option<u16>,
	pub set_headers: Vec<(String, String)>,
	/// Replacement body; the upstream body is kept when `None`.
	pub body: Option<Vec<u8>>,
}

/// The request handed to a hijack handler: read accessors plus exactly one
/// disposition, applied after the handler returns.
#[derive(Debug)]
pub struct InterceptedRequest {
	method: String,
	url: String,
	headers: Vec<(String, String)>,
	body: Option<String>,
	resource_type: String,
	disposition: Disposition,
}

impl InterceptedRequest {
	fn from_paused(paused: &PausedRequest) -> Self {
		Self {
			method: paused.method.clone(),
			url: paused.url.clone(),
			headers: paused.headers.clone(),
			body: paused.post_data.clone(),
			resource_type: paused.resource_type.clone(),
			disposition: Disposition::default(),
		}
	}

	pub fn method(&self) -> &str {
		&self.method
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(n, _)| n.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	pub fn headers(&self) -> &[(String, String)] {
		&self.headers
	}

	/// Request body, when the driver captured one.
	pub fn body(&self) -> Option<&str> {
		self.body.as_deref()
	}

	pub fn resource_type(&self) -> &str {
		&self.resource_type
	}

	pub fn continue_request(&mut self) {
		self.disposition = Disposition::Continue;
	}

	pub fn fulfill(&mut self, status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) {
		self.disposition = Disposition::Fulfill {
			status,
			headers,
			body: body.into(),
		};
	}

	pub fn fail(&mut self, reason: impl Into<String>) {
		self.disposition = Disposition::Fail { reason: reason.into() };
	}

	pub fn skip(&mut self) {
		self.disposition = Disposition::Skip;
	}

	pub fn load_then_modify(&mut self, modifier: ResponseModifier) {
		self.disposition = Disposition::LoadThenModify(modifier);
	}

	pub fn disposition(&self) -> &Disposition {
		&self.disposition
	}
}

/// Synchronous hijack handler. Must not block; the dispatcher enforces
/// [`HANDLER_DEADLINE`].
pub type HijackHandler = Arc<dyn Fn(&mut InterceptedRequest) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
	Running,
	Stopped,
}

/// One registered pattern + handler.
pub struct HijackRouter {
	id: u64,
	pattern: glob::Pattern,
	handler: HijackHandler,
	state: Mutex<RouterState>,
}

impl HijackRouter {
	fn new(id: u64, pattern: &str, handler: HijackHandler) -> Result<Self> {
		let pattern = glob::Pattern::new(pattern).map_err(|e| Error::PatternInvalid(format!("{pattern}: {e}")))?;
		Ok(Self {
			id,
			pattern,
			handler,
			state: Mutex::new(RouterState::Running),
		})
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn pattern(&self) -> &str {
		self.pattern.as_str()
	}

	pub fn is_stopped(&self) -> bool {
		*self.state.lock() == RouterState::Stopped
	}

	/// Stops the router. Terminal; stopping twice is a no-op.
	pub fn stop(&self) {
		*self.state.lock() = RouterState::Stopped;
	}

	fn matches(&self, url: &str) -> bool {
		!self.is_stopped() && self.pattern.matches(url)
	}
}

/// A session's router set, in registration order.
#[derive(Default)]
pub struct HijackRegistry {
	routers: Mutex<IndexMap<u64, Arc<HijackRouter>>>,
	next_id: AtomicU64,
}

impl HijackRegistry {
	pub fn new() -> Self {
		Self {
			routers: Mutex::new(IndexMap::new()),
			next_id: AtomicU64::new(1),
		}
	}

	/// Registers a router and returns its ID. Matching follows registration
	/// order.
	pub fn register(&self, pattern: &str, handler: HijackHandler) -> Result<u64> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let router = Arc::new(HijackRouter::new(id, pattern, handler)?);
		self.routers.lock().insert(id, router);
		Ok(id)
	}

	/// Stops a router by ID. Unknown IDs report [`Error::RouterStopped`];
	/// stopping an already-stopped router is a no-op.
	pub fn stop(&self, id: u64) -> Result<()> {
		let routers = self.routers.lock();
		let router = routers.get(&id).ok_or(Error::RouterStopped)?;
		router.stop();
		Ok(())
	}

	pub fn stop_all(&self) {
		for router in self.routers.lock().values() {
			router.stop();
		}
	}

	pub fn running_count(&self) -> usize {
		self.routers.lock().values().filter(|r| !r.is_stopped()).count()
	}

	fn snapshot(&self) -> Vec<Arc<HijackRouter>> {
		self.routers.lock().values().cloned().collect()
	}
}

/// Compiles a declarative RPC rule into a handler.
pub fn rule_handler(rule: HijackRule) -> HijackHandler {
	Arc::new(move |request: &mut InterceptedRequest| match &rule {
		HijackRule::Fulfill {
			status,
			headers,
			body,
			body_base64,
		} => {
			let bytes = if *body_base64 {
				BASE64.decode(body.as_bytes()).unwrap_or_else(|_| body.clone().into_bytes())
			} else {
				body.clone().into_bytes()
			};
			request.fulfill(*status, headers.clone(), bytes);
		}
		HijackRule::Fail { reason } => request.fail(reason.clone()),
		HijackRule::Continue { set_headers } => {
			if set_headers.is_empty() {
				request.continue_request();
			} else {
				// Header overrides ride on the continue disposition.
				request.headers = merge_headers(&request.headers, set_headers);
				request.continue_request();
			}
		}
		HijackRule::ModifyResponse {
			set_status,
			set_headers,
			body,
		} => request.load_then_modify(ResponseModifier {
			set_status: *set_status,
			set_headers: set_headers.clone(),
			body: body.clone().map(String::into_bytes),
		}),
	})
}

fn merge_headers(base: &[(String, String)], overrides: &[(String, String)]) -> Vec<(String, String)> {
	let mut merged: Vec<(String, String)> = base
		.iter()
		.filter(|(name, _)| !overrides.iter().any(|(o, _)| o.eq_ignore_ascii_case(name)))
		.cloned()
		.collect();
	merged.extend_from_slice(overrides);
	merged
}

/// Runs a session's dispatch loop until the paused-request channel closes.
///
/// Request-stage pauses go through the routers; response-stage pauses apply
/// a previously registered [`ResponseModifier`] or continue untouched.
pub(crate) async fn dispatch_loop(
	mut paused_rx: mpsc::Receiver<PausedRequest>,
	registry: Arc<HijackRegistry>,
	page: Arc<dyn PageDriver>,
	handler_deadline: Duration,
) {
	// Modifiers keyed by network request ID, applied at the response stage.
	let mut modifiers: HashMap<String, ResponseModifier> = HashMap::new();

	while let Some(paused) = paused_rx.recv().await {
		if paused.is_response_stage() {
			handle_response_stage(&paused, &mut modifiers, page.as_ref()).await;
			continue;
		}
		handle_request_stage(&paused, &registry, &mut modifiers, page.as_ref(), handler_deadline).await;
	}
}

async fn handle_request_stage(
	paused: &PausedRequest,
	registry: &HijackRegistry,
	modifiers: &mut HashMap<String, ResponseModifier>,
	page: &dyn PageDriver,
	handler_deadline: Duration,
) {
	let routers = registry.snapshot();
	let mut applied = false;

	for router in routers {
		if !router.matches(&paused.url) {
			continue;
		}

		let handler = Arc::clone(&router.handler);
		let mut request = InterceptedRequest::from_paused(paused);
		let ran = tokio::time::timeout(
			handler_deadline,
			tokio::task::spawn_blocking(move || {
				handler(&mut request);
				request
			}),
		)
		.await;

		let request = match ran {
			Ok(Ok(request)) => request,
			Ok(Err(join_err)) => {
				tracing::error!(target = "scout.hijack", router = router.id, error = %join_err, "hijack handler panicked");
				break;
			}
			Err(_) => {
				tracing::warn!(
					target = "scout.hijack",
					router = router.id,
					url = %paused.url,
					"hijack handler deadline exceeded, continuing request"
				);
				break;
			}
		};

		match request.disposition {
			Disposition::Skip => continue,
			Disposition::Continue => {
				apply(page.continue_request(&paused.interception_id, Some(&request.headers)).await, &paused.url);
				applied = true;
			}
			Disposition::Fulfill { status, headers, body } => {
				apply(page.fulfill_request(&paused.interception_id, status, &headers, &body).await, &paused.url);
				applied = true;
			}
			Disposition::Fail { reason } => {
				apply(page.fail_request(&paused.interception_id, &reason).await, &paused.url);
				applied = true;
			}
			Disposition::LoadThenModify(modifier) => {
				let key = paused.network_id.clone().unwrap_or_else(|| paused.interception_id.clone());
				modifiers.insert(key, modifier);
				apply(page.continue_request(&paused.interception_id, None).await, &paused.url);
				applied = true;
			}
		}
		break;
	}

	if !applied {
		apply(page.continue_request(&paused.interception_id, None).await, &paused.url);
	}
}

async fn handle_response_stage(paused: &PausedRequest, modifiers: &mut HashMap<String, ResponseModifier>, page: &dyn PageDriver) {
	let key = paused.network_id.clone().unwrap_or_else(|| paused.interception_id.clone());
	let Some(modifier) = modifiers.remove(&key) else {
		apply(page.continue_request(&paused.interception_id, None).await, &paused.url);
		return;
	};

	let body = match modifier.body {
		Some(body) => body,
		None => page.paused_response_body(&paused.interception_id).await.unwrap_or_default(),
	};
	let status = modifier.set_status.or(paused.response_status).unwrap_or(200);
	let headers = match &paused.response_headers {
		Some(upstream) => merge_headers(upstream, &modifier.set_headers),
		None => modifier.set_headers.clone(),
	};
	apply(page.fulfill_request(&paused.interception_id, status, &headers, &body).await, &paused.url);
}

fn apply(result: scout_driver::Result<()>, url: &str) {
	if let Err(e) = result {
		tracing::debug!(target = "scout.hijack", url = %url, error = %e, "disposition failed");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn noop_handler() -> HijackHandler {
		Arc::new(|_| {})
	}

	#[test]
	fn invalid_pattern_is_rejected() {
		let registry = HijackRegistry::new();
		let err = registry.register("[invalid", noop_handler()).unwrap_err();
		assert!(matches!(err, Error::PatternInvalid(_)));
	}

	#[test]
	fn router_stop_is_terminal_and_idempotent() {
		let registry = HijackRegistry::new();
		let id = registry.register("*/echo", noop_handler()).unwrap();
		assert_eq!(registry.running_count(), 1);

		registry.stop(id).unwrap();
		assert_eq!(registry.running_count(), 0);
		// Stopping again is a no-op, not an error.
		registry.stop(id).unwrap();
		// Unknown IDs do error.
		assert!(matches!(registry.stop(999), Err(Error::RouterStopped)));
	}

	#[test]
	fn default_disposition_is_continue() {
		let paused = PausedRequest {
			interception_id: "int-1".to_string(),
			network_id: None,
			url: "http://t/".to_string(),
			method: "GET".to_string(),
			headers: Vec::new(),
			post_data: None,
			resource_type: "Document".to_string(),
			response_status: None,
			response_headers: None,
		};
		let request = InterceptedRequest::from_paused(&paused);
		assert_eq!(*request.disposition(), Disposition::Continue);
	}

	#[test]
	fn header_accessor_is_case_insensitive() {
		let paused = PausedRequest {
			interception_id: "int-1".to_string(),
			network_id: None,
			url: "http://t/".to_string(),
			method: "GET".to_string(),
			headers: vec![("Content-Type".to_string(), "text/html".to_string())],
			post_data: None,
			resource_type: "Document".to_string(),
			response_status: None,
			response_headers: None,
		};
		let request = InterceptedRequest::from_paused(&paused);
		assert_eq!(request.header("content-type"), Some("text/html"));
		assert_eq!(request.header("missing"), None);
	}

	#[test]
	fn merge_headers_overrides_case_insensitively() {
		let base = vec![
			("Accept".to_string(), "*/*".to_string()),
			("X-Token".to_string(), "old".to_string()),
		];
		let overrides = vec![("x-token".to_string(), "new".to_string())];
		let merged = merge_headers(&base, &overrides);
		assert_eq!(merged.len(), 2);
		assert!(merged.contains(&("x-token".to_string(), "new".to_string())));
		assert!(!merged.iter().any(|(_, v)| v == "old"));
	}

	#[test]
	fn rule_handler_fulfill_decodes_base64() {
		let handler = rule_handler(HijackRule::Fulfill {
			status: 201,
			headers: Vec::new(),
			body: BASE64.encode(b"payload"),
			body_base64: true,
		});
		let paused = PausedRequest {
			interception_id: "int-1".to_string(),
			network_id: None,
			url: "http://t/".to_string(),
			method: "GET".to_string(),
			headers: Vec::new(),
			post_data: None,
			resource_type: "Document".to_string(),
			response_status: None,
			response_headers: None,
		};
		let mut request = InterceptedRequest::from_paused(&paused);
		handler(&mut request);
		match request.disposition() {
			Disposition::Fulfill { status, body, .. } => {
				assert_eq!(*status, 201);
				assert_eq!(body, b"payload");
			}
			other => panic!("unexpected disposition: {other:?}"),
		}
	}
}
