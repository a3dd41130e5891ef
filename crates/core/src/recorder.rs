//! Network recorder: devtools events in, HAR 1.2 entries out.
//!
//! Requests are tracked by driver-issued request ID. An entry is born
//! pending on request-will-be-sent, gains response headers on
//! response-received, and moves exactly once to the finalized output list on
//! loading-finished or loading-failed. Pending entries never appear in an
//! export. Events for IDs with no pending entry are dropped silently, so a
//! lost request start never produces a half-built entry.

use std::collections::HashMap;

use parking_lot::Mutex;
use url::Url;

use crate::error::{Error, Result};
use scout_driver::{PageDriver, ResourceTiming};
use scout_protocol::{Har, HarCache, HarContent, HarEntry, HarHeader, HarPostData, HarQueryParam, HarRequest, HarResponse, HarTimings};

/// Recorder configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderOptions {
	/// Fetch and embed response bodies on successful finalization.
	pub capture_body: bool,
}

struct PendingResponse {
	status: u16,
	status_text: String,
	http_version: String,
	headers: Vec<(String, String)>,
	mime_type: String,
	remote_ip: Option<String>,
	timing: Option<ResourceTiming>,
	header_monotonic_ms: f64,
}

struct PendingEntry {
	method: String,
	url: String,
	headers: Vec<(String, String)>,
	post_data: Option<String>,
	started_wall_ms: f64,
	started_monotonic_ms: f64,
	response: Option<PendingResponse>,
}

#[derive(Default)]
struct RecorderState {
	pending: HashMap<String, PendingEntry>,
	entries: Vec<HarEntry>,
	/// Bumped by `clear` so an in-flight finalize from before the clear
	/// cannot resurrect an entry.
	generation: u64,
	stopped: bool,
}

/// Assembles a HAR archive from one page's network traffic.
pub struct NetworkRecorder {
	capture_body: bool,
	state: Mutex<RecorderState>,
}

impl NetworkRecorder {
	pub fn new(options: RecorderOptions) -> Self {
		Self {
			capture_body: options.capture_body,
			state: Mutex::new(RecorderState::default()),
		}
	}

	pub fn capture_body(&self) -> bool {
		self.capture_body
	}

	/// Opens a pending entry for a freshly issued request.
	pub fn on_request(
		&self,
		request_id: &str,
		method: &str,
		url: &str,
		headers: &[(String, String)],
		post_data: Option<&str>,
		wall_time_ms: f64,
		monotonic_ms: f64,
	) {
		let mut state = self.state.lock();
		if state.stopped {
			return;
		}
		state.pending.insert(
			request_id.to_string(),
			PendingEntry {
				method: method.to_string(),
				url: url.to_string(),
				headers: headers.to_vec(),
				post_data: post_data.map(str::to_string),
				started_wall_ms: wall_time_ms,
				started_monotonic_ms: monotonic_ms,
				response: None,
			},
		);
	}

	/// Attaches response headers to a pending entry.
	#[allow(clippy::too_many_arguments)]
	pub fn on_response(
		&self,
		request_id: &str,
		status: u16,
		status_text: &str,
		http_version: &str,
		headers: &[(String, String)],
		mime_type: &str,
		remote_ip: Option<&str>,
		timing: Option<ResourceTiming>,
		monotonic_ms: f64,
	) {
		let mut state = self.state.lock();
		if state.stopped {
			return;
		}
		let Some(pending) = state.pending.get_mut(request_id) else {
			return;
		};
		pending.response = Some(PendingResponse {
			status,
			status_text: status_text.to_string(),
			http_version: http_version.to_string(),
			headers: headers.to_vec(),
			mime_type: mime_type.to_string(),
			remote_ip: remote_ip.map(str::to_string),
			timing,
			header_monotonic_ms: monotonic_ms,
		});
	}

	/// Finalizes a successful transaction, optionally fetching its body from
	/// the driver. Unknown request IDs are dropped.
	pub async fn on_loading_finished(&self, request_id: &str, encoded_length: i64, monotonic_ms: f64, page: &dyn PageDriver) {
		let (pending, generation) = {
			let mut state = self.state.lock();
			if state.stopped {
				return;
			}
			let Some(pending) = state.pending.remove(request_id) else {
				return;
			};
			(pending, state.generation)
		};

		let body = if self.capture_body && pending.response.is_some() {
			match page.response_body(request_id).await {
				Ok(bytes) => Some(bytes),
				Err(e) => {
					tracing::debug!(target = "scout.recorder", request_id, error = %e, "body fetch failed");
					None
				}
			}
		} else {
			None
		};

		let entry = build_success_entry(pending, encoded_length, monotonic_ms, body);

		let mut state = self.state.lock();
		if state.stopped || state.generation != generation {
			return;
		}
		state.entries.push(entry);
	}

	/// Finalizes a failed transaction. Unknown request IDs are dropped.
	pub fn on_loading_failed(&self, request_id: &str, error_text: &str, monotonic_ms: f64) {
		let mut state = self.state.lock();
		if state.stopped {
			return;
		}
		let Some(pending) = state.pending.remove(request_id) else {
			return;
		};
		let entry = build_error_entry(pending, error_text, monotonic_ms);
		state.entries.push(entry);
	}

	/// Serializes a snapshot of the finalized entries. Recording continues
	/// unaffected; a stopped recorder still exports.
	pub fn export(&self) -> Result<(Vec<u8>, usize)> {
		let entries = self.state.lock().entries.clone();
		let count = entries.len();
		let har = Har::new("scout-recorder", env!("CARGO_PKG_VERSION"), entries);
		let bytes = serde_json::to_vec(&har).map_err(|e| Error::ExportFailed(e.to_string()))?;
		Ok((bytes, count))
	}

	/// Drops finalized entries and the pending map atomically.
	pub fn clear(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.stopped {
			return Err(Error::NotRecording);
		}
		state.pending.clear();
		state.entries.clear();
		state.generation += 1;
		Ok(())
	}

	/// Stops recording. Terminal: later events and `clear` are rejected,
	/// `export` keeps working.
	pub fn stop(&self) {
		let mut state = self.state.lock();
		state.stopped = true;
		state.pending.clear();
	}

	pub fn is_stopped(&self) -> bool {
		self.state.lock().stopped
	}

	pub fn entry_count(&self) -> usize {
		self.state.lock().entries.len()
	}

	pub fn pending_count(&self) -> usize {
		self.state.lock().pending.len()
	}
}

fn build_success_entry(pending: PendingEntry, encoded_length: i64, finalize_ms: f64, body: Option<Vec<u8>>) -> HarEntry {
	let time = (finalize_ms - pending.started_monotonic_ms).max(0.0);
	let request = build_request(&pending);

	let response = match &pending.response {
		Some(resp) => {
			let content = match body {
				Some(bytes) => match String::from_utf8(bytes.clone()) {
					Ok(text) => HarContent {
						size: bytes.len() as i64,
						mime_type: resp.mime_type.clone(),
						text: Some(text),
						encoding: None,
					},
					Err(_) => {
						use base64::Engine;
						HarContent {
							size: bytes.len() as i64,
							mime_type: resp.mime_type.clone(),
							text: Some(base64::engine::general_purpose::STANDARD.encode(&bytes)),
							encoding: Some("base64".to_string()),
						}
					}
				},
				None => HarContent {
					size: encoded_length.max(0),
					mime_type: resp.mime_type.clone(),
					text: None,
					encoding: None,
				},
			};
			let redirect_url = header_value(&resp.headers, "location").unwrap_or_default();
			HarResponse {
				status: resp.status as i64,
				status_text: resp.status_text.clone(),
				http_version: resp.http_version.clone(),
				cookies: Vec::new(),
				headers: to_har_headers(&resp.headers),
				content,
				redirect_url,
				headers_size: -1,
				body_size: encoded_length.max(0),
			}
		}
		// Finished without observed headers: record what is known.
		None => HarResponse {
			status: 0,
			status_text: String::new(),
			http_version: String::new(),
			cookies: Vec::new(),
			headers: Vec::new(),
			content: HarContent {
				size: encoded_length.max(0),
				mime_type: "x-unknown".to_string(),
				text: None,
				encoding: None,
			},
			redirect_url: String::new(),
			headers_size: -1,
			body_size: encoded_length.max(0),
		},
	};

	let timings = build_timings(pending.response.as_ref(), finalize_ms);
	let server_ip_address = pending.response.as_ref().and_then(|r| r.remote_ip.clone());

	HarEntry {
		started_date_time: format_rfc3339_ms(pending.started_wall_ms),
		time,
		request,
		response,
		cache: HarCache::default(),
		timings,
		server_ip_address,
		connection: None,
	}
}

fn build_error_entry(pending: PendingEntry, error_text: &str, finalize_ms: f64) -> HarEntry {
	let time = (finalize_ms - pending.started_monotonic_ms).max(0.0);
	let request = build_request(&pending);
	let timings = build_timings(pending.response.as_ref(), finalize_ms);
	let server_ip_address = pending.response.as_ref().and_then(|r| r.remote_ip.clone());

	HarEntry {
		started_date_time: format_rfc3339_ms(pending.started_wall_ms),
		time,
		request,
		response: HarResponse {
			status: 0,
			status_text: error_text.to_string(),
			http_version: String::new(),
			cookies: Vec::new(),
			headers: Vec::new(),
			content: HarContent {
				size: 0,
				mime_type: "x-unknown".to_string(),
				text: None,
				encoding: None,
			},
			redirect_url: String::new(),
			headers_size: -1,
			body_size: 0,
		},
		cache: HarCache::default(),
		timings,
		server_ip_address,
		connection: None,
	}
}

fn build_request(pending: &PendingEntry) -> HarRequest {
	let query_string = Url::parse(&pending.url)
		.map(|u| {
			u.query_pairs()
				.map(|(name, value)| HarQueryParam {
					name: name.into_owned(),
					value: value.into_owned(),
				})
				.collect()
		})
		.unwrap_or_default();

	let post_data = pending.post_data.as_ref().map(|text| HarPostData {
		mime_type: header_value(&pending.headers, "content-type").unwrap_or_else(|| "application/octet-stream".to_string()),
		text: text.clone(),
	});
	let body_size = pending.post_data.as_ref().map(|t| t.len() as i64).unwrap_or(0);

	HarRequest {
		method: pending.method.clone(),
		url: pending.url.clone(),
		http_version: pending
			.response
			.as_ref()
			.map(|r| r.http_version.clone())
			.unwrap_or_else(|| "http/1.1".to_string()),
		cookies: Vec::new(),
		headers: to_har_headers(&pending.headers),
		query_string,
		post_data,
		headers_size: -1,
		body_size,
	}
}

/// Maps driver timing fields onto the HAR phases. Phases the driver did not
/// measure come out as 0; `receive` is finalize minus response-header time,
/// clamped at 0.
fn build_timings(response: Option<&PendingResponse>, finalize_ms: f64) -> HarTimings {
	let mut timings = HarTimings::default();
	let Some(response) = response else {
		return timings;
	};

	if let Some(t) = &response.timing {
		timings.blocked = t.dns_start.max(0.0);
		timings.dns = span(t.dns_start, t.dns_end);
		timings.connect = span(t.connect_start, t.connect_end);
		timings.ssl = span(t.ssl_start, t.ssl_end);
		timings.send = span(t.send_start, t.send_end);
		timings.wait = span(t.send_end, t.receive_headers_end);
	}
	timings.receive = (finalize_ms - response.header_monotonic_ms).max(0.0);
	timings
}

fn span(start: f64, end: f64) -> f64 {
	if start >= 0.0 && end >= 0.0 { (end - start).max(0.0) } else { 0.0 }
}

fn to_har_headers(headers: &[(String, String)]) -> Vec<HarHeader> {
	headers
		.iter()
		.map(|(name, value)| HarHeader {
			name: name.clone(),
			value: value.clone(),
		})
		.collect()
}

fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
	headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
}

/// Formats epoch milliseconds as RFC 3339 with millisecond precision.
fn format_rfc3339_ms(epoch_ms: f64) -> String {
	let epoch_ms = epoch_ms.max(0.0) as u64;
	let secs = epoch_ms / 1000;
	let millis = epoch_ms % 1000;

	let days = secs / 86_400;
	let tod = secs % 86_400;
	let (year, month, day) = civil_from_days(days as i64);
	format!(
		"{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
		tod / 3600,
		(tod % 3600) / 60,
		tod % 60
	)
}

/// Days-since-epoch to Gregorian date (Howard Hinnant's algorithm).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
	let z = z + 719_468;
	let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
	let doe = (z - era * 146_097) as u64;
	let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
	let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
	(if m <= 2 { y + 1 } else { y }, m, d)
}
