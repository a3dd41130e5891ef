//! Client-side helpers for talking to a running `scoutd`.
//!
//! The generated [`ScoutRpcClient`](crate::rpc::ScoutRpcClient) trait works
//! over any jsonrpsee client; these helpers build the right one. Use the
//! WebSocket client when the event subscription is needed, the HTTP client
//! for plain request/response traffic.

use std::io::ErrorKind;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};

use crate::rpc::ScoutRpcClient;

/// Default daemon endpoint; matches `scoutd --listen`'s default.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:9744";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client for request/response calls.
pub fn connect_http(endpoint: &str) -> Result<HttpClient> {
	HttpClientBuilder::default()
		.build(format!("http://{endpoint}"))
		.context("building daemon HTTP client")
}

/// WebSocket client; required for `events_subscribe`.
pub async fn connect_ws(endpoint: &str) -> Result<WsClient> {
	WsClientBuilder::default()
		.build(format!("ws://{endpoint}"))
		.await
		.context("building daemon WebSocket client")
}

/// Probes whether a daemon is reachable at `endpoint`. `None` means nothing
/// is listening; an error means something else went wrong.
pub async fn probe(endpoint: &str) -> Result<Option<bool>> {
	let client = HttpClientBuilder::default()
		.request_timeout(PROBE_TIMEOUT)
		.build(format!("http://{endpoint}"))
		.context("building daemon probe client")?;

	match client.ping().await {
		Ok(value) => Ok(Some(value)),
		Err(err) if is_not_running_error(&err) => Ok(None),
		Err(err) => Err(anyhow::anyhow!("daemon ping failed: {err}")),
	}
}

/// Heuristic for "the daemon is simply not there", as opposed to a protocol
/// or server-side failure.
pub fn is_not_running_error(err: &ClientError) -> bool {
	if matches!(err, ClientError::RestartNeeded(_) | ClientError::RequestTimeout) {
		return true;
	}

	if let ClientError::Transport(transport_err) = err {
		if let Some(io_err) = transport_err.downcast_ref::<std::io::Error>() {
			if matches!(
				io_err.kind(),
				ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::NotConnected | ErrorKind::TimedOut
			) {
				return true;
			}
		}
	}

	let msg = err.to_string().to_ascii_lowercase();
	msg.contains("connection refused")
		|| msg.contains("connection reset")
		|| msg.contains("error trying to connect")
		|| msg.contains("dns error")
		|| msg.contains("tcp connect error")
		|| msg.contains("request timeout")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_timeout_reads_as_not_running() {
		assert!(is_not_running_error(&ClientError::RequestTimeout));
	}

	#[test]
	fn transport_connection_refused_reads_as_not_running() {
		let err = ClientError::Transport(Box::new(std::io::Error::new(ErrorKind::ConnectionRefused, "refused")).into());
		assert!(is_not_running_error(&err));
	}
}
