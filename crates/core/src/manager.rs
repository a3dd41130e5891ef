//! Process-wide session directory.
//!
//! The manager maps opaque session IDs to live sessions. It holds its lock
//! only while mutating or reading the map; session operations (launch,
//! navigation, teardown) always run outside it. Destruction removes the
//! directory entry before tearing the session down, so a concurrent destroy
//! of the same ID observes not-found immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::session::Session;
use scout_driver::Launcher;
use scout_protocol::{SessionMeta, SessionOptions};

/// Directory of live sessions, keyed by opaque IDs.
pub struct SessionManager {
	launcher: Arc<dyn Launcher>,
	sessions: RwLock<HashMap<String, Arc<Session>>>,
	/// 0 means unlimited.
	max_sessions: usize,
}

impl SessionManager {
	pub fn new(launcher: Arc<dyn Launcher>, max_sessions: usize) -> Arc<Self> {
		Arc::new(Self {
			launcher,
			sessions: RwLock::new(HashMap::new()),
			max_sessions,
		})
	}

	/// Creates a session and returns it once its first document has
	/// committed. Fails with [`Error::SessionLimitExceeded`] at the cap.
	pub async fn create(&self, options: SessionOptions) -> Result<Arc<Session>> {
		validate_options(&options)?;
		self.check_capacity()?;

		let id = Uuid::new_v4().to_string();
		let session = Session::start(id.clone(), options, &self.launcher).await?;

		// The cap may have been reached while this launch was in flight.
		let over_capacity = {
			let mut sessions = self.sessions.write();
			if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
				true
			} else {
				sessions.insert(id, Arc::clone(&session));
				false
			}
		};

		if over_capacity {
			let _ = session.destroy().await;
			return Err(Error::SessionLimitExceeded(self.max_sessions));
		}

		tracing::info!(target = "scout.manager", id = %session.id(), "session created");
		Ok(session)
	}

	/// Resolves an ID to a live session. Sessions whose browser died are
	/// reaped here and report session-gone.
	pub fn lookup(&self, id: &str) -> Result<Arc<Session>> {
		let session = self
			.sessions
			.read()
			.get(id)
			.cloned()
			.ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

		if session.is_terminated() {
			self.sessions.write().remove(id);
			let stale = Arc::clone(&session);
			tokio::spawn(async move {
				let _ = stale.destroy().await;
			});
			return Err(Error::SessionGone);
		}
		Ok(session)
	}

	/// Snapshot of per-session metadata.
	pub async fn list(&self) -> Vec<SessionMeta> {
		let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
		let mut metas = Vec::with_capacity(sessions.len());
		for session in sessions {
			metas.push(session.meta().await);
		}
		metas.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
		metas
	}

	/// Destroys a session, blocking until its resources are released.
	/// A second destroy of the same ID reports not-found.
	pub async fn destroy(&self, id: &str) -> Result<()> {
		let session = self.sessions.write().remove(id).ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
		session.destroy().await?;
		tracing::info!(target = "scout.manager", id, "session destroyed");
		Ok(())
	}

	/// Destroys every session in parallel, bounded by `deadline`; sessions
	/// still pending afterwards are force-closed.
	pub async fn shutdown(&self, deadline: Duration) {
		let sessions: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
		if sessions.is_empty() {
			return;
		}
		tracing::info!(target = "scout.manager", count = sessions.len(), "shutting down all sessions");

		let teardowns = sessions.iter().map(|session| {
			let session = Arc::clone(session);
			async move {
				let _ = session.destroy().await;
			}
		});

		if tokio::time::timeout(deadline, futures::future::join_all(teardowns)).await.is_err() {
			for session in &sessions {
				if !session.is_terminated() {
					tracing::warn!(target = "scout.manager", id = %session.id(), "force-closing session past shutdown deadline");
				}
				session.force_close();
			}
		}
	}

	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.read().is_empty()
	}

	fn check_capacity(&self) -> Result<()> {
		if self.max_sessions > 0 && self.sessions.read().len() >= self.max_sessions {
			return Err(Error::SessionLimitExceeded(self.max_sessions));
		}
		Ok(())
	}
}

fn validate_options(options: &SessionOptions) -> Result<()> {
	if options.window_w == 0 || options.window_h == 0 {
		return Err(Error::ConfigInvalid("window dimensions must be non-zero".to_string()));
	}
	if options.capture_body && !options.record {
		return Err(Error::ConfigInvalid("capture_body requires record".to_string()));
	}
	for extension in &options.extensions {
		if !std::path::Path::new(extension).is_dir() {
			return Err(Error::ConfigInvalid(format!("extension path is not a directory: {extension}")));
		}
	}
	Ok(())
}
