//! Per-session event fan-out.
//!
//! One [`EventHub`] per session multiplexes browser-observed events to any
//! number of subscribers. Emission never blocks: each subscriber sits behind
//! a bounded broadcast queue, and a subscriber that falls behind loses the
//! oldest queued events. Losses are counted per subscription and surfaced
//! through [`EventSubscription::gap_count`], so overload is observable
//! rather than silent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use scout_protocol::{BrowserEvent, BrowserEventPayload};

/// Default per-subscriber queue capacity.
pub const DEFAULT_FANOUT_CAPACITY: usize = 256;

/// Publisher side of a session's event stream.
pub struct EventHub {
	tx: Mutex<Option<broadcast::Sender<BrowserEvent>>>,
	/// Enforces non-decreasing event timestamps.
	last_ts_ms: AtomicU64,
	emitted: AtomicU64,
}

impl EventHub {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self {
			tx: Mutex::new(Some(tx)),
			last_ts_ms: AtomicU64::new(0),
			emitted: AtomicU64::new(0),
		}
	}

	/// Stamps the payload with a monotonic timestamp and offers it to every
	/// active subscriber without blocking. A closed hub drops the event.
	pub fn emit(&self, payload: BrowserEventPayload) {
		let ts_ms = self.next_ts();
		let event = BrowserEvent { ts_ms, payload };
		self.emitted.fetch_add(1, Ordering::Relaxed);
		if let Some(tx) = self.tx.lock().as_ref() {
			// Err means no subscribers; that is not a failure.
			let _ = tx.send(event);
		}
	}

	/// Opens a new subscription starting at the current stream position.
	/// Returns `None` once the hub is closed.
	pub fn subscribe(&self) -> Option<EventSubscription> {
		let guard = self.tx.lock();
		guard.as_ref().map(|tx| EventSubscription {
			rx: tx.subscribe(),
			gaps: 0,
		})
	}

	pub fn subscriber_count(&self) -> usize {
		self.tx.lock().as_ref().map(|tx| tx.receiver_count()).unwrap_or(0)
	}

	/// Total events emitted over the hub's lifetime.
	pub fn emitted_count(&self) -> u64 {
		self.emitted.load(Ordering::Relaxed)
	}

	/// Ends the stream: subscribers drain what is queued, then observe end
	/// of stream. Called on session destruction.
	pub fn close(&self) {
		self.tx.lock().take();
	}

	pub fn is_closed(&self) -> bool {
		self.tx.lock().is_none()
	}

	fn next_ts(&self) -> u64 {
		let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
		self.last_ts_ms.fetch_max(now, Ordering::AcqRel);
		self.last_ts_ms.load(Ordering::Acquire)
	}
}

impl Default for EventHub {
	fn default() -> Self {
		Self::new(DEFAULT_FANOUT_CAPACITY)
	}
}

/// Consumer side: a cursor into one session's event stream.
///
/// Events arrive in emission order. When the subscriber lags past its queue
/// capacity, the oldest events are dropped and the drop count accumulates in
/// [`gap_count`](Self::gap_count).
pub struct EventSubscription {
	rx: broadcast::Receiver<BrowserEvent>,
	gaps: u64,
}

impl EventSubscription {
	/// Receives the next event, or `None` once the hub closed and the queue
	/// drained.
	pub async fn recv(&mut self) -> Option<BrowserEvent> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(n)) => {
					self.gaps += n;
					tracing::warn!(target = "scout.fanout", dropped = n, "subscriber lagged, dropped events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Non-blocking receive; `None` when nothing is queued or the stream
	/// ended.
	pub fn try_recv(&mut self) -> Option<BrowserEvent> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					self.gaps += n;
				}
				Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => return None,
			}
		}
	}

	/// Number of events this subscription lost to overload.
	pub fn gap_count(&self) -> u64 {
		self.gaps
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn console(message: &str) -> BrowserEventPayload {
		BrowserEventPayload::Console {
			level: "log".to_string(),
			message: message.to_string(),
			source: String::new(),
		}
	}

	#[tokio::test]
	async fn subscribers_receive_in_emission_order() {
		let hub = EventHub::new(16);
		let mut sub = hub.subscribe().unwrap();

		hub.emit(console("a"));
		hub.emit(console("b"));

		let first = sub.recv().await.unwrap();
		let second = sub.recv().await.unwrap();
		assert!(second.ts_ms >= first.ts_ms);
		match (first.payload, second.payload) {
			(BrowserEventPayload::Console { message: a, .. }, BrowserEventPayload::Console { message: b, .. }) => {
				assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
			}
			other => panic!("unexpected payloads: {other:?}"),
		}
	}

	#[tokio::test]
	async fn slow_subscriber_drops_oldest_and_counts_gaps() {
		let capacity = 8;
		let hub = EventHub::new(capacity);
		let mut slow = hub.subscribe().unwrap();

		let burst = 100u64;
		for i in 0..burst {
			hub.emit(console(&i.to_string()));
		}

		let mut received = 0u64;
		while slow.try_recv().is_some() {
			received += 1;
		}
		assert_eq!(received, capacity as u64);
		assert_eq!(slow.gap_count(), burst - capacity as u64);
	}

	#[tokio::test]
	async fn fast_subscriber_sees_everything_while_slow_one_lags() {
		let hub = EventHub::new(16);
		let mut fast = hub.subscribe().unwrap();
		let mut slow = hub.subscribe().unwrap();

		let mut fast_seen = 0;
		for i in 0..200 {
			hub.emit(console(&i.to_string()));
			// The fast subscriber keeps up between emissions.
			while fast.try_recv().is_some() {
				fast_seen += 1;
			}
		}
		assert_eq!(fast_seen, 200);
		assert!(fast.gap_count() == 0);

		let mut slow_seen = 0;
		while slow.try_recv().is_some() {
			slow_seen += 1;
		}
		assert_eq!(slow_seen as u64 + slow.gap_count(), 200);
		assert!(slow.gap_count() > 0);
	}

	#[tokio::test]
	async fn close_ends_streams_after_drain() {
		let hub = EventHub::new(16);
		let mut sub = hub.subscribe().unwrap();
		hub.emit(console("last"));
		hub.close();

		assert!(sub.recv().await.is_some());
		assert!(sub.recv().await.is_none());
		assert!(hub.subscribe().is_none());
		// Emission after close is a no-op, not a panic.
		hub.emit(console("ignored"));
	}

	#[tokio::test]
	async fn timestamps_never_decrease() {
		let hub = EventHub::new(64);
		let mut sub = hub.subscribe().unwrap();
		for i in 0..50 {
			hub.emit(console(&i.to_string()));
		}
		let mut last = 0;
		while let Some(event) = sub.try_recv() {
			assert!(event.ts_ms >= last);
			last = event.ts_ms;
		}
	}
}
