// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change-propagation hub.
//!
//! The hub fans individual flag changes out to every live SDK subscriber
//! of the affected (project, environment) scope.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                            ChangeHub                               │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │   subscribers: HashMap<Scope, HashMap<u64, mpsc::Sender>>    │  │
//! │  └──────────────────────────────────────────────────────────────┘  │
//! │                                │                                   │
//! │  broadcast(scope, event) ──────┼────────> try_send per subscriber  │
//! └────────────────────────────────┼───────────────────────────────────┘
//!                                  ▼
//!         per-subscriber bounded queues (depth 32, drop on full)
//! ```
//!
//! Each subscriber owns a bounded queue. `broadcast` never blocks: a full
//! queue drops the event for that subscriber alone and bumps a counter,
//! so one slow SDK can never stall other subscribers or a management
//! write. Dropped subscribers reconcile by re-polling the evaluation
//! endpoint on reconnect. Delivery to a single subscriber preserves
//! broadcast order; nothing is promised across scopes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use togglerino_core::{FlagStreamEvent, Scope};

/// Default per-subscriber queue depth.
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for the change hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
	/// Capacity of each subscriber's event queue.
	pub channel_capacity: usize,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			channel_capacity: DEFAULT_CHANNEL_CAPACITY,
		}
	}
}

/// Point-in-time hub counters for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
	/// Scopes with at least one live subscriber.
	pub scope_count: usize,
	/// Live subscribers across all scopes.
	pub subscriber_count: usize,
	/// Broadcast calls since start.
	pub events_broadcast: u64,
	/// Events dropped on full subscriber queues since start.
	pub events_dropped: u64,
	/// Subscriptions ever created.
	pub total_subscriptions: u64,
}

type Registry = HashMap<Scope, HashMap<u64, mpsc::Sender<FlagStreamEvent>>>;

struct HubInner {
	config: HubConfig,
	subscribers: Mutex<Registry>,
	next_subscriber_id: AtomicU64,
	events_broadcast: AtomicU64,
	events_dropped: AtomicU64,
	total_subscriptions: AtomicU64,
}

/// The change-propagation hub. Cheap to clone; all clones share the same
/// registry.
#[derive(Clone)]
pub struct ChangeHub {
	inner: Arc<HubInner>,
}

impl ChangeHub {
	pub fn new(config: HubConfig) -> Self {
		Self {
			inner: Arc::new(HubInner {
				config,
				subscribers: Mutex::new(HashMap::new()),
				next_subscriber_id: AtomicU64::new(0),
				events_broadcast: AtomicU64::new(0),
				events_dropped: AtomicU64::new(0),
				total_subscriptions: AtomicU64::new(0),
			}),
		}
	}

	pub fn with_defaults() -> Self {
		Self::new(HubConfig::default())
	}

	/// Register a new subscriber for one scope.
	///
	/// Returns the subscriber's event receiver and a guard that removes the
	/// subscription when cancelled or dropped. The receiver observes
	/// channel close as its terminal signal.
	pub fn subscribe(&self, scope: Scope) -> (mpsc::Receiver<FlagStreamEvent>, SubscriptionGuard) {
		let (tx, rx) = mpsc::channel(self.inner.config.channel_capacity);
		let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

		self
			.inner
			.subscribers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.entry(scope.clone())
			.or_default()
			.insert(id, tx);

		self.inner.total_subscriptions.fetch_add(1, Ordering::Relaxed);
		debug!(scope = %scope, subscriber_id = id, "subscriber registered");

		let guard = SubscriptionGuard {
			inner: Arc::clone(&self.inner),
			scope,
			id,
			cancelled: false,
		};
		(rx, guard)
	}

	/// Fan an event out to every subscriber of one scope.
	///
	/// Best effort and non-blocking: a full subscriber queue drops the
	/// event for that subscriber only. Returns the number of subscribers
	/// the event was enqueued for.
	pub fn broadcast(&self, scope: &Scope, event: &FlagStreamEvent) -> usize {
		self.inner.events_broadcast.fetch_add(1, Ordering::Relaxed);

		let registry = self
			.inner
			.subscribers
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		let Some(subscribers) = registry.get(scope) else {
			debug!(scope = %scope, event_type = event.event_type(), "no subscribers for broadcast");
			return 0;
		};

		let mut delivered = 0;
		for (id, tx) in subscribers {
			match tx.try_send(event.clone()) {
				Ok(()) => delivered += 1,
				Err(mpsc::error::TrySendError::Full(_)) => {
					self.inner.events_dropped.fetch_add(1, Ordering::Relaxed);
					warn!(
						scope = %scope,
						subscriber_id = id,
						event_type = event.event_type(),
						"subscriber queue full, dropping event"
					);
				}
				Err(mpsc::error::TrySendError::Closed(_)) => {
					// The guard removes the entry; nothing to do here.
					debug!(scope = %scope, subscriber_id = id, "subscriber already gone");
				}
			}
		}

		debug!(
			scope = %scope,
			event_type = event.event_type(),
			delivered,
			"broadcast flag event"
		);
		delivered
	}

	/// Shut every subscription down: the registry is emptied and dropping
	/// the senders closes each subscriber's channel.
	pub fn close(&self) {
		let mut registry = self
			.inner
			.subscribers
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		let subscriber_count: usize = registry.values().map(HashMap::len).sum();
		registry.clear();
		info!(subscriber_count, "change hub closed");
	}

	pub fn subscriber_count(&self, scope: &Scope) -> usize {
		self
			.inner
			.subscribers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(scope)
			.map_or(0, HashMap::len)
	}

	pub fn stats(&self) -> HubStats {
		let registry = self
			.inner
			.subscribers
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		HubStats {
			scope_count: registry.len(),
			subscriber_count: registry.values().map(HashMap::len).sum(),
			events_broadcast: self.inner.events_broadcast.load(Ordering::Relaxed),
			events_dropped: self.inner.events_dropped.load(Ordering::Relaxed),
			total_subscriptions: self.inner.total_subscriptions.load(Ordering::Relaxed),
		}
	}
}

/// Removes its subscription from the hub when cancelled or dropped.
pub struct SubscriptionGuard {
	inner: Arc<HubInner>,
	scope: Scope,
	id: u64,
	cancelled: bool,
}

impl SubscriptionGuard {
	/// Explicitly cancel the subscription.
	pub fn cancel(mut self) {
		self.remove();
	}

	fn remove(&mut self) {
		if self.cancelled {
			return;
		}
		self.cancelled = true;

		let mut registry = self
			.inner
			.subscribers
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		if let Some(subscribers) = registry.get_mut(&self.scope) {
			subscribers.remove(&self.id);
			if subscribers.is_empty() {
				registry.remove(&self.scope);
			}
		}
		debug!(scope = %self.scope, subscriber_id = self.id, "subscriber removed");
	}
}

impl Drop for SubscriptionGuard {
	fn drop(&mut self) {
		self.remove();
	}
}
