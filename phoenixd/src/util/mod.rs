// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

pub(crate) mod config;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

pub(crate) fn now_millis() -> i64 {
	Utc::now().timestamp_millis()
}

/// Cooperative shutdown signal. Clone for another handle; every consumer of
/// [`recv`](Shutdown::recv) observes the signal, including ones subscribing
/// after it fired. Triggering more than once is fine.
#[derive(Clone)]
pub(crate) struct Shutdown {
	tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
	pub(crate) fn new() -> Self {
		Self { tx: Arc::new(watch::channel(false).0) }
	}

	pub(crate) fn trigger(&self) {
		self.tx.send_replace(true);
	}

	pub(crate) fn is_triggered(&self) -> bool {
		*self.tx.borrow()
	}

	pub(crate) async fn recv(&self) {
		let mut rx = self.tx.subscribe();
		// The sender half lives in self, so wait_for can only fail once every
		// handle is dropped, at which point nobody is awaiting it.
		let _ = rx.wait_for(|triggered| *triggered).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn shutdown_is_observed_by_late_subscribers() {
		let shutdown = Shutdown::new();
		assert!(!shutdown.is_triggered());
		shutdown.trigger();
		shutdown.trigger();
		assert!(shutdown.is_triggered());
		// recv after the trigger still completes immediately.
		shutdown.recv().await;
		shutdown.clone().recv().await;
	}

	#[tokio::test]
	async fn shutdown_wakes_waiters() {
		let shutdown = Shutdown::new();
		let waiter = shutdown.clone();
		let task = tokio::spawn(async move { waiter.recv().await });
		shutdown.trigger();
		task.await.unwrap();
	}
}
