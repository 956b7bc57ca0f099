// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The external event stream: protocol events projected onto the API,
//! fanned out to WebSocket subscribers and webhooks.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::PaymentHash;

const EVENTS_CHANNEL_SIZE: usize = 256;

/// An event surfaced to API consumers. Serialized as one JSON object per
/// event, with a `type` discriminator.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiEvent {
	PaymentReceived {
		#[serde(rename = "amountSat")]
		amount_sat: u64,
		#[serde(rename = "paymentHash")]
		payment_hash: PaymentHash,
		#[serde(rename = "externalId", skip_serializing_if = "Option::is_none")]
		external_id: Option<String>,
	},
}

/// Multi-producer, multi-subscriber bus. Clone for another handle; events
/// emitted before a subscriber attaches are not replayed, and a slow
/// subscriber observes a lag error rather than blocking producers.
pub(crate) struct EventsBus<T> {
	tx: broadcast::Sender<T>,
}

impl<T> Clone for EventsBus<T> {
	fn clone(&self) -> Self {
		Self { tx: self.tx.clone() }
	}
}

impl<T: Clone> EventsBus<T> {
	pub(crate) fn new() -> Self {
		Self { tx: broadcast::channel(EVENTS_CHANNEL_SIZE).0 }
	}

	/// Sending to a bus without subscribers is a noop, which is common.
	pub(crate) fn notify(&self, event: T) {
		let _ = self.tx.send(event);
	}

	pub(crate) fn subscribe(&self) -> broadcast::Receiver<T> {
		self.tx.subscribe()
	}
}
