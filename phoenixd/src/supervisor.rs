// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The peer supervisor: keeps one logical connection to the LSP alive and
//! projects the engine's event stream onto the payments database, the API
//! event bus and the webhook dispatcher.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, timeout};

use crate::events::{ApiEvent, EventsBus};
use crate::io::model::PaymentType;
use crate::io::PaymentsDb;
use crate::node::{ConnectionState, NodeEngine, NodeEvent};
use crate::util::{now_millis, Shutdown};
use crate::webhook::WebhookNotifier;

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Unpaid invoices stay queryable for this long after expiry before the
/// startup sweep drops them.
const EXPIRED_INVOICE_RETENTION_MS: i64 = 30 * 24 * 3_600 * 1_000;

pub(crate) struct PeerSupervisor {
	engine: Arc<dyn NodeEngine>,
	db: Arc<PaymentsDb>,
	bus: EventsBus<ApiEvent>,
	webhooks: Arc<WebhookNotifier>,
	shutdown: Shutdown,
}

impl PeerSupervisor {
	pub(crate) fn new(
		engine: Arc<dyn NodeEngine>, db: Arc<PaymentsDb>, bus: EventsBus<ApiEvent>,
		webhooks: Arc<WebhookNotifier>, shutdown: Shutdown,
	) -> Self {
		Self { engine, db, bus, webhooks, shutdown }
	}

	/// Perpetual reconnect loop: connect, wait for the handshake, hold until
	/// the connection closes, sleep, repeat. `ready_tx` flips to true on the
	/// first established connection and stays true.
	pub(crate) async fn run_reconnect_loop(&self, ready_tx: watch::Sender<bool>) {
		loop {
			if self.shutdown.is_triggered() {
				break;
			}
			match timeout(CONNECT_TIMEOUT, self.engine.connect()).await {
				Ok(Ok(())) => {
					if self.wait_established().await {
						info!("Connected to the LSP");
						ready_tx.send_replace(true);
						self.store_channel_snapshots();
						if self.hold_until_closed().await {
							// Shutdown requested while connected.
							self.engine.disconnect().await;
							break;
						}
						warn!("Connection to the LSP closed");
					} else {
						warn!("LSP handshake did not complete in time");
						self.engine.disconnect().await;
					}
				},
				Ok(Err(e)) => warn!("Failed to connect to the LSP: {}", e),
				Err(_) => warn!("Connecting to the LSP timed out"),
			}
			tokio::select! {
				_ = self.shutdown.recv() => break,
				_ = sleep(RECONNECT_DELAY) => {},
			}
		}
	}

	async fn wait_established(&self) -> bool {
		let mut state = self.engine.connection_state();
		let established = matches!(
			timeout(HANDSHAKE_TIMEOUT, state.wait_for(|s| *s == ConnectionState::Established))
				.await,
			Ok(Ok(_))
		);
		established
	}

	/// Returns true when leaving because of shutdown, false when the
	/// connection closed on its own.
	async fn hold_until_closed(&self) -> bool {
		let mut state = self.engine.connection_state();
		tokio::select! {
			_ = self.shutdown.recv() => true,
			result = state.wait_for(|s| *s == ConnectionState::Closed) => {
				if result.is_err() {
					// Engine dropped its state channel; treat as closed.
					warn!("Connection state stream ended");
				}
				false
			},
		}
	}

	/// Drains the engine's event stream until shutdown.
	pub(crate) async fn run_event_loop(&self) {
		let mut events = self.engine.subscribe_events();
		loop {
			tokio::select! {
				_ = self.shutdown.recv() => break,
				event = events.recv() => match event {
					Ok(event) => self.handle_event(event),
					Err(broadcast::error::RecvError::Lagged(n)) => {
						warn!("Dropped {} node events, payment records may need review", n);
					},
					Err(broadcast::error::RecvError::Closed) => break,
				},
			}
		}
	}

	pub(crate) fn handle_event(&self, event: NodeEvent) {
		match event {
			NodeEvent::PaymentReceived { payment_hash, received_with, timestamp } => {
				if let Err(e) = self.db.receive_payment(payment_hash, &received_with, timestamp) {
					error!("Failed to persist receipt of {}: {}", payment_hash, e);
					return;
				}
				let amount_msat: u64 = received_with.iter().map(|p| p.amount_msat()).sum();
				if amount_msat == 0 {
					return;
				}
				let metadata = self
					.db
					.get_metadata(PaymentType::Incoming, &payment_hash.to_hex())
					.unwrap_or_else(|e| {
						error!("Failed to load metadata for {}: {}", payment_hash, e);
						None
					})
					.unwrap_or_default();
				let event = ApiEvent::PaymentReceived {
					amount_sat: amount_msat / 1_000,
					payment_hash,
					external_id: metadata.external_id,
				};
				self.bus.notify(event.clone());
				if self.webhooks.has_targets() || metadata.webhook_url.is_some() {
					let webhooks = Arc::clone(&self.webhooks);
					tokio::spawn(async move {
						webhooks.dispatch(&event, metadata.webhook_url.as_deref()).await;
					});
				}
			},
			NodeEvent::FundingLocked { payment_hash, timestamp } => {
				if let Err(e) = self.db.set_locked(payment_hash, timestamp) {
					error!("Failed to mark {} locked: {}", payment_hash, e);
				}
			},
			NodeEvent::FundingConfirmed { payment_hash, timestamp } => {
				if let Err(e) = self.db.set_confirmed(payment_hash, timestamp) {
					error!("Failed to mark {} confirmed: {}", payment_hash, e);
				}
			},
			NodeEvent::ChannelClosed(payment) => {
				if let Err(e) = self.db.add_channel_close(&payment) {
					error!("Failed to persist channel close {}: {}", payment.id, e);
				}
			},
			NodeEvent::LiquidityPurchased(payment) => {
				if let Err(e) = self.db.add_inbound_liquidity(&payment) {
					error!("Failed to persist liquidity purchase {}: {}", payment.id, e);
				}
			},
			NodeEvent::TransactionLocked { tx_id, timestamp } => {
				let close = self.db.set_channel_close_locked(tx_id, timestamp);
				let liquidity = self.db.set_inbound_liquidity_locked(tx_id, timestamp);
				if let Err(e) = close.and(liquidity) {
					error!("Failed to mark tx {} locked: {}", tx_id, e);
				}
			},
			NodeEvent::TransactionConfirmed { tx_id, timestamp } => {
				let close = self.db.set_channel_close_confirmed(tx_id, timestamp);
				let liquidity = self.db.set_inbound_liquidity_confirmed(tx_id, timestamp);
				if let Err(e) = close.and(liquidity) {
					error!("Failed to mark tx {} confirmed: {}", tx_id, e);
				}
			},
			NodeEvent::ChannelsUpdated => self.store_channel_snapshots(),
		}
	}

	/// Startup housekeeping: drop long-expired unpaid invoices and surface
	/// receipts still waiting for their on-chain confirmation.
	pub(crate) fn run_maintenance(&self) {
		let cutoff = now_millis() - EXPIRED_INVOICE_RETENTION_MS;
		match self.db.list_expired(0, cutoff) {
			Ok(expired) => {
				let mut deleted = 0;
				for payment in &expired {
					match self.db.delete_incoming(payment.payment_hash) {
						Ok(true) => deleted += 1,
						Ok(false) => {},
						Err(e) => error!(
							"Failed to delete expired invoice {}: {}",
							payment.payment_hash, e
						),
					}
				}
				if deleted > 0 {
					info!("Dropped {} expired unpaid invoices", deleted);
				}
			},
			Err(e) => error!("Failed to list expired invoices: {}", e),
		}

		let mut unconfirmed = 0u32;
		if let Err(e) = self.db.for_each_incoming_not_confirmed(|_| unconfirmed += 1) {
			error!("Failed to scan unconfirmed receipts: {}", e);
		} else if unconfirmed > 0 {
			info!("{} receipts are still waiting for on-chain confirmation", unconfirmed);
		}
	}

	fn store_channel_snapshots(&self) {
		let snapshots: Vec<_> = self
			.engine
			.channels()
			.iter()
			.filter_map(|channel| {
				serde_json::to_vec(channel).ok().map(|data| (channel.channel_id, data))
			})
			.collect();
		if let Err(e) = self.db.replace_channel_snapshots(&snapshots, now_millis()) {
			error!("Failed to persist channel snapshots: {}", e);
		}
	}
}
