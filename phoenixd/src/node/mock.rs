// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! In-memory protocol engine. Backs the regtest development mode and the
//! supervisor/API tests; no networking, no chain.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{broadcast, watch};

use crate::io::model::ReceivedWith;
use crate::liquidity::{LiquidityDecision, LiquidityPolicy, PolicyCell};
use crate::node::{
	Bolt11InvoiceInfo, ChannelSnapshot, ConnectionState, CreateInvoiceRequest, CreatedInvoice,
	EngineError, InvoiceDescription, LnurlAuthSignature, NodeEngine, NodeEvent, OfferInfo,
	PaySuccess,
};
use crate::types::{ChannelId, NodeId, PaymentHash, PaymentId, Preimage, Txid};
use crate::util::now_millis;
use crate::webhook;

const EVENTS_CHANNEL_SIZE: usize = 64;

pub(crate) struct MockEngine {
	node_id: NodeId,
	state_tx: watch::Sender<ConnectionState>,
	events_tx: broadcast::Sender<NodeEvent>,
	policy: PolicyCell,
	inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
	channels: Vec<ChannelSnapshot>,
	fee_credit_msat: u64,
	next_htlc_id: u64,
	invoices: HashMap<String, Bolt11InvoiceInfo>,
	fail_payments: bool,
}

impl MockEngine {
	pub(crate) fn new() -> Self {
		let mut node_id = [0u8; 33];
		node_id[0] = 0x03;
		rand::thread_rng().fill(&mut node_id[1..]);
		Self {
			node_id: NodeId(node_id),
			state_tx: watch::channel(ConnectionState::Closed).0,
			events_tx: broadcast::channel(EVENTS_CHANNEL_SIZE).0,
			policy: PolicyCell::new(LiquidityPolicy::default()),
			inner: Mutex::new(Inner::default()),
		}
	}

	fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().expect("mock engine state poisoned")
	}

	/// Feeds an event into the node event stream, as the protocol engine
	/// would after observing HTLCs or chain activity.
	pub(crate) fn emit(&self, event: NodeEvent) {
		let _ = self.events_tx.send(event);
	}

	pub(crate) fn set_channels(&self, channels: Vec<ChannelSnapshot>) {
		self.inner().channels = channels;
	}

	pub(crate) fn set_fee_credit_msat(&self, amount_msat: u64) {
		self.inner().fee_credit_msat = amount_msat;
	}

	pub(crate) fn set_fail_payments(&self, fail: bool) {
		self.inner().fail_payments = fail;
	}

	pub(crate) fn set_connection_state(&self, state: ConnectionState) {
		self.state_tx.send_replace(state);
	}

	pub(crate) fn liquidity_policy(&self) -> LiquidityPolicy {
		self.policy.get()
	}

	pub(crate) fn test_channel(balance_sat: u64) -> ChannelSnapshot {
		ChannelSnapshot {
			channel_id: ChannelId(rand::thread_rng().gen()),
			state: "NORMAL".to_string(),
			balance_sat,
			inbound_liquidity_sat: 100_000,
			capacity_sat: balance_sat + 100_000,
			funding_tx_id: Some(Txid(rand::thread_rng().gen())),
		}
	}

	fn random_preimage() -> Preimage {
		Preimage(rand::thread_rng().gen())
	}

	fn check_connected(&self) -> Result<(), EngineError> {
		if *self.state_tx.borrow() != ConnectionState::Established {
			return Err(EngineError::NotConnected);
		}
		Ok(())
	}

	/// Simulates funds arriving for `payment_hash`, consulting the liquidity
	/// policy the way the engine does for every HTLC set that needs a
	/// liquidity operation. `fee_quote_msat` is the quoted cost of that
	/// operation; zero means the payment fits the existing channel.
	pub(crate) fn simulate_receive(
		&self, payment_hash: PaymentHash, amount_msat: u64, fee_quote_msat: u64,
	) -> LiquidityDecision {
		let mut inner = self.inner();
		let channels_empty = inner.channels.is_empty();

		let decision = if fee_quote_msat == 0 && !channels_empty {
			LiquidityDecision::Accept
		} else {
			self.policy.get().decide(
				amount_msat,
				fee_quote_msat,
				inner.fee_credit_msat,
				channels_empty,
			)
		};

		let received_with = match &decision {
			LiquidityDecision::Accept if fee_quote_msat == 0 && !channels_empty => {
				let channel_id = inner.channels[0].channel_id;
				let htlc_id = inner.next_htlc_id;
				inner.next_htlc_id += 1;
				vec![ReceivedWith::LightningPayment { amount_msat, channel_id, htlc_id }]
			},
			LiquidityDecision::Accept => {
				let mining_fee_sat = fee_quote_msat / 2_000;
				let service_fee_msat = fee_quote_msat - mining_fee_sat * 1_000;
				let channel_id = ChannelId(rand::thread_rng().gen());
				let funding_tx_id = Txid(rand::thread_rng().gen());
				// Fee credit is burned first when buying liquidity.
				let credited = inner.fee_credit_msat.min(fee_quote_msat);
				inner.fee_credit_msat -= credited;
				if channels_empty {
					vec![ReceivedWith::NewChannel {
						amount_msat,
						service_fee_msat,
						mining_fee_sat,
						channel_id,
						funding_tx_id,
						is_opener: false,
						confirmed_at: None,
						locked_at: None,
					}]
				} else {
					vec![ReceivedWith::SpliceIn {
						amount_msat,
						service_fee_msat,
						mining_fee_sat,
						channel_id,
						funding_tx_id,
						confirmed_at: None,
						locked_at: None,
					}]
				}
			},
			LiquidityDecision::AcceptAsCredit { amount_msat } => {
				inner.fee_credit_msat += amount_msat;
				vec![ReceivedWith::AddedToFeeCredit { amount_msat: *amount_msat }]
			},
			LiquidityDecision::Reject { .. } => return decision,
		};
		drop(inner);
		let _ = self.events_tx.send(NodeEvent::PaymentReceived {
			payment_hash,
			received_with,
			timestamp: now_millis(),
		});
		decision
	}
}

#[async_trait]
impl NodeEngine for MockEngine {
	fn node_id(&self) -> NodeId {
		self.node_id
	}

	async fn connect(&self) -> Result<(), EngineError> {
		self.state_tx.send_replace(ConnectionState::Connecting);
		self.state_tx.send_replace(ConnectionState::Established);
		Ok(())
	}

	async fn disconnect(&self) {
		self.state_tx.send_replace(ConnectionState::Closed);
	}

	fn connection_state(&self) -> watch::Receiver<ConnectionState> {
		self.state_tx.subscribe()
	}

	fn subscribe_events(&self) -> broadcast::Receiver<NodeEvent> {
		self.events_tx.subscribe()
	}

	fn channels(&self) -> Vec<ChannelSnapshot> {
		self.inner().channels.clone()
	}

	fn fee_credit_msat(&self) -> u64 {
		self.inner().fee_credit_msat
	}

	fn default_offer(&self) -> Result<OfferInfo, EngineError> {
		Ok(OfferInfo {
			serialized: format!("lno1mock{}", &self.node_id.to_hex()[..16]),
			node_id: self.node_id,
			description: None,
			amount_msat: None,
		})
	}

	fn set_liquidity_policy(&self, policy: LiquidityPolicy) {
		self.policy.set(policy);
	}

	async fn create_invoice(
		&self, request: CreateInvoiceRequest,
	) -> Result<CreatedInvoice, EngineError> {
		let preimage = Self::random_preimage();
		let payment_hash = preimage.payment_hash();
		let (description, description_hash) = match request.description {
			InvoiceDescription::Direct(d) => (Some(d), None),
			InvoiceDescription::Hash(h) => (None, Some(h)),
		};
		let invoice = Bolt11InvoiceInfo {
			serialized: format!("lnmock1{}", payment_hash.to_hex()),
			payment_hash,
			payee: self.node_id,
			amount_msat: request.amount_msat,
			description,
			description_hash,
			timestamp: now_millis(),
			expiry_seconds: request.expiry_seconds,
		};
		self.inner().invoices.insert(invoice.serialized.clone(), invoice.clone());
		Ok(CreatedInvoice { preimage, invoice })
	}

	async fn decode_invoice(&self, serialized: &str) -> Result<Bolt11InvoiceInfo, EngineError> {
		if let Some(invoice) = self.inner().invoices.get(serialized) {
			return Ok(invoice.clone());
		}
		if let Some(hash) = serialized.strip_prefix("lnmock1") {
			let payment_hash = hash
				.parse()
				.map_err(|_| EngineError::Invalid(format!("cannot decode invoice: {}", serialized)))?;
			return Ok(Bolt11InvoiceInfo {
				serialized: serialized.to_string(),
				payment_hash,
				payee: self.node_id,
				amount_msat: None,
				description: None,
				description_hash: None,
				timestamp: now_millis(),
				expiry_seconds: 3_600,
			});
		}
		Err(EngineError::Invalid(format!("cannot decode invoice: {}", serialized)))
	}

	async fn decode_offer(&self, serialized: &str) -> Result<OfferInfo, EngineError> {
		if !serialized.starts_with("lno1") {
			return Err(EngineError::Invalid(format!("cannot decode offer: {}", serialized)));
		}
		Ok(OfferInfo {
			serialized: serialized.to_string(),
			node_id: self.node_id,
			description: None,
			amount_msat: None,
		})
	}

	async fn pay_invoice(
		&self, serialized: &str, amount_msat: Option<u64>,
	) -> Result<PaySuccess, EngineError> {
		if self.inner().fail_payments {
			return Err(EngineError::PaymentFailed("no route to recipient".to_string()));
		}
		let invoice = self.decode_invoice(serialized).await?;
		let recipient_amount_msat = amount_msat
			.or(invoice.amount_msat)
			.ok_or_else(|| EngineError::Invalid("amount required for this invoice".to_string()))?;
		Ok(PaySuccess {
			payment_id: PaymentId::random(),
			payment_hash: invoice.payment_hash,
			preimage: Self::random_preimage(),
			recipient_amount_msat,
			routing_fee_msat: recipient_amount_msat / 1_000,
		})
	}

	async fn pay_offer(
		&self, serialized: &str, amount_msat: u64, _message: Option<&str>,
	) -> Result<PaySuccess, EngineError> {
		if self.inner().fail_payments {
			return Err(EngineError::PaymentFailed("offer recipient unreachable".to_string()));
		}
		self.decode_offer(serialized).await?;
		let preimage = Self::random_preimage();
		Ok(PaySuccess {
			payment_id: PaymentId::random(),
			payment_hash: preimage.payment_hash(),
			preimage,
			recipient_amount_msat: amount_msat,
			routing_fee_msat: amount_msat / 1_000,
		})
	}

	async fn splice_out(
		&self, _address: &str, amount_sat: u64, _feerate_sat_vb: u64,
	) -> Result<Txid, EngineError> {
		self.check_connected()?;
		let inner = self.inner();
		let balance_sat: u64 = inner.channels.iter().map(|c| c.balance_sat).sum();
		if balance_sat < amount_sat {
			return Err(EngineError::Invalid(format!(
				"balance of {} sat is too low to send {} sat",
				balance_sat, amount_sat
			)));
		}
		Ok(Txid(rand::thread_rng().gen()))
	}

	async fn splice_cpfp(&self, _feerate_sat_vb: u64) -> Result<Txid, EngineError> {
		self.check_connected()?;
		if self.inner().channels.is_empty() {
			return Err(EngineError::Invalid("no channel to bump".to_string()));
		}
		Ok(Txid(rand::thread_rng().gen()))
	}

	async fn estimate_cpfp_fee_sat(&self, feerate_sat_vb: u64) -> Result<u64, EngineError> {
		// A CPFP child spending one anchor weighs around 150 vbytes.
		Ok(feerate_sat_vb * 150)
	}

	async fn mutual_close(
		&self, channel_id: ChannelId, _address: &str, _feerate_sat_vb: u64,
	) -> Result<Txid, EngineError> {
		self.check_connected()?;
		let mut inner = self.inner();
		let position = inner.channels.iter().position(|c| c.channel_id == channel_id);
		match position {
			Some(position) => {
				inner.channels.remove(position);
				Ok(Txid(rand::thread_rng().gen()))
			},
			None => Err(EngineError::Invalid(format!("unknown channel: {}", channel_id))),
		}
	}

	async fn sign_lnurl_auth(
		&self, domain: &str, k1: &str,
	) -> Result<LnurlAuthSignature, EngineError> {
		// Deterministic per (domain, k1), which is all the callers rely on.
		let signature = webhook::sign(domain, k1.as_bytes());
		Ok(LnurlAuthSignature { key: self.node_id, signature })
	}
}
