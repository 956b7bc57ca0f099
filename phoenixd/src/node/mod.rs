// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The protocol engine boundary.
//!
//! The Lightning state machine (channels, HTLCs, onions, splices) lives
//! behind [`NodeEngine`]; this daemon only issues commands through the
//! trait and persists the events streaming back. [`mock::MockEngine`] is the
//! in-memory implementation used by tests and regtest runs.

pub(crate) mod fees;
pub(crate) mod mock;
pub(crate) mod resolver;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::io::model::{
	ChannelCloseOutgoingPayment, InboundLiquidityOutgoingPayment, ReceivedWith,
};
use crate::liquidity::LiquidityPolicy;
use crate::types::{ChannelId, NodeId, PaymentHash, PaymentId, Preimage, Txid};

/// Timeout for fetching the invoice behind a BOLT12 offer.
pub(crate) const FETCH_INVOICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle of the link to the LSP.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ConnectionState {
	Closed,
	Connecting,
	Established,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelSnapshot {
	pub channel_id: ChannelId,
	pub state: String,
	pub balance_sat: u64,
	pub inbound_liquidity_sat: u64,
	pub capacity_sat: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub funding_tx_id: Option<Txid>,
}

/// Parsed summary of a BOLT11 invoice, produced by the engine's invoice
/// library.
#[derive(Clone, Debug)]
pub(crate) struct Bolt11InvoiceInfo {
	pub serialized: String,
	pub payment_hash: PaymentHash,
	pub payee: NodeId,
	pub amount_msat: Option<u64>,
	pub description: Option<String>,
	pub description_hash: Option<String>,
	pub timestamp: i64,
	pub expiry_seconds: u64,
}

impl Bolt11InvoiceInfo {
	/// Absolute expiry in unix millis.
	pub(crate) fn expires_at(&self) -> i64 {
		self.timestamp + (self.expiry_seconds as i64) * 1_000
	}
}

#[derive(Clone, Debug)]
pub(crate) struct OfferInfo {
	pub serialized: String,
	pub node_id: NodeId,
	pub description: Option<String>,
	pub amount_msat: Option<u64>,
}

/// A freshly issued invoice; the preimage stays local and goes straight into
/// the payments database.
#[derive(Clone, Debug)]
pub(crate) struct CreatedInvoice {
	pub preimage: Preimage,
	pub invoice: Bolt11InvoiceInfo,
}

#[derive(Clone, Debug)]
pub(crate) enum InvoiceDescription {
	Direct(String),
	Hash(String),
}

#[derive(Clone, Debug)]
pub(crate) struct CreateInvoiceRequest {
	pub amount_msat: Option<u64>,
	pub description: InvoiceDescription,
	pub expiry_seconds: u64,
}

/// Outcome of a successful outgoing payment.
#[derive(Clone, Debug)]
pub(crate) struct PaySuccess {
	pub payment_id: PaymentId,
	pub payment_hash: PaymentHash,
	pub preimage: Preimage,
	pub recipient_amount_msat: u64,
	pub routing_fee_msat: u64,
}

/// DER signature over an LNURL-auth challenge, made with the domain-derived
/// linking key.
#[derive(Clone, Debug)]
pub(crate) struct LnurlAuthSignature {
	pub key: NodeId,
	pub signature: String,
}

/// Events emitted by the engine, in the order they occurred.
#[derive(Clone, Debug)]
pub(crate) enum NodeEvent {
	/// Funds arrived for a known payment hash. Carries the funding shape so
	/// the receipt can be persisted as-is.
	PaymentReceived { payment_hash: PaymentHash, received_with: Vec<ReceivedWith>, timestamp: i64 },
	/// The funding transaction behind a receipt was broadcast and seen.
	FundingLocked { payment_hash: PaymentHash, timestamp: i64 },
	/// The funding transaction behind a receipt reached enough confirmations.
	FundingConfirmed { payment_hash: PaymentHash, timestamp: i64 },
	/// A channel finished closing; insert-only record.
	ChannelClosed(ChannelCloseOutgoingPayment),
	/// An inbound liquidity lease was purchased.
	LiquidityPurchased(InboundLiquidityOutgoingPayment),
	/// The transaction behind a close or liquidity purchase was seen.
	TransactionLocked { tx_id: Txid, timestamp: i64 },
	/// That transaction reached enough confirmations.
	TransactionConfirmed { tx_id: Txid, timestamp: i64 },
	/// The channel set changed; snapshots should be refreshed.
	ChannelsUpdated,
}

#[derive(Debug, Error)]
pub(crate) enum EngineError {
	#[error("peer is not connected")]
	NotConnected,
	#[error("invalid input: {0}")]
	Invalid(String),
	#[error("payment failed: {0}")]
	PaymentFailed(String),
	#[error("operation timed out")]
	Timeout,
	#[error("{0}")]
	Internal(String),
}

/// Commands and state of the external Lightning protocol engine. All
/// commands go through the engine's internal mailbox; callers never touch
/// channel state directly.
#[async_trait]
pub(crate) trait NodeEngine: Send + Sync {
	fn node_id(&self) -> NodeId;

	/// Dials the LSP. Resolves once the transport is up; the handshake
	/// completion is observed via [`connection_state`](Self::connection_state).
	async fn connect(&self) -> Result<(), EngineError>;
	async fn disconnect(&self);
	fn connection_state(&self) -> watch::Receiver<ConnectionState>;
	fn subscribe_events(&self) -> broadcast::Receiver<NodeEvent>;

	fn channels(&self) -> Vec<ChannelSnapshot>;
	fn fee_credit_msat(&self) -> u64;
	fn default_offer(&self) -> Result<OfferInfo, EngineError>;
	fn set_liquidity_policy(&self, policy: LiquidityPolicy);

	async fn create_invoice(
		&self, request: CreateInvoiceRequest,
	) -> Result<CreatedInvoice, EngineError>;
	async fn decode_invoice(&self, serialized: &str) -> Result<Bolt11InvoiceInfo, EngineError>;
	async fn decode_offer(&self, serialized: &str) -> Result<OfferInfo, EngineError>;

	async fn pay_invoice(
		&self, serialized: &str, amount_msat: Option<u64>,
	) -> Result<PaySuccess, EngineError>;
	/// Fetches the invoice behind the offer and pays it. Callers bound this
	/// with [`FETCH_INVOICE_TIMEOUT`].
	async fn pay_offer(
		&self, serialized: &str, amount_msat: u64, message: Option<&str>,
	) -> Result<PaySuccess, EngineError>;

	async fn splice_out(
		&self, address: &str, amount_sat: u64, feerate_sat_vb: u64,
	) -> Result<Txid, EngineError>;
	async fn splice_cpfp(&self, feerate_sat_vb: u64) -> Result<Txid, EngineError>;
	async fn estimate_cpfp_fee_sat(&self, feerate_sat_vb: u64) -> Result<u64, EngineError>;
	async fn mutual_close(
		&self, channel_id: ChannelId, address: &str, feerate_sat_vb: u64,
	) -> Result<Txid, EngineError>;

	async fn sign_lnurl_auth(
		&self, domain: &str, k1: &str,
	) -> Result<LnurlAuthSignature, EngineError>;
}
