// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Domain model for persisted payments.
//!
//! These types are separate from both the HTTP API shapes and the storage
//! blobs to decouple the storage format from the API format; the versioned
//! blob payloads live in [`crate::io::codec`].

use crate::types::{ChannelId, NodeId, PaymentHash, PaymentId, Preimage, Txid};

/// How an incoming payment came to exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingOrigin {
	/// A BOLT11 invoice issued by this node. `expires_at` is the absolute
	/// expiry in unix millis, computed by the invoice library at issuance.
	Invoice { payment_request: String, expires_at: i64 },
	/// A payment bound to our BOLT12 offer; `metadata` is the opaque payer
	/// metadata blob produced by the offer library.
	Offer { metadata: Vec<u8> },
	SwapIn { address: String },
	OnChain { txids: Vec<Txid> },
}

/// One funding component of a received payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceivedWith {
	LightningPayment {
		amount_msat: u64,
		channel_id: ChannelId,
		htlc_id: u64,
	},
	NewChannel {
		amount_msat: u64,
		service_fee_msat: u64,
		mining_fee_sat: u64,
		channel_id: ChannelId,
		funding_tx_id: Txid,
		is_opener: bool,
		confirmed_at: Option<i64>,
		locked_at: Option<i64>,
	},
	SpliceIn {
		amount_msat: u64,
		service_fee_msat: u64,
		mining_fee_sat: u64,
		channel_id: ChannelId,
		funding_tx_id: Txid,
		confirmed_at: Option<i64>,
		locked_at: Option<i64>,
	},
	AddedToFeeCredit {
		amount_msat: u64,
	},
	FeeCreditPayment {
		amount_msat: u64,
	},
}

impl ReceivedWith {
	pub fn amount_msat(&self) -> u64 {
		match self {
			ReceivedWith::LightningPayment { amount_msat, .. }
			| ReceivedWith::NewChannel { amount_msat, .. }
			| ReceivedWith::SpliceIn { amount_msat, .. }
			| ReceivedWith::AddedToFeeCredit { amount_msat }
			| ReceivedWith::FeeCreditPayment { amount_msat } => *amount_msat,
		}
	}

	pub fn fees_msat(&self) -> u64 {
		match self {
			ReceivedWith::NewChannel { service_fee_msat, mining_fee_sat, .. }
			| ReceivedWith::SpliceIn { service_fee_msat, mining_fee_sat, .. } => {
				service_fee_msat + mining_fee_sat * 1_000
			},
			_ => 0,
		}
	}

	/// The key under which receipt parts are deduplicated when a receive is
	/// redelivered. Funding parts are identified by their funding transaction
	/// and channel, HTLC parts by their channel and HTLC id. Fee credit
	/// movements carry no protocol identity and are never deduplicated.
	pub(crate) fn natural_key(&self) -> Option<ReceivedWithKey> {
		match self {
			ReceivedWith::LightningPayment { channel_id, htlc_id, .. } => {
				Some(ReceivedWithKey::Htlc(*channel_id, *htlc_id))
			},
			ReceivedWith::NewChannel { channel_id, funding_tx_id, .. }
			| ReceivedWith::SpliceIn { channel_id, funding_tx_id, .. } => {
				Some(ReceivedWithKey::Funding(*funding_tx_id, *channel_id))
			},
			ReceivedWith::AddedToFeeCredit { .. } | ReceivedWith::FeeCreditPayment { .. } => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ReceivedWithKey {
	Htlc(ChannelId, u64),
	Funding(Txid, ChannelId),
}

/// Set once a payment has been received; only ever grows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingReceived {
	pub received_at: i64,
	pub received_with: Vec<ReceivedWith>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingPayment {
	pub id: PaymentId,
	pub payment_hash: PaymentHash,
	pub preimage: Preimage,
	pub origin: IncomingOrigin,
	pub created_at: i64,
	pub received: Option<IncomingReceived>,
}

impl IncomingPayment {
	pub fn amount_received_msat(&self) -> u64 {
		self.received
			.as_ref()
			.map(|r| r.received_with.iter().map(|p| p.amount_msat()).sum())
			.unwrap_or(0)
	}

	pub fn fees_msat(&self) -> u64 {
		self.received
			.as_ref()
			.map(|r| r.received_with.iter().map(|p| p.fees_msat()).sum())
			.unwrap_or(0)
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingDetails {
	Normal { payment_request: String },
	KeySend { preimage: Preimage },
	SwapOut { address: String, payment_request: String, swap_out_fee_sat: u64 },
	Blinded { payment_request: String, payer_key: NodeId },
}

/// One hop of a part's route. A missing short channel id means the hop went
/// over a channel we don't have an announcement for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteHop {
	pub node_a: NodeId,
	pub node_b: NodeId,
	pub short_channel_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartStatus {
	Pending,
	Succeeded { preimage: Preimage, completed_at: i64 },
	Failed { reason: String, completed_at: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingPart {
	pub id: PaymentId,
	pub amount_msat: u64,
	pub route: Vec<RouteHop>,
	pub status: PartStatus,
	pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingStatus {
	Pending,
	SucceededOffChain { preimage: Preimage, completed_at: i64 },
	Failed { reason: String, completed_at: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightningOutgoingPayment {
	pub id: PaymentId,
	pub recipient: NodeId,
	pub recipient_amount_msat: u64,
	pub payment_hash: PaymentHash,
	pub details: OutgoingDetails,
	pub parts: Vec<OutgoingPart>,
	pub status: OutgoingStatus,
	pub created_at: i64,
}

impl LightningOutgoingPayment {
	/// Sum of the amounts actually sent, i.e. of the succeeded parts.
	pub fn amount_sent_msat(&self) -> u64 {
		self.parts
			.iter()
			.filter(|p| matches!(p.status, PartStatus::Succeeded { .. }))
			.map(|p| p.amount_msat)
			.sum()
	}

	pub fn fees_msat(&self) -> u64 {
		self.amount_sent_msat().saturating_sub(self.recipient_amount_msat)
	}

	pub fn completed_at(&self) -> Option<i64> {
		match self.status {
			OutgoingStatus::Pending => None,
			OutgoingStatus::SucceededOffChain { completed_at, .. }
			| OutgoingStatus::Failed { completed_at, .. } => Some(completed_at),
		}
	}

	/// A successful MPP payment may carry failed or abandoned attempts whose
	/// exposure would confuse balance accounting: on a succeeded payment only
	/// the succeeded parts are returned. Other statuses keep all parts.
	pub fn filter_useless_parts(mut self) -> Self {
		if matches!(self.status, OutgoingStatus::SucceededOffChain { .. }) {
			self.parts.retain(|p| matches!(p.status, PartStatus::Succeeded { .. }));
		}
		self
	}
}

/// Why a channel was closed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClosingInfo {
	Mutual,
	Local,
	Remote,
	Revoked,
	Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelCloseOutgoingPayment {
	pub id: PaymentId,
	pub amount_sat: u64,
	pub address: String,
	pub is_sent_to_default_address: bool,
	pub mining_fee_sat: u64,
	pub channel_id: ChannelId,
	pub tx_id: Txid,
	pub created_at: i64,
	pub confirmed_at: Option<i64>,
	pub locked_at: Option<i64>,
	pub closing_info: ClosingInfo,
}

/// The liquidity lease bought from the LSP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiquidityPurchase {
	Standard { amount_sat: u64, mining_fee_sat: u64, service_fee_sat: u64 },
	FromFeeCredit {
		amount_sat: u64,
		mining_fee_sat: u64,
		service_fee_sat: u64,
		fee_credit_used_msat: u64,
	},
}

impl LiquidityPurchase {
	pub fn amount_sat(&self) -> u64 {
		match self {
			LiquidityPurchase::Standard { amount_sat, .. }
			| LiquidityPurchase::FromFeeCredit { amount_sat, .. } => *amount_sat,
		}
	}

	pub fn fees_sat(&self) -> u64 {
		match self {
			LiquidityPurchase::Standard { mining_fee_sat, service_fee_sat, .. }
			| LiquidityPurchase::FromFeeCredit { mining_fee_sat, service_fee_sat, .. } => {
				mining_fee_sat + service_fee_sat
			},
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundLiquidityOutgoingPayment {
	pub id: PaymentId,
	pub channel_id: ChannelId,
	pub tx_id: Txid,
	pub mining_fee_sat: u64,
	pub purchase: LiquidityPurchase,
	pub created_at: i64,
	pub confirmed_at: Option<i64>,
	pub locked_at: Option<i64>,
}

/// Discriminates the four payment tables for metadata rows; the metadata key
/// is the native key of the entity (payment hash for incoming, payment id
/// otherwise).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PaymentType {
	Incoming,
	LightningOutgoing,
	ChannelClose,
	InboundLiquidity,
}

impl PaymentType {
	pub(crate) fn to_db(self) -> i64 {
		match self {
			PaymentType::Incoming => 0,
			PaymentType::LightningOutgoing => 1,
			PaymentType::ChannelClose => 2,
			PaymentType::InboundLiquidity => 3,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentMetadata {
	pub external_id: Option<String>,
	pub webhook_url: Option<String>,
}
