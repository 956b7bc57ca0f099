// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Tagged-version codecs for every polymorphic value the store persists.
//!
//! Each family is written as a `(type_version, blob)` pair. The tag selects
//! the variant and its serialization version; the blob is a versioned JSON
//! payload of the variant's fields. Adding a variant adds a new tag, old tags
//! keep decoding forever, and no tag is ever reused. Unknown tags fail the
//! read instead of degrading to a default.

use hex::{DisplayHex, FromHex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::model::{
	ClosingInfo, IncomingOrigin, LiquidityPurchase, OutgoingDetails, OutgoingStatus, PartStatus,
	ReceivedWith, RouteHop,
};
use crate::types::{ChannelId, NodeId, Preimage, Txid};

pub const INCOMING_ORIGIN_INVOICE_V0: u16 = 0x0001;
pub const INCOMING_ORIGIN_OFFER_V0: u16 = 0x0002;
pub const INCOMING_ORIGIN_SWAP_IN_V0: u16 = 0x0003;
pub const INCOMING_ORIGIN_ON_CHAIN_V0: u16 = 0x0004;

pub const RECEIVED_WITH_MULTIPART_V0: u16 = 0x0101;

pub const LIGHTNING_OUTGOING_DETAILS_NORMAL_V0: u16 = 0x0201;
pub const LIGHTNING_OUTGOING_DETAILS_KEYSEND_V0: u16 = 0x0202;
pub const LIGHTNING_OUTGOING_DETAILS_SWAP_OUT_V0: u16 = 0x0203;
pub const LIGHTNING_OUTGOING_DETAILS_BLINDED_V0: u16 = 0x0204;

pub const LIGHTNING_OUTGOING_STATUS_SUCCEEDED_OFFCHAIN_V0: u16 = 0x0301;
pub const LIGHTNING_OUTGOING_STATUS_FAILED_V0: u16 = 0x0302;

pub const LIGHTNING_OUTGOING_PART_STATUS_SUCCEEDED_V0: u16 = 0x0401;
pub const LIGHTNING_OUTGOING_PART_STATUS_FAILED_V0: u16 = 0x0402;

pub const CHANNEL_CLOSE_INFO_MUTUAL_V0: u16 = 0x0501;
pub const CHANNEL_CLOSE_INFO_LOCAL_V0: u16 = 0x0502;
pub const CHANNEL_CLOSE_INFO_REMOTE_V0: u16 = 0x0503;
pub const CHANNEL_CLOSE_INFO_REVOKED_V0: u16 = 0x0504;
pub const CHANNEL_CLOSE_INFO_OTHER_V0: u16 = 0x0505;

pub const LIQUIDITY_PURCHASE_STANDARD_V0: u16 = 0x0601;
pub const LIQUIDITY_PURCHASE_FROM_FEE_CREDIT_V0: u16 = 0x0602;

#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("unknown type version tag {tag:#06x} for {family}")]
	UnknownTag { family: &'static str, tag: u16 },
	#[error("malformed {family} blob: {source}")]
	Malformed { family: &'static str, source: serde_json::Error },
	#[error("malformed route column: {0}")]
	Route(String),
}

fn to_blob<T: Serialize>(payload: &T) -> Vec<u8> {
	// In-memory JSON serialization of our own payload structs cannot fail.
	serde_json::to_vec(payload).expect("codec payloads always serialize")
}

fn from_blob<'a, T: Deserialize<'a>>(family: &'static str, blob: &'a [u8]) -> Result<T, DecodeError> {
	serde_json::from_slice(blob).map_err(|source| DecodeError::Malformed { family, source })
}

// Incoming origin

#[derive(Serialize, Deserialize)]
struct InvoiceOriginV0 {
	payment_request: String,
	expires_at: i64,
}

#[derive(Serialize, Deserialize)]
struct OfferOriginV0 {
	metadata: String,
}

#[derive(Serialize, Deserialize)]
struct SwapInOriginV0 {
	address: String,
}

#[derive(Serialize, Deserialize)]
struct OnChainOriginV0 {
	txids: Vec<Txid>,
}

pub fn encode_incoming_origin(origin: &IncomingOrigin) -> (u16, Vec<u8>) {
	match origin {
		IncomingOrigin::Invoice { payment_request, expires_at } => (
			INCOMING_ORIGIN_INVOICE_V0,
			to_blob(&InvoiceOriginV0 {
				payment_request: payment_request.clone(),
				expires_at: *expires_at,
			}),
		),
		IncomingOrigin::Offer { metadata } => (
			INCOMING_ORIGIN_OFFER_V0,
			to_blob(&OfferOriginV0 { metadata: metadata.to_lower_hex_string() }),
		),
		IncomingOrigin::SwapIn { address } => (
			INCOMING_ORIGIN_SWAP_IN_V0,
			to_blob(&SwapInOriginV0 { address: address.clone() }),
		),
		IncomingOrigin::OnChain { txids } => {
			(INCOMING_ORIGIN_ON_CHAIN_V0, to_blob(&OnChainOriginV0 { txids: txids.clone() }))
		},
	}
}

pub fn decode_incoming_origin(tag: u16, blob: &[u8]) -> Result<IncomingOrigin, DecodeError> {
	const FAMILY: &str = "incoming origin";
	match tag {
		INCOMING_ORIGIN_INVOICE_V0 => {
			let payload: InvoiceOriginV0 = from_blob(FAMILY, blob)?;
			Ok(IncomingOrigin::Invoice {
				payment_request: payload.payment_request,
				expires_at: payload.expires_at,
			})
		},
		INCOMING_ORIGIN_OFFER_V0 => {
			let payload: OfferOriginV0 = from_blob(FAMILY, blob)?;
			let metadata = Vec::<u8>::from_hex(&payload.metadata).map_err(|_| {
				DecodeError::Malformed {
					family: FAMILY,
					source: serde_json::Error::io(std::io::Error::new(
						std::io::ErrorKind::InvalidData,
						"offer metadata is not hex",
					)),
				}
			})?;
			Ok(IncomingOrigin::Offer { metadata })
		},
		INCOMING_ORIGIN_SWAP_IN_V0 => {
			let payload: SwapInOriginV0 = from_blob(FAMILY, blob)?;
			Ok(IncomingOrigin::SwapIn { address: payload.address })
		},
		INCOMING_ORIGIN_ON_CHAIN_V0 => {
			let payload: OnChainOriginV0 = from_blob(FAMILY, blob)?;
			Ok(IncomingOrigin::OnChain { txids: payload.txids })
		},
		tag => Err(DecodeError::UnknownTag { family: FAMILY, tag }),
	}
}

// Received-with set. A single tag covers the whole set; the array elements
// are internally tagged so new part kinds extend the payload without a new
// column tag.

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReceivedWithV0 {
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

impl From<&ReceivedWith> for ReceivedWithV0 {
	fn from(part: &ReceivedWith) -> Self {
		match part {
			ReceivedWith::LightningPayment { amount_msat, channel_id, htlc_id } => {
				ReceivedWithV0::LightningPayment {
					amount_msat: *amount_msat,
					channel_id: *channel_id,
					htlc_id: *htlc_id,
				}
			},
			ReceivedWith::NewChannel {
				amount_msat,
				service_fee_msat,
				mining_fee_sat,
				channel_id,
				funding_tx_id,
				is_opener,
				confirmed_at,
				locked_at,
			} => ReceivedWithV0::NewChannel {
				amount_msat: *amount_msat,
				service_fee_msat: *service_fee_msat,
				mining_fee_sat: *mining_fee_sat,
				channel_id: *channel_id,
				funding_tx_id: *funding_tx_id,
				is_opener: *is_opener,
				confirmed_at: *confirmed_at,
				locked_at: *locked_at,
			},
			ReceivedWith::SpliceIn {
				amount_msat,
				service_fee_msat,
				mining_fee_sat,
				channel_id,
				funding_tx_id,
				confirmed_at,
				locked_at,
			} => ReceivedWithV0::SpliceIn {
				amount_msat: *amount_msat,
				service_fee_msat: *service_fee_msat,
				mining_fee_sat: *mining_fee_sat,
				channel_id: *channel_id,
				funding_tx_id: *funding_tx_id,
				confirmed_at: *confirmed_at,
				locked_at: *locked_at,
			},
			ReceivedWith::AddedToFeeCredit { amount_msat } => {
				ReceivedWithV0::AddedToFeeCredit { amount_msat: *amount_msat }
			},
			ReceivedWith::FeeCreditPayment { amount_msat } => {
				ReceivedWithV0::FeeCreditPayment { amount_msat: *amount_msat }
			},
		}
	}
}

impl From<ReceivedWithV0> for ReceivedWith {
	fn from(payload: ReceivedWithV0) -> Self {
		match payload {
			ReceivedWithV0::LightningPayment { amount_msat, channel_id, htlc_id } => {
				ReceivedWith::LightningPayment { amount_msat, channel_id, htlc_id }
			},
			ReceivedWithV0::NewChannel {
				amount_msat,
				service_fee_msat,
				mining_fee_sat,
				channel_id,
				funding_tx_id,
				is_opener,
				confirmed_at,
				locked_at,
			} => ReceivedWith::NewChannel {
				amount_msat,
				service_fee_msat,
				mining_fee_sat,
				channel_id,
				funding_tx_id,
				is_opener,
				confirmed_at,
				locked_at,
			},
			ReceivedWithV0::SpliceIn {
				amount_msat,
				service_fee_msat,
				mining_fee_sat,
				channel_id,
				funding_tx_id,
				confirmed_at,
				locked_at,
			} => ReceivedWith::SpliceIn {
				amount_msat,
				service_fee_msat,
				mining_fee_sat,
				channel_id,
				funding_tx_id,
				confirmed_at,
				locked_at,
			},
			ReceivedWithV0::AddedToFeeCredit { amount_msat } => {
				ReceivedWith::AddedToFeeCredit { amount_msat }
			},
			ReceivedWithV0::FeeCreditPayment { amount_msat } => {
				ReceivedWith::FeeCreditPayment { amount_msat }
			},
		}
	}
}

pub fn encode_received_with(parts: &[ReceivedWith]) -> (u16, Vec<u8>) {
	let payload: Vec<ReceivedWithV0> = parts.iter().map(ReceivedWithV0::from).collect();
	(RECEIVED_WITH_MULTIPART_V0, to_blob(&payload))
}

pub fn decode_received_with(tag: u16, blob: &[u8]) -> Result<Vec<ReceivedWith>, DecodeError> {
	const FAMILY: &str = "received with";
	match tag {
		RECEIVED_WITH_MULTIPART_V0 => {
			let payload: Vec<ReceivedWithV0> = from_blob(FAMILY, blob)?;
			Ok(payload.into_iter().map(ReceivedWith::from).collect())
		},
		tag => Err(DecodeError::UnknownTag { family: FAMILY, tag }),
	}
}

// Outgoing details

#[derive(Serialize, Deserialize)]
struct NormalDetailsV0 {
	payment_request: String,
}

#[derive(Serialize, Deserialize)]
struct KeySendDetailsV0 {
	preimage: Preimage,
}

#[derive(Serialize, Deserialize)]
struct SwapOutDetailsV0 {
	address: String,
	payment_request: String,
	swap_out_fee_sat: u64,
}

#[derive(Serialize, Deserialize)]
struct BlindedDetailsV0 {
	payment_request: String,
	payer_key: NodeId,
}

pub fn encode_outgoing_details(details: &OutgoingDetails) -> (u16, Vec<u8>) {
	match details {
		OutgoingDetails::Normal { payment_request } => (
			LIGHTNING_OUTGOING_DETAILS_NORMAL_V0,
			to_blob(&NormalDetailsV0 { payment_request: payment_request.clone() }),
		),
		OutgoingDetails::KeySend { preimage } => (
			LIGHTNING_OUTGOING_DETAILS_KEYSEND_V0,
			to_blob(&KeySendDetailsV0 { preimage: *preimage }),
		),
		OutgoingDetails::SwapOut { address, payment_request, swap_out_fee_sat } => (
			LIGHTNING_OUTGOING_DETAILS_SWAP_OUT_V0,
			to_blob(&SwapOutDetailsV0 {
				address: address.clone(),
				payment_request: payment_request.clone(),
				swap_out_fee_sat: *swap_out_fee_sat,
			}),
		),
		OutgoingDetails::Blinded { payment_request, payer_key } => (
			LIGHTNING_OUTGOING_DETAILS_BLINDED_V0,
			to_blob(&BlindedDetailsV0 {
				payment_request: payment_request.clone(),
				payer_key: *payer_key,
			}),
		),
	}
}

pub fn decode_outgoing_details(tag: u16, blob: &[u8]) -> Result<OutgoingDetails, DecodeError> {
	const FAMILY: &str = "outgoing details";
	match tag {
		LIGHTNING_OUTGOING_DETAILS_NORMAL_V0 => {
			let payload: NormalDetailsV0 = from_blob(FAMILY, blob)?;
			Ok(OutgoingDetails::Normal { payment_request: payload.payment_request })
		},
		LIGHTNING_OUTGOING_DETAILS_KEYSEND_V0 => {
			let payload: KeySendDetailsV0 = from_blob(FAMILY, blob)?;
			Ok(OutgoingDetails::KeySend { preimage: payload.preimage })
		},
		LIGHTNING_OUTGOING_DETAILS_SWAP_OUT_V0 => {
			let payload: SwapOutDetailsV0 = from_blob(FAMILY, blob)?;
			Ok(OutgoingDetails::SwapOut {
				address: payload.address,
				payment_request: payload.payment_request,
				swap_out_fee_sat: payload.swap_out_fee_sat,
			})
		},
		LIGHTNING_OUTGOING_DETAILS_BLINDED_V0 => {
			let payload: BlindedDetailsV0 = from_blob(FAMILY, blob)?;
			Ok(OutgoingDetails::Blinded {
				payment_request: payload.payment_request,
				payer_key: payload.payer_key,
			})
		},
		tag => Err(DecodeError::UnknownTag { family: FAMILY, tag }),
	}
}

// Outgoing payment/part statuses. `Pending` is represented by absent status
// columns and never encoded.

#[derive(Serialize, Deserialize)]
struct SucceededStatusV0 {
	preimage: Preimage,
	completed_at: i64,
}

#[derive(Serialize, Deserialize)]
struct FailedStatusV0 {
	reason: String,
	completed_at: i64,
}

/// Returns `None` for `Pending`: a pending payment has no status columns.
pub fn encode_outgoing_status(status: &OutgoingStatus) -> Option<(u16, Vec<u8>)> {
	match status {
		OutgoingStatus::Pending => None,
		OutgoingStatus::SucceededOffChain { preimage, completed_at } => Some((
			LIGHTNING_OUTGOING_STATUS_SUCCEEDED_OFFCHAIN_V0,
			to_blob(&SucceededStatusV0 { preimage: *preimage, completed_at: *completed_at }),
		)),
		OutgoingStatus::Failed { reason, completed_at } => Some((
			LIGHTNING_OUTGOING_STATUS_FAILED_V0,
			to_blob(&FailedStatusV0 { reason: reason.clone(), completed_at: *completed_at }),
		)),
	}
}

pub fn decode_outgoing_status(tag: u16, blob: &[u8]) -> Result<OutgoingStatus, DecodeError> {
	const FAMILY: &str = "outgoing status";
	match tag {
		LIGHTNING_OUTGOING_STATUS_SUCCEEDED_OFFCHAIN_V0 => {
			let payload: SucceededStatusV0 = from_blob(FAMILY, blob)?;
			Ok(OutgoingStatus::SucceededOffChain {
				preimage: payload.preimage,
				completed_at: payload.completed_at,
			})
		},
		LIGHTNING_OUTGOING_STATUS_FAILED_V0 => {
			let payload: FailedStatusV0 = from_blob(FAMILY, blob)?;
			Ok(OutgoingStatus::Failed {
				reason: payload.reason,
				completed_at: payload.completed_at,
			})
		},
		tag => Err(DecodeError::UnknownTag { family: FAMILY, tag }),
	}
}

/// Returns `None` for `Pending`, like [`encode_outgoing_status`].
pub fn encode_part_status(status: &PartStatus) -> Option<(u16, Vec<u8>)> {
	match status {
		PartStatus::Pending => None,
		PartStatus::Succeeded { preimage, completed_at } => Some((
			LIGHTNING_OUTGOING_PART_STATUS_SUCCEEDED_V0,
			to_blob(&SucceededStatusV0 { preimage: *preimage, completed_at: *completed_at }),
		)),
		PartStatus::Failed { reason, completed_at } => Some((
			LIGHTNING_OUTGOING_PART_STATUS_FAILED_V0,
			to_blob(&FailedStatusV0 { reason: reason.clone(), completed_at: *completed_at }),
		)),
	}
}

pub fn decode_part_status(tag: u16, blob: &[u8]) -> Result<PartStatus, DecodeError> {
	const FAMILY: &str = "outgoing part status";
	match tag {
		LIGHTNING_OUTGOING_PART_STATUS_SUCCEEDED_V0 => {
			let payload: SucceededStatusV0 = from_blob(FAMILY, blob)?;
			Ok(PartStatus::Succeeded {
				preimage: payload.preimage,
				completed_at: payload.completed_at,
			})
		},
		LIGHTNING_OUTGOING_PART_STATUS_FAILED_V0 => {
			let payload: FailedStatusV0 = from_blob(FAMILY, blob)?;
			Ok(PartStatus::Failed { reason: payload.reason, completed_at: payload.completed_at })
		},
		tag => Err(DecodeError::UnknownTag { family: FAMILY, tag }),
	}
}

// Closing info carries no fields today; the tag is the whole value and the
// blob is an empty object kept for future versions.

pub fn encode_closing_info(info: ClosingInfo) -> (u16, Vec<u8>) {
	let tag = match info {
		ClosingInfo::Mutual => CHANNEL_CLOSE_INFO_MUTUAL_V0,
		ClosingInfo::Local => CHANNEL_CLOSE_INFO_LOCAL_V0,
		ClosingInfo::Remote => CHANNEL_CLOSE_INFO_REMOTE_V0,
		ClosingInfo::Revoked => CHANNEL_CLOSE_INFO_REVOKED_V0,
		ClosingInfo::Other => CHANNEL_CLOSE_INFO_OTHER_V0,
	};
	(tag, b"{}".to_vec())
}

pub fn decode_closing_info(tag: u16, _blob: &[u8]) -> Result<ClosingInfo, DecodeError> {
	match tag {
		CHANNEL_CLOSE_INFO_MUTUAL_V0 => Ok(ClosingInfo::Mutual),
		CHANNEL_CLOSE_INFO_LOCAL_V0 => Ok(ClosingInfo::Local),
		CHANNEL_CLOSE_INFO_REMOTE_V0 => Ok(ClosingInfo::Remote),
		CHANNEL_CLOSE_INFO_REVOKED_V0 => Ok(ClosingInfo::Revoked),
		CHANNEL_CLOSE_INFO_OTHER_V0 => Ok(ClosingInfo::Other),
		tag => Err(DecodeError::UnknownTag { family: "closing info", tag }),
	}
}

// Liquidity purchase

#[derive(Serialize, Deserialize)]
struct StandardPurchaseV0 {
	amount_sat: u64,
	mining_fee_sat: u64,
	service_fee_sat: u64,
}

#[derive(Serialize, Deserialize)]
struct FromFeeCreditPurchaseV0 {
	amount_sat: u64,
	mining_fee_sat: u64,
	service_fee_sat: u64,
	fee_credit_used_msat: u64,
}

pub fn encode_liquidity_purchase(purchase: &LiquidityPurchase) -> (u16, Vec<u8>) {
	match purchase {
		LiquidityPurchase::Standard { amount_sat, mining_fee_sat, service_fee_sat } => (
			LIQUIDITY_PURCHASE_STANDARD_V0,
			to_blob(&StandardPurchaseV0 {
				amount_sat: *amount_sat,
				mining_fee_sat: *mining_fee_sat,
				service_fee_sat: *service_fee_sat,
			}),
		),
		LiquidityPurchase::FromFeeCredit {
			amount_sat,
			mining_fee_sat,
			service_fee_sat,
			fee_credit_used_msat,
		} => (
			LIQUIDITY_PURCHASE_FROM_FEE_CREDIT_V0,
			to_blob(&FromFeeCreditPurchaseV0 {
				amount_sat: *amount_sat,
				mining_fee_sat: *mining_fee_sat,
				service_fee_sat: *service_fee_sat,
				fee_credit_used_msat: *fee_credit_used_msat,
			}),
		),
	}
}

pub fn decode_liquidity_purchase(tag: u16, blob: &[u8]) -> Result<LiquidityPurchase, DecodeError> {
	const FAMILY: &str = "liquidity purchase";
	match tag {
		LIQUIDITY_PURCHASE_STANDARD_V0 => {
			let payload: StandardPurchaseV0 = from_blob(FAMILY, blob)?;
			Ok(LiquidityPurchase::Standard {
				amount_sat: payload.amount_sat,
				mining_fee_sat: payload.mining_fee_sat,
				service_fee_sat: payload.service_fee_sat,
			})
		},
		LIQUIDITY_PURCHASE_FROM_FEE_CREDIT_V0 => {
			let payload: FromFeeCreditPurchaseV0 = from_blob(FAMILY, blob)?;
			Ok(LiquidityPurchase::FromFeeCredit {
				amount_sat: payload.amount_sat,
				mining_fee_sat: payload.mining_fee_sat,
				service_fee_sat: payload.service_fee_sat,
				fee_credit_used_msat: payload.fee_credit_used_msat,
			})
		},
		tag => Err(DecodeError::UnknownTag { family: FAMILY, tag }),
	}
}

// Route text column: "node_a:node_b:short_channel_id?;..." with an empty
// string for an empty route and an empty third slot for a missing scid.

pub fn encode_route(route: &[RouteHop]) -> String {
	route
		.iter()
		.map(|hop| {
			format!(
				"{}:{}:{}",
				hop.node_a,
				hop.node_b,
				hop.short_channel_id.as_deref().unwrap_or("")
			)
		})
		.collect::<Vec<_>>()
		.join(";")
}

pub fn decode_route(column: &str) -> Result<Vec<RouteHop>, DecodeError> {
	if column.is_empty() {
		return Ok(Vec::new());
	}
	column
		.split(';')
		.map(|hop| {
			let mut slots = hop.split(':');
			let node_a = slots.next().unwrap_or_default();
			let node_b =
				slots.next().ok_or_else(|| DecodeError::Route(format!("missing node: {}", hop)))?;
			let scid = slots.next().unwrap_or_default();
			if slots.next().is_some() {
				return Err(DecodeError::Route(format!("too many slots: {}", hop)));
			}
			Ok(RouteHop {
				node_a: node_a.parse().map_err(DecodeError::Route)?,
				node_b: node_b.parse().map_err(DecodeError::Route)?,
				short_channel_id: if scid.is_empty() { None } else { Some(scid.to_string()) },
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn channel_id(byte: u8) -> ChannelId {
		ChannelId([byte; 32])
	}

	fn txid(byte: u8) -> Txid {
		Txid([byte; 32])
	}

	fn node_id(byte: u8) -> NodeId {
		NodeId([byte; 33])
	}

	#[test]
	fn incoming_origin_round_trip() {
		let origins = vec![
			IncomingOrigin::Invoice { payment_request: "lnbc1...".to_string(), expires_at: 123 },
			IncomingOrigin::Offer { metadata: vec![0xde, 0xad, 0xbe, 0xef] },
			IncomingOrigin::SwapIn { address: "bc1qxyz".to_string() },
			IncomingOrigin::OnChain { txids: vec![txid(7), txid(9)] },
		];
		let mut tags = std::collections::HashSet::new();
		for origin in origins {
			let (tag, blob) = encode_incoming_origin(&origin);
			assert!(tags.insert(tag), "tag {:#06x} reused", tag);
			assert_eq!(decode_incoming_origin(tag, &blob).unwrap(), origin);
		}
	}

	#[test]
	fn unknown_tag_is_an_error() {
		assert!(matches!(
			decode_incoming_origin(0xffff, b"{}"),
			Err(DecodeError::UnknownTag { tag: 0xffff, .. })
		));
		assert!(matches!(decode_received_with(0x0001, b"[]"), Err(DecodeError::UnknownTag { .. })));
		assert!(matches!(decode_outgoing_status(0x0404, b"{}"), Err(DecodeError::UnknownTag { .. })));
	}

	#[test]
	fn received_with_round_trip() {
		let parts = vec![
			ReceivedWith::LightningPayment {
				amount_msat: 10_000_000,
				channel_id: channel_id(1),
				htlc_id: 4,
			},
			ReceivedWith::NewChannel {
				amount_msat: 2_000_000_000,
				service_fee_msat: 20_000_000,
				mining_fee_sat: 10_000,
				channel_id: channel_id(2),
				funding_tx_id: txid(3),
				is_opener: false,
				confirmed_at: None,
				locked_at: Some(42),
			},
			ReceivedWith::SpliceIn {
				amount_msat: 500_000_000,
				service_fee_msat: 1_000_000,
				mining_fee_sat: 500,
				channel_id: channel_id(2),
				funding_tx_id: txid(4),
				confirmed_at: Some(7),
				locked_at: Some(7),
			},
			ReceivedWith::AddedToFeeCredit { amount_msat: 100_000 },
			ReceivedWith::FeeCreditPayment { amount_msat: 55_000 },
		];
		let (tag, blob) = encode_received_with(&parts);
		assert_eq!(tag, RECEIVED_WITH_MULTIPART_V0);
		assert_eq!(decode_received_with(tag, &blob).unwrap(), parts);
	}

	#[test]
	fn outgoing_details_round_trip() {
		let details = vec![
			OutgoingDetails::Normal { payment_request: "lnbc...".to_string() },
			OutgoingDetails::KeySend { preimage: Preimage([9; 32]) },
			OutgoingDetails::SwapOut {
				address: "bc1q...".to_string(),
				payment_request: "lnbc...".to_string(),
				swap_out_fee_sat: 420,
			},
			OutgoingDetails::Blinded {
				payment_request: "lni...".to_string(),
				payer_key: node_id(5),
			},
		];
		let mut tags = std::collections::HashSet::new();
		for detail in details {
			let (tag, blob) = encode_outgoing_details(&detail);
			assert!(tags.insert(tag));
			assert_eq!(decode_outgoing_details(tag, &blob).unwrap(), detail);
		}
	}

	#[test]
	fn statuses_round_trip_and_pending_encodes_to_none() {
		assert!(encode_outgoing_status(&OutgoingStatus::Pending).is_none());
		assert!(encode_part_status(&PartStatus::Pending).is_none());

		let succeeded =
			OutgoingStatus::SucceededOffChain { preimage: Preimage([3; 32]), completed_at: 99 };
		let (tag, blob) = encode_outgoing_status(&succeeded).unwrap();
		assert_eq!(decode_outgoing_status(tag, &blob).unwrap(), succeeded);

		let failed = PartStatus::Failed { reason: "no route".to_string(), completed_at: 100 };
		let (tag, blob) = encode_part_status(&failed).unwrap();
		assert_eq!(decode_part_status(tag, &blob).unwrap(), failed);
	}

	#[test]
	fn closing_info_and_purchase_round_trip() {
		for info in
			[ClosingInfo::Mutual, ClosingInfo::Local, ClosingInfo::Remote, ClosingInfo::Revoked, ClosingInfo::Other]
		{
			let (tag, blob) = encode_closing_info(info);
			assert_eq!(decode_closing_info(tag, &blob).unwrap(), info);
		}

		let purchase = LiquidityPurchase::FromFeeCredit {
			amount_sat: 100_000,
			mining_fee_sat: 1_000,
			service_fee_sat: 2_000,
			fee_credit_used_msat: 29_900_000,
		};
		let (tag, blob) = encode_liquidity_purchase(&purchase);
		assert_eq!(decode_liquidity_purchase(tag, &blob).unwrap(), purchase);
	}

	#[test]
	fn route_round_trip() {
		assert_eq!(encode_route(&[]), "");
		assert_eq!(decode_route("").unwrap(), Vec::new());

		let route = vec![
			RouteHop { node_a: node_id(1), node_b: node_id(2), short_channel_id: Some("803189x1x0".to_string()) },
			RouteHop { node_a: node_id(2), node_b: node_id(3), short_channel_id: None },
		];
		let column = encode_route(&route);
		assert!(column.ends_with(':'), "empty scid must keep its slot");
		assert_eq!(decode_route(&column).unwrap(), route);
	}

	#[test]
	fn route_rejects_garbage() {
		assert!(decode_route("abc").is_err());
		assert!(decode_route("aa:bb:cc:dd").is_err());
	}
}
