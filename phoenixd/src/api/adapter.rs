// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! JSON views of the stored payment records. Kept separate from both the
//! domain model and the storage blobs so the API shape can evolve on its own.

use serde::Serialize;

use crate::io::model::{
	ChannelCloseOutgoingPayment, ClosingInfo, InboundLiquidityOutgoingPayment, IncomingOrigin,
	IncomingPayment, LightningOutgoingPayment, LiquidityPurchase, OutgoingDetails, OutgoingStatus,
	PartStatus, ReceivedWith,
};
use crate::types::{ChannelId, NodeId, PaymentHash, PaymentId, Preimage, Txid};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IncomingPaymentView {
	pub payment_id: PaymentId,
	pub payment_hash: PaymentHash,
	pub preimage: Preimage,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub external_id: Option<String>,
	pub origin: OriginView,
	pub is_paid: bool,
	pub received_sat: u64,
	pub fees_sat: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub received: Option<ReceivedView>,
	pub created_at: i64,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum OriginView {
	#[serde(rename_all = "camelCase")]
	Invoice { invoice: String, expires_at: i64 },
	#[serde(rename_all = "camelCase")]
	Offer { metadata: String },
	#[serde(rename_all = "camelCase")]
	SwapIn { address: String },
	#[serde(rename_all = "camelCase")]
	OnChain { txids: Vec<Txid> },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReceivedView {
	pub received_at: i64,
	pub received_with: Vec<ReceivedWithView>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ReceivedWithView {
	#[serde(rename_all = "camelCase")]
	LightningPayment { amount_msat: u64, channel_id: ChannelId, htlc_id: u64 },
	#[serde(rename_all = "camelCase")]
	NewChannel {
		amount_msat: u64,
		service_fee_msat: u64,
		mining_fee_sat: u64,
		channel_id: ChannelId,
		funding_tx_id: Txid,
		is_opener: bool,
		#[serde(skip_serializing_if = "Option::is_none")]
		confirmed_at: Option<i64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		locked_at: Option<i64>,
	},
	#[serde(rename_all = "camelCase")]
	SpliceIn {
		amount_msat: u64,
		service_fee_msat: u64,
		mining_fee_sat: u64,
		channel_id: ChannelId,
		funding_tx_id: Txid,
		#[serde(skip_serializing_if = "Option::is_none")]
		confirmed_at: Option<i64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		locked_at: Option<i64>,
	},
	#[serde(rename_all = "camelCase")]
	AddedToFeeCredit { amount_msat: u64 },
	#[serde(rename_all = "camelCase")]
	FeeCreditPayment { amount_msat: u64 },
}

impl From<&ReceivedWith> for ReceivedWithView {
	fn from(part: &ReceivedWith) -> Self {
		match part {
			ReceivedWith::LightningPayment { amount_msat, channel_id, htlc_id } => {
				ReceivedWithView::LightningPayment {
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
			} => ReceivedWithView::NewChannel {
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
			} => ReceivedWithView::SpliceIn {
				amount_msat: *amount_msat,
				service_fee_msat: *service_fee_msat,
				mining_fee_sat: *mining_fee_sat,
				channel_id: *channel_id,
				funding_tx_id: *funding_tx_id,
				confirmed_at: *confirmed_at,
				locked_at: *locked_at,
			},
			ReceivedWith::AddedToFeeCredit { amount_msat } => {
				ReceivedWithView::AddedToFeeCredit { amount_msat: *amount_msat }
			},
			ReceivedWith::FeeCreditPayment { amount_msat } => {
				ReceivedWithView::FeeCreditPayment { amount_msat: *amount_msat }
			},
		}
	}
}

pub(crate) fn incoming_to_view(
	payment: &IncomingPayment, external_id: Option<String>,
) -> IncomingPaymentView {
	use hex::DisplayHex;
	let origin = match &payment.origin {
		IncomingOrigin::Invoice { payment_request, expires_at } => OriginView::Invoice {
			invoice: payment_request.clone(),
			expires_at: *expires_at,
		},
		IncomingOrigin::Offer { metadata } => {
			OriginView::Offer { metadata: metadata.to_lower_hex_string() }
		},
		IncomingOrigin::SwapIn { address } => OriginView::SwapIn { address: address.clone() },
		IncomingOrigin::OnChain { txids } => OriginView::OnChain { txids: txids.clone() },
	};
	IncomingPaymentView {
		payment_id: payment.id,
		payment_hash: payment.payment_hash,
		preimage: payment.preimage,
		external_id,
		origin,
		is_paid: payment.received.is_some(),
		received_sat: payment.amount_received_msat() / 1_000,
		fees_sat: payment.fees_msat() / 1_000,
		received: payment.received.as_ref().map(|received| ReceivedView {
			received_at: received.received_at,
			received_with: received.received_with.iter().map(Into::into).collect(),
		}),
		created_at: payment.created_at,
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingPaymentView {
	pub payment_id: PaymentId,
	pub payment_hash: PaymentHash,
	pub recipient: NodeId,
	pub recipient_amount_msat: u64,
	pub details: DetailsView,
	pub status: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub preimage: Option<Preimage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<String>,
	pub sent_msat: u64,
	pub fees_msat: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<i64>,
	pub created_at: i64,
	pub parts: Vec<OutgoingPartView>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum DetailsView {
	#[serde(rename_all = "camelCase")]
	Normal { invoice: String },
	#[serde(rename_all = "camelCase")]
	KeySend {},
	#[serde(rename_all = "camelCase")]
	SwapOut { address: String, invoice: String, swap_out_fee_sat: u64 },
	#[serde(rename_all = "camelCase")]
	Blinded { invoice: String, payer_key: NodeId },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingPartView {
	pub part_id: PaymentId,
	pub amount_msat: u64,
	pub route: String,
	pub status: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<i64>,
	pub created_at: i64,
}

pub(crate) fn outgoing_to_view(payment: &LightningOutgoingPayment) -> OutgoingPaymentView {
	let details = match &payment.details {
		OutgoingDetails::Normal { payment_request } => {
			DetailsView::Normal { invoice: payment_request.clone() }
		},
		OutgoingDetails::KeySend { .. } => DetailsView::KeySend {},
		OutgoingDetails::SwapOut { address, payment_request, swap_out_fee_sat } => {
			DetailsView::SwapOut {
				address: address.clone(),
				invoice: payment_request.clone(),
				swap_out_fee_sat: *swap_out_fee_sat,
			}
		},
		OutgoingDetails::Blinded { payment_request, payer_key } => {
			DetailsView::Blinded { invoice: payment_request.clone(), payer_key: *payer_key }
		},
	};
	let (status, preimage, failure) = match &payment.status {
		OutgoingStatus::Pending => ("pending", None, None),
		OutgoingStatus::SucceededOffChain { preimage, .. } => ("succeeded", Some(*preimage), None),
		OutgoingStatus::Failed { reason, .. } => ("failed", None, Some(reason.clone())),
	};
	OutgoingPaymentView {
		payment_id: payment.id,
		payment_hash: payment.payment_hash,
		recipient: payment.recipient,
		recipient_amount_msat: payment.recipient_amount_msat,
		details,
		status,
		preimage,
		failure,
		sent_msat: payment.amount_sent_msat(),
		fees_msat: payment.fees_msat(),
		completed_at: payment.completed_at(),
		created_at: payment.created_at,
		parts: payment
			.parts
			.iter()
			.map(|part| {
				let (status, failure, completed_at) = match &part.status {
					PartStatus::Pending => ("pending", None, None),
					PartStatus::Succeeded { completed_at, .. } => {
						("succeeded", None, Some(*completed_at))
					},
					PartStatus::Failed { reason, completed_at } => {
						("failed", Some(reason.clone()), Some(*completed_at))
					},
				};
				OutgoingPartView {
					part_id: part.id,
					amount_msat: part.amount_msat,
					route: crate::io::codec::encode_route(&part.route),
					status,
					failure,
					completed_at,
					created_at: part.created_at,
				}
			})
			.collect(),
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelCloseView {
	pub payment_id: PaymentId,
	pub amount_sat: u64,
	pub address: String,
	pub is_sent_to_default_address: bool,
	pub mining_fee_sat: u64,
	pub channel_id: ChannelId,
	pub tx_id: Txid,
	pub closing_type: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confirmed_at: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub locked_at: Option<i64>,
	pub created_at: i64,
}

pub(crate) fn channel_close_to_view(payment: &ChannelCloseOutgoingPayment) -> ChannelCloseView {
	ChannelCloseView {
		payment_id: payment.id,
		amount_sat: payment.amount_sat,
		address: payment.address.clone(),
		is_sent_to_default_address: payment.is_sent_to_default_address,
		mining_fee_sat: payment.mining_fee_sat,
		channel_id: payment.channel_id,
		tx_id: payment.tx_id,
		closing_type: match payment.closing_info {
			ClosingInfo::Mutual => "mutual",
			ClosingInfo::Local => "local",
			ClosingInfo::Remote => "remote",
			ClosingInfo::Revoked => "revoked",
			ClosingInfo::Other => "other",
		},
		confirmed_at: payment.confirmed_at,
		locked_at: payment.locked_at,
		created_at: payment.created_at,
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InboundLiquidityView {
	pub payment_id: PaymentId,
	pub channel_id: ChannelId,
	pub tx_id: Txid,
	pub amount_sat: u64,
	pub mining_fee_sat: u64,
	pub service_fee_sat: u64,
	pub paid_from_fee_credit_msat: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confirmed_at: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub locked_at: Option<i64>,
	pub created_at: i64,
}

pub(crate) fn inbound_liquidity_to_view(
	payment: &InboundLiquidityOutgoingPayment,
) -> InboundLiquidityView {
	let (service_fee_sat, mining_fee_sat, paid_from_fee_credit_msat) = match payment.purchase {
		LiquidityPurchase::Standard { mining_fee_sat, service_fee_sat, .. } => {
			(service_fee_sat, mining_fee_sat, 0)
		},
		LiquidityPurchase::FromFeeCredit {
			mining_fee_sat,
			service_fee_sat,
			fee_credit_used_msat,
			..
		} => (service_fee_sat, mining_fee_sat, fee_credit_used_msat),
	};
	InboundLiquidityView {
		payment_id: payment.id,
		channel_id: payment.channel_id,
		tx_id: payment.tx_id,
		amount_sat: payment.purchase.amount_sat(),
		mining_fee_sat,
		service_fee_sat,
		paid_from_fee_credit_msat,
		confirmed_at: payment.confirmed_at,
		locked_at: payment.locked_at,
		created_at: payment.created_at,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::io::model::IncomingReceived;

	#[test]
	fn incoming_view_reports_receipt() {
		let preimage = Preimage([1; 32]);
		let payment = IncomingPayment {
			id: PaymentId::random(),
			payment_hash: preimage.payment_hash(),
			preimage,
			origin: IncomingOrigin::Invoice {
				payment_request: "lnbc1".to_string(),
				expires_at: 9_000,
			},
			created_at: 1_000,
			received: Some(IncomingReceived {
				received_at: 2_000,
				received_with: vec![ReceivedWith::LightningPayment {
					amount_msat: 10_000_000,
					channel_id: ChannelId([1; 32]),
					htlc_id: 1,
				}],
			}),
		};
		let view = incoming_to_view(&payment, Some("order-9".to_string()));
		assert!(view.is_paid);
		assert_eq!(view.received_sat, 10_000);
		assert_eq!(view.fees_sat, 0);

		let json = serde_json::to_value(&view).unwrap();
		assert_eq!(json["externalId"], "order-9");
		assert_eq!(json["received"]["receivedAt"], 2_000);
		assert_eq!(json["received"]["receivedWith"][0]["type"], "lightningPayment");
		assert_eq!(json["received"]["receivedWith"][0]["amountMsat"], 10_000_000);
	}

	#[test]
	fn keysend_details_do_not_leak_the_preimage() {
		let payment = LightningOutgoingPayment {
			id: PaymentId::random(),
			recipient: NodeId([2; 33]),
			recipient_amount_msat: 1_000,
			payment_hash: Preimage([1; 32]).payment_hash(),
			details: OutgoingDetails::KeySend { preimage: Preimage([9; 32]) },
			parts: vec![],
			status: OutgoingStatus::Pending,
			created_at: 1,
		};
		let json = serde_json::to_value(outgoing_to_view(&payment)).unwrap();
		assert_eq!(json["details"]["type"], "keySend");
		assert_eq!(json["status"], "pending");
		assert!(json["details"].get("preimage").is_none());
	}
}
