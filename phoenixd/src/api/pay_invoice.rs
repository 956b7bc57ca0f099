// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{json_response, text_response, ApiResponse, Context, PaymentSent};
use crate::io::model::{
	LightningOutgoingPayment, OutgoingDetails, OutgoingPart, OutgoingStatus, PartStatus,
};
use crate::node::{EngineError, NodeEngine};
use crate::types::PaymentId;
use crate::util::now_millis;

pub(crate) async fn handle_pay_invoice(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let serialized = params.string("invoice")?;
	let amount_msat = params.opt_amount_sat("amountSat")?.map(|sat| sat * 1_000);
	pay_bolt11(context, &serialized, amount_msat).await
}

/// Decodes, records the attempt, pays, and completes the record. Shared with
/// the Lightning-address and LNURL-pay flows.
pub(crate) async fn pay_bolt11(
	context: &Context, serialized: &str, amount_msat: Option<u64>,
) -> Result<ApiResponse, ApiError> {
	let invoice = context.engine.decode_invoice(serialized).await.map_err(|e| match e {
		EngineError::Invalid(message) => ApiError::BadRequest(message),
		other => ApiError::Internal(other.to_string()),
	})?;
	let recipient_amount_msat = match amount_msat.or(invoice.amount_msat) {
		Some(amount) => amount,
		None => return Err(ApiError::MissingParameter("amountSat")),
	};

	// The attempt exists in the database before the first HTLC leaves.
	let payment = LightningOutgoingPayment {
		id: PaymentId::random(),
		recipient: invoice.payee,
		recipient_amount_msat,
		payment_hash: invoice.payment_hash,
		details: OutgoingDetails::Normal { payment_request: serialized.to_string() },
		parts: Vec::new(),
		status: OutgoingStatus::Pending,
		created_at: now_millis(),
	};
	context.db.add_outgoing(&payment)?;

	match context.engine.pay_invoice(serialized, amount_msat).await {
		Ok(success) => {
			let completed_at = now_millis();
			context.db.add_outgoing_parts(
				payment.id,
				&[OutgoingPart {
					id: PaymentId::random(),
					amount_msat: success.recipient_amount_msat + success.routing_fee_msat,
					route: Vec::new(),
					status: PartStatus::Succeeded { preimage: success.preimage, completed_at },
					created_at: completed_at,
				}],
			)?;
			context.db.complete_outgoing(
				payment.id,
				&OutgoingStatus::SucceededOffChain { preimage: success.preimage, completed_at },
			)?;
			let mut sent = PaymentSent::from(&success);
			sent.payment_id = payment.id;
			json_response(&sent)
		},
		Err(e) => {
			let reason = e.to_string();
			context.db.complete_outgoing(
				payment.id,
				&OutgoingStatus::Failed { reason: reason.clone(), completed_at: now_millis() },
			)?;
			match e {
				EngineError::Invalid(message) => Err(ApiError::BadRequest(message)),
				EngineError::Internal(message) => Err(ApiError::Internal(message)),
				// Payment-level failures are outcomes, not transport errors.
				_ => Ok(text_response(format!("payment failed: {}", reason))),
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::{body_json, body_text, test_context};
	use crate::node::mock::MockEngine;
	use crate::node::{CreateInvoiceRequest, InvoiceDescription, NodeEngine};
	use crate::types::PaymentHash;

	async fn invoice(engine: &MockEngine, amount_msat: Option<u64>) -> String {
		engine
			.create_invoice(CreateInvoiceRequest {
				amount_msat,
				description: InvoiceDescription::Direct("test".to_string()),
				expiry_seconds: 600,
			})
			.await
			.unwrap()
			.invoice
			.serialized
	}

	#[tokio::test]
	async fn successful_payment_is_recorded_and_returned() {
		let engine = Arc::new(MockEngine::new());
		let serialized = invoice(&engine, Some(50_000)).await;
		let context = test_context(engine);

		let params = Params::from_pairs(&[("invoice", serialized.as_str())]);
		let body = body_json(handle_pay_invoice(&context, &params).await.unwrap()).await;
		assert_eq!(body["recipientAmountSat"], 50);
		let id: PaymentId = body["paymentId"].as_str().unwrap().parse().unwrap();
		let hash: PaymentHash = body["paymentHash"].as_str().unwrap().parse().unwrap();

		let stored = context.db.get_outgoing(id).unwrap().unwrap();
		assert!(matches!(stored.status, OutgoingStatus::SucceededOffChain { .. }));
		assert_eq!(stored.payment_hash, hash);
		assert_eq!(stored.parts.len(), 1);
		assert_eq!(context.db.list_outgoing_for_payment_hash(hash).unwrap().len(), 1);
	}

	#[tokio::test]
	async fn amount_override_applies() {
		let engine = Arc::new(MockEngine::new());
		let serialized = invoice(&engine, None).await;
		let context = test_context(engine);

		let params = Params::from_pairs(&[("invoice", serialized.as_str()), ("amountSat", "25")]);
		let body = body_json(handle_pay_invoice(&context, &params).await.unwrap()).await;
		assert_eq!(body["recipientAmountSat"], 25);

		let missing = Params::from_pairs(&[("invoice", serialized.as_str())]);
		assert!(matches!(
			handle_pay_invoice(&context, &missing).await,
			Err(ApiError::MissingParameter("amountSat"))
		));
	}

	#[tokio::test]
	async fn failed_payment_is_recorded_and_reported_as_text() {
		let engine = Arc::new(MockEngine::new());
		let serialized = invoice(&engine, Some(50_000)).await;
		engine.set_fail_payments(true);
		let context = test_context(engine);

		let params = Params::from_pairs(&[("invoice", serialized.as_str())]);
		let response = handle_pay_invoice(&context, &params).await.unwrap();
		let text = body_text(response).await;
		assert!(text.contains("payment failed"));

		let hash: PaymentHash = serialized.strip_prefix("lnmock1").unwrap().parse().unwrap();
		let stored = context.db.list_outgoing_for_payment_hash(hash).unwrap();
		assert_eq!(stored.len(), 1);
		assert!(matches!(stored[0].status, OutgoingStatus::Failed { .. }));
	}
}
