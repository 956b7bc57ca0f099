// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use tokio::time::timeout;

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{json_response, text_response, ApiResponse, Context, PaymentSent};
use crate::io::model::{
	LightningOutgoingPayment, OutgoingDetails, OutgoingPart, OutgoingStatus, PartStatus,
};
use crate::node::{EngineError, NodeEngine, FETCH_INVOICE_TIMEOUT};
use crate::types::PaymentId;
use crate::util::now_millis;

pub(crate) async fn handle_pay_offer(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let serialized = params.string("offer")?;
	let amount_msat = params.amount_sat("amountSat")? * 1_000;
	let message = params.opt_string("message");
	pay_bolt12(context, &serialized, amount_msat, message.as_deref()).await
}

pub(crate) async fn pay_bolt12(
	context: &Context, serialized: &str, amount_msat: u64, message: Option<&str>,
) -> Result<ApiResponse, ApiError> {
	let offer = context.engine.decode_offer(serialized).await.map_err(|e| match e {
		EngineError::Invalid(message) => ApiError::BadRequest(message),
		other => ApiError::Internal(other.to_string()),
	})?;

	let payment = LightningOutgoingPayment {
		id: PaymentId::random(),
		recipient: offer.node_id,
		recipient_amount_msat: amount_msat,
		// The payment hash is only known once the payer fetched the invoice
		// behind the offer; until then the record carries a zero hash.
		payment_hash: crate::types::PaymentHash([0; 32]),
		details: OutgoingDetails::Blinded {
			payment_request: serialized.to_string(),
			payer_key: context.engine.node_id(),
		},
		parts: Vec::new(),
		status: OutgoingStatus::Pending,
		created_at: now_millis(),
	};
	context.db.add_outgoing(&payment)?;

	let outcome =
		timeout(FETCH_INVOICE_TIMEOUT, context.engine.pay_offer(serialized, amount_msat, message))
			.await
			.unwrap_or(Err(EngineError::Timeout));
	match outcome {
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

	#[tokio::test]
	async fn pays_an_offer_and_records_it() {
		let context = test_context(Arc::new(MockEngine::new()));
		let params = Params::from_pairs(&[("offer", "lno1qtip"), ("amountSat", "21")]);
		let body = body_json(handle_pay_offer(&context, &params).await.unwrap()).await;
		assert_eq!(body["recipientAmountSat"], 21);

		let id: PaymentId = body["paymentId"].as_str().unwrap().parse().unwrap();
		let stored = context.db.get_outgoing(id).unwrap().unwrap();
		assert!(matches!(stored.details, OutgoingDetails::Blinded { .. }));
		assert!(matches!(stored.status, OutgoingStatus::SucceededOffChain { .. }));
	}

	#[tokio::test]
	async fn offer_failures_are_reported_as_text() {
		let engine = Arc::new(MockEngine::new());
		engine.set_fail_payments(true);
		let context = test_context(engine);
		let params = Params::from_pairs(&[("offer", "lno1qtip"), ("amountSat", "21")]);
		let text = body_text(handle_pay_offer(&context, &params).await.unwrap()).await;
		assert!(text.contains("payment failed"));
	}

	#[tokio::test]
	async fn malformed_offers_are_a_bad_request() {
		let context = test_context(Arc::new(MockEngine::new()));
		let params = Params::from_pairs(&[("offer", "not-an-offer"), ("amountSat", "21")]);
		assert!(matches!(
			handle_pay_offer(&context, &params).await,
			Err(ApiError::BadRequest(_))
		));
	}
}
