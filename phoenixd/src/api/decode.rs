// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{json_response, ApiResponse, Context};
use crate::node::{EngineError, NodeEngine};
use crate::types::{NodeId, PaymentHash};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecodedInvoice {
	payment_hash: PaymentHash,
	payee: NodeId,
	#[serde(skip_serializing_if = "Option::is_none")]
	amount_msat: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	description_hash: Option<String>,
	timestamp: i64,
	expiry_seconds: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecodedOffer {
	node_id: NodeId,
	#[serde(skip_serializing_if = "Option::is_none")]
	description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	amount_msat: Option<u64>,
}

fn decode_error(e: EngineError) -> ApiError {
	match e {
		EngineError::Invalid(message) => ApiError::BadRequest(message),
		other => ApiError::Internal(other.to_string()),
	}
}

pub(crate) async fn handle_decode_invoice(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let serialized = params.string("invoice")?;
	let invoice = context.engine.decode_invoice(&serialized).await.map_err(decode_error)?;
	json_response(&DecodedInvoice {
		payment_hash: invoice.payment_hash,
		payee: invoice.payee,
		amount_msat: invoice.amount_msat,
		description: invoice.description,
		description_hash: invoice.description_hash,
		timestamp: invoice.timestamp,
		expiry_seconds: invoice.expiry_seconds,
	})
}

pub(crate) async fn handle_decode_offer(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let serialized = params.string("offer")?;
	let offer = context.engine.decode_offer(&serialized).await.map_err(decode_error)?;
	json_response(&DecodedOffer {
		node_id: offer.node_id,
		description: offer.description,
		amount_msat: offer.amount_msat,
	})
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::{body_json, test_context};
	use crate::node::mock::MockEngine;
	use crate::node::{CreateInvoiceRequest, InvoiceDescription, NodeEngine};

	#[tokio::test]
	async fn decodes_own_invoices() {
		let engine = Arc::new(MockEngine::new());
		let created = engine
			.create_invoice(CreateInvoiceRequest {
				amount_msat: Some(5_000_000),
				description: InvoiceDescription::Direct("decode me".to_string()),
				expiry_seconds: 600,
			})
			.await
			.unwrap();
		let context = test_context(engine);

		let params = Params::from_pairs(&[("invoice", created.invoice.serialized.as_str())]);
		let body = body_json(handle_decode_invoice(&context, &params).await.unwrap()).await;
		assert_eq!(body["amountMsat"], 5_000_000);
		assert_eq!(body["description"], "decode me");

		let garbage = Params::from_pairs(&[("invoice", "garbage")]);
		assert!(matches!(
			handle_decode_invoice(&context, &garbage).await,
			Err(ApiError::BadRequest(_))
		));
	}
}
