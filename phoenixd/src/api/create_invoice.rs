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
use crate::io::model::{IncomingOrigin, PaymentType};
use crate::node::{CreateInvoiceRequest, EngineError, InvoiceDescription, NodeEngine};
use crate::types::PaymentHash;
use crate::util::now_millis;

const MAX_DESCRIPTION_LENGTH: usize = 128;
const DEFAULT_EXPIRY_SECONDS: u64 = 3_600;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceResponse {
	#[serde(skip_serializing_if = "Option::is_none")]
	amount_sat: Option<u64>,
	payment_hash: PaymentHash,
	serialized: String,
}

pub(crate) async fn handle_create_invoice(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let description = match (params.opt_string("description"), params.opt_string("descriptionHash"))
	{
		(Some(_), Some(_)) => {
			return Err(ApiError::BadRequest(
				"must provide either description or descriptionHash, not both".to_string(),
			))
		},
		(Some(description), None) => {
			if description.len() > MAX_DESCRIPTION_LENGTH {
				return Err(ApiError::InvalidParameter {
					name: "description",
					expected: "at most 128 characters",
				});
			}
			InvoiceDescription::Direct(description)
		},
		(None, Some(hash)) => InvoiceDescription::Hash(hash),
		(None, None) => return Err(ApiError::MissingParameter("description")),
	};
	let amount_sat = params.opt_amount_sat("amountSat")?;
	let expiry_seconds = params.opt_u64("expirySeconds")?.unwrap_or(DEFAULT_EXPIRY_SECONDS);
	let external_id = params.opt_string("externalId");
	let webhook_url = params.opt_string("webhookUrl");

	let created = context
		.engine
		.create_invoice(CreateInvoiceRequest {
			amount_msat: amount_sat.map(|sat| sat * 1_000),
			description,
			expiry_seconds,
		})
		.await
		.map_err(|e| match e {
			EngineError::Invalid(message) => ApiError::BadRequest(message),
			other => ApiError::Internal(other.to_string()),
		})?;

	let invoice = &created.invoice;
	context.db.add_incoming(
		created.preimage,
		invoice.payment_hash,
		&IncomingOrigin::Invoice {
			payment_request: invoice.serialized.clone(),
			expires_at: invoice.expires_at(),
		},
		now_millis(),
	)?;
	// The metadata row must exist before we answer, so a webhook fired by a
	// fast payer can already be enriched.
	if external_id.is_some() || webhook_url.is_some() {
		context.db.insert_metadata(
			PaymentType::Incoming,
			&invoice.payment_hash.to_hex(),
			external_id.as_deref(),
			webhook_url.as_deref(),
			now_millis(),
		)?;
	}

	json_response(&CreateInvoiceResponse {
		amount_sat,
		payment_hash: invoice.payment_hash,
		serialized: invoice.serialized.clone(),
	})
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::{body_json, test_context};
	use crate::node::mock::MockEngine;

	#[tokio::test]
	async fn creates_and_persists_an_invoice() {
		let context = test_context(Arc::new(MockEngine::new()));
		let params = Params::from_pairs(&[
			("description", "coffee"),
			("amountSat", "10000"),
			("expirySeconds", "3600"),
			("externalId", "order-7"),
		]);

		let response = handle_create_invoice(&context, &params).await.unwrap();
		let body = body_json(response).await;
		assert_eq!(body["amountSat"], 10_000);
		let hash: PaymentHash = body["paymentHash"].as_str().unwrap().parse().unwrap();

		let stored = context.db.get_incoming(hash).unwrap().unwrap();
		assert!(stored.received.is_none());
		let metadata =
			context.db.get_metadata(PaymentType::Incoming, &hash.to_hex()).unwrap().unwrap();
		assert_eq!(metadata.external_id.as_deref(), Some("order-7"));
	}

	#[tokio::test]
	async fn rejects_impossible_description_combinations() {
		let context = test_context(Arc::new(MockEngine::new()));

		let both = Params::from_pairs(&[("description", "a"), ("descriptionHash", "b")]);
		assert!(matches!(
			handle_create_invoice(&context, &both).await,
			Err(ApiError::BadRequest(_))
		));

		let neither = Params::from_pairs(&[("amountSat", "1")]);
		assert!(matches!(
			handle_create_invoice(&context, &neither).await,
			Err(ApiError::MissingParameter("description"))
		));

		let long = "x".repeat(129);
		let too_long = Params::from_pairs(&[("description", long.as_str())]);
		assert!(matches!(
			handle_create_invoice(&context, &too_long).await,
			Err(ApiError::InvalidParameter { name: "description", .. })
		));
	}

	#[tokio::test]
	async fn any_amount_invoices_omit_the_amount() {
		let context = test_context(Arc::new(MockEngine::new()));
		let params = Params::from_pairs(&[("description", "donations")]);
		let response = handle_create_invoice(&context, &params).await.unwrap();
		let body = body_json(response).await;
		assert!(body.get("amountSat").is_none());
	}
}
