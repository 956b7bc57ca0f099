// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! LNURL flows. Each endpoint resolves the supplied LNURL first and rejects
//! early when its tag does not match the endpoint.

use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::pay_invoice::pay_bolt11;
use crate::api::{json_response, text_response, ApiResponse, Context};
use crate::io::model::IncomingOrigin;
use crate::node::resolver::{Lnurl, ResolverError};
use crate::node::{CreateInvoiceRequest, EngineError, InvoiceDescription, NodeEngine};
use crate::types::PaymentHash;
use crate::util::now_millis;

fn resolve_error(e: ResolverError) -> Result<ApiResponse, ApiError> {
	match e {
		ResolverError::InvalidLnurl(message) => {
			Err(ApiError::BadRequest(format!("invalid lnurl: {}", message)))
		},
		// Network-level and remote-service failures are outcomes.
		other => Ok(text_response(format!("lnurl request failed: {}", other))),
	}
}

fn wrong_tag(expected: &str, got: &Lnurl) -> ApiError {
	ApiError::BadRequest(format!("lnurl tag mismatch: expected {}, got {}", expected, got.tag()))
}

pub(crate) async fn handle_lnurl_pay(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let lnurl = params.string("lnurl")?;
	let amount_msat = params.amount_sat("amountSat")? * 1_000;
	let comment = params.opt_string("comment");

	let pay = match context.resolver.execute_lnurl(&lnurl).await {
		Ok(Lnurl::Pay(pay)) => pay,
		Ok(other) => return Err(wrong_tag("payRequest", &other)),
		Err(e) => return resolve_error(e),
	};
	let invoice =
		match context.resolver.get_lnurl_pay_invoice(&pay, amount_msat, comment.as_deref()).await {
			Ok(invoice) => invoice,
			Err(e) => return resolve_error(e),
		};
	pay_bolt11(context, &invoice, Some(amount_msat)).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LnurlWithdrawResponse {
	payment_hash: PaymentHash,
	invoice: String,
}

pub(crate) async fn handle_lnurl_withdraw(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let lnurl = params.string("lnurl")?;

	let withdraw = match context.resolver.execute_lnurl(&lnurl).await {
		Ok(Lnurl::Withdraw(withdraw)) => withdraw,
		Ok(other) => return Err(wrong_tag("withdrawRequest", &other)),
		Err(e) => return resolve_error(e),
	};

	// Issue an invoice for the maximum the service lets us pull, then hand it
	// to the service; the funds arrive like any other incoming payment.
	let created = context
		.engine
		.create_invoice(CreateInvoiceRequest {
			amount_msat: Some(withdraw.max_withdrawable_msat),
			description: InvoiceDescription::Direct(withdraw.default_description.clone()),
			expiry_seconds: 3_600,
		})
		.await
		.map_err(|e| match e {
			EngineError::Invalid(message) => ApiError::BadRequest(message),
			other => ApiError::Internal(other.to_string()),
		})?;
	context.db.add_incoming(
		created.preimage,
		created.invoice.payment_hash,
		&IncomingOrigin::Invoice {
			payment_request: created.invoice.serialized.clone(),
			expires_at: created.invoice.expires_at(),
		},
		now_millis(),
	)?;

	if let Err(e) =
		context.resolver.send_withdraw_invoice(&withdraw, &created.invoice.serialized).await
	{
		return resolve_error(e);
	}
	json_response(&LnurlWithdrawResponse {
		payment_hash: created.invoice.payment_hash,
		invoice: created.invoice.serialized,
	})
}

pub(crate) async fn handle_lnurl_auth(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let lnurl = params.string("lnurl")?;

	let auth = match context.resolver.execute_lnurl(&lnurl).await {
		Ok(Lnurl::Auth(auth)) => auth,
		Ok(other) => return Err(wrong_tag("login", &other)),
		Err(e) => return resolve_error(e),
	};
	let signature = context
		.engine
		.sign_lnurl_auth(&auth.domain, &auth.k1)
		.await
		.map_err(|e| ApiError::Internal(e.to_string()))?;
	if let Err(e) =
		context.resolver.send_auth(&auth, &signature.key, &signature.signature).await
	{
		return resolve_error(e);
	}
	Ok(text_response(format!("authenticated with {}", auth.domain)))
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::test_context;
	use crate::node::mock::MockEngine;

	#[tokio::test]
	async fn malformed_lnurls_are_a_bad_request() {
		let context = test_context(Arc::new(MockEngine::new()));
		let params = Params::from_pairs(&[("lnurl", "junk"), ("amountSat", "10")]);
		assert!(matches!(
			handle_lnurl_pay(&context, &params).await,
			Err(ApiError::BadRequest(_))
		));
	}

	#[tokio::test]
	async fn auth_endpoint_rejects_pay_lnurls_early() {
		let context = test_context(Arc::new(MockEngine::new()));
		// A login-tagged LNURL hitting the pay endpoint fails on the tag,
		// without any network round-trip.
		let params = Params::from_pairs(&[
			("lnurl", "https://service.com/auth?tag=login&k1=00"),
			("amountSat", "10"),
		]);
		let err = handle_lnurl_pay(&context, &params).await.unwrap_err();
		match err {
			ApiError::BadRequest(message) => assert!(message.contains("tag mismatch")),
			other => panic!("unexpected error: {:?}", other),
		}
	}
}
