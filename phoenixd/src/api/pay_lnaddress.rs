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
use crate::api::pay_invoice::pay_bolt11;
use crate::api::pay_offer::pay_bolt12;
use crate::api::{text_response, ApiResponse, Context};
use crate::node::resolver::{AddressResolver, ResolvedDestination, ResolverError};

pub(crate) async fn handle_pay_lnaddress(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let address = params.string("address")?;
	let amount_msat = params.amount_sat("amountSat")? * 1_000;
	let message = params.opt_string("message");

	let (user, domain) = address
		.trim()
		.trim_start_matches('₿')
		.split_once('@')
		.ok_or(ApiError::InvalidParameter { name: "address", expected: "user@domain" })?;

	let resolved = match context
		.resolver
		.resolve_address(user, domain, amount_msat, message.as_deref())
		.await
	{
		Ok(resolved) => resolved,
		Err(ResolverError::InvalidAddress(_)) => {
			return Err(ApiError::InvalidParameter { name: "address", expected: "user@domain" })
		},
		// An unreachable or refusing endpoint is an outcome, not a caller bug.
		Err(e) => return Ok(text_response(format!("could not resolve address: {}", e))),
	};

	match resolved {
		ResolvedDestination::Bolt11(invoice) => {
			pay_bolt11(context, &invoice, Some(amount_msat)).await
		},
		ResolvedDestination::Bolt12(offer) => {
			pay_bolt12(context, &offer, amount_msat, message.as_deref()).await
		},
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::test_context;
	use crate::node::mock::MockEngine;

	#[tokio::test]
	async fn rejects_addresses_without_a_domain() {
		let context = test_context(Arc::new(MockEngine::new()));
		let params = Params::from_pairs(&[("address", "nobody"), ("amountSat", "10")]);
		assert!(matches!(
			handle_pay_lnaddress(&context, &params).await,
			Err(ApiError::InvalidParameter { name: "address", .. })
		));
	}

	#[tokio::test]
	async fn unresolvable_domains_are_an_outcome_not_an_error() {
		let context = test_context(Arc::new(MockEngine::new()));
		// The .invalid TLD never resolves.
		let params =
			Params::from_pairs(&[("address", "alice@host.invalid"), ("amountSat", "10")]);
		let response = handle_pay_lnaddress(&context, &params).await.unwrap();
		let text = crate::api::test_util::body_text(response).await;
		assert!(text.contains("could not resolve address"));
	}
}
