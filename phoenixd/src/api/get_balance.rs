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
use crate::api::{json_response, ApiResponse, Context};
use crate::node::NodeEngine;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetBalanceResponse {
	balance_sat: u64,
	fee_credit_sat: u64,
}

pub(crate) async fn handle_get_balance(context: &Context) -> Result<ApiResponse, ApiError> {
	let balance_sat = context.engine.channels().iter().map(|c| c.balance_sat).sum();
	json_response(&GetBalanceResponse {
		balance_sat,
		fee_credit_sat: context.engine.fee_credit_msat() / 1_000,
	})
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::test_context;
	use crate::node::mock::MockEngine;

	#[tokio::test]
	async fn balance_sums_channels_and_reports_fee_credit() {
		let engine = Arc::new(MockEngine::new());
		engine.set_channels(vec![
			MockEngine::test_channel(30_000),
			MockEngine::test_channel(12_000),
		]);
		engine.set_fee_credit_msat(100_000);
		let context = test_context(engine);

		let response = handle_get_balance(&context).await.unwrap();
		let body = crate::api::test_util::body_json(response).await;
		assert_eq!(body["balanceSat"], 42_000);
		assert_eq!(body["feeCreditSat"], 100);
	}
}
