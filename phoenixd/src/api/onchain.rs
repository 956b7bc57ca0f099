// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Splice operations: send on-chain, CPFP fee bump, mutual close. Each
//! responds with the resulting transaction id on success and descriptive
//! text on failure; there is no partial success.

use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{json_response, text_response, ApiResponse, Context};
use crate::node::fees::FeeOracle;
use crate::node::{EngineError, NodeEngine};
use crate::types::Txid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpliceResponse {
	tx_id: Txid,
}

fn splice_outcome(result: Result<Txid, EngineError>) -> Result<ApiResponse, ApiError> {
	match result {
		Ok(tx_id) => json_response(&SpliceResponse { tx_id }),
		Err(EngineError::Internal(message)) => Err(ApiError::Internal(message)),
		Err(e) => Ok(text_response(format!("splice failed: {}", e))),
	}
}

pub(crate) async fn handle_send_to_address(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let address = params.string("address")?;
	let amount_sat = params.amount_sat("amountSat")?;
	let feerate_sat_vb = params.amount_sat("feerateSatByte")?;
	splice_outcome(context.engine.splice_out(&address, amount_sat, feerate_sat_vb).await)
}

pub(crate) async fn handle_bump_fee(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let feerate_sat_vb = match params.opt_amount_sat("feerateSatByte")? {
		Some(feerate) => feerate,
		// No explicit feerate: aim for next-block confirmation.
		None => match context.fee_oracle.recommended_fees().await {
			Ok(fees) => fees.fastest_sat_vb,
			Err(e) => return Ok(text_response(format!("splice failed: {}", e))),
		},
	};
	splice_outcome(context.engine.splice_cpfp(feerate_sat_vb).await)
}

pub(crate) async fn handle_close_channel(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let channel_id = params.channel_id("channelId")?;
	let address = params.string("address")?;
	let feerate_sat_vb = params.amount_sat("feerateSatByte")?;
	splice_outcome(context.engine.mutual_close(channel_id, &address, feerate_sat_vb).await)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::api::test_util::{body_json, body_text, test_context};
	use crate::node::mock::MockEngine;
	use crate::node::ConnectionState;

	#[tokio::test]
	async fn send_to_address_returns_the_funding_tx() {
		let engine = Arc::new(MockEngine::new());
		engine.set_channels(vec![MockEngine::test_channel(100_000)]);
		engine.set_connection_state(ConnectionState::Established);
		let context = test_context(engine);

		let params = Params::from_pairs(&[
			("address", "bc1qdest"),
			("amountSat", "20000"),
			("feerateSatByte", "12"),
		]);
		let body = body_json(handle_send_to_address(&context, &params).await.unwrap()).await;
		assert_eq!(body["txId"].as_str().unwrap().len(), 64);
	}

	#[tokio::test]
	async fn overspend_is_descriptive_text_not_an_error() {
		let engine = Arc::new(MockEngine::new());
		engine.set_connection_state(ConnectionState::Established);
		let context = test_context(engine);
		let params = Params::from_pairs(&[
			("address", "bc1qdest"),
			("amountSat", "20000"),
			("feerateSatByte", "12"),
		]);
		let text = body_text(handle_send_to_address(&context, &params).await.unwrap()).await;
		assert!(text.contains("splice failed"));
	}

	#[tokio::test]
	async fn splices_require_a_connected_peer() {
		let engine = Arc::new(MockEngine::new());
		engine.set_channels(vec![MockEngine::test_channel(100_000)]);
		let context = test_context(engine);
		let params = Params::from_pairs(&[
			("address", "bc1qdest"),
			("amountSat", "1000"),
			("feerateSatByte", "12"),
		]);
		let text = body_text(handle_send_to_address(&context, &params).await.unwrap()).await;
		assert!(text.contains("not connected"));
	}

	#[tokio::test]
	async fn close_channel_requires_a_known_channel() {
		let engine = Arc::new(MockEngine::new());
		let channel = MockEngine::test_channel(10_000);
		let channel_id = channel.channel_id;
		engine.set_channels(vec![channel]);
		engine.set_connection_state(ConnectionState::Established);
		let context = test_context(engine);

		let channel_id_hex = channel_id.to_hex();
		let params = Params::from_pairs(&[
			("channelId", channel_id_hex.as_str()),
			("address", "bc1qrest"),
			("feerateSatByte", "7"),
		]);
		let body = body_json(handle_close_channel(&context, &params).await.unwrap()).await;
		assert!(body["txId"].is_string());

		// Closing it again fails descriptively.
		let text = body_text(handle_close_channel(&context, &params).await.unwrap()).await;
		assert!(text.contains("splice failed"));
	}
}
