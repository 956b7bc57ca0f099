// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::path::PathBuf;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::Response;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::events::{ApiEvent, EventsBus};
use crate::io::PaymentsDb;
use crate::node::fees::FeeOracle;
use crate::node::resolver::AddressResolver;
use crate::node::{NodeEngine, PaySuccess};
use crate::types::{Chain, PaymentHash, PaymentId, Preimage};
use crate::util::Shutdown;

pub(crate) mod adapter;
pub(crate) mod create_invoice;
pub(crate) mod decode;
pub(crate) mod error;
pub(crate) mod export;
pub(crate) mod get_balance;
pub(crate) mod get_info;
pub(crate) mod get_offer;
pub(crate) mod lnurl;
pub(crate) mod onchain;
pub(crate) mod params;
pub(crate) mod pay_invoice;
pub(crate) mod pay_lnaddress;
pub(crate) mod pay_offer;
pub(crate) mod payments;
pub(crate) mod websocket;

/// Everything a request handler can reach.
#[derive(Clone)]
pub(crate) struct Context {
	pub engine: Arc<dyn NodeEngine>,
	pub db: Arc<PaymentsDb>,
	pub resolver: Arc<dyn AddressResolver>,
	pub fee_oracle: Arc<dyn FeeOracle>,
	pub bus: EventsBus<ApiEvent>,
	pub chain: Chain,
	pub data_dir: PathBuf,
	pub lnaddress_domain: Option<String>,
	pub shutdown: Shutdown,
}

pub(crate) type ApiResponse = Response<Full<Bytes>>;

pub(crate) fn json_response<T: Serialize>(value: &T) -> Result<ApiResponse, ApiError> {
	let body = serde_json::to_vec(value).map_err(|e| ApiError::Internal(e.to_string()))?;
	Ok(Response::builder()
		.header(CONTENT_TYPE, "application/json")
		.body(Full::new(Bytes::from(body)))
		// unwrap safety: body only errors when previous chained calls failed.
		.unwrap())
}

/// Plain-text 200 used for policy-level outcomes the operator should read.
pub(crate) fn text_response(message: impl Into<String>) -> ApiResponse {
	Response::builder()
		.header(CONTENT_TYPE, "text/plain; charset=utf-8")
		.body(Full::new(Bytes::from(message.into())))
		// unwrap safety: body only errors when previous chained calls failed.
		.unwrap()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentSent {
	pub recipient_amount_sat: u64,
	pub routing_fee_sat: u64,
	pub payment_id: PaymentId,
	pub payment_hash: PaymentHash,
	pub preimage: Preimage,
}

impl From<&PaySuccess> for PaymentSent {
	fn from(success: &PaySuccess) -> Self {
		Self {
			recipient_amount_sat: success.recipient_amount_msat / 1_000,
			routing_fee_sat: success.routing_fee_msat / 1_000,
			payment_id: success.payment_id,
			payment_hash: success.payment_hash,
			preimage: success.preimage,
		}
	}
}

#[cfg(test)]
pub(crate) mod test_util {
	use std::sync::Arc;

	use http_body_util::BodyExt;

	use super::*;
	use crate::node::fees::MempoolSpaceClient;
	use crate::node::mock::MockEngine;
	use crate::node::resolver::HttpResolver;

	pub(crate) fn test_context(engine: Arc<MockEngine>) -> Context {
		Context {
			engine,
			db: Arc::new(PaymentsDb::open_in_memory().unwrap()),
			resolver: Arc::new(HttpResolver::new()),
			fee_oracle: Arc::new(MempoolSpaceClient::new("http://127.0.0.1:0".to_string())),
			bus: EventsBus::new(),
			chain: Chain::Regtest,
			data_dir: std::env::temp_dir().join("phoenixd-test"),
			lnaddress_domain: None,
			shutdown: Shutdown::new(),
		}
	}

	pub(crate) async fn body_json(response: ApiResponse) -> serde_json::Value {
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		serde_json::from_slice(&bytes).unwrap()
	}

	pub(crate) async fn body_text(response: ApiResponse) -> String {
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		String::from_utf8(bytes.to_vec()).unwrap()
	}
}
