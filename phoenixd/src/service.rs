// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The HTTP control surface: basic-auth gatekeeping, routing, parameter
//! plumbing. Two tiers: the limited password reads, the full password also
//! moves funds.

use std::future::Future;
use std::pin::Pin;

use base64::Engine;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, SEC_WEBSOCKET_PROTOCOL};
use hyper::service::Service;
use hyper::{Method, Request, Response};

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{
	create_invoice, decode, export, get_balance, get_info, get_offer, lnurl, onchain,
	pay_invoice, pay_lnaddress, pay_offer, payments, websocket, ApiResponse, Context,
};

const MAX_BODY_BYTES: usize = 65_536;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Access {
	Read,
	Full,
}

/// Required tier per route. Read-tier routes accept either password.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Tier {
	Read,
	Full,
}

pub(crate) struct Auth {
	full_password: String,
	limited_password: Option<String>,
}

impl Auth {
	pub(crate) fn new(full_password: String, limited_password: Option<String>) -> Self {
		Self { full_password, limited_password }
	}

	fn check_password(&self, password: &str) -> Option<Access> {
		if password == self.full_password {
			Some(Access::Full)
		} else if self.limited_password.as_deref() == Some(password) {
			Some(Access::Read)
		} else {
			None
		}
	}

	/// HTTP Basic, with the password also accepted through the WebSocket
	/// subprotocol header for clients that cannot set `Authorization`.
	pub(crate) fn authenticate(&self, headers: &HeaderMap) -> Result<Access, ApiError> {
		if let Some(value) = headers.get(AUTHORIZATION) {
			let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
			let encoded = value.strip_prefix("Basic ").ok_or(ApiError::Unauthorized)?;
			let decoded = base64::engine::general_purpose::STANDARD
				.decode(encoded)
				.map_err(|_| ApiError::Unauthorized)?;
			let decoded = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;
			let password = decoded.split_once(':').map(|(_, p)| p).unwrap_or(&decoded);
			return self.check_password(password).ok_or(ApiError::Unauthorized);
		}
		if let Some(value) = headers.get(SEC_WEBSOCKET_PROTOCOL) {
			let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
			// The header carries a list; any entry may be the password.
			for candidate in value.split(',').map(str::trim) {
				if let Some(access) = self.check_password(candidate) {
					return Ok(access);
				}
			}
		}
		Err(ApiError::Unauthorized)
	}
}

fn require(access: Access, tier: Tier) -> Result<(), ApiError> {
	match (access, tier) {
		(Access::Full, _) | (Access::Read, Tier::Read) => Ok(()),
		(Access::Read, Tier::Full) => Err(ApiError::Unauthorized),
	}
}

fn expect_method(method: &Method, expected: Method) -> Result<(), ApiError> {
	if *method == expected {
		Ok(())
	} else {
		Err(ApiError::MethodNotAllowed)
	}
}

async fn read_form(request: Request<Incoming>) -> Result<Params, ApiError> {
	let body = request
		.into_body()
		.collect()
		.await
		.map_err(|_| ApiError::BadRequest("failed to read request body".to_string()))?
		.to_bytes();
	if body.len() > MAX_BODY_BYTES {
		return Err(ApiError::BadRequest("request body too large".to_string()));
	}
	Params::from_form(&body)
}

fn error_response(error: ApiError) -> ApiResponse {
	Response::builder()
		.status(error.status())
		.header(CONTENT_TYPE, "text/plain; charset=utf-8")
		.body(Full::new(Bytes::from(error.message())))
		// unwrap safety: body only errors when previous chained calls failed.
		.unwrap()
}

#[derive(Clone)]
pub(crate) struct ApiService {
	context: Context,
	auth: std::sync::Arc<Auth>,
}

impl ApiService {
	pub(crate) fn new(context: Context, auth: std::sync::Arc<Auth>) -> Self {
		Self { context, auth }
	}

	async fn route(&self, request: Request<Incoming>) -> Result<ApiResponse, ApiError> {
		let access = self.auth.authenticate(request.headers())?;
		let method = request.method().clone();
		let path = request.uri().path().to_string();
		let query = Params::from_query(request.uri().query());
		let ctx = &self.context;

		if path == "/websocket" {
			expect_method(&method, Method::GET)?;
			require(access, Tier::Read)?;
			if !websocket::is_websocket_upgrade(&request) {
				return Err(ApiError::BadRequest("expected a websocket upgrade".to_string()));
			}
			return websocket::handle_websocket(ctx, request);
		}

		match path.as_str() {
			"/getinfo" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				get_info::handle_get_info(ctx).await
			},
			"/getbalance" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				get_balance::handle_get_balance(ctx).await
			},
			"/listchannels" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				get_info::handle_list_channels(ctx).await
			},
			"/getoffer" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				get_offer::handle_get_offer(ctx).await
			},
			"/getlnaddress" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				get_offer::handle_get_lnaddress(ctx).await
			},
			"/createinvoice" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Read)?;
				let form = read_form(request).await?;
				create_invoice::handle_create_invoice(ctx, &form).await
			},
			"/decodeinvoice" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Read)?;
				let form = read_form(request).await?;
				decode::handle_decode_invoice(ctx, &form).await
			},
			"/decodeoffer" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Read)?;
				let form = read_form(request).await?;
				decode::handle_decode_offer(ctx, &form).await
			},
			"/payinvoice" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				pay_invoice::handle_pay_invoice(ctx, &form).await
			},
			"/payoffer" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				pay_offer::handle_pay_offer(ctx, &form).await
			},
			"/paylnaddress" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				pay_lnaddress::handle_pay_lnaddress(ctx, &form).await
			},
			"/lnurlpay" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				lnurl::handle_lnurl_pay(ctx, &form).await
			},
			"/lnurlwithdraw" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Read)?;
				let form = read_form(request).await?;
				lnurl::handle_lnurl_withdraw(ctx, &form).await
			},
			"/lnurlauth" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				lnurl::handle_lnurl_auth(ctx, &form).await
			},
			"/sendtoaddress" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				onchain::handle_send_to_address(ctx, &form).await
			},
			"/bumpfee" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				onchain::handle_bump_fee(ctx, &form).await
			},
			"/closechannel" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Full)?;
				let form = read_form(request).await?;
				onchain::handle_close_channel(ctx, &form).await
			},
			"/export" => {
				expect_method(&method, Method::POST)?;
				require(access, Tier::Read)?;
				let form = read_form(request).await?;
				export::handle_export(ctx, &form).await
			},
			"/payments/incoming" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				payments::handle_list_incoming(ctx, &query).await
			},
			"/payments/outgoing" => {
				expect_method(&method, Method::GET)?;
				require(access, Tier::Read)?;
				payments::handle_list_outgoing(ctx, &query).await
			},
			path => {
				if let Some(hash) = path.strip_prefix("/payments/incoming/") {
					expect_method(&method, Method::GET)?;
					require(access, Tier::Read)?;
					return payments::handle_get_incoming(ctx, hash).await;
				}
				if let Some(hash) = path.strip_prefix("/payments/outgoingbyhash/") {
					expect_method(&method, Method::GET)?;
					require(access, Tier::Read)?;
					return payments::handle_list_outgoing_by_hash(ctx, hash).await;
				}
				if let Some(id) = path.strip_prefix("/payments/outgoing/") {
					expect_method(&method, Method::GET)?;
					require(access, Tier::Read)?;
					return payments::handle_get_outgoing(ctx, id).await;
				}
				Err(ApiError::NotFound)
			},
		}
	}
}

impl Service<Request<Incoming>> for ApiService {
	type Response = Response<Full<Bytes>>;
	type Error = hyper::Error;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn call(&self, request: Request<Incoming>) -> Self::Future {
		let service = self.clone();
		Box::pin(async move {
			Ok(service.route(request).await.unwrap_or_else(error_response))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn auth() -> Auth {
		Auth::new("hunter2".to_string(), Some("reader".to_string()))
	}

	fn basic(password: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		let token =
			base64::engine::general_purpose::STANDARD.encode(format!("phoenix:{}", password));
		headers.insert(AUTHORIZATION, format!("Basic {}", token).parse().unwrap());
		headers
	}

	#[test]
	fn passwords_map_to_tiers() {
		let auth = auth();
		assert_eq!(auth.authenticate(&basic("hunter2")).unwrap(), Access::Full);
		assert_eq!(auth.authenticate(&basic("reader")).unwrap(), Access::Read);
		assert!(matches!(auth.authenticate(&basic("wrong")), Err(ApiError::Unauthorized)));
		assert!(matches!(auth.authenticate(&HeaderMap::new()), Err(ApiError::Unauthorized)));
	}

	#[test]
	fn websocket_protocol_header_is_an_alternate_channel() {
		let auth = auth();
		let mut headers = HeaderMap::new();
		headers.insert(SEC_WEBSOCKET_PROTOCOL, "reader".parse().unwrap());
		assert_eq!(auth.authenticate(&headers).unwrap(), Access::Read);

		let mut headers = HeaderMap::new();
		headers.insert(SEC_WEBSOCKET_PROTOCOL, "json, hunter2".parse().unwrap());
		assert_eq!(auth.authenticate(&headers).unwrap(), Access::Full);
	}

	#[test]
	fn read_tier_cannot_reach_full_routes() {
		assert!(require(Access::Read, Tier::Read).is_ok());
		assert!(require(Access::Full, Tier::Full).is_ok());
		assert!(matches!(require(Access::Read, Tier::Full), Err(ApiError::Unauthorized)));
	}

	#[test]
	fn malformed_basic_credentials_are_rejected() {
		let auth = auth();
		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, "Basic !!!not-base64!!!".parse().unwrap());
		assert!(matches!(auth.authenticate(&headers), Err(ApiError::Unauthorized)));

		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, "Bearer token".parse().unwrap());
		assert!(matches!(auth.authenticate(&headers), Err(ApiError::Unauthorized)));
	}
}
