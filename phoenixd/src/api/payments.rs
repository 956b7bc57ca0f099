// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Payment history endpoints, read straight from the payments database.

use crate::api::adapter::{incoming_to_view, outgoing_to_view};
use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{json_response, ApiResponse, Context};
use crate::io::incoming::ListFilter;
use crate::io::model::{IncomingPayment, PaymentType};
use crate::util::now_millis;

const DEFAULT_LIMIT: u32 = 20;

struct Window {
	from: i64,
	to: i64,
	limit: u32,
	offset: u32,
	all: bool,
}

fn window(params: &Params) -> Result<Window, ApiError> {
	Ok(Window {
		from: params.opt_i64("from")?.unwrap_or(0),
		to: params.opt_i64("to")?.unwrap_or_else(|| now_millis() + 1),
		limit: params.opt_u64("limit")?.unwrap_or(DEFAULT_LIMIT as u64) as u32,
		offset: params.opt_u64("offset")?.unwrap_or(0) as u32,
		all: params.opt_bool("all")?.unwrap_or(false),
	})
}

fn incoming_view_with_metadata(
	context: &Context, payment: &IncomingPayment,
) -> Result<crate::api::adapter::IncomingPaymentView, ApiError> {
	let metadata = context
		.db
		.get_metadata(PaymentType::Incoming, &payment.payment_hash.to_hex())?
		.unwrap_or_default();
	Ok(incoming_to_view(payment, metadata.external_id))
}

/// `all=false` (the default) lists received payments ordered by receipt;
/// `all=true` lists every known payment ordered by creation.
pub(crate) async fn handle_list_incoming(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let window = window(params)?;
	let external_id = params.opt_string("externalId");
	let filter = ListFilter {
		from: window.from,
		to: window.to,
		limit: window.limit,
		offset: window.offset,
		external_id: external_id.as_deref(),
	};
	let payments = if window.all {
		context.db.list_incoming_created_within(filter)?
	} else {
		context.db.list_incoming_received_within(filter)?
	};
	let views = payments
		.iter()
		.map(|payment| incoming_view_with_metadata(context, payment))
		.collect::<Result<Vec<_>, _>>()?;
	json_response(&views)
}

pub(crate) async fn handle_get_incoming(
	context: &Context, payment_hash: &str,
) -> Result<ApiResponse, ApiError> {
	let payment_hash = payment_hash
		.parse()
		.map_err(|_| ApiError::InvalidParameter { name: "paymentHash", expected: "32-byte hex hash" })?;
	match context.db.get_incoming(payment_hash)? {
		Some(payment) => json_response(&incoming_view_with_metadata(context, &payment)?),
		None => Err(ApiError::NotFound),
	}
}

/// `all=false` hides failed payments, matching what balances are built from.
pub(crate) async fn handle_list_outgoing(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let window = window(params)?;
	let payments = if window.all {
		context.db.list_outgoing_within(window.from, window.to, window.limit, window.offset)?
	} else {
		context.db.list_outgoing_successful_or_pending_within(
			window.from,
			window.to,
			window.limit,
			window.offset,
		)?
	};
	json_response(&payments.iter().map(outgoing_to_view).collect::<Vec<_>>())
}

/// An outgoing payment id may belong to a Lightning payment, a channel close
/// or a liquidity purchase; each kind has its own shape.
pub(crate) async fn handle_get_outgoing(
	context: &Context, payment_id: &str,
) -> Result<ApiResponse, ApiError> {
	let payment_id = payment_id
		.parse()
		.map_err(|_| ApiError::InvalidParameter { name: "paymentId", expected: "uuid" })?;
	if let Some(payment) = context.db.get_outgoing(payment_id)? {
		return json_response(&outgoing_to_view(&payment));
	}
	if let Some(payment) = context.db.get_channel_close(payment_id)? {
		return json_response(&crate::api::adapter::channel_close_to_view(&payment));
	}
	if let Some(payment) = context.db.get_inbound_liquidity(payment_id)? {
		return json_response(&crate::api::adapter::inbound_liquidity_to_view(&payment));
	}
	Err(ApiError::NotFound)
}

pub(crate) async fn handle_list_outgoing_by_hash(
	context: &Context, payment_hash: &str,
) -> Result<ApiResponse, ApiError> {
	let payment_hash = payment_hash
		.parse()
		.map_err(|_| ApiError::InvalidParameter { name: "paymentHash", expected: "32-byte hex hash" })?;
	let payments = context.db.list_outgoing_for_payment_hash(payment_hash)?;
	json_response(&payments.iter().map(outgoing_to_view).collect::<Vec<_>>())
}
