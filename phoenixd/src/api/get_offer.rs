// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::api::error::ApiError;
use crate::api::{text_response, ApiResponse, Context};
use crate::node::NodeEngine;

/// The node's reusable BOLT12 offer, as bare text for easy copy-paste.
pub(crate) async fn handle_get_offer(context: &Context) -> Result<ApiResponse, ApiError> {
	let offer = context.engine.default_offer().map_err(|e| ApiError::Internal(e.to_string()))?;
	Ok(text_response(offer.serialized))
}

pub(crate) async fn handle_get_lnaddress(context: &Context) -> Result<ApiResponse, ApiError> {
	match &context.lnaddress_domain {
		Some(domain) => {
			let user = &context.engine.node_id().to_hex()[..8];
			Ok(text_response(format!("₿{}@{}", user, domain)))
		},
		None => Ok(text_response("no lightning address is configured for this node")),
	}
}
