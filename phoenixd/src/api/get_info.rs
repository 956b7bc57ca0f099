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
use crate::node::{ChannelSnapshot, NodeEngine};
use crate::types::{Chain, NodeId};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetInfoResponse {
	node_id: NodeId,
	chain: Chain,
	version: &'static str,
	channels: Vec<ChannelSnapshot>,
}

pub(crate) async fn handle_get_info(context: &Context) -> Result<ApiResponse, ApiError> {
	json_response(&GetInfoResponse {
		node_id: context.engine.node_id(),
		chain: context.chain,
		version: env!("CARGO_PKG_VERSION"),
		channels: context.engine.channels(),
	})
}

pub(crate) async fn handle_list_channels(context: &Context) -> Result<ApiResponse, ApiError> {
	json_response(&context.engine.channels())
}
