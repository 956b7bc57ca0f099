// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! On-chain fee oracle, backed by a mempool.space-compatible HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Copy, Clone, Debug, Deserialize)]
pub(crate) struct RecommendedFees {
	#[serde(rename = "fastestFee")]
	pub fastest_sat_vb: u64,
	#[serde(rename = "halfHourFee")]
	pub half_hour_sat_vb: u64,
	#[serde(rename = "hourFee")]
	pub hour_sat_vb: u64,
	#[serde(rename = "economyFee")]
	pub economy_sat_vb: u64,
	#[serde(rename = "minimumFee")]
	pub minimum_sat_vb: u64,
}

#[async_trait]
pub(crate) trait FeeOracle: Send + Sync {
	async fn recommended_fees(&self) -> Result<RecommendedFees, String>;
}

pub(crate) struct MempoolSpaceClient {
	client: reqwest::Client,
	base_url: String,
}

impl MempoolSpaceClient {
	pub(crate) fn new(base_url: String) -> Self {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(15))
			.build()
			.expect("fee oracle client always builds");
		Self { client, base_url }
	}
}

#[async_trait]
impl FeeOracle for MempoolSpaceClient {
	async fn recommended_fees(&self) -> Result<RecommendedFees, String> {
		let url = format!("{}/api/v1/fees/recommended", self.base_url.trim_end_matches('/'));
		self.client
			.get(&url)
			.send()
			.await
			.and_then(|resp| resp.error_for_status())
			.map_err(|e| format!("fee oracle request failed: {}", e))?
			.json()
			.await
			.map_err(|e| format!("fee oracle returned malformed fees: {}", e))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recommended_fees_parse_the_mempool_space_shape() {
		let fees: RecommendedFees = serde_json::from_str(
			r#"{"fastestFee":31,"halfHourFee":25,"hourFee":18,"economyFee":12,"minimumFee":6}"#,
		)
		.unwrap();
		assert_eq!(fees.fastest_sat_vb, 31);
		assert_eq!(fees.half_hour_sat_vb, 25);
		assert_eq!(fees.hour_sat_vb, 18);
		assert_eq!(fees.economy_sat_vb, 12);
		assert_eq!(fees.minimum_sat_vb, 6);
	}
}
