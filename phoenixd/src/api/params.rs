// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Typed request parameters. Every getter names the parameter and the
//! expected type in its error, so operators see exactly what to fix.

use std::collections::HashMap;
use std::str::FromStr;

use crate::api::error::ApiError;
use crate::types::{ChannelId, PaymentHash, PaymentId};

pub(crate) struct Params {
	values: HashMap<String, String>,
}

impl Params {
	/// Parses a form-encoded request body.
	pub(crate) fn from_form(body: &[u8]) -> Result<Self, ApiError> {
		let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
			.map_err(|_| ApiError::BadRequest("malformed form body".to_string()))?;
		Ok(Self { values: pairs.into_iter().collect() })
	}

	/// Parses a URI query string; an absent query is an empty set.
	pub(crate) fn from_query(query: Option<&str>) -> Self {
		let pairs: Vec<(String, String)> =
			serde_urlencoded::from_str(query.unwrap_or_default()).unwrap_or_default();
		Self { values: pairs.into_iter().collect() }
	}

	#[cfg(test)]
	pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
		Self {
			values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
		}
	}

	pub(crate) fn opt_string(&self, name: &'static str) -> Option<String> {
		self.values.get(name).filter(|v| !v.is_empty()).cloned()
	}

	pub(crate) fn string(&self, name: &'static str) -> Result<String, ApiError> {
		self.opt_string(name).ok_or(ApiError::MissingParameter(name))
	}

	fn opt_parsed<T: FromStr>(
		&self, name: &'static str, expected: &'static str,
	) -> Result<Option<T>, ApiError> {
		match self.values.get(name).filter(|v| !v.is_empty()) {
			None => Ok(None),
			Some(raw) => raw
				.parse()
				.map(Some)
				.map_err(|_| ApiError::InvalidParameter { name, expected }),
		}
	}

	/// Satoshi amount: a non-negative integer.
	pub(crate) fn opt_amount_sat(&self, name: &'static str) -> Result<Option<u64>, ApiError> {
		self.opt_parsed(name, "non-negative integer (satoshis)")
	}

	pub(crate) fn amount_sat(&self, name: &'static str) -> Result<u64, ApiError> {
		self.opt_amount_sat(name)?.ok_or(ApiError::MissingParameter(name))
	}

	pub(crate) fn opt_u64(&self, name: &'static str) -> Result<Option<u64>, ApiError> {
		self.opt_parsed(name, "non-negative integer")
	}

	pub(crate) fn opt_i64(&self, name: &'static str) -> Result<Option<i64>, ApiError> {
		self.opt_parsed(name, "integer")
	}

	pub(crate) fn opt_bool(&self, name: &'static str) -> Result<Option<bool>, ApiError> {
		self.opt_parsed(name, "boolean")
	}

	pub(crate) fn payment_hash(&self, name: &'static str) -> Result<PaymentHash, ApiError> {
		self.string(name)?
			.parse()
			.map_err(|_| ApiError::InvalidParameter { name, expected: "32-byte hex hash" })
	}

	pub(crate) fn payment_id(&self, name: &'static str) -> Result<PaymentId, ApiError> {
		self.string(name)?
			.parse()
			.map_err(|_| ApiError::InvalidParameter { name, expected: "uuid" })
	}

	pub(crate) fn channel_id(&self, name: &'static str) -> Result<ChannelId, ApiError> {
		self.string(name)?
			.parse()
			.map_err(|_| ApiError::InvalidParameter { name, expected: "32-byte hex channel id" })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn form_bodies_parse_and_decode() {
		let params = Params::from_form(b"description=two%20coffees&amountSat=21000").unwrap();
		assert_eq!(params.string("description").unwrap(), "two coffees");
		assert_eq!(params.amount_sat("amountSat").unwrap(), 21_000);
	}

	#[test]
	fn missing_and_invalid_are_distinguished() {
		let params = Params::from_pairs(&[("amountSat", "ten"), ("empty", "")]);
		assert!(matches!(
			params.amount_sat("amountSat"),
			Err(ApiError::InvalidParameter { name: "amountSat", .. })
		));
		assert!(matches!(
			params.amount_sat("missing"),
			Err(ApiError::MissingParameter("missing"))
		));
		// An empty value counts as absent.
		assert!(matches!(params.string("empty"), Err(ApiError::MissingParameter("empty"))));
	}

	#[test]
	fn negative_amounts_are_invalid() {
		let params = Params::from_pairs(&[("amountSat", "-5")]);
		assert!(params.amount_sat("amountSat").is_err());
	}

	#[test]
	fn query_strings_parse() {
		let params = Params::from_query(Some("limit=5&all=true&externalId=inv-1"));
		assert_eq!(params.opt_u64("limit").unwrap(), Some(5));
		assert_eq!(params.opt_bool("all").unwrap(), Some(true));
		assert_eq!(params.opt_string("externalId").as_deref(), Some("inv-1"));
		let empty = Params::from_query(None);
		assert_eq!(empty.opt_u64("limit").unwrap(), None);
	}

	#[test]
	fn identifiers_parse() {
		let params = Params::from_pairs(&[
			("paymentHash", "0101010101010101010101010101010101010101010101010101010101010101"),
			("paymentId", "67e55044-10b1-426f-9247-bb680e5fe0c8"),
		]);
		assert!(params.payment_hash("paymentHash").is_ok());
		assert!(params.payment_id("paymentId").is_ok());
		let bad = Params::from_pairs(&[("paymentHash", "zz")]);
		assert!(bad.payment_hash("paymentHash").is_err());
	}
}
