// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! LNURL and Lightning-address resolution.
//!
//! An LNURL is either a bech32-wrapped URL (`lnurl1...`) or a plain https
//! URL; a Lightning address `user@domain` resolves through the domain's
//! `/.well-known/lnurlp/` endpoint. The signing of auth challenges is the
//! engine's concern; this module only moves HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::types::NodeId;

#[derive(Debug, Error)]
pub(crate) enum ResolverError {
	#[error("invalid lnurl: {0}")]
	InvalidLnurl(String),
	#[error("invalid lightning address: {0}")]
	InvalidAddress(String),
	#[error("unexpected response from {0}: {1}")]
	UnexpectedResponse(String, String),
	#[error("remote error: {0}")]
	Remote(String),
	#[error(transparent)]
	Http(#[from] reqwest::Error),
}

/// What a Lightning address resolves to.
#[derive(Clone, Debug)]
pub(crate) enum ResolvedDestination {
	Bolt11(String),
	Bolt12(String),
}

#[derive(Clone, Debug)]
pub(crate) struct LnurlAuth {
	pub url: String,
	pub domain: String,
	pub k1: String,
}

#[derive(Clone, Debug)]
pub(crate) struct LnurlPay {
	pub callback: String,
	pub domain: String,
	pub min_sendable_msat: u64,
	pub max_sendable_msat: u64,
	pub metadata: String,
	pub comment_allowed: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct LnurlWithdraw {
	pub callback: String,
	pub domain: String,
	pub k1: String,
	pub min_withdrawable_msat: u64,
	pub max_withdrawable_msat: u64,
	pub default_description: String,
}

#[derive(Clone, Debug)]
pub(crate) enum Lnurl {
	Auth(LnurlAuth),
	Pay(LnurlPay),
	Withdraw(LnurlWithdraw),
}

impl Lnurl {
	pub(crate) fn tag(&self) -> &'static str {
		match self {
			Lnurl::Auth(_) => "login",
			Lnurl::Pay(_) => "payRequest",
			Lnurl::Withdraw(_) => "withdrawRequest",
		}
	}
}

/// Turns operator-supplied LNURL text into the URL to fetch. Accepts the
/// bech32 form, a plain http(s) URL, and an optional `lightning:` prefix.
pub(crate) fn decode_lnurl(input: &str) -> Result<Url, ResolverError> {
	let trimmed = input.trim();
	let trimmed = trimmed.strip_prefix("lightning:").unwrap_or(trimmed);
	let lowered = trimmed.to_ascii_lowercase();

	let url = if lowered.starts_with("lnurl1") {
		let (hrp, bytes) = bech32::decode(&lowered)
			.map_err(|e| ResolverError::InvalidLnurl(format!("{}: {}", input, e)))?;
		if hrp.as_str() != "lnurl" {
			return Err(ResolverError::InvalidLnurl(format!("wrong prefix: {}", hrp)));
		}
		String::from_utf8(bytes)
			.map_err(|_| ResolverError::InvalidLnurl(format!("not utf8: {}", input)))?
	} else if lowered.starts_with("http://") || lowered.starts_with("https://") {
		trimmed.to_string()
	} else {
		return Err(ResolverError::InvalidLnurl(input.to_string()));
	};

	Url::parse(&url).map_err(|e| ResolverError::InvalidLnurl(format!("{}: {}", url, e)))
}

#[async_trait]
pub(crate) trait AddressResolver: Send + Sync {
	/// Resolves `user@domain` into something payable, requesting an invoice
	/// for `amount_msat` when the endpoint is LNURL-pay.
	async fn resolve_address(
		&self, user: &str, domain: &str, amount_msat: u64, note: Option<&str>,
	) -> Result<ResolvedDestination, ResolverError>;

	/// Fetches (or for auth, inspects) an LNURL and classifies it.
	async fn execute_lnurl(&self, input: &str) -> Result<Lnurl, ResolverError>;

	async fn get_lnurl_pay_invoice(
		&self, pay: &LnurlPay, amount_msat: u64, comment: Option<&str>,
	) -> Result<String, ResolverError>;

	async fn send_withdraw_invoice(
		&self, withdraw: &LnurlWithdraw, invoice: &str,
	) -> Result<(), ResolverError>;

	async fn send_auth(
		&self, auth: &LnurlAuth, key: &NodeId, signature: &str,
	) -> Result<(), ResolverError>;
}

pub(crate) struct HttpResolver {
	client: reqwest::Client,
}

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct PayResponse {
	callback: String,
	#[serde(rename = "minSendable")]
	min_sendable: u64,
	#[serde(rename = "maxSendable")]
	max_sendable: u64,
	#[serde(default)]
	metadata: String,
	#[serde(rename = "commentAllowed", default)]
	comment_allowed: u64,
}

#[derive(Deserialize)]
struct WithdrawResponse {
	callback: String,
	k1: String,
	#[serde(rename = "minWithdrawable")]
	min_withdrawable: u64,
	#[serde(rename = "maxWithdrawable")]
	max_withdrawable: u64,
	#[serde(rename = "defaultDescription", default)]
	default_description: String,
}

#[derive(Deserialize)]
struct PayInvoiceResponse {
	pr: String,
}

impl HttpResolver {
	pub(crate) fn new() -> Self {
		let client = reqwest::Client::builder()
			.timeout(RESOLVE_TIMEOUT)
			.build()
			.expect("resolver client always builds");
		Self { client }
	}

	async fn fetch_json(&self, url: Url) -> Result<serde_json::Value, ResolverError> {
		let body: serde_json::Value =
			self.client.get(url.clone()).send().await?.error_for_status()?.json().await?;
		if body.get("status").and_then(|s| s.as_str()) == Some("ERROR") {
			let reason = body
				.get("reason")
				.and_then(|r| r.as_str())
				.unwrap_or("no reason given")
				.to_string();
			return Err(ResolverError::Remote(reason));
		}
		Ok(body)
	}

	fn classify(&self, url: &Url, body: serde_json::Value) -> Result<Lnurl, ResolverError> {
		let domain = url.host_str().unwrap_or_default().to_string();
		let tag = body.get("tag").and_then(|t| t.as_str()).unwrap_or_default().to_string();
		match tag.as_str() {
			"payRequest" => {
				let pay: PayResponse = serde_json::from_value(body).map_err(|e| {
					ResolverError::UnexpectedResponse(domain.clone(), e.to_string())
				})?;
				Ok(Lnurl::Pay(LnurlPay {
					callback: pay.callback,
					domain,
					min_sendable_msat: pay.min_sendable,
					max_sendable_msat: pay.max_sendable,
					metadata: pay.metadata,
					comment_allowed: pay.comment_allowed,
				}))
			},
			"withdrawRequest" => {
				let withdraw: WithdrawResponse = serde_json::from_value(body).map_err(|e| {
					ResolverError::UnexpectedResponse(domain.clone(), e.to_string())
				})?;
				Ok(Lnurl::Withdraw(LnurlWithdraw {
					callback: withdraw.callback,
					domain,
					k1: withdraw.k1,
					min_withdrawable_msat: withdraw.min_withdrawable,
					max_withdrawable_msat: withdraw.max_withdrawable,
					default_description: withdraw.default_description,
				}))
			},
			other => Err(ResolverError::UnexpectedResponse(
				domain,
				format!("unsupported tag: {}", other),
			)),
		}
	}
}

#[async_trait]
impl AddressResolver for HttpResolver {
	async fn resolve_address(
		&self, user: &str, domain: &str, amount_msat: u64, note: Option<&str>,
	) -> Result<ResolvedDestination, ResolverError> {
		if user.is_empty() || domain.is_empty() || !domain.contains('.') {
			return Err(ResolverError::InvalidAddress(format!("{}@{}", user, domain)));
		}
		let url = Url::parse(&format!("https://{}/.well-known/lnurlp/{}", domain, user))
			.map_err(|_| ResolverError::InvalidAddress(format!("{}@{}", user, domain)))?;
		let body = self.fetch_json(url.clone()).await?;
		match self.classify(&url, body)? {
			Lnurl::Pay(pay) => {
				let invoice = self.get_lnurl_pay_invoice(&pay, amount_msat, note).await?;
				Ok(ResolvedDestination::Bolt11(invoice))
			},
			other => Err(ResolverError::UnexpectedResponse(
				domain.to_string(),
				format!("expected payRequest, got {}", other.tag()),
			)),
		}
	}

	async fn execute_lnurl(&self, input: &str) -> Result<Lnurl, ResolverError> {
		let url = decode_lnurl(input)?;
		// Auth challenges are recognized from the URL itself and must not be
		// fetched before the operator approves.
		let is_login =
			url.query_pairs().any(|(key, value)| key == "tag" && value == "login");
		if is_login {
			let k1 = url
				.query_pairs()
				.find(|(key, _)| key == "k1")
				.map(|(_, value)| value.into_owned())
				.ok_or_else(|| ResolverError::InvalidLnurl("login without k1".to_string()))?;
			return Ok(Lnurl::Auth(LnurlAuth {
				url: url.to_string(),
				domain: url.host_str().unwrap_or_default().to_string(),
				k1,
			}));
		}
		let body = self.fetch_json(url.clone()).await?;
		self.classify(&url, body)
	}

	async fn get_lnurl_pay_invoice(
		&self, pay: &LnurlPay, amount_msat: u64, comment: Option<&str>,
	) -> Result<String, ResolverError> {
		if amount_msat < pay.min_sendable_msat || amount_msat > pay.max_sendable_msat {
			return Err(ResolverError::Remote(format!(
				"amount {} msat is outside the sendable range [{}, {}]",
				amount_msat, pay.min_sendable_msat, pay.max_sendable_msat
			)));
		}
		let mut url = Url::parse(&pay.callback)
			.map_err(|_| ResolverError::InvalidLnurl(pay.callback.clone()))?;
		url.query_pairs_mut().append_pair("amount", &amount_msat.to_string());
		// Services advertise the comment length they accept; zero means none.
		if let Some(comment) = comment.filter(|c| !c.is_empty() && pay.comment_allowed > 0) {
			let max = pay.comment_allowed as usize;
			let comment = if comment.len() > max { &comment[..max] } else { comment };
			url.query_pairs_mut().append_pair("comment", comment);
		}
		let body = self.fetch_json(url).await?;
		let response: PayInvoiceResponse = serde_json::from_value(body)
			.map_err(|e| ResolverError::UnexpectedResponse(pay.domain.clone(), e.to_string()))?;
		Ok(response.pr)
	}

	async fn send_withdraw_invoice(
		&self, withdraw: &LnurlWithdraw, invoice: &str,
	) -> Result<(), ResolverError> {
		let mut url = Url::parse(&withdraw.callback)
			.map_err(|_| ResolverError::InvalidLnurl(withdraw.callback.clone()))?;
		url.query_pairs_mut().append_pair("k1", &withdraw.k1).append_pair("pr", invoice);
		self.fetch_json(url).await?;
		Ok(())
	}

	async fn send_auth(
		&self, auth: &LnurlAuth, key: &NodeId, signature: &str,
	) -> Result<(), ResolverError> {
		let mut url =
			Url::parse(&auth.url).map_err(|_| ResolverError::InvalidLnurl(auth.url.clone()))?;
		url.query_pairs_mut().append_pair("sig", signature).append_pair("key", &key.to_hex());
		self.fetch_json(url).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_bech32_lnurl() {
		// bech32("lnurl", "https://service.com/api?q=3fc3645b439ce8e7f2553a69e5267081d96dcd340693afabe04be7b0ccd178df")
		let input = "LNURL1DP68GURN8GHJ7UM9WFMXJCM99E3K7MF0V9CXJ0M385EKVCENXC6R2C35XVUKXEFCV5MKVV34X5EKZD3EV56NYD3HXQURZEPEXEJXXEPNXSCRVWFNV9NXZCN9XQ6XYEFHVGCXXCMYXYMNSERXFQ5FNS";
		let url = decode_lnurl(input).unwrap();
		assert_eq!(url.host_str(), Some("service.com"));
		assert_eq!(url.path(), "/api");
	}

	#[test]
	fn decodes_plain_and_prefixed_urls() {
		let url = decode_lnurl("https://service.com/lnurlp/alice").unwrap();
		assert_eq!(url.host_str(), Some("service.com"));
		let url = decode_lnurl("lightning:https://service.com/withdraw?k1=abc").unwrap();
		assert_eq!(url.path(), "/withdraw");
		assert!(decode_lnurl("not-an-lnurl").is_err());
	}

	#[tokio::test]
	async fn login_lnurls_are_classified_without_fetching() {
		let resolver = HttpResolver::new();
		let lnurl = resolver
			.execute_lnurl("https://service.com/auth?tag=login&k1=0000000000000000000000000000000000000000000000000000000000000000")
			.await
			.unwrap();
		match lnurl {
			Lnurl::Auth(auth) => {
				assert_eq!(auth.domain, "service.com");
				assert_eq!(auth.k1.len(), 64);
			},
			other => panic!("expected auth, got {}", other.tag()),
		}
	}

	#[tokio::test]
	async fn malformed_addresses_are_rejected_early() {
		let resolver = HttpResolver::new();
		assert!(matches!(
			resolver.resolve_address("", "acinq.co", 1_000, None).await,
			Err(ResolverError::InvalidAddress(_))
		));
		assert!(matches!(
			resolver.resolve_address("alice", "localhost-no-dot", 1_000, None).await,
			Err(ResolverError::InvalidAddress(_))
		));
	}

	#[test]
	fn pay_amount_bounds_are_enforced() {
		let pay = LnurlPay {
			callback: "https://service.com/cb".to_string(),
			domain: "service.com".to_string(),
			min_sendable_msat: 1_000,
			max_sendable_msat: 2_000,
			metadata: String::new(),
			comment_allowed: 0,
		};
		let resolver = HttpResolver::new();
		let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		let result = runtime.block_on(resolver.get_lnurl_pay_invoice(&pay, 5_000, None));
		assert!(matches!(result, Err(ResolverError::Remote(_))));
	}
}
