// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Webhook dispatch. Every event is POSTed as JSON to the configured URLs
//! with an `X-Phoenix-Signature` header carrying the hex HMAC-SHA-256 of the
//! raw body. Best effort: failures are logged, never retried.

use std::time::Duration;

use hex::DisplayHex;
use hmac::{Hmac, Mac};
use log::{error, warn};
use sha2::Sha256;

use crate::events::ApiEvent;

pub(crate) const SIGNATURE_HEADER: &str = "X-Phoenix-Signature";

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Hex HMAC-SHA-256 of `body` keyed by `secret`, as carried in the
/// [`SIGNATURE_HEADER`] header.
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
	let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
		.expect("hmac accepts keys of any length");
	mac.update(body);
	mac.finalize().into_bytes().as_slice().to_lower_hex_string()
}

pub(crate) struct WebhookNotifier {
	client: reqwest::Client,
	urls: Vec<String>,
	secret: String,
}

impl WebhookNotifier {
	pub(crate) fn new(urls: Vec<String>, secret: String) -> Self {
		let client = reqwest::Client::builder()
			.timeout(DISPATCH_TIMEOUT)
			.build()
			.expect("webhook client always builds");
		Self { client, urls, secret }
	}

	pub(crate) fn has_targets(&self) -> bool {
		!self.urls.is_empty()
	}

	/// POSTs `event` to every global URL plus an optional per-payment URL.
	/// One failing receiver does not prevent delivery to the others.
	pub(crate) async fn dispatch(&self, event: &ApiEvent, extra_url: Option<&str>) {
		let body = match serde_json::to_vec(event) {
			Ok(body) => body,
			Err(e) => {
				error!("Failed to serialize webhook body: {}", e);
				return;
			},
		};
		let signature = sign(&self.secret, &body);
		for url in self.urls.iter().map(String::as_str).chain(extra_url) {
			let request = self
				.client
				.post(url)
				.header("Content-Type", "application/json")
				.header(SIGNATURE_HEADER, signature.clone())
				.body(body.clone());
			match request.send().await.and_then(|resp| resp.error_for_status()) {
				Ok(_) => {},
				Err(e) => warn!("Webhook delivery to {} failed: {}", url, e),
			}
		}
	}
}
