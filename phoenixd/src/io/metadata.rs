// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Operator-supplied metadata attached to payments: an external correlation
//! id and a per-payment webhook URL. Keyed by `(payment_type, native key)`.

use rusqlite::{params, OptionalExtension};

use crate::io::model::{PaymentMetadata, PaymentType};
use crate::io::{DbError, PaymentsDb};

impl PaymentsDb {
	pub(crate) fn insert_metadata(
		&self, payment_type: PaymentType, payment_id: &str, external_id: Option<&str>,
		webhook_url: Option<&str>, created_at: i64,
	) -> Result<(), DbError> {
		self.conn().execute(
			"INSERT INTO payments_metadata (payment_type, payment_id, external_id, webhook_url, created_at) \
			 VALUES (?1, ?2, ?3, ?4, ?5)",
			params![payment_type.to_db(), payment_id, external_id, webhook_url, created_at],
		)?;
		Ok(())
	}

	pub(crate) fn get_metadata(
		&self, payment_type: PaymentType, payment_id: &str,
	) -> Result<Option<PaymentMetadata>, DbError> {
		Ok(self
			.conn()
			.query_row(
				"SELECT external_id, webhook_url FROM payments_metadata \
				 WHERE payment_type = ?1 AND payment_id = ?2",
				params![payment_type.to_db(), payment_id],
				|row| {
					Ok(PaymentMetadata { external_id: row.get(0)?, webhook_url: row.get(1)? })
				},
			)
			.optional()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Preimage;

	#[test]
	fn metadata_round_trip() {
		let db = PaymentsDb::open_in_memory().unwrap();
		let hash = Preimage([1; 32]).payment_hash();
		db.insert_metadata(
			PaymentType::Incoming,
			&hash.to_hex(),
			Some("order-42"),
			Some("https://shop.example/hook"),
			1_000,
		)
		.unwrap();

		let metadata = db.get_metadata(PaymentType::Incoming, &hash.to_hex()).unwrap().unwrap();
		assert_eq!(metadata.external_id.as_deref(), Some("order-42"));
		assert_eq!(metadata.webhook_url.as_deref(), Some("https://shop.example/hook"));

		// The same key under another payment type is a different row.
		assert!(db.get_metadata(PaymentType::LightningOutgoing, &hash.to_hex()).unwrap().is_none());
	}

	#[test]
	fn duplicate_metadata_insert_fails() {
		let db = PaymentsDb::open_in_memory().unwrap();
		db.insert_metadata(PaymentType::Incoming, "abc", None, None, 1).unwrap();
		assert!(db.insert_metadata(PaymentType::Incoming, "abc", Some("x"), None, 2).is_err());
	}
}
