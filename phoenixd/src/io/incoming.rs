// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Incoming payment operations.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};

use crate::io::model::{IncomingOrigin, IncomingPayment, ReceivedWith};
use crate::io::{codec, raw_incoming, DbError, PaymentsDb, INCOMING_COLUMNS};
use crate::types::{PaymentHash, PaymentId, Preimage};

/// Window + pagination filter shared by the listing queries.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ListFilter<'a> {
	pub from: i64,
	pub to: i64,
	pub limit: u32,
	pub offset: u32,
	pub external_id: Option<&'a str>,
}

impl PaymentsDb {
	/// Inserts a fresh incoming payment. Fails if a row already exists for
	/// this payment hash.
	pub(crate) fn add_incoming(
		&self, preimage: Preimage, payment_hash: PaymentHash, origin: &IncomingOrigin,
		created_at: i64,
	) -> Result<PaymentId, DbError> {
		let id = PaymentId::random();
		let (origin_type, origin_blob) = codec::encode_incoming_origin(origin);
		self.conn().execute(
			"INSERT INTO payments_incoming (payment_hash, id, preimage, origin_type, origin_blob, created_at)
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
			params![&payment_hash.0[..], id.to_string(), &preimage.0[..], origin_type, origin_blob, created_at],
		)?;
		Ok(id)
	}

	/// Records a receipt. The supplied parts are unioned with any previously
	/// stored ones (deduplicated by natural key, first entry wins) and the
	/// first successful call establishes `received_at`.
	pub(crate) fn receive_payment(
		&self, payment_hash: PaymentHash, received_with: &[ReceivedWith], received_at: i64,
	) -> Result<(), DbError> {
		let mut conn = self.conn();
		let tx = conn.transaction()?;
		let payment = query_incoming(&tx, payment_hash)?
			.ok_or(DbError::IncomingPaymentNotFound(payment_hash))?;

		let (received_at, mut parts) = match payment.received {
			Some(received) => (received.received_at, received.received_with),
			None => (received_at, Vec::new()),
		};
		let mut seen: HashSet<_> =
			parts.iter().filter_map(|p| p.natural_key()).collect();
		for part in received_with {
			match part.natural_key() {
				Some(key) if !seen.insert(key.clone()) => {},
				_ => parts.push(part.clone()),
			}
		}

		let (tag, blob) = codec::encode_received_with(&parts);
		tx.execute(
			"UPDATE payments_incoming SET received_at = ?2, received_with_type = ?3, received_with_blob = ?4
			 WHERE payment_hash = ?1",
			params![&payment_hash.0[..], received_at, tag, blob],
		)?;
		tx.commit()?;
		Ok(())
	}

	/// Marks the funding parts (`NewChannel`/`SpliceIn`) locked and bumps
	/// `received_at` to `locked_at` so `received_at`-ordered listings surface
	/// the change. A missing or unreceived row is a no-op.
	pub(crate) fn set_locked(
		&self, payment_hash: PaymentHash, locked_at: i64,
	) -> Result<(), DbError> {
		self.update_funding_parts(payment_hash, |part| match part {
			ReceivedWith::NewChannel { locked_at: slot, .. }
			| ReceivedWith::SpliceIn { locked_at: slot, .. } => *slot = Some(locked_at),
			_ => {},
		}, Some(locked_at))
	}

	/// Marks the funding parts confirmed; `received_at` is preserved.
	pub(crate) fn set_confirmed(
		&self, payment_hash: PaymentHash, confirmed_at: i64,
	) -> Result<(), DbError> {
		self.update_funding_parts(payment_hash, |part| match part {
			ReceivedWith::NewChannel { confirmed_at: slot, .. }
			| ReceivedWith::SpliceIn { confirmed_at: slot, .. } => *slot = Some(confirmed_at),
			_ => {},
		}, None)
	}

	fn update_funding_parts(
		&self, payment_hash: PaymentHash, mut update: impl FnMut(&mut ReceivedWith),
		new_received_at: Option<i64>,
	) -> Result<(), DbError> {
		let mut conn = self.conn();
		let tx = conn.transaction()?;
		let payment = match query_incoming(&tx, payment_hash)? {
			Some(payment) => payment,
			None => return Ok(()),
		};
		let mut received = match payment.received {
			Some(received) => received,
			None => return Ok(()),
		};
		for part in received.received_with.iter_mut() {
			update(part);
		}
		let (tag, blob) = codec::encode_received_with(&received.received_with);
		let received_at = new_received_at.unwrap_or(received.received_at);
		tx.execute(
			"UPDATE payments_incoming SET received_at = ?2, received_with_type = ?3, received_with_blob = ?4
			 WHERE payment_hash = ?1",
			params![&payment_hash.0[..], received_at, tag, blob],
		)?;
		tx.commit()?;
		Ok(())
	}

	pub(crate) fn get_incoming(
		&self, payment_hash: PaymentHash,
	) -> Result<Option<IncomingPayment>, DbError> {
		let conn = self.conn();
		query_incoming(&conn, payment_hash)
	}

	/// Streams every received payment still carrying an unconfirmed funding
	/// part through `visit`.
	pub(crate) fn for_each_incoming_not_confirmed(
		&self, mut visit: impl FnMut(IncomingPayment),
	) -> Result<(), DbError> {
		let conn = self.conn();
		let mut stmt = conn.prepare(&format!(
			"SELECT {} FROM payments_incoming WHERE received_at IS NOT NULL ORDER BY received_at",
			INCOMING_COLUMNS
		))?;
		let rows = stmt.query_map([], raw_incoming)?;
		for raw in rows {
			let payment: IncomingPayment = raw?.try_into()?;
			let unconfirmed = payment.received.as_ref().is_some_and(|r| {
				r.received_with.iter().any(|p| {
					matches!(
						p,
						ReceivedWith::NewChannel { confirmed_at: None, .. }
							| ReceivedWith::SpliceIn { confirmed_at: None, .. }
					)
				})
			});
			if unconfirmed {
				visit(payment);
			}
		}
		Ok(())
	}

	pub(crate) fn list_incoming_created_within(
		&self, filter: ListFilter,
	) -> Result<Vec<IncomingPayment>, DbError> {
		self.list_incoming("created_at", filter)
	}

	/// Received payments only, ordered by `received_at` descending.
	pub(crate) fn list_incoming_received_within(
		&self, filter: ListFilter,
	) -> Result<Vec<IncomingPayment>, DbError> {
		self.list_incoming("received_at", filter)
	}

	fn list_incoming(
		&self, window_column: &str, filter: ListFilter,
	) -> Result<Vec<IncomingPayment>, DbError> {
		let conn = self.conn();
		let mut sql = format!(
			"SELECT {} FROM payments_incoming p WHERE p.{col} IS NOT NULL \
			 AND p.{col} >= ?1 AND p.{col} < ?2",
			INCOMING_COLUMNS,
			col = window_column
		);
		if filter.external_id.is_some() {
			sql.push_str(
				" AND EXISTS (SELECT 1 FROM payments_metadata m WHERE m.payment_type = 0 \
				 AND m.payment_id = lower(hex(p.payment_hash)) AND m.external_id = ?5)",
			);
		}
		sql.push_str(&format!(" ORDER BY p.{} DESC LIMIT ?3 OFFSET ?4", window_column));

		let mut stmt = conn.prepare(&sql)?;
		let raws: Vec<_> = match filter.external_id {
			Some(external_id) => stmt
				.query_map(
					params![filter.from, filter.to, filter.limit, filter.offset, external_id],
					raw_incoming,
				)?
				.collect::<rusqlite::Result<_>>()?,
			None => stmt
				.query_map(params![filter.from, filter.to, filter.limit, filter.offset], raw_incoming)?
				.collect::<rusqlite::Result<_>>()?,
		};
		raws.into_iter().map(TryInto::try_into).collect()
	}

	pub(crate) fn get_oldest_received_date(&self) -> Result<Option<i64>, DbError> {
		let conn = self.conn();
		Ok(conn.query_row("SELECT MIN(received_at) FROM payments_incoming", [], |row| row.get(0))?)
	}

	/// Unreceived invoice payments whose expiry falls within `[from, to]`.
	pub(crate) fn list_expired(&self, from: i64, to: i64) -> Result<Vec<IncomingPayment>, DbError> {
		let conn = self.conn();
		let mut stmt = conn.prepare(&format!(
			"SELECT {} FROM payments_incoming WHERE received_at IS NULL ORDER BY created_at",
			INCOMING_COLUMNS
		))?;
		let raws: Vec<_> =
			stmt.query_map([], raw_incoming)?.collect::<rusqlite::Result<_>>()?;
		let mut expired = Vec::new();
		for raw in raws {
			let payment: IncomingPayment = raw.try_into()?;
			if let IncomingOrigin::Invoice { expires_at, .. } = payment.origin {
				if expires_at >= from && expires_at <= to {
					expired.push(payment);
				}
			}
		}
		Ok(expired)
	}

	/// Removes an unreceived payment. Returns whether a row was deleted.
	pub(crate) fn delete_incoming(&self, payment_hash: PaymentHash) -> Result<bool, DbError> {
		let changed = self.conn().execute(
			"DELETE FROM payments_incoming WHERE payment_hash = ?1 AND received_at IS NULL",
			params![&payment_hash.0[..]],
		)?;
		Ok(changed == 1)
	}
}

fn query_incoming(
	conn: &rusqlite::Connection, payment_hash: PaymentHash,
) -> Result<Option<IncomingPayment>, DbError> {
	let raw = conn
		.query_row(
			&format!("SELECT {} FROM payments_incoming WHERE payment_hash = ?1", INCOMING_COLUMNS),
			params![&payment_hash.0[..]],
			raw_incoming,
		)
		.optional()?;
	raw.map(TryInto::try_into).transpose()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::io::model::IncomingReceived;
	use crate::types::{ChannelId, Txid};

	fn test_db() -> PaymentsDb {
		PaymentsDb::open_in_memory().unwrap()
	}

	fn preimage(byte: u8) -> Preimage {
		Preimage([byte; 32])
	}

	fn invoice_origin(expires_at: i64) -> IncomingOrigin {
		IncomingOrigin::Invoice { payment_request: "lnbc1coffee".to_string(), expires_at }
	}

	fn add(db: &PaymentsDb, byte: u8, created_at: i64, expires_at: i64) -> PaymentHash {
		let preimage = preimage(byte);
		let hash = preimage.payment_hash();
		db.add_incoming(preimage, hash, &invoice_origin(expires_at), created_at).unwrap();
		hash
	}

	fn htlc_part(amount_msat: u64, htlc_id: u64) -> ReceivedWith {
		ReceivedWith::LightningPayment { amount_msat, channel_id: ChannelId([1; 32]), htlc_id }
	}

	fn splice_part(amount_msat: u64, tx_byte: u8) -> ReceivedWith {
		ReceivedWith::SpliceIn {
			amount_msat,
			service_fee_msat: 1_000,
			mining_fee_sat: 2,
			channel_id: ChannelId([1; 32]),
			funding_tx_id: Txid([tx_byte; 32]),
			confirmed_at: None,
			locked_at: None,
		}
	}

	#[test]
	fn add_then_get() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);
		let payment = db.get_incoming(hash).unwrap().unwrap();
		assert_eq!(payment.payment_hash, hash);
		assert_eq!(payment.created_at, 1_000);
		assert!(payment.received.is_none());
		assert_eq!(payment.amount_received_msat(), 0);
	}

	#[test]
	fn add_twice_fails() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);
		assert!(db
			.add_incoming(preimage(1), hash, &invoice_origin(600_000), 2_000)
			.is_err());
	}

	#[test]
	fn receive_accumulates_and_keeps_first_received_at() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);

		db.receive_payment(hash, &[htlc_part(10_000_000, 0)], 5_000).unwrap();
		db.receive_payment(hash, &[htlc_part(2_000_000, 1)], 9_000).unwrap();

		let received = db.get_incoming(hash).unwrap().unwrap().received.unwrap();
		assert_eq!(received.received_at, 5_000);
		assert_eq!(received.received_with.len(), 2);
		assert_eq!(
			received.received_with,
			vec![htlc_part(10_000_000, 0), htlc_part(2_000_000, 1)]
		);
	}

	#[test]
	fn receive_deduplicates_by_natural_key() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);

		db.receive_payment(hash, &[splice_part(7_000_000, 9)], 5_000).unwrap();
		// Redelivery of the same funding part must not duplicate it.
		db.receive_payment(hash, &[splice_part(7_000_000, 9)], 6_000).unwrap();

		let received = db.get_incoming(hash).unwrap().unwrap().received.unwrap();
		assert_eq!(received.received_with.len(), 1);
		assert_eq!(received.received_at, 5_000);
	}

	#[test]
	fn fee_credit_parts_are_never_deduplicated() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);

		// Two separate 100 sat payments both went to fee credit; both count.
		let credit = ReceivedWith::AddedToFeeCredit { amount_msat: 100_000 };
		db.receive_payment(hash, &[credit.clone()], 5_000).unwrap();
		db.receive_payment(hash, &[credit.clone()], 6_000).unwrap();

		let payment = db.get_incoming(hash).unwrap().unwrap();
		assert_eq!(payment.received.as_ref().unwrap().received_with.len(), 2);
		assert_eq!(payment.amount_received_msat(), 200_000);
	}

	#[test]
	fn receive_unknown_hash_fails() {
		let db = test_db();
		let err = db.receive_payment(preimage(9).payment_hash(), &[], 1).unwrap_err();
		assert!(matches!(err, DbError::IncomingPaymentNotFound(_)));
	}

	#[test]
	fn set_locked_rewrites_parts_and_bumps_received_at() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);
		db.receive_payment(hash, &[splice_part(7_000_000, 9), htlc_part(1, 0)], 5_000).unwrap();

		db.set_locked(hash, 8_000).unwrap();

		let received = db.get_incoming(hash).unwrap().unwrap().received.unwrap();
		assert_eq!(received.received_at, 8_000);
		match &received.received_with[0] {
			ReceivedWith::SpliceIn { locked_at, confirmed_at, .. } => {
				assert_eq!(*locked_at, Some(8_000));
				assert_eq!(*confirmed_at, None);
			},
			other => panic!("unexpected part: {:?}", other),
		}
		// The HTLC part is untouched.
		assert_eq!(received.received_with[1], htlc_part(1, 0));
	}

	#[test]
	fn set_confirmed_preserves_received_at() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);
		db.receive_payment(hash, &[splice_part(7_000_000, 9)], 5_000).unwrap();
		db.set_locked(hash, 8_000).unwrap();
		db.set_confirmed(hash, 12_000).unwrap();

		let received = db.get_incoming(hash).unwrap().unwrap().received.unwrap();
		assert_eq!(received.received_at, 8_000);
		match &received.received_with[0] {
			ReceivedWith::SpliceIn { locked_at, confirmed_at, .. } => {
				assert_eq!(*locked_at, Some(8_000));
				assert_eq!(*confirmed_at, Some(12_000));
			},
			other => panic!("unexpected part: {:?}", other),
		}
	}

	#[test]
	fn lifecycle_updates_on_unknown_rows_are_noops() {
		let db = test_db();
		db.set_locked(preimage(3).payment_hash(), 1).unwrap();
		db.set_confirmed(preimage(3).payment_hash(), 1).unwrap();
	}

	#[test]
	fn not_confirmed_stream_only_yields_unconfirmed_funding() {
		let db = test_db();
		let confirmed = add(&db, 1, 1_000, 600_000);
		db.receive_payment(confirmed, &[splice_part(1_000, 1)], 2_000).unwrap();
		db.set_confirmed(confirmed, 3_000).unwrap();

		let pending = add(&db, 2, 1_500, 600_000);
		db.receive_payment(pending, &[splice_part(2_000, 2)], 2_500).unwrap();

		let lightning_only = add(&db, 3, 1_600, 600_000);
		db.receive_payment(lightning_only, &[htlc_part(5, 0)], 2_600).unwrap();

		let mut seen = Vec::new();
		db.for_each_incoming_not_confirmed(|p| seen.push(p.payment_hash)).unwrap();
		assert_eq!(seen, vec![pending]);
	}

	#[test]
	fn listings_filter_windows_and_external_id() {
		let db = test_db();
		let first = add(&db, 1, 1_000, 600_000);
		let second = add(&db, 2, 2_000, 600_000);
		add(&db, 3, 9_000, 600_000);
		db.receive_payment(first, &[htlc_part(1, 0)], 4_000).unwrap();
		db.receive_payment(second, &[htlc_part(2, 0)], 5_000).unwrap();

		let created = db
			.list_incoming_created_within(ListFilter {
				from: 0,
				to: 3_000,
				limit: 10,
				offset: 0,
				external_id: None,
			})
			.unwrap();
		assert_eq!(
			created.iter().map(|p| p.payment_hash).collect::<Vec<_>>(),
			vec![second, first]
		);

		let received = db
			.list_incoming_received_within(ListFilter {
				from: 0,
				to: 10_000,
				limit: 1,
				offset: 1,
				external_id: None,
			})
			.unwrap();
		assert_eq!(received.len(), 1);
		assert_eq!(received[0].payment_hash, first);

		db.insert_metadata(
			crate::io::model::PaymentType::Incoming,
			&first.to_hex(),
			Some("order-17"),
			None,
			1,
		)
		.unwrap();
		let by_external = db
			.list_incoming_received_within(ListFilter {
				from: 0,
				to: 10_000,
				limit: 10,
				offset: 0,
				external_id: Some("order-17"),
			})
			.unwrap();
		assert_eq!(by_external.len(), 1);
		assert_eq!(by_external[0].payment_hash, first);
	}

	#[test]
	fn oldest_received_date() {
		let db = test_db();
		assert_eq!(db.get_oldest_received_date().unwrap(), None);
		let first = add(&db, 1, 1_000, 600_000);
		let second = add(&db, 2, 1_100, 600_000);
		db.receive_payment(first, &[htlc_part(1, 0)], 4_000).unwrap();
		db.receive_payment(second, &[htlc_part(1, 0)], 3_000).unwrap();
		assert_eq!(db.get_oldest_received_date().unwrap(), Some(3_000));
	}

	#[test]
	fn expired_listing_and_delete() {
		let db = test_db();
		// Issued at t=0, expires after one hour.
		let expired = add(&db, 1, 0, 3_600_000);
		// Received payments never expire.
		let received = add(&db, 2, 0, 3_600_000);
		db.receive_payment(received, &[htlc_part(1, 0)], 10).unwrap();
		// Still current.
		add(&db, 3, 0, 9_000_000);

		let listed = db.list_expired(0, 4_000_000).unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].payment_hash, expired);

		assert!(db.delete_incoming(expired).unwrap());
		assert!(!db.delete_incoming(expired).unwrap());
		assert!(db.get_incoming(expired).unwrap().is_none());

		// Received rows are not deletable.
		assert!(!db.delete_incoming(received).unwrap());
		assert!(db.get_incoming(received).unwrap().is_some());
	}

	#[test]
	fn corrupt_received_columns_are_detected() {
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);
		db.conn()
			.execute(
				"UPDATE payments_incoming SET received_with_type = 257 WHERE payment_hash = ?1",
				params![&hash.0[..]],
			)
			.unwrap();
		let err = db.get_incoming(hash).unwrap_err();
		assert!(matches!(err, DbError::UnreadableIncomingReceivedWith { .. }));
	}

	#[test]
	fn receive_preserves_marker_only_rows() {
		// A row whose receipt was recorded without parts stays readable and
		// later receives append to it.
		let db = test_db();
		let hash = add(&db, 1, 1_000, 600_000);
		db.receive_payment(hash, &[], 2_000).unwrap();
		let received = db.get_incoming(hash).unwrap().unwrap().received.unwrap();
		assert_eq!(
			received,
			IncomingReceived { received_at: 2_000, received_with: Vec::new() }
		);
		db.receive_payment(hash, &[htlc_part(5, 0)], 3_000).unwrap();
		let received = db.get_incoming(hash).unwrap().unwrap().received.unwrap();
		assert_eq!(received.received_at, 2_000);
		assert_eq!(received.received_with.len(), 1);
	}
}
