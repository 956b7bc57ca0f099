// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Outgoing Lightning payment operations.
//!
//! Bulk reads are denormalized: one flat row per (payment, part), grouped in
//! memory by payment id with insertion order preserved. Parentless payments
//! ride along as rows with a null part id.

use std::collections::HashMap;

use rusqlite::{params, Row, Transaction};

use crate::io::model::{
	LightningOutgoingPayment, OutgoingPart, OutgoingStatus, PartStatus,
};
use crate::io::{blob32, blob33, codec, parse_payment_id, type_version, DbError, PaymentsDb};
use crate::types::{NodeId, PaymentHash, PaymentId};

const OUTGOING_SELECT: &str = "SELECT p.id, p.payment_hash, p.recipient, p.recipient_amount_msat, \
	p.details_type, p.details_blob, p.created_at, p.completed_at, p.status_type, p.status_blob, \
	q.id, q.amount_msat, q.route, q.created_at, q.completed_at, q.status_type, q.status_blob \
	FROM payments_outgoing p LEFT JOIN payments_outgoing_parts q ON q.parent_id = p.id";

struct RawOutgoingRow {
	id: String,
	payment_hash: Vec<u8>,
	recipient: Vec<u8>,
	recipient_amount_msat: i64,
	details_type: i64,
	details_blob: Vec<u8>,
	created_at: i64,
	completed_at: Option<i64>,
	status_type: Option<i64>,
	status_blob: Option<Vec<u8>>,
	part_id: Option<String>,
	part_amount_msat: Option<i64>,
	part_route: Option<String>,
	part_created_at: Option<i64>,
	part_completed_at: Option<i64>,
	part_status_type: Option<i64>,
	part_status_blob: Option<Vec<u8>>,
}

fn raw_outgoing_row(row: &Row) -> rusqlite::Result<RawOutgoingRow> {
	Ok(RawOutgoingRow {
		id: row.get(0)?,
		payment_hash: row.get(1)?,
		recipient: row.get(2)?,
		recipient_amount_msat: row.get(3)?,
		details_type: row.get(4)?,
		details_blob: row.get(5)?,
		created_at: row.get(6)?,
		completed_at: row.get(7)?,
		status_type: row.get(8)?,
		status_blob: row.get(9)?,
		part_id: row.get(10)?,
		part_amount_msat: row.get(11)?,
		part_route: row.get(12)?,
		part_created_at: row.get(13)?,
		part_completed_at: row.get(14)?,
		part_status_type: row.get(15)?,
		part_status_blob: row.get(16)?,
	})
}

fn payment_status(
	id: PaymentId, completed_at: Option<i64>, status_type: Option<u16>,
	status_blob: Option<&[u8]>,
) -> Result<OutgoingStatus, DbError> {
	match (completed_at, status_type, status_blob) {
		(None, None, None) => Ok(OutgoingStatus::Pending),
		(Some(_), Some(tag), Some(blob)) => Ok(codec::decode_outgoing_status(tag, blob)?),
		_ => Err(DbError::UnhandledOutgoingStatus { id, completed_at, type_version: status_type }),
	}
}

pub(crate) fn part_status(
	part_id: PaymentId, completed_at: Option<i64>, status_type: Option<u16>,
	status_blob: Option<&[u8]>,
) -> Result<PartStatus, DbError> {
	match (completed_at, status_type, status_blob) {
		(None, None, None) => Ok(PartStatus::Pending),
		(Some(_), Some(tag), Some(blob)) => Ok(codec::decode_part_status(tag, blob)?),
		_ => Err(DbError::UnhandledOutgoingPartStatus {
			part_id,
			completed_at,
			type_version: status_type,
		}),
	}
}

/// Groups flat rows into payments, preserving the order in which payments
/// first appear and dropping the synthetic null part of parentless payments.
fn group_rows(raws: Vec<RawOutgoingRow>) -> Result<Vec<LightningOutgoingPayment>, DbError> {
	let mut payments: Vec<LightningOutgoingPayment> = Vec::new();
	let mut index: HashMap<PaymentId, usize> = HashMap::new();

	for raw in raws {
		let id = parse_payment_id(raw.id)?;
		let slot = match index.get(&id) {
			Some(&slot) => slot,
			None => {
				let status = payment_status(
					id,
					raw.completed_at,
					type_version(raw.status_type),
					raw.status_blob.as_deref(),
				)?;
				payments.push(LightningOutgoingPayment {
					id,
					recipient: NodeId(blob33("recipient", raw.recipient)?),
					recipient_amount_msat: raw.recipient_amount_msat as u64,
					payment_hash: PaymentHash(blob32("payment_hash", raw.payment_hash)?),
					details: codec::decode_outgoing_details(
						raw.details_type as u16,
						&raw.details_blob,
					)?,
					parts: Vec::new(),
					status,
					created_at: raw.created_at,
				});
				index.insert(id, payments.len() - 1);
				payments.len() - 1
			},
		};

		if let Some(part_id) = raw.part_id {
			let part_id = parse_payment_id(part_id)?;
			let status = part_status(
				part_id,
				raw.part_completed_at,
				type_version(raw.part_status_type),
				raw.part_status_blob.as_deref(),
			)?;
			payments[slot].parts.push(OutgoingPart {
				id: part_id,
				amount_msat: raw.part_amount_msat.unwrap_or_default() as u64,
				route: codec::decode_route(raw.part_route.as_deref().unwrap_or_default())?,
				status,
				created_at: raw.part_created_at.unwrap_or_default(),
			});
		}
	}
	Ok(payments)
}

fn insert_parts(
	tx: &Transaction, parent_id: PaymentId, parts: &[OutgoingPart],
) -> Result<(), DbError> {
	for part in parts {
		let status = codec::encode_part_status(&part.status);
		let (status_type, status_blob) = match &status {
			Some((tag, blob)) => (Some(*tag), Some(blob.as_slice())),
			None => (None, None),
		};
		let completed_at = match part.status {
			PartStatus::Pending => None,
			PartStatus::Succeeded { completed_at, .. }
			| PartStatus::Failed { completed_at, .. } => Some(completed_at),
		};
		tx.execute(
			"INSERT INTO payments_outgoing_parts \
			 (id, parent_id, amount_msat, route, created_at, completed_at, status_type, status_blob) \
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
			params![
				part.id.to_string(),
				parent_id.to_string(),
				part.amount_msat as i64,
				codec::encode_route(&part.route),
				part.created_at,
				completed_at,
				status_type,
				status_blob,
			],
		)?;
	}
	Ok(())
}

impl PaymentsDb {
	/// Inserts the payment row plus its initial parts in one transaction.
	pub(crate) fn add_outgoing(
		&self, payment: &LightningOutgoingPayment,
	) -> Result<(), DbError> {
		let mut conn = self.conn();
		let tx = conn.transaction()?;
		let (details_type, details_blob) = codec::encode_outgoing_details(&payment.details);
		let status = codec::encode_outgoing_status(&payment.status);
		let (status_type, status_blob) = match &status {
			Some((tag, blob)) => (Some(*tag), Some(blob.as_slice())),
			None => (None, None),
		};
		tx.execute(
			"INSERT INTO payments_outgoing \
			 (id, payment_hash, recipient, recipient_amount_msat, details_type, details_blob, \
			  created_at, completed_at, status_type, status_blob) \
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
			params![
				payment.id.to_string(),
				&payment.payment_hash.0[..],
				&payment.recipient.0[..],
				payment.recipient_amount_msat as i64,
				details_type,
				details_blob,
				payment.created_at,
				payment.completed_at(),
				status_type,
				status_blob,
			],
		)?;
		insert_parts(&tx, payment.id, &payment.parts)?;
		tx.commit()?;
		Ok(())
	}

	/// Bulk-inserts additional parts; the parent must exist (enforced by the
	/// foreign key).
	pub(crate) fn add_outgoing_parts(
		&self, parent_id: PaymentId, parts: &[OutgoingPart],
	) -> Result<(), DbError> {
		let mut conn = self.conn();
		let tx = conn.transaction()?;
		insert_parts(&tx, parent_id, parts)?;
		tx.commit()?;
		Ok(())
	}

	/// Marks the payment completed. Returns whether exactly one row changed;
	/// a payment already completed (or a `Pending` argument) changes nothing.
	pub(crate) fn complete_outgoing(
		&self, id: PaymentId, status: &OutgoingStatus,
	) -> Result<bool, DbError> {
		let (tag, blob) = match codec::encode_outgoing_status(status) {
			Some(encoded) => encoded,
			None => return Ok(false),
		};
		let completed_at = match status {
			OutgoingStatus::SucceededOffChain { completed_at, .. }
			| OutgoingStatus::Failed { completed_at, .. } => *completed_at,
			OutgoingStatus::Pending => unreachable!(),
		};
		let changed = self.conn().execute(
			"UPDATE payments_outgoing SET completed_at = ?2, status_type = ?3, status_blob = ?4 \
			 WHERE id = ?1 AND completed_at IS NULL",
			params![id.to_string(), completed_at, tag, blob],
		)?;
		Ok(changed == 1)
	}

	/// Completes a single part; a part transitions out of `Pending` at most
	/// once.
	pub(crate) fn complete_outgoing_part(
		&self, part_id: PaymentId, status: &PartStatus,
	) -> Result<bool, DbError> {
		let (tag, blob) = match codec::encode_part_status(status) {
			Some(encoded) => encoded,
			None => return Ok(false),
		};
		let completed_at = match status {
			PartStatus::Succeeded { completed_at, .. }
			| PartStatus::Failed { completed_at, .. } => *completed_at,
			PartStatus::Pending => unreachable!(),
		};
		let changed = self.conn().execute(
			"UPDATE payments_outgoing_parts SET completed_at = ?2, status_type = ?3, status_blob = ?4 \
			 WHERE id = ?1 AND completed_at IS NULL",
			params![part_id.to_string(), completed_at, tag, blob],
		)?;
		Ok(changed == 1)
	}

	pub(crate) fn get_outgoing(
		&self, id: PaymentId,
	) -> Result<Option<LightningOutgoingPayment>, DbError> {
		let payments = self.query_outgoing(
			"WHERE p.id = ?1 ORDER BY q.created_at, q.id",
			params![id.to_string()],
		)?;
		Ok(payments.into_iter().next().map(LightningOutgoingPayment::filter_useless_parts))
	}

	/// Looks up the parent payment of a part.
	pub(crate) fn get_outgoing_from_part_id(
		&self, part_id: PaymentId,
	) -> Result<Option<LightningOutgoingPayment>, DbError> {
		let parent: Option<String> = {
			let conn = self.conn();
			use rusqlite::OptionalExtension;
			conn.query_row(
				"SELECT parent_id FROM payments_outgoing_parts WHERE id = ?1",
				params![part_id.to_string()],
				|row| row.get(0),
			)
			.optional()?
		};
		match parent {
			Some(parent) => self.get_outgoing(parse_payment_id(parent)?),
			None => Ok(None),
		}
	}

	pub(crate) fn list_outgoing_within(
		&self, from: i64, to: i64, limit: u32, offset: u32,
	) -> Result<Vec<LightningOutgoingPayment>, DbError> {
		let payments = self.query_outgoing(
			"WHERE p.id IN (SELECT id FROM payments_outgoing \
			 WHERE created_at >= ?1 AND created_at < ?2 \
			 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4) \
			 ORDER BY p.created_at DESC, p.id, q.created_at, q.id",
			params![from, to, limit, offset],
		)?;
		Ok(payments.into_iter().map(LightningOutgoingPayment::filter_useless_parts).collect())
	}

	pub(crate) fn list_outgoing_successful_or_pending_within(
		&self, from: i64, to: i64, limit: u32, offset: u32,
	) -> Result<Vec<LightningOutgoingPayment>, DbError> {
		let succeeded = codec::LIGHTNING_OUTGOING_STATUS_SUCCEEDED_OFFCHAIN_V0;
		let payments = self.query_outgoing(
			"WHERE p.id IN (SELECT id FROM payments_outgoing \
			 WHERE created_at >= ?1 AND created_at < ?2 AND (status_type IS NULL OR status_type = ?5) \
			 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4) \
			 ORDER BY p.created_at DESC, p.id, q.created_at, q.id",
			params![from, to, limit, offset, succeeded],
		)?;
		Ok(payments.into_iter().map(LightningOutgoingPayment::filter_useless_parts).collect())
	}

	pub(crate) fn list_outgoing_for_payment_hash(
		&self, payment_hash: PaymentHash,
	) -> Result<Vec<LightningOutgoingPayment>, DbError> {
		let payments = self.query_outgoing(
			"WHERE p.payment_hash = ?1 ORDER BY p.created_at, p.id, q.created_at, q.id",
			params![&payment_hash.0[..]],
		)?;
		Ok(payments.into_iter().map(LightningOutgoingPayment::filter_useless_parts).collect())
	}

	fn query_outgoing(
		&self, clause: &str, params: impl rusqlite::Params,
	) -> Result<Vec<LightningOutgoingPayment>, DbError> {
		let conn = self.conn();
		let mut stmt = conn.prepare(&format!("{} {}", OUTGOING_SELECT, clause))?;
		let raws: Vec<_> =
			stmt.query_map(params, raw_outgoing_row)?.collect::<rusqlite::Result<_>>()?;
		group_rows(raws)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::io::model::{OutgoingDetails, RouteHop};
	use crate::types::Preimage;

	fn test_db() -> PaymentsDb {
		PaymentsDb::open_in_memory().unwrap()
	}

	fn node_id(byte: u8) -> NodeId {
		NodeId([byte; 33])
	}

	fn part(amount_msat: u64, created_at: i64) -> OutgoingPart {
		OutgoingPart {
			id: PaymentId::random(),
			amount_msat,
			route: vec![RouteHop {
				node_a: node_id(1),
				node_b: node_id(2),
				short_channel_id: Some("803189x1x0".to_string()),
			}],
			status: PartStatus::Pending,
			created_at,
		}
	}

	fn payment(parts: Vec<OutgoingPart>) -> LightningOutgoingPayment {
		LightningOutgoingPayment {
			id: PaymentId::random(),
			recipient: node_id(9),
			recipient_amount_msat: 50_000,
			payment_hash: Preimage([7; 32]).payment_hash(),
			details: OutgoingDetails::Normal { payment_request: "lnbc50u...".to_string() },
			parts,
			status: OutgoingStatus::Pending,
			created_at: 1_000,
		}
	}

	#[test]
	fn add_and_get_round_trip() {
		let db = test_db();
		let payment = payment(vec![part(30_000, 1_001), part(20_000, 1_002)]);
		db.add_outgoing(&payment).unwrap();

		let loaded = db.get_outgoing(payment.id).unwrap().unwrap();
		assert_eq!(loaded, payment);
		assert!(db.get_outgoing(PaymentId::random()).unwrap().is_none());
	}

	#[test]
	fn parts_require_existing_parent() {
		let db = test_db();
		let err = db.add_outgoing_parts(PaymentId::random(), &[part(1, 1)]).unwrap_err();
		assert!(matches!(err, DbError::Sqlite(_)));
	}

	#[test]
	fn mpp_success_filters_useless_parts() {
		let db = test_db();
		// A failed probe part first, then the two parts that complete.
		let probe = part(50_000, 1_000);
		let first = part(30_000, 1_001);
		let second = part(20_000, 1_002);
		let payment = payment(vec![probe.clone(), first.clone(), second.clone()]);
		db.add_outgoing(&payment).unwrap();

		assert!(db
			.complete_outgoing_part(
				probe.id,
				&PartStatus::Failed { reason: "no route".to_string(), completed_at: 1_100 }
			)
			.unwrap());
		let preimage = Preimage([7; 32]);
		for id in [first.id, second.id] {
			assert!(db
				.complete_outgoing_part(
					id,
					&PartStatus::Succeeded { preimage, completed_at: 1_200 }
				)
				.unwrap());
		}
		assert!(db
			.complete_outgoing(
				payment.id,
				&OutgoingStatus::SucceededOffChain { preimage, completed_at: 1_200 }
			)
			.unwrap());

		let loaded = db.get_outgoing(payment.id).unwrap().unwrap();
		assert!(matches!(loaded.status, OutgoingStatus::SucceededOffChain { .. }));
		// The failed probe is filtered from the payload...
		assert_eq!(loaded.parts.len(), 2);
		assert_eq!(loaded.amount_sent_msat(), 50_000);
		// ...but still present in the raw row set.
		let raw_parts: i64 = db
			.conn()
			.query_row(
				"SELECT COUNT(*) FROM payments_outgoing_parts WHERE parent_id = ?1",
				params![payment.id.to_string()],
				|row| row.get(0),
			)
			.unwrap();
		assert_eq!(raw_parts, 3);
	}

	#[test]
	fn pending_payment_keeps_all_parts() {
		let db = test_db();
		let failed = part(10_000, 1_000);
		let payment = payment(vec![failed.clone(), part(10_000, 1_001)]);
		db.add_outgoing(&payment).unwrap();
		db.complete_outgoing_part(
			failed.id,
			&PartStatus::Failed { reason: "expiry too soon".to_string(), completed_at: 1_100 },
		)
		.unwrap();

		let loaded = db.get_outgoing(payment.id).unwrap().unwrap();
		assert_eq!(loaded.parts.len(), 2);
	}

	#[test]
	fn completion_happens_exactly_once() {
		let db = test_db();
		let only = part(10_000, 1_000);
		let payment = payment(vec![only.clone()]);
		db.add_outgoing(&payment).unwrap();

		let preimage = Preimage([7; 32]);
		let succeeded = OutgoingStatus::SucceededOffChain { preimage, completed_at: 2_000 };
		assert!(db.complete_outgoing(payment.id, &succeeded).unwrap());
		// A second completion, even a contradictory one, changes nothing.
		let failed = OutgoingStatus::Failed { reason: "late".to_string(), completed_at: 3_000 };
		assert!(!db.complete_outgoing(payment.id, &failed).unwrap());
		let loaded = db.get_outgoing(payment.id).unwrap().unwrap();
		assert_eq!(loaded.status, succeeded);

		let part_succeeded = PartStatus::Succeeded { preimage, completed_at: 2_000 };
		assert!(db.complete_outgoing_part(only.id, &part_succeeded).unwrap());
		assert!(!db
			.complete_outgoing_part(
				only.id,
				&PartStatus::Failed { reason: "late".to_string(), completed_at: 3_000 }
			)
			.unwrap());
	}

	#[test]
	fn completing_with_pending_is_a_noop() {
		let db = test_db();
		let payment = payment(vec![]);
		db.add_outgoing(&payment).unwrap();
		assert!(!db.complete_outgoing(payment.id, &OutgoingStatus::Pending).unwrap());
	}

	#[test]
	fn lookup_by_part_id() {
		let db = test_db();
		let only = part(10_000, 1_000);
		let payment = payment(vec![only.clone()]);
		db.add_outgoing(&payment).unwrap();

		let loaded = db.get_outgoing_from_part_id(only.id).unwrap().unwrap();
		assert_eq!(loaded.id, payment.id);
		assert!(db.get_outgoing_from_part_id(PaymentId::random()).unwrap().is_none());
	}

	#[test]
	fn incremental_parts_are_appended() {
		let db = test_db();
		let payment = payment(vec![part(10_000, 1_000)]);
		db.add_outgoing(&payment).unwrap();
		db.add_outgoing_parts(payment.id, &[part(20_000, 1_500), part(5_000, 1_600)]).unwrap();

		let loaded = db.get_outgoing(payment.id).unwrap().unwrap();
		assert_eq!(loaded.parts.len(), 3);
		assert_eq!(
			loaded.parts.iter().map(|p| p.created_at).collect::<Vec<_>>(),
			vec![1_000, 1_500, 1_600]
		);
	}

	#[test]
	fn listings_filter_status_and_window() {
		let db = test_db();
		let mut open = payment(vec![]);
		open.created_at = 1_000;
		db.add_outgoing(&open).unwrap();

		let mut done = payment(vec![]);
		done.created_at = 2_000;
		db.add_outgoing(&done).unwrap();
		db.complete_outgoing(
			done.id,
			&OutgoingStatus::SucceededOffChain { preimage: Preimage([7; 32]), completed_at: 2_100 },
		)
		.unwrap();

		let mut failed = payment(vec![]);
		failed.created_at = 3_000;
		db.add_outgoing(&failed).unwrap();
		db.complete_outgoing(
			failed.id,
			&OutgoingStatus::Failed { reason: "no route".to_string(), completed_at: 3_100 },
		)
		.unwrap();

		let all = db.list_outgoing_within(0, 10_000, 10, 0).unwrap();
		assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![failed.id, done.id, open.id]);

		let good = db.list_outgoing_successful_or_pending_within(0, 10_000, 10, 0).unwrap();
		assert_eq!(good.iter().map(|p| p.id).collect::<Vec<_>>(), vec![done.id, open.id]);

		let windowed = db.list_outgoing_within(1_500, 2_500, 10, 0).unwrap();
		assert_eq!(windowed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![done.id]);
	}

	#[test]
	fn list_by_payment_hash() {
		let db = test_db();
		let payment = payment(vec![]);
		db.add_outgoing(&payment).unwrap();
		let found = db.list_outgoing_for_payment_hash(payment.payment_hash).unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].id, payment.id);
		assert!(db
			.list_outgoing_for_payment_hash(Preimage([8; 32]).payment_hash())
			.unwrap()
			.is_empty());
	}

	#[test]
	fn inconsistent_status_columns_are_detected() {
		let db = test_db();
		let payment = payment(vec![]);
		db.add_outgoing(&payment).unwrap();
		db.conn()
			.execute(
				"UPDATE payments_outgoing SET completed_at = 5 WHERE id = ?1",
				params![payment.id.to_string()],
			)
			.unwrap();
		let err = db.get_outgoing(payment.id).unwrap_err();
		assert!(matches!(err, DbError::UnhandledOutgoingStatus { .. }));
	}

	#[test]
	fn inconsistent_part_status_columns_are_detected() {
		let db = test_db();
		let only = part(10_000, 1_000);
		let payment = payment(vec![only.clone()]);
		db.add_outgoing(&payment).unwrap();
		db.conn()
			.execute(
				"UPDATE payments_outgoing_parts SET status_type = 1025 WHERE id = ?1",
				params![only.id.to_string()],
			)
			.unwrap();
		let err = db.get_outgoing(payment.id).unwrap_err();
		assert!(matches!(err, DbError::UnhandledOutgoingPartStatus { .. }));
	}
}
