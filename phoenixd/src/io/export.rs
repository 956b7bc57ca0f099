// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Aggregate query feeding the CSV export: every completed payment of any
//! kind, streamed in `completed_at` ascending order. The four tables are read
//! through independent ordered cursors merged k-way, so the result set is
//! never materialized.

use rusqlite::{params, Connection, Row};

use crate::io::model::{
	ChannelCloseOutgoingPayment, IncomingPayment, InboundLiquidityOutgoingPayment,
	LightningOutgoingPayment, OutgoingPart,
};
use crate::io::onchain::{close_from_row, liquidity_from_row};
use crate::io::outgoing::part_status;
use crate::io::{
	blob32, blob33, codec, parse_payment_id, raw_incoming, type_version, DbError, PaymentsDb,
	INCOMING_COLUMNS,
};
use crate::types::{NodeId, PaymentHash};

/// One completed payment of any kind.
#[derive(Clone, Debug)]
pub(crate) enum CompletedPayment {
	Incoming(IncomingPayment),
	LightningOutgoing(LightningOutgoingPayment),
	ChannelClose(ChannelCloseOutgoingPayment),
	InboundLiquidity(InboundLiquidityOutgoingPayment),
}

type Cursor<'a> = Box<dyn Iterator<Item = Result<(i64, CompletedPayment), DbError>> + 'a>;

impl PaymentsDb {
	/// Streams every completed payment with `completed_at` in `[from, to)`
	/// through `visit`, ascending. Completion means receipt for incoming
	/// payments, off-chain settlement for outgoing Lightning payments and
	/// on-chain confirmation for closes and liquidity purchases.
	pub(crate) fn process_successful_payments(
		&self, from: i64, to: i64, mut visit: impl FnMut(CompletedPayment),
	) -> Result<(), DbError> {
		let conn = self.conn();
		let conn: &Connection = &conn;

		let mut incoming_stmt = conn.prepare(&format!(
			"SELECT {} FROM payments_incoming \
			 WHERE received_at IS NOT NULL AND received_at >= ?1 AND received_at < ?2 \
			 ORDER BY received_at",
			INCOMING_COLUMNS
		))?;
		let incoming = incoming_stmt.query_map(params![from, to], raw_incoming)?.map(|raw| {
			let payment = IncomingPayment::try_from(raw?)?;
			let completed_at = payment.received.as_ref().map(|r| r.received_at).unwrap_or(0);
			Ok((completed_at, CompletedPayment::Incoming(payment)))
		});

		let mut outgoing_stmt = conn.prepare(
			"SELECT id, payment_hash, recipient, recipient_amount_msat, details_type, \
			 details_blob, created_at, completed_at, status_type, status_blob \
			 FROM payments_outgoing \
			 WHERE status_type = ?3 AND completed_at >= ?1 AND completed_at < ?2 \
			 ORDER BY completed_at",
		)?;
		let outgoing = outgoing_stmt
			.query_map(
				params![from, to, codec::LIGHTNING_OUTGOING_STATUS_SUCCEEDED_OFFCHAIN_V0],
				raw_completed_outgoing,
			)?
			.map(|raw| {
				let raw = raw?;
				let completed_at = raw.completed_at;
				let payment = raw.into_payment(conn)?;
				Ok((completed_at, CompletedPayment::LightningOutgoing(payment)))
			});

		let mut close_stmt = conn.prepare(
			"SELECT id, amount_sat, address, is_default_address, mining_fee_sat, channel_id, \
			 tx_id, created_at, confirmed_at, locked_at, closing_info_type, closing_info_blob \
			 FROM payments_channel_close \
			 WHERE confirmed_at IS NOT NULL AND confirmed_at >= ?1 AND confirmed_at < ?2 \
			 ORDER BY confirmed_at",
		)?;
		let closes = close_stmt.query_map(params![from, to], close_from_row)?.map(|raw| {
			let payment = ChannelCloseOutgoingPayment::try_from(raw?)?;
			let completed_at = payment.confirmed_at.unwrap_or(0);
			Ok((completed_at, CompletedPayment::ChannelClose(payment)))
		});

		let mut liquidity_stmt = conn.prepare(
			"SELECT id, channel_id, tx_id, mining_fee_sat, purchase_type, purchase_blob, \
			 created_at, confirmed_at, locked_at \
			 FROM payments_inbound_liquidity \
			 WHERE confirmed_at IS NOT NULL AND confirmed_at >= ?1 AND confirmed_at < ?2 \
			 ORDER BY confirmed_at",
		)?;
		let liquidity = liquidity_stmt.query_map(params![from, to], liquidity_from_row)?.map(|raw| {
			let payment = InboundLiquidityOutgoingPayment::try_from(raw?)?;
			let completed_at = payment.confirmed_at.unwrap_or(0);
			Ok((completed_at, CompletedPayment::InboundLiquidity(payment)))
		});

		let cursors: Vec<Cursor> = vec![
			Box::new(incoming),
			Box::new(outgoing),
			Box::new(closes),
			Box::new(liquidity),
		];
		let mut cursors: Vec<_> = cursors.into_iter().map(Iterator::peekable).collect();

		loop {
			let mut best: Option<(usize, i64)> = None;
			for (slot, cursor) in cursors.iter_mut().enumerate() {
				match cursor.peek() {
					Some(Ok((completed_at, _))) => {
						if best.map_or(true, |(_, t)| *completed_at < t) {
							best = Some((slot, *completed_at));
						}
					},
					Some(Err(_)) => return Err(cursor.next().expect("peeked").unwrap_err()),
					None => {},
				}
			}
			match best {
				Some((slot, _)) => {
					let (_, payment) = cursors[slot].next().expect("peeked")?;
					visit(payment);
				},
				None => return Ok(()),
			}
		}
	}
}

struct RawCompletedOutgoing {
	id: String,
	payment_hash: Vec<u8>,
	recipient: Vec<u8>,
	recipient_amount_msat: i64,
	details_type: i64,
	details_blob: Vec<u8>,
	created_at: i64,
	completed_at: i64,
	status_type: i64,
	status_blob: Vec<u8>,
}

fn raw_completed_outgoing(row: &Row) -> rusqlite::Result<RawCompletedOutgoing> {
	Ok(RawCompletedOutgoing {
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
	})
}

impl RawCompletedOutgoing {
	fn into_payment(self, conn: &Connection) -> Result<LightningOutgoingPayment, DbError> {
		let id = parse_payment_id(self.id)?;
		let parts = load_parts(conn, id.to_string())?;
		let payment = LightningOutgoingPayment {
			id,
			recipient: NodeId(blob33("recipient", self.recipient)?),
			recipient_amount_msat: self.recipient_amount_msat as u64,
			payment_hash: PaymentHash(blob32("payment_hash", self.payment_hash)?),
			details: codec::decode_outgoing_details(self.details_type as u16, &self.details_blob)?,
			parts,
			status: codec::decode_outgoing_status(self.status_type as u16, &self.status_blob)?,
			created_at: self.created_at,
		};
		Ok(payment.filter_useless_parts())
	}
}

fn load_parts(conn: &Connection, parent_id: String) -> Result<Vec<OutgoingPart>, DbError> {
	let mut stmt = conn.prepare(
		"SELECT id, amount_msat, route, created_at, completed_at, status_type, status_blob \
		 FROM payments_outgoing_parts WHERE parent_id = ?1 ORDER BY created_at, id",
	)?;
	let raws: Vec<(String, i64, String, i64, Option<i64>, Option<i64>, Option<Vec<u8>>)> = stmt
		.query_map(params![parent_id], |row| {
			Ok((
				row.get(0)?,
				row.get(1)?,
				row.get(2)?,
				row.get(3)?,
				row.get(4)?,
				row.get(5)?,
				row.get(6)?,
			))
		})?
		.collect::<rusqlite::Result<_>>()?;

	let mut parts = Vec::with_capacity(raws.len());
	for (id, amount_msat, route, created_at, completed_at, status_tag, status_blob) in raws {
		let part_id = parse_payment_id(id)?;
		let status = part_status(
			part_id,
			completed_at,
			type_version(status_tag),
			status_blob.as_deref(),
		)?;
		parts.push(OutgoingPart {
			id: part_id,
			amount_msat: amount_msat as u64,
			route: codec::decode_route(&route)?,
			status,
			created_at,
		});
	}
	Ok(parts)
}
