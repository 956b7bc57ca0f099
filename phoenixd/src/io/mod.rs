// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The payments database.
//!
//! One SQLite file per (chain, node id). Every polymorphic column is a
//! `(type_version, blob)` pair written by [`codec`]; multi-statement updates
//! run inside a single transaction so concurrent callers observe a total
//! order per row.

pub(crate) mod codec;
pub(crate) mod export;
pub(crate) mod incoming;
pub(crate) mod metadata;
pub(crate) mod model;
pub(crate) mod onchain;
pub(crate) mod outgoing;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Row};
use thiserror::Error;

use crate::io::codec::DecodeError;
use crate::io::model::{IncomingOrigin, IncomingPayment, IncomingReceived};
use crate::types::{Chain, NodeId, PaymentHash, PaymentId, Preimage};

/// Database file name, `phoenix.<chain>.<node id prefix>.db`.
pub(crate) fn db_file_name(chain: Chain, node_id: &NodeId) -> String {
	format!("phoenix.{}.{}.db", chain, &node_id.to_hex()[..6])
}

#[derive(Debug, Error)]
pub(crate) enum DbError {
	#[error("incoming payment not found: {0}")]
	IncomingPaymentNotFound(PaymentHash),
	/// The three `received_*` columns of an incoming row are only meaningful
	/// all-null, all-set, or with only `received_at` set.
	#[error("unreadable incoming received_with (received_at={received_at:?}, type={type_version:?})")]
	UnreadableIncomingReceivedWith {
		received_at: Option<i64>,
		type_version: Option<u16>,
		blob: Option<Vec<u8>>,
	},
	/// `completed_at` and the status `(type, blob)` columns of an outgoing
	/// payment must be co-present or co-absent.
	#[error("unhandled outgoing status on {id} (completed_at={completed_at:?}, type={type_version:?})")]
	UnhandledOutgoingStatus { id: PaymentId, completed_at: Option<i64>, type_version: Option<u16> },
	#[error("unhandled outgoing part status on {part_id} (completed_at={completed_at:?}, type={type_version:?})")]
	UnhandledOutgoingPartStatus {
		part_id: PaymentId,
		completed_at: Option<i64>,
		type_version: Option<u16>,
	},
	#[error("corrupt column: {0}")]
	Corrupt(String),
	#[error(transparent)]
	Decode(#[from] DecodeError),
	#[error(transparent)]
	Sqlite(#[from] rusqlite::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS payments_incoming (
	payment_hash BLOB NOT NULL PRIMARY KEY,
	id TEXT NOT NULL UNIQUE,
	preimage BLOB NOT NULL,
	origin_type INTEGER NOT NULL,
	origin_blob BLOB NOT NULL,
	created_at INTEGER NOT NULL,
	received_at INTEGER,
	received_with_type INTEGER,
	received_with_blob BLOB
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS payments_incoming_received_at_idx
	ON payments_incoming(received_at);

CREATE TABLE IF NOT EXISTS payments_outgoing (
	id TEXT NOT NULL PRIMARY KEY,
	payment_hash BLOB NOT NULL,
	recipient BLOB NOT NULL,
	recipient_amount_msat INTEGER NOT NULL,
	details_type INTEGER NOT NULL,
	details_blob BLOB NOT NULL,
	created_at INTEGER NOT NULL,
	completed_at INTEGER,
	status_type INTEGER,
	status_blob BLOB
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS payments_outgoing_payment_hash_idx
	ON payments_outgoing(payment_hash);

CREATE TABLE IF NOT EXISTS payments_outgoing_parts (
	id TEXT NOT NULL PRIMARY KEY,
	parent_id TEXT NOT NULL REFERENCES payments_outgoing(id),
	amount_msat INTEGER NOT NULL,
	route TEXT NOT NULL,
	created_at INTEGER NOT NULL,
	completed_at INTEGER,
	status_type INTEGER,
	status_blob BLOB
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS payments_outgoing_parts_parent_idx
	ON payments_outgoing_parts(parent_id);

CREATE TABLE IF NOT EXISTS payments_channel_close (
	id TEXT NOT NULL PRIMARY KEY,
	amount_sat INTEGER NOT NULL,
	address TEXT NOT NULL,
	is_default_address INTEGER NOT NULL,
	mining_fee_sat INTEGER NOT NULL,
	channel_id BLOB NOT NULL,
	tx_id BLOB NOT NULL,
	created_at INTEGER NOT NULL,
	confirmed_at INTEGER,
	locked_at INTEGER,
	closing_info_type INTEGER NOT NULL,
	closing_info_blob BLOB NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS payments_inbound_liquidity (
	id TEXT NOT NULL PRIMARY KEY,
	channel_id BLOB NOT NULL,
	tx_id BLOB NOT NULL,
	mining_fee_sat INTEGER NOT NULL,
	purchase_type INTEGER NOT NULL,
	purchase_blob BLOB NOT NULL,
	created_at INTEGER NOT NULL,
	confirmed_at INTEGER,
	locked_at INTEGER
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS payments_metadata (
	payment_type INTEGER NOT NULL,
	payment_id TEXT NOT NULL,
	external_id TEXT,
	webhook_url TEXT,
	created_at INTEGER NOT NULL,
	PRIMARY KEY (payment_type, payment_id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS payments_metadata_external_id_idx
	ON payments_metadata(external_id);

CREATE TABLE IF NOT EXISTS channel_snapshots (
	channel_id BLOB NOT NULL PRIMARY KEY,
	data BLOB NOT NULL,
	updated_at INTEGER NOT NULL
) WITHOUT ROWID;
";

pub(crate) struct PaymentsDb {
	conn: Mutex<Connection>,
}

impl PaymentsDb {
	pub(crate) fn open(path: &Path) -> Result<Self, DbError> {
		let conn = Connection::open(path)?;
		Self::setup(conn)
	}

	#[cfg(test)]
	pub(crate) fn open_in_memory() -> Result<Self, DbError> {
		Self::setup(Connection::open_in_memory()?)
	}

	fn setup(conn: Connection) -> Result<Self, DbError> {
		conn.pragma_update(None, "journal_mode", "WAL")?;
		conn.pragma_update(None, "foreign_keys", "ON")?;
		conn.execute_batch(SCHEMA)?;
		Ok(Self { conn: Mutex::new(conn) })
	}

	pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
		self.conn.lock().expect("payments db mutex poisoned")
	}

	/// Replaces the persisted channel snapshots with the current set.
	pub(crate) fn replace_channel_snapshots(
		&self, snapshots: &[(crate::types::ChannelId, Vec<u8>)], updated_at: i64,
	) -> Result<(), DbError> {
		let mut conn = self.conn();
		let tx = conn.transaction()?;
		tx.execute("DELETE FROM channel_snapshots", [])?;
		for (channel_id, data) in snapshots {
			tx.execute(
				"INSERT INTO channel_snapshots (channel_id, data, updated_at) VALUES (?1, ?2, ?3)",
				rusqlite::params![&channel_id.0[..], data, updated_at],
			)?;
		}
		tx.commit()?;
		Ok(())
	}
}

pub(crate) fn blob32(what: &str, bytes: Vec<u8>) -> Result<[u8; 32], DbError> {
	bytes.try_into().map_err(|_| DbError::Corrupt(format!("{} is not 32 bytes", what)))
}

pub(crate) fn blob33(what: &str, bytes: Vec<u8>) -> Result<[u8; 33], DbError> {
	bytes.try_into().map_err(|_| DbError::Corrupt(format!("{} is not 33 bytes", what)))
}

pub(crate) fn parse_payment_id(s: String) -> Result<PaymentId, DbError> {
	s.parse().map_err(|_| DbError::Corrupt(format!("bad payment id: {}", s)))
}

pub(crate) fn type_version(col: Option<i64>) -> Option<u16> {
	col.map(|v| v as u16)
}

/// One incoming row as stored. Column order everywhere:
/// `payment_hash, id, preimage, origin_type, origin_blob, created_at,
/// received_at, received_with_type, received_with_blob`.
pub(crate) struct RawIncoming {
	payment_hash: Vec<u8>,
	id: String,
	preimage: Vec<u8>,
	origin_type: i64,
	origin_blob: Vec<u8>,
	created_at: i64,
	received_at: Option<i64>,
	received_with_type: Option<i64>,
	received_with_blob: Option<Vec<u8>>,
}

pub(crate) const INCOMING_COLUMNS: &str = "payment_hash, id, preimage, origin_type, origin_blob, \
	created_at, received_at, received_with_type, received_with_blob";

pub(crate) fn raw_incoming(row: &Row) -> rusqlite::Result<RawIncoming> {
	Ok(RawIncoming {
		payment_hash: row.get(0)?,
		id: row.get(1)?,
		preimage: row.get(2)?,
		origin_type: row.get(3)?,
		origin_blob: row.get(4)?,
		created_at: row.get(5)?,
		received_at: row.get(6)?,
		received_with_type: row.get(7)?,
		received_with_blob: row.get(8)?,
	})
}

impl TryFrom<RawIncoming> for IncomingPayment {
	type Error = DbError;

	fn try_from(raw: RawIncoming) -> Result<Self, DbError> {
		let payment_hash = PaymentHash(blob32("payment_hash", raw.payment_hash)?);
		let id = parse_payment_id(raw.id)?;
		let preimage = Preimage(blob32("preimage", raw.preimage)?);
		let origin: IncomingOrigin =
			codec::decode_incoming_origin(raw.origin_type as u16, &raw.origin_blob)?;
		let received_with_type = type_version(raw.received_with_type);

		let received = match (raw.received_at, received_with_type, &raw.received_with_blob) {
			(None, None, None) => None,
			(Some(received_at), None, None) => {
				Some(IncomingReceived { received_at, received_with: Vec::new() })
			},
			(Some(received_at), Some(tag), Some(blob)) => Some(IncomingReceived {
				received_at,
				received_with: codec::decode_received_with(tag, blob)?,
			}),
			_ => {
				return Err(DbError::UnreadableIncomingReceivedWith {
					received_at: raw.received_at,
					type_version: received_with_type,
					blob: raw.received_with_blob,
				})
			},
		};

		Ok(IncomingPayment {
			id,
			payment_hash,
			preimage,
			origin,
			created_at: raw.created_at,
			received,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn db_file_name_uses_chain_and_node_id_prefix() {
		let mut bytes = [0u8; 33];
		bytes[0] = 0x02;
		bytes[1] = 0xab;
		bytes[2] = 0xcd;
		let name = db_file_name(Chain::Mainnet, &NodeId(bytes));
		assert_eq!(name, "phoenix.mainnet.02abcd.db");
	}

	#[test]
	fn schema_applies_on_fresh_database() {
		let db = PaymentsDb::open_in_memory().unwrap();
		let count: i64 = db
			.conn()
			.query_row(
				"SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'payments_%'",
				[],
				|row| row.get(0),
			)
			.unwrap();
		assert_eq!(count, 6);
	}
}
