// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Channel-close and inbound-liquidity payments. Both are insert-only; the
//! chain lifecycle columns are updated by funding transaction id as the
//! supervisor observes confirmations.

use rusqlite::{params, OptionalExtension, Row};

use crate::io::model::{ChannelCloseOutgoingPayment, InboundLiquidityOutgoingPayment};
use crate::io::{blob32, codec, parse_payment_id, DbError, PaymentsDb};
use crate::types::{ChannelId, PaymentId, Txid};

const CLOSE_COLUMNS: &str = "id, amount_sat, address, is_default_address, mining_fee_sat, \
	channel_id, tx_id, created_at, confirmed_at, locked_at, closing_info_type, closing_info_blob";

const LIQUIDITY_COLUMNS: &str =
	"id, channel_id, tx_id, mining_fee_sat, purchase_type, purchase_blob, \
	 created_at, confirmed_at, locked_at";

pub(crate) fn close_from_row(row: &Row) -> rusqlite::Result<RawChannelClose> {
	Ok(RawChannelClose {
		id: row.get(0)?,
		amount_sat: row.get(1)?,
		address: row.get(2)?,
		is_default_address: row.get(3)?,
		mining_fee_sat: row.get(4)?,
		channel_id: row.get(5)?,
		tx_id: row.get(6)?,
		created_at: row.get(7)?,
		confirmed_at: row.get(8)?,
		locked_at: row.get(9)?,
		closing_info_type: row.get(10)?,
		closing_info_blob: row.get(11)?,
	})
}

pub(crate) struct RawChannelClose {
	id: String,
	amount_sat: i64,
	address: String,
	is_default_address: bool,
	mining_fee_sat: i64,
	channel_id: Vec<u8>,
	tx_id: Vec<u8>,
	created_at: i64,
	confirmed_at: Option<i64>,
	locked_at: Option<i64>,
	closing_info_type: i64,
	closing_info_blob: Vec<u8>,
}

impl TryFrom<RawChannelClose> for ChannelCloseOutgoingPayment {
	type Error = DbError;

	fn try_from(raw: RawChannelClose) -> Result<Self, DbError> {
		Ok(ChannelCloseOutgoingPayment {
			id: parse_payment_id(raw.id)?,
			amount_sat: raw.amount_sat as u64,
			address: raw.address,
			is_sent_to_default_address: raw.is_default_address,
			mining_fee_sat: raw.mining_fee_sat as u64,
			channel_id: ChannelId(blob32("channel_id", raw.channel_id)?),
			tx_id: Txid(blob32("tx_id", raw.tx_id)?),
			created_at: raw.created_at,
			confirmed_at: raw.confirmed_at,
			locked_at: raw.locked_at,
			closing_info: codec::decode_closing_info(
				raw.closing_info_type as u16,
				&raw.closing_info_blob,
			)?,
		})
	}
}

pub(crate) fn liquidity_from_row(row: &Row) -> rusqlite::Result<RawInboundLiquidity> {
	Ok(RawInboundLiquidity {
		id: row.get(0)?,
		channel_id: row.get(1)?,
		tx_id: row.get(2)?,
		mining_fee_sat: row.get(3)?,
		purchase_type: row.get(4)?,
		purchase_blob: row.get(5)?,
		created_at: row.get(6)?,
		confirmed_at: row.get(7)?,
		locked_at: row.get(8)?,
	})
}

pub(crate) struct RawInboundLiquidity {
	id: String,
	channel_id: Vec<u8>,
	tx_id: Vec<u8>,
	mining_fee_sat: i64,
	purchase_type: i64,
	purchase_blob: Vec<u8>,
	created_at: i64,
	confirmed_at: Option<i64>,
	locked_at: Option<i64>,
}

impl TryFrom<RawInboundLiquidity> for InboundLiquidityOutgoingPayment {
	type Error = DbError;

	fn try_from(raw: RawInboundLiquidity) -> Result<Self, DbError> {
		Ok(InboundLiquidityOutgoingPayment {
			id: parse_payment_id(raw.id)?,
			channel_id: ChannelId(blob32("channel_id", raw.channel_id)?),
			tx_id: Txid(blob32("tx_id", raw.tx_id)?),
			mining_fee_sat: raw.mining_fee_sat as u64,
			purchase: codec::decode_liquidity_purchase(
				raw.purchase_type as u16,
				&raw.purchase_blob,
			)?,
			created_at: raw.created_at,
			confirmed_at: raw.confirmed_at,
			locked_at: raw.locked_at,
		})
	}
}

impl PaymentsDb {
	pub(crate) fn add_channel_close(
		&self, payment: &ChannelCloseOutgoingPayment,
	) -> Result<(), DbError> {
		let (info_type, info_blob) = codec::encode_closing_info(payment.closing_info);
		self.conn().execute(
			&format!(
				"INSERT INTO payments_channel_close ({}) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
				CLOSE_COLUMNS
			),
			params![
				payment.id.to_string(),
				payment.amount_sat as i64,
				payment.address,
				payment.is_sent_to_default_address,
				payment.mining_fee_sat as i64,
				&payment.channel_id.0[..],
				&payment.tx_id.0[..],
				payment.created_at,
				payment.confirmed_at,
				payment.locked_at,
				info_type,
				info_blob,
			],
		)?;
		Ok(())
	}

	pub(crate) fn get_channel_close(
		&self, id: PaymentId,
	) -> Result<Option<ChannelCloseOutgoingPayment>, DbError> {
		let raw = self
			.conn()
			.query_row(
				&format!("SELECT {} FROM payments_channel_close WHERE id = ?1", CLOSE_COLUMNS),
				params![id.to_string()],
				close_from_row,
			)
			.optional()?;
		raw.map(TryInto::try_into).transpose()
	}

	pub(crate) fn set_channel_close_locked(
		&self, tx_id: Txid, locked_at: i64,
	) -> Result<bool, DbError> {
		let changed = self.conn().execute(
			"UPDATE payments_channel_close SET locked_at = ?2 WHERE tx_id = ?1",
			params![&tx_id.0[..], locked_at],
		)?;
		Ok(changed > 0)
	}

	pub(crate) fn set_channel_close_confirmed(
		&self, tx_id: Txid, confirmed_at: i64,
	) -> Result<bool, DbError> {
		let changed = self.conn().execute(
			"UPDATE payments_channel_close SET confirmed_at = ?2 WHERE tx_id = ?1",
			params![&tx_id.0[..], confirmed_at],
		)?;
		Ok(changed > 0)
	}

	pub(crate) fn add_inbound_liquidity(
		&self, payment: &InboundLiquidityOutgoingPayment,
	) -> Result<(), DbError> {
		let (purchase_type, purchase_blob) = codec::encode_liquidity_purchase(&payment.purchase);
		self.conn().execute(
			&format!(
				"INSERT INTO payments_inbound_liquidity ({}) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
				LIQUIDITY_COLUMNS
			),
			params![
				payment.id.to_string(),
				&payment.channel_id.0[..],
				&payment.tx_id.0[..],
				payment.mining_fee_sat as i64,
				purchase_type,
				purchase_blob,
				payment.created_at,
				payment.confirmed_at,
				payment.locked_at,
			],
		)?;
		Ok(())
	}

	pub(crate) fn get_inbound_liquidity(
		&self, id: PaymentId,
	) -> Result<Option<InboundLiquidityOutgoingPayment>, DbError> {
		let raw = self
			.conn()
			.query_row(
				&format!(
					"SELECT {} FROM payments_inbound_liquidity WHERE id = ?1",
					LIQUIDITY_COLUMNS
				),
				params![id.to_string()],
				liquidity_from_row,
			)
			.optional()?;
		raw.map(TryInto::try_into).transpose()
	}

	pub(crate) fn set_inbound_liquidity_locked(
		&self, tx_id: Txid, locked_at: i64,
	) -> Result<bool, DbError> {
		let changed = self.conn().execute(
			"UPDATE payments_inbound_liquidity SET locked_at = ?2 WHERE tx_id = ?1",
			params![&tx_id.0[..], locked_at],
		)?;
		Ok(changed > 0)
	}

	pub(crate) fn set_inbound_liquidity_confirmed(
		&self, tx_id: Txid, confirmed_at: i64,
	) -> Result<bool, DbError> {
		let changed = self.conn().execute(
			"UPDATE payments_inbound_liquidity SET confirmed_at = ?2 WHERE tx_id = ?1",
			params![&tx_id.0[..], confirmed_at],
		)?;
		Ok(changed > 0)
	}
}
