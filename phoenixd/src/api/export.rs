// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! CSV export of the completed payment history, written under the data
//! directory's `exports/` subdirectory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::params::Params;
use crate::api::{json_response, ApiResponse, Context};
use crate::io::export::CompletedPayment;
use crate::io::PaymentsDb;
use crate::util::now_millis;

#[derive(Serialize)]
struct ExportResponse {
	path: String,
}

pub(crate) async fn handle_export(
	context: &Context, params: &Params,
) -> Result<ApiResponse, ApiError> {
	let from = params.opt_i64("from")?.unwrap_or(0);
	let to = params.opt_i64("to")?.unwrap_or_else(|| now_millis() + 1);
	let db = Arc::clone(&context.db);
	let dir = context.data_dir.join("exports");
	let path = dir.join(format!("payments-{}.csv", now_millis()));

	let written = tokio::task::spawn_blocking(move || write_csv(&db, &dir, path, from, to))
		.await
		.map_err(|e| ApiError::Internal(format!("export task failed: {}", e)))?
		.map_err(ApiError::Internal)?;
	json_response(&ExportResponse { path: written.display().to_string() })
}

fn write_csv(
	db: &PaymentsDb, dir: &std::path::Path, path: PathBuf, from: i64, to: i64,
) -> Result<PathBuf, String> {
	std::fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
	let file =
		File::create(&path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
	let mut writer = BufWriter::new(file);

	let mut io_error: Option<std::io::Error> = None;
	writeln!(writer, "completed_at,type,id,payment_hash,amount_msat,fees_msat")
		.map_err(|e| e.to_string())?;
	db.process_successful_payments(from, to, |payment| {
		if io_error.is_some() {
			return;
		}
		let line = csv_line(&payment);
		if let Err(e) = writeln!(writer, "{}", line) {
			io_error = Some(e);
		}
	})
	.map_err(|e| e.to_string())?;
	if let Some(e) = io_error {
		return Err(format!("write to {} failed: {}", path.display(), e));
	}
	writer.flush().map_err(|e| e.to_string())?;
	Ok(path)
}

fn csv_line(payment: &CompletedPayment) -> String {
	match payment {
		CompletedPayment::Incoming(p) => format!(
			"{},incoming,{},{},{},{}",
			p.received.as_ref().map(|r| r.received_at).unwrap_or(0),
			p.id,
			p.payment_hash,
			p.amount_received_msat(),
			p.fees_msat(),
		),
		CompletedPayment::LightningOutgoing(p) => format!(
			"{},lightning_outgoing,{},{},{},{}",
			p.completed_at().unwrap_or(0),
			p.id,
			p.payment_hash,
			p.amount_sent_msat(),
			p.fees_msat(),
		),
		CompletedPayment::ChannelClose(p) => format!(
			"{},channel_close,{},{},{},{}",
			p.confirmed_at.unwrap_or(0),
			p.id,
			p.tx_id,
			p.amount_sat * 1_000,
			p.mining_fee_sat * 1_000,
		),
		CompletedPayment::InboundLiquidity(p) => format!(
			"{},inbound_liquidity,{},{},{},{}",
			p.confirmed_at.unwrap_or(0),
			p.id,
			p.tx_id,
			p.purchase.amount_sat() * 1_000,
			p.purchase.fees_sat() * 1_000,
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::api::test_util::{body_json, test_context};
	use crate::io::model::{IncomingOrigin, ReceivedWith};
	use crate::node::mock::MockEngine;
	use crate::types::{ChannelId, Preimage};

	#[tokio::test]
	async fn export_writes_completed_payments_under_the_data_dir() {
		let context = test_context(Arc::new(MockEngine::new()));
		let preimage = Preimage([1; 32]);
		let hash = preimage.payment_hash();
		context
			.db
			.add_incoming(
				preimage,
				hash,
				&IncomingOrigin::Invoice {
					payment_request: "lnmock1".to_string(),
					expires_at: i64::MAX,
				},
				1_000,
			)
			.unwrap();
		context
			.db
			.receive_payment(
				hash,
				&[ReceivedWith::LightningPayment {
					amount_msat: 7_000_000,
					channel_id: ChannelId([1; 32]),
					htlc_id: 0,
				}],
				2_000,
			)
			.unwrap();

		let params = Params::from_pairs(&[]);
		let body = body_json(handle_export(&context, &params).await.unwrap()).await;
		let path = body["path"].as_str().unwrap();
		assert!(path.contains("exports"));

		let contents = std::fs::read_to_string(path).unwrap();
		let mut lines = contents.lines();
		assert_eq!(
			lines.next().unwrap(),
			"completed_at,type,id,payment_hash,amount_msat,fees_msat"
		);
		let row = lines.next().unwrap();
		assert!(row.starts_with("2000,incoming,"));
		assert!(row.contains(&hash.to_hex()));
		assert!(row.ends_with(",7000000,0"));
	}
}
