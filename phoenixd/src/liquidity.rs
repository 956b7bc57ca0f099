// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Automated liquidity policy.
//!
//! Consulted by the peer for every incoming HTLC or splice attempt that needs
//! on-chain liquidity: accept the fee, convert the payment to fee credit, or
//! reject it.

use std::fmt;
use std::sync::RwLock;

use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LiquidityPolicy {
	/// Hard cap on the total fee of a liquidity operation, in satoshis.
	pub max_absolute_fee_sat: u64,
	/// Cap on the fee relative to the amount, in basis points (1/100th of a
	/// percent).
	pub max_relative_fee_basis_points: u64,
	/// Ceiling on the non-refundable fee credit bucket, in satoshis.
	pub max_allowed_credit_sat: u64,
	pub skip_absolute_fee_check: bool,
}

impl Default for LiquidityPolicy {
	fn default() -> Self {
		Self {
			max_absolute_fee_sat: 40_000,
			max_relative_fee_basis_points: 300,
			max_allowed_credit_sat: 100_000,
			skip_absolute_fee_check: false,
		}
	}
}

impl LiquidityPolicy {
	pub(crate) fn validate(&self) -> Result<(), String> {
		if !(5_000..=100_000).contains(&self.max_absolute_fee_sat) {
			return Err(format!(
				"max_absolute_fee_sat must be in [5000, 100000], got {}",
				self.max_absolute_fee_sat
			));
		}
		if !(10..=500).contains(&self.max_relative_fee_basis_points) {
			return Err(format!(
				"max_relative_fee_basis_points must be in [10, 500], got {}",
				self.max_relative_fee_basis_points
			));
		}
		if self.max_allowed_credit_sat > 100_000 {
			return Err(format!(
				"max_allowed_credit_sat must be at most 100000, got {}",
				self.max_allowed_credit_sat
			));
		}
		Ok(())
	}

	/// Decides what to do with a payment of `amount_msat` whose liquidity
	/// operation would cost `fee_msat`, given the current fee credit balance.
	/// Checks are applied in order: credit conversion for payments too small
	/// to cover the fee, then the absolute cap, then the relative cap.
	pub(crate) fn decide(
		&self, amount_msat: u64, fee_msat: u64, credit_available_msat: u64, channels_empty: bool,
	) -> LiquidityDecision {
		debug!(
			"liquidity decision requested: amount={}msat fee={}msat credit={}msat channels_empty={}",
			amount_msat, fee_msat, credit_available_msat, channels_empty
		);
		if amount_msat < fee_msat {
			let max_credit_msat = self.max_allowed_credit_sat * 1_000;
			return if credit_available_msat + amount_msat <= max_credit_msat {
				LiquidityDecision::AcceptAsCredit { amount_msat }
			} else {
				LiquidityDecision::Reject {
					reason: RejectReason::CreditFull {
						credit_available_msat,
						max_allowed_credit_sat: self.max_allowed_credit_sat,
					},
				}
			};
		}
		if !self.skip_absolute_fee_check && fee_msat > self.max_absolute_fee_sat * 1_000 {
			return LiquidityDecision::Reject {
				reason: RejectReason::OverAbsoluteFee {
					fee_msat,
					max_absolute_fee_sat: self.max_absolute_fee_sat,
				},
			};
		}
		if fee_msat * 10_000 > amount_msat * self.max_relative_fee_basis_points {
			return LiquidityDecision::Reject {
				reason: RejectReason::OverRelativeFee {
					fee_msat,
					amount_msat,
					max_relative_fee_basis_points: self.max_relative_fee_basis_points,
				},
			};
		}
		LiquidityDecision::Accept
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LiquidityDecision {
	Accept,
	/// The payment is too small to pay for its own liquidity; take it whole
	/// as non-refundable fee credit.
	AcceptAsCredit { amount_msat: u64 },
	Reject { reason: RejectReason },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RejectReason {
	CreditFull { credit_available_msat: u64, max_allowed_credit_sat: u64 },
	OverAbsoluteFee { fee_msat: u64, max_absolute_fee_sat: u64 },
	OverRelativeFee { fee_msat: u64, amount_msat: u64, max_relative_fee_basis_points: u64 },
}

impl fmt::Display for RejectReason {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			RejectReason::CreditFull { credit_available_msat, max_allowed_credit_sat } => write!(
				f,
				"fee credit is full ({} msat of {} sat)",
				credit_available_msat, max_allowed_credit_sat
			),
			RejectReason::OverAbsoluteFee { fee_msat, max_absolute_fee_sat } => write!(
				f,
				"fee of {} msat is over the absolute cap of {} sat",
				fee_msat, max_absolute_fee_sat
			),
			RejectReason::OverRelativeFee {
				fee_msat,
				amount_msat,
				max_relative_fee_basis_points,
			} => write!(
				f,
				"fee of {} msat on {} msat is over the relative cap of {} basis points",
				fee_msat, amount_msat, max_relative_fee_basis_points
			),
		}
	}
}

/// Single-writer, many-reader cell holding the active policy. The policy is
/// the only piece of configuration that can change after startup.
pub(crate) struct PolicyCell {
	inner: RwLock<LiquidityPolicy>,
}

impl PolicyCell {
	pub(crate) fn new(policy: LiquidityPolicy) -> Self {
		Self { inner: RwLock::new(policy) }
	}

	pub(crate) fn get(&self) -> LiquidityPolicy {
		*self.inner.read().expect("policy cell poisoned")
	}

	pub(crate) fn set(&self, policy: LiquidityPolicy) {
		*self.inner.write().expect("policy cell poisoned") = policy;
	}
}
