// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Core identifiers shared by the store, the peer supervisor and the HTTP
//! surface. All of them render as lower-case hex on the wire.

use std::fmt;
use std::str::FromStr;

use hex::{DisplayHex, FromHex};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! impl_hex_newtype {
	($name:ident, $len:expr) => {
		#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(pub [u8; $len]);

		impl $name {
			pub fn to_hex(&self) -> String {
				self.0.to_lower_hex_string()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
				write!(f, "{}", self.to_hex())
			}
		}

		impl FromStr for $name {
			type Err = String;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let bytes = Vec::<u8>::from_hex(s)
					.map_err(|_| format!("expected {} hex bytes", $len))?;
				let bytes: [u8; $len] =
					bytes.try_into().map_err(|_| format!("expected {} hex bytes", $len))?;
				Ok($name(bytes))
			}
		}

		impl Serialize for $name {
			fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
				serializer.serialize_str(&self.to_hex())
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
				let s = String::deserialize(deserializer)?;
				s.parse().map_err(de::Error::custom)
			}
		}
	};
}

impl_hex_newtype!(PaymentHash, 32);
impl_hex_newtype!(Preimage, 32);
impl_hex_newtype!(ChannelId, 32);
impl_hex_newtype!(Txid, 32);
impl_hex_newtype!(NodeId, 33);

impl Preimage {
	/// The payment hash committing to this preimage (single SHA-256).
	pub fn payment_hash(&self) -> PaymentHash {
		use sha2::{Digest, Sha256};
		let digest = Sha256::digest(self.0);
		let mut bytes = [0u8; 32];
		bytes.copy_from_slice(&digest);
		PaymentHash(bytes)
	}
}

/// Stable 128-bit identifier carried by every payment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
	pub fn random() -> Self {
		PaymentId(Uuid::new_v4())
	}
}

impl fmt::Display for PaymentId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for PaymentId {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(PaymentId).map_err(|_| "expected a uuid".to_string())
	}
}

impl Serialize for PaymentId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.0.to_string())
	}
}

impl<'de> Deserialize<'de> for PaymentId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(de::Error::custom)
	}
}

/// The Bitcoin chain the node runs on. Selects the database file name and is
/// reported by `getinfo`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
	Mainnet,
	Testnet,
	Signet,
	Regtest,
}

impl Chain {
	pub fn as_str(&self) -> &'static str {
		match self {
			Chain::Mainnet => "mainnet",
			Chain::Testnet => "testnet",
			Chain::Signet => "signet",
			Chain::Regtest => "regtest",
		}
	}
}

impl FromStr for Chain {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"mainnet" | "bitcoin" => Ok(Chain::Mainnet),
			"testnet" => Ok(Chain::Testnet),
			"signet" => Ok(Chain::Signet),
			"regtest" => Ok(Chain::Regtest),
			other => Err(format!("unknown chain: {}", other)),
		}
	}
}

impl fmt::Display for Chain {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_newtype_round_trip() {
		let hash: PaymentHash =
			"0101010101010101010101010101010101010101010101010101010101010101".parse().unwrap();
		assert_eq!(hash.0, [1u8; 32]);
		assert_eq!(hash.to_hex().parse::<PaymentHash>().unwrap(), hash);
		assert!("zz".parse::<PaymentHash>().is_err());
		assert!("0101".parse::<PaymentHash>().is_err());
	}

	#[test]
	fn preimage_hashes_to_payment_hash() {
		// SHA-256 of 32 zero bytes.
		let preimage = Preimage([0u8; 32]);
		assert_eq!(
			preimage.payment_hash().to_hex(),
			"66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
		);
	}

	#[test]
	fn chain_parses() {
		assert_eq!("mainnet".parse::<Chain>().unwrap(), Chain::Mainnet);
		assert_eq!("regtest".parse::<Chain>().unwrap(), Chain::Regtest);
		assert!("litecoin".parse::<Chain>().is_err());
	}
}
