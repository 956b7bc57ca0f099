// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Daemon configuration: `phoenix.conf` in the data directory, overridden by
//! CLI arguments and environment variables. Secrets missing on first start
//! are generated and written back so restarts keep them stable.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use hex::DisplayHex;
use log::LevelFilter;
use rand::Rng;
use serde::Deserialize;

use crate::liquidity::LiquidityPolicy;
use crate::types::Chain;

const CONFIG_FILE: &str = "phoenix.conf";
const SEED_FILE: &str = "seed.dat";
const LOG_FILE: &str = "phoenix.log";
const DEFAULT_HTTP_PORT: u16 = 9740;

#[derive(Debug)]
pub(crate) struct Config {
	pub data_dir: PathBuf,
	pub chain: Chain,
	pub http_bind_ip: IpAddr,
	pub http_bind_port: u16,
	pub http_password: String,
	pub http_password_limited: Option<String>,
	pub webhook_urls: Vec<String>,
	pub webhook_secret: String,
	pub lnaddress_domain: Option<String>,
	pub mempool_space_url: String,
	pub liquidity: LiquidityPolicy,
	pub log_level: LevelFilter,
}

impl Config {
	pub(crate) fn seed_path(&self) -> PathBuf {
		self.data_dir.join(SEED_FILE)
	}

	pub(crate) fn log_path(&self) -> PathBuf {
		self.data_dir.join(LOG_FILE)
	}
}

/// Flat key/value layout of `phoenix.conf`; generated secrets are appended
/// as single lines, which keeps the file valid.
#[derive(Default, Deserialize)]
struct FileConfig {
	chain: Option<String>,
	http_bind_ip: Option<String>,
	http_bind_port: Option<u16>,
	http_password: Option<String>,
	http_password_limited: Option<String>,
	webhook_urls: Option<Vec<String>>,
	webhook_secret: Option<String>,
	lnaddress_domain: Option<String>,
	mempool_space_url: Option<String>,
	log_level: Option<String>,
	max_absolute_fee_sat: Option<u64>,
	max_relative_fee_basis_points: Option<u64>,
	max_allowed_credit_sat: Option<u64>,
	skip_absolute_fee_check: Option<bool>,
}

#[derive(Parser, Debug, Default)]
#[command(version, about = "phoenixd", long_about = None)]
pub(crate) struct ArgsConfig {
	#[arg(long, env = "PHOENIX_DATADIR", help = "Data directory (default: ~/.phoenix)")]
	pub datadir: Option<PathBuf>,

	#[arg(long, env = "PHOENIX_CHAIN", help = "Bitcoin chain to use")]
	pub chain: Option<Chain>,

	#[arg(long, env = "PHOENIX_HTTP_BIND_IP", help = "IP the HTTP API binds to")]
	pub http_bind_ip: Option<IpAddr>,

	#[arg(long, env = "PHOENIX_HTTP_BIND_PORT", help = "Port the HTTP API binds to")]
	pub http_bind_port: Option<u16>,

	#[arg(long = "webhook", help = "Global webhook URL, repeatable")]
	pub webhooks: Vec<String>,

	#[arg(long, env = "PHOENIX_LOG_LEVEL", help = "Log level filter")]
	pub log_level: Option<LevelFilter>,
}

fn invalid_input(message: String) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn generate_secret() -> String {
	let bytes: [u8; 16] = rand::thread_rng().gen();
	bytes.to_lower_hex_string()
}

fn default_data_dir() -> PathBuf {
	std::env::var_os("HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from("."))
		.join(".phoenix")
}

pub(crate) fn load_config(args: &ArgsConfig) -> io::Result<Config> {
	let data_dir = args.datadir.clone().unwrap_or_else(default_data_dir);
	std::fs::create_dir_all(&data_dir)?;
	let config_path = data_dir.join(CONFIG_FILE);

	let mut file = FileConfig::default();
	if config_path.exists() {
		let content = std::fs::read_to_string(&config_path)?;
		file = toml::from_str(&content)
			.map_err(|e| invalid_input(format!("invalid {}: {}", CONFIG_FILE, e)))?;
	}

	// Generated secrets are written back so the operator can read them and
	// restarts keep them stable.
	let mut appended = Vec::new();
	let http_password = match &file.http_password {
		Some(password) => password.clone(),
		None => {
			let password = generate_secret();
			appended.push(format!("http_password = \"{}\"", password));
			password
		},
	};
	let http_password_limited = match &file.http_password_limited {
		Some(password) => Some(password.clone()),
		None => {
			let password = generate_secret();
			appended.push(format!("http_password_limited = \"{}\"", password));
			Some(password)
		},
	};
	let webhook_secret = match &file.webhook_secret {
		Some(secret) => secret.clone(),
		None => {
			let secret = generate_secret();
			appended.push(format!("webhook_secret = \"{}\"", secret));
			secret
		},
	};
	if !appended.is_empty() {
		let mut content = if config_path.exists() {
			std::fs::read_to_string(&config_path)?
		} else {
			String::new()
		};
		if !content.is_empty() && !content.ends_with('\n') {
			content.push('\n');
		}
		for line in &appended {
			content.push_str(line);
			content.push('\n');
		}
		std::fs::write(&config_path, content)?;
	}

	let chain = match (&args.chain, &file.chain) {
		(Some(chain), _) => *chain,
		(None, Some(name)) => Chain::from_str(name).map_err(invalid_input)?,
		(None, None) => Chain::Mainnet,
	};

	let http_bind_ip = match (&args.http_bind_ip, &file.http_bind_ip) {
		(Some(ip), _) => *ip,
		(None, Some(raw)) => raw
			.parse()
			.map_err(|_| invalid_input(format!("invalid http_bind_ip: {}", raw)))?,
		(None, None) => IpAddr::V4(Ipv4Addr::LOCALHOST),
	};

	let mut webhook_urls = file.webhook_urls.unwrap_or_default();
	webhook_urls.extend(args.webhooks.iter().cloned());

	let defaults = LiquidityPolicy::default();
	let liquidity = LiquidityPolicy {
		max_absolute_fee_sat: file.max_absolute_fee_sat.unwrap_or(defaults.max_absolute_fee_sat),
		max_relative_fee_basis_points: file
			.max_relative_fee_basis_points
			.unwrap_or(defaults.max_relative_fee_basis_points),
		max_allowed_credit_sat: file
			.max_allowed_credit_sat
			.unwrap_or(defaults.max_allowed_credit_sat),
		skip_absolute_fee_check: file
			.skip_absolute_fee_check
			.unwrap_or(defaults.skip_absolute_fee_check),
	};
	liquidity.validate().map_err(invalid_input)?;

	let log_level = match (&args.log_level, &file.log_level) {
		(Some(level), _) => *level,
		(None, Some(raw)) => LevelFilter::from_str(raw)
			.map_err(|_| invalid_input(format!("invalid log_level: {}", raw)))?,
		(None, None) => LevelFilter::Info,
	};

	Ok(Config {
		data_dir,
		chain,
		http_bind_ip,
		http_bind_port: args.http_bind_port.or(file.http_bind_port).unwrap_or(DEFAULT_HTTP_PORT),
		http_password,
		http_password_limited,
		webhook_urls,
		webhook_secret,
		lnaddress_domain: file.lnaddress_domain,
		mempool_space_url: file
			.mempool_space_url
			.unwrap_or_else(|| "https://mempool.space".to_string()),
		liquidity,
		log_level,
	})
}

/// Reads the node seed, generating and persisting fresh entropy on first
/// start. The seed-to-keys derivation is the engine's concern.
pub(crate) fn ensure_seed(path: &Path) -> io::Result<String> {
	if path.exists() {
		let seed = std::fs::read_to_string(path)?.trim().to_string();
		if seed.is_empty() {
			return Err(invalid_input(format!("seed file {} is empty", path.display())));
		}
		return Ok(seed);
	}
	let entropy: [u8; 32] = rand::thread_rng().gen();
	let seed = entropy.to_lower_hex_string();
	std::fs::write(path, format!("{}\n", seed))?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
	}
	Ok(seed)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn temp_dir(name: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("phoenixd-config-{}-{}", name, std::process::id()));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	fn args_for(dir: &Path) -> ArgsConfig {
		ArgsConfig { datadir: Some(dir.to_path_buf()), ..Default::default() }
	}

	#[test]
	fn first_start_generates_and_persists_secrets() {
		let dir = temp_dir("fresh");
		let config = load_config(&args_for(&dir)).unwrap();
		assert_eq!(config.chain, Chain::Mainnet);
		assert_eq!(config.http_bind_port, DEFAULT_HTTP_PORT);
		assert_eq!(config.http_password.len(), 32);

		// A second load reads the same secrets back.
		let reloaded = load_config(&args_for(&dir)).unwrap();
		assert_eq!(reloaded.http_password, config.http_password);
		assert_eq!(reloaded.http_password_limited, config.http_password_limited);
		assert_eq!(reloaded.webhook_secret, config.webhook_secret);
	}

	#[test]
	fn file_values_are_read_and_args_override() {
		let dir = temp_dir("file");
		std::fs::write(
			dir.join(CONFIG_FILE),
			r#"
chain = "testnet"
http_bind_port = 9741
http_password = "filepass"
http_password_limited = "readerpass"
webhook_secret = "hooksecret"
webhook_urls = ["https://example.com/hook"]
max_absolute_fee_sat = 50000
"#,
		)
		.unwrap();

		let config = load_config(&args_for(&dir)).unwrap();
		assert_eq!(config.chain, Chain::Testnet);
		assert_eq!(config.http_bind_port, 9741);
		assert_eq!(config.http_password, "filepass");
		assert_eq!(config.webhook_urls, vec!["https://example.com/hook".to_string()]);
		assert_eq!(config.liquidity.max_absolute_fee_sat, 50_000);

		let mut args = args_for(&dir);
		args.chain = Some(Chain::Regtest);
		args.http_bind_port = Some(9999);
		args.webhooks = vec!["https://other.example/hook".to_string()];
		let config = load_config(&args).unwrap();
		assert_eq!(config.chain, Chain::Regtest);
		assert_eq!(config.http_bind_port, 9999);
		assert_eq!(config.webhook_urls.len(), 2);
	}

	#[test]
	fn invalid_liquidity_settings_fail_startup() {
		let dir = temp_dir("liquidity");
		std::fs::write(dir.join(CONFIG_FILE), "max_absolute_fee_sat = 1000\n").unwrap();
		let err = load_config(&args_for(&dir)).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
	}

	#[test]
	fn seed_is_generated_once() {
		let dir = temp_dir("seed");
		let path = dir.join(SEED_FILE);
		let seed = ensure_seed(&path).unwrap();
		assert_eq!(seed.len(), 64);
		assert_eq!(ensure_seed(&path).unwrap(), seed);
	}
}
