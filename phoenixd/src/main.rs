// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

mod api;
mod events;
mod io;
mod liquidity;
mod node;
mod service;
mod supervisor;
mod types;
mod util;
mod webhook;

use std::sync::Arc;

use clap::Parser;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;

use crate::api::Context;
use crate::events::EventsBus;
use crate::io::{db_file_name, PaymentsDb};
use crate::node::fees::MempoolSpaceClient;
use crate::node::mock::MockEngine;
use crate::node::resolver::HttpResolver;
use crate::node::NodeEngine;
use crate::service::{ApiService, Auth};
use crate::supervisor::PeerSupervisor;
use crate::types::Chain;
use crate::util::config::{ensure_seed, load_config, ArgsConfig};
use crate::util::Shutdown;
use crate::webhook::WebhookNotifier;

fn main() {
	let args = ArgsConfig::parse();
	let config = match load_config(&args) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Invalid configuration: {}", e);
			std::process::exit(1);
		},
	};

	let log_file = match std::fs::OpenOptions::new()
		.create(true)
		.append(true)
		.open(config.log_path())
	{
		Ok(file) => file,
		Err(e) => {
			eprintln!("Cannot open log file {}: {}", config.log_path().display(), e);
			std::process::exit(1);
		},
	};
	env_logger::Builder::new()
		.filter_level(config.log_level)
		.target(env_logger::Target::Pipe(Box::new(log_file)))
		.init();

	// The engine derives its keys from the seed; this daemon only guards the
	// file.
	if let Err(e) = ensure_seed(&config.seed_path()) {
		eprintln!("Cannot read seed: {}", e);
		std::process::exit(1);
	}

	// Only the in-memory engine backend is linked into this build; it backs
	// regtest development runs.
	let engine: Arc<dyn NodeEngine> = match config.chain {
		Chain::Regtest => Arc::new(MockEngine::new()),
		chain => {
			eprintln!("No Lightning engine backend is available for {} in this build", chain);
			std::process::exit(1);
		},
	};
	engine.set_liquidity_policy(config.liquidity);

	let db_path = config.data_dir.join(db_file_name(config.chain, &engine.node_id()));
	let db = match PaymentsDb::open(&db_path) {
		Ok(db) => Arc::new(db),
		Err(e) => {
			eprintln!("Cannot open payments database {}: {}", db_path.display(), e);
			std::process::exit(1);
		},
	};

	match db.get_oldest_received_date() {
		Ok(Some(oldest)) => info!("Payment history starts at {}", oldest),
		Ok(None) => info!("No payments recorded yet"),
		Err(e) => {
			eprintln!("Payments database is unreadable: {}", e);
			std::process::exit(1);
		},
	}

	println!("NODE_ID: {}", engine.node_id());
	println!("DATADIR: {}", config.data_dir.display());

	let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(e) => {
			eprintln!("Failed to setup tokio runtime: {}", e);
			std::process::exit(1);
		},
	};

	runtime.block_on(async {
		let shutdown = Shutdown::new();
		let bus = EventsBus::new();
		let webhooks = Arc::new(WebhookNotifier::new(
			config.webhook_urls.clone(),
			config.webhook_secret.clone(),
		));
		let supervisor = Arc::new(PeerSupervisor::new(
			Arc::clone(&engine),
			Arc::clone(&db),
			bus.clone(),
			webhooks,
			shutdown.clone(),
		));

		supervisor.run_maintenance();

		let (ready_tx, mut ready_rx) = watch::channel(false);
		let reconnect_supervisor = Arc::clone(&supervisor);
		tokio::spawn(async move { reconnect_supervisor.run_reconnect_loop(ready_tx).await });
		let events_supervisor = Arc::clone(&supervisor);
		tokio::spawn(async move { events_supervisor.run_event_loop().await });

		let mut sigterm_stream = match tokio::signal::unix::signal(SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				eprintln!("Failed to register for SIGTERM stream: {}", e);
				std::process::exit(1);
			},
		};

		// Serve only once the peer link came up at least once, but stay
		// responsive to signals while waiting.
		tokio::select! {
			_ = ready_rx.wait_for(|ready| *ready) => {},
			_ = tokio::signal::ctrl_c() => {
				shutdown.trigger();
				return;
			},
			_ = sigterm_stream.recv() => {
				shutdown.trigger();
				return;
			},
		}

		let context = Context {
			engine: Arc::clone(&engine),
			db: Arc::clone(&db),
			resolver: Arc::new(HttpResolver::new()),
			fee_oracle: Arc::new(MempoolSpaceClient::new(config.mempool_space_url.clone())),
			bus: bus.clone(),
			chain: config.chain,
			data_dir: config.data_dir.clone(),
			lnaddress_domain: config.lnaddress_domain.clone(),
			shutdown: shutdown.clone(),
		};
		let auth = Arc::new(Auth::new(
			config.http_password.clone(),
			config.http_password_limited.clone(),
		));

		let bind_addr = (config.http_bind_ip, config.http_bind_port);
		let listener = match TcpListener::bind(bind_addr).await {
			Ok(listener) => listener,
			Err(e) => {
				eprintln!("Failed to bind {}:{}: {}", bind_addr.0, bind_addr.1, e);
				std::process::exit(1);
			},
		};
		info!("HTTP API listening on {}:{}", bind_addr.0, bind_addr.1);
		println!("LISTENING: {}:{}", bind_addr.0, bind_addr.1);

		let graceful = GracefulShutdown::new();
		loop {
			tokio::select! {
				result = listener.accept() => match result {
					Ok((stream, _)) => {
						let service = ApiService::new(context.clone(), Arc::clone(&auth));
						let conn = http1::Builder::new()
							.serve_connection(TokioIo::new(stream), service)
							.with_upgrades();
						let conn = graceful.watch(conn);
						tokio::spawn(async move {
							if let Err(e) = conn.await {
								debug!("Connection ended with error: {}", e);
							}
						});
					},
					Err(e) => error!("Failed to accept connection: {}", e),
				},
				_ = tokio::signal::ctrl_c() => {
					info!("Received CTRL-C, shutting down");
					break;
				},
				_ = sigterm_stream.recv() => {
					info!("Received SIGTERM, shutting down");
					break;
				},
			}
		}

		// Stop the supervisor first (it disconnects the peer), then drain
		// in-flight HTTP requests.
		shutdown.trigger();
		tokio::select! {
			_ = graceful.shutdown() => {},
			_ = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
				warn!("Timed out waiting for open connections to finish");
			},
		}
	});

	println!("Shutdown complete");
}
