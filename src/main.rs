//! `consent-broker` binary: load configuration, validate it, and serve.

// std
use std::{error::Error as StdError, process, sync::Arc};
// crates.io
use clap::Parser;
use tokio::net::TcpListener;
// self
use oauth2_consent_broker::{cli::Cli, obs, server};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let config = match cli.load_config() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Failed to load configuration: {}", report(&e));
			process::exit(1);
		},
	};

	obs::init_logging(&config.logging.level);

	if let Err(e) = config.validate() {
		tracing::error!(error = %report(&e), "Invalid configuration.");
		process::exit(1);
	}
	if cli.check {
		tracing::info!("Configuration is valid.");

		return;
	}

	let gateway = match config.build_gateway() {
		Ok(gateway) => gateway,
		Err(e) => {
			tracing::error!(error = %report(&e), "Failed to initialize the broker.");
			process::exit(1);
		},
	};
	let listener = match TcpListener::bind(&config.server.listen).await {
		Ok(listener) => listener,
		Err(e) => {
			tracing::error!(listen = %config.server.listen, error = %e, "Failed to bind.");
			process::exit(1);
		},
	};

	if let Err(e) = server::serve(listener, Arc::new(gateway)).await {
		tracing::error!(error = %report(&e), "Server error.");
		process::exit(1);
	}
}

fn report(err: &dyn StdError) -> String {
	let mut message = err.to_string();
	let mut source = err.source();

	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());
		source = cause.source();
	}

	message
}
