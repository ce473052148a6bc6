//! Command-line interface for the broker binary.

// std
use std::path::PathBuf;
// crates.io
use clap::Parser;
// self
use crate::{config::BrokerConfig, error::ConfigError};

/// Consent-aware OAuth 2.0 gateway broker.
#[derive(Clone, Debug, Parser)]
#[command(name = "consent-broker", version, about)]
pub struct Cli {
	/// Configuration file (YAML, TOML, or JSON).
	#[arg(short, long, env = "CONSENT_BROKER_CONFIG")]
	pub config: Option<PathBuf>,
	/// Listen address; overrides `server.listen`.
	#[arg(short, long)]
	pub listen: Option<String>,
	/// Validate the configuration and exit.
	#[arg(long)]
	pub check: bool,
}
impl Cli {
	/// Loads configuration and applies command-line overrides.
	pub fn load_config(&self) -> Result<BrokerConfig, ConfigError> {
		let mut config = BrokerConfig::load(self.config.as_deref())?;

		if let Some(listen) = &self.listen {
			config.server.listen = listen.clone();
		}

		Ok(config)
	}
}
