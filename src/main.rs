//! Serve the REST interface over a directory.
use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use ldap_rest::{
	http::{self, AppState},
	Config, EntityService, LdapDirectory,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path of the YAML configuration file
	#[arg(short, long, default_value = "config.yaml")]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let args = Args::parse();
	let config: Config = serde_yaml::from_str(&tokio::fs::read_to_string(&args.config).await?)?;
	if !config.is_confidential() {
		warn!(url = %config.url, "Directory connection is not encrypted, passwords cannot be set");
	}

	let directory = Arc::new(LdapDirectory::new(config.clone()));
	let service = EntityService::new(directory, &config.base_dn);
	let state = AppState::new(service)
		.with_membership(config.membership)
		.with_directory_probe(config.http.probe_directory);

	let listener = tokio::net::TcpListener::bind(&config.http.address).await?;
	info!(address = %config.http.address, "Listening");
	axum::serve(listener, http::router(state)).await?;
	Ok(())
}
