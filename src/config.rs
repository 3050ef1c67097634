//! Configuration of the directory connection and the HTTP surface.
use std::{path::PathBuf, sync::Arc, time::Duration};

use ldap3::LdapConnSettings;
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DirectoryError;

/// Service configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
	/// The DN of the service account used for all operations
	pub bind_dn: String,
	/// The password of the service account
	pub bind_password: String,
	/// Root of the managed tree. Searches start here and relative paths are
	/// qualified against it.
	pub base_dn: String,
	/// Search tuning
	#[serde(default)]
	pub searches: Searches,
	/// How membership routes report no-op changes
	#[serde(default)]
	pub membership: MembershipConfig,
	/// The HTTP listener
	#[serde(default)]
	pub http: HttpConfig,
}

impl Config {
	/// Whether the connection encrypts traffic, either by being local (ldapi),
	/// using TLS on a dedicated port (ldaps) or upgrading with StartTLS.
	#[must_use]
	pub fn is_confidential(&self) -> bool {
		matches!(self.url.scheme(), "ldaps" | "ldapi") || self.connection.tls.starttls
	}
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// Timeout of a single LDAP operation in seconds. For searches this
	/// bounds each reply.
	pub operation_timeout: u64,

	/// How many more times a search is attempted after a transport failure.
	/// Writes are never retried.
	pub read_retries: u32,

	/// TLS config
	pub tls: TLSConfig,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self { timeout: 5, operation_timeout: 10, read_retries: 1, tls: TLSConfig::default() }
	}
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate to use for the connection
	pub client_certificate_path: Option<PathBuf>,
}

/// Search tuning
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Searches {
	/// If set, enables the [simple paged search control] and sets the page size
	/// to the given value
	///
	/// [simple paged search control]: https://www.rfc-editor.org/rfc/rfc2696.html
	#[serde(default)]
	pub page_size: Option<i32>,
}

/// How adding an existing member or removing an absent one is reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPolicy {
	/// Report `AlreadyMember` and `NotAMember` as errors
	#[default]
	Strict,
	/// Report them as successful no-ops
	Idempotent,
}

/// Membership policy per HTTP route.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
	/// Policy of `/groups/{group}/members/{account}`
	pub group_route: MembershipPolicy,
	/// Policy of `/accounts/{account}/groups/{group}`
	pub account_route: MembershipPolicy,
}

/// HTTP listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
	/// Address to listen on
	pub address: String,
	/// Whether the health endpoint checks that the directory is reachable
	pub probe_directory: bool,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self { address: "127.0.0.1:8080".to_owned(), probe_directory: false }
	}
}

impl ConnectionConfig {
	/// The operation timeout as a [`Duration`].
	#[must_use]
	pub fn operation_timeout(&self) -> Duration {
		Duration::from_secs(self.operation_timeout)
	}

	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, DirectoryError> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let mut roots = RootCertStore::empty();
			let pem = tokio::fs::read(path).await?;
			let certificates = rustls_pemfile::certs(&mut pem.as_slice())?;
			let (added, _) = roots.add_parsable_certificates(&certificates);
			if added == 0 {
				return Err(DirectoryError::Invalid("Could not read root certificate".to_owned()));
			}

			let builder =
				ClientConfig::builder().with_safe_defaults().with_root_certificates(roots);
			let config = match (&self.tls.client_key_path, &self.tls.client_certificate_path) {
				(Some(key_path), Some(cert_path)) => {
					let chain =
						rustls_pemfile::certs(&mut tokio::fs::read(cert_path).await?.as_slice())?
							.into_iter()
							.map(Certificate)
							.collect();
					let key = rustls_pemfile::pkcs8_private_keys(
						&mut tokio::fs::read(key_path).await?.as_slice(),
					)?
					.into_iter()
					.next()
					.map(PrivateKey)
					.ok_or_else(|| {
						DirectoryError::Invalid("Could not read client key".to_owned())
					})?;
					builder.with_client_auth_cert(chain, key).map_err(|_| {
						DirectoryError::Invalid("Could not read client certificates".to_owned())
					})?
				}
				(None, None) => builder.with_no_client_auth(),
				_ => Err(DirectoryError::Invalid(
					"Both a client certificate and key file in PKCS8 format must be specified"
						.to_owned(),
				))?,
			};
			settings = settings.set_config(Arc::new(config));
		}
		Ok(settings)
	}
}
