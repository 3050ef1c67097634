//! Client for connecting to LDAP and performing directory operations

use std::collections::HashSet;

use async_trait::async_trait;
use ldap3::{
	adapters::{Adapter, EntriesOnly, PagedResults},
	LdapConnAsync, Mod, Scope, SearchEntry,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
	config::Config,
	directory::{Change, Directory, NewEntry},
	error::DirectoryError,
	filter::Filter,
};

/// A [`Directory`] backed by an LDAP server.
///
/// A single bound session is shared by all requests; `ldap3` multiplexes
/// operations over it. The session is established lazily and dropped after a
/// transport failure so the next operation reconnects.
#[derive(Debug)]
pub struct LdapDirectory {
	/// The configuration of the LDAP client.
	config: Config,
	/// The current bound session, if any.
	session: RwLock<Option<ldap3::Ldap>>,
}

impl LdapDirectory {
	/// Create a client. No connection is made until the first operation.
	#[must_use]
	pub fn new(config: Config) -> Self {
		Self { config, session: RwLock::new(None) }
	}

	/// Create a connection to an ldap server based on the settings and url
	/// specified in the configuration, and bind with the service account.
	async fn connect(&self) -> Result<ldap3::Ldap, DirectoryError> {
		let settings = self.config.connection.to_settings().await?;
		debug!(url = %self.config.url, "Connecting to directory");
		let (conn, mut ldap) =
			LdapConnAsync::from_url_with_settings(settings, &self.config.url).await?;
		tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});

		let result = ldap
			.with_timeout(self.config.connection.operation_timeout())
			.simple_bind(&self.config.bind_dn, &self.config.bind_password)
			.await?;
		DirectoryError::check(result)?;
		info!(url = %self.config.url, "Directory session established");
		Ok(ldap)
	}

	/// Get a handle on the shared session, connecting if there is none.
	async fn session(&self) -> Result<ldap3::Ldap, DirectoryError> {
		if let Some(ldap) = self.session.read().await.as_ref() {
			return Ok(ldap.clone());
		}

		let mut session = self.session.write().await;
		if let Some(ldap) = session.as_ref() {
			return Ok(ldap.clone());
		}
		let ldap = self.connect().await?;
		*session = Some(ldap.clone());
		Ok(ldap)
	}

	/// Drop the shared session after a transport failure so the next
	/// operation starts afresh.
	async fn invalidate(&self, err: &DirectoryError) {
		if err.is_transport() {
			let stale = self.session.write().await.take();
			if let Some(mut ldap) = stale {
				warn!("Dropping directory session: {err}");
				if let Err(err) = ldap.unbind().await {
					debug!("Unbind after failure: {err}");
				}
			}
		}
	}

	/// Run a write, discarding the session if it failed in transit.
	async fn write<F, Fut>(&self, operation: F) -> Result<(), DirectoryError>
	where
		F: FnOnce(ldap3::Ldap) -> Fut + Send,
		Fut: std::future::Future<Output = Result<ldap3::LdapResult, ldap3::LdapError>> + Send,
	{
		let mut ldap = self.session().await?;
		ldap.with_timeout(self.config.connection.operation_timeout());
		let result = match operation(ldap).await {
			Ok(result) => DirectoryError::check(result),
			Err(err) => Err(DirectoryError::from(err)),
		};
		if let Err(err) = &result {
			self.invalidate(err).await;
		}
		result
	}

	/// Perform one search attempt.
	async fn search_once(
		&self,
		base: &str,
		scope: Scope,
		filter: &str,
		attributes: &[String],
	) -> Result<Vec<SearchEntry>, DirectoryError> {
		let mut ldap = self.session().await?;

		// Prepare search parameters
		let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
		if let Some(page_size) = self.config.searches.page_size {
			adapters.push(Box::new(PagedResults::new(page_size)));
		}

		let mut search = ldap
			.with_timeout(self.config.connection.operation_timeout())
			.streaming_search_with(adapters, base, scope, filter, attributes.to_vec())
			.await?;

		let mut entries = Vec::new();
		while let Some(entry) = search.next().await?.map(SearchEntry::construct) {
			entries.push(entry);
		}
		match DirectoryError::check(search.finish().await) {
			Ok(()) => Ok(entries),
			// The base does not exist, so nothing below it does either
			Err(DirectoryError::NotFound) => Ok(vec![]),
			Err(err) => Err(err),
		}
	}
}

/// Convert textual values for the wire.
fn values(values: Vec<String>) -> HashSet<Vec<u8>> {
	values.into_iter().map(String::into_bytes).collect()
}

/// Convert a [`Change`] to the `ldap3` representation.
fn modification(change: Change) -> Mod<Vec<u8>> {
	match change {
		Change::Replace(attr, vals) => Mod::Replace(attr.into_bytes(), values(vals)),
		Change::Add(attr, vals) => Mod::Add(attr.into_bytes(), values(vals)),
		Change::Delete(attr, vals) => Mod::Delete(attr.into_bytes(), values(vals)),
		Change::ReplaceBinary(attr, value) => {
			Mod::Replace(attr.into_bytes(), HashSet::from([value]))
		}
	}
}

#[async_trait]
impl Directory for LdapDirectory {
	async fn search(
		&self,
		base: &str,
		scope: Scope,
		filter: &Filter,
		attributes: &[String],
	) -> Result<Vec<SearchEntry>, DirectoryError> {
		let filter = filter.to_string();
		debug!(base, %filter, "Searching directory");
		let mut attempt = 0;
		loop {
			match self.search_once(base, scope, &filter, attributes).await {
				Ok(entries) => return Ok(entries),
				Err(err) if err.is_transport() && attempt < self.config.connection.read_retries => {
					self.invalidate(&err).await;
					attempt += 1;
					warn!("Search failed, retrying ({attempt}): {err}");
				}
				Err(err) => {
					self.invalidate(&err).await;
					return Err(err);
				}
			}
		}
	}

	async fn add(&self, entry: NewEntry) -> Result<(), DirectoryError> {
		debug!(?entry, "Adding entry");
		let NewEntry { dn, attributes, binary } = entry;
		let mut attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> =
			attributes.into_iter().map(|(name, vals)| (name.into_bytes(), values(vals))).collect();
		attrs.extend(
			binary.into_iter().map(|(name, value)| (name.into_bytes(), HashSet::from([value]))),
		);
		self.write(|mut ldap| async move { ldap.add(&dn, attrs).await }).await
	}

	async fn modify(&self, dn: &str, changes: Vec<Change>) -> Result<(), DirectoryError> {
		debug!(dn, ?changes, "Modifying entry");
		let mods: Vec<Mod<Vec<u8>>> = changes.into_iter().map(modification).collect();
		self.write(|mut ldap| async move { ldap.modify(dn, mods).await }).await
	}

	async fn move_entry(
		&self,
		dn: &str,
		new_rdn: &str,
		new_parent: Option<&str>,
	) -> Result<(), DirectoryError> {
		debug!(dn, new_rdn, ?new_parent, "Moving entry");
		self.write(|mut ldap| async move { ldap.modifydn(dn, new_rdn, true, new_parent).await })
			.await
	}

	async fn delete(&self, dn: &str) -> Result<(), DirectoryError> {
		debug!(dn, "Deleting entry");
		self.write(|mut ldap| async move { ldap.delete(dn).await }).await
	}

	fn is_confidential(&self) -> bool {
		self.config.is_confidential()
	}

	async fn probe(&self) -> Result<(), DirectoryError> {
		let filter = Filter::present("objectClass");
		self.search(&self.config.base_dn, Scope::Base, &filter, &["1.1".to_owned()])
			.await
			.map(|_| ())
	}
}
