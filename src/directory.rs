//! The operations this service needs from a directory.
//!
//! [`Directory`] is implemented by [`crate::ldap::LdapDirectory`] for real
//! servers and by [`crate::memory::InMemoryDirectory`] for tests.
use std::fmt;

use async_trait::async_trait;
pub use ldap3::{Scope, SearchEntry};

use crate::{error::DirectoryError, filter::Filter};

/// A change to one attribute of an entry.
#[derive(Clone, PartialEq, Eq)]
pub enum Change {
	/// Replace all values. An empty list removes the attribute.
	Replace(String, Vec<String>),
	/// Add values, failing if any is already present.
	Add(String, Vec<String>),
	/// Remove values, failing if any is absent. An empty list removes the
	/// attribute.
	Delete(String, Vec<String>),
	/// Replace the value of a binary attribute.
	ReplaceBinary(String, Vec<u8>),
}

impl fmt::Debug for Change {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Replace(attr, values) => {
				f.debug_tuple("Replace").field(attr).field(values).finish()
			}
			Self::Add(attr, values) => f.debug_tuple("Add").field(attr).field(values).finish(),
			Self::Delete(attr, values) => {
				f.debug_tuple("Delete").field(attr).field(values).finish()
			}
			Self::ReplaceBinary(attr, _) => {
				f.debug_tuple("ReplaceBinary").field(attr).field(&"<redacted>").finish()
			}
		}
	}
}

/// An entry to be added.
#[derive(Clone, PartialEq, Eq)]
pub struct NewEntry {
	/// Name of the new entry
	pub dn: String,
	/// Textual attributes
	pub attributes: Vec<(String, Vec<String>)>,
	/// Binary attributes, such as credentials
	pub binary: Vec<(String, Vec<u8>)>,
}

impl NewEntry {
	/// The values of a textual attribute.
	#[must_use]
	pub fn get(&self, attr: &str) -> Option<&[String]> {
		self.attributes
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(attr))
			.map(|(_, values)| values.as_slice())
	}
}

impl fmt::Debug for NewEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NewEntry")
			.field("dn", &self.dn)
			.field("attributes", &self.attributes)
			.field("binary", &self.binary.iter().map(|(name, _)| name).collect::<Vec<_>>())
			.finish()
	}
}

/// A directory server. Every call is a single atomic operation on the server;
/// no call is retried by callers of this trait, implementations decide
/// whether reads are retried.
#[async_trait]
pub trait Directory: Send + Sync + fmt::Debug {
	/// Find entries under `base`. A base that does not exist yields no
	/// entries.
	async fn search(
		&self,
		base: &str,
		scope: Scope,
		filter: &Filter,
		attributes: &[String],
	) -> Result<Vec<SearchEntry>, DirectoryError>;

	/// Create an entry.
	async fn add(&self, entry: NewEntry) -> Result<(), DirectoryError>;

	/// Apply changes to an entry atomically.
	async fn modify(&self, dn: &str, changes: Vec<Change>) -> Result<(), DirectoryError>;

	/// Rename an entry and optionally move it below a new parent.
	async fn move_entry(
		&self,
		dn: &str,
		new_rdn: &str,
		new_parent: Option<&str>,
	) -> Result<(), DirectoryError>;

	/// Remove a leaf entry.
	async fn delete(&self, dn: &str) -> Result<(), DirectoryError>;

	/// Whether traffic to the directory is encrypted, which is required for
	/// sending credentials.
	fn is_confidential(&self) -> bool;

	/// Check that the directory is reachable and accepts the configured
	/// credentials.
	async fn probe(&self) -> Result<(), DirectoryError>;
}
