//! A directory held in memory.
//!
//! [`InMemoryDirectory`] implements [`Directory`] with the same outcomes a
//! server reports, including the behaviours of Active Directory this service
//! depends on: deleting an entry with children is refused, moving an entry
//! moves its whole subtree, and `member` values follow entries that are moved
//! or deleted. It backs the test suite and can be used to run the HTTP
//! surface without a server.
use std::{
	collections::{BTreeMap, HashMap},
	sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
	directory::{Change, Directory, NewEntry, Scope, SearchEntry},
	dn,
	entry::{SearchEntryExt, TIME_FORMAT},
	error::DirectoryError,
	filter::Filter,
};

/// An in-memory directory tree.
#[derive(Debug)]
pub struct InMemoryDirectory {
	/// Entries keyed by their lower-cased canonical name
	entries: RwLock<BTreeMap<String, SearchEntry>>,
	/// Reported by [`Directory::is_confidential`]
	confidential: AtomicBool,
	/// When unset every operation fails as if the server were down
	reachable: AtomicBool,
}

impl InMemoryDirectory {
	/// Create a tree holding only its root entry.
	#[must_use]
	pub fn new(base_dn: &str) -> Self {
		let base_dn = dn::normalize(base_dn);
		let dc = dn::rdn(&base_dn)
			.and_then(|rdn| rdn.split_once('='))
			.map(|(_, value)| value.to_owned())
			.unwrap_or_default();
		let root = SearchEntry {
			dn: base_dn.clone(),
			attrs: HashMap::from([
				(
					"objectClass".to_owned(),
					vec!["top".to_owned(), "domain".to_owned(), "domainDNS".to_owned()],
				),
				("dc".to_owned(), vec![dc]),
			]),
			bin_attrs: HashMap::new(),
		};
		Self {
			entries: RwLock::new(BTreeMap::from([(key(&base_dn), root)])),
			confidential: AtomicBool::new(true),
			reachable: AtomicBool::new(true),
		}
	}

	/// Set whether the directory reports an encrypted connection.
	#[must_use]
	pub fn with_confidentiality(self, confidential: bool) -> Self {
		self.confidential.store(confidential, Ordering::SeqCst);
		self
	}

	/// Simulate the server going away or coming back.
	pub fn set_reachable(&self, reachable: bool) {
		self.reachable.store(reachable, Ordering::SeqCst);
	}

	/// Fetch an entry including binary attributes, bypassing search.
	pub async fn entry(&self, dn: &str) -> Option<SearchEntry> {
		self.entries.read().await.get(&key(dn)).cloned()
	}

	/// Add a raw entry, e.g. one of a kind this service does not manage.
	pub async fn seed(
		&self,
		dn: &str,
		attributes: &[(&str, &[&str])],
	) -> Result<(), DirectoryError> {
		let attributes = attributes
			.iter()
			.map(|(name, values)| {
				((*name).to_owned(), values.iter().map(|value| (*value).to_owned()).collect())
			})
			.collect();
		self.add(NewEntry { dn: dn.to_owned(), attributes, binary: vec![] }).await
	}

	/// Fail unless the server is "up".
	fn ensure_reachable(&self) -> Result<(), DirectoryError> {
		if self.reachable.load(Ordering::SeqCst) {
			Ok(())
		} else {
			Err(DirectoryError::Unavailable("connection refused".to_owned()))
		}
	}
}

/// Map key of an entry.
fn key(dn: &str) -> String {
	dn::normalize(dn).to_ascii_lowercase()
}

/// The current time in generalized time syntax.
fn timestamp() -> Option<String> {
	OffsetDateTime::now_utc().format(&TIME_FORMAT).ok()
}

/// Name under which an attribute is stored, if present.
fn stored_name(entry: &SearchEntry, attr: &str) -> Option<String> {
	entry.attrs.keys().find(|name| name.eq_ignore_ascii_case(attr)).cloned()
}

/// Whether two attribute values are equal for matching purposes.
fn same_value(a: &str, b: &str) -> bool {
	a.eq_ignore_ascii_case(b) || (a.contains('=') && b.contains('=') && dn::same(a, b))
}

/// Apply a single change to an entry.
fn apply(entry: &mut SearchEntry, change: Change) -> Result<(), DirectoryError> {
	match change {
		Change::Replace(attr, values) => {
			if let Some(name) = stored_name(entry, &attr) {
				entry.attrs.remove(&name);
			}
			if !values.is_empty() {
				entry.attrs.insert(attr, values);
			}
		}
		Change::Add(attr, values) => {
			let name = stored_name(entry, &attr).unwrap_or(attr);
			let current = entry.attrs.entry(name).or_default();
			if values.iter().any(|value| current.iter().any(|v| same_value(v, value))) {
				return Err(DirectoryError::ValueExists);
			}
			current.extend(values);
		}
		Change::Delete(attr, values) => {
			let name = stored_name(entry, &attr).ok_or(DirectoryError::NoSuchValue)?;
			if values.is_empty() {
				entry.attrs.remove(&name);
				return Ok(());
			}
			let current = entry.attrs.entry(name.clone()).or_default();
			for value in &values {
				let position = current
					.iter()
					.position(|v| same_value(v, value))
					.ok_or(DirectoryError::NoSuchValue)?;
				current.remove(position);
			}
			if current.is_empty() {
				entry.attrs.remove(&name);
			}
		}
		Change::ReplaceBinary(attr, value) => {
			entry.bin_attrs.insert(attr, vec![value]);
		}
	}
	Ok(())
}

/// Restrict an entry to the requested attributes, as a search result.
fn project(entry: &SearchEntry, attributes: &[String]) -> SearchEntry {
	let all = attributes.is_empty() || attributes.iter().any(|attr| attr == "*");
	let attrs = entry
		.attrs
		.iter()
		.filter(|(name, _)| all || attributes.iter().any(|attr| attr.eq_ignore_ascii_case(name)))
		.map(|(name, values)| (name.clone(), values.clone()))
		.collect();
	SearchEntry { dn: entry.dn.clone(), attrs, bin_attrs: HashMap::new() }
}

/// Rewrite `member` values after the subtree at `old` moved to `new`.
fn rebase_members(entries: &mut BTreeMap<String, SearchEntry>, old: &str, new: &str) {
	for entry in entries.values_mut() {
		if let Some(name) = stored_name(entry, "member") {
			if let Some(members) = entry.attrs.get_mut(&name) {
				for member in members.iter_mut() {
					if let Some(moved) = dn::rebase(member, old, new) {
						*member = moved;
					}
				}
			}
		}
	}
}

#[async_trait]
impl Directory for InMemoryDirectory {
	async fn search(
		&self,
		base: &str,
		scope: Scope,
		filter: &Filter,
		attributes: &[String],
	) -> Result<Vec<SearchEntry>, DirectoryError> {
		self.ensure_reachable()?;
		let entries = self.entries.read().await;
		let base_key = key(base);
		if !entries.contains_key(&base_key) {
			return Ok(vec![]);
		}
		Ok(entries
			.iter()
			.filter(|(entry_key, entry)| match scope {
				Scope::Base => **entry_key == base_key,
				Scope::OneLevel => {
					dn::parent(&entry.dn).is_some_and(|parent| key(&parent) == base_key)
				}
				Scope::Subtree => dn::is_within(&entry.dn, base),
			})
			.filter(|(_, entry)| filter.matches(entry))
			.map(|(_, entry)| project(entry, attributes))
			.collect())
	}

	async fn add(&self, new: NewEntry) -> Result<(), DirectoryError> {
		self.ensure_reachable()?;
		let mut entries = self.entries.write().await;
		let entry_key = key(&new.dn);
		if entries.contains_key(&entry_key) {
			return Err(DirectoryError::AlreadyExists);
		}
		let parent = dn::parent(&new.dn).ok_or(DirectoryError::NotFound)?;
		if !entries.contains_key(&key(&parent)) {
			return Err(DirectoryError::NotFound);
		}

		let mut entry = SearchEntry {
			dn: dn::normalize(&new.dn),
			attrs: new.attributes.into_iter().collect(),
			bin_attrs: new.binary.into_iter().map(|(name, value)| (name, vec![value])).collect(),
		};
		if let Some(now) = timestamp() {
			entry.attrs.insert("whenCreated".to_owned(), vec![now.clone()]);
			entry.attrs.insert("whenChanged".to_owned(), vec![now]);
		}
		entries.insert(entry_key, entry);
		Ok(())
	}

	async fn modify(&self, dn: &str, changes: Vec<Change>) -> Result<(), DirectoryError> {
		self.ensure_reachable()?;
		let mut entries = self.entries.write().await;
		let entry = entries.get_mut(&key(dn)).ok_or(DirectoryError::NotFound)?;

		let mut updated = entry.clone();
		for change in changes {
			apply(&mut updated, change)?;
		}
		if let Some(now) = timestamp() {
			updated.attrs.insert("whenChanged".to_owned(), vec![now]);
		}
		*entry = updated;
		Ok(())
	}

	async fn move_entry(
		&self,
		dn: &str,
		new_rdn: &str,
		new_parent: Option<&str>,
	) -> Result<(), DirectoryError> {
		self.ensure_reachable()?;
		let mut entries = self.entries.write().await;
		let old = entries.get(&key(dn)).ok_or(DirectoryError::NotFound)?.dn.clone();
		let parent = match new_parent {
			Some(parent) => dn::normalize(parent),
			None => dn::parent(&old).ok_or(DirectoryError::TargetInvalid)?,
		};
		if !entries.contains_key(&key(&parent)) || dn::is_within(&parent, &old) {
			return Err(DirectoryError::TargetInvalid);
		}
		let new = format!("{},{parent}", dn::normalize(new_rdn));
		if entries.contains_key(&key(&new)) {
			return Err(DirectoryError::AlreadyExists);
		}

		let subtree: Vec<String> = entries
			.iter()
			.filter(|(_, entry)| dn::is_within(&entry.dn, &old))
			.map(|(entry_key, _)| entry_key.clone())
			.collect();
		for entry_key in subtree {
			if let Some(mut entry) = entries.remove(&entry_key) {
				if let Some(moved) = dn::rebase(&entry.dn, &old, &new) {
					entry.dn = moved;
				}
				entries.insert(key(&entry.dn), entry);
			}
		}
		rebase_members(&mut entries, &old, &new);
		Ok(())
	}

	async fn delete(&self, dn: &str) -> Result<(), DirectoryError> {
		self.ensure_reachable()?;
		let mut entries = self.entries.write().await;
		let entry_key = key(dn);
		if !entries.contains_key(&entry_key) {
			return Err(DirectoryError::NotFound);
		}
		let has_children = entries
			.values()
			.any(|entry| dn::parent(&entry.dn).is_some_and(|parent| key(&parent) == entry_key));
		if has_children {
			return Err(DirectoryError::NotAllowedOnNonLeaf);
		}
		entries.remove(&entry_key);

		for entry in entries.values_mut() {
			if let Some(name) = stored_name(entry, "member") {
				if let Some(members) = entry.attrs.get_mut(&name) {
					members.retain(|member| !dn::same(member, dn));
				}
			}
		}
		Ok(())
	}

	fn is_confidential(&self) -> bool {
		self.confidential.load(Ordering::SeqCst)
	}

	async fn probe(&self) -> Result<(), DirectoryError> {
		self.ensure_reachable()
	}
}
