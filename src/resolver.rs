//! Resolution of human facing keys to distinguished names.
use std::sync::Arc;

use tracing::debug;

use crate::{
	directory::{Directory, Scope, SearchEntry},
	dn,
	entry::SearchEntryExt,
	error::{Error, TargetProblem},
	filter::Filter,
	kind::{EntityKind, CONTAINER_CLASSES},
};

/// Finds entities by key and checks candidate parents.
#[derive(Debug, Clone)]
pub struct PathResolver {
	/// Directory to search
	directory: Arc<dyn Directory>,
	/// Root of the managed tree
	base_dn: String,
}

impl PathResolver {
	/// Create a resolver searching below `base_dn`.
	#[must_use]
	pub fn new(directory: Arc<dyn Directory>, base_dn: &str) -> Self {
		Self { directory, base_dn: dn::normalize(base_dn) }
	}

	/// Root of the managed tree.
	#[must_use]
	pub fn base_dn(&self) -> &str {
		&self.base_dn
	}

	/// Find the single entity of `kind` with `key`, searching only below
	/// `parent_hint` if given. A key matching more than one entity is an
	/// error; the caller has to narrow it down with a hint.
	pub async fn find(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
	) -> Result<SearchEntry, Error> {
		let base = match parent_hint {
			Some(hint) => dn::qualify(hint, &self.base_dn),
			None => self.base_dn.clone(),
		};
		self.lookup(kind, key, &base, Scope::Subtree).await
	}

	/// Find the entity of `kind` with `key` among the direct children of
	/// `parent`. Entities further down the tree are not considered.
	pub async fn find_child(
		&self,
		kind: EntityKind,
		key: &str,
		parent: &str,
	) -> Result<SearchEntry, Error> {
		let parent = dn::qualify(parent, &self.base_dn);
		self.lookup(kind, key, &parent, Scope::OneLevel).await
	}

	/// Search `base` with `scope` for the entity of `kind` with `key`.
	async fn lookup(
		&self,
		kind: EntityKind,
		key: &str,
		base: &str,
		scope: Scope,
	) -> Result<SearchEntry, Error> {
		let key = key.trim();
		if key.is_empty() {
			return Err(Error::Validation(format!("An empty key cannot identify a {kind}")));
		}
		let filter = kind.filter().and(Filter::equal(kind.schema().key_attribute, key));
		let mut entries = self.directory.search(base, scope, &filter, &kind.attributes()).await?;
		debug!(%kind, key, base, ?scope, found = entries.len(), "Resolved key");

		match entries.len() {
			0 => Err(Error::NotFound { kind, key: key.to_owned() }),
			1 => entries.pop().ok_or_else(|| Error::NotFound { kind, key: key.to_owned() }),
			count => Err(Error::Ambiguous { kind, key: key.to_owned(), count }),
		}
	}

	/// Resolve a key to the distinguished name of its entity.
	pub async fn resolve(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
	) -> Result<String, Error> {
		Ok(self.find(kind, key, parent_hint).await?.dn)
	}

	/// Read the entity of `kind` at a distinguished name, if there is one.
	pub async fn read(&self, kind: EntityKind, dn: &str) -> Result<Option<SearchEntry>, Error> {
		let mut entries =
			self.directory.search(dn, Scope::Base, &kind.filter(), &kind.attributes()).await?;
		Ok(entries.pop())
	}

	/// Check that `path` names an existing container that can receive
	/// `moving`, and return its qualified name.
	pub async fn validate_container(
		&self,
		path: &str,
		moving: Option<&str>,
	) -> Result<String, Error> {
		let target = dn::qualify(path, &self.base_dn);
		let invalid = |reason| Error::MoveTargetInvalid { path: path.to_owned(), reason };

		if moving.is_some_and(|dn| dn::is_within(&target, dn)) {
			return Err(invalid(TargetProblem::InsideSelf));
		}
		let filter = Filter::present("objectClass");
		let attributes = ["objectClass".to_owned()];
		let entries = self.directory.search(&target, Scope::Base, &filter, &attributes).await?;
		let entry = entries.first().ok_or_else(|| invalid(TargetProblem::Missing))?;
		if !CONTAINER_CLASSES.iter().any(|class| entry.has_object_class(class)) {
			return Err(invalid(TargetProblem::NotAContainer));
		}
		Ok(target)
	}
}
