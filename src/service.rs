//! The entity operations.
//!
//! [`EntityService`] resolves keys, validates requests and turns them into
//! directory operations. It holds no state of its own between calls; every
//! answer comes from the directory.
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
	audit::{self, Action},
	config::MembershipPolicy,
	directory::{Change, Directory, Scope, SearchEntry},
	dn,
	entry::SearchEntryExt,
	error::{DirectoryError, Error, TargetProblem},
	filter::Filter,
	kind::EntityKind,
	mapper::{self, CreateRequest, EntityView, Step, UpdateRequest, PASSWORD_ATTRIBUTE},
	pagination::{self, Page, PageRequest},
	resolver::PathResolver,
};

/// The effect of a membership call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
	/// The account was added
	Added,
	/// The account was removed
	Removed,
	/// Nothing changed, which is only reported under
	/// [`MembershipPolicy::Idempotent`]
	Unchanged,
}

/// Create, read, update, move and delete entities, and manage group
/// membership.
#[derive(Debug, Clone)]
pub struct EntityService {
	/// The directory holding all state
	directory: Arc<dyn Directory>,
	/// Key resolution against the same directory
	resolver: PathResolver,
}

impl EntityService {
	/// Create a service managing the tree below `base_dn`.
	#[must_use]
	pub fn new(directory: Arc<dyn Directory>, base_dn: &str) -> Self {
		let resolver = PathResolver::new(directory.clone(), base_dn);
		Self { directory, resolver }
	}

	/// Root of the managed tree.
	#[must_use]
	pub fn base_dn(&self) -> &str {
		self.resolver.base_dn()
	}

	/// Create an entity and return its distinguished name.
	///
	/// An existing entity with the same key in the target parent is reported
	/// as a conflict before anything is written. That check can race with a
	/// concurrent create; the directory refusing the add is the final word
	/// and is reported the same way.
	pub async fn create(&self, kind: EntityKind, request: &CreateRequest) -> Result<String, Error> {
		let key = request
			.attributes
			.iter()
			.find(|(attr, _)| attr.eq_ignore_ascii_case(kind.schema().key_attribute))
			.map(|(_, value)| value.to_directory())
			.unwrap_or_default();
		let result = self.create_entity(kind, &key, request).await;
		audit::record(Action::Create, kind, &key, &result);
		result
	}

	/// [`Self::create`] without the audit trail.
	async fn create_entity(
		&self,
		kind: EntityKind,
		key: &str,
		request: &CreateRequest,
	) -> Result<String, Error> {
		let confidential = self.directory.is_confidential();
		let entry = mapper::to_create_request(kind, request, self.base_dn(), confidential)?;
		let parent = dn::parent(&entry.dn).unwrap_or_else(|| self.base_dn().to_owned());
		let parent = match self.resolver.validate_container(&parent, None).await {
			Ok(parent) => parent,
			Err(Error::MoveTargetInvalid { path, reason }) => {
				return Err(Error::Validation(format!("Cannot create below '{path}': {reason}")));
			}
			Err(err) => return Err(err),
		};

		match self.resolver.find_child(kind, key, &parent).await {
			Ok(_) | Err(Error::Ambiguous { .. }) => {
				return Err(Error::Conflict { kind, key: key.to_owned() });
			}
			Err(Error::NotFound { .. }) => {}
			Err(err) => return Err(err),
		}

		let dn = entry.dn.clone();
		self.directory.add(entry).await.map_err(|err| write_error(kind, key, err))?;
		info!(%kind, dn, "Created entity");
		Ok(dn)
	}

	/// Read an entity by key, with the groups it belongs to.
	pub async fn get(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
	) -> Result<EntityView, Error> {
		let entry = self.resolver.find(kind, key, parent_hint).await?;
		self.view(kind, &entry).await
	}

	/// Read an entity by distinguished name, with the groups it belongs to.
	pub async fn read(&self, kind: EntityKind, dn: &str) -> Result<EntityView, Error> {
		let entry = self
			.resolver
			.read(kind, dn)
			.await?
			.ok_or_else(|| Error::NotFound { kind, key: dn.to_owned() })?;
		self.view(kind, &entry).await
	}

	/// List entities of a kind, optionally only those where one of the
	/// identifying attributes contains `search`. Group memberships are not
	/// resolved for listed entities.
	pub async fn list(
		&self,
		kind: EntityKind,
		search: Option<&str>,
		page: PageRequest,
	) -> Result<Page<EntityView>, Error> {
		page.validate()?;
		let mut filter = kind.filter();
		if let Some(term) = search.map(str::trim).filter(|term| !term.is_empty()) {
			let any =
				kind.schema().searchable.iter().map(|attr| Filter::contains(*attr, term)).collect();
			filter = filter.and(Filter::Or(any));
		}

		let attributes = kind.attributes();
		let entries =
			self.directory.search(self.base_dn(), Scope::Subtree, &filter, &attributes).await?;
		let views: Vec<EntityView> =
			entries.iter().filter_map(|entry| mapper::to_wire(kind, entry)).collect();
		pagination::paginate(views, page, |view: &EntityView| (view.key.as_str(), view.dn.as_str()))
	}

	/// Apply a partial update.
	///
	/// The steps of the update are applied in order and each is atomic on its
	/// own. When a step fails after others were applied, the applied steps stay
	/// in place and [`Error::PartialUpdate`] names them, so that only the
	/// remainder has to be retried.
	pub async fn update(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
		request: &UpdateRequest,
	) -> Result<EntityView, Error> {
		let result = self.update_entity(kind, key, parent_hint, request).await;
		audit::record(Action::Update, kind, key, &result);
		result
	}

	/// [`Self::update`] without the audit trail.
	async fn update_entity(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
		request: &UpdateRequest,
	) -> Result<EntityView, Error> {
		let entry = self.resolver.find(kind, key, parent_hint).await?;
		let previous = mapper::to_wire(kind, &entry)
			.ok_or_else(|| Error::Internal(format!("{} has no key attribute", entry.dn)))?;
		let plan = mapper::diff_update(
			kind,
			Some(&previous),
			request,
			self.base_dn(),
			self.directory.is_confidential(),
		)?;
		if plan.is_empty() {
			debug!(%kind, key, "Nothing to update");
			return self.view(kind, &entry).await;
		}
		debug!(%kind, key, steps = ?plan.kinds(), "Updating entity");

		let mut dn = previous.dn.clone();
		let mut completed = Vec::new();
		for step in plan {
			let failed = step.kind();
			if let Err(err) = self.execute(kind, &previous, &mut dn, step).await {
				if completed.is_empty() {
					return Err(err);
				}
				return Err(Error::PartialUpdate { completed, failed, source: Box::new(err) });
			}
			completed.push(failed);
		}
		self.read(kind, &dn).await
	}

	/// Run one step of an update against the entity currently at `dn`. A
	/// move updates `dn`.
	async fn execute(
		&self,
		kind: EntityKind,
		previous: &EntityView,
		dn: &mut String,
		step: Step,
	) -> Result<(), Error> {
		let key = previous.key.as_str();
		match step {
			Step::Attributes(changes) => {
				self.directory.modify(dn, changes).await.map_err(|err| write_error(kind, key, err))
			}
			Step::Password(value) => self
				.directory
				.modify(dn, vec![Change::ReplaceBinary(PASSWORD_ATTRIBUTE.to_owned(), value)])
				.await
				.map_err(|err| write_error(kind, key, err)),
			Step::AddMembers(keys) => {
				let current = previous.values("member");
				let mut added: Vec<String> = Vec::new();
				for member in keys {
					let member = self.resolver.resolve(EntityKind::Account, &member, None).await?;
					if !current.iter().chain(&added).any(|existing| dn::same(existing, &member)) {
						added.push(member);
					}
				}
				if added.is_empty() {
					return Ok(());
				}
				self.directory
					.modify(dn, vec![Change::Add("member".to_owned(), added)])
					.await
					.map_err(|err| write_error(kind, key, err))
			}
			Step::RemoveMembers(keys) => {
				let current = previous.values("member");
				let mut removed: Vec<String> = Vec::new();
				for member in keys {
					let member = self.resolver.resolve(EntityKind::Account, &member, None).await?;
					if let Some(existing) =
						current.iter().find(|existing| dn::same(existing, &member))
					{
						removed.push(existing.clone());
					}
				}
				if removed.is_empty() {
					return Ok(());
				}
				self.directory
					.modify(dn, vec![Change::Delete("member".to_owned(), removed)])
					.await
					.map_err(|err| write_error(kind, key, err))
			}
			Step::Move(target) => {
				let parent = self.resolver.validate_container(&target, Some(dn.as_str())).await?;
				let rdn = dn::rdn(dn)
					.ok_or_else(|| Error::Internal(format!("Cannot move '{dn}'")))?
					.to_owned();
				let moved = self.directory.move_entry(dn, &rdn, Some(parent.as_str())).await;
				moved.map_err(|err| match err {
					DirectoryError::TargetInvalid => Error::MoveTargetInvalid {
						path: target.clone(),
						reason: TargetProblem::Missing,
					},
					err => write_error(kind, key, err),
				})?;
				info!(%kind, from = %dn, to = %parent, "Moved entity");
				*dn = format!("{rdn},{parent}");
				Ok(())
			}
		}
	}

	/// Delete an entity. Entities holding children must be empty.
	pub async fn delete(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
	) -> Result<(), Error> {
		let result = self.delete_entity(kind, key, parent_hint).await;
		audit::record(Action::Delete, kind, key, &result);
		result
	}

	/// [`Self::delete`] without the audit trail.
	async fn delete_entity(
		&self,
		kind: EntityKind,
		key: &str,
		parent_hint: Option<&str>,
	) -> Result<(), Error> {
		let dn = self.resolver.resolve(kind, key, parent_hint).await?;
		if kind.schema().children {
			let children = self
				.directory
				.search(&dn, Scope::OneLevel, &Filter::present("objectClass"), &["1.1".to_owned()])
				.await?;
			if !children.is_empty() {
				return Err(Error::NonEmptyContainer { dn });
			}
		}
		match self.directory.delete(&dn).await {
			Ok(()) => {
				info!(%kind, dn, "Deleted entity");
				Ok(())
			}
			Err(DirectoryError::NotAllowedOnNonLeaf) => Err(Error::NonEmptyContainer { dn }),
			Err(err) => Err(write_error(kind, key, err)),
		}
	}

	/// Add the account with key `member` to `group`.
	pub async fn add_member(
		&self,
		group: &str,
		member: &str,
		policy: MembershipPolicy,
	) -> Result<MembershipChange, Error> {
		let result = self.change_membership(group, member, policy, true).await;
		let audit_key = format!("{group}/{member}");
		audit::record(Action::AddMember, EntityKind::Group, &audit_key, &result);
		result
	}

	/// Remove the account with key `member` from `group`.
	pub async fn remove_member(
		&self,
		group: &str,
		member: &str,
		policy: MembershipPolicy,
	) -> Result<MembershipChange, Error> {
		let result = self.change_membership(group, member, policy, false).await;
		let audit_key = format!("{group}/{member}");
		audit::record(Action::RemoveMember, EntityKind::Group, &audit_key, &result);
		result
	}

	/// Add or remove a single member.
	async fn change_membership(
		&self,
		group: &str,
		member: &str,
		policy: MembershipPolicy,
		add: bool,
	) -> Result<MembershipChange, Error> {
		let entry = self.resolver.find(EntityKind::Group, group, None).await?;
		let member_dn = self.resolver.resolve(EntityKind::Account, member, None).await?;
		let unchanged = || {
			let (group, member) = (group.to_owned(), member.to_owned());
			match (policy, add) {
				(MembershipPolicy::Idempotent, _) => Ok(MembershipChange::Unchanged),
				(MembershipPolicy::Strict, true) => Err(Error::AlreadyMember { group, member }),
				(MembershipPolicy::Strict, false) => Err(Error::NotAMember { group, member }),
			}
		};

		let present = entry
			.attr_all("member")
			.unwrap_or_default()
			.iter()
			.any(|existing| dn::same(existing, &member_dn));
		if present == add {
			return unchanged();
		}

		let change = if add {
			Change::Add("member".to_owned(), vec![member_dn])
		} else {
			Change::Delete("member".to_owned(), vec![member_dn])
		};
		match self.directory.modify(&entry.dn, vec![change]).await {
			Ok(()) if add => Ok(MembershipChange::Added),
			Ok(()) => Ok(MembershipChange::Removed),
			// Lost a race with a concurrent change of the same membership
			Err(DirectoryError::ValueExists | DirectoryError::AlreadyExists) if add => unchanged(),
			Err(DirectoryError::NoSuchValue) if !add => unchanged(),
			Err(err) => Err(write_error(EntityKind::Group, group, err)),
		}
	}

	/// Check that the directory answers.
	pub async fn probe(&self) -> Result<(), Error> {
		Ok(self.directory.probe().await?)
	}

	/// Build the exposed view of an entry, resolving group memberships for
	/// kinds that report them.
	async fn view(&self, kind: EntityKind, entry: &SearchEntry) -> Result<EntityView, Error> {
		let mut view = mapper::to_wire(kind, entry)
			.ok_or_else(|| Error::Internal(format!("{} has no key attribute", entry.dn)))?;
		if kind.schema().member_of {
			view.member_of = Some(self.member_of(&view.dn).await?);
		}
		Ok(view)
	}

	/// Names of the groups listing `dn` as a member, looked up in the
	/// directory on every call.
	async fn member_of(&self, dn: &str) -> Result<Vec<String>, Error> {
		let filter = EntityKind::Group.filter().and(Filter::equal("member", dn));
		let attributes = ["1.1".to_owned()];
		let groups =
			self.directory.search(self.base_dn(), Scope::Subtree, &filter, &attributes).await?;
		let mut names: Vec<String> = groups.iter().map(|group| dn::normalize(&group.dn)).collect();
		names.sort_by_key(|name| name.to_lowercase());
		Ok(names)
	}
}

/// Translate the failure of a write to the entity of `kind` with `key`.
fn write_error(kind: EntityKind, key: &str, err: DirectoryError) -> Error {
	match err {
		DirectoryError::NotFound => Error::NotFound { kind, key: key.to_owned() },
		DirectoryError::AlreadyExists => Error::Conflict { kind, key: key.to_owned() },
		DirectoryError::Constraint(text) => {
			Error::Validation(format!("The directory rejected the change: {text}"))
		}
		err => err.into(),
	}
}
