//! Audit trail of changes made through the service.
//!
//! Every mutation emits one event on the `audit` tracing target, so the trail
//! can be routed to its own sink with a subscriber filter such as
//! `RUST_LOG=audit=info`.
use std::fmt;

use tracing::{info, warn};

use crate::{error::Error, kind::EntityKind};

/// The kinds of mutations that are audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	/// An entity was created
	Create,
	/// An entity was updated or moved
	Update,
	/// An entity was deleted
	Delete,
	/// An account was added to a group
	AddMember,
	/// An account was removed from a group
	RemoveMember,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Create => "create",
			Self::Update => "update",
			Self::Delete => "delete",
			Self::AddMember => "add_member",
			Self::RemoveMember => "remove_member",
		})
	}
}

/// Record the outcome of a mutation on the entity of `kind` with `key`.
pub fn record<T>(action: Action, kind: EntityKind, key: &str, result: &Result<T, Error>) {
	match result {
		Ok(_) => info!(target: "audit", %action, %kind, key, outcome = "success"),
		Err(err) => warn!(
			target: "audit",
			%action,
			%kind,
			key,
			outcome = "failure",
			error = err.code(),
			"{err}"
		),
	}
}
