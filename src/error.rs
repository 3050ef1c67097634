//! Error codes
use std::fmt;

use ldap3::LdapResult;

use crate::{kind::EntityKind, mapper::StepKind};

/// Outcomes of a single directory operation other than success.
#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
	/// The target entry (or the base of a search) does not exist.
	#[error("No such object")]
	NotFound,
	/// An entry with the same distinguished name already exists.
	#[error("Entry already exists")]
	AlreadyExists,
	/// The entry still has children and cannot be deleted.
	#[error("Operation not allowed on non-leaf entry")]
	NotAllowedOnNonLeaf,
	/// A value being added to an attribute is already present.
	#[error("Attribute value already exists")]
	ValueExists,
	/// A value or attribute being removed is not present.
	#[error("No such attribute or value")]
	NoSuchValue,
	/// The new superior or relative name of a move was rejected.
	#[error("Invalid move target")]
	TargetInvalid,
	/// The server refused the change because of a schema or policy constraint.
	#[error("Constraint violation: {0}")]
	Constraint(String),
	/// The bind credentials were rejected.
	#[error("Invalid credentials")]
	InvalidCredentials,
	/// The directory could not be reached.
	#[error("Directory unavailable: {0}")]
	Unavailable(String),
	/// Any other non-zero result code.
	#[error("Directory returned code {rc}: {text}")]
	Result {
		/// The LDAP result code
		rc: u32,
		/// Diagnostic message sent by the server
		text: String,
	},
	/// The configuration was unusable.
	#[error("Invalid configuration: {0}")]
	Invalid(String),
	/// Reading a certificate or key failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}

impl DirectoryError {
	/// Translate the result code of a completed operation.
	pub fn check(result: LdapResult) -> Result<(), Self> {
		match result.rc {
			0 => Ok(()),
			16 => Err(Self::NoSuchValue),
			19 => Err(Self::Constraint(result.text)),
			20 => Err(Self::ValueExists),
			32 => Err(Self::NotFound),
			49 => Err(Self::InvalidCredentials),
			64 | 71 => Err(Self::TargetInvalid),
			66 => Err(Self::NotAllowedOnNonLeaf),
			68 => Err(Self::AlreadyExists),
			rc => Err(Self::Result { rc, text: result.text }),
		}
	}

	/// Whether the failure concerns reaching the directory rather than the
	/// operation itself. Only these are worth retrying for reads.
	#[must_use]
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			Self::Unavailable(_) | Self::Ldap(_) | Self::Io(_) | Self::InvalidCredentials
		)
	}

	/// Whether the operation ran out of time.
	#[must_use]
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Ldap(ldap3::LdapError::Timeout { .. }))
	}
}

/// Why a path cannot be used as a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetProblem {
	/// Nothing exists at the path.
	Missing,
	/// The entry at the path cannot hold children.
	NotAContainer,
	/// The path lies inside the entry being moved.
	InsideSelf,
}

impl fmt::Display for TargetProblem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Missing => "no such entry",
			Self::NotAContainer => "not a container",
			Self::InsideSelf => "target is inside the entry being moved",
		})
	}
}

/// Errors reported by the entity operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The request was malformed or incomplete. Nothing was sent to the
	/// directory.
	#[error("Invalid request: {0}")]
	Validation(String),
	/// No entity of this kind has the key.
	#[error("{kind} '{key}' not found")]
	NotFound {
		/// Kind that was looked up
		kind: EntityKind,
		/// Key or path that was looked up
		key: String,
	},
	/// An entity with this key already exists.
	#[error("{kind} '{key}' already exists")]
	Conflict {
		/// Kind of the existing entity
		kind: EntityKind,
		/// Conflicting key
		key: String,
	},
	/// The key matched several entities and no parent narrowed it down.
	#[error("{kind} '{key}' matches {count} entries, a parent path is required")]
	Ambiguous {
		/// Kind that was looked up
		kind: EntityKind,
		/// Key that was looked up
		key: String,
		/// Number of matching entries
		count: usize,
	},
	/// The container still holds entries.
	#[error("Container '{dn}' is not empty")]
	NonEmptyContainer {
		/// The container
		dn: String,
	},
	/// The requested parent cannot receive the entity.
	#[error("Cannot move to '{path}': {reason}")]
	MoveTargetInvalid {
		/// The requested parent path
		path: String,
		/// What is wrong with it
		reason: TargetProblem,
	},
	/// A password change was requested over a connection that is not
	/// encrypted.
	#[error("Password changes require a confidential connection to the directory")]
	SecureTransportRequired,
	/// The member is already in the group.
	#[error("'{member}' is already a member of group '{group}'")]
	AlreadyMember {
		/// Group key
		group: String,
		/// Member key
		member: String,
	},
	/// The member is not in the group.
	#[error("'{member}' is not a member of group '{group}'")]
	NotAMember {
		/// Group key
		group: String,
		/// Member key
		member: String,
	},
	/// An update applied some of its steps and then failed.
	#[error("Update stopped at step '{failed}': {source}")]
	PartialUpdate {
		/// Steps that were applied, in order
		completed: Vec<StepKind>,
		/// The step that failed
		failed: StepKind,
		/// Why it failed
		source: Box<Error>,
	},
	/// The directory could not be reached or refused the session.
	#[error("Directory unavailable: {0}")]
	Transport(#[source] DirectoryError),
	/// Anything the directory reported that this service does not expect.
	#[error("Internal error: {0}")]
	Internal(String),
}

impl Error {
	/// A stable machine readable name for the error.
	#[must_use]
	pub fn code(&self) -> &'static str {
		match self {
			Self::Validation(_) => "validation_error",
			Self::NotFound { .. } => "not_found",
			Self::Conflict { .. } => "conflict",
			Self::Ambiguous { .. } => "ambiguous",
			Self::NonEmptyContainer { .. } => "non_empty_container",
			Self::MoveTargetInvalid { .. } => "move_target_invalid",
			Self::SecureTransportRequired => "secure_transport_required",
			Self::AlreadyMember { .. } => "already_member",
			Self::NotAMember { .. } => "not_a_member",
			Self::PartialUpdate { .. } => "partial_update_failure",
			Self::Transport(_) => "transport_error",
			Self::Internal(_) => "internal_error",
		}
	}

	/// The error that decided the outcome, looking through partial updates.
	#[must_use]
	pub fn cause(&self) -> &Error {
		match self {
			Self::PartialUpdate { source, .. } => source.cause(),
			other => other,
		}
	}
}

impl From<DirectoryError> for Error {
	fn from(err: DirectoryError) -> Self {
		if err.is_transport() {
			Self::Transport(err)
		} else {
			tracing::error!("Unexpected directory response: {err}");
			Self::Internal(err.to_string())
		}
	}
}
