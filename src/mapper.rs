//! Translation between directory entries and the representation exposed to
//! callers, and between caller requests and directory operations.
//!
//! Updates are turned into an [`UpdatePlan`]: an ordered list of steps, each
//! of which is one atomic directory operation. Attribute changes and the
//! password come first and the move comes last, so a failed move leaves an
//! entity with its new attributes at its old location, ready for a retry of
//! just the move.
use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
	directory::{Change, NewEntry, SearchEntry},
	dn,
	entry::SearchEntryExt,
	error::Error,
	kind::{EntityKind, CREATED_ATTRIBUTES, MODIFIED_ATTRIBUTES},
};

/// Passwords shorter than this are rejected.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Attribute receiving passwords.
pub const PASSWORD_ATTRIBUTE: &str = "unicodePwd";

/// `userAccountControl` of an enabled normal account.
const NORMAL_ACCOUNT: &str = "512";

/// `userAccountControl` of a disabled normal account.
const DISABLED_ACCOUNT: &str = "514";

/// `groupType` of a global security group.
const GLOBAL_SECURITY_GROUP: &str = "-2147483646";

/// The value of an attribute as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
	/// A single-valued attribute
	Single(String),
	/// A multi-valued attribute, in directory order
	Multi(Vec<String>),
}

/// An entity as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
	/// Kind of the entity
	pub kind: EntityKind,
	/// Full name of the entity in the directory
	#[serde(rename = "distinguishedName")]
	pub dn: String,
	/// The human facing key
	pub key: String,
	/// Name of the containing entry
	pub parent_path: String,
	/// Attributes that are set. Absent attributes are omitted.
	pub attributes: BTreeMap<String, AttributeValue>,
	/// Groups the entity belongs to, for accounts and groups, when resolved
	#[serde(skip_serializing_if = "Option::is_none")]
	pub member_of: Option<Vec<String>>,
	/// When the entry was created
	#[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	pub created: Option<OffsetDateTime>,
	/// When the entry last changed
	#[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	pub modified: Option<OffsetDateTime>,
}

impl EntityView {
	/// The value of a single-valued attribute.
	#[must_use]
	pub fn attr(&self, name: &str) -> Option<&str> {
		match self.lookup(name)? {
			AttributeValue::Single(value) => Some(value),
			AttributeValue::Multi(values) => values.first().map(String::as_str),
		}
	}

	/// All values of an attribute.
	#[must_use]
	pub fn values(&self, name: &str) -> &[String] {
		match self.lookup(name) {
			Some(AttributeValue::Single(value)) => std::slice::from_ref(value),
			Some(AttributeValue::Multi(values)) => values,
			None => &[],
		}
	}

	/// Find an attribute regardless of the case of its name.
	fn lookup(&self, name: &str) -> Option<&AttributeValue> {
		self.attributes.get(name).or_else(|| {
			self.attributes.iter().find(|(attr, _)| attr.eq_ignore_ascii_case(name)).map(|(_, v)| v)
		})
	}
}

/// A scalar supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
	/// Text
	Text(String),
	/// An integer, e.g. `groupType`
	Integer(i64),
	/// A boolean, written as `TRUE`/`FALSE`
	Flag(bool),
}

impl Scalar {
	/// The value in directory syntax.
	#[must_use]
	pub fn to_directory(&self) -> String {
		match self {
			Self::Text(text) => text.trim().to_owned(),
			Self::Integer(number) => number.to_string(),
			Self::Flag(true) => "TRUE".to_owned(),
			Self::Flag(false) => "FALSE".to_owned(),
		}
	}
}

impl From<&str> for Scalar {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

/// A request to create an entity. Any field other than `parentPath` and
/// `password` is an attribute.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
	/// Where to create the entity, defaults to the base of the tree
	#[serde(default)]
	pub parent_path: Option<String>,
	/// Initial password of an account
	#[serde(default)]
	pub password: Option<String>,
	/// Attributes of the new entity
	#[serde(flatten)]
	pub attributes: BTreeMap<String, Scalar>,
}

impl CreateRequest {
	/// Start an empty request.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Set an attribute.
	#[must_use]
	pub fn with(mut self, attr: &str, value: impl Into<Scalar>) -> Self {
		self.attributes.insert(attr.to_owned(), value.into());
		self
	}

	/// Create below the given container.
	#[must_use]
	pub fn in_parent(mut self, path: &str) -> Self {
		self.parent_path = Some(path.to_owned());
		self
	}

	/// Set the initial password.
	#[must_use]
	pub fn with_password(mut self, password: &str) -> Self {
		self.password = Some(password.to_owned());
		self
	}
}

impl fmt::Debug for CreateRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CreateRequest")
			.field("parent_path", &self.parent_path)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.field("attributes", &self.attributes)
			.finish()
	}
}

/// A partial update. `parentPath` requests a move, `password` a credential
/// reset, `addMembers`/`removeMembers` membership changes, and any other
/// field an attribute change, where `null` clears the attribute.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
	/// New parent
	#[serde(default)]
	pub parent_path: Option<String>,
	/// New password
	#[serde(default)]
	pub password: Option<String>,
	/// Keys of accounts to add to a group
	#[serde(default)]
	pub add_members: Vec<String>,
	/// Keys of accounts to remove from a group
	#[serde(default)]
	pub remove_members: Vec<String>,
	/// Attribute changes
	#[serde(flatten)]
	pub attributes: BTreeMap<String, Option<Scalar>>,
}

impl UpdateRequest {
	/// Start an empty request.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Set an attribute.
	#[must_use]
	pub fn set(mut self, attr: &str, value: impl Into<Scalar>) -> Self {
		self.attributes.insert(attr.to_owned(), Some(value.into()));
		self
	}

	/// Clear an attribute.
	#[must_use]
	pub fn clear(mut self, attr: &str) -> Self {
		self.attributes.insert(attr.to_owned(), None);
		self
	}

	/// Move below another container.
	#[must_use]
	pub fn move_to(mut self, path: &str) -> Self {
		self.parent_path = Some(path.to_owned());
		self
	}

	/// Reset the password.
	#[must_use]
	pub fn reset_password(mut self, password: &str) -> Self {
		self.password = Some(password.to_owned());
		self
	}

	/// Add a member.
	#[must_use]
	pub fn add_member(mut self, key: &str) -> Self {
		self.add_members.push(key.to_owned());
		self
	}

	/// Remove a member.
	#[must_use]
	pub fn remove_member(mut self, key: &str) -> Self {
		self.remove_members.push(key.to_owned());
		self
	}
}

impl fmt::Debug for UpdateRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UpdateRequest")
			.field("parent_path", &self.parent_path)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.field("add_members", &self.add_members)
			.field("remove_members", &self.remove_members)
			.field("attributes", &self.attributes)
			.finish()
	}
}

/// The class of change a step makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
	/// Scalar attribute changes
	Attributes,
	/// Password reset
	Password,
	/// Members added
	AddMembers,
	/// Members removed
	RemoveMembers,
	/// Move to another parent
	Move,
}

impl fmt::Display for StepKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Attributes => "attributes",
			Self::Password => "password",
			Self::AddMembers => "add_members",
			Self::RemoveMembers => "remove_members",
			Self::Move => "move",
		})
	}
}

/// One atomic directory operation of an update.
#[derive(Clone, PartialEq, Eq)]
pub enum Step {
	/// Apply scalar changes in a single modify
	Attributes(Vec<Change>),
	/// Replace the password with the encoded value
	Password(Vec<u8>),
	/// Add the accounts with these keys
	AddMembers(Vec<String>),
	/// Remove the accounts with these keys
	RemoveMembers(Vec<String>),
	/// Move below this (qualified) parent
	Move(String),
}

impl Step {
	/// The class of the step.
	#[must_use]
	pub fn kind(&self) -> StepKind {
		match self {
			Self::Attributes(_) => StepKind::Attributes,
			Self::Password(_) => StepKind::Password,
			Self::AddMembers(_) => StepKind::AddMembers,
			Self::RemoveMembers(_) => StepKind::RemoveMembers,
			Self::Move(_) => StepKind::Move,
		}
	}
}

impl fmt::Debug for Step {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Attributes(changes) => f.debug_tuple("Attributes").field(changes).finish(),
			Self::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
			Self::AddMembers(keys) => f.debug_tuple("AddMembers").field(keys).finish(),
			Self::RemoveMembers(keys) => f.debug_tuple("RemoveMembers").field(keys).finish(),
			Self::Move(parent) => f.debug_tuple("Move").field(parent).finish(),
		}
	}
}

/// The ordered steps of an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
	/// Steps in execution order
	steps: Vec<Step>,
}

impl UpdatePlan {
	/// The steps in execution order.
	#[must_use]
	pub fn steps(&self) -> &[Step] {
		&self.steps
	}

	/// The classes of the steps in execution order.
	#[must_use]
	pub fn kinds(&self) -> Vec<StepKind> {
		self.steps.iter().map(Step::kind).collect()
	}

	/// Whether the update changes nothing.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}
}

impl IntoIterator for UpdatePlan {
	type Item = Step;
	type IntoIter = std::vec::IntoIter<Step>;

	fn into_iter(self) -> Self::IntoIter {
		self.steps.into_iter()
	}
}

/// Convert a directory entry to the exposed representation. Returns `None`
/// if the entry lacks its key attribute.
#[must_use]
pub fn to_wire(kind: EntityKind, entry: &SearchEntry) -> Option<EntityView> {
	let schema = kind.schema();
	let key = entry.attr_first(schema.key_attribute)?.to_owned();

	let mut attributes = BTreeMap::new();
	for attr in schema.readable {
		let Some(values) = entry.attr_all(attr).filter(|values| !values.is_empty()) else {
			continue;
		};
		let value = if kind.is_multi_valued(attr) {
			AttributeValue::Multi(values.to_vec())
		} else {
			AttributeValue::Single(values[0].clone())
		};
		attributes.insert((*attr).to_owned(), value);
	}

	Some(EntityView {
		kind,
		dn: dn::normalize(&entry.dn),
		key,
		parent_path: dn::parent(&entry.dn).unwrap_or_default(),
		attributes,
		member_of: None,
		created: CREATED_ATTRIBUTES.iter().find_map(|attr| entry.time_first(attr)),
		modified: MODIFIED_ATTRIBUTES.iter().find_map(|attr| entry.time_first(attr)),
	})
}

/// Encode a password the way Active Directory expects it in `unicodePwd`:
/// surrounded by double quotes, as UTF-16LE.
#[must_use]
pub fn encode_password(password: &str) -> Vec<u8> {
	format!("\"{password}\"").encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Validate a new password and encode it.
fn password_value(kind: EntityKind, password: &str, confidential: bool) -> Result<Vec<u8>, Error> {
	if !kind.schema().password {
		return Err(Error::Validation(format!("{kind} entities have no password")));
	}
	if !confidential {
		return Err(Error::SecureTransportRequired);
	}
	if password.chars().count() < MIN_PASSWORD_LENGTH {
		return Err(Error::Validation(format!(
			"Passwords must be at least {MIN_PASSWORD_LENGTH} characters long"
		)));
	}
	Ok(encode_password(password))
}

/// The schema spelling of a caller supplied attribute name.
fn canonical<'a>(
	names: impl IntoIterator<Item = &'a &'static str>,
	attr: &str,
) -> Option<&'static str> {
	names.into_iter().copied().find(|name| name.eq_ignore_ascii_case(attr))
}

/// Build the add operation for a create request. The parent defaults to the
/// base of the tree and is qualified against it.
pub fn to_create_request(
	kind: EntityKind,
	request: &CreateRequest,
	base_dn: &str,
	confidential: bool,
) -> Result<NewEntry, Error> {
	let schema = kind.schema();
	let allowed = schema.mandatory.iter().chain(schema.mutable).chain(schema.create_only);

	let mut values: BTreeMap<&'static str, String> = BTreeMap::new();
	for (attr, value) in &request.attributes {
		let name = canonical(allowed.clone(), attr)
			.ok_or_else(|| Error::Validation(format!("Unknown attribute '{attr}' for {kind}")))?;
		let value = value.to_directory();
		if !value.is_empty() {
			values.insert(name, value);
		}
	}
	for attr in schema.mandatory {
		if !values.contains_key(attr) {
			return Err(Error::Validation(format!(
				"Missing mandatory attribute '{attr}' for {kind}"
			)));
		}
	}

	let parent = dn::qualify(request.parent_path.as_deref().unwrap_or_default(), base_dn);
	let name = values.get(schema.naming_attribute).map(String::as_str).unwrap_or_default();
	let entry_dn = dn::child(schema.rdn_attribute, name, &parent);

	let mut binary = Vec::new();
	if let Some(password) = &request.password {
		binary.push((PASSWORD_ATTRIBUTE.to_owned(), password_value(kind, password, confidential)?));
	}

	let mut attributes: Vec<(String, Vec<String>)> = vec![(
		"objectClass".to_owned(),
		schema.object_classes.iter().map(|class| (*class).to_owned()).collect(),
	)];
	match kind {
		EntityKind::Account => {
			if let (Some(account), Some(domain)) =
				(values.get("sAMAccountName"), dn::domain(base_dn))
			{
				let principal = format!("{account}@{domain}");
				attributes.push(("userPrincipalName".to_owned(), vec![principal]));
			}
			let control = if binary.is_empty() { DISABLED_ACCOUNT } else { NORMAL_ACCOUNT };
			attributes.push(("userAccountControl".to_owned(), vec![control.to_owned()]));
		}
		EntityKind::Group => {
			if let Some(cn) = values.get("cn") {
				attributes.push(("sAMAccountName".to_owned(), vec![cn.clone()]));
			}
			if !values.contains_key("groupType") {
				attributes.push(("groupType".to_owned(), vec![GLOBAL_SECURITY_GROUP.to_owned()]));
			}
		}
		EntityKind::Container | EntityKind::GenericContainer => {}
	}
	attributes.extend(values.into_iter().map(|(name, value)| (name.to_owned(), vec![value])));

	Ok(NewEntry { dn: entry_dn, attributes, binary })
}

/// Classify the fields of an update into an ordered plan. With the current
/// state of the entity, changes that would not alter anything are dropped.
/// Everything is validated before a plan is returned, so a rejected update
/// never reaches the directory.
pub fn diff_update(
	kind: EntityKind,
	previous: Option<&EntityView>,
	request: &UpdateRequest,
	base_dn: &str,
	confidential: bool,
) -> Result<UpdatePlan, Error> {
	let schema = kind.schema();
	let mut steps = Vec::new();

	let mut changes = Vec::new();
	for (attr, value) in &request.attributes {
		let Some(name) = canonical(schema.mutable, attr) else {
			let identifying = [schema.key_attribute, schema.naming_attribute]
				.iter()
				.any(|name| name.eq_ignore_ascii_case(attr));
			return Err(Error::Validation(if identifying {
				format!("'{attr}' identifies the {kind} and cannot be changed")
			} else {
				format!("'{attr}' cannot be changed on a {kind}")
			}));
		};
		let value = value.as_ref().map(Scalar::to_directory).filter(|value| !value.is_empty());
		let current = previous.and_then(|view| view.attr(name));
		match (value, current) {
			(None, None) if previous.is_some() => {}
			(Some(value), Some(current)) if value == current => {}
			(value, _) => {
				changes.push(Change::Replace(name.to_owned(), value.into_iter().collect()));
			}
		}
	}
	if !changes.is_empty() {
		steps.push(Step::Attributes(changes));
	}

	if let Some(password) = &request.password {
		steps.push(Step::Password(password_value(kind, password, confidential)?));
	}

	if !schema.members && !(request.add_members.is_empty() && request.remove_members.is_empty()) {
		return Err(Error::Validation(format!("{kind} entities have no members")));
	}
	let add = dedup(&request.add_members);
	let remove = dedup(&request.remove_members);
	if let Some(both) =
		add.iter().find(|key| remove.iter().any(|other| other.eq_ignore_ascii_case(key)))
	{
		return Err(Error::Validation(format!("'{both}' is both added and removed")));
	}
	if !add.is_empty() {
		steps.push(Step::AddMembers(add));
	}
	if !remove.is_empty() {
		steps.push(Step::RemoveMembers(remove));
	}

	if let Some(path) = &request.parent_path {
		if path.trim().is_empty() {
			return Err(Error::Validation("The parent path must not be empty".to_owned()));
		}
		let target = dn::qualify(path, base_dn);
		if !previous.is_some_and(|view| dn::same(&view.parent_path, &target)) {
			steps.push(Step::Move(target));
		}
	}

	Ok(UpdatePlan { steps })
}

/// Remove duplicate keys, keeping the first spelling.
fn dedup(keys: &[String]) -> Vec<String> {
	let mut unique: Vec<String> = Vec::new();
	for key in keys.iter().map(|key| key.trim()).filter(|key| !key.is_empty()) {
		if !unique.iter().any(|seen| seen.eq_ignore_ascii_case(key)) {
			unique.push(key.to_owned());
		}
	}
	unique
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::expect_used)]

	use std::collections::HashMap;

	use super::*;

	const BASE: &str = "DC=example,DC=com";

	fn account_entry() -> SearchEntry {
		SearchEntry {
			dn: "CN=John Smith,OU=IT,DC=example,DC=com".to_owned(),
			attrs: HashMap::from([
				("sAMAccountName".to_owned(), vec!["jsmith".to_owned()]),
				("cn".to_owned(), vec!["John Smith".to_owned()]),
				("mail".to_owned(), vec!["jsmith@example.com".to_owned()]),
				("title".to_owned(), vec![]),
				("unicodePwd".to_owned(), vec!["ignored".to_owned()]),
				("whenChanged".to_owned(), vec!["20240102030405.0Z".to_owned()]),
			]),
			bin_attrs: HashMap::new(),
		}
	}

	#[test]
	fn to_wire_keeps_only_set_readable_attributes() {
		let view = to_wire(EntityKind::Account, &account_entry()).unwrap();

		assert_eq!(view.key, "jsmith");
		assert_eq!(view.parent_path, "OU=IT,DC=example,DC=com");
		assert_eq!(view.attr("mail"), Some("jsmith@example.com"));
		assert!(!view.attributes.contains_key("title"), "Empty attributes are absent");
		assert!(!view.attributes.contains_key("unicodePwd"));
		assert!(view.modified.is_some());
		assert!(view.created.is_none());

		let mut entry = account_entry();
		entry.attrs.remove("sAMAccountName");
		assert!(to_wire(EntityKind::Account, &entry).is_none());
	}

	#[test]
	fn to_wire_orders_multi_valued_attributes() {
		let entry = SearchEntry {
			dn: "CN=admins,DC=example,DC=com".to_owned(),
			attrs: HashMap::from([
				("cn".to_owned(), vec!["admins".to_owned()]),
				(
					"member".to_owned(),
					vec!["CN=b,DC=example,DC=com".to_owned(), "CN=a,DC=example,DC=com".to_owned()],
				),
			]),
			bin_attrs: HashMap::new(),
		};
		let view = to_wire(EntityKind::Group, &entry).unwrap();
		assert_eq!(view.values("member"), ["CN=b,DC=example,DC=com", "CN=a,DC=example,DC=com"]);
		assert_eq!(view.values("description"), [] as [String; 0]);
	}

	#[test]
	fn create_requires_mandatory_attributes() {
		let request = CreateRequest::new().with("cn", "John Smith");
		let err = to_create_request(EntityKind::Account, &request, BASE, true).unwrap_err();
		assert!(matches!(err, Error::Validation(message) if message.contains("sAMAccountName")));

		let request = CreateRequest::new().with("cn", "John Smith").with("samaccountname", " ");
		assert!(to_create_request(EntityKind::Account, &request, BASE, true).is_err());

		let request = CreateRequest::new().with("ou", "IT").with("owner", "me");
		let err = to_create_request(EntityKind::Container, &request, BASE, true).unwrap_err();
		assert!(matches!(err, Error::Validation(message) if message.contains("owner")));
	}

	#[test]
	fn create_account() {
		let request = CreateRequest::new()
			.with("cn", "John Smith")
			.with("sAMAccountName", "jsmith")
			.with("mail", "jsmith@example.com")
			.in_parent("OU=IT")
			.with_password("correct horse");
		let entry = to_create_request(EntityKind::Account, &request, BASE, true).unwrap();

		assert_eq!(entry.dn, "CN=John Smith,OU=IT,DC=example,DC=com");
		assert_eq!(entry.get("userPrincipalName").unwrap(), ["jsmith@example.com"]);
		assert_eq!(entry.get("userAccountControl").unwrap(), [NORMAL_ACCOUNT]);
		assert_eq!(entry.get("objectClass").unwrap().last().map(String::as_str), Some("user"));
		assert_eq!(entry.binary, [("unicodePwd".to_owned(), encode_password("correct horse"))]);
		assert!(!format!("{entry:?}").contains("correct"), "Debug output must not leak passwords");

		let request = request.with_password("correct horse");
		let err = to_create_request(EntityKind::Account, &request, BASE, false).unwrap_err();
		assert!(matches!(err, Error::SecureTransportRequired));
	}

	#[test]
	fn create_group_defaults() {
		let request = CreateRequest::new().with("cn", "admins");
		let entry = to_create_request(EntityKind::Group, &request, BASE, false).unwrap();

		assert_eq!(entry.dn, "CN=admins,DC=example,DC=com");
		assert_eq!(entry.get("sAMAccountName").unwrap(), ["admins"]);
		assert_eq!(entry.get("groupType").unwrap(), [GLOBAL_SECURITY_GROUP]);

		let request = CreateRequest::new().with("cn", "list").with("groupType", Scalar::Integer(2));
		let entry = to_create_request(EntityKind::Group, &request, BASE, false).unwrap();
		assert_eq!(entry.get("groupType").unwrap(), ["2"]);
	}

	#[test]
	fn password_encoding() {
		assert_eq!(encode_password("ab"), [b'"', 0, b'a', 0, b'b', 0, b'"', 0]);
	}

	#[test]
	fn diff_orders_steps() {
		let previous = to_wire(EntityKind::Account, &account_entry()).unwrap();
		let request = UpdateRequest::new()
			.move_to("OU=Dev")
			.set("title", "Engineer")
			.reset_password("correct horse")
			.clear("mail");
		let plan = diff_update(EntityKind::Account, Some(&previous), &request, BASE, true).unwrap();

		assert_eq!(plan.kinds(), [StepKind::Attributes, StepKind::Password, StepKind::Move]);
		assert_eq!(
			plan.steps()[0],
			Step::Attributes(vec![
				Change::Replace("mail".to_owned(), vec![]),
				Change::Replace("title".to_owned(), vec!["Engineer".to_owned()]),
			])
		);
		assert_eq!(plan.steps()[2], Step::Move("OU=Dev,DC=example,DC=com".to_owned()));
	}

	#[test]
	fn diff_drops_no_op_changes() {
		let previous = to_wire(EntityKind::Account, &account_entry()).unwrap();
		let request = UpdateRequest::new()
			.set("mail", "jsmith@example.com")
			.clear("department")
			.move_to("ou=it,dc=example,dc=com");
		let plan = diff_update(EntityKind::Account, Some(&previous), &request, BASE, true).unwrap();
		assert!(plan.is_empty());

		let plan = diff_update(EntityKind::Account, None, &request, BASE, true).unwrap();
		assert_eq!(plan.kinds(), [StepKind::Attributes, StepKind::Move]);
	}

	#[test]
	fn diff_rejects_invalid_fields() {
		let cases = [
			(EntityKind::Account, UpdateRequest::new().set("sAMAccountName", "other")),
			(EntityKind::Account, UpdateRequest::new().set("userAccountControl", "512")),
			(EntityKind::Account, UpdateRequest::new().add_member("jsmith")),
			(EntityKind::Group, UpdateRequest::new().reset_password("correct horse")),
			(EntityKind::Group, UpdateRequest::new().add_member("a").remove_member("A")),
			(EntityKind::Container, UpdateRequest::new().move_to(" ")),
			(EntityKind::Account, UpdateRequest::new().reset_password("short")),
		];
		for (kind, request) in cases {
			let result = diff_update(kind, None, &request, BASE, true);
			assert!(matches!(result, Err(Error::Validation(_))), "{kind} {request:?}: {result:?}");
		}
	}

	#[test]
	fn diff_requires_secure_transport_for_passwords() {
		let request = UpdateRequest::new().set("title", "Engineer").reset_password("correct horse");
		let result = diff_update(EntityKind::Account, None, &request, BASE, false);
		assert!(matches!(result, Err(Error::SecureTransportRequired)));
	}

	#[test]
	fn diff_membership() {
		let request =
			UpdateRequest::new().add_member("jsmith").add_member("JSMITH").remove_member("old");
		let plan = diff_update(EntityKind::Group, None, &request, BASE, false).unwrap();
		assert_eq!(
			plan.steps(),
			[
				Step::AddMembers(vec!["jsmith".to_owned()]),
				Step::RemoveMembers(vec!["old".to_owned()]),
			]
		);
	}

	#[test]
	fn requests_deserialize_from_flat_json() {
		let request: UpdateRequest = serde_json::from_value(serde_json::json!({
			"parentPath": "OU=Dev",
			"title": "Engineer",
			"mail": null,
			"addMembers": ["a"],
		}))
		.unwrap();
		assert_eq!(request.parent_path.as_deref(), Some("OU=Dev"));
		assert_eq!(request.attributes.get("title"), Some(&Some(Scalar::from("Engineer"))));
		assert_eq!(request.attributes.get("mail"), Some(&None));
		assert_eq!(request.add_members, ["a"]);
		assert!(!request.attributes.contains_key("parentPath"));

		let request: CreateRequest = serde_json::from_value(serde_json::json!({
			"cn": "admins",
			"groupType": -2147483646,
			"password": "correct horse",
		}))
		.unwrap();
		assert_eq!(request.attributes.get("groupType"), Some(&Scalar::Integer(-2_147_483_646)));
		assert_eq!(request.password.as_deref(), Some("correct horse"));
		assert!(!format!("{request:?}").contains("horse"));
	}
}
