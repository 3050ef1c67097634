//! The kinds of entities managed through the service and the per-kind rules
//! that govern them.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Object classes whose entries may hold children.
pub const CONTAINER_CLASSES: &[&str] =
	&["organizationalUnit", "container", "domain", "domainDNS", "dcObject", "organization"];

/// Attributes holding the creation time, in order of preference.
pub const CREATED_ATTRIBUTES: &[&str] = &["whenCreated", "createTimestamp"];

/// Attributes holding the modification time, in order of preference.
pub const MODIFIED_ATTRIBUTES: &[&str] = &["whenChanged", "modifyTimestamp"];

/// An entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	/// A user account
	Account,
	/// A group of accounts
	Group,
	/// An organizational unit
	Container,
	/// A generic container named by its common name, such as `CN=Users`
	GenericContainer,
}

/// The rules for one entity kind.
#[derive(Debug)]
pub struct Schema {
	/// Object classes written when creating an entry
	pub object_classes: &'static [&'static str],
	/// Object class identifying entries of this kind
	pub structural_class: &'static str,
	/// Object classes which also carry `structural_class` but are not of
	/// this kind
	pub excluded_classes: &'static [&'static str],
	/// Attribute type of the leaf component of the distinguished name
	pub rdn_attribute: &'static str,
	/// Attribute holding the value of the leaf component
	pub naming_attribute: &'static str,
	/// Attribute holding the human facing key
	pub key_attribute: &'static str,
	/// Attributes that must be supplied on create
	pub mandatory: &'static [&'static str],
	/// Scalar attributes that may be supplied on create and changed on update
	pub mutable: &'static [&'static str],
	/// Further attributes accepted on create only
	pub create_only: &'static [&'static str],
	/// Attributes read back and exposed
	pub readable: &'static [&'static str],
	/// Attributes with more than one value
	pub multi_valued: &'static [&'static str],
	/// Attributes matched by the substring search of a listing
	pub searchable: &'static [&'static str],
	/// Whether a password can be set
	pub password: bool,
	/// Whether the entity has members
	pub members: bool,
	/// Whether group memberships of the entity are reported
	pub member_of: bool,
	/// Whether the entity holds other entries and must be empty to go
	pub children: bool,
}

/// Rules for accounts.
static ACCOUNT: Schema = Schema {
	object_classes: &["top", "person", "organizationalPerson", "user"],
	structural_class: "user",
	excluded_classes: &["computer"],
	rdn_attribute: "CN",
	naming_attribute: "cn",
	key_attribute: "sAMAccountName",
	mandatory: &["sAMAccountName", "cn"],
	mutable: &[
		"givenName",
		"sn",
		"displayName",
		"mail",
		"telephoneNumber",
		"title",
		"department",
		"description",
	],
	create_only: &[],
	readable: &[
		"cn",
		"sAMAccountName",
		"userPrincipalName",
		"givenName",
		"sn",
		"displayName",
		"mail",
		"telephoneNumber",
		"title",
		"department",
		"description",
		"userAccountControl",
	],
	multi_valued: &[],
	searchable: &["cn", "sAMAccountName", "mail", "displayName"],
	password: true,
	members: false,
	member_of: true,
	children: false,
};

/// Rules for groups.
static GROUP: Schema = Schema {
	object_classes: &["top", "group"],
	structural_class: "group",
	excluded_classes: &[],
	rdn_attribute: "CN",
	naming_attribute: "cn",
	key_attribute: "cn",
	mandatory: &["cn"],
	mutable: &["description", "displayName", "mail"],
	create_only: &["groupType"],
	readable: &[
		"cn",
		"sAMAccountName",
		"description",
		"displayName",
		"mail",
		"groupType",
		"member",
	],
	multi_valued: &["member"],
	searchable: &["cn", "description"],
	password: false,
	members: true,
	member_of: true,
	children: false,
};

/// Rules for containers.
static CONTAINER: Schema = Schema {
	object_classes: &["top", "organizationalUnit"],
	structural_class: "organizationalUnit",
	excluded_classes: &[],
	rdn_attribute: "OU",
	naming_attribute: "ou",
	key_attribute: "ou",
	mandatory: &["ou"],
	mutable: &["description"],
	create_only: &[],
	readable: &["ou", "description"],
	multi_valued: &[],
	searchable: &["ou", "description"],
	password: false,
	members: false,
	member_of: false,
	children: true,
};

/// Rules for generic containers.
static GENERIC_CONTAINER: Schema = Schema {
	object_classes: &["top", "container"],
	structural_class: "container",
	excluded_classes: &[],
	rdn_attribute: "CN",
	naming_attribute: "cn",
	key_attribute: "cn",
	mandatory: &["cn"],
	mutable: &["description"],
	create_only: &[],
	readable: &["cn", "description"],
	multi_valued: &[],
	searchable: &["cn", "description"],
	password: false,
	members: false,
	member_of: false,
	children: true,
};

impl EntityKind {
	/// All kinds.
	pub const ALL: [EntityKind; 4] =
		[Self::Account, Self::Group, Self::Container, Self::GenericContainer];

	/// The rules for this kind.
	#[must_use]
	pub fn schema(self) -> &'static Schema {
		match self {
			Self::Account => &ACCOUNT,
			Self::Group => &GROUP,
			Self::Container => &CONTAINER,
			Self::GenericContainer => &GENERIC_CONTAINER,
		}
	}

	/// Filter matching every entry of this kind.
	#[must_use]
	pub fn filter(self) -> Filter {
		let schema = self.schema();
		let filter = Filter::equal("objectClass", schema.structural_class);
		schema.excluded_classes.iter().fold(filter, |filter, class| {
			filter.and(Filter::Not(Box::new(Filter::equal("objectClass", *class))))
		})
	}

	/// Attributes to request when reading entries of this kind.
	#[must_use]
	pub fn attributes(self) -> Vec<String> {
		let schema = self.schema();
		schema
			.readable
			.iter()
			.chain(CREATED_ATTRIBUTES)
			.chain(MODIFIED_ATTRIBUTES)
			.map(|attr| (*attr).to_owned())
			.collect()
	}

	/// Whether `attr` names a multi-valued attribute of this kind.
	#[must_use]
	pub fn is_multi_valued(self, attr: &str) -> bool {
		self.schema().multi_valued.iter().any(|a| a.eq_ignore_ascii_case(attr))
	}

}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Account => "Account",
			Self::Group => "Group",
			Self::Container => "Container",
			Self::GenericContainer => "Generic container",
		})
	}
}
