//! Typed search filters.
//!
//! Filters are built as values instead of strings so user input can never
//! change the structure of a query, and so the in-memory directory can
//! evaluate them without a parser. [`Filter`]'s `Display` implementation
//! renders the RFC 4515 string form sent over the wire.
use std::fmt;

use ldap3::SearchEntry;

use crate::{dn, entry::SearchEntryExt};

/// A search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
	/// All of the inner filters match.
	And(Vec<Filter>),
	/// Any of the inner filters matches.
	Or(Vec<Filter>),
	/// The inner filter does not match.
	Not(Box<Filter>),
	/// The attribute has a value equal to the given one.
	Equal(String, String),
	/// The attribute has a value containing the given substring.
	Contains(String, String),
	/// The attribute has any value.
	Present(String),
}

impl Filter {
	/// Shorthand for [`Filter::Equal`].
	pub fn equal(attr: impl Into<String>, value: impl Into<String>) -> Self {
		Self::Equal(attr.into(), value.into())
	}

	/// Shorthand for [`Filter::Contains`].
	pub fn contains(attr: impl Into<String>, value: impl Into<String>) -> Self {
		Self::Contains(attr.into(), value.into())
	}

	/// Shorthand for [`Filter::Present`].
	pub fn present(attr: impl Into<String>) -> Self {
		Self::Present(attr.into())
	}

	/// Combine with another filter, flattening nested conjunctions.
	#[must_use]
	pub fn and(self, other: Filter) -> Self {
		match self {
			Self::And(mut filters) => {
				filters.push(other);
				Self::And(filters)
			}
			filter => Self::And(vec![filter, other]),
		}
	}

	/// Evaluate the filter against an entry. Matching is case-insensitive, as
	/// for the directory string syntaxes used by the attributes this service
	/// touches. Values that look like distinguished names are compared in
	/// canonical form.
	#[must_use]
	pub fn matches(&self, entry: &SearchEntry) -> bool {
		match self {
			Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
			Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
			Self::Not(filter) => !filter.matches(entry),
			Self::Equal(attr, value) => entry.attr_all(attr).is_some_and(|values| {
				values.iter().any(|v| v.eq_ignore_ascii_case(value) || is_same_dn(v, value))
			}),
			Self::Contains(attr, value) => {
				let needle = value.to_lowercase();
				entry
					.attr_all(attr)
					.is_some_and(|values| values.iter().any(|v| v.to_lowercase().contains(&needle)))
			}
			Self::Present(attr) => {
				attr == "*" || entry.attr_all(attr).is_some_and(|values| !values.is_empty())
			}
		}
	}
}

/// Whether two values are both names of the same entry.
fn is_same_dn(a: &str, b: &str) -> bool {
	a.contains('=') && b.contains('=') && dn::same(a, b)
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::And(filters) => {
				f.write_str("(&")?;
				filters.iter().try_for_each(|filter| write!(f, "{filter}"))?;
				f.write_str(")")
			}
			Self::Or(filters) => {
				f.write_str("(|")?;
				filters.iter().try_for_each(|filter| write!(f, "{filter}"))?;
				f.write_str(")")
			}
			Self::Not(filter) => write!(f, "(!{filter})"),
			Self::Equal(attr, value) => {
				write!(f, "({attr}={})", ldap3::ldap_escape(value.as_str()))
			}
			Self::Contains(attr, value) => {
				write!(f, "({attr}=*{}*)", ldap3::ldap_escape(value.as_str()))
			}
			Self::Present(attr) => write!(f, "({attr}=*)"),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use ldap3::SearchEntry;

	use super::Filter;

	#[test]
	fn renders_escaped_filters() {
		let filter = Filter::equal("objectClass", "user")
			.and(Filter::Not(Box::new(Filter::equal("objectClass", "computer"))))
			.and(Filter::Or(vec![
				Filter::contains("cn", "a*b"),
				Filter::contains("mail", "(x)"),
			]));
		let rendered = filter.to_string();
		assert!(rendered.starts_with(r"(&(objectClass=user)(!(objectClass=computer))(|(cn=*a\"));
		assert!(!rendered.contains("a*b"), "Wildcards in values must be escaped");
		assert!(!rendered.contains("(x)"), "Parentheses in values must be escaped");
		assert!(rendered.ends_with("*)))"));
		assert_eq!(Filter::present("member").to_string(), "(member=*)");
	}

	#[test]
	fn evaluates_against_entries() {
		let entry = SearchEntry {
			dn: "CN=John,OU=IT,DC=x".to_owned(),
			attrs: HashMap::from([
				("objectClass".to_owned(), vec!["top".to_owned(), "user".to_owned()]),
				("sAMAccountName".to_owned(), vec!["JSmith".to_owned()]),
				("memberOf".to_owned(), vec!["CN=Admins,OU=IT,DC=x".to_owned()]),
			]),
			bin_attrs: HashMap::new(),
		};

		assert!(Filter::equal("objectclass", "USER").matches(&entry));
		assert!(Filter::contains("samaccountname", "smi").matches(&entry));
		assert!(Filter::equal("memberOf", "cn=admins, ou=IT,dc=x").matches(&entry));
		assert!(!Filter::present("mail").matches(&entry));
		assert!(!Filter::Not(Box::new(Filter::present("*"))).matches(&entry));
		assert!(!Filter::equal("objectClass", "user")
			.and(Filter::equal("objectClass", "computer"))
			.matches(&entry));
	}
}
