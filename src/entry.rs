//! Helper methods for extracting data from search results.
use ldap3::SearchEntry;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Configuration for which variant of ISO8601 to use for parsing
/// timestamps. Configured according the syntax definition
/// `( 1.3.6.1.4.1.1466.115.121.1.24 DESC 'Generalized Time' )` described in
/// RFC4517 section 3.1.13
pub const TIME_FORMAT: &[time::format_description::FormatItem] =
	time::macros::format_description!("[year][month][day][hour][minute][second]Z");

/// An extension trait for [`SearchEntry`] that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Get all values of an attribute. Attribute names are matched without
	/// regard to case, as directory servers do.
	fn attr_all(&self, attr: &str) -> Option<&[String]>;

	/// Get the first value of an attribute.
	fn attr_first(&self, attr: &str) -> Option<&str> {
		self.attr_all(attr)?.first().map(String::as_str)
	}

	/// Get the first value of an attribute, interpreted as a generalized time.
	/// Fractional seconds are dropped.
	fn time_first(&self, attr: &str) -> Option<OffsetDateTime> {
		let value = self.attr_first(attr)?;
		let whole = value.trim_end_matches('Z').split(['.', ',']).next()?;
		match PrimitiveDateTime::parse(&format!("{whole}Z"), &TIME_FORMAT) {
			Ok(time) => Some(time.assume_utc()),
			Err(err) => {
				tracing::warn!("Malformed time in attribute {attr}: {err}");
				None
			}
		}
	}

	/// Whether the entry carries the given object class.
	fn has_object_class(&self, class: &str) -> bool {
		self.attr_all("objectClass")
			.is_some_and(|classes| classes.iter().any(|c| c.eq_ignore_ascii_case(class)))
	}
}

impl SearchEntryExt for SearchEntry {
	fn attr_all(&self, attr: &str) -> Option<&[String]> {
		if let Some(values) = self.attrs.get(attr) {
			return Some(values.as_slice());
		}
		self.attrs
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(attr))
			.map(|(_, values)| values.as_slice())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use ldap3::SearchEntry;
	use time::macros::datetime;

	use super::SearchEntryExt;

	fn entry(attrs: &[(&str, &[&str])]) -> SearchEntry {
		SearchEntry {
			dn: String::from("dontcare"),
			attrs: attrs
				.iter()
				.map(|(name, values)| {
					((*name).to_owned(), values.iter().map(|v| (*v).to_owned()).collect())
				})
				.collect(),
			bin_attrs: HashMap::default(),
		}
	}

	#[test]
	fn attr_first() {
		let entry = entry(&[("name", &["Foo Bar", "Bar McBaz"])]);
		assert_eq!(
			entry.attr_first("attribute_does_not_exist"),
			None,
			"Undefined attributes should return None"
		);
		assert_eq!(entry.attr_first("name"), Some("Foo Bar"), "Should return the first value");
		assert_eq!(entry.attr_first("NAME"), Some("Foo Bar"), "Names are case insensitive");
		assert_ne!(entry.attr_first("name"), Some("Bar McBaz"), "Should return the correct value");
	}

	#[test]
	fn time_first() {
		let entry = entry(&[
			("whenChanged", &["20130516200520.0Z"]),
			("modifyTimestamp", &["20130516200520Z"]),
			("broken", &["yesterday"]),
		]);
		assert_eq!(entry.time_first("whenChanged"), Some(datetime!(2013-05-16 20:05:20 UTC)));
		assert_eq!(entry.time_first("modifyTimestamp"), Some(datetime!(2013-05-16 20:05:20 UTC)));
		assert_eq!(entry.time_first("broken"), None);
	}

	#[test]
	fn object_class() {
		let entry = entry(&[("objectClass", &["top", "organizationalUnit"])]);
		assert!(entry.has_object_class("organizationalunit"));
		assert!(!entry.has_object_class("group"));
	}
}
