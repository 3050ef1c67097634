//! Distinguished name handling.
//!
//! Only the parts of RFC 4514 needed to walk a tree are implemented: splitting
//! a name into its relative components while honouring escapes, composing new
//! names, and comparing names the way Active Directory does (whitespace
//! around separators and the case of attribute types and values do not
//! matter).

/// Split a distinguished name into its relative components, leaf first.
/// Empty components are dropped and each component is trimmed, keeping
/// escaped whitespace such as the trailing space of `CN=a\ `.
#[must_use]
pub fn components(dn: &str) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut start = 0;
	let mut escaped = false;
	let mut quoted = false;
	for (i, c) in dn.char_indices() {
		match c {
			_ if escaped => escaped = false,
			'\\' => escaped = true,
			'"' => quoted = !quoted,
			',' | ';' if !quoted => {
				parts.push(&dn[start..i]);
				start = i + 1;
			}
			_ => {}
		}
	}
	parts.push(&dn[start..]);
	parts.into_iter().map(trim_unescaped).filter(|part| !part.is_empty()).collect()
}

/// Trim surrounding whitespace, except for a trailing whitespace character
/// preceded by an odd number of backslashes.
fn trim_unescaped(part: &str) -> &str {
	let part = part.trim_start();
	let trimmed = part.trim_end();
	let backslashes = trimmed.bytes().rev().take_while(|b| *b == b'\\').count();
	if backslashes % 2 == 0 {
		return trimmed;
	}
	let escaped = part[trimmed.len()..].chars().next().map_or(0, char::len_utf8);
	&part[..trimmed.len() + escaped]
}

/// The leaf component, e.g. `CN=jsmith` for `CN=jsmith,OU=IT,DC=example`.
#[must_use]
pub fn rdn(dn: &str) -> Option<&str> {
	components(dn).into_iter().next()
}

/// The name of the containing entry, or `None` for a single component name.
#[must_use]
pub fn parent(dn: &str) -> Option<String> {
	let parts = components(dn);
	if parts.len() < 2 {
		return None;
	}
	Some(join(parts[1..].iter().copied()))
}

/// Rewrite a name in canonical form: components trimmed, whitespace around
/// `=` removed and attribute types upper-cased. Values are kept verbatim.
#[must_use]
pub fn normalize(dn: &str) -> String {
	join(components(dn).into_iter())
}

/// Compare two names without regard to case or formatting.
#[must_use]
pub fn same(a: &str, b: &str) -> bool {
	normalize(a).eq_ignore_ascii_case(&normalize(b))
}

/// Whether `dn` is `ancestor` or lies somewhere beneath it.
#[must_use]
pub fn is_within(dn: &str, ancestor: &str) -> bool {
	let dn = normalize(dn).to_ascii_lowercase();
	let ancestor = normalize(ancestor).to_ascii_lowercase();
	dn == ancestor || dn.ends_with(&format!(",{ancestor}"))
}

/// Rewrite a name that lies within `old` so it lies within `new` instead,
/// as happens to every entry of a subtree when its root is moved.
#[must_use]
pub fn rebase(dn: &str, old: &str, new: &str) -> Option<String> {
	if !is_within(dn, old) {
		return None;
	}
	let dn = normalize(dn);
	let old = normalize(old);
	let new = normalize(new);
	let prefix = &dn[..dn.len() - old.len()];
	Some(format!("{prefix}{new}"))
}

/// Qualify a caller supplied path against the base of the tree: paths that do
/// not already end in the base get it appended, an empty path means the base.
#[must_use]
pub fn qualify(path: &str, base: &str) -> String {
	let path = normalize(path);
	let base = normalize(base);
	if path.is_empty() {
		return base;
	}
	if is_within(&path, &base) {
		path
	} else {
		format!("{path},{base}")
	}
}

/// Compose a child name from the naming attribute type, its raw value and the
/// parent name. The value is escaped.
#[must_use]
pub fn child(attr: &str, value: &str, parent: &str) -> String {
	format!("{}={},{}", attr.to_ascii_uppercase(), ldap3::dn_escape(value), normalize(parent))
}

/// The DNS domain named by the `DC` components of a name, e.g. `example.com`
/// for `OU=IT,DC=example,DC=com`.
#[must_use]
pub fn domain(dn: &str) -> Option<String> {
	let labels: Vec<&str> = components(dn)
		.into_iter()
		.filter_map(split_component)
		.filter(|(attr, _)| attr.eq_ignore_ascii_case("dc"))
		.map(|(_, value)| value)
		.collect();
	if labels.is_empty() {
		None
	} else {
		Some(labels.join("."))
	}
}

/// Split `TYPE=value` into its two halves.
fn split_component(component: &str) -> Option<(&str, &str)> {
	let (attr, value) = component.split_once('=')?;
	Some((attr.trim(), trim_unescaped(value)))
}

/// Join components in canonical form.
fn join<'a>(parts: impl Iterator<Item = &'a str>) -> String {
	parts
		.map(|part| match split_component(part) {
			Some((attr, value)) => format!("{}={}", attr.to_ascii_uppercase(), value),
			None => part.to_owned(),
		})
		.collect::<Vec<_>>()
		.join(",")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_on_unescaped_commas() {
		assert_eq!(
			components(r"CN=Smith\, John,OU=IT , DC=example,DC=com"),
			[r"CN=Smith\, John", "OU=IT", "DC=example", "DC=com"]
		);
		assert_eq!(components(r#"CN="a,b",DC=x"#), [r#"CN="a,b""#, "DC=x"]);
		assert!(components("").is_empty());
	}

	#[test]
	fn escaped_trailing_spaces_are_kept() {
		assert_eq!(components(r"CN=a\ ,OU=IT"), [r"CN=a\ ", "OU=IT"]);
		assert_eq!(components(r"CN=a\  , OU=IT "), [r"CN=a\ ", "OU=IT"]);
		assert_eq!(components(r"CN=a\\ ,OU=IT"), [r"CN=a\\", "OU=IT"]);
		assert_eq!(normalize(r"cn = a\ , ou=IT"), r"CN=a\ ,OU=IT");
		assert_eq!(parent(r"CN=a\ ,OU=IT").as_deref(), Some("OU=IT"));
		assert!(!same(r"CN=a\ ,OU=IT", "CN=a,OU=IT"));
	}

	#[test]
	fn parent_and_rdn() {
		let dn = "cn=jsmith, ou=IT,dc=example,dc=com";
		assert_eq!(rdn(dn), Some("cn=jsmith"));
		assert_eq!(parent(dn).as_deref(), Some("OU=IT,DC=example,DC=com"));
		assert_eq!(parent("DC=com"), None);
	}

	#[test]
	fn qualifies_relative_paths() {
		let base = "DC=example,DC=com";
		assert_eq!(qualify("OU=IT", base), "OU=IT,DC=example,DC=com");
		assert_eq!(qualify("ou=IT,dc=Example,dc=com", base), "OU=IT,DC=Example,DC=com");
		assert_eq!(qualify("", base), base);
	}

	#[test]
	fn ancestry() {
		assert!(is_within("OU=Dev,OU=IT,DC=x", "ou=it,dc=x"));
		assert!(is_within("OU=IT,DC=x", "OU=IT,DC=x"));
		assert!(!is_within("OU=NotIT,DC=x", "OU=IT,DC=x"));
		assert!(same("ou=IT , dc=x", "OU=it,DC=X"));
	}

	#[test]
	fn rebases_subtrees() {
		assert_eq!(
			rebase("CN=a,OU=IT,DC=x", "ou=it,dc=x", "OU=IT,OU=Dev,DC=x").as_deref(),
			Some("CN=a,OU=IT,OU=Dev,DC=x")
		);
		assert_eq!(
			rebase("OU=IT,DC=x", "OU=IT,DC=x", "OU=Ops,DC=x").as_deref(),
			Some("OU=Ops,DC=x")
		);
		assert_eq!(rebase("CN=a,OU=HR,DC=x", "OU=IT,DC=x", "OU=Ops,DC=x"), None);
	}

	#[test]
	fn composes_escaped_children() {
		let dn = child("cn", "Smith, John", "ou=IT,dc=x");
		assert!(dn.starts_with(r"CN=Smith\"));
		assert_eq!(components(&dn).len(), 3, "The comma in the value must be escaped");
		assert_eq!(parent(&dn).as_deref(), Some("OU=IT,DC=x"));
		assert_eq!(domain("OU=IT,DC=example,DC=com").as_deref(), Some("example.com"));
		assert_eq!(domain("OU=IT"), None);
	}
}
