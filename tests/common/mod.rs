#![allow(dead_code)]

use std::{error::Error, sync::Arc};

use ldap_rest::{
	directory::{Directory, Scope},
	dn,
	filter::Filter,
	mapper::CreateRequest,
	Config, EntityKind, EntityService, InMemoryDirectory,
};

pub const BASE: &str = "DC=example,DC=com";

/// A tree with the containers `OU=IT` and `OU=Dev` below the base.
pub async fn directory() -> Arc<InMemoryDirectory> {
	directory_with(InMemoryDirectory::new(BASE)).await
}

/// Seed `directory` with the containers `OU=IT` and `OU=Dev`.
pub async fn directory_with(directory: InMemoryDirectory) -> Arc<InMemoryDirectory> {
	for ou in ["IT", "Dev"] {
		directory
			.seed(
				&format!("OU={ou},{BASE}"),
				&[("objectClass", &["top", "organizationalUnit"]), ("ou", &[ou])],
			)
			.await
			.unwrap();
	}
	Arc::new(directory)
}

pub fn service(directory: &Arc<InMemoryDirectory>) -> EntityService {
	EntityService::new(directory.clone(), BASE)
}

pub fn account(key: &str, name: &str) -> CreateRequest {
	CreateRequest::new().with("sAMAccountName", key).with("cn", name)
}

/// Create `jsmith` below `OU=IT`.
pub async fn jsmith(service: &EntityService) -> String {
	let request = account("jsmith", "John Smith")
		.with("mail", "jsmith@example.com")
		.with("title", "Developer")
		.in_parent("OU=IT");
	service.create(EntityKind::Account, &request).await.unwrap()
}

/// Settings of the directory started for the docker tests.
pub fn ldap_config() -> Config {
	serde_yaml::from_str(
		"
url: ldap://localhost:1389
bind_dn: cn=admin,dc=example,dc=org
bind_password: adminpassword
base_dn: dc=example,dc=org
connection:
  operation_timeout: 5
",
	)
	.unwrap()
}

/// Delete `root` and everything below it, deepest entries first.
pub async fn remove_subtree(directory: &dyn Directory, root: &str) -> Result<(), Box<dyn Error>> {
	let mut entries = directory
		.search(root, Scope::Subtree, &Filter::present("objectClass"), &["1.1".to_owned()])
		.await?;
	entries.sort_by_key(|entry| std::cmp::Reverse(dn::components(&entry.dn).len()));
	for entry in entries {
		directory.delete(&entry.dn).await?;
	}
	Ok(())
}
