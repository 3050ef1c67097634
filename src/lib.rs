//! A REST interface over an LDAP directory such as Active Directory.
//!
//! Accounts, groups and two kinds of containers are managed: organizational
//! units and generic `CN=` containers such as `CN=Users`. Callers address
//! entities by a short key, such as the logon name of an account, instead
//! of the distinguished name; the [`resolver`] turns keys into names and
//! refuses to guess when a key is ambiguous.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! The service can be run against an in-memory directory:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use ldap_rest::{
//!     http::{router, AppState},
//!     mapper::CreateRequest,
//!     EntityKind, EntityService, InMemoryDirectory,
//! };
//!
//! let directory = Arc::new(InMemoryDirectory::new("DC=example,DC=com"));
//! let service = EntityService::new(directory, "DC=example,DC=com");
//!
//! let request = CreateRequest::new().with("ou", "IT");
//! let dn = service.create(EntityKind::Container, &request).await?;
//! println!("Created {dn}");
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router(AppState::new(service))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Updates
//! A partial update may combine attribute changes, a password reset,
//! membership changes and a move. These are applied as separate directory
//! operations in that order, with the move last. Nothing is rolled back when a
//! step fails: [`Error::PartialUpdate`] reports which steps were applied so
//! that the remainder can be resubmitted.
//!
//! # Limitations
//! * Listings fetch every match from the directory and page in memory.
//! * The create conflict check is not atomic with the add; the directory
//!   refusing a duplicate is what ultimately decides.
//! * The API itself performs no authentication.

pub mod audit;
pub mod config;
pub mod directory;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod http;
pub mod kind;
pub mod ldap;
pub mod mapper;
pub mod memory;
pub mod pagination;
pub mod resolver;
pub mod service;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{Config, MembershipPolicy},
	directory::Directory,
	entry::SearchEntryExt,
	error::{DirectoryError, Error},
	kind::EntityKind,
	ldap::LdapDirectory,
	memory::InMemoryDirectory,
	service::{EntityService, MembershipChange},
};
