#![allow(
	clippy::expect_used,
	clippy::missing_docs_in_private_items,
	clippy::too_many_lines,
	clippy::unwrap_used
)]
use std::sync::Arc;

use axum::{
	body::Body,
	http::{header, Method, Request, StatusCode},
	Router,
};
use ldap_rest::{
	config::MembershipConfig,
	http::{router, AppState},
	InMemoryDirectory, MembershipPolicy,
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{directory, directory_with, service, BASE};

fn app(directory: &Arc<InMemoryDirectory>) -> Router {
	router(AppState::new(service(directory)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
	let request = Request::builder().method(method).uri(uri);
	let request = match body {
		Some(body) => request
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(serde_json::to_vec(&body).unwrap())),
		None => request.body(Body::empty()),
	}
	.unwrap();

	let response = app.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
	let value =
		if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
	(status, value)
}

async fn create_jsmith(app: &Router) {
	let (status, body) = send(
		app,
		Method::POST,
		"/accounts",
		Some(json!({
			"sAMAccountName": "jsmith",
			"cn": "John Smith",
			"title": "Developer",
			"parentPath": "OU=IT",
			"password": "correct horse",
		})),
	)
	.await;
	assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn health() {
	let directory = directory().await;
	let (status, body) = send(&app(&directory), Method::GET, "/health", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({ "status": "ok" }));

	let probing = router(AppState::new(service(&directory)).with_directory_probe(true));
	let (status, body) = send(&probing, Method::GET, "/health", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["directory"], "reachable");

	directory.set_reachable(false);
	let (status, body) = send(&probing, Method::GET, "/health", None).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(body, json!({ "status": "degraded", "directory": "unreachable" }));

	let (status, _) = send(&app(&directory), Method::GET, "/health", None).await;
	assert_eq!(status, StatusCode::OK, "Liveness does not depend on the directory");
}

#[tokio::test]
async fn account_lifecycle() {
	let directory = directory().await;
	let app = app(&directory);
	create_jsmith(&app).await;

	let (status, body) = send(&app, Method::GET, "/accounts/jsmith", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["distinguishedName"], "CN=John Smith,OU=IT,DC=example,DC=com");
	assert_eq!(body["parentPath"], "OU=IT,DC=example,DC=com");
	assert_eq!(body["attributes"]["title"], "Developer");
	assert_eq!(body["memberOf"], json!([]));
	assert_eq!(body["kind"], "account");
	assert!(body.get("password").is_none());

	let (status, body) = send(
		&app,
		Method::PATCH,
		"/accounts/jsmith",
		Some(json!({ "title": "Lead", "parentPath": "OU=Dev" })),
	)
	.await;
	assert_eq!(status, StatusCode::OK, "{body}");
	assert_eq!(body["parentPath"], "OU=Dev,DC=example,DC=com");
	assert_eq!(body["attributes"]["title"], "Lead");

	let (status, body) = send(&app, Method::GET, "/accounts/jsmith?parentPath=OU%3DIT", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");

	let (status, body) = send(&app, Method::DELETE, "/accounts/jsmith", None).await;
	assert_eq!(status, StatusCode::NO_CONTENT);
	assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn listing() {
	let directory = directory().await;
	let app = app(&directory);
	for i in 0..12 {
		let (status, _) = send(
			&app,
			Method::POST,
			"/groups",
			Some(json!({ "cn": format!("group{i:02}"), "description": "team" })),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
	}

	let (status, body) = send(&app, Method::GET, "/groups", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["total"], 12);
	assert_eq!(body["limit"], 10);
	assert_eq!(body["pages"], 2);
	assert_eq!(body["items"].as_array().unwrap().len(), 10);
	assert_eq!(body["items"][0]["key"], "group00");

	let (_, body) = send(&app, Method::GET, "/groups?skip=10&limit=5", None).await;
	assert_eq!(body["items"].as_array().unwrap().len(), 2);
	assert_eq!(body["pages"], 3);

	let (_, body) = send(&app, Method::GET, "/groups?search=UP1", None).await;
	assert_eq!(body["total"], 2);

	for query in ["limit=0", "limit=101", "limit=ten", "skip=-1"] {
		let (status, body) = send(&app, Method::GET, &format!("/groups?{query}"), None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
		assert_eq!(body["error"], "validation_error");
	}
}

#[tokio::test]
async fn error_responses() {
	let directory = directory().await;
	let app = app(&directory);
	create_jsmith(&app).await;

	let (status, body) = send(&app, Method::GET, "/containers/Nope", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");
	assert!(body["message"].as_str().unwrap().contains("Nope"));

	let body = json!({ "cn": "No Key", "parentPath": "OU=IT" });
	let (status, body) = send(&app, Method::POST, "/accounts", Some(body)).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], "validation_error");

	let (status, body) = send(
		&app,
		Method::POST,
		"/accounts",
		Some(json!({ "sAMAccountName": "jsmith", "cn": "Other", "parentPath": "OU=IT" })),
	)
	.await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error"], "conflict");

	let (status, body) = send(&app, Method::DELETE, "/containers/IT", None).await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error"], "non_empty_container");

	let (status, body) = send(
		&app,
		Method::PATCH,
		"/accounts/jsmith",
		Some(json!({ "title": "Engineer", "parentPath": "OU=Nope" })),
	)
	.await;
	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(body["error"], "partial_update_failure");
	assert_eq!(body["completed"], json!(["attributes"]));
	assert_eq!(body["failed"], "move");
	assert_eq!(body["cause"], "move_target_invalid");

	let (_, body) = send(&app, Method::GET, "/accounts/jsmith", None).await;
	assert_eq!(body["attributes"]["title"], "Engineer");

	let request = Request::builder()
		.method(Method::POST)
		.uri("/containers")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from("{not json"))
		.unwrap();
	let response = app.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	directory.set_reachable(false);
	let (status, body) = send(&app, Method::GET, "/accounts/jsmith", None).await;
	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert_eq!(body["error"], "transport_error");
}

#[tokio::test]
async fn generic_container_routes() {
	let directory = directory().await;
	let app = app(&directory);

	let body = json!({ "cn": "Users", "description": "Default container for users" });
	let (status, body) = send(&app, Method::POST, "/generic-containers", Some(body)).await;
	assert_eq!(status, StatusCode::CREATED, "{body}");
	assert_eq!(body["distinguishedName"], "CN=Users,DC=example,DC=com");
	assert_eq!(body["kind"], "generic_container");

	let (status, body) = send(&app, Method::GET, "/generic-containers?search=default", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["total"], 1);
	assert_eq!(body["items"][0]["key"], "Users");

	let (_, body) = send(&app, Method::GET, "/containers", None).await;
	assert_eq!(body["total"], 2);

	let (status, _) = send(&app, Method::DELETE, "/generic-containers/Users", None).await;
	assert_eq!(status, StatusCode::NO_CONTENT);
	let (status, body) = send(&app, Method::GET, "/generic-containers/Users", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn passwords_over_plain_connections() {
	let directory = directory_with(InMemoryDirectory::new(BASE).with_confidentiality(false)).await;
	let app = app(&directory);

	let (status, body) = send(
		&app,
		Method::POST,
		"/accounts",
		Some(json!({ "sAMAccountName": "anna", "cn": "Anna", "password": "correct horse" })),
	)
	.await;
	assert_eq!(status, StatusCode::PRECONDITION_FAILED);
	assert_eq!(body["error"], "secure_transport_required");
}

#[tokio::test]
async fn membership_routes() {
	let directory = directory().await;
	let membership = MembershipConfig {
		group_route: MembershipPolicy::Strict,
		account_route: MembershipPolicy::Idempotent,
	};
	let app = router(AppState::new(service(&directory)).with_membership(membership));
	create_jsmith(&app).await;
	let (status, _) = send(&app, Method::POST, "/groups", Some(json!({ "cn": "admins" }))).await;
	assert_eq!(status, StatusCode::CREATED);

	let (status, body) = send(&app, Method::POST, "/groups/admins/members/jsmith", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["attributes"]["member"], json!(["CN=John Smith,OU=IT,DC=example,DC=com"]));

	let (status, body) = send(&app, Method::POST, "/groups/admins/members/jsmith", None).await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error"], "already_member");

	let (status, body) = send(&app, Method::POST, "/accounts/jsmith/groups/admins", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["memberOf"], json!(["CN=admins,DC=example,DC=com"]));

	let (status, _) = send(&app, Method::DELETE, "/accounts/jsmith/groups/admins", None).await;
	assert_eq!(status, StatusCode::NO_CONTENT);
	let (status, _) = send(&app, Method::DELETE, "/accounts/jsmith/groups/admins", None).await;
	assert_eq!(status, StatusCode::NO_CONTENT);

	let (status, body) = send(&app, Method::DELETE, "/groups/admins/members/jsmith", None).await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error"], "not_a_member");

	let (status, body) = send(&app, Method::POST, "/groups/admins/members/nobody", None).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");
}
