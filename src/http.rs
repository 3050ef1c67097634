//! The REST surface.
//!
//! Every entity kind gets the same collection and item routes; groups and
//! accounts additionally get a membership route each. Errors are answered
//! with `{"error": <code>, "message": <text>}`.
//!
//! Writes run on their own task, so a client that disconnects does not
//! interrupt a directory operation halfway. Reads are dropped together with
//! the request.
use std::future::Future;

use axum::{
	extract::{
		rejection::{JsonRejection, QueryRejection},
		Path, Query, State,
	},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::{
	config::MembershipConfig,
	error::Error,
	kind::EntityKind,
	mapper::{CreateRequest, EntityView, UpdateRequest},
	pagination::{Page, PageRequest, DEFAULT_LIMIT},
	service::EntityService,
};

/// Shared state of all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
	/// The entity operations
	service: EntityService,
	/// Policy per membership route
	membership: MembershipConfig,
	/// Whether `/health` checks the directory
	probe_directory: bool,
}

impl AppState {
	/// State with strict membership routes and a liveness-only health check.
	#[must_use]
	pub fn new(service: EntityService) -> Self {
		Self { service, membership: MembershipConfig::default(), probe_directory: false }
	}

	/// Set the membership policies.
	#[must_use]
	pub fn with_membership(mut self, membership: MembershipConfig) -> Self {
		self.membership = membership;
		self
	}

	/// Make `/health` report whether the directory answers.
	#[must_use]
	pub fn with_directory_probe(mut self, probe: bool) -> Self {
		self.probe_directory = probe;
		self
	}
}

/// Build the router.
#[must_use]
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.merge(entity_routes(EntityKind::Account))
		.merge(entity_routes(EntityKind::Group))
		.merge(entity_routes(EntityKind::Container))
		.merge(entity_routes(EntityKind::GenericContainer))
		.route("/groups/:key/members/:account", post(add_member).delete(remove_member))
		.route("/accounts/:key/groups/:group", post(join_group).delete(leave_group))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

/// Path segment of the collection of a kind.
fn collection(kind: EntityKind) -> &'static str {
	match kind {
		EntityKind::Account => "/accounts",
		EntityKind::Group => "/groups",
		EntityKind::Container => "/containers",
		EntityKind::GenericContainer => "/generic-containers",
	}
}

/// Collection and item routes of one kind.
fn entity_routes(kind: EntityKind) -> Router<AppState> {
	let item = format!("{}/:key", collection(kind));
	Router::new()
		.route(
			collection(kind),
			get(move |state: State<AppState>, query: Result<Query<ListParams>, QueryRejection>| {
				list(kind, state, query)
			})
			.post(move |state: State<AppState>, body: Result<Json<CreateRequest>, JsonRejection>| {
				create(kind, state, body)
			}),
		)
		.route(
			&item,
			get(
				move |state: State<AppState>,
				      key: Path<String>,
				      location: Result<Query<Location>, QueryRejection>| {
					show(kind, state, key, location)
				},
			)
			.patch(
				move |state: State<AppState>,
				      key: Path<String>,
				      location: Result<Query<Location>, QueryRejection>,
				      body: Result<Json<UpdateRequest>, JsonRejection>| {
					update(kind, state, key, location, body)
				},
			)
			.delete(
				move |state: State<AppState>,
				      key: Path<String>,
				      location: Result<Query<Location>, QueryRejection>| {
					remove(kind, state, key, location)
				},
			),
		)
}

/// Query of a listing.
#[derive(Debug, Deserialize)]
struct ListParams {
	/// Substring to look for
	search: Option<String>,
	/// Items to skip
	skip: Option<usize>,
	/// Page size
	limit: Option<usize>,
}

/// Query narrowing down where an entity is looked up.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
	/// Parent to search below
	parent_path: Option<String>,
}

/// An [`Error`] answered over HTTP.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		Self(err)
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self(Error::Validation(rejection.body_text()))
	}
}

impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		Self(Error::Validation(rejection.body_text()))
	}
}

/// Status code of an error. Partial updates are answered with the status of
/// the step that failed.
fn status(err: &Error) -> StatusCode {
	match err {
		Error::Validation(_) => StatusCode::BAD_REQUEST,
		Error::NotFound { .. } => StatusCode::NOT_FOUND,
		Error::Conflict { .. }
		| Error::Ambiguous { .. }
		| Error::NonEmptyContainer { .. }
		| Error::AlreadyMember { .. }
		| Error::NotAMember { .. } => StatusCode::CONFLICT,
		Error::SecureTransportRequired => StatusCode::PRECONDITION_FAILED,
		Error::MoveTargetInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
		Error::Transport(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
		Error::Transport(_) => StatusCode::BAD_GATEWAY,
		Error::PartialUpdate { source, .. } => status(source),
		Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let err = self.0;
		let status = status(&err);
		let message = if matches!(err.cause(), Error::Internal(_)) {
			error!("Request failed: {err}");
			"Internal error".to_owned()
		} else {
			err.to_string()
		};

		let mut body = json!({ "error": err.code(), "message": message });
		if let Error::PartialUpdate { completed, failed, .. } = &err {
			body["completed"] = json!(completed);
			body["failed"] = json!(failed);
			body["cause"] = json!(err.cause().code());
		}
		(status, Json(body)).into_response()
	}
}

/// Run a write to completion even if the request is dropped.
async fn detached<T, F>(write: F) -> Result<T, Error>
where
	T: Send + 'static,
	F: Future<Output = Result<T, Error>> + Send + 'static,
{
	tokio::spawn(write).await.map_err(|err| Error::Internal(format!("Write task failed: {err}")))?
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Response {
	if !state.probe_directory {
		return Json(json!({ "status": "ok" })).into_response();
	}
	match state.service.probe().await {
		Ok(()) => Json(json!({ "status": "ok", "directory": "reachable" })).into_response(),
		Err(err) => {
			warn!("Directory probe failed: {err}");
			(
				StatusCode::SERVICE_UNAVAILABLE,
				Json(json!({ "status": "degraded", "directory": "unreachable" })),
			)
				.into_response()
		}
	}
}

/// `GET /<kind>`
async fn list(
	kind: EntityKind,
	State(state): State<AppState>,
	query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<EntityView>>, ApiError> {
	let Query(params) = query?;
	let page = PageRequest::new(params.skip.unwrap_or(0), params.limit.unwrap_or(DEFAULT_LIMIT))?;
	Ok(Json(state.service.list(kind, params.search.as_deref(), page).await?))
}

/// `POST /<kind>`
async fn create(
	kind: EntityKind,
	State(state): State<AppState>,
	body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EntityView>), ApiError> {
	let Json(request) = body?;
	let service = state.service.clone();
	let dn = detached(async move { service.create(kind, &request).await }).await?;
	Ok((StatusCode::CREATED, Json(state.service.read(kind, &dn).await?)))
}

/// `GET /<kind>/{key}`
async fn show(
	kind: EntityKind,
	State(state): State<AppState>,
	Path(key): Path<String>,
	location: Result<Query<Location>, QueryRejection>,
) -> Result<Json<EntityView>, ApiError> {
	let Query(location) = location?;
	Ok(Json(state.service.get(kind, &key, location.parent_path.as_deref()).await?))
}

/// `PATCH /<kind>/{key}`
async fn update(
	kind: EntityKind,
	State(state): State<AppState>,
	Path(key): Path<String>,
	location: Result<Query<Location>, QueryRejection>,
	body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<EntityView>, ApiError> {
	let Query(location) = location?;
	let Json(request) = body?;
	let service = state.service;
	let view = detached(async move {
		service.update(kind, &key, location.parent_path.as_deref(), &request).await
	})
	.await?;
	Ok(Json(view))
}

/// `DELETE /<kind>/{key}`
async fn remove(
	kind: EntityKind,
	State(state): State<AppState>,
	Path(key): Path<String>,
	location: Result<Query<Location>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
	let Query(location) = location?;
	let service = state.service;
	detached(async move { service.delete(kind, &key, location.parent_path.as_deref()).await })
		.await?;
	Ok(StatusCode::NO_CONTENT)
}

/// `POST /groups/{group}/members/{account}`
async fn add_member(
	State(state): State<AppState>,
	Path((group, account)): Path<(String, String)>,
) -> Result<Json<EntityView>, ApiError> {
	let (service, policy) = (state.service.clone(), state.membership.group_route);
	let key = group.clone();
	detached(async move { service.add_member(&key, &account, policy).await }).await?;
	Ok(Json(state.service.get(EntityKind::Group, &group, None).await?))
}

/// `DELETE /groups/{group}/members/{account}`
async fn remove_member(
	State(state): State<AppState>,
	Path((group, account)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
	let (service, policy) = (state.service, state.membership.group_route);
	detached(async move { service.remove_member(&group, &account, policy).await }).await?;
	Ok(StatusCode::NO_CONTENT)
}

/// `POST /accounts/{account}/groups/{group}`
async fn join_group(
	State(state): State<AppState>,
	Path((account, group)): Path<(String, String)>,
) -> Result<Json<EntityView>, ApiError> {
	let (service, policy) = (state.service.clone(), state.membership.account_route);
	let key = account.clone();
	detached(async move { service.add_member(&group, &key, policy).await }).await?;
	Ok(Json(state.service.get(EntityKind::Account, &account, None).await?))
}

/// `DELETE /accounts/{account}/groups/{group}`
async fn leave_group(
	State(state): State<AppState>,
	Path((account, group)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
	let (service, policy) = (state.service, state.membership.account_route);
	detached(async move { service.remove_member(&group, &account, policy).await }).await?;
	Ok(StatusCode::NO_CONTENT)
}
