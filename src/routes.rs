use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::app_response::AppResponse;
use crate::error::TodoError;
use crate::principal::Identity;
use crate::state::AppState;
use crate::todo_item::{NewTodo, TodoItem, UpdateTodo};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/todos", get(list_todos).post(create_todo).put(update_todo))
        .route(
            "/api/todos/{partition_key}/{id}",
            get(get_todo).delete(delete_todo),
        )
        .route("/api/todos/{partition_key}/{id}/toggle", post(toggle_todo))
        .route("/api/me", get(me))
        .route("/account/login", get(login))
        .route("/account/logout", get(logout))
        .route("/signed-out", get(signed_out))
        .layer(middleware::from_fn_with_state(state.clone(), principal_middleware))
        .with_state(state)
}

/// Decodes the proxy principal and stores the [`Identity`] in the request
/// extensions. Never rejects a request.
pub async fn principal_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = state.decoder.decode(request.headers());
    debug!(
        "{} {} as {}",
        request.method(),
        request.uri().path(),
        identity.name().unwrap_or("anonymous")
    );
    request.extensions_mut().insert(identity);
    next.run(request).await
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

/// Runs a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, AppResponse>
where
    F: FnOnce() -> Result<T, TodoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            warn!("Store task failed: {e}");
            AppResponse::DatabaseError(format!("Store task failed: {e}"))
        })?
        .map_err(AppResponse::from)
}

fn authorize(state: &AppState, identity: &Identity) -> Result<(), AppResponse> {
    if state.config.require_auth && !identity.is_authenticated() {
        return Err(AppResponse::Unauthorized("Sign in to change items".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub query: Option<String>,
}

pub async fn list_todos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TodoItem>>, AppResponse> {
    let todos = state.todos.clone();
    let items = blocking(move || todos.list(params.query.as_deref())).await?;
    Ok(Json(items))
}

pub async fn create_todo(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(new): Json<NewTodo>,
) -> Result<(StatusCode, Json<TodoItem>), AppResponse> {
    authorize(&state, &identity)?;
    if new.title.trim().is_empty() {
        return Err(AppResponse::BadRequest("Title cannot be empty".to_string()));
    }

    let todos = state.todos.clone();
    let item = blocking(move || todos.create(TodoItem::from(new))).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_todo(
    State(state): State<Arc<AppState>>,
    Path((partition_key, id)): Path<(String, String)>,
) -> Result<Json<TodoItem>, AppResponse> {
    let todos = state.todos.clone();
    let lookup_id = id.clone();
    match blocking(move || todos.get(&lookup_id, &partition_key)).await? {
        Some(item) => Ok(Json(item)),
        None => Err(AppResponse::NotFound(format!("No item found with id: {id}"))),
    }
}

pub async fn update_todo(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(update): Json<UpdateTodo>,
) -> Result<Json<TodoItem>, AppResponse> {
    authorize(&state, &identity)?;
    let todos = state.todos.clone();
    let item = blocking(move || todos.save(update)).await?;
    Ok(Json(item))
}

pub async fn toggle_todo(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path((partition_key, id)): Path<(String, String)>,
) -> Result<Json<TodoItem>, AppResponse> {
    authorize(&state, &identity)?;
    let todos = state.todos.clone();
    let item = blocking(move || todos.toggle(&id, &partition_key)).await?;
    Ok(Json(item))
}

pub async fn delete_todo(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path((partition_key, id)): Path<(String, String)>,
) -> Result<AppResponse, AppResponse> {
    authorize(&state, &identity)?;
    let todos = state.todos.clone();
    blocking(move || todos.delete(&id, &partition_key)).await?;
    Ok(AppResponse::success("Item deleted successfully"))
}

pub async fn me(identity: Identity) -> Json<JsonValue> {
    let claims: Vec<JsonValue> = identity
        .claims()
        .iter()
        .map(|c| json!({"typ": c.typ, "val": c.val}))
        .collect();

    Json(json!({
        "isAuthenticated": identity.is_authenticated(),
        "authenticationType": identity.authentication_type(),
        "name": identity.name(),
        "claims": claims,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

/// Sends the browser to the proxy's login endpoint, coming back to
/// `returnUrl` when it is a local path.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Response {
    let safe_path = params
        .return_url
        .filter(|url| !url.trim().is_empty() && url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| "/".to_string());

    let absolute = format!("{}{}", origin(&state, &headers), safe_path);
    found(format!(
        "/.auth/login/{}?post_login_redirect_uri={}",
        state.config.login_provider,
        urlencoding::encode(&absolute)
    ))
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let absolute = format!("{}/signed-out", origin(&state, &headers));
    found(format!(
        "/.auth/logout?post_logout_redirect_uri={}",
        urlencoding::encode(&absolute)
    ))
}

pub async fn signed_out() -> AppResponse {
    AppResponse::success("Signed out")
}

/// `scheme://host` of the request as seen by the client. The
/// `X-Forwarded-*` headers are only read when the config trusts them.
fn origin(state: &AppState, headers: &HeaderMap) -> String {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let forwarded = |name: &str| {
        if state.config.trust_forwarded_headers {
            text(name)
        } else {
            None
        }
    };

    let scheme = forwarded("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let host = forwarded("x-forwarded-host")
        .or_else(|| text(header::HOST.as_str()))
        .unwrap_or_else(|| "localhost".to_string());
    format!("{scheme}://{host}")
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
