use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, TypedHeader};
use models::models::node::NodeRecord;
use models::models::placement::WorkerCapacity;
use models::models::task::{func, TaskEnvelope};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::api::models::{
    services_in_order, CreateInstanceRequest, CreatePodsRequest, HostNameRequest, LoginRequest,
    PlanPlacementRequest, TaskStatusResponse, TaskSubmitted, TerminateNamespaceRequest,
    TokenResponse,
};
use crate::api::server::AppState;
use crate::auth::AuthError;
use crate::dispatch::DispatchError;
use crate::placement::{self, DEFAULT_NODE_CAPACITY};
use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid credentials")]
    BadCredentials,
    #[error("Invalid authentication")]
    Unauthorized,
    #[error("Token expired")]
    Expired,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Failed to submit task")]
    Submit(#[source] DispatchError),
    #[error("Registry failure")]
    Registry(#[from] RegistryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadCredentials | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::Expired => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Submit(_) | ApiError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {self:?}");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

type Auth = Option<TypedHeader<Authorization<Bearer>>>;

/// Request bodies arrive as raw JSON so shape errors map to 400, not the
/// framework's default.
fn parse_body<T: DeserializeOwned>(raw: Value) -> Result<T, ApiError> {
    serde_json::from_value(raw)
        .map_err(|err| ApiError::BadRequest(format!("invalid request body: {err}")))
}

/// Validate the bearer token and confirm its subject still resolves.
async fn current_user(state: &AppState, auth: &Auth) -> Result<String, ApiError> {
    let bearer = auth.as_ref().ok_or(ApiError::Unauthorized)?;
    let username = state
        .tokens
        .verify(bearer.token())
        .map_err(|err| match err {
            AuthError::Expired => ApiError::Expired,
            _ => ApiError::Unauthorized,
        })?;
    match state.registry.get_user_hash(&username).await? {
        Some(_) => Ok(username),
        None => Err(ApiError::Unauthorized),
    }
}

pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(raw): Json<Value>,
) -> Result<Json<TokenResponse>, ApiError> {
    let body: LoginRequest = parse_body(raw)?;
    let stored = state
        .registry
        .get_user_hash(&body.username)
        .await?
        .ok_or(ApiError::BadCredentials)?;
    if state.router.credential_hash(&body.password) != stored {
        return Err(ApiError::BadCredentials);
    }
    let access_token = state
        .tokens
        .issue(&body.username)
        .map_err(|_| ApiError::Unauthorized)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

pub async fn create_instances(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<TaskSubmitted>, ApiError> {
    current_user(&state, &auth).await?;
    let body: CreateInstanceRequest = parse_body(raw)?;
    if body.max_count < body.min_count.max(1) {
        return Err(ApiError::BadRequest(
            "max_count must be at least min_count".to_string(),
        ));
    }

    let mut kwargs = Map::new();
    kwargs.insert("MinCount".to_string(), json!(body.min_count));
    kwargs.insert("MaxCount".to_string(), json!(body.max_count));
    kwargs.extend(body.extra.clone());

    let envelope = TaskEnvelope::new(
        func::CREATE_WORKER_NODES,
        vec![
            json!(body.instance_type),
            json!(body.ami_id),
            json!(body.key_name),
            json!(body.security_group_ids),
            json!(body.subnet_id),
            json!(body.namespace),
        ],
        kwargs,
    );
    let queue = state.router.route_key(&state.settings.cloud.service);
    let task_id = state
        .dispatcher
        .submit(&queue, &envelope)
        .await
        .map_err(ApiError::Submit)?;
    Ok(Json(TaskSubmitted::new(task_id)))
}

pub async fn terminate_namespace(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<TaskSubmitted>, ApiError> {
    current_user(&state, &auth).await?;
    let body: TerminateNamespaceRequest = parse_body(raw)?;
    let instance_ids = state
        .registry
        .list_instance_ids_in_namespace(&body.namespace)
        .await?;
    if instance_ids.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No instances found for namespace {}",
            body.namespace
        )));
    }
    let mut ids: Vec<String> = instance_ids.into_iter().collect();
    ids.sort();

    let envelope = TaskEnvelope::new(func::TERMINATE_WORKER_NODE, vec![json!(ids)], Map::new());
    let queue = state.router.route_key(&state.settings.cloud.service);
    let task_id = state
        .dispatcher
        .submit(&queue, &envelope)
        .await
        .map_err(ApiError::Submit)?;
    Ok(Json(TaskSubmitted::new(task_id)))
}

pub async fn create_pods(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<TaskSubmitted>, ApiError> {
    current_user(&state, &auth).await?;
    let body: CreatePodsRequest = parse_body(raw)?;
    if body.containers.is_empty() {
        return Err(ApiError::BadRequest(
            "containers must not be empty".to_string(),
        ));
    }

    let mut kwargs = Map::new();
    if let Some(network) = &body.cni_network {
        kwargs.insert("cni_network".to_string(), json!(network));
    }
    if let Some(ifname) = &body.cni_ifname {
        kwargs.insert("cni_ifname".to_string(), json!(ifname));
    }
    if let Some(pod_name) = &body.pod_name {
        kwargs.insert("pod_name".to_string(), json!(pod_name));
    }
    if let Some(volume) = &body.shared_volume {
        kwargs.insert("shared_volume".to_string(), json!(volume));
    }
    kwargs.extend(body.extra.clone());

    let envelope = TaskEnvelope::new(
        func::CREATE_PODS,
        vec![json!(body.containers), json!(body.namespace)],
        kwargs,
    );
    let queue = state.router.route_key(&body.host_name);
    let task_id = state
        .dispatcher
        .submit(&queue, &envelope)
        .await
        .map_err(ApiError::Submit)?;
    Ok(Json(TaskSubmitted::new(task_id)))
}

pub async fn task_status(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    current_user(&state, &auth).await?;
    let task = state
        .dispatcher
        .task_state(&task_id)
        .await
        .map_err(ApiError::Submit)?
        .ok_or_else(|| ApiError::NotFound(format!("No task with id {task_id}")))?;
    Ok(Json(TaskStatusResponse {
        task_id,
        status: task.status,
        result: task.result,
        error: task.error,
    }))
}

async fn submit_host_task(
    state: &AppState,
    host_name: &str,
    task_func: &str,
) -> Result<Json<TaskSubmitted>, ApiError> {
    let envelope = TaskEnvelope::new(task_func, Vec::new(), Map::new());
    let queue = state.router.route_key(host_name);
    let task_id = state
        .dispatcher
        .submit(&queue, &envelope)
        .await
        .map_err(ApiError::Submit)?;
    Ok(Json(TaskSubmitted::new(task_id)))
}

pub async fn worker_info(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<TaskSubmitted>, ApiError> {
    current_user(&state, &auth).await?;
    let body: HostNameRequest = parse_body(raw)?;
    submit_host_task(&state, &body.host_name, func::GET_WORKER_NODE_INFO).await
}

pub async fn worker_ip(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<TaskSubmitted>, ApiError> {
    current_user(&state, &auth).await?;
    let body: HostNameRequest = parse_body(raw)?;
    submit_host_task(&state, &body.host_name, func::GET_HOST_IP).await
}

pub async fn worker_usage(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<TaskSubmitted>, ApiError> {
    current_user(&state, &auth).await?;
    let body: HostNameRequest = parse_body(raw)?;
    submit_host_task(&state, &body.host_name, func::GET_USAGE).await
}

pub async fn plan_placement(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
    Json(raw): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    current_user(&state, &auth).await?;
    let body: PlanPlacementRequest = parse_body(raw)?;
    let services = services_in_order(&body.services)
        .map_err(|err| ApiError::BadRequest(format!("bad services map: {err}")))?;
    if services.is_empty() {
        return Err(ApiError::BadRequest("services must not be empty".to_string()));
    }

    let workers: Vec<WorkerCapacity> = match body.workers {
        Some(explicit) => explicit,
        None => state
            .registry
            .list_node_capacities()
            .await?
            .into_iter()
            .map(|(_, capacity)| WorkerCapacity {
                cpu: capacity.cpu,
                memory: capacity.memory,
            })
            .collect(),
    };
    let default_capacity = body.default_capacity.unwrap_or(DEFAULT_NODE_CAPACITY);
    let outcome = placement::plan(&workers, &services, &default_capacity);
    Ok(Json(json!(outcome)))
}

pub async fn list_nodes(
    Extension(state): Extension<Arc<AppState>>,
    auth: Auth,
) -> Result<Json<HashMap<String, NodeRecord>>, ApiError> {
    current_user(&state, &auth).await?;
    Ok(Json(state.registry.list_nodes().await?))
}
