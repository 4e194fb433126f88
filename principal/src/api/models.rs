//! Request and response bodies for the dispatcher API.
//!
//! Every request struct whitelists its fields; anything else a caller sends
//! is collected into `extra` and only ever forwarded as task kwargs.

use models::models::placement::{ServiceDemand, WorkerCapacity};
use models::models::pod::ContainerSpec;
use models::models::task::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TaskSubmitted {
    pub message: &'static str,
    pub task_id: String,
}

impl TaskSubmitted {
    pub fn new(task_id: String) -> Self {
        TaskSubmitted {
            message: "Task submitted successfully",
            task_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub instance_type: String,
    pub ami_id: String,
    pub key_name: String,
    pub security_group_ids: Vec<String>,
    pub subnet_id: String,
    pub namespace: String,
    pub min_count: u32,
    pub max_count: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct TerminateNamespaceRequest {
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePodsRequest {
    pub host_name: String,
    pub namespace: String,
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub cni_network: Option<String>,
    #[serde(default)]
    pub cni_ifname: Option<String>,
    #[serde(default)]
    pub pod_name: Option<String>,
    #[serde(default)]
    pub shared_volume: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct HostNameRequest {
    pub host_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanPlacementRequest {
    /// Explicit worker capacities. Omitted entirely: capacities come from
    /// the registry. Present but empty: pure feasibility estimate.
    #[serde(default)]
    pub workers: Option<Vec<WorkerCapacity>>,
    pub services: Map<String, Value>,
    #[serde(default)]
    pub default_capacity: Option<WorkerCapacity>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Decode the `services` map in insertion order.
pub fn services_in_order(
    services: &Map<String, Value>,
) -> Result<Vec<(String, ServiceDemand)>, serde_json::Error> {
    let mut ordered = Vec::with_capacity(services.len());
    for (name, value) in services {
        let demand: ServiceDemand = serde_json::from_value(value.clone())?;
        ordered.push((name.clone(), demand));
    }
    Ok(ordered)
}
