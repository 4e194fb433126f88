use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The direct exchange every task flows through.
pub const SECURE_EXCHANGE: &str = "secure_exchange";

/// Redis hash holding per-task state, keyed by task id.
pub const TASK_STATUS_HASH: &str = "task_status";

/// Task function names shared between the dispatcher and the agents.
pub mod func {
	pub const CREATE_PODS: &str = "create_pods";
	pub const GET_WORKER_NODE_INFO: &str = "get_worker_node_info";
	pub const GET_HOST_IP: &str = "get_host_ip";
	pub const GET_USAGE: &str = "get_usage";
	pub const CREATE_WORKER_NODES: &str = "create_worker_nodes";
	pub const TERMINATE_WORKER_NODE: &str = "terminate_worker_node";
}

/// Wire format of a queued task.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskEnvelope {
	pub task_id: String,
	pub func: String,
	#[serde(default)]
	pub args: Vec<serde_json::Value>,
	#[serde(default)]
	pub kwargs: serde_json::Map<String, serde_json::Value>,
	#[serde(default = "Utc::now")]
	pub submitted_at: DateTime<Utc>,
}

impl TaskEnvelope {
	pub fn new(
		func: &str,
		args: Vec<serde_json::Value>,
		kwargs: serde_json::Map<String, serde_json::Value>,
	) -> Self {
		TaskEnvelope {
			task_id: Uuid::new_v4().to_string(),
			func: func.to_string(),
			args,
			kwargs,
			submitted_at: Utc::now(),
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
	Pending,
	Started,
	Success,
	Failure,
}

/// State of a task as recorded in the backend and polled by clients.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskState {
	pub status: TaskStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<serde_json::Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl TaskState {
	pub fn pending() -> Self {
		TaskState {
			status: TaskStatus::Pending,
			result: None,
			error: None,
		}
	}

	pub fn started() -> Self {
		TaskState {
			status: TaskStatus::Started,
			result: None,
			error: None,
		}
	}

	pub fn success(result: serde_json::Value) -> Self {
		TaskState {
			status: TaskStatus::Success,
			result: Some(result),
			error: None,
		}
	}

	pub fn failure(error: String, partial: Option<serde_json::Value>) -> Self {
		TaskState {
			status: TaskStatus::Failure,
			result: partial,
			error: Some(error),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn envelope_round_trips() {
		let envelope = TaskEnvelope::new(
			func::GET_USAGE,
			vec![serde_json::json!("x")],
			serde_json::Map::new(),
		);
		let raw = serde_json::to_string(&envelope).unwrap();
		let back: TaskEnvelope = serde_json::from_str(&raw).unwrap();
		assert_eq!(back.task_id, envelope.task_id);
		assert_eq!(back.func, func::GET_USAGE);
		assert_eq!(back.args.len(), 1);
	}

	#[test]
	fn status_uses_screaming_case() {
		assert_eq!(
			serde_json::to_string(&TaskStatus::Success).unwrap(),
			"\"SUCCESS\""
		);
		let state: TaskState = serde_json::from_str(r#"{"status":"PENDING"}"#).unwrap();
		assert_eq!(state.status, TaskStatus::Pending);
	}
}
