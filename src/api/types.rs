use serde::{Deserialize, Serialize};

use crate::consumption::PendingRerun;
use crate::store::{CommandRecord, CommandStatus};

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn ok() -> ApiResponse<String> {
        ApiResponse {
            ok: true,
            data: Some("ok".to_string()),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> ApiResponse<String> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// === Pipeline / operator types ===

#[derive(Deserialize, Clone)]
pub struct SubmitRequest {
    pub prompt: String,
    pub script: String,
    #[serde(default)]
    pub inverse_script: String,
    pub source: String,
    pub author: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub image_context: Option<String>,
    /// Park the command in moderation instead of queueing it.
    #[serde(default)]
    pub hold_for_moderation: bool,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub command_id: u64,
    pub status: CommandStatus,
}

#[derive(Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub queue_depth: usize,
    pub executing: usize,
    pub occupied_slots: usize,
    pub target_slots: usize,
    pub pending_reruns: usize,
    pub history_len: usize,
    pub current_map: Option<String>,
}

#[derive(Serialize)]
pub struct CommandListResponse {
    pub commands: Vec<CommandRecord>,
}

// === Game client types ===

#[derive(Serialize)]
pub struct PollResponse {
    /// None while nothing is promoted; the client just polls again.
    pub command: Option<PolledCommand>,
}

#[derive(Serialize)]
pub struct PolledCommand {
    pub command_id: u64,
    pub script: String,
}

#[derive(Deserialize)]
pub struct ReportRequest {
    pub command_id: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct LevelChangeRequest {
    pub map_id: String,
    #[serde(default)]
    pub is_save_load: bool,
}

#[derive(Serialize)]
pub struct LevelChangeResponse {
    pub pending_reruns: Vec<PendingRerun>,
}

#[derive(Deserialize)]
pub struct ShutdownRequest {
    pub time_ms: u64,
}

#[derive(Serialize)]
pub struct PendingRerunsResponse {
    pub pending_reruns: Vec<PendingRerun>,
}
