use serde::{Deserialize, Serialize};

use crate::jobs::JobStatus;
use crate::models::{Dimensions, Origin};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn default_subsets() -> u32 {
    1
}

fn default_size() -> u32 {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMapRequest {
    pub token: String,
    pub user: String,
    pub dataset: String,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default = "default_subsets", alias = "subset")]
    pub subsets: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMapResponse {
    pub id: String,
    pub started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Running,
    Done,
    Failed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub status: QueueState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobStatus> for QueueStatusResponse {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => Self {
                status: QueueState::Running,
                error: None,
            },
            JobStatus::Done => Self {
                status: QueueState::Done,
                error: None,
            },
            JobStatus::Failed(reason) => Self {
                status: QueueState::Failed,
                error: Some(reason),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub cache_directory: String,
    pub active_jobs: usize,
    pub uptime_seconds: u64,
}
