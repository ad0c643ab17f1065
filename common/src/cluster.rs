use serde::{Deserialize, Serialize};

use crate::ids::TaskAttemptId;

/// Métricas "de cluster". En modo local se arman en vivo a partir de los
/// contadores de tareas en vuelo; el resto son constantes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub running_maps: u32,
    pub running_reduces: u32,
    pub occupied_map_slots: u32,
    pub occupied_reduce_slots: u32,
    pub reserved_map_slots: u32,
    pub reserved_reduce_slots: u32,
    pub map_slot_capacity: u32,
    pub reduce_slot_capacity: u32,
    pub total_job_submissions: u32,
    pub num_trackers: u32,
    pub num_blacklisted_trackers: u32,
    pub num_decommissioned_nodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerState {
    Initializing,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerInfo {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    pub state: String,
    pub scheduling_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueAclsInfo {
    pub queue: String,
    pub operations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub attempt: TaskAttemptId,
    pub progress: f32,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletionEvent {
    pub event_id: u32,
    pub attempt: TaskAttemptId,
    pub succeeded: bool,
}
