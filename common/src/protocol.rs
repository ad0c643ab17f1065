//! Las dos superficies de protocolo del runner.
//!
//! Aunque hoy todo corre en el mismo proceso, las llamadas se modelan como
//! si fueran remotas: cada request/response es un tipo serializable y los
//! dos lados quedan separados en traits distintos. `ClientProtocol` es lo
//! que ve quien envía y monitorea jobs; `TaskUmbilical` es lo que ven las
//! tareas para reportar progreso.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cluster::{
    ClusterMetrics, QueueAclsInfo, QueueInfo, TaskCompletionEvent, TaskReport, TrackerInfo,
    TrackerState,
};
use crate::counters::Counters;
use crate::error::EngineResult;
use crate::ids::{JobId, TaskAttemptId, TaskKind};
use crate::job::JobStatus;

/* --------- Lado de envío / monitoreo --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    /// Si viene vacío, el runner asigna uno nuevo.
    pub job_id: Option<JobId>,
    /// Directorio con `job.json` y `job.splits.json`
    pub submit_dir: PathBuf,
}

#[async_trait]
pub trait ClientProtocol: Send + Sync {
    async fn new_job_id(&self) -> JobId;

    async fn submit_job(&self, req: SubmitJobRequest) -> EngineResult<JobStatus>;

    async fn kill_job(&self, job_id: &JobId) -> EngineResult<()>;

    async fn set_job_priority(&self, job_id: &JobId, priority: &str) -> EngineResult<()>;

    async fn kill_task(&self, attempt: &TaskAttemptId, should_fail: bool) -> EngineResult<bool>;

    async fn job_status(&self, job_id: &JobId) -> Option<JobStatus>;

    async fn job_counters(&self, job_id: &JobId) -> EngineResult<Counters>;

    async fn task_reports(&self, job_id: &JobId, kind: TaskKind) -> Vec<TaskReport>;

    async fn task_completion_events(
        &self,
        job_id: &JobId,
        from_event_id: u32,
        max_events: u32,
    ) -> Vec<TaskCompletionEvent>;

    async fn task_diagnostics(&self, attempt: &TaskAttemptId) -> Vec<String>;

    async fn all_jobs(&self) -> Vec<JobStatus>;

    async fn cluster_metrics(&self) -> ClusterMetrics;

    async fn tracker_state(&self) -> TrackerState;

    async fn tracker_expiry_interval(&self) -> u64;

    async fn active_trackers(&self) -> Vec<TrackerInfo>;

    async fn blacklisted_trackers(&self) -> Vec<TrackerInfo>;

    async fn queues(&self) -> Vec<QueueInfo>;

    async fn root_queues(&self) -> Vec<QueueInfo>;

    async fn child_queues(&self, queue: &str) -> Vec<QueueInfo>;

    async fn queue(&self, queue: &str) -> Option<QueueInfo>;

    async fn queue_acls(&self) -> Vec<QueueAclsInfo>;

    async fn filesystem_name(&self) -> String;

    async fn system_dir(&self) -> PathBuf;

    async fn staging_area_dir(&self) -> PathBuf;

    async fn job_history_dir(&self) -> Option<PathBuf>;
}

/* --------- Lado de las tareas --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub attempt: TaskAttemptId,
    /// Fracción en [0, 1]
    pub progress: f32,
    pub counters: Counters,
    pub state_string: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecordRange {
    pub start: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapCompletionEventsRequest {
    pub job_id: JobId,
    pub from_event_id: u32,
    pub max_events: u32,
    pub attempt: TaskAttemptId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapCompletionEventsUpdate {
    pub events: Vec<TaskCompletionEvent>,
    pub should_reset: bool,
}

/// Canal por el que una tarea le habla al job que la lanzó.
///
/// Salvo `ping` y `can_commit`, todas las llamadas son "fire and forget"
/// desde el punto de vista de la tarea.
#[async_trait]
pub trait TaskUmbilical: Send + Sync {
    async fn status_update(&self, report: TaskStatusReport) -> bool;

    async fn commit_pending(&self, report: TaskStatusReport);

    async fn done(&self, attempt: &TaskAttemptId);

    async fn ping(&self, attempt: &TaskAttemptId) -> bool;

    async fn can_commit(&self, attempt: &TaskAttemptId) -> bool;

    async fn fs_error(&self, attempt: &TaskAttemptId, message: &str);

    async fn fatal_error(&self, attempt: &TaskAttemptId, message: &str);

    async fn shuffle_error(&self, attempt: &TaskAttemptId, message: &str);

    async fn report_diagnostic_info(&self, attempt: &TaskAttemptId, trace: &str);

    async fn report_next_record_range(&self, attempt: &TaskAttemptId, range: RecordRange);

    async fn map_completion_events(
        &self,
        req: MapCompletionEventsRequest,
    ) -> MapCompletionEventsUpdate;
}
