use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use common::{
    ClientProtocol, ClusterMetrics, Counters, EngineError, EngineResult, JobId, JobStatus,
    QueueAclsInfo, QueueInfo, SubmitJobRequest, TaskAttemptId, TaskCompletionEvent, TaskExecutor,
    TaskKind, TaskReport, TrackerInfo, TrackerState,
};

use crate::committer::{FileOutputCommitter, OutputCommitter};
use crate::config::RunnerConfig;
use crate::job::JobController;
use crate::metrics::RunnerMetrics;
use crate::notifier::{HttpNotifier, JobEndNotifier};
use crate::staging::{ArtifactStaging, LocalCache};
use crate::storage::{LocalFs, Storage};
use crate::submit::read_job_conf;

/// Colaboradores que comparten todos los jobs de un runner.
pub struct JobServices {
    pub config: RunnerConfig,
    pub executor: Arc<dyn TaskExecutor>,
    pub storage: Arc<dyn Storage>,
    pub staging: Arc<dyn ArtifactStaging>,
    pub committer: Arc<dyn OutputCommitter>,
    pub notifier: Arc<dyn JobEndNotifier>,
    pub metrics: Arc<RunnerMetrics>,
}

/// Runner de jobs en proceso: recibe envíos, corre cada job en su propia
/// tarea tokio y contesta consultas de estado.
pub struct LocalJobRunner {
    services: Arc<JobServices>,
    jobs: Mutex<HashMap<JobId, Arc<JobController>>>,
    next_job_seq: AtomicU32,
}

pub struct LocalJobRunnerBuilder {
    config: RunnerConfig,
    executor: Arc<dyn TaskExecutor>,
    storage: Option<Arc<dyn Storage>>,
    staging: Option<Arc<dyn ArtifactStaging>>,
    committer: Option<Arc<dyn OutputCommitter>>,
    notifier: Option<Arc<dyn JobEndNotifier>>,
}

impl LocalJobRunnerBuilder {
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_staging(mut self, staging: Arc<dyn ArtifactStaging>) -> Self {
        self.staging = Some(staging);
        self
    }

    pub fn with_committer(mut self, committer: Arc<dyn OutputCommitter>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn JobEndNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> LocalJobRunner {
        let storage = self.storage.unwrap_or_else(|| Arc::new(LocalFs));
        let staging = self.staging.unwrap_or_else(|| {
            Arc::new(LocalCache::new(self.config.cache_dir(), storage.clone()))
        });
        let committer = self
            .committer
            .unwrap_or_else(|| Arc::new(FileOutputCommitter::new(storage.clone())));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(HttpNotifier::new()));

        LocalJobRunner {
            services: Arc::new(JobServices {
                config: self.config,
                executor: self.executor,
                storage,
                staging,
                committer,
                notifier,
                metrics: Arc::new(RunnerMetrics::new()),
            }),
            jobs: Mutex::new(HashMap::new()),
            next_job_seq: AtomicU32::new(1),
        }
    }
}

impl LocalJobRunner {
    pub fn builder(config: RunnerConfig, executor: Arc<dyn TaskExecutor>) -> LocalJobRunnerBuilder {
        LocalJobRunnerBuilder {
            config,
            executor,
            storage: None,
            staging: None,
            committer: None,
            notifier: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.services.config
    }

    pub fn metrics(&self) -> &RunnerMetrics {
        &self.services.metrics
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobController>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn controller(&self, job_id: &JobId) -> Option<Arc<JobController>> {
        self.jobs().get(job_id).cloned()
    }

    fn allocate_job_id(&self) -> JobId {
        JobId::local(self.next_job_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Espera a que un job enviado termine y devuelve su estado final.
    pub async fn wait_for_completion(&self, job_id: &JobId) -> EngineResult<JobStatus> {
        let controller = self
            .controller(job_id)
            .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
        Ok(controller.wait().await)
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "dummy".to_string())
}

#[async_trait]
impl ClientProtocol for LocalJobRunner {
    async fn new_job_id(&self) -> JobId {
        self.allocate_job_id()
    }

    async fn submit_job(&self, req: SubmitJobRequest) -> EngineResult<JobStatus> {
        let job_id = req.job_id.unwrap_or_else(|| self.allocate_job_id());
        let conf = read_job_conf(self.services.storage.as_ref(), &req.submit_dir)?;

        let controller = Arc::new(JobController::new(
            job_id.clone(),
            req.submit_dir,
            conf,
            self.services.clone(),
        ));

        {
            let mut jobs = self.jobs();
            if jobs.contains_key(&job_id) {
                return Err(EngineError::Configuration(format!(
                    "ya hay un job con id {job_id}"
                )));
            }
            jobs.insert(job_id.clone(), controller.clone());
        }

        let status = controller.status();
        info!("job {} recibido ({})", job_id, controller.conf().name);
        tokio::spawn(controller.run());
        Ok(status)
    }

    async fn kill_job(&self, job_id: &JobId) -> EngineResult<()> {
        match self.controller(job_id) {
            Some(controller) => {
                controller.kill();
                Ok(())
            }
            None => {
                warn!("kill de un job desconocido: {}", job_id);
                Err(EngineError::NotFound(format!("job {job_id}")))
            }
        }
    }

    async fn set_job_priority(&self, _job_id: &JobId, _priority: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported(
            "cambiar la prioridad de un job no se soporta en modo local".to_string(),
        ))
    }

    async fn kill_task(&self, _attempt: &TaskAttemptId, _should_fail: bool) -> EngineResult<bool> {
        Err(EngineError::Unsupported(
            "matar una tarea suelta no se soporta en modo local".to_string(),
        ))
    }

    async fn job_status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.controller(job_id).map(|c| c.status())
    }

    async fn job_counters(&self, job_id: &JobId) -> EngineResult<Counters> {
        self.controller(job_id)
            .map(|c| c.current_counters())
            .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))
    }

    async fn task_reports(&self, _job_id: &JobId, _kind: TaskKind) -> Vec<TaskReport> {
        Vec::new()
    }

    async fn task_completion_events(
        &self,
        _job_id: &JobId,
        _from_event_id: u32,
        _max_events: u32,
    ) -> Vec<TaskCompletionEvent> {
        Vec::new()
    }

    async fn task_diagnostics(&self, _attempt: &TaskAttemptId) -> Vec<String> {
        Vec::new()
    }

    async fn all_jobs(&self) -> Vec<JobStatus> {
        Vec::new()
    }

    async fn cluster_metrics(&self) -> ClusterMetrics {
        let maps = self.services.metrics.running_maps() as u32;
        let reduces = self.services.metrics.running_reduces() as u32;
        let submissions = self.jobs().len() as u32;
        ClusterMetrics {
            running_maps: maps,
            running_reduces: reduces,
            occupied_map_slots: maps,
            occupied_reduce_slots: reduces,
            reserved_map_slots: 0,
            reserved_reduce_slots: 0,
            map_slot_capacity: 1,
            reduce_slot_capacity: 1,
            total_job_submissions: submissions,
            num_trackers: 1,
            num_blacklisted_trackers: 0,
            num_decommissioned_nodes: 0,
        }
    }

    async fn tracker_state(&self) -> TrackerState {
        TrackerState::Running
    }

    async fn tracker_expiry_interval(&self) -> u64 {
        0
    }

    async fn active_trackers(&self) -> Vec<TrackerInfo> {
        Vec::new()
    }

    async fn blacklisted_trackers(&self) -> Vec<TrackerInfo> {
        Vec::new()
    }

    async fn queues(&self) -> Vec<QueueInfo> {
        Vec::new()
    }

    async fn root_queues(&self) -> Vec<QueueInfo> {
        Vec::new()
    }

    async fn child_queues(&self, _queue: &str) -> Vec<QueueInfo> {
        Vec::new()
    }

    async fn queue(&self, _queue: &str) -> Option<QueueInfo> {
        None
    }

    async fn queue_acls(&self) -> Vec<QueueAclsInfo> {
        Vec::new()
    }

    async fn filesystem_name(&self) -> String {
        "file:///".to_string()
    }

    async fn system_dir(&self) -> PathBuf {
        self.services.config.system_dir.clone()
    }

    async fn staging_area_dir(&self) -> PathBuf {
        let user = current_user();
        self.services
            .config
            .staging_root
            .join(format!("{}{}", user, Uuid::new_v4().simple()))
            .join(".staging")
    }

    async fn job_history_dir(&self) -> Option<PathBuf> {
        None
    }
}
