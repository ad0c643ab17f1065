use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::{
    Counters, EngineError, EngineResult, JobConf, JobId, JobStatus, MapCompletionEventsRequest,
    MapCompletionEventsUpdate, RecordRange, ReduceTaskContext, RunState, TaskAttemptId, TaskKind,
    TaskStatusReport, TaskUmbilical,
};

use crate::cleanup::JobCleanup;
use crate::config::JobLayout;
use crate::handoff::hand_off;
use crate::registry::JobServices;
use crate::scheduler::MapScheduler;
use crate::status::StatusTable;
use crate::submit::read_splits;
use crate::task::{MapOutput, MapTaskEnv, MapTaskRunnable};

/// Nombre del único archivo que deja el reduce en el directorio de trabajo.
pub const REDUCE_OUTPUT_FILE: &str = "part-r-00000";

/// Salida de la tarea map `index` cuando el job no tiene reduce.
pub fn map_only_output_file(work_path: &Path, index: usize) -> PathBuf {
    work_path.join(format!("part-m-{index:05}"))
}

/// Un job en curso: la máquina de estados que lo lleva de INIT a su estado
/// terminal, más el lado "umbilical" que usan sus tareas para reportar.
pub struct JobController {
    id: JobId,
    submit_dir: PathBuf,
    conf: Arc<JobConf>,
    layout: JobLayout,
    services: Arc<JobServices>,

    table: StatusTable,
    kill: CancellationToken,
    failure: Mutex<Option<String>>,
    completion: watch::Sender<bool>,
}

impl JobController {
    pub fn new(id: JobId, submit_dir: PathBuf, conf: JobConf, services: Arc<JobServices>) -> Self {
        let layout = services.config.layout(&id);
        let table = StatusTable::new(JobStatus::new(id.clone(), &conf.name, &conf.user));
        let (completion, _) = watch::channel(false);

        Self {
            id,
            submit_dir,
            conf: Arc::new(conf),
            layout,
            services,
            table,
            kill: CancellationToken::new(),
            failure: Mutex::new(None),
            completion,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn conf(&self) -> &JobConf {
        &self.conf
    }

    pub fn status(&self) -> JobStatus {
        self.table.snapshot()
    }

    pub fn current_counters(&self) -> Counters {
        self.table.current_counters()
    }

    /// Causa del fallo, si el job falló. El API de monitoreo no la expone.
    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Marca el job para matarlo. Es pegajoso: no se puede deshacer, y
    /// si el job ya terminó no cambia nada.
    pub fn kill(&self) {
        if !self.kill.is_cancelled() {
            info!("matando job {}", self.id);
        }
        self.kill.cancel();
    }

    /// Espera a que el job termine, con la limpieza hecha y el aviso de fin
    /// ya entregado.
    pub async fn wait(&self) -> JobStatus {
        let mut rx = self.completion.subscribe();
        let _ = rx.wait_for(|done| *done).await;
        self.status()
    }

    /// Corre el job de punta a punta. Se llama una sola vez, desde la tarea
    /// tokio propia del job.
    pub async fn run(self: Arc<Self>) {
        let cleanup = JobCleanup::new(
            self.id.clone(),
            self.services.storage.clone(),
            self.services.staging.clone(),
            self.submit_dir.clone(),
            self.layout.conf_copy.clone(),
        );

        // un pánico en la máquina de estados se trata como un fallo más
        let outcome = match tokio::spawn(self.clone().drive()).await {
            Ok(res) => res,
            Err(e) => Err(EngineError::Internal(format!("el job entró en pánico: {e}"))),
        };

        let mut final_state = match outcome {
            Ok(()) => RunState::Succeeded,
            Err(e) => {
                warn!("el job {} falló: {}", self.id, e);
                if let Err(abort_err) = self
                    .services
                    .committer
                    .abort_job(&self.conf, RunState::Failed)
                {
                    warn!("no se pudo abortar la salida de {}: {}", self.id, abort_err);
                }
                self.table.set_cleanup_progress(1.0);
                *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                RunState::Failed
            }
        };
        if self.kill.is_cancelled() {
            final_state = RunState::Killed;
        }

        let status = self.table.finish(final_state);
        info!("job {} terminó en {}", self.id, status.run_state.as_str());

        cleanup.finish();

        // wait() no vuelve hasta que el aviso sale; un pánico del notificador
        // no puede dejar a nadie esperando
        let notifier = self.services.notifier.clone();
        let conf = self.conf.clone();
        let delivery = tokio::spawn(async move {
            notifier.notify(&conf, &status).await;
        });
        if let Err(e) = delivery.await {
            warn!("el aviso de fin de {} entró en pánico: {}", self.id, e);
        }

        let _ = self.completion.send(true);
    }

    async fn drive(self: Arc<Self>) -> EngineResult<()> {
        let task_conf = self.setup()?;
        self.check_killed("después del setup")?;

        let (map_attempts, outputs) = self.run_maps(task_conf.clone()).await?;

        if self.conf.effective_reduce_tasks() == 1 {
            self.table.set_run_state(RunState::ReducePhase);
            let result = self.run_reduce(outputs, task_conf).await;
            self.purge_map_scratch(&map_attempts);
            result?;
        }

        self.check_killed("antes del commit")?;
        self.table.set_run_state(RunState::Commit);
        self.services.committer.commit_job(&self.conf)?;
        self.table.set_cleanup_progress(1.0);
        Ok(())
    }

    /// Prepara el área local del job. Devuelve la configuración que ven las
    /// tareas, con los artefactos ya localizados.
    fn setup(&self) -> EngineResult<Arc<JobConf>> {
        self.table.set_run_state(RunState::Setup);
        let storage = self.services.storage.as_ref();

        storage.mkdirs(&self.layout.job_dir)?;

        let localized =
            self.services
                .staging
                .setup(&self.id, &self.layout.job_dir, &self.conf.cache_files)?;
        let mut local_conf = (*self.conf).clone();
        local_conf.cache_files = localized;

        storage.create(
            &self.layout.conf_copy,
            &serde_json::to_vec_pretty(&local_conf)?,
        )?;

        self.services.committer.setup_job(&self.conf)?;
        self.table.set_setup_progress(1.0);
        debug!("setup de {} listo en {}", self.id, self.layout.job_dir.display());

        Ok(Arc::new(local_conf))
    }

    async fn run_maps(
        self: &Arc<Self>,
        task_conf: Arc<JobConf>,
    ) -> EngineResult<(Vec<TaskAttemptId>, Vec<MapOutput>)> {
        self.table.set_run_state(RunState::MapPhase);

        let splits = read_splits(self.services.storage.as_ref(), &self.submit_dir)?;
        let num_reduces = self.conf.effective_reduce_tasks();
        let scheduler = MapScheduler::for_job(self.conf.max_local_maps()?, splits.len())?;

        let attempts: Vec<TaskAttemptId> = (0..splits.len())
            .map(|i| TaskAttemptId::new(&self.id, TaskKind::Map, i as u32))
            .collect();
        self.table.init_maps(&attempts);

        info!(
            "job {}: {} splits, {} reduce, {} maps a la vez",
            self.id,
            splits.len(),
            num_reduces,
            scheduler.bound()
        );

        let work_path = self.services.committer.work_path(&self.conf);
        let runnables: Vec<MapTaskRunnable> = splits
            .into_iter()
            .zip(attempts.iter().cloned())
            .enumerate()
            .map(|(i, (split, attempt))| {
                let output_path = if num_reduces > 0 {
                    self.layout.map_output_file(&attempt)
                } else {
                    map_only_output_file(&work_path, i)
                };
                MapTaskRunnable::new(i, attempt, task_conf.clone(), split, output_path)
            })
            .collect();

        let env = Arc::new(MapTaskEnv {
            executor: self.services.executor.clone(),
            umbilical: self.clone(),
            metrics: self.services.metrics.clone(),
        });

        let report = scheduler.run_all(runnables, env, &self.kill).await;
        let outputs = report.into_outputs()?;
        Ok((attempts, outputs))
    }

    async fn run_reduce(
        self: &Arc<Self>,
        outputs: Vec<MapOutput>,
        task_conf: Arc<JobConf>,
    ) -> EngineResult<()> {
        let attempt = TaskAttemptId::new(&self.id, TaskKind::Reduce, 0);

        self.check_killed("antes del handoff")?;
        let inputs = hand_off(
            self.services.storage.as_ref(),
            outputs,
            &self.layout.reduce_input_dir(&attempt),
            &self.kill,
        )?;
        self.check_killed("antes del reduce")?;

        let ctx = ReduceTaskContext {
            attempt: attempt.clone(),
            conf: task_conf,
            inputs,
            output_path: self
                .services
                .committer
                .work_path(&self.conf)
                .join(REDUCE_OUTPUT_FILE),
            cancel: self.kill.child_token(),
        };

        info!("arrancando tarea {}", attempt);
        let result = {
            let _running = self.services.metrics.reduce_started();
            self.services.executor.run_reduce(ctx, self.clone()).await
        };

        match result {
            Ok(()) => {
                info!("terminando tarea {}", attempt);
                Ok(())
            }
            Err(source) => Err(EngineError::TaskExecution { attempt, source }),
        }
    }

    /// Borra el área de trabajo local de cada map.
    fn purge_map_scratch(&self, attempts: &[TaskAttemptId]) {
        for attempt in attempts {
            let dir = self.layout.attempt_dir(attempt);
            if let Err(e) = self.services.storage.delete(&dir, true) {
                warn!("no se pudo borrar {}: {}", dir.display(), e);
            }
        }
    }

    fn check_killed(&self, phase: &str) -> EngineResult<()> {
        if self.kill.is_cancelled() {
            return Err(EngineError::Cancelled(format!("job {} matado {}", self.id, phase)));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskUmbilical for JobController {
    async fn status_update(&self, report: TaskStatusReport) -> bool {
        debug!(
            "{}: {:.2} {}",
            report.attempt, report.progress, report.state_string
        );
        self.table
            .status_update(&report.attempt, report.progress, report.counters);
        true
    }

    async fn commit_pending(&self, report: TaskStatusReport) {
        self.status_update(report).await;
    }

    async fn done(&self, attempt: &TaskAttemptId) {
        debug!("{} avisó que terminó", attempt);
        self.table.done(attempt);
    }

    async fn ping(&self, _attempt: &TaskAttemptId) -> bool {
        true
    }

    async fn can_commit(&self, _attempt: &TaskAttemptId) -> bool {
        true
    }

    async fn fs_error(&self, attempt: &TaskAttemptId, message: &str) {
        error!("error de filesystem en {}: {}", attempt, message);
    }

    async fn fatal_error(&self, attempt: &TaskAttemptId, message: &str) {
        error!("error fatal en {}: {}", attempt, message);
    }

    async fn shuffle_error(&self, attempt: &TaskAttemptId, message: &str) {
        error!("error de shuffle en {}: {}", attempt, message);
    }

    async fn report_diagnostic_info(&self, attempt: &TaskAttemptId, trace: &str) {
        debug!("diagnóstico de {}: {}", attempt, trace);
    }

    async fn report_next_record_range(&self, attempt: &TaskAttemptId, range: RecordRange) {
        info!(
            "{} va a procesar registros [{}, +{})",
            attempt, range.start, range.length
        );
    }

    async fn map_completion_events(
        &self,
        _req: MapCompletionEventsRequest,
    ) -> MapCompletionEventsUpdate {
        MapCompletionEventsUpdate::default()
    }
}
