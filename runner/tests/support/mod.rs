#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use common::{
    task_counter, Counters, EngineError, EngineResult, JobConf, JobId, JobStatus, MapTaskContext,
    ReduceInput, ReduceTaskContext, RunState, StorageError, TaskError, TaskExecutor,
    TaskStatusReport, TaskUmbilical,
};
use runner::{
    stage_job, ArtifactStaging, FileOutputCommitter, JobEndNotifier, LocalFs, LocalJobRunner,
    OutputCommitter, RunnerConfig,
};

/// Ejecutor de prueba: cada map copia su split a la salida y el reduce
/// concatena sus entradas. Se le puede pedir que falle o que espere.
#[derive(Default)]
pub struct ScriptedExecutor {
    pub fail_maps: Vec<u32>,
    pub map_delay: Option<Duration>,
    /// Si está, cada map espera un permiso antes de terminar.
    pub gate: Option<Arc<Semaphore>>,
    pub map_started: Arc<Notify>,

    pub active_maps: AtomicUsize,
    pub peak_maps: AtomicUsize,
    pub reduce_runs: AtomicUsize,
    pub reduce_inputs: Mutex<Vec<ReduceInput>>,
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn run_map(
        &self,
        ctx: MapTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<PathBuf, TaskError> {
        let now = self.active_maps.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_maps.fetch_max(now, Ordering::SeqCst);
        self.map_started.notify_one();

        let result = self.map_body(&ctx, umbilical).await;

        self.active_maps.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn run_reduce(
        &self,
        ctx: ReduceTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<(), TaskError> {
        self.reduce_runs.fetch_add(1, Ordering::SeqCst);
        *self.reduce_inputs.lock().unwrap() = ctx.inputs.clone();

        let mut merged = Vec::new();
        for input in &ctx.inputs {
            merged.extend(fs::read(&input.path)?);
        }
        write_file(&ctx.output_path, &merged)?;

        let mut counters = Counters::new();
        counters.increment(
            task_counter::GROUP,
            task_counter::REDUCE_INPUT_RECORDS,
            ctx.inputs.len() as i64,
        );
        umbilical
            .status_update(TaskStatusReport {
                attempt: ctx.attempt.clone(),
                progress: 1.0,
                counters,
                state_string: "reduce".to_string(),
            })
            .await;
        umbilical.done(&ctx.attempt).await;
        Ok(())
    }
}

impl ScriptedExecutor {
    async fn map_body(
        &self,
        ctx: &MapTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<PathBuf, TaskError> {
        let mut counters = Counters::new();
        counters.increment(task_counter::GROUP, task_counter::MAP_INPUT_RECORDS, 1);
        umbilical
            .status_update(TaskStatusReport {
                attempt: ctx.attempt.clone(),
                progress: 0.5,
                counters,
                state_string: "map".to_string(),
            })
            .await;

        if let Some(delay) = self.map_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.fail_maps.contains(&ctx.attempt.index()) {
            return Err(TaskError::Failed(format!("map {} falló a propósito", ctx.attempt)));
        }

        let contents = fs::read(&ctx.split.location)?;
        write_file(&ctx.output_path, &contents)?;
        umbilical.done(&ctx.attempt).await;
        Ok(ctx.output_path.clone())
    }
}

fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

#[derive(Default)]
pub struct CountingStaging {
    pub setups: AtomicUsize,
    pub releases: AtomicUsize,
    pub purges: AtomicUsize,
}

impl ArtifactStaging for CountingStaging {
    fn setup(
        &self,
        _job_id: &JobId,
        _work_area: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<PathBuf>, StorageError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(files.to_vec())
    }

    fn release(&self, _job_id: &JobId) -> Result<(), StorageError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn purge_shared(&self) -> Result<(), StorageError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Committer real, pero contando las llamadas. Los interruptores hacen
/// fallar el commit o el abort después de contarlos.
pub struct CountingCommitter {
    pub inner: FileOutputCommitter,
    pub fail_commit: bool,
    pub fail_abort: bool,
    pub setups: AtomicUsize,
    pub commits: AtomicUsize,
    pub aborts: Mutex<Vec<RunState>>,
}

impl Default for CountingCommitter {
    fn default() -> Self {
        Self {
            inner: FileOutputCommitter::new(Arc::new(LocalFs)),
            fail_commit: false,
            fail_abort: false,
            setups: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            aborts: Mutex::new(Vec::new()),
        }
    }
}

impl OutputCommitter for CountingCommitter {
    fn work_path(&self, conf: &JobConf) -> PathBuf {
        self.inner.work_path(conf)
    }

    fn setup_job(&self, conf: &JobConf) -> EngineResult<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        self.inner.setup_job(conf)
    }

    fn commit_job(&self, conf: &JobConf) -> EngineResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            return Err(EngineError::Commit("commit roto a propósito".to_string()));
        }
        self.inner.commit_job(conf)
    }

    fn abort_job(&self, conf: &JobConf, state: RunState) -> EngineResult<()> {
        self.aborts.lock().unwrap().push(state);
        if self.fail_abort {
            return Err(EngineError::Abort("abort roto a propósito".to_string()));
        }
        self.inner.abort_job(conf, state)
    }
}

/// Guarda cada aviso de fin. Con `delay` tarda en entregarlo, como un
/// endpoint lento.
#[derive(Default)]
pub struct RecordingNotifier {
    pub delay: Option<Duration>,
    pub seen: Mutex<Vec<(JobId, RunState)>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<(JobId, RunState)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobEndNotifier for RecordingNotifier {
    async fn notify(&self, _conf: &JobConf, status: &JobStatus) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen
            .lock()
            .unwrap()
            .push((status.job_id.clone(), status.run_state));
    }
}

/// Un runner con colaboradores de prueba sobre un directorio temporal.
pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub executor: Arc<ScriptedExecutor>,
    pub staging: Arc<CountingStaging>,
    pub committer: Arc<CountingCommitter>,
    pub notifier: Arc<RecordingNotifier>,
    pub runner: LocalJobRunner,
}

impl Harness {
    pub fn new(executor: ScriptedExecutor) -> Self {
        Self::with(
            executor,
            CountingCommitter::default(),
            RecordingNotifier::default(),
        )
    }

    pub fn with(
        executor: ScriptedExecutor,
        committer: CountingCommitter,
        notifier: RecordingNotifier,
    ) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let executor = Arc::new(executor);
        let staging = Arc::new(CountingStaging::default());
        let committer = Arc::new(committer);
        let notifier = Arc::new(notifier);

        let runner = LocalJobRunner::builder(RunnerConfig::rooted_at(tmp.path()), executor.clone())
            .with_staging(staging.clone())
            .with_committer(committer.clone())
            .with_notifier(notifier.clone())
            .build();

        Self {
            tmp,
            executor,
            staging,
            committer,
            notifier,
            runner,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    /// Escribe `n` archivos de entrada y deja un job listo para enviar.
    pub fn stage(&self, splits: usize, configure: impl FnOnce(&mut JobConf)) -> PathBuf {
        let input = self.tmp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        for i in 0..splits {
            fs::write(input.join(format!("part{i}.txt")), format!("linea {i}\n")).unwrap();
        }

        let mut conf = JobConf::new("prueba", self.output_dir());
        conf.input_glob = format!("{}/*.txt", input.display());
        configure(&mut conf);

        let submit_dir = self.tmp.path().join("submit");
        stage_job(&LocalFs, &submit_dir, &conf).unwrap();
        submit_dir
    }
}
