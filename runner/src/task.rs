use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::{
    JobConf, MapTaskContext, SplitMetaInfo, TaskAttemptId, TaskError, TaskExecutor, TaskUmbilical,
};

use crate::metrics::RunnerMetrics;

/// Salida de una tarea map. No es `Clone`: se mueve de la tarea al handoff
/// y la ruta original no se vuelve a usar.
#[derive(Debug, PartialEq, Eq)]
pub struct MapOutput {
    pub index: usize,
    pub attempt: TaskAttemptId,
    pub path: PathBuf,
}

/// Lo que comparten todas las tareas map de un job.
pub struct MapTaskEnv {
    pub executor: Arc<dyn TaskExecutor>,
    pub umbilical: Arc<dyn TaskUmbilical>,
    pub metrics: Arc<RunnerMetrics>,
}

/// Envuelve la ejecución de una tarea map y guarda su resultado: la salida
/// o el primer error. El error no se propaga acá; lo levanta el
/// controlador cuando terminaron todas.
pub struct MapTaskRunnable {
    pub index: usize,
    pub attempt: TaskAttemptId,
    conf: Arc<JobConf>,
    split: SplitMetaInfo,
    output_path: PathBuf,

    pub stored_error: Option<TaskError>,
    pub output: Option<MapOutput>,
    pub interrupted: bool,
}

impl MapTaskRunnable {
    pub fn new(
        index: usize,
        attempt: TaskAttemptId,
        conf: Arc<JobConf>,
        split: SplitMetaInfo,
        output_path: PathBuf,
    ) -> Self {
        Self {
            index,
            attempt,
            conf,
            split,
            output_path,
            stored_error: None,
            output: None,
            interrupted: false,
        }
    }

    /// Copia sin resultado; el scheduler la usa si la tarea original se pierde
    /// por un pánico.
    pub(crate) fn blank_copy(&self) -> Self {
        Self::new(
            self.index,
            self.attempt.clone(),
            self.conf.clone(),
            self.split.clone(),
            self.output_path.clone(),
        )
    }

    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }

    pub async fn run(mut self, env: Arc<MapTaskEnv>, cancel: CancellationToken) -> Self {
        info!("arrancando tarea {}", self.attempt);

        let ctx = MapTaskContext {
            attempt: self.attempt.clone(),
            conf: self.conf.clone(),
            split: self.split.clone(),
            output_path: self.output_path.clone(),
            cancel: cancel.clone(),
        };

        let result = {
            let _running = env.metrics.map_started();
            env.executor.run_map(ctx, env.umbilical.clone()).await
        };

        match result {
            Ok(path) => {
                info!("terminando tarea {}", self.attempt);
                self.output = Some(MapOutput {
                    index: self.index,
                    attempt: self.attempt.clone(),
                    path,
                });
            }
            Err(e) => {
                if matches!(e, TaskError::Interrupted) || cancel.is_cancelled() {
                    self.interrupted = true;
                }
                warn!("la tarea {} falló: {}", self.attempt, e);
                self.stored_error = Some(e);
            }
        }
        self
    }

    /// La tarea nunca arrancó porque el job se canceló antes.
    pub(crate) fn abandon(mut self) -> Self {
        self.interrupted = true;
        self
    }
}
