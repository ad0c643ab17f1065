use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::ids::TaskAttemptId;
use crate::job::{JobConf, SplitMetaInfo};
use crate::protocol::TaskUmbilical;

/// Lo que recibe una tarea map para correr.
#[derive(Debug, Clone)]
pub struct MapTaskContext {
    pub attempt: TaskAttemptId,
    pub conf: Arc<JobConf>,
    pub split: SplitMetaInfo,
    /// Dónde debe quedar la salida de esta partición
    pub output_path: PathBuf,
    /// Señal de interrupción cooperativa: la tarea debe mirarla seguido.
    pub cancel: CancellationToken,
}

/// Una salida de map ya movida al área de entrada del reduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceInput {
    pub map_attempt: TaskAttemptId,
    pub path: PathBuf,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct ReduceTaskContext {
    pub attempt: TaskAttemptId,
    pub conf: Arc<JobConf>,
    /// Entradas ordenadas por índice de map
    pub inputs: Vec<ReduceInput>,
    pub output_path: PathBuf,
    pub cancel: CancellationToken,
}

impl MapTaskContext {
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl ReduceTaskContext {
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Cuerpo de las tareas. El runner sólo necesita poder llamarlo una vez por
/// intento; qué hace con los registros no le importa.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Corre una tarea map y devuelve la ruta de su salida.
    async fn run_map(
        &self,
        ctx: MapTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<PathBuf, TaskError>;

    async fn run_reduce(
        &self,
        ctx: ReduceTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<(), TaskError>;
}
