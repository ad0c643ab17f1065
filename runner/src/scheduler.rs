use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::{EngineError, EngineResult, TaskError};

use crate::task::{MapOutput, MapTaskEnv, MapTaskRunnable};

/// Pool acotado de tareas map: nunca hay más de `bound` corriendo a la vez.
///
/// La espera no tiene timeout. Una tarea colgada cuelga el job entero; se
/// prefiere eso a marcar como fallido un job que sólo iba lento.
#[derive(Debug, Clone, Copy)]
pub struct MapScheduler {
    bound: usize,
}

impl MapScheduler {
    pub fn new(bound: usize) -> EngineResult<Self> {
        if bound < 1 {
            return Err(EngineError::Configuration(format!(
                "el pool de maps necesita al menos 1 hilo (pedido {bound})"
            )));
        }
        Ok(Self { bound })
    }

    /// Tamaño del pool para un job: `min(configurado, tareas)`, mínimo 1.
    pub fn for_job(configured_max: usize, num_tasks: usize) -> EngineResult<Self> {
        if configured_max < 1 {
            return Self::new(configured_max);
        }
        Self::new(configured_max.min(num_tasks).max(1))
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Corre todas las tareas y vuelve recién cuando cada una terminó, falló
    /// o quedó abandonada por la cancelación.
    ///
    /// Si `cancel` se dispara, las que no arrancaron se abandonan y las que
    /// están corriendo ven la señal en su contexto.
    pub async fn run_all(
        &self,
        runnables: Vec<MapTaskRunnable>,
        env: Arc<MapTaskEnv>,
        cancel: &CancellationToken,
    ) -> SchedulerReport {
        let total = runnables.len();
        debug!("pool de maps: {} hilos, {} tareas", self.bound, total);

        let semaphore = Arc::new(Semaphore::new(self.bound));
        let blanks: Vec<MapTaskRunnable> = runnables.iter().map(|r| r.blank_copy()).collect();
        let mut set = JoinSet::new();

        for runnable in runnables {
            let semaphore = semaphore.clone();
            let env = env.clone();
            let cancel = cancel.clone();
            let mut blank = runnable.blank_copy();

            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let Some(_permit) = permit else {
                    return runnable.abandon();
                };

                // tarea aparte para que un pánico quede guardado como error
                // de esta tarea y no se pierda el slot
                match tokio::spawn(runnable.run(env, cancel.child_token())).await {
                    Ok(done) => done,
                    Err(e) => {
                        warn!("la tarea {} terminó mal: {}", blank.attempt, e);
                        blank.stored_error = Some(TaskError::Panicked(e.to_string()));
                        blank
                    }
                }
            });
        }

        let mut slots: Vec<Option<MapTaskRunnable>> = (0..total).map(|_| None).collect();

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(runnable) => {
                    let i = runnable.index;
                    slots[i] = Some(runnable);
                }
                Err(e) => warn!("se perdió una tarea del pool de maps: {}", e),
            }
        }

        let runnables: Vec<MapTaskRunnable> = slots
            .into_iter()
            .zip(blanks)
            .map(|(slot, blank)| slot.unwrap_or_else(|| blank.abandon()))
            .collect();

        let interrupted: Vec<usize> = runnables
            .iter()
            .filter(|r| r.interrupted)
            .map(|r| r.index)
            .collect();

        if interrupted.is_empty() {
            info!("pool de maps terminado ({} tareas)", total);
        } else {
            warn!(
                "pool de maps cancelado; {} tareas interrumpidas: {:?}",
                interrupted.len(),
                interrupted
            );
        }

        SchedulerReport {
            runnables,
            interrupted,
        }
    }
}

/// Resultado del pool, con las tareas en el orden en que se enviaron.
pub struct SchedulerReport {
    pub runnables: Vec<MapTaskRunnable>,
    pub interrupted: Vec<usize>,
}

impl SchedulerReport {
    /// Primer error guardado, recorriendo en orden de envío.
    pub fn first_error(&self) -> Option<&MapTaskRunnable> {
        self.runnables.iter().find(|r| r.stored_error.is_some())
    }

    /// Salidas de todas las tareas, o el primer error (en orden de envío).
    pub fn into_outputs(self) -> EngineResult<Vec<MapOutput>> {
        if let Some(index) = self.first_error().map(|r| r.index) {
            let failed = self.runnables.into_iter().find(|r| r.index == index);
            return Err(match failed {
                Some(MapTaskRunnable { attempt, stored_error: Some(source), .. }) => {
                    EngineError::TaskExecution { attempt, source }
                }
                _ => EngineError::Internal(format!("error perdido de la tarea {index}")),
            });
        }

        let mut outputs = Vec::with_capacity(self.runnables.len());
        for mut runnable in self.runnables {
            match runnable.output.take() {
                Some(out) => outputs.push(out),
                None => {
                    return Err(EngineError::Cancelled(format!(
                        "la tarea {} no llegó a correr",
                        runnable.attempt
                    )))
                }
            }
        }
        Ok(outputs)
    }
}
