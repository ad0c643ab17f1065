use std::sync::atomic::{AtomicUsize, Ordering};

/// Contadores de tareas en vuelo, compartidos por todos los jobs del runner.
/// De acá sale `cluster_metrics()`.
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    running_maps: AtomicUsize,
    running_reduces: AtomicUsize,
}

impl RunnerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running_maps(&self) -> usize {
        self.running_maps.load(Ordering::SeqCst)
    }

    pub fn running_reduces(&self) -> usize {
        self.running_reduces.load(Ordering::SeqCst)
    }

    /// Cuenta una tarea map en vuelo hasta que se suelta el guard.
    pub fn map_started(&self) -> RunningTask<'_> {
        RunningTask::enter(&self.running_maps)
    }

    pub fn reduce_started(&self) -> RunningTask<'_> {
        RunningTask::enter(&self.running_reduces)
    }
}

pub struct RunningTask<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> RunningTask<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for RunningTask<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
