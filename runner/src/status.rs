use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use common::{Counters, JobStatus, RunState, TaskAttemptId};

/// Tabla de estado y contadores de un job.
///
/// La escriben el controlador y los reportes de las tareas (desde varios
/// hilos a la vez) y la lee el API de monitoreo; todo pasa por el mismo
/// lock, así que nadie ve una suma a medias.
pub struct StatusTable {
    inner: Mutex<Inner>,
}

struct Inner {
    status: JobStatus,
    map_index: HashMap<TaskAttemptId, usize>,
    partial_map_progress: Vec<f32>,
    /// `None` = la tarea todavía no reportó nada
    map_counters: Vec<Option<Counters>>,
    reduce_counters: Option<Counters>,
}

impl Inner {
    fn recompute_map_progress(&mut self) {
        if self.partial_map_progress.is_empty() {
            return;
        }
        let total: f32 = self.partial_map_progress.iter().sum();
        self.status.map_progress = total / self.partial_map_progress.len() as f32;
    }
}

impl StatusTable {
    pub fn new(status: JobStatus) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status,
                map_index: HashMap::new(),
                partial_map_progress: Vec::new(),
                map_counters: Vec::new(),
                reduce_counters: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepara un slot por tarea map, en el orden de los splits.
    pub fn init_maps(&self, ids: &[TaskAttemptId]) {
        let mut inner = self.lock();
        inner.map_index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        inner.partial_map_progress = vec![0.0; ids.len()];
        inner.map_counters = vec![None; ids.len()];
        inner.reduce_counters = None;
    }

    pub fn snapshot(&self) -> JobStatus {
        self.lock().status.clone()
    }

    pub fn run_state(&self) -> RunState {
        self.lock().status.run_state
    }

    /// Un estado terminal ya no se mueve.
    pub fn set_run_state(&self, state: RunState) {
        let mut inner = self.lock();
        if !inner.status.run_state.is_terminal() {
            inner.status.run_state = state;
        }
    }

    pub fn set_setup_progress(&self, progress: f32) {
        self.lock().status.setup_progress = progress.clamp(0.0, 1.0);
    }

    pub fn set_cleanup_progress(&self, progress: f32) {
        self.lock().status.cleanup_progress = progress.clamp(0.0, 1.0);
    }

    /// Publica el estado terminal y devuelve el snapshot final.
    pub fn finish(&self, state: RunState) -> JobStatus {
        let mut inner = self.lock();
        if !inner.status.run_state.is_terminal() {
            inner.status.run_state = state;
            inner.status.finished_at = Some(Utc::now());
        }
        inner.status.clone()
    }

    /// Guarda el último reporte de una tarea. Los contadores se reemplazan,
    /// no se acumulan.
    pub fn status_update(&self, attempt: &TaskAttemptId, progress: f32, counters: Counters) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };

        let mut inner = self.lock();
        match inner.map_index.get(attempt).copied() {
            Some(i) => {
                inner.partial_map_progress[i] = progress;
                inner.map_counters[i] = Some(counters);
                inner.recompute_map_progress();
            }
            None => {
                // si no es un map, es el reduce
                inner.reduce_counters = Some(counters);
                inner.status.reduce_progress = progress;
            }
        }
    }

    /// La tarea terminó: su parte vale 1.0 sin importar el último reporte.
    pub fn done(&self, attempt: &TaskAttemptId) {
        let mut inner = self.lock();
        match inner.map_index.get(attempt).copied() {
            Some(i) => {
                inner.partial_map_progress[i] = 1.0;
                if inner.partial_map_progress.iter().all(|p| *p >= 1.0) {
                    inner.status.map_progress = 1.0;
                } else {
                    inner.recompute_map_progress();
                }
            }
            None => inner.status.reduce_progress = 1.0,
        }
    }

    /// Suma, calculada en el momento, de los últimos contadores de cada tarea.
    pub fn current_counters(&self) -> Counters {
        let inner = self.lock();
        let identity = Counters::default();

        let maps: Counters = inner
            .map_counters
            .iter()
            .map(|c| c.as_ref().unwrap_or(&identity))
            .sum();
        Counters::sum(&maps, inner.reduce_counters.as_ref().unwrap_or(&identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{JobId, TaskKind};
    use std::sync::Arc;

    fn table_with_maps(n: u32) -> (StatusTable, Vec<TaskAttemptId>) {
        let job = JobId::local(1);
        let table = StatusTable::new(JobStatus::new(job.clone(), "wc", "ana"));
        let ids: Vec<_> = (0..n)
            .map(|i| TaskAttemptId::new(&job, TaskKind::Map, i))
            .collect();
        table.init_maps(&ids);
        (table, ids)
    }

    fn one(name: &str, v: i64) -> Counters {
        let mut c = Counters::new();
        c.increment("g", name, v);
        c
    }

    #[test]
    fn map_progress_is_the_mean_regardless_of_arrival_order() {
        let progress = [0.25_f32, 0.5, 1.0];
        let expected = progress.iter().sum::<f32>() / 3.0;

        for order in [[0usize, 1, 2], [2, 1, 0], [1, 2, 0]] {
            let (table, ids) = table_with_maps(3);
            for i in order {
                table.status_update(&ids[i], progress[i], Counters::new());
            }
            assert_eq!(table.snapshot().map_progress, expected);
        }
    }

    #[test]
    fn progress_outside_unit_range_is_clamped() {
        let (table, ids) = table_with_maps(1);
        table.status_update(&ids[0], 7.0, Counters::new());
        assert_eq!(table.snapshot().map_progress, 1.0);
        table.status_update(&ids[0], -1.0, Counters::new());
        assert_eq!(table.snapshot().map_progress, 0.0);
    }

    #[test]
    fn counters_are_replaced_per_task_not_accumulated() {
        let (table, ids) = table_with_maps(2);
        table.status_update(&ids[0], 0.1, one("x", 5));
        table.status_update(&ids[0], 0.2, one("x", 7));
        table.status_update(&ids[1], 0.1, one("x", 1));

        assert_eq!(table.current_counters().get("g", "x"), 8);
    }

    #[test]
    fn unknown_attempt_is_treated_as_the_reduce() {
        let (table, ids) = table_with_maps(1);
        let reduce = TaskAttemptId::new(ids[0].job(), TaskKind::Reduce, 0);

        table.status_update(&ids[0], 1.0, one("m", 2));
        table.status_update(&reduce, 0.5, one("r", 3));

        let snap = table.snapshot();
        assert_eq!(snap.reduce_progress, 0.5);
        assert_eq!(snap.map_progress, 1.0);

        let counters = table.current_counters();
        assert_eq!(counters.get("g", "m"), 2);
        assert_eq!(counters.get("g", "r"), 3);
    }

    #[test]
    fn done_forces_full_progress_for_that_side() {
        let (table, ids) = table_with_maps(2);
        let reduce = TaskAttemptId::new(ids[0].job(), TaskKind::Reduce, 0);

        table.status_update(&ids[0], 0.99, Counters::new());
        table.done(&ids[0]);
        assert_eq!(table.snapshot().map_progress, 0.5);

        table.done(&ids[1]);
        assert_eq!(table.snapshot().map_progress, 1.0);

        table.status_update(&reduce, 0.3, Counters::new());
        table.done(&reduce);
        assert_eq!(table.snapshot().reduce_progress, 1.0);
    }

    #[test]
    fn counters_before_any_report_are_empty() {
        let job = JobId::local(1);
        let table = StatusTable::new(JobStatus::new(job, "wc", "ana"));
        assert!(table.current_counters().is_empty());

        let (table, _) = table_with_maps(3);
        assert!(table.current_counters().is_empty());
    }

    #[test]
    fn terminal_state_is_not_overwritten() {
        let (table, _) = table_with_maps(1);
        let final_status = table.finish(RunState::Killed);
        assert_eq!(final_status.run_state, RunState::Killed);
        assert!(final_status.finished_at.is_some());

        table.set_run_state(RunState::Commit);
        table.finish(RunState::Succeeded);
        assert_eq!(table.run_state(), RunState::Killed);
    }

    #[test]
    fn concurrent_reports_do_not_lose_updates() {
        let (table, ids) = table_with_maps(8);
        let table = Arc::new(table);

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for step in 1..=100 {
                        table.status_update(&id, step as f32 / 100.0, one("x", step));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(table.snapshot().map_progress, 1.0);
        assert_eq!(table.current_counters().get("g", "x"), 8 * 100);
    }
}
