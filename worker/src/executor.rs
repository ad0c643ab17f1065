use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use common::{
    task_counter, Counters, MapTaskContext, ReduceTaskContext, TaskAttemptId, TaskError,
    TaskExecutor, TaskStatusReport, TaskUmbilical,
};

use crate::wordcount::{count_line, parse_count_line, write_counts, WordCounts};

/// Cada cuántas líneas el map le avisa su progreso al job.
const REPORT_EVERY_LINES: u64 = 1_000;

/// WordCount como cuerpo de tarea: el map cuenta palabras de su split y el
/// reduce suma los conteos de todos los maps.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordCount;

/// Habla con el job desde un hilo de bloqueo.
struct Reporter {
    handle: Handle,
    umbilical: Arc<dyn TaskUmbilical>,
    attempt: TaskAttemptId,
}

impl Reporter {
    fn update(&self, progress: f32, counters: &Counters, state: &str) {
        let report = TaskStatusReport {
            attempt: self.attempt.clone(),
            progress,
            counters: counters.clone(),
            state_string: state.to_string(),
        };
        self.handle.block_on(self.umbilical.status_update(report));
    }

    fn done(&self) {
        self.handle.block_on(self.umbilical.done(&self.attempt));
    }
}

fn map_counters(records: u64, bytes: u64, written: usize) -> Counters {
    let mut c = Counters::new();
    c.increment(task_counter::GROUP, task_counter::MAP_INPUT_RECORDS, records as i64);
    c.increment(task_counter::GROUP, task_counter::MAP_INPUT_BYTES, bytes as i64);
    c.increment(task_counter::GROUP, task_counter::MAP_OUTPUT_RECORDS, written as i64);
    c
}

fn reduce_counters(records: u64, written: usize) -> Counters {
    let mut c = Counters::new();
    c.increment(task_counter::GROUP, task_counter::REDUCE_INPUT_RECORDS, records as i64);
    c.increment(task_counter::GROUP, task_counter::REDUCE_OUTPUT_RECORDS, written as i64);
    c
}

fn map_split(ctx: &MapTaskContext, reporter: &Reporter) -> Result<PathBuf, TaskError> {
    let mut reader = BufReader::new(File::open(&ctx.split.location)?);
    let total = ctx.split.length.max(1) as f32;

    let mut counts = WordCounts::new();
    let mut line = String::new();
    let (mut records, mut bytes) = (0u64, 0u64);

    loop {
        if ctx.is_interrupted() {
            return Err(TaskError::Interrupted);
        }
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        records += 1;
        bytes += n as u64;
        count_line(&line, &mut counts);

        if records % REPORT_EVERY_LINES == 0 {
            let progress = (bytes as f32 / total).min(1.0);
            reporter.update(progress, &map_counters(records, bytes, 0), "map");
        }
    }

    let written = write_counts(&ctx.output_path, &counts)?;
    reporter.update(1.0, &map_counters(records, bytes, written), "map");
    reporter.done();
    Ok(ctx.output_path.clone())
}

fn reduce_inputs(ctx: &ReduceTaskContext, reporter: &Reporter) -> Result<(), TaskError> {
    let total = ctx.inputs.len().max(1) as f32;
    let mut counts = WordCounts::new();
    let mut records = 0u64;

    for (i, input) in ctx.inputs.iter().enumerate() {
        let reader = BufReader::new(File::open(&input.path)?);
        for line in reader.lines() {
            if ctx.is_interrupted() {
                return Err(TaskError::Interrupted);
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (word, n) = parse_count_line(&line).ok_or_else(|| {
                TaskError::Failed(format!(
                    "línea inválida en {}: {:?}",
                    input.path.display(),
                    line
                ))
            })?;
            *counts.entry(word.to_string()).or_insert(0) += n;
            records += 1;
        }
        debug!("{}: entrada {} leída", ctx.attempt, input.map_attempt);
        reporter.update((i + 1) as f32 / total, &reduce_counters(records, 0), "reduce");
    }

    let written = write_counts(&ctx.output_path, &counts)?;
    reporter.update(1.0, &reduce_counters(records, written), "reduce");
    reporter.done();
    Ok(())
}

#[async_trait]
impl TaskExecutor for WordCount {
    async fn run_map(
        &self,
        ctx: MapTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<PathBuf, TaskError> {
        info!(
            "map {} (input={} output={})",
            ctx.attempt,
            ctx.split.location.display(),
            ctx.output_path.display()
        );
        let attempt = ctx.attempt.clone();
        let reporter = Reporter {
            handle: Handle::current(),
            umbilical,
            attempt: attempt.clone(),
        };

        // el conteo es bloqueante, va en un hilo aparte
        match tokio::task::spawn_blocking(move || map_split(&ctx, &reporter)).await {
            Ok(res) => res,
            Err(e) => {
                warn!("panic o join error en {}: {:?}", attempt, e);
                Err(TaskError::Panicked(e.to_string()))
            }
        }
    }

    async fn run_reduce(
        &self,
        ctx: ReduceTaskContext,
        umbilical: Arc<dyn TaskUmbilical>,
    ) -> Result<(), TaskError> {
        info!(
            "reduce {} ({} entradas, output={})",
            ctx.attempt,
            ctx.inputs.len(),
            ctx.output_path.display()
        );
        let attempt = ctx.attempt.clone();
        let reporter = Reporter {
            handle: Handle::current(),
            umbilical,
            attempt: attempt.clone(),
        };

        match tokio::task::spawn_blocking(move || reduce_inputs(&ctx, &reporter)).await {
            Ok(res) => res,
            Err(e) => {
                warn!("panic o join error en {}: {:?}", attempt, e);
                Err(TaskError::Panicked(e.to_string()))
            }
        }
    }
}
