use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::ids::JobId;

/// Descriptor del job tal como lo deja el cliente en el directorio de envío
/// (`job.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConf {
    pub name: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Patrón de archivos de entrada, ej: "/data/input/*.txt".
    /// Cada archivo que haga match es un split.
    #[serde(default)]
    pub input_glob: String,

    /// Directorio de salida final del job
    pub output_dir: PathBuf,

    /// Reducers pedidos. En modo local sólo se admite 0 ó 1.
    #[serde(default = "default_num_reduce_tasks")]
    pub num_reduce_tasks: i32,

    /// Máximo de tareas map corriendo a la vez dentro de este job.
    #[serde(default = "default_local_max_maps")]
    pub local_max_maps: i64,

    /// Archivos auxiliares que se copian al caché local antes de correr tareas.
    #[serde(default)]
    pub cache_files: Vec<PathBuf>,

    /// URL a la que se avisa cuando termina el job.
    /// Admite `$jobId` y `$jobStatus`.
    #[serde(default)]
    pub end_notification_url: Option<String>,

    #[serde(default)]
    pub end_notification_retries: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub end_notification_retry_interval_ms: u64,
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "dummy".to_string())
}

fn default_num_reduce_tasks() -> i32 {
    1
}

fn default_local_max_maps() -> i64 {
    1
}

fn default_retry_interval_ms() -> u64 {
    30_000
}

impl JobConf {
    pub fn new(name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            user: default_user(),
            input_glob: String::new(),
            output_dir: output_dir.into(),
            num_reduce_tasks: default_num_reduce_tasks(),
            local_max_maps: default_local_max_maps(),
            cache_files: Vec::new(),
            end_notification_url: None,
            end_notification_retries: 0,
            end_notification_retry_interval_ms: default_retry_interval_ms(),
        }
    }

    /// Cantidad de reducers que de verdad corren: cualquier valor fuera de
    /// {0, 1} se fuerza a 1.
    pub fn effective_reduce_tasks(&self) -> usize {
        if self.num_reduce_tasks > 1 || self.num_reduce_tasks < 0 {
            1
        } else {
            self.num_reduce_tasks as usize
        }
    }

    pub fn max_local_maps(&self) -> EngineResult<usize> {
        if self.local_max_maps < 1 {
            return Err(EngineError::Configuration(format!(
                "local_max_maps debe ser >= 1 (vale {})",
                self.local_max_maps
            )));
        }
        Ok(usize::try_from(self.local_max_maps).unwrap_or(usize::MAX))
    }
}

/// Metadatos de un split de entrada (`job.splits.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMetaInfo {
    pub index: u32,
    pub location: PathBuf,
    pub start: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Setup,
    MapPhase,
    ReducePhase,
    Commit,
    Succeeded,
    Failed,
    Killed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Killed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Init => "INIT",
            RunState::Setup => "SETUP",
            RunState::MapPhase => "MAP_PHASE",
            RunState::ReducePhase => "REDUCE_PHASE",
            RunState::Commit => "COMMIT",
            RunState::Succeeded => "SUCCEEDED",
            RunState::Failed => "FAILED",
            RunState::Killed => "KILLED",
        }
    }
}

/// Snapshot del estado de un job. Lo que ve el API de monitoreo: estado y
/// fracciones de progreso, nunca trazas de error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub name: String,
    pub user: String,
    pub run_state: RunState,

    pub setup_progress: f32,
    pub map_progress: f32,
    pub reduce_progress: f32,
    pub cleanup_progress: f32,

    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub fn new(job_id: JobId, name: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            job_id,
            name: name.into(),
            user: user.into(),
            run_state: RunState::Init,
            setup_progress: 0.0,
            map_progress: 0.0,
            reduce_progress: 0.0,
            cleanup_progress: 0.0,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.run_state.is_terminal()
    }
}
