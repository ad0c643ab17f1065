use std::env;
use std::path::{Path, PathBuf};

use common::{JobId, TaskAttemptId};

/// Subdirectorio del directorio local donde viven los jobs en curso.
pub const LOCAL_RUNNER_DIR: &str = "localRunner";

/// Directorios que usa el runner.
///
/// Cada uno se puede sobreescribir con una env var:
/// - `LOCALRUN_LOCAL_DIR`: área de trabajo local de jobs y tareas
/// - `LOCALRUN_SYSTEM_DIR`: "system dir" que se informa a los clientes
/// - `LOCALRUN_STAGING_DIR`: raíz de las áreas de staging de envío
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub local_dir: PathBuf,
    pub system_dir: PathBuf,
    pub staging_root: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::rooted_at(&env::temp_dir().join("localrun"))
    }
}

impl RunnerConfig {
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            local_dir: base.join("local"),
            system_dir: base.join("mapred").join("system"),
            staging_root: base.join("mapred").join("staging"),
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            local_dir: env_path("LOCALRUN_LOCAL_DIR").unwrap_or(defaults.local_dir),
            system_dir: env_path("LOCALRUN_SYSTEM_DIR").unwrap_or(defaults.system_dir),
            staging_root: env_path("LOCALRUN_STAGING_DIR").unwrap_or(defaults.staging_root),
        }
    }

    /// Caché compartido de artefactos auxiliares (entre jobs).
    pub fn cache_dir(&self) -> PathBuf {
        self.local_dir.join("cache")
    }

    pub fn layout(&self, job_id: &JobId) -> JobLayout {
        let runner_dir = self.local_dir.join(LOCAL_RUNNER_DIR);
        JobLayout {
            job_dir: runner_dir.join(job_id.to_string()),
            conf_copy: runner_dir.join(format!("{job_id}.json")),
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Dónde queda cada cosa de un job dentro del directorio local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    /// `<local>/localRunner/<job_id>/`
    pub job_dir: PathBuf,
    /// Copia localizada de la configuración: `<local>/localRunner/<job_id>.json`
    pub conf_copy: PathBuf,
}

impl JobLayout {
    pub fn attempt_dir(&self, attempt: &TaskAttemptId) -> PathBuf {
        self.job_dir.join(attempt.to_string())
    }

    pub fn map_output_file(&self, attempt: &TaskAttemptId) -> PathBuf {
        self.attempt_dir(attempt).join("output").join("file.out")
    }

    pub fn reduce_input_dir(&self, reduce: &TaskAttemptId) -> PathBuf {
        self.attempt_dir(reduce).join("input")
    }
}
