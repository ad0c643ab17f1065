use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use common::JobId;

use crate::staging::ArtifactStaging;
use crate::storage::Storage;

/// Liberación de recursos de un job. Corre una sola vez, termine como
/// termine el job: o por `finish()` o, si nadie la llamó, al soltarse.
///
/// Cada paso es independiente: si uno falla, se loguea y se sigue con el
/// siguiente. Nada de esto vuelve como error al job.
pub struct JobCleanup {
    job_id: JobId,
    storage: Arc<dyn Storage>,
    staging: Arc<dyn ArtifactStaging>,
    submit_dir: PathBuf,
    local_conf: PathBuf,
    done: bool,
}

impl JobCleanup {
    pub fn new(
        job_id: JobId,
        storage: Arc<dyn Storage>,
        staging: Arc<dyn ArtifactStaging>,
        submit_dir: PathBuf,
        local_conf: PathBuf,
    ) -> Self {
        Self {
            job_id,
            storage,
            staging,
            submit_dir,
            local_conf,
            done: false,
        }
    }

    /// Corre la limpieza y devuelve los pasos que fallaron.
    pub fn finish(mut self) -> Vec<String> {
        self.release_all()
    }

    fn release_all(&mut self) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.done = true;

        let mut failures = Vec::new();

        // 1) directorio de envío
        if let Err(e) = self.storage.delete(&self.submit_dir, true) {
            failures.push(format!("borrar {}: {}", self.submit_dir.display(), e));
        }

        // 2) copia local de la configuración
        if let Err(e) = self.storage.delete(&self.local_conf, false) {
            failures.push(format!("borrar {}: {}", self.local_conf.display(), e));
        }

        // 3) artefactos reclamados por este job
        if let Err(e) = self.staging.release(&self.job_id) {
            failures.push(format!("liberar caché: {e}"));
        }

        // 4) purga del caché compartido
        if let Err(e) = self.staging.purge_shared() {
            failures.push(format!("purgar caché: {e}"));
        }

        for f in &failures {
            warn!("error limpiando {}: {}", self.job_id, f);
        }
        debug!("limpieza de {} terminada", self.job_id);
        failures
    }
}

impl Drop for JobCleanup {
    fn drop(&mut self) {
        self.release_all();
    }
}
