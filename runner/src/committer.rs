use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use common::{EngineError, EngineResult, JobConf, RunState};

use crate::storage::Storage;

pub const TEMP_DIR_NAME: &str = "_temporary";
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Protocolo de confirmación de la salida de un job.
///
/// Se llama una vez cada operación: `setup_job` y `commit_job` en el camino
/// feliz, o `setup_job` y `abort_job` si algo falla.
pub trait OutputCommitter: Send + Sync {
    /// Directorio donde las tareas escriben antes de confirmar.
    fn work_path(&self, conf: &JobConf) -> PathBuf;

    fn setup_job(&self, conf: &JobConf) -> EngineResult<()>;

    fn commit_job(&self, conf: &JobConf) -> EngineResult<()>;

    fn abort_job(&self, conf: &JobConf, state: RunState) -> EngineResult<()>;
}

/// Las tareas escriben en `<output>/_temporary`; al confirmar se promueve
/// todo al directorio de salida y se deja un `_SUCCESS`.
pub struct FileOutputCommitter {
    storage: Arc<dyn Storage>,
}

impl FileOutputCommitter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl OutputCommitter for FileOutputCommitter {
    fn work_path(&self, conf: &JobConf) -> PathBuf {
        conf.output_dir.join(TEMP_DIR_NAME)
    }

    fn setup_job(&self, conf: &JobConf) -> EngineResult<()> {
        let work = self.work_path(conf);
        self.storage.mkdirs(&work)?;
        debug!("directorio temporal de salida listo: {}", work.display());
        Ok(())
    }

    fn commit_job(&self, conf: &JobConf) -> EngineResult<()> {
        let work = self.work_path(conf);
        let commit_err = |e: common::StorageError| EngineError::Commit(e.to_string());

        let mut promoted = 0;
        if self.storage.exists(&work) {
            for entry in self.storage.list(&work).map_err(commit_err)? {
                let Some(name) = entry.file_name() else {
                    continue;
                };
                let dest = conf.output_dir.join(name);
                self.storage.rename(&entry, &dest).map_err(commit_err)?;
                promoted += 1;
            }
            self.storage.delete(&work, true).map_err(commit_err)?;
        }

        self.storage
            .create(&conf.output_dir.join(SUCCESS_MARKER), b"")
            .map_err(commit_err)?;

        info!(
            "salida confirmada en {} ({} archivos)",
            conf.output_dir.display(),
            promoted
        );
        Ok(())
    }

    fn abort_job(&self, conf: &JobConf, state: RunState) -> EngineResult<()> {
        let work = self.work_path(conf);
        self.storage
            .delete(&work, true)
            .map_err(|e| EngineError::Abort(e.to_string()))?;
        info!(
            "salida abortada ({}), borrado {}",
            state.as_str(),
            work.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFs;
    use std::fs;

    fn committer() -> FileOutputCommitter {
        FileOutputCommitter::new(Arc::new(LocalFs))
    }

    #[test]
    fn commit_promotes_work_files_and_marks_success() {
        let tmp = tempfile::tempdir().unwrap();
        let conf = JobConf::new("wc", tmp.path().join("out"));
        let c = committer();

        c.setup_job(&conf).unwrap();
        fs::write(c.work_path(&conf).join("part-r-00000"), "hola,1\n").unwrap();
        c.commit_job(&conf).unwrap();

        assert_eq!(
            fs::read_to_string(conf.output_dir.join("part-r-00000")).unwrap(),
            "hola,1\n"
        );
        assert!(conf.output_dir.join(SUCCESS_MARKER).exists());
        assert!(!c.work_path(&conf).exists());
    }

    #[test]
    fn abort_removes_the_work_dir_without_marking_success() {
        let tmp = tempfile::tempdir().unwrap();
        let conf = JobConf::new("wc", tmp.path().join("out"));
        let c = committer();

        c.setup_job(&conf).unwrap();
        fs::write(c.work_path(&conf).join("part-m-00000"), "x").unwrap();
        c.abort_job(&conf, RunState::Failed).unwrap();

        assert!(!c.work_path(&conf).exists());
        assert!(!conf.output_dir.join(SUCCESS_MARKER).exists());
    }
}
