use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use common::{JobId, StorageError};

use crate::storage::Storage;

/// Copia de artefactos auxiliares (archivos "de caché") al área local.
///
/// `setup` tiene que ir antes de que corra cualquier tarea; `release` y
/// `purge_shared` después de que el job llegó a estado terminal.
pub trait ArtifactStaging: Send + Sync {
    /// Localiza `files` para el job y devuelve las rutas locales.
    fn setup(
        &self,
        job_id: &JobId,
        work_area: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<PathBuf>, StorageError>;

    /// Suelta lo que el job tenía reclamado.
    fn release(&self, job_id: &JobId) -> Result<(), StorageError>;

    /// Borra del caché compartido lo que ya nadie usa.
    fn purge_shared(&self) -> Result<(), StorageError>;
}

#[derive(Debug)]
struct CacheEntry {
    refs: usize,
    source: PathBuf,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<PathBuf, CacheEntry>,
    claims: HashMap<JobId, Vec<PathBuf>>,
}

/// Caché local compartido entre jobs, con conteo de referencias.
pub struct LocalCache {
    cache_dir: PathBuf,
    storage: Arc<dyn Storage>,
    state: Mutex<CacheState>,
}

impl LocalCache {
    pub fn new(cache_dir: impl Into<PathBuf>, storage: Arc<dyn Storage>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            storage,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Nombre dentro del caché: hash de la ruta original + nombre de archivo,
    /// para que dos archivos homónimos de distintas carpetas no choquen.
    fn cached_path(&self, source: &Path) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        self.cache_dir
            .join(format!("{:016x}-{}", hasher.finish(), name))
    }

    pub fn refs(&self, source: &Path) -> usize {
        let cached = self.cached_path(source);
        self.lock().entries.get(&cached).map(|e| e.refs).unwrap_or(0)
    }
}

impl ArtifactStaging for LocalCache {
    fn setup(
        &self,
        job_id: &JobId,
        work_area: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<PathBuf>, StorageError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        self.storage.mkdirs(&self.cache_dir)?;

        let mut state = self.lock();
        let mut localized = Vec::with_capacity(files.len());

        for source in files {
            let cached = self.cached_path(source);

            // sólo se copia la primera vez; después se reusa
            if !state.entries.contains_key(&cached) || !self.storage.exists(&cached) {
                self.storage.copy(source, &cached)?;
                debug!(
                    "artefacto {} copiado al caché como {}",
                    source.display(),
                    cached.display()
                );
            }

            let entry = state.entries.entry(cached.clone()).or_insert(CacheEntry {
                refs: 0,
                source: source.clone(),
            });
            entry.refs += 1;

            state
                .claims
                .entry(job_id.clone())
                .or_default()
                .push(cached.clone());
            localized.push(cached);
        }

        info!(
            "job {}: {} artefactos localizados para {}",
            job_id,
            localized.len(),
            work_area.display()
        );
        Ok(localized)
    }

    fn release(&self, job_id: &JobId) -> Result<(), StorageError> {
        let mut state = self.lock();
        let Some(claimed) = state.claims.remove(job_id) else {
            return Ok(());
        };

        for cached in claimed {
            if let Some(entry) = state.entries.get_mut(&cached) {
                entry.refs = entry.refs.saturating_sub(1);
            }
        }
        Ok(())
    }

    fn purge_shared(&self) -> Result<(), StorageError> {
        let mut state = self.lock();

        let unused: Vec<PathBuf> = state
            .entries
            .iter()
            .filter(|(_, e)| e.refs == 0)
            .map(|(p, _)| p.clone())
            .collect();

        let mut first_err = None;
        for cached in unused {
            if let Err(e) = self.storage.delete(&cached, false) {
                warn!("no se pudo purgar {}: {}", cached.display(), e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
                continue;
            }
            if let Some(entry) = state.entries.remove(&cached) {
                debug!("purgado del caché: {}", entry.source.display());
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
