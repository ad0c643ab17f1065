use std::path::{Path, PathBuf};

use glob::glob;
use tracing::{debug, info, warn};

use common::{EngineError, EngineResult, JobConf, SplitMetaInfo};

use crate::storage::Storage;

/// Descriptor del job dentro del directorio de envío.
pub const JOB_CONF_FILE: &str = "job.json";
/// Metadatos de los splits dentro del directorio de envío.
pub const JOB_SPLITS_FILE: &str = "job.splits.json";

/// Deja un job listo para enviar: un split por archivo que haga match con
/// `conf.input_glob`, ordenados por ruta.
pub fn stage_job(
    storage: &dyn Storage,
    submit_dir: &Path,
    conf: &JobConf,
) -> EngineResult<Vec<SplitMetaInfo>> {
    let splits = compute_splits(storage, &conf.input_glob)?;
    if splits.is_empty() {
        warn!("el patrón {:?} no encontró archivos", conf.input_glob);
    }

    storage.mkdirs(submit_dir)?;
    write_job_conf(storage, submit_dir, conf)?;
    write_splits(storage, submit_dir, &splits)?;

    info!(
        "job {:?} preparado en {} ({} splits)",
        conf.name,
        submit_dir.display(),
        splits.len()
    );
    Ok(splits)
}

fn compute_splits(storage: &dyn Storage, pattern: &str) -> EngineResult<Vec<SplitMetaInfo>> {
    if pattern.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries = glob(pattern).map_err(|e| {
        EngineError::Configuration(format!("patrón input_glob inválido {pattern:?}: {e}"))
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("no se pudo leer una entrada de {:?}: {}", pattern, e),
        }
    }
    files.sort();

    files
        .into_iter()
        .enumerate()
        .map(|(i, location)| {
            let length = storage.stat_size(&location)?;
            Ok(SplitMetaInfo {
                index: i as u32,
                location,
                start: 0,
                length,
            })
        })
        .collect()
}

pub fn write_job_conf(storage: &dyn Storage, dir: &Path, conf: &JobConf) -> EngineResult<()> {
    let bytes = serde_json::to_vec_pretty(conf)?;
    storage.create(&dir.join(JOB_CONF_FILE), &bytes)?;
    Ok(())
}

pub fn read_job_conf(storage: &dyn Storage, submit_dir: &Path) -> EngineResult<JobConf> {
    let path = submit_dir.join(JOB_CONF_FILE);
    let bytes = storage.read(&path)?;
    let conf = serde_json::from_slice(&bytes)?;
    debug!("leído {}", path.display());
    Ok(conf)
}

pub fn write_splits(
    storage: &dyn Storage,
    dir: &Path,
    splits: &[SplitMetaInfo],
) -> EngineResult<()> {
    let bytes = serde_json::to_vec_pretty(splits)?;
    storage.create(&dir.join(JOB_SPLITS_FILE), &bytes)?;
    Ok(())
}

pub fn read_splits(storage: &dyn Storage, submit_dir: &Path) -> EngineResult<Vec<SplitMetaInfo>> {
    let bytes = storage.read(&submit_dir.join(JOB_SPLITS_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}
