use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ids::TaskAttemptId;

/// Errores del almacenamiento local. "No existe" se distingue de
/// "permiso" y de "conflicto" para que el llamador pueda decidir.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no existe: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permiso denegado: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("ya existe: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("falló {op} sobre {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub fn from_io(op: &'static str, path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_path_buf()),
            _ => StorageError::Io {
                op,
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Lo que puede devolver el cuerpo de una tarea map o reduce.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("error de E/S en la tarea: {0}")]
    Io(#[from] io::Error),

    #[error("tarea interrumpida")]
    Interrupted,

    #[error("la tarea entró en pánico: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("error de configuración: {0}")]
    Configuration(String),

    #[error("no encontrado: {0}")]
    NotFound(String),

    #[error("operación no soportada: {0}")]
    Unsupported(String),

    #[error("error de almacenamiento: {0}")]
    Storage(#[from] StorageError),

    #[error("falló la tarea {attempt}: {source}")]
    TaskExecution {
        attempt: TaskAttemptId,
        #[source]
        source: TaskError,
    },

    #[error("cancelado: {0}")]
    Cancelled(String),

    #[error("error al confirmar la salida del job: {0}")]
    Commit(String),

    #[error("error al abortar la salida del job: {0}")]
    Abort(String),

    #[error("error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("error interno: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_distinct_storage_kinds() {
        let p = Path::new("/tmp/x");
        let nf = StorageError::from_io("rename", p, io::Error::from(io::ErrorKind::NotFound));
        assert!(nf.is_not_found());

        let denied =
            StorageError::from_io("mkdirs", p, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, StorageError::PermissionDenied(_)));

        let conflict =
            StorageError::from_io("create", p, io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(conflict, StorageError::AlreadyExists(_)));

        let other = StorageError::from_io("delete", p, io::Error::other("disco lleno"));
        assert!(matches!(other, StorageError::Io { op: "delete", .. }));
    }
}
