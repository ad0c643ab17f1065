use std::fs;
use std::path::{Path, PathBuf};

use common::StorageError;

/// Operaciones de almacenamiento que necesita el runner.
pub trait Storage: Send + Sync {
    /// Crea (o pisa) un archivo con este contenido, creando los padres.
    fn create(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Copia un archivo, creando los padres del destino.
    fn copy(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Devuelve `false` si no había nada que borrar.
    fn delete(&self, path: &Path, recursive: bool) -> Result<bool, StorageError>;

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError>;

    fn mkdirs(&self, path: &Path) -> Result<(), StorageError>;

    fn stat_size(&self, path: &Path) -> Result<u64, StorageError>;

    fn exists(&self, path: &Path) -> bool;

    /// Entradas directas de un directorio, ordenadas por nombre.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError>;
}

/// Sistema de archivos local.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Storage for LocalFs {
    fn create(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.mkdirs(parent)?;
            }
        }
        fs::write(path, contents).map_err(|e| StorageError::from_io("create", path, e))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        fs::read(path).map_err(|e| StorageError::from_io("read", path, e))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if let Some(parent) = to.parent() {
            if !parent.as_os_str().is_empty() {
                self.mkdirs(parent)?;
            }
        }
        fs::copy(from, to)
            .map(|_| ())
            .map_err(|e| StorageError::from_io("copy", from, e))
    }

    fn delete(&self, path: &Path, recursive: bool) -> Result<bool, StorageError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StorageError::from_io("delete", path, e)),
        };

        let res = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)
            } else {
                fs::remove_dir(path)
            }
        } else {
            fs::remove_file(path)
        };

        res.map(|_| true)
            .map_err(|e| StorageError::from_io("delete", path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        fs::rename(from, to).map_err(|e| StorageError::from_io("rename", from, e))
    }

    fn mkdirs(&self, path: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(path).map_err(|e| StorageError::from_io("mkdirs", path, e))
    }

    fn stat_size(&self, path: &Path) -> Result<u64, StorageError> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| StorageError::from_io("stat", path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let entries = fs::read_dir(dir).map_err(|e| StorageError::from_io("list", dir, e))?;

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::from_io("list", dir, e))?;
            out.push(entry.path());
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_parents_and_stat_reports_size() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a").join("b").join("f.txt");

        LocalFs.create(&file, b"hola").unwrap();
        assert_eq!(LocalFs.stat_size(&file).unwrap(), 4);
    }

    #[test]
    fn copy_keeps_the_source_and_read_sees_both() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dst = tmp.path().join("x").join("dst.txt");
        LocalFs.create(&src, b"datos").unwrap();

        LocalFs.copy(&src, &dst).unwrap();
        assert_eq!(LocalFs.read(&src).unwrap(), b"datos");
        assert_eq!(LocalFs.read(&dst).unwrap(), b"datos");
    }

    #[test]
    fn missing_paths_are_reported_as_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");

        assert!(LocalFs.stat_size(&missing).unwrap_err().is_not_found());
        assert!(LocalFs
            .rename(&missing, &tmp.path().join("dst"))
            .unwrap_err()
            .is_not_found());
        assert!(LocalFs.read(&missing).unwrap_err().is_not_found());
        assert!(!LocalFs.delete(&missing, true).unwrap());
    }

    #[test]
    fn non_recursive_delete_refuses_a_non_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("d");
        LocalFs.create(&dir.join("f"), b"x").unwrap();

        assert!(LocalFs.delete(&dir, false).is_err());
        assert!(LocalFs.delete(&dir, true).unwrap());
        assert!(!LocalFs.exists(&dir));
    }

    #[test]
    fn mkdirs_over_a_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f");
        LocalFs.create(&file, b"x").unwrap();

        assert!(LocalFs.mkdirs(&file.join("sub")).is_err());
    }

    #[test]
    fn list_returns_sorted_entries() {
        let tmp = tempfile::tempdir().unwrap();
        LocalFs.create(&tmp.path().join("b"), b"").unwrap();
        LocalFs.create(&tmp.path().join("a"), b"").unwrap();

        let names: Vec<_> = LocalFs
            .list(tmp.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
