use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use common::{EngineError, EngineResult, ReduceInput};

use crate::storage::Storage;
use crate::task::MapOutput;

/// Ruta de la salida del map `index` dentro de la entrada del reduce.
pub fn reduce_input_path(reduce_input_dir: &Path, index: usize) -> PathBuf {
    reduce_input_dir.join(format!("map_{index}.out"))
}

/// Mueve cada salida de map a la entrada del reduce, en orden de índice.
///
/// Un error de almacenamiento corta en el acto; lo que ya se movió queda
/// movido. Si el job se cancela a mitad de camino se devuelve
/// `Cancelled` sin seguir con el resto.
pub fn hand_off(
    storage: &dyn Storage,
    mut outputs: Vec<MapOutput>,
    reduce_input_dir: &Path,
    cancel: &CancellationToken,
) -> EngineResult<Vec<ReduceInput>> {
    outputs.sort_by_key(|o| o.index);
    let mut inputs = Vec::with_capacity(outputs.len());

    for output in outputs {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled(format!(
                "handoff interrumpido antes de {}",
                output.attempt
            )));
        }

        let len = storage.stat_size(&output.path)?;
        let dest = reduce_input_path(reduce_input_dir, output.index);

        if let Some(parent) = dest.parent() {
            storage.mkdirs(parent)?;
        }
        storage.rename(&output.path, &dest)?;

        debug!(
            "salida de {} ({} bytes) movida a {}",
            output.attempt,
            len,
            dest.display()
        );
        inputs.push(ReduceInput {
            map_attempt: output.attempt,
            path: dest,
            len,
        });
    }

    Ok(inputs)
}
