use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grupo y nombres de los contadores que reportan las tareas de ejemplo.
pub mod task_counter {
    pub const GROUP: &str = "TaskCounter";
    pub const MAP_INPUT_RECORDS: &str = "MAP_INPUT_RECORDS";
    pub const MAP_OUTPUT_RECORDS: &str = "MAP_OUTPUT_RECORDS";
    pub const MAP_INPUT_BYTES: &str = "MAP_INPUT_BYTES";
    pub const REDUCE_INPUT_RECORDS: &str = "REDUCE_INPUT_RECORDS";
    pub const REDUCE_OUTPUT_RECORDS: &str = "REDUCE_OUTPUT_RECORDS";
}

/// Conjunto de contadores agrupados: grupo -> nombre -> valor.
///
/// `Counters::default()` es el elemento neutro de `sum`, y `sum` es
/// asociativa y conmutativa, así que las sumas parciales de cualquier
/// subconjunto de tareas se combinan sin depender del orden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    groups: BTreeMap<String, BTreeMap<String, i64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Las sumas dan la vuelta al pasarse de `i64`, nunca entran en pánico.
    pub fn increment(&mut self, group: &str, name: &str, amount: i64) {
        let value = self
            .groups
            .entry(group.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0);
        *value = value.wrapping_add(amount);
    }

    pub fn get(&self, group: &str, name: &str) -> i64 {
        self.groups
            .get(group)
            .and_then(|g| g.get(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Suma pura de dos conjuntos; no modifica ninguno de los dos.
    pub fn sum(a: &Counters, b: &Counters) -> Counters {
        let mut out = a.clone();
        out.merge(b);
        out
    }

    fn merge(&mut self, other: &Counters) {
        for (group, names) in &other.groups {
            let target = self.groups.entry(group.clone()).or_default();
            for (name, value) in names {
                let slot = target.entry(name.clone()).or_insert(0);
                *slot = slot.wrapping_add(*value);
            }
        }
    }
}

impl<'a> std::iter::Sum<&'a Counters> for Counters {
    fn sum<I: Iterator<Item = &'a Counters>>(iter: I) -> Self {
        iter.fold(Counters::default(), |acc, c| Counters::sum(&acc, c))
    }
}
