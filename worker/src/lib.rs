//! Cuerpos de tarea que corre el runner local.

pub mod executor;
pub mod wordcount;

pub use executor::WordCount;
