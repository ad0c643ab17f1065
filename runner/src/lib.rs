//! Runner local de jobs map/reduce: todo corre dentro del mismo proceso.

pub mod cleanup;
pub mod committer;
pub mod config;
pub mod handoff;
pub mod job;
pub mod metrics;
pub mod notifier;
pub mod registry;
pub mod scheduler;
pub mod staging;
pub mod status;
pub mod storage;
pub mod submit;
pub mod task;

pub use committer::{FileOutputCommitter, OutputCommitter};
pub use config::{JobLayout, RunnerConfig};
pub use job::JobController;
pub use notifier::{HttpNotifier, JobEndNotifier, LogNotifier};
pub use registry::{JobServices, LocalJobRunner, LocalJobRunnerBuilder};
pub use staging::{ArtifactStaging, LocalCache};
pub use storage::{LocalFs, Storage};
pub use submit::stage_job;
