pub mod cluster;
pub mod counters;
pub mod error;
pub mod ids;
pub mod job;
pub mod protocol;
pub mod task;

pub use cluster::{
    ClusterMetrics, QueueAclsInfo, QueueInfo, TaskCompletionEvent, TaskReport, TrackerInfo,
    TrackerState,
};
pub use counters::{task_counter, Counters};
pub use error::{EngineError, EngineResult, StorageError, TaskError};
pub use ids::{JobId, TaskAttemptId, TaskId, TaskKind, LOCAL_TRACKER};
pub use job::{JobConf, JobStatus, RunState, SplitMetaInfo};
pub use protocol::{
    ClientProtocol, MapCompletionEventsRequest, MapCompletionEventsUpdate, RecordRange,
    SubmitJobRequest, TaskStatusReport, TaskUmbilical,
};
pub use task::{MapTaskContext, ReduceInput, ReduceTaskContext, TaskExecutor};
