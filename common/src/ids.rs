use serde::{Deserialize, Serialize};
use std::fmt;

/// Nombre del "tracker" que usa el runner local en los identificadores.
pub const LOCAL_TRACKER: &str = "local";

/// Identificador de un job: `job_<tracker>_<seq>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    pub tracker: String,
    pub seq: u32,
}

impl JobId {
    pub fn local(seq: u32) -> Self {
        Self {
            tracker: LOCAL_TRACKER.to_string(),
            seq,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}_{:04}", self.tracker, self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Map,
    Reduce,
}

impl TaskKind {
    fn code(self) -> char {
        match self {
            TaskKind::Map => 'm',
            TaskKind::Reduce => 'r',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub job: JobId,
    pub kind: TaskKind,
    pub index: u32,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task_{}_{:04}_{}_{:06}",
            self.job.tracker,
            self.job.seq,
            self.kind.code(),
            self.index
        )
    }
}

/// Un intento concreto de una tarea. Este runner nunca reintenta,
/// así que `attempt` siempre vale 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskAttemptId {
    pub task: TaskId,
    pub attempt: u32,
}

impl TaskAttemptId {
    pub fn new(job: &JobId, kind: TaskKind, index: u32) -> Self {
        Self {
            task: TaskId {
                job: job.clone(),
                kind,
                index,
            },
            attempt: 0,
        }
    }

    pub fn job(&self) -> &JobId {
        &self.task.job
    }

    pub fn index(&self) -> u32 {
        self.task.index
    }
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt_{}_{:04}_{}_{:06}_{}",
            self.task.job.tracker,
            self.task.job.seq,
            self.task.kind.code(),
            self.task.index,
            self.attempt
        )
    }
}
