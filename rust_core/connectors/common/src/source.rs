use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ConnectorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Idle,
    Running,
    Stopped,
}

/// A self-scheduling exchange adapter that writes batches to a [`crate::Producer`].
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawns the worker on the current tokio runtime.
    fn start(&self) -> ConnectorResult<()>;

    /// Signals shutdown and waits for the worker. Calling it again is a no-op,
    /// and no batch is produced once it has returned.
    async fn stop(&self);

    fn state(&self) -> SourceState;
}
