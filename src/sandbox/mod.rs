pub mod error;
pub mod subprocess;
pub mod types;
pub mod workspace;

use std::time::Duration;

use async_trait::async_trait;

pub use error::ExecutionError;
pub use subprocess::SubprocessRunner;
pub use types::{Artifact, ExecutionRequest};
pub use workspace::WorkDir;

/// Capability boundary for running untrusted generated code.
///
/// The pipeline only sees this trait, so the isolation strategy
/// (host subprocess today, container or WASM later) can change without
/// touching the coordinator. Implementations must never panic on bad
/// scripts; every failure comes back as an `ExecutionError`.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<Artifact, ExecutionError>;
}
