use crate::error::ShellError;
use crate::types::CommandOutput;
use async_trait::async_trait;
use std::time::Duration;

/// Process execution on the host.
///
/// A command that runs to completion returns `Ok` whatever its exit status;
/// callers inspect [`CommandOutput::status`]. `Err` means the command could
/// not be run or did not finish in time.
#[async_trait]
pub trait Shell: Send + Sync {
    async fn exec(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ShellError>;

    /// Run with elevated privileges. `reason` explains why to the user.
    async fn exec_elevated(
        &self,
        reason: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ShellError>;

    async fn exec_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError>;
}
