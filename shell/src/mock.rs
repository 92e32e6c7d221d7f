//! In-memory doubles for [`Shell`] and [`FileSystem`], for tests.

use crate::error::ShellError;
use crate::fs::FileSystem;
use crate::shell::Shell;
use crate::types::{CommandOutput, ExecMode, Invocation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    SpawnError,
    Timeout,
}

/// A shell that records every invocation and answers from a script.
///
/// Replies are matched by substring against the full command line, in the
/// order they were registered. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct MockShell {
    rules: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        lock(&self.rules).push((pattern.to_string(), Reply::Output(output)));
        self
    }

    pub fn on_stdout(&self, pattern: &str, stdout: &str) -> &Self {
        self.on(pattern, CommandOutput::ok(stdout))
    }

    pub fn on_status(&self, pattern: &str, status: i32, stderr: &str) -> &Self {
        self.on(pattern, CommandOutput::failed(status, stderr))
    }

    /// Matching commands fail to spawn.
    pub fn on_spawn_error(&self, pattern: &str) -> &Self {
        lock(&self.rules).push((pattern.to_string(), Reply::SpawnError));
        self
    }

    pub fn on_timeout(&self, pattern: &str) -> &Self {
        lock(&self.rules).push((pattern.to_string(), Reply::Timeout));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    pub fn was_called(&self, needle: &str) -> bool {
        self.command_lines().iter().any(|line| line.contains(needle))
    }

    pub fn elevated_calls(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|inv| inv.mode == ExecMode::Elevated)
            .map(Invocation::command_line)
            .collect()
    }

    fn reply(&self, invocation: Invocation) -> Result<CommandOutput, ShellError> {
        let line = invocation.command_line();
        let mode = invocation.mode;
        lock(&self.calls).push(invocation);

        let reply = lock(&self.rules)
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            None => Ok(CommandOutput::ok("")),
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::SpawnError) => Err(ShellError::Spawn {
                command: line,
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            Some(Reply::Timeout) => Err(ShellError::Timeout {
                command: line,
                timeout: match mode {
                    ExecMode::Timed(limit) => limit,
                    _ => Duration::ZERO,
                },
            }),
        }
    }
}

#[async_trait]
impl Shell for MockShell {
    async fn exec(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ShellError> {
        self.reply(Invocation::new(ExecMode::Plain, program, args))
    }

    async fn exec_elevated(
        &self,
        _reason: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ShellError> {
        self.reply(Invocation::new(ExecMode::Elevated, program, args))
    }

    async fn exec_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        self.reply(Invocation::new(ExecMode::Timed(timeout), program, args))
    }
}

/// A filesystem held in a map. Reads of absent paths fail with `NotFound`.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<HashMap<PathBuf, String>>,
    reads: Mutex<Vec<PathBuf>>,
    writes: Mutex<Vec<PathBuf>>,
    deny_reads: Mutex<bool>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        lock(&self.files).insert(path.into(), contents.to_string());
        self
    }

    /// Every subsequent read fails with `PermissionDenied`.
    pub fn deny_reads(&self) {
        *lock(&self.deny_reads) = true;
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        lock(&self.files).get(path.as_ref()).cloned()
    }

    pub fn reads(&self) -> Vec<PathBuf> {
        lock(&self.reads).clone()
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        lock(&self.writes).clone()
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        lock(&self.reads).push(path.to_path_buf());
        if *lock(&self.deny_reads) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn exists(&self, path: &Path) -> bool {
        let files = lock(&self.files);
        files.contains_key(path) || files.keys().any(|p| p.starts_with(path))
    }

    /// Stages under `/tmp` as `<prefix><n>`, taking the first `n` not
    /// already present.
    async fn stage(&self, prefix: &str, contents: &str) -> io::Result<PathBuf> {
        let mut files = lock(&self.files);
        let mut n = 0;
        let path = loop {
            let candidate = PathBuf::from(format!("/tmp/{}{}", prefix, n));
            if !files.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        files.insert(path.clone(), contents.to_string());
        lock(&self.writes).push(path.clone());
        Ok(path)
    }
}
