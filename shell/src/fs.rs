use async_trait::async_trait;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Unprivileged filesystem access on the host.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    async fn exists(&self, path: &Path) -> bool;

    /// Write `contents` to a newly created file whose name starts with
    /// `prefix`, ready for an elevated move. The file never replaces or
    /// follows an existing path.
    async fn stage(&self, prefix: &str, contents: &str) -> io::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct HostFs {
    staging_dir: PathBuf,
}

impl HostFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staging_in(dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: dir.into(),
        }
    }
}

impl Default for HostFs {
    fn default() -> Self {
        Self::staging_in(std::env::temp_dir())
    }
}

#[async_trait]
impl FileSystem for HostFs {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn stage(&self, prefix: &str, contents: &str) -> io::Result<PathBuf> {
        let dir = self.staging_dir.clone();
        let prefix = prefix.to_string();
        let contents = contents.to_string();
        tokio::task::spawn_blocking(move || stage_file(&dir, &prefix, &contents))
            .await
            .map_err(io::Error::other)?
    }
}

fn stage_file(dir: &Path, prefix: &str, contents: &str) -> io::Result<PathBuf> {
    let mut file = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
    file.write_all(contents.as_bytes())?;

    // The file is moved into a system directory and read by other users.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    let path = file.into_temp_path().keep().map_err(|e| e.error)?;
    tracing::debug!(path = %path.display(), "staged file");
    Ok(path)
}
