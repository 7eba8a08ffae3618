use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{config, error::StoreError, types::Credential};

/// File-backed credential storage, one JSON file per provider.
///
/// Knows nothing about auth protocols; it only reads, writes and removes
/// `<root>/<provider_id>.json`.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CredentialStore { root: root.into() }
    }

    /// Store rooted at the per-user credentials directory.
    pub fn default_location() -> Self {
        Self::new(config::credentials_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn load(&self, provider_id: &str) -> Result<Credential, StoreError> {
        let path = self.credential_path(provider_id);
        let content = match async_fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(provider_id.to_string()));
            }
            Err(e) => return Err(StoreError::IoError(e)),
        };

        let credential: Credential =
            serde_json::from_str(&content).map_err(|e| StoreError::CorruptCredential {
                provider: provider_id.to_string(),
                reason: e.to_string(),
            })?;

        if credential.provider_id != provider_id {
            return Err(StoreError::CorruptCredential {
                provider: provider_id.to_string(),
                reason: format!("file belongs to provider {}", credential.provider_id),
            });
        }
        credential
            .check_shape()
            .map_err(|reason| StoreError::CorruptCredential {
                provider: provider_id.to_string(),
                reason,
            })?;

        debug!(provider = provider_id, kind = %credential.kind, "loaded credential");
        Ok(credential)
    }

    pub async fn save(&self, provider_id: &str, credential: &Credential) -> Result<(), StoreError> {
        let path = self.credential_path(provider_id);
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| StoreError::IoError(std::io::Error::other(e)))?;
        write_private_file(&path, json.as_bytes()).await?;
        #[cfg(unix)]
        restrict_dir(&self.root).await?;

        debug!(provider = provider_id, path = %path.display(), "saved credential");
        Ok(())
    }

    pub async fn delete(&self, provider_id: &str) -> Result<(), StoreError> {
        let path = self.credential_path(provider_id);
        match async_fs::remove_file(&path).await {
            Ok(()) => {
                debug!(provider = provider_id, "deleted credential");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(provider_id.to_string()))
            }
            Err(e) => Err(StoreError::IoError(e)),
        }
    }

    pub fn credential_path(&self, provider_id: &str) -> PathBuf {
        // keep provider ids from escaping the store directory
        let safe_id = provider_id.replace(['/', '\\'], "_").replace("..", "_");
        self.root.join(format!("{safe_id}.json"))
    }
}

/// Writes `contents` to `path` atomically with owner-only permissions.
///
/// Missing parent directories are created with mode 0700. Data goes to a
/// sibling temp file that is created with mode 0600 before anything is
/// written to it, and is then renamed over the target, so a crash never
/// leaves a half-written file behind.
pub async fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_private_dir(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    // left over from an interrupted write; create_new would refuse it
    match async_fs::remove_file(&tmp_path).await {
        Ok(()) => debug!(path = %tmp_path.display(), "removed stale temp file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if let Err(e) = write_new_private(&tmp_path, contents).await {
        let _ = async_fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = async_fs::rename(&tmp_path, path).await {
        let _ = async_fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

async fn write_new_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

async fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

/// Narrows an existing directory to mode 0700 if it is wider.
#[cfg(unix)]
async fn restrict_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = async_fs::metadata(dir).await?.permissions().mode() & 0o777;
    if mode != 0o700 {
        warn!(path = %dir.display(), "credential directory has mode {:o}, restricting to 0700", mode);
        async_fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}
