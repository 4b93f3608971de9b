use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::credential::Credential;
use crate::error::{Error, Result};

/// File-backed persistence for a single [`Credential`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error("error reading token cache: {0}")]
    Read(#[from] io::Error),
    #[error("error decoding token cache: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached credential.
    ///
    /// Never fails: a missing, unreadable or corrupt cache yields an empty
    /// credential, which forces a fresh authorization instead of blocking.
    pub fn load(&self) -> Credential {
        match self.read() {
            Ok(credential) => credential,
            Err(LoadError::Read(err)) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no token cache");
                Credential::default()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "ignoring token cache: {err}");
                Credential::default()
            }
        }
    }

    fn read(&self) -> std::result::Result<Credential, LoadError> {
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the credential, replacing the previous cache in one rename.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let data = serde_json::to_vec_pretty(credential).map_err(io::Error::other);
        data.and_then(|data| write_private(&self.path, &data))
            .map_err(|source| Error::CachePersist {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(path = %self.path.display(), "saved token cache");
        Ok(())
    }
}

fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    // A leftover temp file would keep its old mode.
    let _ = fs::remove_file(&tmp);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let result = options.open(&tmp).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(err) = result.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}
