//! Staging of the media file for serving.
//!
//! The served directory holds nothing but a symlink named after the source
//! file, so the static file server exposes it at `/{basename}` without a byte
//! being copied.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{CasterError, Result};

pub const DEFAULT_PORT: u16 = 31331;

const STAGING_PREFIX: &str = "chromecaster-";

/// Where the file is served from and which address is advertised for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    ip: String,
    port: u16,
    file: PathBuf,
}

impl ServeConfig {
    pub fn new(ip: impl Into<String>, port: u16, file: impl Into<PathBuf>) -> Self {
        Self {
            ip: ip.into(),
            port,
            file: file.into(),
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn url(&self) -> Result<String> {
        media_url(&self.ip, self.port, &self.file)
    }
}

/// `http://{ip}:{port}/{basename}`
pub fn media_url(ip: &str, port: u16, file: &Path) -> Result<String> {
    Ok(format!("http://{}:{}/{}", ip, port, base_name(file)?))
}

fn base_name(file: &Path) -> Result<String> {
    file.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| CasterError::Staging {
            path: file.to_path_buf(),
            reason: "path has no usable file name".into(),
        })
}

/// A temporary directory holding a symlink to the media file.
///
/// [`StagedFile::remove`] tears it down; dropping it without calling
/// `remove` cleans up on a best-effort basis.
#[derive(Debug)]
pub struct StagedFile {
    dir: Option<TempDir>,
    root: PathBuf,
    link: PathBuf,
    file_name: String,
}

impl StagedFile {
    /// Stages `source` in a fresh directory under the system temp dir.
    pub fn create(source: &Path) -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), source)
    }

    /// Stages `source` in a fresh directory under `root`.
    pub fn create_in(root: &Path, source: &Path) -> Result<Self> {
        info!("creating temporary files");

        let file_name = base_name(source)?;
        let target = absolute(source)?;
        if !target.exists() {
            return Err(CasterError::Staging {
                path: source.to_path_buf(),
                reason: "file does not exist".into(),
            });
        }

        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)?;
        let link = dir.path().join(&file_name);
        symlink(&target, &link).map_err(|e| CasterError::Staging {
            path: source.to_path_buf(),
            reason: format!("cannot link into {}: {}", dir.path().display(), e),
        })?;

        debug!("Staged {} as {}", target.display(), link.display());

        Ok(Self {
            root: dir.path().to_path_buf(),
            dir: Some(dir),
            link,
            file_name,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.root
    }

    pub fn link_path(&self) -> &Path {
        &self.link
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Removes the symlink, then the now-empty directory.
    pub fn remove(mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            fs::remove_file(&self.link)?;
            dir.close()?;
            info!("cleaned up temporary files");
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let _ = fs::remove_file(&self.link);
            if let Err(e) = dir.close() {
                warn!("Failed to remove staging directory: {}", e);
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
