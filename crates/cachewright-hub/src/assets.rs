//! Per-user derived files on disk

use cachewright_core::{AssetInvalidator, UserId};
use std::io;
use std::path::{Path, PathBuf};

/// Deletes rendered statistics images under the site's var directory
///
/// The next request for the image renders it again.
#[derive(Debug, Clone)]
pub struct FileAssetInvalidator {
    var_dir: PathBuf,
}

impl FileAssetInvalidator {
    pub fn new(var_dir: impl Into<PathBuf>) -> Self {
        Self {
            var_dir: var_dir.into(),
        }
    }

    /// Where the statistics image of `user` lives
    pub fn statpic_path(&self, user: UserId) -> PathBuf {
        statpic_path(&self.var_dir, user)
    }
}

fn statpic_path(var_dir: &Path, user: UserId) -> PathBuf {
    var_dir
        .join("images")
        .join("statpics")
        .join(format!("statpic{}.jpg", user.raw()))
}

impl AssetInvalidator for FileAssetInvalidator {
    fn invalidate_user_assets(&self, user: UserId) -> io::Result<()> {
        match std::fs::remove_file(self.statpic_path(user)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
