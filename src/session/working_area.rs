use std::fs;
use std::io;
use std::path::Path;

use tempfile::{Builder, TempDir};
use tracing::warn;

use crate::error::{GymError, Result};

/// Allocate a directory, retrying once on a transient failure.
fn allocate(parent: &Path, prefix: &str) -> Result<TempDir> {
    let attempt = || Builder::new().prefix(prefix).tempdir_in(parent);
    attempt()
        .or_else(|err| {
            warn!(parent = %parent.display(), error = %err, "directory allocation failed, retrying");
            attempt()
        })
        .map_err(|err: io::Error| {
            GymError::ResourceExhausted(format!(
                "failed to allocate `{prefix}*` under {}: {err}",
                parent.display()
            ))
        })
}

/// A directory owned by exactly one session.
///
/// Cost computations borrow it to create scratch directories, which remove
/// themselves when dropped. The whole area is removed when it is closed or
/// dropped.
#[derive(Debug)]
pub struct WorkingArea {
    dir: TempDir,
}

impl WorkingArea {
    /// Create an area under `root`, or under the system temp directory.
    pub fn create(root: Option<&Path>, label: &str) -> Result<Self> {
        let parent = root.map_or_else(std::env::temp_dir, Path::to_path_buf);
        if let Err(err) = fs::create_dir_all(&parent) {
            return Err(GymError::ResourceExhausted(format!(
                "working root {} is unusable: {err}",
                parent.display()
            )));
        }
        let dir = allocate(&parent, &format!("llgym-{label}-"))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh directory inside the area for one computation's artifacts.
    pub fn scratch(&self, label: &str) -> Result<TempDir> {
        allocate(self.dir.path(), &format!("{label}-"))
    }

    /// Whether no artifacts are left in the area.
    pub fn is_clean(&self) -> bool {
        fs::read_dir(self.dir.path()).is_ok_and(|mut entries| entries.next().is_none())
    }

    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|err| {
            GymError::ResourceExhausted(format!(
                "failed to remove working area {}: {err}",
                path.display()
            ))
        })
    }
}
