//! Per-request staging directories.
//!
//! A `Workspace` owns a uniquely named temporary directory holding the
//! submitted files. It is bind-mounted read-only into the container and is
//! removed exactly once: either through [`Workspace::close`], or when the
//! value is dropped on any other exit path.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::{Builder, TempDir};
use tokio::fs;

use crate::errors::SandboxError;

const WORKSPACE_PREFIX: &str = "sandbox-run-";

#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh directory under `root` (system temp dir when `None`)
    /// and write every file into it.
    ///
    /// Filenames are checked before the directory exists, so a bad name is an
    /// input error with nothing to clean up. Write failures remove the partial
    /// directory before returning.
    pub async fn prepare(
        root: Option<&Path>,
        files: &BTreeMap<String, String>,
    ) -> Result<Self, SandboxError> {
        let mut staged = Vec::with_capacity(files.len());
        let mut seen = HashSet::new();
        for (name, content) in files {
            let relative = sanitize_filename(name)?;
            if !seen.insert(relative.clone()) {
                return Err(SandboxError::input_validation(format!(
                    "Filename '{}' refers to a file that was already submitted",
                    name
                )));
            }
            staged.push((relative, content));
        }

        let mut builder = Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            SandboxError::workspace_preparation(format!("could not create workspace: {}", e))
        })?;

        let workspace = Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        };

        for (relative, content) in staged {
            if let Err(e) = workspace.write_file(&relative, content).await {
                let message = format!("could not write '{}': {}", relative.display(), e);
                if let Err(cleanup) = workspace.close() {
                    log::error!("Failed to remove partial workspace: {}", cleanup);
                }
                return Err(SandboxError::workspace_preparation(message));
            }
        }

        if let Err(e) = open_permissions(&workspace.path, true).await {
            let message = format!("could not set workspace permissions: {}", e);
            if let Err(cleanup) = workspace.close() {
                log::error!("Failed to remove partial workspace: {}", cleanup);
            }
            return Err(SandboxError::workspace_preparation(message));
        }

        log::debug!(
            "Staged {} file(s) into {}",
            files.len(),
            workspace.path.display()
        );
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, relative: &Path, content: &str) -> io::Result<()> {
        let full = self.path.join(relative);
        if let Some(parent) = full.parent() {
            if parent != self.path {
                fs::create_dir_all(parent).await?;
                // Intermediate directories need to be traversable by the container user.
                let mut dir = parent;
                while dir != self.path {
                    open_permissions(dir, true).await?;
                    match dir.parent() {
                        Some(next) => dir = next,
                        None => break,
                    }
                }
            }
        }
        fs::write(&full, content.as_bytes()).await?;
        open_permissions(&full, false).await
    }

    /// Remove the directory now and report whether that worked.
    pub fn close(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => {
                log::debug!("Removing workspace {}", self.path.display());
                dir.close()
            }
            None => Ok(()),
        }
    }
}

/// Turn a submitted filename into a path relative to the workspace root.
///
/// Rejects anything that could resolve outside the root: absolute paths,
/// drive prefixes, `..` components, backslashes and NUL bytes.
pub fn sanitize_filename(name: &str) -> Result<PathBuf, SandboxError> {
    let invalid = |reason: &str| {
        SandboxError::input_validation(format!("Invalid filename '{}': {}", name, reason))
    };

    if name.trim().is_empty() {
        return Err(invalid("filename is empty"));
    }
    if name.contains('\0') {
        return Err(invalid("contains a NUL byte"));
    }
    if name.contains('\\') {
        return Err(invalid("backslashes are not allowed, use '/'"));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("must be relative to the workspace"))
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(invalid("does not name a file"));
    }
    Ok(relative)
}

/// Path of `entry_point` as seen from inside the container.
pub fn container_path(mount_path: &str, entry_point: &str) -> Result<String, SandboxError> {
    let relative = sanitize_filename(entry_point)?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(format!("{}/{}", mount_path.trim_end_matches('/'), parts.join("/")))
}

#[cfg(unix)]
async fn open_permissions(path: &Path, is_dir: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if is_dir { 0o755 } else { 0o644 };
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn open_permissions(_path: &Path, _is_dir: bool) -> io::Result<()> {
    Ok(())
}
