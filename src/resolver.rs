//! Request-path to filesystem-path resolution with root containment.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::ServerError;

/// Outcome of resolving one request path. `exists` and `is_dir` are
/// advisory: the filesystem may change between resolution and the read.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub exists: bool,
    pub is_dir: bool,
}

/// Maps raw request paths onto the served root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` must already be absolute and canonical (startup validates it).
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw request path (still percent-encoded, possibly carrying
    /// a query string) to an absolute path under the root.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, ServerError> {
        let without_query = raw.split('?').next().unwrap_or("");
        let decoded = decode_permissive(without_query);

        // Blunt string-level rejection: `..` anywhere in the decoded path,
        // including inside literal filenames, before any normalization.
        if decoded.contains("..") {
            warn!(path = %decoded, "rejected parent directory reference");
            return Err(ServerError::Traversal);
        }

        let assembled = self.join_under_root(&decoded)?;
        self.status(assembled)
    }

    /// Build the candidate path component-by-component so that absolute
    /// components can never replace the root prefix.
    fn join_under_root(&self, decoded: &str) -> Result<PathBuf, ServerError> {
        let relative = decoded.trim_start_matches('/');
        if relative.is_empty() {
            return Ok(self.root.clone());
        }

        let mut assembled = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(name) => {
                    if name.to_string_lossy().contains('\0') {
                        warn!("rejected path component containing NUL");
                        return Err(ServerError::RootEscape);
                    }
                    assembled.push(name);
                }
                Component::CurDir => {}
                Component::ParentDir => return Err(ServerError::Traversal),
                Component::RootDir | Component::Prefix(_) => {
                    warn!("rejected absolute component in request path");
                    return Err(ServerError::RootEscape);
                }
            }
        }

        // Re-check containment after assembly.
        if !assembled.starts_with(&self.root) {
            return Err(ServerError::RootEscape);
        }

        Ok(assembled)
    }

    /// One status check for `exists`/`is_dir`. Existing paths are
    /// canonicalized first so a symlink pointing outside the root is caught
    /// the same way a lexical escape is.
    fn status(&self, assembled: PathBuf) -> Result<ResolvedPath, ServerError> {
        match assembled.canonicalize() {
            Ok(real) => {
                if !real.starts_with(&self.root) {
                    warn!(
                        requested = %assembled.display(),
                        target = %real.display(),
                        "rejected symlink escape"
                    );
                    return Err(ServerError::RootEscape);
                }
                let metadata = fs::metadata(&real)?;
                Ok(ResolvedPath {
                    exists: true,
                    is_dir: metadata.is_dir(),
                    path: real,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ResolvedPath {
                path: assembled,
                exists: false,
                is_dir: false,
            }),
            Err(err) => Err(err.into()),
        }
    }
}

/// Percent-decode as UTF-8, degrading to a lossy decode instead of failing
/// the request on malformed sequences.
fn decode_permissive(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
        }
    }
}
