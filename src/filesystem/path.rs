// src/filesystem/path.rs

//! Resolving manifest paths under the install root
//!
//! Manifest paths are written as absolute paths of the target system
//! ("/usr/bin/foo"), but deltastage may operate on an install root other
//! than `/`. Every manifest path is reduced to a relative path and joined
//! onto that root. Manifests arrive from the update server, so a path that
//! would leave the root is refused rather than repaired.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Reduce a manifest path to a path relative to the install root
///
/// Leading `/` and `.` components are dropped. `..` anywhere is refused,
/// even when it would stay inside the root, and a path naming the root
/// itself is invalid because no file record can describe it.
///
/// # Examples
///
/// ```
/// use deltastage::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("/usr/bin/foo").unwrap(), PathBuf::from("usr/bin/foo"));
/// assert!(sanitize_path("usr/../../../etc/passwd").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut relative = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(c) => relative.push(c),
            Component::ParentDir => {
                return Err(Error::PathTraversal(format!(
                    "manifest path {} steps out of the install root",
                    path.display()
                )));
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!(
            "manifest path {:?} does not name a file under the install root",
            path
        )));
    }

    Ok(relative)
}

/// Join a manifest path onto the install root
///
/// The leaf itself is never resolved: an installed file may be a symlink
/// pointing anywhere, and callers inspect it with `lstat`. The directory
/// holding it must resolve inside the root, which catches symlinked
/// parents that point elsewhere. Directories that do not exist yet are not
/// checked.
///
/// ```
/// use deltastage::filesystem::path::safe_join;
/// use std::path::{Path, PathBuf};
///
/// let root = Path::new("/var/lib/deltastage-test-root");
/// assert_eq!(
///     safe_join(root, "/usr/bin/foo").unwrap(),
///     PathBuf::from("/var/lib/deltastage-test-root/usr/bin/foo")
/// );
/// assert!(safe_join(root, "../etc/passwd").is_err());
/// ```
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let joined = root.join(sanitize_path(path.as_ref())?);

    let Some(parent) = joined.parent() else {
        return Ok(joined);
    };
    if let (Ok(canonical_root), Ok(canonical_parent)) = (root.canonicalize(), parent.canonicalize())
    {
        if !canonical_parent.starts_with(&canonical_root) {
            return Err(Error::PathTraversal(format!(
                "{} resolves to {}, outside install root {}",
                parent.display(),
                canonical_parent.display(),
                root.display()
            )));
        }
    }

    Ok(joined)
}
