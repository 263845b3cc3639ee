// src/filesystem/xattrs.rs

//! Extended attribute access
//!
//! Binary deltas carry only file content, so attributes such as security
//! labels are copied from the delta source onto the patched output. Copying
//! is best-effort: filesystems without xattr support simply have none.

use rustix::fs::XattrFlags;
use rustix::io::Errno;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::{debug, warn};

/// Extended attributes of one file, keyed by name
pub type XattrMap = BTreeMap<OsString, Vec<u8>>;

fn unsupported(errno: Errno) -> bool {
    errno == Errno::NOTSUP || errno == Errno::OPNOTSUPP || errno == Errno::NODATA
}

/// List extended attribute names of `path` without following symlinks
fn list_names(path: &Path) -> io::Result<Vec<OsString>> {
    let size = match rustix::fs::llistxattr(path, &mut []) {
        Ok(size) => size,
        Err(e) if unsupported(e) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut buffer = vec![0u8; size];
    let len = rustix::fs::llistxattr(path, &mut buffer)?;

    Ok(buffer[..len]
        .split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| OsStr::from_bytes(name).to_os_string())
        .collect())
}

fn get_value(path: &Path, name: &OsStr) -> io::Result<Option<Vec<u8>>> {
    let size = match rustix::fs::lgetxattr(path, name, &mut []) {
        Ok(size) => size,
        Err(e) if unsupported(e) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut value = vec![0u8; size];
    let len = rustix::fs::lgetxattr(path, name, &mut value)?;
    value.truncate(len);
    Ok(Some(value))
}

/// Read every extended attribute of `path`
pub fn read_xattrs(path: &Path) -> io::Result<XattrMap> {
    let mut xattrs = XattrMap::new();
    for name in list_names(path)? {
        if let Some(value) = get_value(path, &name)? {
            xattrs.insert(name, value);
        }
    }
    Ok(xattrs)
}

/// Copy extended attributes from `from` to `to`
///
/// Returns the number of attributes copied. Individual failures are logged
/// and skipped.
pub fn copy_xattrs(from: &Path, to: &Path) -> usize {
    let xattrs = match read_xattrs(from) {
        Ok(xattrs) => xattrs,
        Err(e) => {
            warn!("Could not read extended attributes of {}: {}", from.display(), e);
            return 0;
        }
    };

    let mut copied = 0;
    for (name, value) in &xattrs {
        match rustix::fs::lsetxattr(to, name.as_os_str(), value, XattrFlags::empty()) {
            Ok(()) => copied += 1,
            Err(e) => warn!(
                "Could not copy extended attribute {:?} to {}: {}",
                name,
                to.display(),
                e
            ),
        }
    }

    if copied > 0 {
        debug!(
            "Copied {} extended attributes {} -> {}",
            copied,
            from.display(),
            to.display()
        );
    }
    copied
}
