//! Path walking over the driver's directory iteration and symlink reading
//!
//! Tokenizes absolute POSIX style paths, folds `.` components, resolves
//! `..` through the on-disk parent entries and expands symbolic links with
//! a bounded nesting depth.

use crate::{Disk, FileType, Node, Udf, UdfError};
#[allow(unused_imports)]
use tracing::{debug, warn};

/// How many levels of symbolic links a single lookup may traverse
pub const MAX_SYMLINK_DEPTH: u32 = 8;

/// Resolves `path` from `root` down to a leaf node of the expected type
///
/// `path` must be absolute. Symbolic links met along the way are expanded
/// (relative to the directory holding them, or from `root` when the target
/// is absolute); the leaf therefore never is one. `expected` selects the
/// final check: [`FileType::Directory`] demands a directory leaf,
/// [`FileType::Regular`] rejects one.
pub fn find_file<D: Disk>(
    udf: &Udf<D>,
    path: &str,
    root: &Node,
    expected: FileType,
) -> Result<Node, UdfError> {
    if !path.starts_with('/') {
        return Err(UdfError::InvalidPath);
    }
    let mut depth = 0u32;
    let node = resolve_path(udf, root, root, path, &mut depth)?;
    match expected {
        FileType::Directory if !node.is_directory() => Err(UdfError::NotADirectory),
        FileType::Regular if node.is_directory() => Err(UdfError::NotARegularFile),
        _ => Ok(node),
    }
}

/// Walks `path` starting at `start`; `fs_root` anchors rooted symlink
/// targets
fn resolve_path<D: Disk>(
    udf: &Udf<D>,
    fs_root: &Node,
    start: &Node,
    path: &str,
    depth: &mut u32,
) -> Result<Node, UdfError> {
    let mut cur = start.clone();
    for comp in path.split('/').filter(|c| !c.is_empty()) {
        if comp == "." {
            continue;
        }
        if !cur.is_directory() {
            return Err(UdfError::NotADirectory);
        }
        let mut found: Option<(FileType, Node)> = None;
        udf.iterate_dir(&cur, &mut |name, ftype, node| {
            if name == comp {
                found = Some((ftype, node));
                true
            } else {
                false
            }
        })?;
        let (ftype, node) = found.ok_or(UdfError::NotFound)?;
        if ftype == FileType::Symlink {
            *depth += 1;
            if *depth > MAX_SYMLINK_DEPTH {
                return Err(UdfError::TooDeep);
            }
            let target = udf.read_symlink(&node)?;
            debug!("Following symlink {comp} -> {target}");
            let base = if target.starts_with('/') {
                fs_root.clone()
            } else {
                cur.clone()
            };
            cur = resolve_path(udf, fs_root, &base, &target, depth)?;
        } else {
            cur = node;
        }
    }
    Ok(cur)
}
