//! Filesystem primitives shared by the gatherer and the job engine.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::NodeInfo;

/// Reads the immediate contents of a directory and returns them as [`NodeInfo`] values.
///
/// The returned entries are **unsorted**. Entries that vanish or cannot be
/// stat'ed between listing and stat are skipped.
///
/// # Errors
///
/// - [`CoreError::NotFound`]: the path does not exist.
/// - [`CoreError::NotADirectory`]: the path is not a directory.
/// - [`CoreError::PermissionDenied`]: read access is denied.
/// - [`CoreError::Io`]: any other I/O error.
pub fn read_directory(path: &Path) -> CoreResult<Vec<NodeInfo>> {
    if !path.exists() {
        return Err(CoreError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(CoreError::NotADirectory(path.to_path_buf()));
    }

    let read_dir = std::fs::read_dir(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            CoreError::PermissionDenied(path.to_path_buf())
        } else {
            CoreError::Io(e)
        }
    })?;

    let mut entries = Vec::new();
    for dir_entry in read_dir {
        let Ok(dir_entry) = dir_entry else { continue };
        if let Ok(info) = NodeInfo::stat(&dir_entry.path()) {
            entries.push(info);
        }
    }

    Ok(entries)
}

/// Lists the child paths of `dir` sorted by file name.
///
/// Sorting keeps recursive walks deterministic regardless of the order the
/// OS hands entries back in.
pub fn sorted_children(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut children = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    children.sort();
    Ok(children)
}

/// Maximum recursion depth for size walks, guarding against pathological trees.
const MAX_WALK_DEPTH: usize = 256;

/// Returns the total byte size of `path`, descending into directories.
///
/// Symlinks are counted as zero bytes and never followed. Unreadable
/// entries contribute nothing.
pub fn tree_size(path: &Path) -> u64 {
    tree_size_at(path, 0)
}

fn tree_size_at(path: &Path, depth: usize) -> u64 {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return 0;
    };
    if meta.is_symlink() {
        return 0;
    }
    if !meta.is_dir() {
        return meta.len();
    }
    if depth >= MAX_WALK_DEPTH {
        return 0;
    }
    let Ok(read_dir) = std::fs::read_dir(path) else {
        return 0;
    };
    read_dir
        .filter_map(Result::ok)
        .map(|e| tree_size_at(&e.path(), depth + 1))
        .sum()
}

/// Computes the payload of a copy/move job.
///
/// Returns `None` when any input directory is the destination itself or one
/// of its ancestors, which would make the job copy a tree into itself. A
/// symlink input is never a directory here: only the link is recreated.
pub fn total_size(inputs: &[PathBuf], destination: &Path) -> Option<u64> {
    let dest = normalize(destination);
    let mut total = 0u64;
    for input in inputs {
        let is_dir = std::fs::symlink_metadata(input).is_ok_and(|m| m.is_dir());
        if is_dir && is_within(&dest, &normalize(input)) {
            return None;
        }
        total = total.saturating_add(tree_size(input));
    }
    Some(total)
}

/// Returns `true` if `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Canonicalizes `path`, resolving the longest existing prefix when the
/// tail does not exist yet.
pub fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => normalize(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// Returns `true` when `source` and `destination` live on the same device.
#[cfg(unix)]
pub fn is_same_filesystem(source: &Path, destination: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (
        std::fs::symlink_metadata(source),
        std::fs::metadata(destination),
    ) {
        (Ok(s), Ok(d)) => s.dev() == d.dev(),
        _ => false,
    }
}

/// Without device ids we cannot prove a rename is safe, so report different devices.
#[cfg(not(unix))]
pub fn is_same_filesystem(_source: &Path, _destination: &Path) -> bool {
    false
}

/// Free bytes available to unprivileged users on the volume holding `path`.
///
/// Returns `None` when the platform offers no usage query or the query fails.
#[cfg(unix)]
pub fn available_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
    // SAFETY: statvfs is a standard POSIX function, c_path is valid
    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        return None;
    }
    // SAFETY: statvfs succeeded, stat is initialized
    let stat = unsafe { stat.assume_init() };
    #[allow(clippy::unnecessary_cast)]
    Some(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Option<u64> {
    None
}

/// Recreates the symlink at `src` as `dest` without following it.
pub fn copy_symlink(src: &Path, dest: &Path) -> std::io::Result<()> {
    let link_target = std::fs::read_link(src)?;
    #[cfg(unix)]
    std::os::unix::fs::symlink(&link_target, dest)?;
    #[cfg(not(unix))]
    {
        let _ = link_target;
        std::fs::copy(src, dest)?;
    }
    Ok(())
}

/// Deletes a file, symlink or whole directory tree.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Picks a sibling of `path` that does not exist yet: `name (copy).ext`,
/// then `name (copy 2).ext`, and so on.
pub fn unique_copy_name(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let suffix = if n == 1 {
            " (copy)".to_string()
        } else {
            format!(" (copy {n})")
        };
        let candidate = parent.join(format!("{stem}{suffix}{ext}"));
        if std::fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

/// Returns `true` for a plain file name: not empty, not `.`/`..`, and no separators.
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\0') {
        return false;
    }
    #[cfg(windows)]
    if name.contains('\\') || name.contains(':') {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn read_directory_returns_entries() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file1.txt"), "hello").unwrap();
        fs::write(tmp.path().join("file2.txt"), "world").unwrap();
        fs::create_dir(tmp.path().join("subdir")).unwrap();

        let entries = read_directory(tmp.path()).unwrap();

        assert_eq!(entries.len(), 3);
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert!(names.contains(&"file1.txt"));
        assert!(names.contains(&"file2.txt"));
        assert!(names.contains(&"subdir"));
    }

    #[test]
    fn read_directory_nonexistent_returns_not_found() {
        let result = read_directory(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn read_directory_on_file_returns_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("not_a_dir.txt");
        fs::write(&file_path, "content").unwrap();

        let result = read_directory(&file_path);

        assert!(matches!(result, Err(CoreError::NotADirectory(_))));
    }

    #[test]
    fn read_directory_unicode_filenames() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("한글.txt"), "").unwrap();
        fs::write(tmp.path().join("日本語.md"), "").unwrap();

        let entries = read_directory(tmp.path()).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert!(names.contains(&"한글.txt"));
        assert!(names.contains(&"日本語.md"));
    }

    #[test]
    fn tree_size_sums_nested_files() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::write(tmp.path().join("a/one"), vec![0u8; 100]).unwrap();
        fs::write(tmp.path().join("a/b/two"), vec![0u8; 250]).unwrap();

        assert_eq!(tree_size(&tmp.path().join("a")), 350);
        assert_eq!(tree_size(&tmp.path().join("a/one")), 100);
        assert_eq!(tree_size(&tmp.path().join("missing")), 0);
    }

    #[test]
    fn total_size_rejects_copy_into_self() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("dir");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("f"), "12345").unwrap();

        assert_eq!(total_size(&[dir.clone()], &dir.join("sub")), None);
        assert_eq!(total_size(&[dir.clone()], &dir), None);
        assert_eq!(total_size(&[dir.clone()], tmp.path()), Some(5));
    }

    #[test]
    fn total_size_rejects_missing_destination_inside_source() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("dir");
        fs::create_dir(&dir).unwrap();

        assert_eq!(total_size(&[dir.clone()], &dir.join("not/yet")), None);
    }

    #[cfg(unix)]
    #[test]
    fn total_size_treats_symlink_to_ancestor_as_a_link() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("parent/dest");
        fs::create_dir_all(&dest).unwrap();
        let link = tmp.path().join("shortcut");
        std::os::unix::fs::symlink(tmp.path().join("parent"), &link).unwrap();

        assert!(total_size(&[link], &dest).is_some());
        assert_eq!(total_size(&[tmp.path().join("parent")], &dest), None);
    }

    #[test]
    fn total_size_allows_sibling_with_shared_prefix() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("photos");
        let sibling = tmp.path().join("photos-backup");
        fs::create_dir(&dir).unwrap();
        fs::create_dir(&sibling).unwrap();

        assert_eq!(total_size(&[dir], &sibling), Some(0));
    }

    #[test]
    fn same_filesystem_within_tempdir() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, "").unwrap();
        if cfg!(unix) {
            assert!(is_same_filesystem(&file, tmp.path()));
        }
    }

    #[cfg(unix)]
    #[test]
    fn available_space_reported_for_tempdir() {
        let tmp = TempDir::new().unwrap();
        assert!(available_space(tmp.path()).is_some());
    }

    #[test]
    fn unique_copy_name_skips_taken_names() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("report.txt");
        fs::write(&original, "").unwrap();

        let first = unique_copy_name(&original);
        assert_eq!(first, tmp.path().join("report (copy).txt"));

        fs::write(&first, "").unwrap();
        assert_eq!(
            unique_copy_name(&original),
            tmp.path().join("report (copy 2).txt")
        );
    }

    #[test]
    fn remove_path_handles_files_and_trees() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("d/e")).unwrap();
        fs::write(tmp.path().join("d/e/f"), "").unwrap();
        fs::write(tmp.path().join("g"), "").unwrap();

        remove_path(&tmp.path().join("d")).unwrap();
        remove_path(&tmp.path().join("g")).unwrap();

        assert!(!tmp.path().join("d").exists());
        assert!(!tmp.path().join("g").exists());
    }

    #[test]
    fn filename_validation() {
        assert!(is_valid_filename("a_2.txt"));
        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename(".."));
        assert!(!is_valid_filename("a/b"));
    }
}
