//! Directory scanning for wallpaper candidates.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Extensions accepted as wallpapers (lowercase, without dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Return `true` if `path` has an accepted image extension (case-insensitive).
#[must_use]
pub fn is_wallpaper_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if IMAGE_EXTENSIONS.contains(&e.as_str())
    )
}

/// Recursively collect every regular image file under `root`.
///
/// Paths are made absolute so they stay meaningful in the persisted queue.
/// A missing or unreadable root yields an empty list; the caller decides
/// whether that is an error.
pub fn enumerate_images(root: &Path) -> Vec<PathBuf> {
    let root = match std::path::absolute(root) {
        Ok(abs) => abs,
        Err(err) => {
            warn!(root = %root.display(), "cannot resolve wallpaper directory: {err}");
            return Vec::new();
        }
    };

    let found: Vec<PathBuf> = candidates(&root).collect();
    debug!(root = %root.display(), found = found.len(), "scan complete");
    found
}

/// Return `true` if at least one image under `root` could enter the queue.
pub fn has_images(root: &Path) -> bool {
    candidates(root).next().is_some()
}

/// Image files under `root` that the queue file can hold. Paths containing a
/// newline are skipped because the queue file is newline-delimited.
fn candidates(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|res| match res {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("scan: skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|path| is_wallpaper_image(path))
        .filter(|path| {
            let queueable = !path.to_string_lossy().contains('\n');
            if !queueable {
                warn!(path = ?path, "scan: skipping path containing a newline");
            }
            queueable
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extension_match_ignores_case() {
        assert!(is_wallpaper_image(Path::new("/w/a.JPG")));
        assert!(is_wallpaper_image(Path::new("/w/b.Jpeg")));
        assert!(is_wallpaper_image(Path::new("/w/c.png")));
        assert!(is_wallpaper_image(Path::new("/w/d.WEBP")));
        assert!(!is_wallpaper_image(Path::new("/w/e.gif")));
        assert!(!is_wallpaper_image(Path::new("/w/jpg")));
        assert!(!is_wallpaper_image(Path::new("/w/notes.txt")));
    }

    #[test]
    fn enumerates_nested_files_only() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::create_dir_all(root.join("folder.png")).unwrap();
        fs::write(root.join("a.jpg"), b"x").unwrap();
        fs::write(root.join("nested/b.PNG"), b"x").unwrap();
        fs::write(root.join("nested/deeper/c.webp"), b"x").unwrap();
        fs::write(root.join("readme.md"), b"x").unwrap();

        let mut names: Vec<String> = enumerate_images(root)
            .into_iter()
            .map(|p| {
                assert!(p.is_absolute());
                p.strip_prefix(root).unwrap().to_string_lossy().to_string()
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "nested/b.PNG", "nested/deeper/c.webp"]);
        assert!(has_images(root));
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = tempdir().unwrap();
        let gone = tmp.path().join("gone");
        assert!(enumerate_images(&gone).is_empty());
        assert!(!has_images(&gone));
    }

    #[cfg(unix)]
    #[test]
    fn newline_names_do_not_count_as_images() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("line\nbreak.jpg"), b"x").unwrap();

        assert!(enumerate_images(root).is_empty());
        assert!(!has_images(root));

        fs::write(root.join("plain.png"), b"x").unwrap();
        assert!(has_images(root));
        assert_eq!(enumerate_images(root).len(), 1);
    }
}
