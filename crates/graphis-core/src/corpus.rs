//! Loading a labeled sample corpus from a directory tree.
//!
//! The expected layout is one subdirectory per writer, each containing that
//! writer's handwriting samples:
//!
//! ```text
//! corpus/
//!   alice/
//!     page1.png
//!     page2.jpg
//!   bob/
//!     note.png
//! ```

use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;
use crate::types::LabeledSample;

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff"];

/// Collect labeled samples from `root/<writer_id>/<image>`.
///
/// Files with unsupported extensions are ignored. The result is sorted by
/// writer id then path, so corpus order is stable across filesystems.
pub fn load_corpus(root: &Path) -> Result<Vec<LabeledSample>> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("corpus directory not found: {}", root.display()),
        )
        .into());
    }

    let mut samples = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable corpus entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported(path) {
            continue;
        }
        let Some(writer_id) = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        samples.push(LabeledSample::new(writer_id, path.to_path_buf()));
    }

    samples.sort_by(|a, b| {
        (&a.writer_id, &a.image_path).cmp(&(&b.writer_id, &b.image_path))
    });
    tracing::debug!(samples = samples.len(), "Corpus loaded");
    Ok(samples)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"stub").unwrap();
    }

    #[test]
    fn test_load_corpus_groups_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("alice/a.png"));
        touch(&dir.path().join("alice/b.jpg"));
        touch(&dir.path().join("bob/c.PNG"));

        let samples = load_corpus(dir.path()).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].writer_id, "alice");
        assert_eq!(samples[1].writer_id, "alice");
        assert_eq!(samples[2].writer_id, "bob");
    }

    #[test]
    fn test_unsupported_and_stray_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("alice/a.png"));
        touch(&dir.path().join("alice/notes.txt"));
        // Top-level files have no writer directory.
        touch(&dir.path().join("readme.png"));
        // Too deep.
        touch(&dir.path().join("bob/nested/d.png"));

        let samples = load_corpus(dir.path()).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].writer_id, "alice");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_corpus(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_order_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("zed/z.png"));
        touch(&dir.path().join("alice/b.png"));
        touch(&dir.path().join("alice/a.png"));

        let samples = load_corpus(dir.path()).unwrap();
        let paths: Vec<_> = samples.iter().map(|s| s.image_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                dir.path().join("alice/a.png"),
                dir.path().join("alice/b.png"),
                dir.path().join("zed/z.png"),
            ]
        );
    }
}
