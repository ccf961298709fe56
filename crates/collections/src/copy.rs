use std::path::{Path, PathBuf};

use {
    mdpress_common::{Error, Result},
    walkdir::WalkDir,
};

use crate::metadata::METADATA_FILENAME;

/// Entries never carried over when copying a plugin tree.
const SKIPPED: &[&str] = &[".git", METADATA_FILENAME];

/// Recursively copy `src` into `dst` on the blocking pool.
pub(crate) async fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree_blocking(&src, &dst))
        .await
        .map_err(|e| Error::message(format!("copy task failed: {e}")))?
}

fn copy_tree_blocking(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| Error::io_at("failed to create", dst, e))?;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            e.depth() != 1 || !SKIPPED.iter().any(|s| e.file_name() == *s)
        });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            Error::io_at(
                "failed to walk",
                &path,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            )
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target: PathBuf = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| Error::io_at("failed to create", &target, e))?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| Error::io_at("failed to copy", entry.path(), e))?;
        }
    }
    Ok(())
}
