//! Whole-folder helpers on top of [`ZipArchive`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::zip::{AccessMode, CompressionMethod, ZipArchive};

/// Add every file under `folder` to the archive at `archive_path`.
///
/// An existing archive is appended to, otherwise a new one is created. Entry
/// names are relative to `folder`. The archive file itself is skipped when it
/// lives inside the folder.
pub fn compress_folder(
    archive_path: &Path,
    folder: &Path,
    recursive: bool,
    method: CompressionMethod,
) -> Result<usize> {
    let mut zip = if archive_path.exists() {
        ZipArchive::open_file(archive_path, AccessMode::Write)
    } else {
        ZipArchive::create_file(archive_path, "")
    }
    .with_context(|| format!("Failed to open {}", archive_path.display()))?;

    let own_path = archive_path.canonicalize().ok();
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut added = 0usize;
    for dent in walker {
        let dent = dent.with_context(|| format!("Failed to walk {}", folder.display()))?;
        if !dent.file_type().is_file() {
            continue;
        }
        if own_path.is_some() && dent.path().canonicalize().ok() == own_path {
            debug!(path = %dent.path().display(), "skipping the archive itself");
            continue;
        }

        let name = dent
            .path()
            .strip_prefix(folder)
            .unwrap_or(dent.path())
            .to_string_lossy()
            .into_owned();
        zip.add_file(method, dent.path(), &name, "")
            .with_context(|| format!("Failed to add {}", dent.path().display()))?;
        added += 1;
    }

    zip.close()
        .with_context(|| format!("Failed to finalize {}", archive_path.display()))?;
    info!(archive = %archive_path.display(), added, "compressed folder");
    Ok(added)
}

/// Extract every entry of the archive at `archive_path` under `dest`.
///
/// One failing entry does not stop the others; each entry's outcome is
/// reported in directory order.
pub fn extract_all(archive_path: &Path, dest: &Path) -> Result<Vec<(String, Result<PathBuf>)>> {
    let mut zip = ZipArchive::open_file(archive_path, AccessMode::Read)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let entries = zip
        .read_central_dir()
        .with_context(|| format!("Failed to read directory of {}", archive_path.display()))?;

    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in &entries {
        let outcome = match entry.enclosed_name() {
            Some(relative) => {
                let target = dest.join(relative);
                zip.extract_to_file(entry, &target)
                    .map(|()| target)
                    .with_context(|| format!("Failed to extract {}", entry.file_name))
            }
            None => Err(crate::Error::UnsafeEntryName(entry.file_name.clone()).into()),
        };
        outcomes.push((entry.file_name.clone(), outcome));
    }
    Ok(outcomes)
}
