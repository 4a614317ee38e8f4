//! ZIP packing of finished output folders.
//!
//! `<base>/<MMDD>-3C标签/` is packed as `<base>/<MMDD>-3C标签.zip`; the folder
//! contents (shop or store subfolders and their `.pld` files) sit at the
//! archive root.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::models::LabelBoxError;

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Archive entry name: relative path joined with `/`
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Subfolders and files of one output folder, in file-name order
#[derive(Debug, Default)]
struct FolderListing {
    subfolders: Vec<String>,
    files: Vec<(String, PathBuf)>,
}

fn list_folder(root: &Path) -> FolderListing {
    let mut listing = FolderListing::default();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = entry_name(relative);
        if entry.file_type().is_dir() {
            listing.subfolders.push(name);
        } else if entry.file_type().is_file() {
            listing.files.push((name, entry.path().to_path_buf()));
        }
    }
    listing
}

fn archive_err(what: &str, target: impl std::fmt::Display, e: impl std::fmt::Display) -> LabelBoxError {
    LabelBoxError::Archive(format!("{} {}: {}", what, target, e))
}

/// `<folder>.zip` next to `folder`
pub fn archive_path_for(folder: &Path) -> PathBuf {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    let file = format!("{}.{}", name, ARCHIVE_EXTENSION);
    match folder.parent() {
        Some(p) => p.join(file),
        None => PathBuf::from(file),
    }
}

/// Write `source_dir` into a ZIP at `output_path`
///
/// Templates are read in parallel and written sequentially (Deflate level 1).
///
/// # Returns
/// * Number of files packed
pub fn zip_dir(source_dir: &Path, output_path: &Path) -> Result<usize, LabelBoxError> {
    if !source_dir.is_dir() {
        return Err(LabelBoxError::Archive(format!("输出目录不存在: {}", source_dir.display())));
    }

    // === Step 1: List the folder ===
    let listing = list_folder(source_dir);
    debug!(
        folder = %source_dir.display(),
        subfolders = listing.subfolders.len(),
        files = listing.files.len(),
        "output folder listed"
    );

    // === Step 2: Read templates in parallel ===
    let contents: Vec<(String, Vec<u8>)> = listing
        .files
        .into_par_iter()
        .map(|(name, path)| {
            fs::read(&path)
                .map(|data| (name, data))
                .map_err(|e| archive_err("读取文件失败", path.display(), e))
        })
        .collect::<Result<_, _>>()?;

    // === Step 3: Write the archive ===
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(output_path).map_err(|e| archive_err("创建压缩包失败", output_path.display(), e))?;
    let mut zip = ZipWriter::new(file);
    let folder_opts = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o755);
    let file_opts = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(1))
        .unix_permissions(0o644);

    for name in &listing.subfolders {
        zip.add_directory(name.as_str(), folder_opts)
            .map_err(|e| archive_err("写入目录失败", name, e))?;
    }
    let packed = contents.len();
    for (name, data) in contents {
        zip.start_file(name.as_str(), file_opts)
            .map_err(|e| archive_err("写入文件失败", &name, e))?;
        zip.write_all(&data)
            .map_err(|e| archive_err("写入文件失败", &name, e))?;
    }
    zip.finish()
        .map_err(|e| archive_err("完成压缩包失败", output_path.display(), e))?;
    Ok(packed)
}

/// Pack `folder` into `<folder>.zip` beside it
pub fn archive_folder(folder: &Path) -> Result<PathBuf, LabelBoxError> {
    let output_path = archive_path_for(folder);
    let files = zip_dir(folder, &output_path)?;
    info!(archive = %output_path.display(), files, "output folder archived");
    Ok(output_path)
}
