//! Response packaging: one PDF as-is, several PDFs as a ZIP archive.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};

/// Highest Deflate level.
const ZIP_COMPRESSION_LEVEL: i64 = 9;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// What gets sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBundle {
    /// Exactly one watermarked PDF, delivered as-is
    Single { path: PathBuf, file_name: String },
    /// Several PDFs bundled into one archive
    Archive { path: PathBuf, file_name: String },
}

impl OutputBundle {
    pub fn path(&self) -> &Path {
        match self {
            Self::Single { path, .. } | Self::Archive { path, .. } => path,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Single { file_name, .. } | Self::Archive { file_name, .. } => file_name,
        }
    }

    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Single { .. } => PDF_CONTENT_TYPE,
            Self::Archive { .. } => ZIP_CONTENT_TYPE,
        }
    }

    /// Value for a `Content-Disposition` header.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.file_name())
    }
}

/// Archive name for a bundle created now.
pub fn archive_name() -> String {
    format!("watermarked_{}.zip", chrono::Utc::now().format("%Y%m%d-%H%M%S"))
}

/// Package watermarked files for delivery.
///
/// A single file is returned directly. Multiple files are written, in order,
/// into a maximally compressed ZIP inside `work_dir`, each entry named by its
/// file's basename.
pub fn package(paths: &[PathBuf], work_dir: &Path) -> Result<OutputBundle> {
    match paths {
        [] => Err(Error::NothingToPackage),
        [path] => Ok(OutputBundle::Single {
            path: path.clone(),
            file_name: basename(path)?,
        }),
        _ => {
            let file_name = archive_name();
            let path = work_dir.join(&file_name);
            write_archive(paths, &path)?;
            Ok(OutputBundle::Archive { path, file_name })
        }
    }
}

fn write_archive(paths: &[PathBuf], archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(ZIP_COMPRESSION_LEVEL));

    for path in paths {
        let name = basename(path)?;
        let data = std::fs::read(path)?;

        zip.start_file(name.as_str(), options)
            .map_err(|e| Error::Archive(format!("Failed to add {name}: {e}")))?;
        zip.write_all(&data)?;

        debug!("Archived {} ({} bytes)", name, data.len());
    }

    let mut writer = zip
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finalize archive: {e}")))?;
    writer.flush()?;

    Ok(())
}

fn basename(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Archive(format!("No usable file name in {}", path.display())))
}
