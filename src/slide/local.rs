//! Opening DICOM WSI series from the local filesystem.
//!
//! A series is usually stored as one Part 10 file per instance in a single
//! directory. Opening any one of them discovers its siblings by name and
//! keeps those belonging to the same series.
//!
//! # Sibling Names
//!
//! A file in the same directory is a candidate when:
//! - its extension is `dcm`, `dic` or `dicom` (any case), or
//! - its name is a dotted numeric UID of at most 64 characters
//!   (e.g. `1.2.840.113619.2.55`), or
//! - its name is `DCM_` followed by digits (e.g. `DCM_0`)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use super::instance::WsiInstance;
use super::wsi::{DicomSlide, FrameSource, SourcedInstance};
use crate::dicom::{DicomFile, TransferSyntax};
use crate::error::TileSourceError;
use crate::io::FileRangeReader;

/// File extensions recognized as DICOM
pub const DICOM_EXTENSIONS: [&str; 3] = ["dcm", "dic", "dicom"];

/// Longest dotted numeric UID accepted as a file name
const MAX_UID_LENGTH: usize = 64;

// =============================================================================
// Discovery
// =============================================================================

fn is_dotted_numeric(name: &str) -> bool {
    if name.len() > MAX_UID_LENGTH {
        return false;
    }
    let mut components = 0;
    for component in name.split('.') {
        let digits = !component.is_empty() && component.bytes().all(|b| b.is_ascii_digit());
        if !digits || (component.len() > 1 && component.starts_with('0')) {
            return false;
        }
        components += 1;
    }
    components >= 2
}

fn is_dcm_prefixed(name: &str) -> bool {
    name.strip_prefix("DCM_")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether a path looks like a DICOM file by its name alone.
pub fn path_might_be_dicom(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DICOM_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    by_extension || is_dotted_numeric(name) || is_dcm_prefixed(name)
}

/// Candidate files for the series containing `path`, sorted by name.
///
/// `path` is always included. If `path` itself does not look like a DICOM
/// file by name, only `path` is returned.
pub async fn discover_slide_files(path: &Path) -> Result<Vec<PathBuf>, TileSourceError> {
    if !path_might_be_dicom(path) {
        return Ok(vec![path.to_path_buf()]);
    }

    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut entries = tokio::fs::read_dir(&directory)
        .await
        .map_err(|e| TileSourceError::open(format!("{}: {}", directory.display(), e)))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TileSourceError::open(format!("{}: {}", directory.display(), e)))?
    {
        let candidate = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && path_might_be_dicom(&candidate) {
            files.push(candidate);
        }
    }

    let requested = directory.join(path.file_name().unwrap_or_default());
    if !files.contains(&requested) {
        files.push(requested);
    }
    files.sort();
    Ok(files)
}

// =============================================================================
// Local Frames
// =============================================================================

struct LocalFrames {
    file: DicomFile<FileRangeReader>,
}

#[async_trait]
impl FrameSource for LocalFrames {
    async fn read_frames(&self, indices: &[usize]) -> Result<Vec<Bytes>, TileSourceError> {
        let mut frames = Vec::with_capacity(indices.len());
        for &index in indices {
            let frame = self
                .file
                .read_frame(index)
                .await
                .map_err(|e| TileSourceError::decode(format!("{}: {}", self.file.identifier(), e)))?;
            frames.push(frame);
        }
        Ok(frames)
    }

    fn transfer_syntax(&self) -> TransferSyntax {
        self.file.transfer_syntax()
    }
}

async fn open_instance(path: &Path) -> Result<SourcedInstance, TileSourceError> {
    let reader = FileRangeReader::open(path)
        .await
        .map_err(TileSourceError::open)?;
    let file = DicomFile::open(reader)
        .await
        .map_err(|e| TileSourceError::open(format!("{}: {}", path.display(), e)))?;
    let instance = WsiInstance::from_json(file.dataset().to_json())
        .map_err(|e| TileSourceError::open(format!("{}: {}", path.display(), e)))?;

    Ok(SourcedInstance {
        instance,
        frames: Arc::new(LocalFrames { file }),
    })
}

// =============================================================================
// Open
// =============================================================================

/// Open the series containing `path`, discovering sibling instances.
pub async fn open_local(path: &Path) -> Result<DicomSlide, TileSourceError> {
    let files = discover_slide_files(path).await?;
    debug!(path = %path.display(), candidates = files.len(), "Discovered slide files");
    open_local_files(path, &files).await
}

/// Open `primary` plus whichever of `files` share its series.
///
/// Errors opening `primary` fail the open; unreadable or foreign siblings
/// are skipped.
pub async fn open_local_files(
    primary: &Path,
    files: &[PathBuf],
) -> Result<DicomSlide, TileSourceError> {
    let first = open_instance(primary).await?;
    let series = first.instance.series_instance_uid.clone();
    let primary_name = primary.file_name();

    let mut instances = vec![first];
    for file in files {
        if file.as_path() == primary || file.file_name() == primary_name {
            continue;
        }
        match open_instance(file).await {
            Ok(sibling) if sibling.instance.series_instance_uid == series => {
                instances.push(sibling)
            }
            Ok(sibling) => debug!(
                path = %file.display(),
                series = ?sibling.instance.series_instance_uid,
                "Skipping file from another series"
            ),
            Err(e) => warn!(path = %file.display(), error = %e, "Skipping unreadable sibling"),
        }
    }

    let identifier = primary.display().to_string();
    DicomSlide::from_instances(identifier, instances)
}
