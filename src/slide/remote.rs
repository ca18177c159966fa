//! Opening DICOM WSI series from a DICOMweb server.
//!
//! Opening negotiates a transfer syntax, then builds the pyramid from the
//! series metadata. Frames are fetched on demand through WADO-RS, one request
//! per region.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};

use super::instance::WsiInstance;
use super::wsi::{DicomSlide, FrameSource, SourcedInstance};
use crate::dicom::TransferSyntax;
use crate::error::TileSourceError;
use crate::web::{negotiate, DicomWebClient, DicomWebDescriptor};

/// Frames of one instance, retrieved over WADO-RS.
struct WebFrames {
    client: Arc<DicomWebClient>,
    study_uid: String,
    series_uid: String,
    instance_uid: String,
    syntax: TransferSyntax,
}

#[async_trait]
impl FrameSource for WebFrames {
    async fn read_frames(&self, indices: &[usize]) -> Result<Vec<Bytes>, TileSourceError> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        // WADO-RS frame numbers are 1-based
        let numbers: Vec<usize> = indices.iter().map(|i| i + 1).collect();
        let frames = self
            .client
            .retrieve_frames(
                &self.study_uid,
                &self.series_uid,
                &self.instance_uid,
                &numbers,
                self.syntax,
            )
            .await
            .map_err(|e| TileSourceError::decode(format!("{}: {}", self.instance_uid, e)))?;

        if frames.len() != numbers.len() {
            return Err(TileSourceError::decode(format!(
                "{}: requested {} frames, server returned {}",
                self.instance_uid,
                numbers.len(),
                frames.len()
            )));
        }
        Ok(frames)
    }

    fn transfer_syntax(&self) -> TransferSyntax {
        self.syntax
    }
}

/// Open a series from a DICOMweb server.
///
/// # Arguments
/// * `descriptor` - Server root, study and series
/// * `timeout` - Per-request timeout for every round trip of the slide
///
/// # Errors
/// - `Negotiation` if the server offers no acceptable transfer syntax
/// - `Open` for unreachable servers or series without usable instances
pub async fn open_remote(
    descriptor: &DicomWebDescriptor,
    timeout: Duration,
) -> Result<DicomSlide, TileSourceError> {
    let client = Arc::new(DicomWebClient::new(descriptor, timeout).map_err(TileSourceError::open)?);
    let study = &descriptor.study_uid;
    let series = &descriptor.series_uid;

    let syntax = negotiate(client.as_ref(), study, series).await?;

    let records = client
        .series_metadata(study, series)
        .await
        .map_err(|e| TileSourceError::open(format!("series metadata: {}", e)))?;

    let mut instances = Vec::with_capacity(records.len());
    for record in records {
        match WsiInstance::from_json(record) {
            Ok(instance) => {
                let frames = WebFrames {
                    client: Arc::clone(&client),
                    study_uid: study.clone(),
                    series_uid: series.clone(),
                    instance_uid: instance.sop_instance_uid.clone(),
                    syntax,
                };
                instances.push(SourcedInstance {
                    instance,
                    frames: Arc::new(frames),
                });
            }
            Err(e) => warn!(series = %series, error = %e, "Skipping unusable instance"),
        }
    }

    info!(
        url = %descriptor.url,
        series = %series,
        instances = instances.len(),
        transfer_syntax = syntax.uid(),
        "Loaded DICOMweb series metadata"
    );

    let identifier = format!(
        "{}/studies/{}/series/{}",
        descriptor.url.trim_end_matches('/'),
        study,
        series
    );
    DicomSlide::from_instances(identifier, instances)
}
