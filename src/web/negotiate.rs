//! Transfer-syntax negotiation for DICOMweb frame retrieval.
//!
//! One instance of the series is searched with `AvailableTransferSyntaxUID`
//! included. The first syntax of [`PREFERRED_TRANSFER_SYNTAXES`] the archive
//! offers is used for every frame request of the slide.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::client::DicomWebClient;
use crate::dicom::{json, tags};
use crate::dicom::{tags::Tag, TransferSyntax, FALLBACK_TRANSFER_SYNTAX, PREFERRED_TRANSFER_SYNTAXES};
use crate::error::{IoError, TileSourceError};

/// QIDO-RS instance search, the only query negotiation needs.
#[async_trait]
pub trait InstanceSearch: Send + Sync {
    async fn search_for_instances(
        &self,
        study: &str,
        series: &str,
        fields: &[Tag],
        limit: Option<u32>,
    ) -> Result<Vec<Value>, IoError>;
}

#[async_trait]
impl InstanceSearch for DicomWebClient {
    async fn search_for_instances(
        &self,
        study: &str,
        series: &str,
        fields: &[Tag],
        limit: Option<u32>,
    ) -> Result<Vec<Value>, IoError> {
        DicomWebClient::search_for_instances(self, study, series, fields, limit).await
    }
}

/// Pick the transfer syntax to request frames in.
///
/// The decision is made once per open and never retried.
///
/// # Errors
/// - `Open` if the search fails or the series has no instance
/// - `Negotiation` if none of the advertised syntaxes is acceptable
pub async fn negotiate<S: InstanceSearch + ?Sized>(
    search: &S,
    study: &str,
    series: &str,
) -> Result<TransferSyntax, TileSourceError> {
    let instances = search
        .search_for_instances(study, series, &[tags::AVAILABLE_TRANSFER_SYNTAX_UID], Some(1))
        .await
        .map_err(|e| TileSourceError::open(format!("instance search failed: {}", e)))?;
    let instance = instances.first().ok_or_else(|| {
        TileSourceError::open(format!("series {} has no instances", series))
    })?;

    let available: Vec<String> = json::strings(instance, tags::AVAILABLE_TRANSFER_SYNTAX_UID)
        .into_iter()
        .map(|uid| uid.trim().to_string())
        .collect();
    if available.is_empty() {
        warn!(
            series,
            fallback = FALLBACK_TRANSFER_SYNTAX.uid(),
            "Server does not advertise available transfer syntaxes, assuming lossless JPEG 2000"
        );
        return Ok(FALLBACK_TRANSFER_SYNTAX);
    }

    let chosen = PREFERRED_TRANSFER_SYNTAXES
        .into_iter()
        .find(|syntax| available.iter().any(|uid| uid == syntax.uid()));
    match chosen {
        Some(syntax) => {
            debug!(series, transfer_syntax = syntax.uid(), "Negotiated transfer syntax");
            Ok(syntax)
        }
        None => Err(TileSourceError::Negotiation { available }),
    }
}
