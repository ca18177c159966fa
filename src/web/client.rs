//! Minimal DICOMweb client: QIDO-RS instance search, WADO-RS series
//! metadata and WADO-RS frame retrieval.
//!
//! # Endpoints
//!
//! ```text
//! GET {url}/{qido_prefix}/studies/{study}/series/{series}/instances?includefield=..&limit=..
//! GET {url}/{wado_prefix}/studies/{study}/series/{series}/metadata
//! GET {url}/{wado_prefix}/studies/{study}/series/{series}/instances/{uid}/frames/{1,2,..}
//! ```

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::multipart::{boundary_from_content_type, split_multipart};
use crate::dicom::{tags::Tag, TransferSyntax};
use crate::error::IoError;

const DICOM_JSON: &str = "application/dicom+json";

// =============================================================================
// Descriptor
// =============================================================================

/// Credentials sent with every DICOMweb request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Location of one series on a DICOMweb server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomWebDescriptor {
    /// Service root, e.g. `https://server/dicomweb`
    pub url: String,
    pub study_uid: String,
    pub series_uid: String,
    /// Extra path between the root and `/studies` for QIDO-RS
    #[serde(default)]
    pub qido_prefix: Option<String>,
    /// Extra path between the root and `/studies` for WADO-RS
    #[serde(default)]
    pub wado_prefix: Option<String>,
    #[serde(default)]
    pub auth: Option<WebAuth>,
}

// =============================================================================
// Client
// =============================================================================

/// DICOMweb client bound to one service root.
///
/// Cheap to share behind an `Arc`; requests are independent.
#[derive(Debug, Clone)]
pub struct DicomWebClient {
    http: Client,
    base: Url,
    qido_prefix: Option<String>,
    wado_prefix: Option<String>,
    auth: Option<WebAuth>,
}

impl DicomWebClient {
    /// Create a client for the descriptor's service root.
    ///
    /// # Arguments
    /// * `descriptor` - Service location and credentials
    /// * `timeout` - Per-request timeout
    pub fn new(descriptor: &DicomWebDescriptor, timeout: Duration) -> Result<Self, IoError> {
        let base = Url::parse(&descriptor.url)
            .map_err(|e| IoError::Connection(format!("invalid URL {}: {}", descriptor.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(IoError::Connection(format!(
                "invalid URL {}: not a service root",
                descriptor.url
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IoError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            qido_prefix: descriptor.qido_prefix.clone(),
            wado_prefix: descriptor.wado_prefix.clone(),
            auth: descriptor.auth.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `{base}/{prefix}/studies/{study}/series/{series}/{rest..}`
    fn series_url(
        &self,
        prefix: Option<&str>,
        study: &str,
        series: &str,
        rest: &[&str],
    ) -> Result<Url, IoError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| IoError::Connection(format!("{} is not a service root", self.base)))?;
            segments.pop_if_empty();
            if let Some(prefix) = prefix {
                segments.extend(prefix.split('/').filter(|s| !s.is_empty()));
            }
            segments.extend(["studies", study, "series", series]);
            segments.extend(rest);
        }
        Ok(url)
    }

    async fn get(&self, url: Url, accept: &str) -> Result<reqwest::Response, IoError> {
        debug!(url = %url, accept, "DICOMweb request");
        let mut request = self.http.get(url.clone()).header(ACCEPT, accept);
        request = match &self.auth {
            Some(WebAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(WebAuth::Bearer { token }) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                IoError::Connection(format!("request to {} timed out", url))
            } else {
                IoError::Connection(format!("request to {} failed: {}", url, e))
            }
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(IoError::NotFound(url.to_string())),
            status => Err(IoError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    async fn get_json_array(&self, url: Url) -> Result<Vec<Value>, IoError> {
        let response = self.get(url.clone(), DICOM_JSON).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| IoError::Connection(format!("reading {}: {}", url, e)))?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&body) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => Err(IoError::InvalidResponse(format!(
                "{}: expected a JSON array",
                url
            ))),
            Err(e) => Err(IoError::InvalidResponse(format!("{}: {}", url, e))),
        }
    }

    /// QIDO-RS search for instances of a series.
    ///
    /// # Arguments
    /// * `fields` - Attributes to include beyond the defaults
    /// * `limit` - Maximum number of instances to return
    pub async fn search_for_instances(
        &self,
        study: &str,
        series: &str,
        fields: &[Tag],
        limit: Option<u32>,
    ) -> Result<Vec<Value>, IoError> {
        let mut url = self.series_url(self.qido_prefix.as_deref(), study, series, &["instances"])?;
        {
            let mut query = url.query_pairs_mut();
            for field in fields {
                query.append_pair("includefield", &field.json_key());
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        self.get_json_array(url).await
    }

    /// WADO-RS metadata of every instance in a series.
    pub async fn series_metadata(&self, study: &str, series: &str) -> Result<Vec<Value>, IoError> {
        let url = self.series_url(self.wado_prefix.as_deref(), study, series, &["metadata"])?;
        self.get_json_array(url).await
    }

    /// WADO-RS frame retrieval.
    ///
    /// # Arguments
    /// * `frame_numbers` - 1-based frame numbers
    /// * `syntax` - Transfer syntax the frames should be returned in
    ///
    /// Returns one payload per part, in response order.
    pub async fn retrieve_frames(
        &self,
        study: &str,
        series: &str,
        instance: &str,
        frame_numbers: &[usize],
        syntax: TransferSyntax,
    ) -> Result<Vec<Bytes>, IoError> {
        let list = frame_numbers
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = self.series_url(
            self.wado_prefix.as_deref(),
            study,
            series,
            &["instances", instance, "frames", &list],
        )?;
        let accept = format!(
            "multipart/related; type=\"{}\"; transfer-syntax={}",
            syntax.media_type(),
            syntax.uid()
        );

        let response = self.get(url.clone(), &accept).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| IoError::Connection(format!("reading {}: {}", url, e)))?;

        match content_type.as_deref().and_then(boundary_from_content_type) {
            Some(boundary) => split_multipart(&body, &boundary),
            // Some servers answer a single frame without multipart framing
            None => Ok(vec![body]),
        }
    }
}
