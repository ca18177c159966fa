//! Configuration management for the DICOM WSI streamer.
//!
//! This module provides the command-line interface:
//! - Command-line arguments via clap
//! - Environment variables with `WSI_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `serve` - Open one slide and serve its tiles over HTTP
//! - `info` - Open one slide and print its metadata
//!
//! # Environment Variables
//!
//! - `WSI_HOST` - Server bind address (default: 0.0.0.0)
//! - `WSI_PORT` - Server port (default: 3000)
//! - `WSI_PATH` - Local DICOM file of the slide
//! - `WSI_DICOMWEB_URL` - DICOMweb service root
//! - `WSI_STUDY_UID` / `WSI_SERIES_UID` - Series to open over DICOMweb
//! - `WSI_QIDO_PREFIX` / `WSI_WADO_PREFIX` - Extra service path segments
//! - `WSI_DICOMWEB_USERNAME` / `WSI_DICOMWEB_PASSWORD` - HTTP basic auth
//! - `WSI_DICOMWEB_TOKEN` - Bearer token
//! - `WSI_TIMEOUT` - DICOMweb request timeout in seconds (default: 30)
//! - `WSI_TIE_BREAK` - `coarsest` or `finest` (default: coarsest)
//! - `WSI_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `WSI_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::tile::{OpenOptions, SourceDescriptor, TieBreak};
use crate::web::{DicomWebDescriptor, WebAuth};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default DICOMweb request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// DICOM WSI Streamer - uniform tiles from DICOM whole slide images.
///
/// Opens a slide from local DICOM files or a DICOMweb server and serves it
/// as a power-of-two tile pyramid.
#[derive(Parser, Debug, Clone)]
#[command(name = "dicom-wsi-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles of one slide over HTTP
    Serve(ServeConfig),
    /// Print the metadata of one slide
    Info(InfoConfig),
}

/// Policy when several native levels have the same downsample.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreakArg {
    Coarsest,
    Finest,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::Coarsest => TieBreak::Coarsest,
            TieBreakArg::Finest => TieBreak::Finest,
        }
    }
}

/// Where the slide comes from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Any DICOM file of the slide; sibling instances are discovered.
    #[arg(long, env = "WSI_PATH")]
    pub path: Option<PathBuf>,

    /// DICOMweb service root (e.g. https://server/dicomweb).
    #[arg(long, env = "WSI_DICOMWEB_URL")]
    pub dicomweb_url: Option<String>,

    /// Study Instance UID of the slide.
    #[arg(long, env = "WSI_STUDY_UID")]
    pub study_uid: Option<String>,

    /// Series Instance UID of the slide.
    #[arg(long, env = "WSI_SERIES_UID")]
    pub series_uid: Option<String>,

    /// Path segments between the service root and /studies for QIDO-RS.
    #[arg(long, env = "WSI_QIDO_PREFIX")]
    pub qido_prefix: Option<String>,

    /// Path segments between the service root and /studies for WADO-RS.
    #[arg(long, env = "WSI_WADO_PREFIX")]
    pub wado_prefix: Option<String>,

    /// Username for HTTP basic authentication.
    #[arg(long, env = "WSI_DICOMWEB_USERNAME")]
    pub username: Option<String>,

    /// Password for HTTP basic authentication.
    #[arg(long, env = "WSI_DICOMWEB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token for DICOMweb requests.
    #[arg(long, env = "WSI_DICOMWEB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// DICOMweb request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "WSI_TIMEOUT")]
    pub timeout: u64,

    /// Which level to read from when several share a downsample.
    #[arg(long, value_enum, default_value_t = TieBreakArg::Coarsest, env = "WSI_TIE_BREAK")]
    pub tie_break: TieBreakArg,
}

impl SourceArgs {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.path, &self.dicomweb_url) {
            (Some(_), Some(_)) => {
                return Err("Set either --path or --dicomweb-url, not both".to_string())
            }
            (None, None) => {
                return Err(
                    "No slide given. Set --path (WSI_PATH) or --dicomweb-url (WSI_DICOMWEB_URL)"
                        .to_string(),
                )
            }
            (None, Some(url)) => {
                if url.is_empty() {
                    return Err("DICOMweb URL must not be empty".to_string());
                }
                if self.study_uid.as_deref().map_or(true, str::is_empty)
                    || self.series_uid.as_deref().map_or(true, str::is_empty)
                {
                    return Err(
                        "DICOMweb slides need --study-uid and --series-uid".to_string()
                    );
                }
                if self.token.is_some() && self.username.is_some() {
                    return Err("Set either --token or --username, not both".to_string());
                }
                if self.username.is_some() != self.password.is_some() {
                    return Err("--username and --password must be set together".to_string());
                }
            }
            (Some(_), None) => {}
        }

        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Open-time descriptor for the configured slide (call validate() first).
    pub fn descriptor(&self) -> Result<SourceDescriptor, String> {
        self.validate()?;
        if let Some(path) = &self.path {
            return Ok(SourceDescriptor::Local { path: path.clone() });
        }

        let auth = match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) => Some(WebAuth::Bearer {
                token: token.clone(),
            }),
            (None, Some(username), Some(password)) => Some(WebAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(SourceDescriptor::DicomWeb(DicomWebDescriptor {
            url: self.dicomweb_url.clone().unwrap_or_default(),
            study_uid: self.study_uid.clone().unwrap_or_default(),
            series_uid: self.series_uid.clone().unwrap_or_default(),
            qido_prefix: self.qido_prefix.clone(),
            wado_prefix: self.wado_prefix.clone(),
            auth,
        }))
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            timeout: Duration::from_secs(self.timeout),
            tie_break: self.tie_break.into(),
        }
    }
}

/// Configuration for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WSI_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WSI_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "WSI_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "WSI_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "dicom_wsi_streamer=debug,tower_http=debug"
        } else {
            "dicom_wsi_streamer=info,tower_http=info"
        }
    }
}

/// Configuration for the `info` command.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Also print the flattened DICOM attributes.
    #[arg(long, default_value_t = false)]
    pub internal: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    ///
    /// Warnings and errors always reach stderr; stdout carries only the report.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "dicom_wsi_streamer=debug"
        } else {
            "dicom_wsi_streamer=warn"
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
