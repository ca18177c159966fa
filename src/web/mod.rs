//! DICOMweb access: client, multipart parsing and transfer-syntax negotiation.

mod client;
mod multipart;
mod negotiate;

pub use client::{DicomWebClient, DicomWebDescriptor, WebAuth};
pub use multipart::{boundary_from_content_type, split_multipart};
pub use negotiate::{negotiate, InstanceSearch};
