//! Transfer syntaxes understood by the decoder.

use std::fmt;

/// A transfer syntax from the fixed set this crate can parse and decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferSyntax {
    /// Implicit VR Little Endian, native pixels
    ImplicitVrLittleEndian,
    /// Explicit VR Little Endian, native pixels
    ExplicitVrLittleEndian,
    /// JPEG Baseline (Process 1), 8-bit lossy
    JpegBaseline8Bit,
    /// JPEG Extended (Process 2 & 4), 12-bit lossy
    JpegExtended12Bit,
    /// JPEG 2000 Image Compression (Lossless Only)
    Jpeg2000Lossless,
    /// JPEG 2000 Image Compression
    Jpeg2000,
}

/// Negotiation preference order for DICOMweb frame retrieval.
pub const PREFERRED_TRANSFER_SYNTAXES: [TransferSyntax; 4] = [
    TransferSyntax::JpegBaseline8Bit,
    TransferSyntax::JpegExtended12Bit,
    TransferSyntax::Jpeg2000,
    TransferSyntax::Jpeg2000Lossless,
];

/// Used when the archive does not advertise its transfer syntaxes.
pub const FALLBACK_TRANSFER_SYNTAX: TransferSyntax = TransferSyntax::Jpeg2000Lossless;

impl TransferSyntax {
    pub const fn uid(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => "1.2.840.10008.1.2",
            TransferSyntax::ExplicitVrLittleEndian => "1.2.840.10008.1.2.1",
            TransferSyntax::JpegBaseline8Bit => "1.2.840.10008.1.2.4.50",
            TransferSyntax::JpegExtended12Bit => "1.2.840.10008.1.2.4.51",
            TransferSyntax::Jpeg2000Lossless => "1.2.840.10008.1.2.4.90",
            TransferSyntax::Jpeg2000 => "1.2.840.10008.1.2.4.91",
        }
    }

    /// Look up a syntax by UID, ignoring trailing padding.
    pub fn from_uid(uid: &str) -> Option<Self> {
        let uid = uid.trim_end_matches(['\0', ' ']);
        [
            TransferSyntax::ImplicitVrLittleEndian,
            TransferSyntax::ExplicitVrLittleEndian,
            TransferSyntax::JpegBaseline8Bit,
            TransferSyntax::JpegExtended12Bit,
            TransferSyntax::Jpeg2000Lossless,
            TransferSyntax::Jpeg2000,
        ]
        .into_iter()
        .find(|ts| ts.uid() == uid)
    }

    /// Whether the dataset after the file meta group uses explicit VR.
    pub const fn is_explicit_vr(self) -> bool {
        !matches!(self, TransferSyntax::ImplicitVrLittleEndian)
    }

    /// Whether pixel data is encapsulated into compressed fragments.
    pub const fn is_encapsulated(self) -> bool {
        !matches!(
            self,
            TransferSyntax::ImplicitVrLittleEndian | TransferSyntax::ExplicitVrLittleEndian
        )
    }

    /// Media type of a single frame in this syntax, as used in DICOMweb
    /// `Accept` headers.
    pub const fn media_type(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian | TransferSyntax::ExplicitVrLittleEndian => {
                "application/octet-stream"
            }
            TransferSyntax::JpegBaseline8Bit | TransferSyntax::JpegExtended12Bit => "image/jpeg",
            TransferSyntax::Jpeg2000Lossless | TransferSyntax::Jpeg2000 => "image/jp2",
        }
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uid())
    }
}
