use thiserror::Error;

/// I/O errors that can occur when reading from local files or a DICOMweb archive
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error (including timeouts)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The archive answered with an unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The archive answered with a body we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing DICOM Part 10 files and WSI attributes
#[derive(Debug, Clone, Error)]
pub enum DicomError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Missing "DICM" marker after the 128-byte preamble
    #[error("Not a DICOM Part 10 file: missing DICM marker")]
    MissingMagic,

    /// The buffer ended before the element at `offset` was complete
    #[error("Truncated data: element at offset {offset} needs {needed} more bytes")]
    Truncated { offset: u64, needed: u64 },

    /// Element header or value could not be decoded
    #[error("Malformed element at offset {offset}: {message}")]
    MalformedElement { offset: u64, message: String },

    /// Transfer syntax we cannot parse or decode
    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    /// Required attribute is missing from the dataset
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// Attribute has an unexpected value
    #[error("Invalid value for {attribute}: {message}")]
    InvalidAttribute {
        attribute: &'static str,
        message: String,
    },

    /// Pixel data is absent or inconsistent with the frame count
    #[error("Invalid pixel data: {0}")]
    InvalidPixelData(String),
}

/// Errors surfaced by a tile source.
///
/// This is the only error type callers of the tile source see; native
/// decoder failures are folded into one of these variants.
#[derive(Debug, Clone, Error)]
pub enum TileSourceError {
    /// The slide could not be opened (bad path, unreachable archive,
    /// unsupported content)
    #[error("Cannot open slide: {reason}")]
    Open { reason: String },

    /// No acceptable transfer syntax is offered by the archive
    #[error("Could not find an appropriate transfer syntax. Available transfer syntaxes are: {}", available.join(", "))]
    Negotiation { available: Vec<String> },

    /// Tile indices are outside the uniform grid
    #[error("Tile ({x}, {y}) at level {z} is out of range: {message}")]
    OutOfRange {
        x: i64,
        y: i64,
        z: i64,
        message: String,
    },

    /// The native read of an in-range region failed
    #[error("Failed to decode region: {message}")]
    Decode { message: String },

    /// The native pyramid description is inconsistent
    #[error("Internal inconsistency: {message}")]
    InternalInconsistency { message: String },

    /// The output encoder failed
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },

    /// Requested associated image name is not known
    #[error("Unknown associated image: {name}")]
    UnknownAssociatedImage { name: String },
}

impl TileSourceError {
    /// Build an `Open` error from anything printable.
    pub fn open(reason: impl std::fmt::Display) -> Self {
        TileSourceError::Open {
            reason: reason.to_string(),
        }
    }

    /// Build a `Decode` error from anything printable.
    pub fn decode(message: impl std::fmt::Display) -> Self {
        TileSourceError::Decode {
            message: message.to_string(),
        }
    }
}
