//! DICOM tag and value representation definitions.
//!
//! This module defines the vocabulary for DICOM parsing, including:
//! - Tags that identify data elements
//! - Value representations (VRs) that determine how values are encoded
//! - A small data dictionary mapping the tags found in whole slide images to
//!   their keywords and VRs
//!
//! The dictionary only covers attributes relevant to WSI objects. Unknown tags
//! still parse (their VR comes from the stream in explicit VR syntaxes) and
//! are reported by their raw tag.

use std::fmt;

// =============================================================================
// Tag
// =============================================================================

/// A DICOM data element tag `(group, element)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    /// Create a tag from its group and element numbers.
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Create a tag from the packed `0xGGGGEEEE` form.
    pub const fn from_u32(value: u32) -> Self {
        Self {
            group: (value >> 16) as u16,
            element: (value & 0xFFFF) as u16,
        }
    }

    /// Packed `0xGGGGEEEE` form.
    pub const fn as_u32(self) -> u32 {
        ((self.group as u32) << 16) | self.element as u32
    }

    /// Key used by the DICOM JSON model (`"GGGGEEEE"`, upper-case hex).
    pub fn json_key(self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }

    /// Parse a DICOM JSON model key.
    pub fn from_json_key(key: &str) -> Option<Self> {
        if key.len() != 8 {
            return None;
        }
        u32::from_str_radix(key, 16).ok().map(Self::from_u32)
    }

    /// Whether this is an item or delimitation tag (group FFFE).
    pub const fn is_delimiter(self) -> bool {
        self.group == 0xFFFE
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

// File meta information
pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);

// Identification
pub const IMAGE_TYPE: Tag = Tag::new(0x0008, 0x0008);
pub const SOP_CLASS_UID: Tag = Tag::new(0x0008, 0x0016);
pub const SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x0018);
pub const AVAILABLE_TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0008, 0x3002);
pub const STUDY_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000E);
pub const DIMENSION_ORGANIZATION_TYPE: Tag = Tag::new(0x0020, 0x9311);

// Image pixel module
pub const SAMPLES_PER_PIXEL: Tag = Tag::new(0x0028, 0x0002);
pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag::new(0x0028, 0x0004);
pub const NUMBER_OF_FRAMES: Tag = Tag::new(0x0028, 0x0008);
pub const ROWS: Tag = Tag::new(0x0028, 0x0010);
pub const COLUMNS: Tag = Tag::new(0x0028, 0x0011);
pub const PIXEL_SPACING: Tag = Tag::new(0x0028, 0x0030);
pub const BITS_ALLOCATED: Tag = Tag::new(0x0028, 0x0100);
pub const PIXEL_MEASURES_SEQUENCE: Tag = Tag::new(0x0028, 0x9110);

// Whole slide microscopy
pub const IMAGED_VOLUME_WIDTH: Tag = Tag::new(0x0048, 0x0001);
pub const IMAGED_VOLUME_HEIGHT: Tag = Tag::new(0x0048, 0x0002);
pub const TOTAL_PIXEL_MATRIX_COLUMNS: Tag = Tag::new(0x0048, 0x0006);
pub const TOTAL_PIXEL_MATRIX_ROWS: Tag = Tag::new(0x0048, 0x0007);
pub const PLANE_POSITION_SLIDE_SEQUENCE: Tag = Tag::new(0x0048, 0x021A);
pub const COLUMN_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX: Tag = Tag::new(0x0048, 0x021E);
pub const ROW_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX: Tag = Tag::new(0x0048, 0x021F);
pub const SHARED_FUNCTIONAL_GROUPS_SEQUENCE: Tag = Tag::new(0x5200, 0x9229);
pub const PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE: Tag = Tag::new(0x5200, 0x9230);

// Pixel data and delimiters
pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);
pub const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
pub const ITEM_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE00D);
pub const SEQUENCE_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE0DD);

// =============================================================================
// Value Representation
// =============================================================================

/// A two-character DICOM value representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vr(pub [u8; 2]);

impl Vr {
    pub const AE: Vr = Vr(*b"AE");
    pub const AS: Vr = Vr(*b"AS");
    pub const AT: Vr = Vr(*b"AT");
    pub const CS: Vr = Vr(*b"CS");
    pub const DA: Vr = Vr(*b"DA");
    pub const DS: Vr = Vr(*b"DS");
    pub const DT: Vr = Vr(*b"DT");
    pub const FD: Vr = Vr(*b"FD");
    pub const FL: Vr = Vr(*b"FL");
    pub const IS: Vr = Vr(*b"IS");
    pub const LO: Vr = Vr(*b"LO");
    pub const LT: Vr = Vr(*b"LT");
    pub const OB: Vr = Vr(*b"OB");
    pub const OD: Vr = Vr(*b"OD");
    pub const OF: Vr = Vr(*b"OF");
    pub const OL: Vr = Vr(*b"OL");
    pub const OV: Vr = Vr(*b"OV");
    pub const OW: Vr = Vr(*b"OW");
    pub const PN: Vr = Vr(*b"PN");
    pub const SH: Vr = Vr(*b"SH");
    pub const SL: Vr = Vr(*b"SL");
    pub const SQ: Vr = Vr(*b"SQ");
    pub const SS: Vr = Vr(*b"SS");
    pub const ST: Vr = Vr(*b"ST");
    pub const SV: Vr = Vr(*b"SV");
    pub const TM: Vr = Vr(*b"TM");
    pub const UC: Vr = Vr(*b"UC");
    pub const UI: Vr = Vr(*b"UI");
    pub const UL: Vr = Vr(*b"UL");
    pub const UN: Vr = Vr(*b"UN");
    pub const UR: Vr = Vr(*b"UR");
    pub const US: Vr = Vr(*b"US");
    pub const UT: Vr = Vr(*b"UT");
    pub const UV: Vr = Vr(*b"UV");

    /// Parse a VR from its two-character form.
    pub fn from_code(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() == 2 && bytes.iter().all(u8::is_ascii_uppercase) {
            Some(Vr([bytes[0], bytes[1]]))
        } else {
            None
        }
    }

    /// The two-character form, e.g. `"UI"`.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("UN")
    }

    /// Whether explicit VR encoding uses the 4-byte length form
    /// (2 reserved bytes followed by a u32 length).
    pub fn has_long_length(self) -> bool {
        matches!(
            &self.0,
            b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN"
                | b"UR" | b"UT" | b"UV"
        )
    }

    /// Whether values of this VR are opaque binary payloads.
    pub fn is_binary(self) -> bool {
        matches!(
            &self.0,
            b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"UN"
        )
    }

    /// Whether values of this VR are character strings.
    pub fn is_string(self) -> bool {
        matches!(
            &self.0,
            b"AE" | b"AS" | b"CS" | b"DA" | b"DS" | b"DT" | b"IS" | b"LO" | b"LT" | b"PN"
                | b"SH" | b"ST" | b"TM" | b"UC" | b"UI" | b"UR" | b"UT"
        )
    }

    /// Whether string values of this VR hold a single, unsplit text.
    pub fn is_text(self) -> bool {
        matches!(&self.0, b"LT" | b"ST" | b"UR" | b"UT")
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Data Dictionary
// =============================================================================

/// `(tag, VR, keyword)` for the attributes we know by name.
const DICTIONARY: &[(u32, Vr, &str)] = &[
    (0x0002_0000, Vr::UL, "FileMetaInformationGroupLength"),
    (0x0002_0001, Vr::OB, "FileMetaInformationVersion"),
    (0x0002_0002, Vr::UI, "MediaStorageSOPClassUID"),
    (0x0002_0003, Vr::UI, "MediaStorageSOPInstanceUID"),
    (0x0002_0010, Vr::UI, "TransferSyntaxUID"),
    (0x0002_0012, Vr::UI, "ImplementationClassUID"),
    (0x0002_0013, Vr::SH, "ImplementationVersionName"),
    (0x0008_0005, Vr::CS, "SpecificCharacterSet"),
    (0x0008_0008, Vr::CS, "ImageType"),
    (0x0008_0012, Vr::DA, "InstanceCreationDate"),
    (0x0008_0013, Vr::TM, "InstanceCreationTime"),
    (0x0008_0016, Vr::UI, "SOPClassUID"),
    (0x0008_0018, Vr::UI, "SOPInstanceUID"),
    (0x0008_0020, Vr::DA, "StudyDate"),
    (0x0008_0021, Vr::DA, "SeriesDate"),
    (0x0008_0023, Vr::DA, "ContentDate"),
    (0x0008_002A, Vr::DT, "AcquisitionDateTime"),
    (0x0008_0030, Vr::TM, "StudyTime"),
    (0x0008_0031, Vr::TM, "SeriesTime"),
    (0x0008_0033, Vr::TM, "ContentTime"),
    (0x0008_0050, Vr::SH, "AccessionNumber"),
    (0x0008_0060, Vr::CS, "Modality"),
    (0x0008_0070, Vr::LO, "Manufacturer"),
    (0x0008_0080, Vr::LO, "InstitutionName"),
    (0x0008_0090, Vr::PN, "ReferringPhysicianName"),
    (0x0008_0100, Vr::SH, "CodeValue"),
    (0x0008_0102, Vr::SH, "CodingSchemeDesignator"),
    (0x0008_0104, Vr::LO, "CodeMeaning"),
    (0x0008_1030, Vr::LO, "StudyDescription"),
    (0x0008_103E, Vr::LO, "SeriesDescription"),
    (0x0008_1090, Vr::LO, "ManufacturerModelName"),
    (0x0008_114A, Vr::SQ, "ReferencedInstanceSequence"),
    (0x0008_1150, Vr::UI, "ReferencedSOPClassUID"),
    (0x0008_1155, Vr::UI, "ReferencedSOPInstanceUID"),
    (0x0008_3002, Vr::UI, "AvailableTransferSyntaxUID"),
    (0x0008_9206, Vr::CS, "VolumetricProperties"),
    (0x0010_0010, Vr::PN, "PatientName"),
    (0x0010_0020, Vr::LO, "PatientID"),
    (0x0010_0030, Vr::DA, "PatientBirthDate"),
    (0x0010_0040, Vr::CS, "PatientSex"),
    (0x0018_0050, Vr::DS, "SliceThickness"),
    (0x0018_0088, Vr::DS, "SpacingBetweenSlices"),
    (0x0018_1000, Vr::LO, "DeviceSerialNumber"),
    (0x0018_1020, Vr::LO, "SoftwareVersions"),
    (0x0018_1030, Vr::LO, "ProtocolName"),
    (0x0018_9004, Vr::CS, "ContentQualification"),
    (0x0020_000D, Vr::UI, "StudyInstanceUID"),
    (0x0020_000E, Vr::UI, "SeriesInstanceUID"),
    (0x0020_0010, Vr::SH, "StudyID"),
    (0x0020_0011, Vr::IS, "SeriesNumber"),
    (0x0020_0013, Vr::IS, "InstanceNumber"),
    (0x0020_0052, Vr::UI, "FrameOfReferenceUID"),
    (0x0020_4000, Vr::LT, "ImageComments"),
    (0x0020_9161, Vr::UI, "ConcatenationUID"),
    (0x0020_9162, Vr::US, "InConcatenationNumber"),
    (0x0020_9311, Vr::CS, "DimensionOrganizationType"),
    (0x0022_0016, Vr::SQ, "IlluminationTypeCodeSequence"),
    (0x0028_0002, Vr::US, "SamplesPerPixel"),
    (0x0028_0004, Vr::CS, "PhotometricInterpretation"),
    (0x0028_0006, Vr::US, "PlanarConfiguration"),
    (0x0028_0008, Vr::IS, "NumberOfFrames"),
    (0x0028_0010, Vr::US, "Rows"),
    (0x0028_0011, Vr::US, "Columns"),
    (0x0028_0030, Vr::DS, "PixelSpacing"),
    (0x0028_0100, Vr::US, "BitsAllocated"),
    (0x0028_0101, Vr::US, "BitsStored"),
    (0x0028_0102, Vr::US, "HighBit"),
    (0x0028_0103, Vr::US, "PixelRepresentation"),
    (0x0028_0301, Vr::CS, "BurnedInAnnotation"),
    (0x0028_2110, Vr::CS, "LossyImageCompression"),
    (0x0028_2112, Vr::DS, "LossyImageCompressionRatio"),
    (0x0028_2114, Vr::CS, "LossyImageCompressionMethod"),
    (0x0028_9110, Vr::SQ, "PixelMeasuresSequence"),
    (0x0040_0512, Vr::LO, "ContainerIdentifier"),
    (0x0040_0551, Vr::LO, "SpecimenIdentifier"),
    (0x0040_0554, Vr::UI, "SpecimenUID"),
    (0x0040_0560, Vr::SQ, "SpecimenDescriptionSequence"),
    (0x0040_0610, Vr::SQ, "SpecimenPreparationSequence"),
    (0x0040_072A, Vr::DS, "XOffsetInSlideCoordinateSystem"),
    (0x0040_073A, Vr::DS, "YOffsetInSlideCoordinateSystem"),
    (0x0040_074A, Vr::DS, "ZOffsetInSlideCoordinateSystem"),
    (0x0048_0001, Vr::FL, "ImagedVolumeWidth"),
    (0x0048_0002, Vr::FL, "ImagedVolumeHeight"),
    (0x0048_0003, Vr::FL, "ImagedVolumeDepth"),
    (0x0048_0006, Vr::UL, "TotalPixelMatrixColumns"),
    (0x0048_0007, Vr::UL, "TotalPixelMatrixRows"),
    (0x0048_0008, Vr::SQ, "TotalPixelMatrixOriginSequence"),
    (0x0048_0010, Vr::CS, "SpecimenLabelInImage"),
    (0x0048_0011, Vr::CS, "FocusMethod"),
    (0x0048_0012, Vr::CS, "ExtendedDepthOfField"),
    (0x0048_0102, Vr::DS, "ImageOrientationSlide"),
    (0x0048_0105, Vr::SQ, "OpticalPathSequence"),
    (0x0048_0106, Vr::SH, "OpticalPathIdentifier"),
    (0x0048_021A, Vr::SQ, "PlanePositionSlideSequence"),
    (0x0048_021E, Vr::SL, "ColumnPositionInTotalImagePixelMatrix"),
    (0x0048_021F, Vr::SL, "RowPositionInTotalImagePixelMatrix"),
    (0x0048_0301, Vr::CS, "PixelOriginInterpretation"),
    (0x0048_0302, Vr::UL, "NumberOfOpticalPaths"),
    (0x0048_0303, Vr::UL, "TotalPixelMatrixFocalPlanes"),
    (0x5200_9229, Vr::SQ, "SharedFunctionalGroupsSequence"),
    (0x5200_9230, Vr::SQ, "PerFrameFunctionalGroupsSequence"),
    (0x7FE0_0001, Vr::OV, "ExtendedOffsetTable"),
    (0x7FE0_0002, Vr::OV, "ExtendedOffsetTableLengths"),
    (0x7FE0_0010, Vr::OB, "PixelData"),
];

/// Look up the keyword registered for a tag.
pub fn keyword_for_tag(tag: Tag) -> Option<&'static str> {
    let key = tag.as_u32();
    DICTIONARY
        .iter()
        .find(|(t, _, _)| *t == key)
        .map(|(_, _, keyword)| *keyword)
}

/// Look up the tag registered for a keyword.
pub fn tag_for_keyword(keyword: &str) -> Option<Tag> {
    DICTIONARY
        .iter()
        .find(|(_, _, k)| *k == keyword)
        .map(|(t, _, _)| Tag::from_u32(*t))
}

/// Look up the VR registered for a tag (needed for implicit VR syntaxes).
pub fn vr_for_tag(tag: Tag) -> Option<Vr> {
    let key = tag.as_u32();
    if tag.element == 0x0000 {
        // Group lengths are always UL
        return Some(Vr::UL);
    }
    DICTIONARY
        .iter()
        .find(|(t, _, _)| *t == key)
        .map(|(_, vr, _)| *vr)
}

// =============================================================================
// Tests
// =============================================================================
