//! ECMA-167 on-disk structures
//!
//! Parsed forms of the descriptors needed by a read-only UDF driver.
//! The paragraph number in the specifications is indicated in parentheses.

use crate::io::{rdu16le, rdu32le, rdu64le, rdu8, skip};
use crate::UdfError;
use std::io::Read;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Crc calculator for Descriptor Tags
const TAG_CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

/// Primary Volume Descriptor (3/10.1)
pub const TAG_IDENT_PVD: u16 = 1;
/// Anchor Volume Descriptor Pointer (3/10.2)
pub const TAG_IDENT_AVDP: u16 = 2;
/// Partition Descriptor (3/10.5)
pub const TAG_IDENT_PD: u16 = 5;
/// Logical Volume Descriptor (3/10.6)
pub const TAG_IDENT_LVD: u16 = 6;
/// Terminating Descriptor (3/10.9 and 4/14.2)
pub const TAG_IDENT_TD: u16 = 8;
/// File Set Descriptor (4/14.1)
pub const TAG_IDENT_FSD: u16 = 256;
/// File Identifier Descriptor (4/14.4)
pub const TAG_IDENT_FID: u16 = 257;
/// Allocation Extent Descriptor (4/14.5)
pub const TAG_IDENT_AED: u16 = 258;
/// File Entry (4/14.9)
pub const TAG_IDENT_FE: u16 = 261;
/// Extended File Entry (4/14.17)
pub const TAG_IDENT_EFE: u16 = 266;

/// File Identifier Characteristics: directory bit (4/14.4.3)
pub const FID_CHAR_DIRECTORY: u8 = 0b0010;
/// File Identifier Characteristics: deleted bit (4/14.4.3)
pub const FID_CHAR_DELETED: u8 = 0b0100;
/// File Identifier Characteristics: parent bit (4/14.4.3)
pub const FID_CHAR_PARENT: u8 = 0b1000;

/// ICB file type: directory (4/14.6.6)
pub const ICB_FILE_TYPE_DIRECTORY: u8 = 4;
/// ICB file type: regular file (4/14.6.6)
pub const ICB_FILE_TYPE_REGULAR: u8 = 5;
/// ICB file type: symbolic link (4/14.6.6)
pub const ICB_FILE_TYPE_SYMLINK: u8 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Descriptor tag (3/7.2)
pub struct DescriptorTag {
    /// Tag Identifier
    pub identifier: u16,
    /// Descriptor Version
    pub version: u16,
    /// Tag Serial Number
    pub serial_number: u16,
    /// Descriptor CRC
    pub crc: u16,
    /// Descriptor CRC Length
    pub crclen: usize,
    /// Tag Location
    pub lba: u32,
}

impl DescriptorTag {
    pub(crate) fn new<R: Read>(r: &mut R) -> Result<Self, UdfError> {
        let mut buf = [0u8; 16];
        r.read_exact(&mut buf)?;
        let computed_sum = buf
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 4)
            .fold(0u8, |acc, (_, b)| acc.wrapping_add(*b));
        let br = &mut buf.as_slice();
        let identifier = rdu16le(br)?;
        let version = rdu16le(br)?;
        let chksum = rdu8(br)?;
        if chksum != computed_sum {
            debug!("Tag (id {identifier}) checksum mismatch");
            return Err(UdfError::InvalidTag(identifier));
        }
        let _rsvd = rdu8(br)?;
        let serial_number = rdu16le(br)?;
        let crc = rdu16le(br)?;
        let crclen = usize::from(rdu16le(br)?);
        let lba = rdu32le(br)?;
        Ok(Self {
            identifier,
            version,
            serial_number,
            crc,
            crclen,
            lba,
        })
    }

    /// Checks the Descriptor CRC against the descriptor body
    ///
    /// `descriptor` is the whole on-disk descriptor, tag included; `None` is
    /// returned when the CRC is not computable (zero length or truncated body)
    pub fn crc_matches(&self, descriptor: &[u8]) -> Option<bool> {
        if self.crclen == 0 || 16 + self.crclen > descriptor.len() {
            return None;
        }
        Some(TAG_CRC.checksum(&descriptor[16..16 + self.crclen]) == self.crc)
    }
}

/// Parses the tag at the start of `block`, requiring `expected` identity
///
/// The Descriptor CRC is verified opportunistically; a mismatch is tolerated
/// and reported
pub(crate) fn read_tag_checked(block: &[u8], expected: u16) -> Result<DescriptorTag, UdfError> {
    let tag = DescriptorTag::new(&mut &block[..])?;
    if tag.identifier != expected {
        return Err(UdfError::InvalidTag(tag.identifier));
    }
    if tag.crc_matches(block) == Some(false) {
        warn!("Descriptor (id {}) crc mismatch", tag.identifier);
    }
    Ok(tag)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Extent Descriptor (3/7.1)
pub struct ExtentAD {
    /// Extent Length
    pub length: u32,
    /// Extent Location
    pub lba: u32,
}

impl ExtentAD {
    pub(crate) fn new<R: Read>(r: &mut R) -> Result<Self, UdfError> {
        Ok(Self {
            length: rdu32le(r)?,
            lba: rdu32le(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Long Allocation Descriptor (4/14.14.2)
pub struct LongAD {
    /// Extent Length
    pub length: u32,
    /// Extent Location: Logical Block Number
    pub lba: u32,
    /// Extent Location: Partition Reference Number
    pub part_num: u16,
    /// Flags (UDF 2.3.10.1)
    pub flags: u16,
    /// Implementation Use
    pub impl_use: [u8; 4],
}

impl LongAD {
    pub(crate) fn new<R: Read>(r: &mut R) -> Result<Self, UdfError> {
        let length = rdu32le(r)?;
        let lba = rdu32le(r)?;
        let part_num = rdu16le(r)?;
        let flags = rdu16le(r)?;
        let mut impl_use = [0u8; 4];
        r.read_exact(&mut impl_use)?;
        Ok(Self {
            length,
            lba,
            part_num,
            flags,
            impl_use,
        })
    }

    /// The extent type from the two most significant bits of the length (4/14.14.1.1)
    pub fn extent_type(&self) -> u8 {
        (self.length >> 30) as u8
    }

    /// The extent length with the type bits masked off
    pub fn unmasked_length(&self) -> u32 {
        self.length & 0x3fff_ffff
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Anchor Volume Descriptor Pointer (3/10.2)
pub struct AnchorVolumeDescriptorPointer {
    /// Main Volume Descriptor Sequence Extent
    pub main: ExtentAD,
    /// Reserve Volume Descriptor Sequence Extent
    pub reserve: ExtentAD,
}

impl AnchorVolumeDescriptorPointer {
    pub(crate) fn new(buf: &[u8], lba: u32) -> Result<Self, UdfError> {
        let r = &mut &buf[..];
        let tag = DescriptorTag::new(r)?;
        if tag.identifier != TAG_IDENT_AVDP || tag.lba != lba {
            return Err(UdfError::InvalidTag(tag.identifier));
        }
        Ok(Self {
            main: ExtentAD::new(r)?,
            reserve: ExtentAD::new(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// UDF date and time (1/7.3)
pub enum UdfDate {
    /// The datetime is present and valid
    Valid(time::OffsetDateTime),
    /// The datetime is missing
    Unset,
    /// The datetime is present but not valid
    Invalid,
}

impl UdfDate {
    /// A datetime parser for UDF structures
    ///
    /// The interpretation type must be 1 (local time); the low 12 bits hold a
    /// signed minutes offset, with -2047 meaning unspecified
    pub(crate) fn new<R: Read>(r: &mut R) -> Result<Self, UdfError> {
        let ty_tz = rdu16le(r)?;
        let yr = rdu16le(r)?;
        let mo = rdu8(r)?;
        let da = rdu8(r)?;
        let hr = rdu8(r)?;
        let mi = rdu8(r)?;
        let se = rdu8(r)?;
        let cs = rdu8(r)?;
        let hs = rdu8(r)?;
        let us = rdu8(r)?;
        if ty_tz == 0 && yr == 0 && [mo, da, hr, mi, se, cs, hs, us].iter().all(|v| *v == 0) {
            return Ok(Self::Unset);
        }
        if ty_tz >> 12 != 1 {
            // All timestamps shall be recorded in local time
            return Ok(Self::Invalid);
        }
        let mut tz = (ty_tz & 0x0fff) as i16;
        if tz & 0x800 != 0 {
            tz -= 0x1000;
        }
        if tz == -2047 {
            // Unspecified timezone
            tz = 0;
        }
        let mo = match time::Month::try_from(mo) {
            Ok(v) => v,
            Err(_) => return Ok(Self::Invalid),
        };
        let date = match time::Date::from_calendar_date(i32::from(yr), mo, da) {
            Ok(v) => v,
            Err(_) => return Ok(Self::Invalid),
        };
        if cs > 99 || hs > 99 || us > 99 {
            return Ok(Self::Invalid);
        }
        let us = u32::from(us) + u32::from(hs) * 100 + u32::from(cs) * 10000;
        let time = match time::Time::from_hms_micro(hr, mi, se, us) {
            Ok(v) => v,
            Err(_) => return Ok(Self::Invalid),
        };
        let offset = match time::UtcOffset::from_whole_seconds(i32::from(tz) * 60) {
            Ok(v) => v,
            Err(_) => return Ok(Self::Invalid),
        };
        Ok(Self::Valid(
            time::PrimitiveDateTime::new(date, time).assume_offset(offset),
        ))
    }

    /// Returns a string representation, if possible
    pub fn to_string_maybe(&self) -> Option<String> {
        match self {
            Self::Valid(t) => Some(t.to_string()),
            Self::Unset => None,
            Self::Invalid => Some("INVALID".to_string()),
        }
    }

    /// Returns the unix timestamp, if possible
    pub fn to_ts_maybe(&self) -> Option<i64> {
        match self {
            Self::Valid(t) => Some(t.unix_timestamp()),
            Self::Unset => None,
            Self::Invalid => None,
        }
    }
}

/// Decodes OSTA compressed unicode characters (OSTA UDF 2.1.1)
///
/// Empty input yields an empty string; an unknown compression id fails
pub fn decode_dchars(raw: &[u8]) -> Result<String, UdfError> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    let compid = raw[0];
    let chars = &raw[1..];
    match compid {
        8 => Ok(char::decode_utf16(chars.iter().map(|b| u16::from(*b)))
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()),
        16 => Ok(char::decode_utf16(
            chars
                .chunks_exact(2)
                .map(|word| u16::from_be_bytes([word[0], word[1]])),
        )
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()),
        v => Err(UdfError::InvalidString(v)),
    }
}

/// Decodes a fixed-length dstring field (1/7.2.12)
///
/// The used length sits in the last byte of the field and includes the
/// compression id; an all-zero field is a zero length string
pub fn decode_dstring(raw: &[u8]) -> Result<String, UdfError> {
    if raw.len() < 2 || raw[0] == 0 {
        return Ok(String::new());
    }
    let mut used = usize::from(raw[raw.len() - 1]);
    if used > raw.len() - 1 {
        warn!("Overflowing dstring truncated");
        used = raw.len() - 1;
    }
    decode_dchars(&raw[..used])
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Primary Volume Descriptor (3/10.1)
pub struct PrimaryVolumeDescriptor {
    /// Volume Descriptor Sequence Number
    pub desc_sequence_number: u32,
    /// Primary Volume Descriptor Number
    pub number: u32,
    /// Volume Identifier (raw dstring)
    pub identifier: [u8; 32],
    /// Volume Sequence Number
    pub sequence_number: u16,
    /// Maximum Volume Sequence Number
    pub max_sequence_number: u16,
    /// Interchange Level
    pub interchange_level: u16,
    /// Maximum Interchange Level
    pub max_interchange_level: u16,
    /// Character Set List
    pub charset_list: u32,
    /// Maximum Character Set List
    pub max_charset_list: u32,
    /// Volume Set Identifier (raw dstring)
    pub volset_ident: [u8; 128],
    /// Recording Date and Time
    pub recording_time: UdfDate,
}

impl PrimaryVolumeDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn new(block: &[u8]) -> Result<Self, UdfError> {
        read_tag_checked(block, TAG_IDENT_PVD)?;
        let r = &mut &block[16..];
        let desc_sequence_number = rdu32le(r)?;
        let number = rdu32le(r)?;
        let mut identifier = [0u8; 32];
        r.read_exact(&mut identifier)?;
        let sequence_number = rdu16le(r)?;
        let max_sequence_number = rdu16le(r)?;
        let interchange_level = rdu16le(r)?;
        let max_interchange_level = rdu16le(r)?;
        let charset_list = rdu32le(r)?;
        let max_charset_list = rdu32le(r)?;
        let mut volset_ident = [0u8; 128];
        r.read_exact(&mut volset_ident)?;
        // Descriptor and explanatory charsets, abstract and copyright
        // extents, application id
        skip(r, 64 + 64 + 8 + 8 + 32)?;
        let recording_time = UdfDate::new(r)?;
        Ok(Self {
            desc_sequence_number,
            number,
            identifier,
            sequence_number,
            max_sequence_number,
            interchange_level,
            max_interchange_level,
            charset_list,
            max_charset_list,
            volset_ident,
            recording_time,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Partition Descriptor (3/10.5)
pub struct PartitionDescriptor {
    /// Volume Descriptor Sequence Number
    pub desc_sequence_number: u32,
    /// Partition Flags
    pub flags: u16,
    /// Partition Number
    pub partition_number: u16,
    /// Access Type
    pub access_type: u32,
    /// Partition Starting Location
    pub start: u32,
    /// Partition Length
    pub length: u32,
}

impl PartitionDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn new(block: &[u8]) -> Result<Self, UdfError> {
        read_tag_checked(block, TAG_IDENT_PD)?;
        let r = &mut &block[16..];
        let desc_sequence_number = rdu32le(r)?;
        let flags = rdu16le(r)?;
        let partition_number = rdu16le(r)?;
        // Partition contents id and use
        skip(r, 32 + 128)?;
        let access_type = rdu32le(r)?;
        let start = rdu32le(r)?;
        let length = rdu32le(r)?;
        Ok(Self {
            desc_sequence_number,
            flags,
            partition_number,
            access_type,
            start,
            length,
        })
    }
}

/// Byte offset of the Partition Length field inside a Partition Descriptor
pub const PD_LENGTH_FIELD_OFFSET: u64 = 192;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Partition map (3/10.7.2), Type 1 only
pub struct PartitionMap {
    /// Volume Sequence Number
    pub vol_seq_num: u16,
    /// Partition Number; rewritten at mount time to an index into the
    /// volume's Partition Descriptor list
    pub part_num: u16,
}

impl PartitionMap {
    pub(crate) fn new<R: Read>(r: &mut R) -> Result<Self, UdfError> {
        let pmtype = rdu8(r)?;
        let len = rdu8(r)?;
        if pmtype != 1 || len != 6 {
            return Err(UdfError::UnsupportedPartmap(pmtype));
        }
        Ok(Self {
            vol_seq_num: rdu16le(r)?,
            part_num: rdu16le(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Logical Volume Descriptor (3/10.6)
pub struct LogicalVolumeDescriptor {
    /// Volume Descriptor Sequence Number
    pub desc_sequence_number: u32,
    /// Logical Volume Identifier (raw dstring)
    pub identifier: [u8; 128],
    /// Logical Block Size
    pub block_size: u32,
    /// Root File Set Descriptor location
    pub root_fileset: LongAD,
    /// Map Table Length
    pub map_table_length: u32,
    /// Number of Partition Maps
    pub num_part_maps: u32,
    /// Raw partition map table, `map_table_length` bytes
    pub part_maps_raw: Vec<u8>,
}

impl LogicalVolumeDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn new(block: &[u8]) -> Result<Self, UdfError> {
        read_tag_checked(block, TAG_IDENT_LVD)?;
        let r = &mut &block[16..];
        let desc_sequence_number = rdu32le(r)?;
        // Descriptor charset
        skip(r, 64)?;
        let mut identifier = [0u8; 128];
        r.read_exact(&mut identifier)?;
        let block_size = rdu32le(r)?;
        // Domain identifier
        skip(r, 32)?;
        let root_fileset = LongAD::new(r)?;
        let map_table_length = rdu32le(r)?;
        let num_part_maps = rdu32le(r)?;
        let maps_start = 440usize;
        let maps_end = maps_start
            .checked_add(map_table_length as usize)
            .ok_or(UdfError::Oversize)?;
        if maps_end > block.len() {
            return Err(UdfError::Oversize);
        }
        Ok(Self {
            desc_sequence_number,
            identifier,
            block_size,
            root_fileset,
            map_table_length,
            num_part_maps,
            part_maps_raw: block[maps_start..maps_end].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// File Set Descriptor (4/14.1)
pub struct FileSetDescriptor {
    /// Recording Date and Time
    pub recording_time: UdfDate,
    /// Root Directory ICB
    pub root_icb: LongAD,
}

impl FileSetDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn new(block: &[u8]) -> Result<Self, UdfError> {
        read_tag_checked(block, TAG_IDENT_FSD)?;
        let r = &mut &block[16..];
        let recording_time = UdfDate::new(r)?;
        // Interchange levels, charset lists, file set numbers, charspecs,
        // identifiers: the root ICB sits at offset 400
        skip(r, 2 + 2 + 4 + 4 + 4 + 4 + 64 + 128 + 64 + 32 + 32 + 32)?;
        let root_icb = LongAD::new(r)?;
        Ok(Self {
            recording_time,
            root_icb,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Allocation Extent Descriptor (4/14.5)
pub struct AllocationExtentDescriptor {
    /// Previous Allocation Extent Location
    pub prev_ae: u32,
    /// Length of Allocation Descriptors
    pub ae_len: u32,
}

/// Size of the Allocation Extent Descriptor header preceding the descriptors
pub const AED_HEADER_LEN: usize = 24;

impl AllocationExtentDescriptor {
    pub(crate) fn new(block: &[u8]) -> Result<Self, UdfError> {
        let r = &mut &block[..];
        let tag = DescriptorTag::new(r).map_err(|_| UdfError::InvalidAedTag)?;
        if tag.identifier != TAG_IDENT_AED {
            return Err(UdfError::InvalidAedTag);
        }
        Ok(Self {
            prev_ae: rdu32le(r)?,
            ae_len: rdu32le(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The allocation descriptor layout of a File Entry (4/14.6.8)
pub enum ADType {
    /// 8 byte descriptors, partition implied by the ICB
    Short,
    /// 16 byte descriptors with explicit partition references
    Long,
    /// 24 byte extended descriptors (not supported)
    Extended,
    /// File data embedded in the entry itself
    Embedded,
    /// Out of range value
    Invalid(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// ICB Tag (4/14.6)
pub struct ICBTag {
    /// Prior Recorded Number of Direct Entries
    pub prior_entries: u32,
    /// Strategy Type
    pub strategy_type: u16,
    /// Strategy Parameter
    pub strategy_parameter: [u8; 2],
    /// Maximum Number of Entries
    pub max_entries: u16,
    /// File Type
    pub file_type: u8,
    /// Parent ICB Location: Logical Block Number
    pub parent_icb_lba: u32,
    /// Parent ICB Location: Partition Reference Number
    pub parent_icb_part: u16,
    /// Flags
    pub flags: u16,
}

impl ICBTag {
    pub(crate) fn new<R: Read>(r: &mut R) -> Result<Self, UdfError> {
        let prior_entries = rdu32le(r)?;
        let strategy_type = rdu16le(r)?;
        let strategy_parameter = [rdu8(r)?, rdu8(r)?];
        let max_entries = rdu16le(r)?;
        let _rsvd = rdu8(r)?;
        let file_type = rdu8(r)?;
        let parent_icb_lba = rdu32le(r)?;
        let parent_icb_part = rdu16le(r)?;
        let flags = rdu16le(r)?;
        Ok(Self {
            prior_entries,
            strategy_type,
            strategy_parameter,
            max_entries,
            file_type,
            parent_icb_lba,
            parent_icb_part,
            flags,
        })
    }

    /// The allocation descriptor layout from the low three flag bits
    pub fn ad_type(&self) -> ADType {
        match self.flags & 0b111 {
            0 => ADType::Short,
            1 => ADType::Long,
            2 => ADType::Extended,
            3 => ADType::Embedded,
            v => ADType::Invalid(v as u8),
        }
    }

    /// Checks if the ICB Tag refers to a directory
    pub fn is_directory(&self) -> bool {
        self.file_type == ICB_FILE_TYPE_DIRECTORY
    }

    /// Checks if the ICB Tag refers to a regular file
    pub fn is_regular(&self) -> bool {
        self.file_type == ICB_FILE_TYPE_REGULAR
    }

    /// Checks if the ICB Tag refers to a symbolic link
    pub fn is_symlink(&self) -> bool {
        self.file_type == ICB_FILE_TYPE_SYMLINK
    }
}

/// Byte offset of the Information Length field in both FE and EFE
pub const FE_SIZE_FIELD_OFFSET: u32 = 56;

#[derive(Debug, Clone, PartialEq, Eq)]
/// File Entry (4/14.9) and Extended File Entry (4/14.17)
///
/// Both flavors are parsed into the same shape; they differ only in the
/// fixed header size and a few extra fields
pub struct FileEntry {
    /// Descriptor tag (identifier 261 or 266)
    pub tag: DescriptorTag,
    /// ICB Tag
    pub icb_tag: ICBTag,
    /// Uid
    pub uid: u32,
    /// Gid
    pub gid: u32,
    /// Permissions
    pub permissions: u32,
    /// File Link Count
    pub file_link_count: u16,
    /// Information Length
    pub information_length: u64,
    /// Object Size (Extended File Entry only)
    pub object_size: Option<u64>,
    /// Logical Blocks Recorded
    pub logical_blocks_recorded: u64,
    /// Access Date and Time
    pub access_time: UdfDate,
    /// Modification Date and Time
    pub modification_time: UdfDate,
    /// Creation Date and Time (Extended File Entry only)
    pub creation_time: Option<UdfDate>,
    /// Attribute Date and Time
    pub attribute_time: UdfDate,
    /// Checkpoint
    pub checkpoint: u32,
    /// Extended Attribute ICB
    pub ext_attr_icb: LongAD,
    /// Stream Directory ICB (Extended File Entry only)
    pub stream_directory: Option<LongAD>,
    /// Unique Id
    pub unique_id: u64,
    /// Length of Extended Attributes
    pub ext_attr_length: u32,
    /// Length of Allocation Descriptors
    pub alloc_descs_length: u32,
    /// Byte offset of the extended attribute area inside the entry block
    ea_base: u32,
    /// The extended attribute bytes followed by the allocation descriptors
    /// (or the embedded file data)
    tail: Vec<u8>,
}

impl FileEntry {
    /// Parses an FE or EFE out of one logical block
    ///
    /// `expected_lba` is the partition relative block the referencing ICB
    /// points at; the recorded tag location must match it
    #[instrument(skip_all)]
    pub(crate) fn new(block: &[u8], expected_lba: u32) -> Result<Self, UdfError> {
        let r = &mut &block[..];
        let tag = DescriptorTag::new(r).map_err(|_| UdfError::InvalidFeDescriptor)?;
        if !matches!(tag.identifier, TAG_IDENT_FE | TAG_IDENT_EFE) || tag.lba != expected_lba {
            debug!(
                "Invalid File Entry tag (id {}, lba {}:{})",
                tag.identifier, tag.lba, expected_lba
            );
            return Err(UdfError::InvalidFeDescriptor);
        }
        if tag.crc_matches(block) == Some(false) {
            warn!("File Entry crc mismatch");
        }
        let is_extended = tag.identifier == TAG_IDENT_EFE;
        let icb_tag = ICBTag::new(r)?;
        let uid = rdu32le(r)?;
        let gid = rdu32le(r)?;
        let permissions = rdu32le(r)?;
        let file_link_count = rdu16le(r)?;
        let _record_format = rdu8(r)?;
        let _record_display_attrs = rdu8(r)?;
        let _record_length = rdu32le(r)?;
        let information_length = rdu64le(r)?;
        let object_size = if is_extended { Some(rdu64le(r)?) } else { None };
        let logical_blocks_recorded = rdu64le(r)?;
        let access_time = UdfDate::new(r)?;
        let modification_time = UdfDate::new(r)?;
        let creation_time = if is_extended {
            Some(UdfDate::new(r)?)
        } else {
            None
        };
        let attribute_time = UdfDate::new(r)?;
        let checkpoint = rdu32le(r)?;
        if is_extended {
            let _rsvd = rdu32le(r)?;
        }
        let ext_attr_icb = LongAD::new(r)?;
        let stream_directory = if is_extended {
            Some(LongAD::new(r)?)
        } else {
            None
        };
        // Implementation identifier
        skip(r, 32)?;
        let unique_id = rdu64le(r)?;
        let ext_attr_length = rdu32le(r)?;
        let alloc_descs_length = rdu32le(r)?;
        let ea_base: u32 = if is_extended { 216 } else { 176 };
        let tail_end = (ea_base as u64)
            .checked_add(u64::from(ext_attr_length))
            .and_then(|v| v.checked_add(u64::from(alloc_descs_length)))
            .ok_or(UdfError::Oversize)?;
        if tail_end > block.len() as u64 {
            return Err(UdfError::Oversize);
        }
        Ok(Self {
            tag,
            icb_tag,
            uid,
            gid,
            permissions,
            file_link_count,
            information_length,
            object_size,
            logical_blocks_recorded,
            access_time,
            modification_time,
            creation_time,
            attribute_time,
            checkpoint,
            ext_attr_icb,
            stream_directory,
            unique_id,
            ext_attr_length,
            alloc_descs_length,
            ea_base,
            tail: block[ea_base as usize..tail_end as usize].to_vec(),
        })
    }

    /// Whether this is an Extended File Entry
    pub fn is_extended(&self) -> bool {
        self.tag.identifier == TAG_IDENT_EFE
    }

    /// The allocation descriptor layout of this entry
    pub fn ad_type(&self) -> ADType {
        self.icb_tag.ad_type()
    }

    /// The allocation descriptor area, or the embedded file data
    pub fn alloc_data(&self) -> &[u8] {
        &self.tail[self.ext_attr_length as usize..]
    }

    /// Byte offset of the allocation descriptor area inside the entry block
    pub fn ad_region_offset(&self) -> u32 {
        self.ea_base + self.ext_attr_length
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// File Identifier Descriptor header (4/14.4), without the name
pub struct FileIdentifier {
    /// File Version Number
    pub file_version: u16,
    /// File Characteristics
    pub characteristics: u8,
    /// Length of File Identifier
    pub file_ident_length: u8,
    /// ICB
    pub icb: LongAD,
    /// Length of Implementation Use
    pub imp_use_length: u16,
}

/// Size of the fixed File Identifier Descriptor header
pub const FID_HEADER_LEN: u64 = 38;

impl FileIdentifier {
    pub(crate) fn new(buf: &[u8]) -> Result<Self, UdfError> {
        let r = &mut &buf[..];
        let tag = DescriptorTag::new(r).map_err(|_| UdfError::InvalidFidTag)?;
        if tag.identifier != TAG_IDENT_FID {
            debug!("Invalid File Identifier tag (id {})", tag.identifier);
            return Err(UdfError::InvalidFidTag);
        }
        Ok(Self {
            file_version: rdu16le(r)?,
            characteristics: rdu8(r)?,
            file_ident_length: rdu8(r)?,
            icb: LongAD::new(r)?,
            imp_use_length: rdu16le(r)?,
        })
    }

    /// Checks if the entry refers to a directory
    pub fn is_directory(&self) -> bool {
        self.characteristics & FID_CHAR_DIRECTORY != 0
    }

    /// Checks if the entry is deleted
    pub fn is_deleted(&self) -> bool {
        self.characteristics & FID_CHAR_DELETED != 0
    }

    /// Checks if the entry refers to the parent directory
    pub fn is_parent(&self) -> bool {
        self.characteristics & FID_CHAR_PARENT != 0
    }
}
