//! # A read-only driver for UDF volumes
//!
//! This crate answers three questions about a sector addressed block device:
//! does it hold a UDF (ECMA-167 / ISO 13346) volume and under which
//! label/UUID; which files and directories exist under a given path; and
//! what are the bytes of a file at a given offset.
//!
//! All legal logical block sizes (512 to 4096) are supported and
//! automatically detected. Type 1 partition maps only; no metadata
//! partitions, no writing.
//!
//! ```no_run
//! use udf::Udf;
//!
//! let image = std::fs::read("volume.iso").unwrap();
//! let udf = Udf::mount(image.as_slice()).unwrap();
//! println!("label: {:?}", udf.label());
//! let file = udf.open("/docs/readme.txt").unwrap();
//! let mut buf = vec![0u8; file.size() as usize];
//! file.read(0, &mut buf).unwrap();
//! ```

#![warn(missing_docs)]

pub mod ecma167;
pub mod fshelp;
mod io;

use ecma167::*;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Maximum number of Partition Descriptors per volume
pub const MAX_PDS: usize = 2;
/// Maximum number of partition maps per volume
pub const MAX_PMS: usize = 6;
/// Upper bound on Volume Recognition Sequence probes
const VRS_MAX_PROBES: u32 = 64;
/// Upper bound on the encoded size of a symbolic link body
const MAX_SYMLINK_SIZE: u64 = 65536;

/// The errors surfaced by the driver
#[derive(Debug, thiserror::Error)]
pub enum UdfError {
    /// The device does not hold a UDF volume
    #[error("not an UDF filesystem")]
    NotUdf,
    /// The underlying device read failed
    #[error("disk read failed: {0}")]
    DiskIo(#[from] std::io::Error),
    /// An unexpected or out of range tag was found at a required position
    #[error("invalid tag ident {0}")]
    InvalidTag(u16),
    /// An ICB did not hold a File Entry or Extended File Entry
    #[error("invalid fe/efe descriptor")]
    InvalidFeDescriptor,
    /// A directory body position did not hold a File Identifier Descriptor
    #[error("invalid fid tag")]
    InvalidFidTag,
    /// An allocation descriptor continuation did not hold an Allocation
    /// Extent Descriptor
    #[error("invalid aed tag")]
    InvalidAedTag,
    /// More Partition Descriptors than [`MAX_PDS`]
    #[error("too many PDs")]
    TooManyPds,
    /// More partition maps than [`MAX_PMS`]
    #[error("too many partition maps")]
    TooManyPartMaps,
    /// A partition map of a type other than 1
    #[error("partmap type {0} not supported")]
    UnsupportedPartmap(u8),
    /// A partition map references a partition number no Partition
    /// Descriptor carries
    #[error("can't find PD")]
    CantFindPd,
    /// A partition reference beyond the partition map table
    #[error("invalid part ref")]
    InvalidPartRef,
    /// Extended allocation descriptors are not supported
    #[error("invalid extent type")]
    InvalidExtentType,
    /// Malformed OSTA compressed unicode (unknown compression id)
    #[error("invalid dchars compression id {0}")]
    InvalidString(u8),
    /// Malformed symbolic link component record
    #[error("invalid symlink")]
    InvalidSymlink,
    /// A structure overflows its enclosing block or addressable range
    #[error("structure exceeds its bounds")]
    Oversize,
    /// Path lookup failed
    #[error("file not found")]
    NotFound,
    /// A path component other than the last did not name a directory, or
    /// the leaf was expected to be one
    #[error("not a directory")]
    NotADirectory,
    /// The leaf was expected to be a regular file
    #[error("not a regular file")]
    NotARegularFile,
    /// Too many levels of symbolic links
    #[error("too deep nesting of symlinks")]
    TooDeep,
    /// Paths must be absolute
    #[error("invalid path")]
    InvalidPath,
}

/// A sector addressed read-only block device
///
/// Sectors are 512 bytes; `read` fills the whole of `buf` starting
/// `offset` bytes into `sector` or fails
pub trait Disk {
    /// Reads `buf.len()` bytes at `sector * 512 + offset`
    fn read(&self, sector: u64, offset: u64, buf: &mut [u8]) -> Result<(), std::io::Error>;
}

impl Disk for &[u8] {
    fn read(&self, sector: u64, offset: u64, buf: &mut [u8]) -> Result<(), std::io::Error> {
        let start = sector
            .checked_mul(512)
            .and_then(|v| v.checked_add(offset))
            .and_then(|v| usize::try_from(v).ok())
            .ok_or(std::io::ErrorKind::UnexpectedEof)?;
        let end = start
            .checked_add(buf.len())
            .ok_or(std::io::ErrorKind::UnexpectedEof)?;
        if end > self.len() {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

#[cfg(unix)]
impl Disk for std::fs::File {
    fn read(&self, sector: u64, offset: u64, buf: &mut [u8]) -> Result<(), std::io::Error> {
        use std::os::unix::fs::FileExt;
        let pos = sector
            .checked_mul(512)
            .and_then(|v| v.checked_add(offset))
            .ok_or(std::io::ErrorKind::UnexpectedEof)?;
        self.read_exact_at(buf, pos)
    }
}

/// The type of a directory entry as reported by [`Udf::iterate_dir`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A directory
    Directory,
    /// A regular file (including entries of unknown ICB file type)
    Regular,
    /// A symbolic link
    Symlink,
}

/// Directory entry details passed to the [`Udf::dir`] callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirInfo {
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Modification time as unix seconds, when recorded and valid
    pub mtime: Option<i64>,
}

/// A file or directory loaded from its ICB
///
/// A node owns its File Entry (one logical block worth of metadata); the
/// `"."` entry a directory iteration yields is a bit-for-bit clone of the
/// directory node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    part_ref: u16,
    fe_block: u64,
    fe: FileEntry,
}

impl Node {
    /// The parsed File Entry or Extended File Entry
    pub fn file_entry(&self) -> &FileEntry {
        &self.fe
    }

    /// The partition reference the node was loaded through; short
    /// allocation descriptors in this entry are relative to it
    pub fn part_ref(&self) -> u16 {
        self.part_ref
    }

    /// The absolute logical block the entry was read from
    pub fn location(&self) -> u64 {
        self.fe_block
    }

    /// The file size in bytes
    pub fn file_size(&self) -> u64 {
        self.fe.information_length
    }

    /// Checks if the node is a directory
    pub fn is_directory(&self) -> bool {
        self.fe.icb_tag.is_directory()
    }

    /// Checks if the node is a symbolic link
    pub fn is_symlink(&self) -> bool {
        self.fe.icb_tag.is_symlink()
    }

    /// The raw ICB file type byte
    pub fn file_type(&self) -> u8 {
        self.fe.icb_tag.file_type
    }
}

/// Provenance of an opened file, for tooling that needs to locate on-disk
/// fields of the structures the lookup traversed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Absolute logical block of the leaf File Entry
    pub fe_block: u64,
    /// Tag identifier of the leaf entry (FE or EFE)
    pub fe_tag_ident: u16,
    /// Byte offset of the allocation descriptor area inside the entry block
    pub fe_ad_offset: u32,
    /// Byte offset of the file size field inside the entry block
    pub fe_size_field_offset: u32,
    /// Absolute byte offset of the Partition Length field of the last
    /// Partition Descriptor read at mount time
    pub pd_length_offset: u64,
    /// Start sector (logical blocks) of the first mapped partition
    pub partition_start: u64,
}

/// A mounted UDF volume
///
/// Immutable once mounted; concurrent read-only use is safe whenever the
/// underlying [`Disk`] is
pub struct Udf<D: Disk> {
    disk: D,
    /// Logical block size as a 512 byte sector shift (0..=3)
    pub lb_shift: u32,
    /// Primary Volume Descriptor
    pub pvd: PrimaryVolumeDescriptor,
    /// Logical Volume Descriptor
    pub lvd: LogicalVolumeDescriptor,
    /// Partition Descriptors
    pub pds: Vec<PartitionDescriptor>,
    /// Partition maps; `part_num` holds an index into [`Self::pds`]
    pub pms: Vec<PartitionMap>,
    /// Location of the root directory ICB
    pub root_icb: LongAD,
    last_pd_length_offset: u64,
}

impl<D: Disk> Udf<D> {
    /// Mounts a UDF volume: locates the anchor across logical block sizes,
    /// checks the volume recognition sequence, walks the volume descriptor
    /// sequence and loads the root file set
    #[instrument(skip_all)]
    pub fn mount(disk: D) -> Result<Self, UdfError> {
        // Search for the Anchor Volume Descriptor Pointer and determine
        // the logical block size
        let mut anchor = None;
        'probe: for lb_shift in 0..4u32 {
            for b in [256u32, 512] {
                let mut buf = [0u8; 32];
                if disk.read(u64::from(b) << lb_shift, 0, &mut buf).is_err() {
                    continue;
                }
                if let Ok(avdp) = AnchorVolumeDescriptorPointer::new(&buf, b) {
                    debug!("AVDP at block {b}, lb_shift {lb_shift}: {avdp:?}");
                    anchor = Some((lb_shift, avdp));
                    break 'probe;
                }
            }
        }
        let (lb_shift, avdp) = anchor.ok_or(UdfError::NotUdf)?;

        // Check the Volume Recognition Sequence
        let mut vblock = (32767u64 >> (9 + lb_shift)) + 1;
        let step = (2047u64 >> (9 + lb_shift)) + 1;
        let mut has_nsr = false;
        for _ in 0..VRS_MAX_PROBES {
            let mut vrs = [0u8; 7];
            disk.read(vblock << lb_shift, 0, &mut vrs)
                .map_err(|_| UdfError::NotUdf)?;
            match &vrs[1..6] {
                b"NSR02" | b"NSR03" => {
                    debug!("NSR0{} descriptor at block {vblock}", vrs[5] - 0x30);
                    has_nsr = true;
                    break;
                }
                b"BEA01" | b"BOOT2" | b"CD001" | b"CDW02" => {}
                _ => break,
            }
            vblock += step;
        }
        if !has_nsr {
            return Err(UdfError::NotUdf);
        }

        // Walk the Volume Descriptor Sequence
        let bs = 512usize << lb_shift;
        let mut block = u64::from(avdp.main.lba);
        let mut pvd = None;
        let mut lvd: Option<LogicalVolumeDescriptor> = None;
        let mut pds: Vec<PartitionDescriptor> = Vec::new();
        let mut pms: Vec<PartitionMap> = Vec::new();
        let mut last_pd_length_offset = 0u64;
        let mut buf = vec![0u8; bs];
        loop {
            disk.read(block << lb_shift, 0, &mut buf)?;
            let tag = DescriptorTag::new(&mut buf.as_slice())?;
            debug!("Sequence tag at block {block}: {tag:?}");
            match tag.identifier {
                TAG_IDENT_PVD => {
                    pvd = Some(PrimaryVolumeDescriptor::new(&buf)?);
                }
                TAG_IDENT_PD => {
                    if pds.len() >= MAX_PDS {
                        return Err(UdfError::TooManyPds);
                    }
                    pds.push(PartitionDescriptor::new(&buf)?);
                    last_pd_length_offset = (block << lb_shift) * 512 + PD_LENGTH_FIELD_OFFSET;
                }
                TAG_IDENT_LVD => {
                    let l = LogicalVolumeDescriptor::new(&buf)?;
                    if pms.len() + l.num_part_maps as usize > MAX_PMS {
                        return Err(UdfError::TooManyPartMaps);
                    }
                    let r = &mut l.part_maps_raw.as_slice();
                    for _ in 0..l.num_part_maps {
                        pms.push(PartitionMap::new(r)?);
                    }
                    lvd = Some(l);
                }
                TAG_IDENT_TD => break,
                t if t > TAG_IDENT_TD => return Err(UdfError::InvalidTag(t)),
                _ => {}
            }
            block += 1;
        }
        let pvd = pvd.ok_or(UdfError::NotUdf)?;
        let lvd = lvd.ok_or(UdfError::NotUdf)?;
        if u64::from(lvd.block_size) != bs as u64 {
            warn!(
                "LVD block size {} differs from the detected {bs}",
                lvd.block_size
            );
        }

        // Rewrite each partition map's partition number into an index
        // into the PD table
        for pm in pms.iter_mut() {
            let idx = pds
                .iter()
                .position(|pd| pd.partition_number == pm.part_num)
                .ok_or(UdfError::CantFindPd)?;
            pm.part_num = idx as u16;
        }

        // Load the root File Set Descriptor
        let root_fileset = lvd.root_fileset.clone();
        let mut udf = Self {
            disk,
            lb_shift,
            pvd,
            lvd,
            pds,
            pms,
            root_icb: root_fileset.clone(),
            last_pd_length_offset,
        };
        let fsd_block = udf.get_block(root_fileset.part_num, root_fileset.lba)?;
        let mut buf = vec![0u8; bs];
        udf.read_lblock(fsd_block, &mut buf)?;
        let fsd = FileSetDescriptor::new(&buf)?;
        debug!("Root file set: {fsd:?}");
        udf.root_icb = fsd.root_icb;
        Ok(udf)
    }

    /// The underlying device
    pub fn disk(&self) -> &D {
        &self.disk
    }

    /// The logical block size in bytes
    pub fn block_size(&self) -> usize {
        512usize << self.lb_shift
    }

    /// Start sector (in logical blocks) of the first mapped partition
    pub fn partition_start_sector(&self) -> u64 {
        u64::from(self.pds[usize::from(self.pms[0].part_num)].start)
    }

    /// Number of 512 byte sectors per logical block
    pub fn sectors_per_block(&self) -> u64 {
        1u64 << self.lb_shift
    }

    /// Translates a partition relative block into an absolute logical block
    fn get_block(&self, part_ref: u16, block: u32) -> Result<u64, UdfError> {
        let pm = self
            .pms
            .get(usize::from(part_ref))
            .ok_or(UdfError::InvalidPartRef)?;
        Ok(u64::from(self.pds[usize::from(pm.part_num)].start) + u64::from(block))
    }

    /// Reads one logical block off the device
    fn read_lblock(&self, block: u64, buf: &mut [u8]) -> Result<(), UdfError> {
        Ok(self.disk.read(block << self.lb_shift, 0, buf)?)
    }

    /// Loads the File Entry a long allocation descriptor points at
    pub fn read_icb(&self, icb: &LongAD) -> Result<Node, UdfError> {
        let block = self.get_block(icb.part_num, icb.lba)?;
        let mut buf = vec![0u8; self.block_size()];
        self.read_lblock(block, &mut buf)?;
        let fe = FileEntry::new(&buf, icb.lba)?;
        Ok(Node {
            part_ref: icb.part_num,
            fe_block: block,
            fe,
        })
    }

    /// Loads the root directory node
    pub fn root_node(&self) -> Result<Node, UdfError> {
        self.read_icb(&self.root_icb)
    }

    /// Maps a file relative block index to an absolute logical block
    ///
    /// `Ok(None)` signals a hole (an unrecorded extent, or a position past
    /// the last descriptor) and for embedded files, which occupy no blocks.
    /// Allocation descriptor continuations are followed through their
    /// Allocation Extent Descriptors with one scratch block at a time.
    pub fn map_file_block(&self, node: &Node, file_block: u64) -> Result<Option<u64>, UdfError> {
        let ad_size = match node.fe.ad_type() {
            ADType::Short => 8usize,
            ADType::Long => 16,
            ADType::Embedded => return Ok(None),
            ADType::Extended | ADType::Invalid(_) => return Err(UdfError::InvalidExtentType),
        };
        let mut filebytes = file_block
            .checked_mul(u64::from(self.lvd.block_size))
            .ok_or(UdfError::Oversize)?;
        let mut descs = node.fe.alloc_data().to_vec();
        let mut pos = 0usize;
        let mut remaining = descs.len();
        while remaining >= ad_size && pos + ad_size <= descs.len() {
            let r = &mut &descs[pos..];
            let (length, loc_block, loc_part) = if ad_size == 8 {
                let ad = ExtentAD::new(r)?;
                (ad.length, ad.lba, node.part_ref)
            } else {
                let ad = LongAD::new(r)?;
                (ad.length, ad.lba, ad.part_num)
            };
            let adlen = length & 0x3fff_ffff;
            let adtype = length >> 30;
            if adtype == 3 {
                // Continuation: the next descriptors live in an
                // Allocation Extent Descriptor elsewhere on disk
                let bs = self.block_size();
                if adlen == 0 || adlen as usize > bs {
                    return Err(UdfError::Oversize);
                }
                let sec = self.get_block(loc_part, loc_block)?;
                let mut scratch = vec![0u8; bs];
                self.read_lblock(sec, &mut scratch)?;
                let aed = AllocationExtentDescriptor::new(&scratch)?;
                let ae_len = aed.ae_len as usize;
                if AED_HEADER_LEN + ae_len > bs {
                    return Err(UdfError::Oversize);
                }
                descs = scratch;
                pos = AED_HEADER_LEN;
                remaining = ae_len;
                continue;
            }
            if filebytes < u64::from(adlen) {
                if adtype == 1 || adtype == 2 {
                    // Unrecorded extent
                    return Ok(None);
                }
                let base = self.get_block(loc_part, loc_block)?;
                return Ok(Some(base + (filebytes >> (9 + self.lb_shift))));
            }
            filebytes -= u64::from(adlen);
            pos += ad_size;
            remaining -= ad_size;
        }
        Ok(None)
    }

    /// Reads file bytes at `pos`, zero-filling holes and clamping at the
    /// file size; returns the number of bytes produced
    ///
    /// The hook, when given, observes every device read as
    /// `(sector, in_sector_offset, length)` in ascending file offset order
    fn read_file_at(
        &self,
        node: &Node,
        pos: u64,
        buf: &mut [u8],
        mut hook: Option<&mut dyn FnMut(u64, u64, usize)>,
    ) -> Result<usize, UdfError> {
        let size = node.fe.information_length;
        if pos >= size {
            return Ok(0);
        }
        let len = (size - pos).min(buf.len() as u64) as usize;
        match node.fe.ad_type() {
            ADType::Embedded => {
                let data = node.fe.alloc_data();
                let start = pos as usize;
                let end = start.checked_add(len).ok_or(UdfError::Oversize)?;
                if end > data.len() {
                    return Err(UdfError::Oversize);
                }
                buf[..len].copy_from_slice(&data[start..end]);
                Ok(len)
            }
            ADType::Extended | ADType::Invalid(_) => Err(UdfError::InvalidExtentType),
            ADType::Short | ADType::Long => {
                let bs = self.block_size() as u64;
                let mut done = 0usize;
                while done < len {
                    let fpos = pos + done as u64;
                    let in_block = fpos % bs;
                    let n = ((bs - in_block) as usize).min(len - done);
                    match self.map_file_block(node, fpos / bs)? {
                        None => buf[done..done + n].fill(0),
                        Some(ablock) => {
                            let sector = ablock << self.lb_shift;
                            self.disk.read(sector, in_block, &mut buf[done..done + n])?;
                            if let Some(h) = hook.as_mut() {
                                h(sector, in_block, n);
                            }
                        }
                    }
                    done += n;
                }
                Ok(len)
            }
        }
    }

    /// Streams the entries of a directory node through `hook`
    ///
    /// A leading `"."` entry carrying a clone of the directory node is
    /// synthesized first. Deleted entries are skipped; entries with names
    /// that fail to decode are skipped with a warning. Iteration stops when
    /// the hook returns `true` (reported as `Ok(true)`) or at the end of
    /// the directory body.
    pub fn iterate_dir<F>(&self, dir: &Node, hook: &mut F) -> Result<bool, UdfError>
    where
        F: FnMut(&str, FileType, Node) -> bool,
    {
        // The current directory is not stored
        if hook(".", FileType::Directory, dir.clone()) {
            return Ok(true);
        }
        let size = dir.fe.information_length;
        let mut offset = 0u64;
        let mut header = [0u8; FID_HEADER_LEN as usize];
        while offset < size {
            if size - offset < FID_HEADER_LEN {
                warn!("Truncated directory entry at offset {offset}");
                break;
            }
            self.read_file_at(dir, offset, &mut header, None)?;
            let fid = FileIdentifier::new(&header)?;
            offset += FID_HEADER_LEN + u64::from(fid.imp_use_length);
            let name_len = u64::from(fid.file_ident_length);
            if !fid.is_deleted() {
                let child = self.read_icb(&fid.icb)?;
                if fid.is_parent() {
                    // This is the parent directory
                    if hook("..", FileType::Directory, child) {
                        return Ok(true);
                    }
                } else if name_len == 0 || offset + name_len > size {
                    warn!("Skipping directory entry with bad name length {name_len}");
                } else {
                    let mut raw = vec![0u8; name_len as usize];
                    self.read_file_at(dir, offset, &mut raw, None)?;
                    let ftype = if child.fe.icb_tag.is_symlink() {
                        FileType::Symlink
                    } else if fid.is_directory() {
                        FileType::Directory
                    } else {
                        FileType::Regular
                    };
                    match decode_dchars(&raw) {
                        Ok(name) => {
                            if hook(&name, ftype, child) {
                                return Ok(true);
                            }
                        }
                        Err(e) => warn!("Skipping entry with undecodable name: {e}"),
                    }
                }
            }
            // Align to dword boundary
            offset = (offset + name_len + 3) & !3;
        }
        Ok(false)
    }

    /// Decodes the path component records of a symbolic link node into a
    /// POSIX style path
    pub fn read_symlink(&self, node: &Node) -> Result<String, UdfError> {
        let sz = node.fe.information_length;
        if !(4..=MAX_SYMLINK_SIZE).contains(&sz) {
            return Err(UdfError::InvalidSymlink);
        }
        let mut raw = vec![0u8; sz as usize];
        if self.read_file_at(node, 0, &mut raw, None)? != raw.len() {
            return Err(UdfError::InvalidSymlink);
        }
        let mut rooted = false;
        let mut comps: Vec<String> = Vec::new();
        let mut p = 0usize;
        while p < raw.len() {
            if p + 4 > raw.len() || raw[p + 2] != 0 || raw[p + 3] != 0 {
                return Err(UdfError::InvalidSymlink);
            }
            let ctype = raw[p];
            let clen = usize::from(raw[p + 1]);
            if p + 4 + clen > raw.len() {
                return Err(UdfError::InvalidSymlink);
            }
            match ctype {
                1 | 2 => {
                    if clen != 0 {
                        return Err(UdfError::InvalidSymlink);
                    }
                    rooted = true;
                    comps.clear();
                }
                3 => comps.push("..".to_string()),
                4 => comps.push(".".to_string()),
                5 => comps.push(
                    decode_dchars(&raw[p + 4..p + 4 + clen])
                        .map_err(|_| UdfError::InvalidSymlink)?,
                ),
                _ => return Err(UdfError::InvalidSymlink),
            }
            p += 4 + clen;
        }
        let mut out = if rooted {
            "/".to_string()
        } else {
            String::new()
        };
        out.push_str(&comps.join("/"));
        Ok(out)
    }

    /// The volume label, from the logical volume identifier
    pub fn label(&self) -> Option<String> {
        decode_dstring(&self.lvd.identifier).ok()
    }

    /// A 16 hex character volume UUID derived from the volume set
    /// identifier, or `None` when the identifier is shorter than 8
    /// characters or undecodable
    pub fn uuid(&self) -> Option<String> {
        let volset = decode_dstring(&self.pvd.volset_ident).ok()?;
        gen_uuid_from_volset(&volset)
    }

    /// Lists a directory, passing each entry name and its [`DirInfo`] to
    /// `hook`; a `true` return from the hook stops the listing
    pub fn dir<F>(&self, path: &str, mut hook: F) -> Result<(), UdfError>
    where
        F: FnMut(&str, &DirInfo) -> bool,
    {
        let root = self.root_node()?;
        let found = fshelp::find_file(self, path, &root, FileType::Directory)?;
        self.iterate_dir(&found, &mut |name, ftype, node| {
            let info = DirInfo {
                is_dir: ftype == FileType::Directory,
                mtime: node.fe.modification_time.to_ts_maybe(),
            };
            hook(name, &info)
        })?;
        Ok(())
    }

    /// Opens the regular file at `path`, resolving symbolic links on the
    /// way
    pub fn open(&self, path: &str) -> Result<FileHandle<'_, D>, UdfError> {
        let root = self.root_node()?;
        let node = fshelp::find_file(self, path, &root, FileType::Regular)?;
        let provenance = Provenance {
            fe_block: node.fe_block,
            fe_tag_ident: node.fe.tag.identifier,
            fe_ad_offset: node.fe.ad_region_offset(),
            fe_size_field_offset: FE_SIZE_FIELD_OFFSET,
            pd_length_offset: self.last_pd_length_offset,
            partition_start: self.partition_start_sector(),
        };
        Ok(FileHandle {
            udf: self,
            node,
            provenance,
        })
    }
}

/// An open file bound to its volume
///
/// The handle holds no read position; the offset is a parameter of every
/// read. Dropping the handle closes it.
pub struct FileHandle<'u, D: Disk> {
    udf: &'u Udf<D>,
    node: Node,
    provenance: Provenance,
}

impl<'u, D: Disk> FileHandle<'u, D> {
    /// The file size in bytes
    pub fn size(&self) -> u64 {
        self.node.file_size()
    }

    /// The underlying node
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Where the file's metadata came from
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Reads up to `buf.len()` bytes at `pos`; holes read as zeroes and
    /// reads are clamped at the file size
    pub fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, UdfError> {
        self.udf.read_file_at(&self.node, pos, buf, None)
    }

    /// Like [`read`](Self::read), invoking `hook` with
    /// `(sector, in_sector_offset, length)` for every device read issued
    pub fn read_with_hook<F>(&self, pos: u64, buf: &mut [u8], mut hook: F) -> Result<usize, UdfError>
    where
        F: FnMut(u64, u64, usize),
    {
        self.udf.read_file_at(&self.node, pos, buf, Some(&mut hook))
    }

    /// Absolute byte position of the file's first mapped block, or `None`
    /// for embedded files and files starting in a hole
    pub fn data_start_byte(&self) -> Result<Option<u64>, UdfError> {
        Ok(self
            .udf
            .map_file_block(&self.node, 0)?
            .map(|block| (block << self.udf.lb_shift) * 512))
    }

    /// Closes the handle
    pub fn close(self) {}
}

/// Derives a 16 hex character UUID from a decoded volume set identifier
///
/// Identifiers shorter than 8 characters yield no UUID. The first 16
/// characters (NUL padded) are examined: if fewer than 8 are hex digits
/// the first 8 bytes are hex dumped; if fewer than 16, the first 8
/// characters are lowercased and bytes 8..12 hex dumped; otherwise all 16
/// characters are lowercased.
fn gen_uuid_from_volset(volset_ident: &str) -> Option<String> {
    let raw = volset_ident.as_bytes();
    if raw.len() < 8 {
        return None;
    }
    let mut buf = [0u8; 16];
    let len = raw.len().min(16);
    buf[..len].copy_from_slice(&raw[..len]);
    let nonhexpos = buf
        .iter()
        .position(|b| !b.is_ascii_hexdigit())
        .unwrap_or(16);
    let mut uuid = String::with_capacity(16);
    if nonhexpos < 8 {
        for b in &buf[0..8] {
            uuid.push_str(&format!("{b:02x}"));
        }
    } else if nonhexpos < 16 {
        for b in &buf[0..8] {
            uuid.push(b.to_ascii_lowercase() as char);
        }
        for b in &buf[8..12] {
            uuid.push_str(&format!("{b:02x}"));
        }
    } else {
        for b in &buf[0..16] {
            uuid.push(b.to_ascii_lowercase() as char);
        }
    }
    Some(uuid)
}
