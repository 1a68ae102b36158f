//! The region-file interface (spec.md §4.B): a 32×32-sector container
//! exposing `contains`/`read`/`write`/`delete`/`offsets_all_zero`. Sector
//! allocation and the compressed-blob framing are implemented here (the
//! spec treats this as an external collaborator and only asserts the
//! five-operation contract it exposes upward); the framing itself follows
//! `valence_anvil`'s `Region`/`Location` almost exactly, since the on-disk
//! `.mca` layout is unrelated to whether the chunk NBT inside is the legacy
//! nibble-array schema or the modern palette one.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bitfield_struct::bitfield;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use thiserror::Error;

const SECTOR_SIZE: usize = 4096;
const HEADER_SECTORS: usize = 2;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegionError {
    #[error("an I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid chunk sector offset")]
    InvalidChunkSectorOffset,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("invalid compression scheme number of {0}")]
    InvalidCompressionScheme(u8),
    #[error("chunk exceeds the 1 MiB oversized-chunk limit")]
    OversizedChunk,
}

/// Compression applied to a chunk's bytes before they're written into the
/// region file. `anvil-world`'s codec always hands `write` uncompressed NBT
/// bytes; this enum governs only the on-disk framing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    Gzip = 1,
    #[default]
    Zlib = 2,
    None = 3,
}

impl Compression {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Zlib),
            3 => Some(Compression::None),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RegionWriteOptions {
    pub compression: Compression,
    /// Versions before 1.15 can't read oversized (>1MiB) chunks; set this to
    /// fail instead of writing one.
    pub skip_oversized_chunks: bool,
}

#[bitfield(u32)]
struct Location {
    count: u8,
    #[bits(24)]
    offset: u32,
}

impl Location {
    fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A single open `r.<rx>.<rz>.mca` file.
#[derive(Debug)]
pub struct Region {
    file: File,
    locations: [Location; 1024],
    timestamps: [u32; 1024],
    used_sectors: bitvec::vec::BitVec,
}

impl Region {
    /// Opens an existing region file. Returns `Ok(None)` if `path` doesn't
    /// exist.
    pub fn open(path: &Path) -> Result<Option<Self>, RegionError> {
        let mut file = match File::options().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut header = [0u8; SECTOR_SIZE * HEADER_SECTORS];
        file.read_exact(&mut header)?;

        let locations: [Location; 1024] = std::array::from_fn(|i| {
            Location(u32::from_be_bytes(header[i * 4..i * 4 + 4].try_into().unwrap()))
        });
        let timestamps: [u32; 1024] = std::array::from_fn(|i| {
            u32::from_be_bytes(
                header[i * 4 + SECTOR_SIZE..i * 4 + SECTOR_SIZE + 4]
                    .try_into()
                    .unwrap(),
            )
        });

        let file_len = file.metadata()?.len();
        let mut used_sectors = bitvec::vec::BitVec::repeat(true, HEADER_SECTORS);
        for location in locations {
            if location.is_none() {
                continue;
            }
            let offset = location.offset() as u64;
            let count = location.count() as usize;
            if offset < HEADER_SECTORS as u64 || count == 0 {
                continue;
            }
            if offset * SECTOR_SIZE as u64 > file_len {
                continue;
            }
            reserve_sectors(&mut used_sectors, offset, count);
        }

        Ok(Some(Self {
            file,
            locations,
            timestamps,
            used_sectors,
        }))
    }

    /// Creates a new, empty region file at `path`.
    pub fn create(path: &Path) -> Result<Self, RegionError> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&[0u8; SECTOR_SIZE * HEADER_SECTORS])?;
        Ok(Self {
            file,
            locations: [Location::default(); 1024],
            timestamps: [0; 1024],
            used_sectors: bitvec::vec::BitVec::repeat(true, HEADER_SECTORS),
        })
    }

    pub fn contains(&self, index: usize) -> bool {
        !self.locations[index].is_none()
    }

    /// Returns this region's decompressed, uncompressed-NBT chunk bytes.
    pub fn read(&mut self, index: usize) -> Result<Vec<u8>, RegionError> {
        let location = self.locations[index];
        if location.is_none() {
            return Err(RegionError::InvalidChunkSectorOffset);
        }
        let offset = location.offset() as u64;
        if offset < HEADER_SECTORS as u64 {
            return Err(RegionError::InvalidChunkSectorOffset);
        }

        self.file.seek(SeekFrom::Start(offset * SECTOR_SIZE as u64))?;
        let exact_size = self.file.read_u32::<BigEndian>()? as usize;
        if exact_size == 0 {
            return Err(RegionError::InvalidChunkSize);
        }
        let compression = self.file.read_u8()?;

        let mut raw = vec![0u8; exact_size - 1];
        self.file.read_exact(&mut raw)?;

        let mut out = Vec::new();
        match Compression::from_u8(compression) {
            Some(Compression::Gzip) => {
                flate2::bufread::GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
            }
            Some(Compression::Zlib) => {
                ZlibDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
            }
            Some(Compression::None) => out = raw,
            None => return Err(RegionError::InvalidCompressionScheme(compression)),
        }
        Ok(out)
    }

    /// Compresses and stores `data` (uncompressed NBT bytes) at `index`.
    pub fn write(
        &mut self,
        index: usize,
        data: &[u8],
        options: RegionWriteOptions,
    ) -> Result<(), RegionError> {
        self.free_slot(index);

        let mut compressed = Vec::new();
        match options.compression {
            Compression::Gzip => {
                let mut enc =
                    flate2::write::GzEncoder::new(&mut compressed, flate2::Compression::default());
                enc.write_all(data)?;
                enc.finish()?;
            }
            Compression::Zlib => {
                let mut enc = ZlibEncoder::new(&mut compressed, flate2::Compression::default());
                enc.write_all(data)?;
                enc.finish()?;
            }
            Compression::None => compressed.extend_from_slice(data),
        }

        let sectors_needed = (compressed.len() + 5).div_ceil(SECTOR_SIZE);
        if sectors_needed >= 256 && options.skip_oversized_chunks {
            return Err(RegionError::OversizedChunk);
        }

        let start_sector = self.allocate_sectors(sectors_needed.max(1));
        self.file.seek(SeekFrom::Start(start_sector * SECTOR_SIZE as u64))?;
        self.file
            .write_u32::<BigEndian>((compressed.len() + 1) as u32)?;
        self.file.write_u8(options.compression as u8)?;
        self.file.write_all(&compressed)?;

        let file_len = self.file.seek(SeekFrom::End(0))?;
        let rem = file_len as usize % SECTOR_SIZE;
        if rem != 0 {
            self.file.write_all(&vec![0u8; SECTOR_SIZE - rem])?;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let location = Location::new()
            .with_offset(start_sector as u32)
            .with_count(sectors_needed.max(1) as u8);
        self.file.seek(SeekFrom::Start(index as u64 * 4))?;
        self.file.write_u32::<BigEndian>(location.0)?;
        self.file
            .seek(SeekFrom::Start(index as u64 * 4 + SECTOR_SIZE as u64))?;
        self.file.write_u32::<BigEndian>(timestamp)?;

        self.locations[index] = location;
        self.timestamps[index] = timestamp;

        Ok(())
    }

    /// Zeroes the slot at `index` on disk and in memory.
    pub fn delete(&mut self, index: usize) -> Result<(), RegionError> {
        if self.locations[index].is_none() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(index as u64 * 4))?;
        self.file.write_u32::<BigEndian>(0)?;
        self.free_slot(index);
        self.locations[index] = Location::new();
        Ok(())
    }

    pub fn offsets_all_zero(&self) -> bool {
        self.locations.iter().all(|l| l.is_none())
    }

    fn free_slot(&mut self, index: usize) {
        let location = self.locations[index];
        if location.is_none() {
            return;
        }
        let start = location.offset() as usize;
        let end = start + location.count() as usize;
        let len = self.used_sectors.len();
        self.used_sectors[start.min(len)..end.min(len)].fill(false);
    }

    fn allocate_sectors(&mut self, count: usize) -> u64 {
        let mut index = 0;
        let start = loop {
            let Some(mut zero_start) = self.used_sectors[index..].first_zero() else {
                break self.used_sectors.len();
            };
            zero_start += index;

            let Some(mut zero_end) = self.used_sectors[zero_start..].first_one() else {
                break zero_start;
            };
            zero_end += zero_start;

            if zero_end - zero_start >= count {
                break zero_start;
            }
            index = zero_end;
        };
        reserve_sectors(&mut self.used_sectors, start as u64, count);
        start as u64
    }
}

fn reserve_sectors(used_sectors: &mut bitvec::vec::BitVec, offset: u64, count: usize) {
    let start = offset as usize;
    let end = start + count;
    if used_sectors.len() < end {
        used_sectors.resize(start, false);
        used_sectors.resize(end, true);
    } else {
        used_sectors[start..end].fill(true);
    }
}

pub fn region_file_name(rx: i32, rz: i32) -> String {
    format!("r.{rx}.{rz}.mca")
}

pub fn region_file_path(dir: &Path, rx: i32, rz: i32) -> PathBuf {
    dir.join(region_file_name(rx, rz))
}
