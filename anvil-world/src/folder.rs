//! The world folder (spec.md §4.C): maps chunk positions to region files on
//! disk and keeps a small cache of open [`Region`] handles.
//!
//! Grounded on `pymclevel.infiniteworld.AnvilWorldFolder`: chunks are
//! addressed by region file, region files are named `r.<rx>.<rz>.mca`,
//! and an emptied region file is unlinked rather than left as a zeroed
//! husk (`listChunks`/`deleteChunk` both do this in the original).
//!
//! Diverges from the teacher's `RegionFolder` by keeping every opened
//! region resident in a plain [`HashMap`] rather than an LRU of bounded
//! size — a world folder's region count is already bounded by
//! `loaded_chunk_limit` indirectly (each region holds at most 1024
//! chunks, and the chunk cache itself is the thing under a hard cap), so
//! a second independent eviction policy here would just be redundant
//! bookkeeping. See DESIGN.md.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Error, Result};
use crate::position::ChunkPosition;
use crate::region::{region_file_name, region_file_path, Region, RegionWriteOptions};

#[derive(Debug)]
pub struct WorldFolder {
    root: PathBuf,
    regions: HashMap<(i32, i32), Region>,
    write_options: RegionWriteOptions,
}

impl WorldFolder {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            regions: HashMap::new(),
            write_options: RegionWriteOptions::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_write_options(&mut self, options: RegionWriteOptions) {
        self.write_options = options;
    }

    fn region_mut(&mut self, pos: ChunkPosition) -> Result<Option<&mut Region>> {
        let key = pos.region();
        if !self.regions.contains_key(&key) {
            let path = region_file_path(&self.root, key.0, key.1);
            if let Some(region) = Region::open(&path).map_err(region_io_error)? {
                self.regions.insert(key, region);
            } else {
                return Ok(None);
            }
        }
        Ok(self.regions.get_mut(&key))
    }

    fn region_mut_or_create(&mut self, pos: ChunkPosition) -> Result<&mut Region> {
        let key = pos.region();
        if !self.regions.contains_key(&key) {
            let path = region_file_path(&self.root, key.0, key.1);
            let region = match Region::open(&path).map_err(region_io_error)? {
                Some(region) => region,
                None => Region::create(&path).map_err(region_io_error)?,
            };
            self.regions.insert(key, region);
        }
        Ok(self.regions.get_mut(&key).expect("just inserted"))
    }

    pub fn contains_chunk(&mut self, pos: ChunkPosition) -> bool {
        match self.region_mut(pos) {
            Ok(Some(region)) => region.contains(pos.region_local_index()),
            _ => false,
        }
    }

    pub fn read_chunk(&mut self, pos: ChunkPosition) -> Result<Vec<u8>> {
        let index = pos.region_local_index();
        let region = self
            .region_mut(pos)?
            .ok_or(Error::ChunkNotPresent(pos))?;
        if !region.contains(index) {
            return Err(Error::ChunkNotPresent(pos));
        }
        region.read(index).map_err(region_io_error)
    }

    pub fn save_chunk(&mut self, pos: ChunkPosition, uncompressed_nbt: &[u8]) -> Result<()> {
        let index = pos.region_local_index();
        let options = self.write_options;
        let region = self.region_mut_or_create(pos)?;
        region
            .write(index, uncompressed_nbt, options)
            .map_err(region_io_error)
    }

    /// Deletes a chunk's bytes. If this empties its region file entirely,
    /// the region file itself is removed from disk, matching the original's
    /// `deleteChunk` behavior.
    pub fn delete_chunk(&mut self, pos: ChunkPosition) -> Result<()> {
        let key = pos.region();
        let index = pos.region_local_index();
        let Some(region) = self.region_mut(pos)? else {
            return Ok(());
        };
        region.delete(index).map_err(region_io_error)?;

        if region.offsets_all_zero() {
            self.regions.remove(&key);
            let path = region_file_path(&self.root, key.0, key.1);
            match fs::remove_file(&path) {
                Ok(()) => trace!(?path, "removed emptied region file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Copies one chunk's raw bytes from `other` into this folder, without
    /// decoding. Used by save-in-place to flush the scratch folder back into
    /// the real world folder.
    pub fn copy_chunk_from(&mut self, other: &mut WorldFolder, pos: ChunkPosition) -> Result<()> {
        let bytes = other.read_chunk(pos)?;
        self.save_chunk(pos, &bytes)
    }

    /// Every chunk position with data on disk, discovered by scanning region
    /// file names and their non-empty slots. Region files left with every
    /// slot empty are unlinked as they're found, per the original's
    /// `listChunks`.
    pub fn list_chunks(&mut self) -> Result<Vec<ChunkPosition>> {
        let mut out = Vec::new();
        let mut to_remove = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((rx, rz)) = parse_region_file_name(&name.to_string_lossy()) else {
                continue;
            };

            let region = match self.regions.entry((rx, rz)) {
                std::collections::hash_map::Entry::Occupied(o) => o.into_mut(),
                std::collections::hash_map::Entry::Vacant(v) => {
                    let Some(region) = Region::open(&entry.path()).map_err(region_io_error)?
                    else {
                        continue;
                    };
                    v.insert(region)
                }
            };

            let mut any = false;
            for index in 0..1024 {
                if region.contains(index) {
                    any = true;
                    let cx = rx * 32 + (index % 32) as i32;
                    let cz = rz * 32 + (index / 32) as i32;
                    out.push(ChunkPosition::new(cx, cz));
                }
            }
            if !any {
                to_remove.push((rx, rz));
            }
        }

        for key in to_remove {
            self.regions.remove(&key);
            let path = region_file_path(&self.root, key.0, key.1);
            let _ = fs::remove_file(path);
        }

        Ok(out)
    }

    pub fn chunk_count(&mut self) -> Result<usize> {
        Ok(self.list_chunks()?.len())
    }

    /// Closes every open region handle and recursively deletes and recreates
    /// the folder's directory on disk (spec.md §6: the scratch folders "are
    /// wiped on open and after successful save").
    pub fn wipe(&mut self) -> Result<()> {
        self.regions.clear();
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.root)?;
        trace!(root = %self.root.display(), "wiped world folder");
        Ok(())
    }
}

fn parse_region_file_name(name: &str) -> Option<(i32, i32)> {
    let rest = name.strip_prefix("r.")?;
    let rest = rest.strip_suffix(".mca")?;
    let mut parts = rest.splitn(2, '.');
    let rx: i32 = parts.next()?.parse().ok()?;
    let rz: i32 = parts.next()?.parse().ok()?;
    debug_assert_eq!(region_file_name(rx, rz), name);
    Some((rx, rz))
}

fn region_io_error(e: crate::region::RegionError) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
