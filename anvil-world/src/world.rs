//! The world facade (spec.md §4.H): ties the world folder, chunk cache, and
//! light engine together behind a single handle, and owns the session lock,
//! `level.dat`, and the `DIM<n>` dimension registry.
//!
//! Grounded on `pymclevel.infiniteworld.MCInfdevOldLevel`/`MCAlphaDimension`:
//! the constructor's session-lock/scratch-folder setup, `saveInPlaceGen`'s
//! flush-then-sweep order, and dimension delegation through a subfolder
//! named `DIM<n>`.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anvil_nbt::{compound, Compound, Value};
use tracing::{debug, info, warn};

use crate::cache::ChunkCache;
use crate::chunk::{ChunkPayload, ChunkView, DEFAULT_HEIGHT};
use crate::codec;
use crate::config::WorldConfig;
use crate::error::{Error, Result};
use crate::folder::WorldFolder;
use crate::light::{self, LightJob, LightSource};
use crate::materials::{Materials, VanillaMaterials};
use crate::position::{ChunkBox, ChunkPosition};

pub const VERSION_ANVIL: i32 = 19133;

/// Overworld id. The Nether and the End (`-1`/`1`) have no sky light per
/// spec.md §9.
const OVERWORLD: i32 = 0;

fn has_sky_light(dimension: i32) -> bool {
    !matches!(dimension, -1 | 1)
}

/// The `Data` compound of `level.dat`, trimmed to the fields this crate
/// understands; everything else round-trips through `raw_extra`.
#[derive(Clone, Debug)]
pub struct LevelData {
    pub random_seed: i64,
    pub last_played: i64,
    pub spawn_x: i32,
    pub spawn_y: i32,
    pub spawn_z: i32,
    pub size_on_disk: i64,
    pub raw_extra: Compound,
}

impl LevelData {
    fn fresh(options: crate::config::CreateOptions) -> Self {
        let random_seed = options
            .random_seed
            .map(|s| s as i64)
            .unwrap_or_else(|| rand::random::<i64>());
        let last_played = options
            .last_played
            .map(|t| t as i64)
            .unwrap_or_else(now_millis);
        Self {
            random_seed,
            last_played,
            spawn_x: 0,
            spawn_y: 64,
            spawn_z: 0,
            size_on_disk: 0,
            raw_extra: Compound::new(),
        }
    }

    fn decode(mut root: Compound) -> Result<Self> {
        let Some(Value::Compound(mut data)) = root.remove("Data") else {
            return Err(Error::not_a_world("level.dat is missing the Data compound"));
        };
        let random_seed = data.remove("RandomSeed").and_then(|v| v.as_i64()).unwrap_or(0);
        let last_played = data.remove("LastPlayed").and_then(|v| v.as_i64()).unwrap_or(0);
        let spawn_x = data.remove("SpawnX").and_then(|v| v.as_i32()).unwrap_or(0);
        let spawn_y = data.remove("SpawnY").and_then(|v| v.as_i32()).unwrap_or(64);
        let spawn_z = data.remove("SpawnZ").and_then(|v| v.as_i32()).unwrap_or(0);
        let size_on_disk = data.remove("SizeOnDisk").and_then(|v| v.as_i64()).unwrap_or(0);
        data.remove("version");
        Ok(Self {
            random_seed,
            last_played,
            spawn_x,
            spawn_y,
            spawn_z,
            size_on_disk,
            raw_extra: data,
        })
    }

    fn encode(&self) -> Compound {
        let mut data = self.raw_extra.clone();
        data.insert("version", VERSION_ANVIL);
        data.insert("RandomSeed", self.random_seed);
        data.insert("LastPlayed", self.last_played);
        data.insert("SpawnX", self.spawn_x);
        data.insert("SpawnY", self.spawn_y);
        data.insert("SpawnZ", self.spawn_z);
        data.insert("SizeOnDisk", self.size_on_disk);
        compound! { "Data" => data }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn load_level_dat(path: &Path) -> Result<Compound> {
    let mut raw = Vec::new();
    fs::File::open(path)?.read_to_end(&mut raw)?;
    let mut decompressed = Vec::new();
    flate2::read::GzDecoder::new(raw.as_slice()).read_to_end(&mut decompressed)?;
    let (_, root) = anvil_nbt::from_binary(&mut decompressed.as_slice())
        .map_err(|e| Error::not_a_world(format!("level.dat is corrupt: {e}")))?
        .ok_or_else(|| Error::not_a_world("level.dat root is TAG_End"))?;
    root.as_compound()
        .cloned()
        .ok_or_else(|| Error::not_a_world("level.dat root is not a compound"))
}

fn save_level_dat(path: &Path, data: &LevelData) -> Result<()> {
    let root = data.encode();
    let mut uncompressed = Vec::new();
    anvil_nbt::to_binary(&root, &mut uncompressed, "")
        .map_err(|e| Error::not_a_world(format!("could not encode level.dat: {e}")))?;
    let mut compressed = Vec::new();
    {
        let mut enc = flate2::write::GzEncoder::new(&mut compressed, flate2::Compression::default());
        enc.write_all(&uncompressed)?;
        enc.finish()?;
    }
    let tmp = path.with_extension("dat.tmp");
    fs::write(&tmp, &compressed)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// A file-based single-writer token (spec.md §3 `SessionLock`). The original
/// `pc_metadata.PCMetadata`/`SessionLockLost` collaborator it's modeled on
/// didn't survive the source filter, so this is a minimal from-scratch
/// design: opening a world overwrites the lock file with a fresh random
/// token (a UUID, matching the identity type the original imports for its
/// player/session bookkeeping), and every later save re-reads the file to
/// confirm the token is still the one this process wrote — if another
/// opener has since stolen the lock, the token will have changed and the
/// save fails with [`Error::SessionLockLost`] rather than silently
/// clobbering the other process's writes.
#[derive(Debug)]
struct SessionLock {
    path: PathBuf,
    token: uuid::Uuid,
}

impl SessionLock {
    fn acquire(world_root: &Path) -> Result<Self> {
        let path = world_root.join("session.lock");
        let token = uuid::Uuid::new_v4();
        fs::write(&path, token.as_bytes())?;
        Ok(Self { path, token })
    }

    fn check(&self) -> Result<()> {
        let bytes = fs::read(&self.path)?;
        let current = uuid::Uuid::from_slice(&bytes)
            .map_err(|_| Error::not_a_world("corrupt session lock file"))?;
        if current != self.token {
            return Err(Error::SessionLockLost);
        }
        Ok(())
    }
}

/// One chunked world (the overworld, or one `DIM<n>` dimension).
pub struct World {
    root: PathBuf,
    config: WorldConfig,
    dimension: i32,

    folder: WorldFolder,
    scratch_folder: Option<WorldFolder>,
    /// `##MCEDIT.TEMP2##` (spec.md §6): reserved for transactional edits, out
    /// of scope for this core beyond honoring its open/wipe lifecycle.
    scratch_folder2: Option<WorldFolder>,
    cache: ChunkCache,
    materials: Box<dyn Materials>,

    level: LevelData,
    lock: Option<SessionLock>,
    saving: bool,

    dimensions: HashMap<i32, World>,
}

impl World {
    /// Opens (or, with `config.create` set, creates) a world rooted at
    /// `root`. `root/region/` holds the overworld's region files;
    /// `root/level.dat` holds world metadata.
    pub fn open(root: impl Into<PathBuf>, config: WorldConfig) -> Result<Self> {
        Self::open_dimension(root.into(), config, OVERWORLD)
    }

    fn open_dimension(root: PathBuf, config: WorldConfig, dimension: i32) -> Result<Self> {
        if config.readonly && config.create.is_some() {
            return Err(Error::not_a_world(
                "WorldConfig::create cannot be combined with WorldConfig::readonly",
            ));
        }
        fs::create_dir_all(&root)?;
        let folder = WorldFolder::open(root.join("region"))?;

        let level_path = root.join("level.dat");
        let level = match (&config.create, level_path.exists()) {
            (Some(options), _) => LevelData::fresh(*options),
            (None, true) => LevelData::decode(load_level_dat(&level_path)?)?,
            (None, false) => {
                return Err(Error::not_a_world(format!(
                    "{} has no level.dat and WorldConfig::create was not set",
                    root.display()
                )))
            }
        };
        if config.create.is_some() {
            save_level_dat(&level_path, &level)?;
        }

        // Both scratch folders are wiped on open and after a successful
        // save (spec.md §6), so a crash mid-session never leaves stale
        // evicted-chunk bytes around to be resurrected by a later sweep.
        let (scratch_folder, scratch_folder2) = if config.readonly {
            (None, None)
        } else {
            let mut temp = WorldFolder::open(root.join("##MCEDIT.TEMP##"))?;
            temp.wipe()?;
            let mut temp2 = WorldFolder::open(root.join("##MCEDIT.TEMP2##"))?;
            temp2.wipe()?;
            (Some(temp), Some(temp2))
        };

        let lock = if config.readonly {
            None
        } else {
            Some(SessionLock::acquire(&root)?)
        };

        info!(root = %root.display(), dimension, "opened world");

        Ok(Self {
            root,
            cache: ChunkCache::new(config.loaded_chunk_limit),
            materials: Box::new(VanillaMaterials),
            config,
            dimension,
            folder,
            scratch_folder,
            scratch_folder2,
            level,
            lock,
            saving: false,
            dimensions: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dimension_id(&self) -> i32 {
        self.dimension
    }

    pub fn level(&self) -> &LevelData {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut LevelData {
        &mut self.level
    }

    pub fn set_materials(&mut self, materials: impl Materials + 'static) {
        self.materials = Box::new(materials);
    }

    /// Opens (creating an empty one if needed) the dimension subfolder
    /// `DIM<id>`. `id == 0` returns this world itself.
    pub fn dimension(&mut self, id: i32) -> Result<&mut World> {
        if id == OVERWORLD {
            return Ok(self);
        }
        if !self.dimensions.contains_key(&id) {
            let sub_root = self.root.join(format!("DIM{id}"));
            let mut sub_config = self.config.clone();
            if !sub_config.readonly && !sub_root.join("level.dat").exists() {
                sub_config.create = Some(crate::config::CreateOptions::default());
            }
            let world = World::open_dimension(sub_root, sub_config, id)?;
            self.dimensions.insert(id, world);
        }
        Ok(self.dimensions.get_mut(&id).expect("just inserted"))
    }

    fn check_access(&self) -> Result<()> {
        if self.saving {
            return Err(Error::ChunkAccessDenied);
        }
        Ok(())
    }

    pub fn contains_chunk(&mut self, pos: ChunkPosition) -> bool {
        self.cache.contains(pos) || self.folder.contains_chunk(pos)
    }

    /// Returns a view over the chunk at `pos`. Per spec.md §4.H, a chunk
    /// already resident in the cache is returned even while a save is in
    /// progress; only a load that would need to touch disk is subject to
    /// [`Error::ChunkAccessDenied`].
    pub fn get_chunk(&mut self, pos: ChunkPosition) -> Result<ChunkView> {
        if let Some(view) = self.cache.peek(pos) {
            return Ok(view);
        }
        self.check_access()?;
        if !self.folder.contains_chunk(pos) {
            let in_scratch = self
                .scratch_folder
                .as_mut()
                .map(|s| s.contains_chunk(pos))
                .unwrap_or(false);
            if !in_scratch {
                return Err(Error::ChunkNotPresent(pos));
            }
        }
        self.cache.get_or_load(
            pos,
            &mut self.folder,
            self.scratch_folder.as_mut(),
            self.materials.as_ref(),
            self.config.readonly,
        )
    }

    /// Copies one chunk's raw bytes from `other` into this world's region
    /// files, bypassing decode/encode entirely (spec.md §4.C
    /// `copyChunkFrom`). Fails with [`Error::ChunkAccessDenied`] if either
    /// world is mid-save, per spec.md §4.H.
    pub fn copy_chunk_from(&mut self, other: &mut World, pos: ChunkPosition) -> Result<()> {
        self.check_access()?;
        other.check_access()?;
        if self.config.readonly {
            return Err(Error::not_a_world("world is readonly"));
        }
        self.folder.copy_chunk_from(&mut other.folder, pos)?;
        self.cache.remove(pos);
        Ok(())
    }

    /// Creates an empty chunk at `pos`. Fails if a chunk is already present,
    /// on disk or in the cache.
    pub fn create_chunk(&mut self, pos: ChunkPosition) -> Result<ChunkView> {
        self.check_access()?;
        if self.config.readonly {
            return Err(Error::not_a_world("world is readonly"));
        }
        if self.contains_chunk(pos) {
            return Err(Error::not_a_world(format!("chunk {pos} already exists")));
        }
        let payload = ChunkPayload::new(pos, DEFAULT_HEIGHT, now_millis());
        self.cache.insert_new(
            payload,
            &mut self.folder,
            self.scratch_folder.as_mut(),
            self.materials.as_ref(),
            self.config.readonly,
        )
    }

    /// Creates every missing chunk in `box_`. Returns the number created.
    pub fn create_chunks_in_box(&mut self, box_: ChunkBox) -> Result<usize> {
        let mut created = 0;
        for pos in box_.positions() {
            if self.contains_chunk(pos) {
                continue;
            }
            self.create_chunk(pos)?;
            created += 1;
        }
        Ok(created)
    }

    pub fn delete_chunk(&mut self, pos: ChunkPosition) -> Result<()> {
        self.check_access()?;
        if self.config.readonly {
            return Err(Error::not_a_world("world is readonly"));
        }
        self.cache.remove(pos);
        self.folder.delete_chunk(pos)?;
        if let Some(scratch) = self.scratch_folder.as_mut() {
            scratch.delete_chunk(pos)?;
        }
        Ok(())
    }

    /// Deletes every present chunk in `box_`. Returns the number deleted.
    pub fn delete_chunks_in_box(&mut self, box_: ChunkBox) -> Result<usize> {
        let mut deleted = 0;
        for pos in box_.positions() {
            if !self.contains_chunk(pos) {
                continue;
            }
            self.delete_chunk(pos)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    pub fn list_chunks(&mut self) -> Result<Vec<ChunkPosition>> {
        let mut positions = self.folder.list_chunks()?;
        for pos in self.cache.positions() {
            if !positions.contains(&pos) {
                positions.push(pos);
            }
        }
        Ok(positions)
    }

    pub fn chunk_count(&mut self) -> Result<usize> {
        Ok(self.list_chunks()?.len())
    }

    /// Every position currently marked `needsLighting` (spec.md §3):
    /// payloads mutated through a [`ChunkView`] since the last relight that
    /// cleared them.
    pub fn chunks_needing_lighting(&self) -> Vec<ChunkPosition> {
        self.cache.needs_lighting_positions()
    }

    /// Relights every position in `dirty` (spec.md §4.G), splitting the work
    /// into batches no larger than `loaded_chunk_limit` and reporting
    /// progress as `(done, total)` after each batch. Clears `needsLighting`
    /// on exactly the positions relit, per spec.md §4.G step 4.
    pub fn relight(
        &mut self,
        dirty: Vec<ChunkPosition>,
        on_progress: impl FnMut(usize, usize),
    ) -> Result<()> {
        self.check_access()?;
        let limit = self.config.loaded_chunk_limit;
        light::propagate(self, &dirty, DEFAULT_HEIGHT, limit, on_progress)?;
        self.cache.clear_needs_lighting(&dirty);
        Ok(())
    }

    /// Starts a resumable relight job a caller can step through one batch at
    /// a time (spec.md §9's cooperative-generator note).
    pub fn begin_relight(&self, dirty: Vec<ChunkPosition>) -> LightJob {
        LightJob::new(dirty, self.config.loaded_chunk_limit)
    }

    /// Steps a resumable relight job. Once the job's last batch completes,
    /// clears `needsLighting` on every position the job covered, per
    /// spec.md §4.G step 4.
    pub fn step_relight(&mut self, job: &mut LightJob) -> Result<(usize, usize)> {
        self.check_access()?;
        let progress = job.step(self, DEFAULT_HEIGHT)?;
        if job.is_done() {
            self.cache.clear_needs_lighting(job.original_positions());
        }
        Ok(progress)
    }

    /// Flushes every dirty payload and the scratch folder back into the
    /// world folder, then writes `level.dat`. Runs to completion; see
    /// [`Self::begin_save`] for a steppable version.
    pub fn save_in_place(&mut self) -> Result<()> {
        let mut job = self.begin_save();
        while !job.is_done() {
            self.step_save(&mut job)?;
        }
        Ok(())
    }

    pub fn begin_save(&self) -> SaveJob {
        SaveJob {
            stage: SaveStage::FlushDirty(self.cache.dirty_positions()),
        }
    }

    /// Advances a [`SaveJob`] by one stage. Mirrors
    /// `pymclevel.saveInPlaceGen`'s flush-then-sweep-then-metadata order.
    pub fn step_save(&mut self, job: &mut SaveJob) -> Result<SaveProgress> {
        if self.config.readonly {
            return Err(Error::not_a_world("world is readonly"));
        }
        if let Some(lock) = &self.lock {
            lock.check()?;
        }

        match std::mem::replace(&mut job.stage, SaveStage::Done) {
            SaveStage::FlushDirty(mut queue) => {
                self.saving = true;
                if let Some(pos) = queue.pop() {
                    self.flush_one(pos)?;
                    job.stage = SaveStage::FlushDirty(queue);
                    return Ok(SaveProgress::Flushing);
                }
                let scratch_positions = match &mut self.scratch_folder {
                    Some(scratch) => scratch.list_chunks()?,
                    None => Vec::new(),
                };
                job.stage = SaveStage::SweepScratch(scratch_positions);
                Ok(SaveProgress::Flushing)
            }
            SaveStage::SweepScratch(mut queue) => {
                if let Some(pos) = queue.pop() {
                    // Spec.md §4.H step 4 restricts the sweep to positions
                    // present in the scratch folder but not in the cache: a
                    // position still cached was (or will be) flushed fresh by
                    // `FlushDirty`, so copying its stale scratch bytes here
                    // would silently overwrite that fresher write.
                    if !self.cache.contains(pos) {
                        if let Some(scratch) = self.scratch_folder.as_mut() {
                            self.folder.copy_chunk_from(scratch, pos)?;
                        }
                    }
                    job.stage = SaveStage::SweepScratch(queue);
                    return Ok(SaveProgress::Sweeping);
                }
                if let Some(scratch) = &mut self.scratch_folder {
                    scratch.wipe()?;
                }
                if let Some(scratch2) = &mut self.scratch_folder2 {
                    scratch2.wipe()?;
                }
                job.stage = SaveStage::Metadata;
                Ok(SaveProgress::Sweeping)
            }
            SaveStage::Metadata => {
                self.level.size_on_disk = dir_size(&self.root).unwrap_or(0) as i64;
                save_level_dat(&self.root.join("level.dat"), &self.level)?;
                for dim in self.dimensions.values_mut() {
                    dim.save_in_place()?;
                }
                self.saving = false;
                job.stage = SaveStage::Done;
                debug!(root = %self.root.display(), "save in place complete");
                Ok(SaveProgress::Done)
            }
            SaveStage::Done => Ok(SaveProgress::Done),
        }
    }

    fn flush_one(&mut self, pos: ChunkPosition) -> Result<()> {
        let Some(arc) = self.cache.payload(pos) else {
            return Ok(());
        };
        let mut payload = arc.lock().expect("payload mutex poisoned");
        if !payload.dirty {
            return Ok(());
        }
        let tag = codec::encode(&mut payload, self.materials.as_ref());
        let mut bytes = Vec::new();
        anvil_nbt::to_binary(&tag, &mut bytes, "")
            .map_err(|e| Error::chunk_malformed(pos, e))?;
        self.folder.save_chunk(pos, &bytes)?;
        payload.dirty = false;
        Ok(())
    }

    /// Unloads every cached payload without saving. Scratch-folder contents
    /// (already-evicted dirty data) are preserved for a later `save_in_place`
    /// or the next session to pick up.
    pub fn unload(&mut self) {
        self.cache.clear();
        warn!(root = %self.root.display(), "unloaded world cache without saving");
    }

    /// Closes this world: drops every cached payload and every open region
    /// handle (both this world's and its loaded dimensions'), and releases
    /// the session lock file. Does not save; callers that want dirty data
    /// persisted must call [`Self::save_in_place`] first.
    ///
    /// A lock file already stolen by another opener is not an error here —
    /// spec.md §5 notes `close()` tolerates `SessionLockLost` during
    /// cleanup, since there's nothing left for this process to protect.
    pub fn close(mut self) {
        for (_, dim) in self.dimensions.drain() {
            dim.close();
        }
        self.cache.clear();
        if let Some(lock) = self.lock.take() {
            let _ = fs::remove_file(&lock.path);
        }
        debug!(root = %self.root.display(), "closed world");
    }
}

impl LightSource for World {
    fn get_chunk(&mut self, pos: ChunkPosition) -> Result<ChunkView> {
        World::get_chunk(self, pos)
    }

    fn materials(&self) -> &dyn Materials {
        self.materials.as_ref()
    }

    fn has_sky_light(&self) -> bool {
        has_sky_light(self.dimension)
    }
}

fn dir_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            total += meta.len();
        } else if meta.is_dir() {
            total += dir_size(&entry.path())?;
        }
    }
    Ok(total)
}

/// A resumable `save_in_place` (spec.md §9's cooperative-generator note).
pub struct SaveJob {
    stage: SaveStage,
}

enum SaveStage {
    FlushDirty(Vec<ChunkPosition>),
    SweepScratch(Vec<ChunkPosition>),
    Metadata,
    Done,
}

impl SaveJob {
    pub fn is_done(&self) -> bool {
        matches!(self.stage, SaveStage::Done)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveProgress {
    Flushing,
    Sweeping,
    Done,
}
