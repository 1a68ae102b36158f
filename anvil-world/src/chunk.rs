//! The decoded chunk payload (spec.md §3 `ChunkPayload`) and the handle
//! callers use to read and mutate it (spec.md §4.E `ChunkView`).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anvil_nbt::Compound;

use crate::position::ChunkPosition;

pub const CHUNK_WIDTH: usize = 16;
pub const DEFAULT_HEIGHT: usize = 256;

/// Flat index into a `[16, 16, height]` array indexed `[x, z, y]`, per
/// spec.md §3. `x` is the slowest-varying axis.
#[inline]
pub fn index(x: usize, z: usize, y: usize, height: usize) -> usize {
    debug_assert!(x < CHUNK_WIDTH && z < CHUNK_WIDTH && y < height);
    (x * CHUNK_WIDTH + z) * height + y
}

/// The decoded, owned representation of one chunk's blocks, light, and
/// bookkeeping metadata. Exclusively owned by the cache (spec.md §3
/// "Ownership"); [`ChunkView`] shares it through an `Arc`.
#[derive(Clone, Debug)]
pub struct ChunkPayload {
    pub position: ChunkPosition,
    pub height: usize,

    /// `0..=0xFFF`; cells above `0xFF` require the `Add` array to round-trip.
    pub blocks: Vec<u16>,
    /// Low nibble significant.
    pub data: Vec<u8>,
    pub block_light: Vec<u8>,
    pub sky_light: Vec<u8>,

    /// `[16, 16]`, indexed `z * 16 + x`, defaulting to `0xFF` when absent
    /// from the source tag tree (spec.md §4.D).
    pub biomes: [u8; CHUNK_WIDTH * CHUNK_WIDTH],

    /// `[16, 16]`, indexed `z * 16 + x` per the original's "HeightMap
    /// indices are backwards" comment (spec.md §9); preserved here so
    /// heightmaps stay byte-compatible with worlds the original tool wrote.
    pub height_map: [i32; CHUNK_WIDTH * CHUNK_WIDTH],

    pub terrain_populated: bool,
    pub last_update: i64,

    /// Carried for bookkeeping only; spec.md §1 places entity/tile-entity
    /// semantics out of scope.
    pub entities: Vec<Compound>,
    pub tile_entities: Vec<Compound>,
    pub tile_ticks: Vec<Compound>,

    /// Unknown `Level`-compound fields, preserved opaquely for round-trip
    /// (spec.md §9 "Dynamic attribute access → explicit variants").
    pub raw_extra: Compound,

    pub dirty: bool,
}

impl ChunkPayload {
    /// A freshly created chunk: default light, all-air blocks, no sections
    /// on disk until first saved. Matches spec.md §8's "create new" law.
    pub fn new(position: ChunkPosition, height: usize, last_update: i64) -> Self {
        let cells = CHUNK_WIDTH * CHUNK_WIDTH * height;
        Self {
            position,
            height,
            blocks: vec![0; cells],
            data: vec![0; cells],
            block_light: vec![0; cells],
            sky_light: vec![15; cells],
            biomes: [0xFF; CHUNK_WIDTH * CHUNK_WIDTH],
            height_map: [0; CHUNK_WIDTH * CHUNK_WIDTH],
            terrain_populated: true,
            last_update,
            entities: Vec::new(),
            tile_entities: Vec::new(),
            tile_ticks: Vec::new(),
            raw_extra: Compound::new(),
            dirty: true,
        }
    }

    #[inline]
    fn idx(&self, x: usize, z: usize, y: usize) -> usize {
        index(x, z, y, self.height)
    }

    pub fn block_at(&self, x: usize, z: usize, y: usize) -> u16 {
        self.blocks[self.idx(x, z, y)]
    }

    pub fn set_block_at(&mut self, x: usize, z: usize, y: usize, id: u16) {
        let i = self.idx(x, z, y);
        self.blocks[i] = id;
    }

    pub fn data_at(&self, x: usize, z: usize, y: usize) -> u8 {
        self.data[self.idx(x, z, y)]
    }

    pub fn set_data_at(&mut self, x: usize, z: usize, y: usize, value: u8) {
        let i = self.idx(x, z, y);
        self.data[i] = value & 0x0F;
    }

    pub fn block_light_at(&self, x: usize, z: usize, y: usize) -> u8 {
        self.block_light[self.idx(x, z, y)]
    }

    pub fn set_block_light_at(&mut self, x: usize, z: usize, y: usize, value: u8) {
        let i = self.idx(x, z, y);
        self.block_light[i] = value;
    }

    pub fn sky_light_at(&self, x: usize, z: usize, y: usize) -> u8 {
        self.sky_light[self.idx(x, z, y)]
    }

    pub fn set_sky_light_at(&mut self, x: usize, z: usize, y: usize, value: u8) {
        let i = self.idx(x, z, y);
        self.sky_light[i] = value;
    }

    /// `heightMap[z][x]`, matching the original's backwards index (spec.md
    /// §9 Open Questions).
    pub fn height_map_at(&self, x: usize, z: usize) -> i32 {
        self.height_map[z * CHUNK_WIDTH + x]
    }

    pub fn set_height_map_at(&mut self, x: usize, z: usize, value: i32) {
        self.height_map[z * CHUNK_WIDTH + x] = value;
    }

    pub fn biome_at(&self, x: usize, z: usize) -> u8 {
        self.biomes[z * CHUNK_WIDTH + x]
    }

    pub fn set_biome_at(&mut self, x: usize, z: usize, value: u8) {
        self.biomes[z * CHUNK_WIDTH + x] = value;
    }
}

/// A shared handle onto a cached [`ChunkPayload`] (spec.md §4.E).
///
/// Multiple views for the same position resolve to the same payload; the
/// `Arc` strong count is the refcount the cache consults before evicting
/// (spec.md §9: "a handle type that increments a refcount on the payload
/// when constructed and decrements on drop; the cache consults the refcount
/// before evicting" — no weak-ref map is needed with this scheme).
#[derive(Clone, Debug)]
pub struct ChunkView {
    payload: Arc<Mutex<ChunkPayload>>,
    /// The world-level `needsLighting` set (spec.md §3), shared with the
    /// cache that produced this view so [`Self::mutate`] can mark a position
    /// dirty-for-lighting without the view owning a handle back to the
    /// world facade itself.
    needs_lighting: Arc<Mutex<HashSet<ChunkPosition>>>,
}

impl ChunkView {
    pub(crate) fn new(
        payload: Arc<Mutex<ChunkPayload>>,
        needs_lighting: Arc<Mutex<HashSet<ChunkPosition>>>,
    ) -> Self {
        Self {
            payload,
            needs_lighting,
        }
    }

    pub(crate) fn handle(&self) -> Arc<Mutex<ChunkPayload>> {
        self.payload.clone()
    }

    pub fn position(&self) -> ChunkPosition {
        self.payload.lock().unwrap().position
    }

    pub fn read(&self) -> MutexGuard<'_, ChunkPayload> {
        self.payload.lock().unwrap()
    }

    /// Marks the payload dirty and due for relighting, and returns a mutable
    /// guard. Every mutation through a view goes through here, per spec.md
    /// §5 ("payload mutation is permitted only through a view") and §3
    /// ("marks dirty/needs-lighting").
    pub fn mutate(&self) -> MutexGuard<'_, ChunkPayload> {
        let mut guard = self.payload.lock().unwrap();
        guard.dirty = true;
        self.needs_lighting
            .lock()
            .expect("needs-lighting set mutex poisoned")
            .insert(guard.position);
        guard
    }
}
