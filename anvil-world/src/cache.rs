//! The chunk cache and lifetime manager (spec.md §4.F).
//!
//! Per spec.md §9's design note, this is built on an `Arc`-refcounted
//! handle rather than a strong map plus a parallel weak map: every live
//! [`ChunkView`] holds a clone of the same `Arc` this cache stores, so
//! `Arc::strong_count(..) == 1` on the map's copy is exactly "no external
//! caller holds a view of this chunk" — the condition the spec's `viewMap`
//! existed to detect. This sidesteps the need for a weak-ref map or a
//! recency deque (the spec's open question allows omitting the deque under
//! such a scheme).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::chunk::{ChunkPayload, ChunkView};
use crate::codec;
use crate::error::{Error, Result};
use crate::folder::WorldFolder;
use crate::materials::Materials;
use crate::position::ChunkPosition;

#[derive(Debug)]
pub struct ChunkCache {
    limit: usize,
    payloads: HashMap<ChunkPosition, Arc<Mutex<ChunkPayload>>>,
    /// The world-level `needsLighting` set (spec.md §3), keyed by position.
    /// Shared with every [`ChunkView`] this cache hands out so a mutation
    /// through the view can mark its position without reaching back through
    /// the world facade.
    needs_lighting: Arc<Mutex<HashSet<ChunkPosition>>>,
}

impl ChunkCache {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            payloads: HashMap::new(),
            needs_lighting: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn view_of(&self, payload: Arc<Mutex<ChunkPayload>>) -> ChunkView {
        ChunkView::new(payload, self.needs_lighting.clone())
    }

    /// Every position currently marked `needsLighting`, per spec.md §3/§4.G.
    pub fn needs_lighting_positions(&self) -> Vec<ChunkPosition> {
        self.needs_lighting
            .lock()
            .expect("needs-lighting set mutex poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Clears `needsLighting` for exactly `positions`, per spec.md §4.G step
    /// 4 ("After the last pass, clear needsLighting on the originally dirty
    /// chunks").
    pub fn clear_needs_lighting(&self, positions: &[ChunkPosition]) {
        let mut set = self
            .needs_lighting
            .lock()
            .expect("needs-lighting set mutex poisoned");
        for pos in positions {
            set.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn contains(&self, pos: ChunkPosition) -> bool {
        self.payloads.contains_key(&pos)
    }

    /// Returns a view over an already-resident payload, or `None` if it
    /// would need to be loaded.
    pub fn peek(&self, pos: ChunkPosition) -> Option<ChunkView> {
        self.payloads.get(&pos).cloned().map(|p| self.view_of(p))
    }

    /// Inserts a freshly created payload (spec.md §4.H `createChunk`),
    /// evicting first if the cache is already at its limit.
    pub fn insert_new(
        &mut self,
        payload: ChunkPayload,
        world_folder: &mut WorldFolder,
        scratch_folder: Option<&mut WorldFolder>,
        materials: &dyn Materials,
        readonly: bool,
    ) -> Result<ChunkView> {
        self.make_room(world_folder, scratch_folder, materials, readonly)?;
        let pos = payload.position;
        let arc = Arc::new(Mutex::new(payload));
        self.payloads.insert(pos, arc.clone());
        Ok(self.view_of(arc))
    }

    /// Implements spec.md §4.F `getOrLoadPayload` + the view wrap from
    /// `getChunk`: resident payloads are returned directly; otherwise bytes
    /// are loaded preferring `scratch_folder` over `world_folder`, decoded,
    /// and inserted (evicting room first if necessary).
    pub fn get_or_load(
        &mut self,
        pos: ChunkPosition,
        world_folder: &mut WorldFolder,
        mut scratch_folder: Option<&mut WorldFolder>,
        materials: &dyn Materials,
        readonly: bool,
    ) -> Result<ChunkView> {
        if let Some(view) = self.peek(pos) {
            return Ok(view);
        }

        self.make_room(world_folder, scratch_folder.as_deref_mut(), materials, readonly)?;

        let (bytes, from_scratch) = match scratch_folder.as_deref_mut() {
            Some(scratch) if scratch.contains_chunk(pos) => (scratch.read_chunk(pos)?, true),
            _ => (world_folder.read_chunk(pos)?, false),
        };

        let (_, root) = anvil_nbt::from_binary(&mut bytes.as_slice())
            .map_err(|e| Error::chunk_malformed(pos, e))?
            .ok_or_else(|| Error::chunk_malformed(pos, "chunk NBT root is TAG_End"))?;
        let root = root
            .as_compound()
            .cloned()
            .ok_or_else(|| Error::chunk_malformed(pos, "chunk root is not a compound"))?;

        let mut payload = codec::decode(pos, root).map_err(|e| Error::chunk_malformed(pos, e))?;
        if from_scratch {
            payload.dirty = true;
        }

        let arc = Arc::new(Mutex::new(payload));
        self.payloads.insert(pos, arc.clone());
        Ok(self.view_of(arc))
    }

    fn make_room(
        &mut self,
        world_folder: &mut WorldFolder,
        scratch_folder: Option<&mut WorldFolder>,
        materials: &dyn Materials,
        readonly: bool,
    ) -> Result<()> {
        if self.payloads.len() < self.limit {
            return Ok(());
        }

        let victim = self
            .payloads
            .iter()
            .find(|(_, arc)| Arc::strong_count(arc) == 1)
            .map(|(pos, _)| *pos);

        let Some(pos) = victim else {
            // Every resident payload is pinned by a live view; the cache is
            // transiently over budget until one is released.
            return Ok(());
        };

        let arc = self.payloads.remove(&pos).expect("victim was just found in the map");
        let mut payload = arc.lock().expect("payload mutex poisoned");

        if payload.dirty && !readonly {
            if let Some(scratch) = scratch_folder {
                let tag = codec::encode(&mut payload, materials);
                let mut bytes = Vec::new();
                anvil_nbt::to_binary(&tag, &mut bytes, "")
                    .map_err(|e| Error::chunk_malformed(pos, e))?;
                scratch.save_chunk(pos, &bytes)?;
                debug!(?pos, "evicted dirty chunk to scratch folder");
            }
        } else {
            trace!(?pos, "evicted clean chunk");
        }

        Ok(())
    }

    /// Positions of every payload currently marked dirty.
    pub fn dirty_positions(&self) -> Vec<ChunkPosition> {
        self.payloads
            .iter()
            .filter(|(_, arc)| arc.lock().expect("payload mutex poisoned").dirty)
            .map(|(pos, _)| *pos)
            .collect()
    }

    pub fn payload(&self, pos: ChunkPosition) -> Option<Arc<Mutex<ChunkPayload>>> {
        self.payloads.get(&pos).cloned()
    }

    pub fn remove(&mut self, pos: ChunkPosition) {
        self.payloads.remove(&pos);
        self.clear_needs_lighting(&[pos]);
    }

    pub fn clear(&mut self) {
        self.payloads.clear();
        self.needs_lighting
            .lock()
            .expect("needs-lighting set mutex poisoned")
            .clear();
    }

    pub fn positions(&self) -> impl Iterator<Item = ChunkPosition> + '_ {
        self.payloads.keys().copied()
    }
}
