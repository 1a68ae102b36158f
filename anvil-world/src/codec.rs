//! The Anvil chunk codec (spec.md §4.D): converts between the on-disk tag
//! tree (vertical 16³ sections, nibble-packed metadata/light, an optional
//! `Add` high-nibble array) and a flat `[16, 16, height]` payload indexed
//! `[x, z, y]`.

use anvil_nbt::{compound, Compound, List, Value};

use crate::chunk::{ChunkPayload, CHUNK_WIDTH};
use crate::materials::Materials;
use crate::nibble;
use crate::position::ChunkPosition;

const SECTION_HEIGHT: usize = 16;
const CELLS_PER_SECTION: usize = CHUNK_WIDTH * CHUNK_WIDTH * SECTION_HEIGHT;

/// On-disk section order is `(Y, Z, X)`; memory order is `(X, Z, Y)`. This
/// is an explicit transpose per spec.md §9 ("do not rely on any
/// per-language array-view trickery").
fn disk_to_memory<T: Copy>(disk: &[T], y0: usize, height: usize, dest: &mut [T]) {
    for y_local in 0..SECTION_HEIGHT {
        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                let d = y_local * CHUNK_WIDTH * CHUNK_WIDTH + z * CHUNK_WIDTH + x;
                let m = (x * CHUNK_WIDTH + z) * height + (y0 + y_local);
                dest[m] = disk[d];
            }
        }
    }
}

fn memory_to_disk<T: Copy>(mem: &[T], y0: usize, height: usize, dest: &mut [T]) {
    for y_local in 0..SECTION_HEIGHT {
        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                let d = y_local * CHUNK_WIDTH * CHUNK_WIDTH + z * CHUNK_WIDTH + x;
                let m = (x * CHUNK_WIDTH + z) * height + (y0 + y_local);
                dest[d] = mem[m];
            }
        }
    }
}

fn i8_to_u8(v: Vec<i8>) -> Vec<u8> {
    v.into_iter().map(|b| b as u8).collect()
}

fn u8_to_i8(v: Vec<u8>) -> Vec<i8> {
    v.into_iter().map(|b| b as i8).collect()
}

/// Decodes a chunk tag tree (the root compound containing `Level`) into a
/// flat payload.
pub fn decode(position: ChunkPosition, mut root: Compound) -> Result<ChunkPayload, String> {
    let Some(Value::Compound(mut level)) = root.remove("Level") else {
        return Err("chunk root is missing the Level compound".to_owned());
    };

    let height = match level.remove("Height").as_ref().and_then(Value::as_i32) {
        Some(h) if h > 0 && h as usize % SECTION_HEIGHT == 0 => h as usize,
        Some(_) => return Err("chunk Height is not a positive multiple of 16".to_owned()),
        None => crate::chunk::DEFAULT_HEIGHT,
    };

    let mut payload = ChunkPayload::new(position, height, 0);
    payload.dirty = false;

    if let Some(Value::Long(t)) = level.remove("LastUpdate") {
        payload.last_update = t;
    }
    if let Some(Value::Byte(b)) = level.remove("TerrainPopulated") {
        payload.terrain_populated = b != 0;
    } else {
        payload.terrain_populated = false;
    }

    if let Some(Value::List(List::Compound(sections))) = level.remove("Sections") {
        for mut section in sections {
            let Some(y_index) = section.remove("Y").and_then(|v| v.as_i8()) else {
                return Err("chunk section is missing Y".to_owned());
            };
            let y0 = y_index as usize * SECTION_HEIGHT;
            if y0 + SECTION_HEIGHT > height {
                return Err(format!("chunk section Y={y_index} is out of bounds"));
            }

            let Some(Value::ByteArray(blocks)) = section.remove("Blocks") else {
                return Err("chunk section is missing Blocks".to_owned());
            };
            if blocks.len() != CELLS_PER_SECTION {
                return Err("chunk section Blocks has the wrong length".to_owned());
            }
            let blocks_u8 = i8_to_u8(blocks);
            let tmp: Vec<u16> = blocks_u8.iter().map(|&b| b as u16).collect();
            disk_to_memory(&tmp, y0, height, &mut payload.blocks);

            for (field, dest) in [
                ("Data", &mut payload.data),
                ("BlockLight", &mut payload.block_light),
                ("SkyLight", &mut payload.sky_light),
            ] {
                let Some(Value::ByteArray(packed)) = section.remove(field) else {
                    return Err(format!("chunk section is missing {field}"));
                };
                if packed.len() != CELLS_PER_SECTION / 2 {
                    return Err(format!("chunk section {field} has the wrong length"));
                }
                let unpacked = nibble::unpack(&i8_to_u8(packed));
                disk_to_memory(&unpacked, y0, height, dest);
            }

            if let Some(Value::ByteArray(add)) = section.remove("Add") {
                if add.len() != CELLS_PER_SECTION / 2 {
                    return Err("chunk section Add has the wrong length".to_owned());
                }
                let unpacked = nibble::unpack(&i8_to_u8(add));
                let mut add_mem = vec![0u8; CHUNK_WIDTH * CHUNK_WIDTH * height];
                disk_to_memory(&unpacked, y0, height, &mut add_mem);
                for (block, add) in payload.blocks.iter_mut().zip(&add_mem) {
                    *block |= (*add as u16) << 8;
                }
            }
        }
    }

    match level.remove("Biomes") {
        Some(Value::ByteArray(biomes)) if biomes.len() == payload.biomes.len() => {
            for (dest, b) in payload.biomes.iter_mut().zip(biomes) {
                *dest = b as u8;
            }
        }
        _ => payload.biomes = [0xFF; CHUNK_WIDTH * CHUNK_WIDTH],
    }

    if let Some(Value::IntArray(hm)) = level.remove("HeightMap") {
        if hm.len() == payload.height_map.len() {
            payload.height_map.copy_from_slice(&hm);
        }
    }

    payload.entities = take_compound_list(&mut level, "Entities");
    payload.tile_entities = take_compound_list(&mut level, "TileEntities");
    payload.tile_ticks = take_compound_list(&mut level, "TileTicks");

    level.remove("xPos");
    level.remove("zPos");
    payload.raw_extra = level;

    Ok(payload)
}

fn take_compound_list(level: &mut Compound, key: &str) -> Vec<Compound> {
    match level.remove(key) {
        Some(Value::List(List::Compound(list))) => list,
        _ => Vec::new(),
    }
}

/// Encodes a payload back into a chunk tag tree, sanitizing it first
/// (spec.md §4.D: "Before encoding, invoke sanitizer").
pub fn encode(payload: &mut ChunkPayload, materials: &dyn Materials) -> Compound {
    sanitize(payload, materials);

    let height = payload.height;
    let mut sections = Vec::new();
    let mut block_buf = vec![0u16; CELLS_PER_SECTION];
    let mut byte_buf = vec![0u8; CELLS_PER_SECTION];
    let mut light_buf = vec![0u8; CELLS_PER_SECTION];

    for y0 in (0..height).step_by(SECTION_HEIGHT) {
        memory_to_disk(&payload.blocks, y0, height, &mut block_buf);
        memory_to_disk(&payload.data, y0, height, &mut byte_buf);
        let data_disk = byte_buf.clone();
        memory_to_disk(&payload.block_light, y0, height, &mut light_buf);
        let block_light_disk = light_buf.clone();
        memory_to_disk(&payload.sky_light, y0, height, &mut light_buf);
        let sky_light_disk = light_buf.clone();

        let all_air = block_buf.iter().all(|&b| b == 0);
        let no_block_light = block_light_disk.iter().all(|&l| l == 0);
        let full_sky_light = sky_light_disk.iter().all(|&l| l == 15);
        if all_air && no_block_light && full_sky_light {
            continue;
        }

        let blocks_low: Vec<i8> = block_buf.iter().map(|&b| (b & 0xFF) as u8 as i8).collect();
        let data_packed = u8_to_i8(nibble::pack(&data_disk));
        let block_light_packed = u8_to_i8(nibble::pack(&block_light_disk));
        let sky_light_packed = u8_to_i8(nibble::pack(&sky_light_disk));

        let mut section = compound! {
            "Y" => (y0 / SECTION_HEIGHT) as i8,
            "Blocks" => blocks_low,
            "Data" => data_packed,
            "BlockLight" => block_light_packed,
            "SkyLight" => sky_light_packed,
        };

        if block_buf.iter().any(|&b| b > 0xFF) {
            let add: Vec<u8> = block_buf.iter().map(|&b| (b >> 8) as u8).collect();
            let add_packed = u8_to_i8(nibble::pack(&add));
            section.insert("Add", add_packed);
        }

        sections.push(section);
    }

    let mut level = payload.raw_extra.clone();
    level.insert("xPos", payload.position.cx);
    level.insert("zPos", payload.position.cz);
    level.insert("LastUpdate", payload.last_update);
    level.insert("TerrainPopulated", payload.terrain_populated);
    level.insert("Height", height as i32);
    level.insert(
        "Biomes",
        payload.biomes.iter().map(|&b| b as i8).collect::<Vec<i8>>(),
    );
    level.insert("HeightMap", payload.height_map.to_vec());
    level.insert("Sections", List::Compound(sections));
    level.insert("Entities", List::Compound(payload.entities.clone()));
    level.insert("TileEntities", List::Compound(payload.tile_entities.clone()));
    level.insert("TileTicks", List::Compound(payload.tile_ticks.clone()));

    compound! { "Level" => level }
}

/// Sanitizes a payload's blocks in place before it's saved (spec.md §4.D).
pub fn sanitize(payload: &mut ChunkPayload, materials: &dyn Materials) {
    let height = payload.height;
    for x in 0..CHUNK_WIDTH {
        for z in 0..CHUNK_WIDTH {
            for y in 0..height - 1 {
                let lower = payload.block_at(x, z, y);
                let upper = payload.block_at(x, z, y + 1);
                if materials.is_grass_or_dirt(lower) && materials.is_grass_or_dirt(upper) {
                    payload.set_block_at(x, z, y, materials.dirt_id());
                }
            }
            for y in (1..height).rev() {
                let lower = payload.block_at(x, z, y - 1);
                let upper = payload.block_at(x, z, y);
                if materials.is_snow_layer(lower) && materials.is_snow_layer(upper) {
                    payload.set_block_at(x, z, y, materials.air_id());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::VanillaMaterials;

    fn pos() -> ChunkPosition {
        ChunkPosition::new(0, 0)
    }

    #[test]
    fn fresh_chunk_round_trips_through_encode_decode() {
        let mut payload = ChunkPayload::new(pos(), 256, 0);
        let tag = encode(&mut payload, &VanillaMaterials);
        let decoded = decode(pos(), tag).unwrap();

        assert!(decoded.blocks.iter().all(|&b| b == 0));
        assert!(decoded.sky_light.iter().all(|&l| l == 15));
        assert!(decoded.block_light.iter().all(|&l| l == 0));
        assert!(decoded.terrain_populated);
    }

    #[test]
    fn high_block_ids_round_trip_via_add_array() {
        let mut payload = ChunkPayload::new(pos(), 256, 0);
        payload.set_block_at(1, 2, 64, 300);
        payload.set_block_at(5, 5, 70, 4095);

        let tag = encode(&mut payload, &VanillaMaterials);
        let decoded = decode(pos(), tag).unwrap();

        assert_eq!(decoded.block_at(1, 2, 64), 300);
        assert_eq!(decoded.block_at(5, 5, 70), 4095);
    }

    #[test]
    fn empty_sections_are_elided_and_resynthesized_as_defaults() {
        let mut payload = ChunkPayload::new(pos(), 256, 0);
        let tag = encode(&mut payload, &VanillaMaterials);

        let level = tag.get("Level").unwrap().as_compound().unwrap();
        let sections = level.get("Sections").unwrap().as_list().unwrap();
        assert_eq!(sections.len(), 0);

        let decoded = decode(pos(), tag).unwrap();
        assert!(decoded.sky_light.iter().all(|&l| l == 15));
    }

    #[test]
    fn sanitize_demotes_stacked_grass_and_dirt_to_dirt() {
        let mut payload = ChunkPayload::new(pos(), 256, 0);
        payload.set_block_at(0, 0, 64, VanillaMaterials::GRASS);
        payload.set_block_at(0, 0, 65, VanillaMaterials::GRASS);

        sanitize(&mut payload, &VanillaMaterials);

        assert_eq!(payload.block_at(0, 0, 64), VanillaMaterials::DIRT);
        assert_eq!(payload.block_at(0, 0, 65), VanillaMaterials::GRASS);
    }

    #[test]
    fn sanitize_clears_stacked_snow_layers() {
        let mut payload = ChunkPayload::new(pos(), 256, 0);
        payload.set_block_at(3, 3, 70, VanillaMaterials::SNOW_LAYER);
        payload.set_block_at(3, 3, 71, VanillaMaterials::SNOW_LAYER);

        sanitize(&mut payload, &VanillaMaterials);

        assert_eq!(payload.block_at(3, 3, 70), VanillaMaterials::SNOW_LAYER);
        assert_eq!(payload.block_at(3, 3, 71), VanillaMaterials::AIR);
    }
}
