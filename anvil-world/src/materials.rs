//! The materials table collaborator (spec.md §1: "the materials table
//! (assumed queryable)"). `anvil-world` only needs enough of it to drive the
//! light engine and the section-4.D sanitizer, so this module defines a
//! small trait rather than pulling in a full block registry.

/// Per-block-ID light and sanitizer properties, queried by [`crate::light`]
/// and [`crate::codec::sanitize`].
pub trait Materials {
    /// Light emitted by a block, `0..=15`.
    fn light_emission(&self, block: u16) -> u8;

    /// Light absorbed passing through a block. Callers clamp this to
    /// `1..=15` themselves (an unclamped `0` would let light pass forever).
    fn light_absorption(&self, block: u16) -> u8;

    fn is_grass_or_dirt(&self, block: u16) -> bool;
    fn is_snow_layer(&self, block: u16) -> bool;

    fn air_id(&self) -> u16;
    fn dirt_id(&self) -> u16;
}

/// The handful of pre-flattening block IDs needed to exercise the sanitizer
/// and light engine without a full block registry (out of scope per
/// spec.md §1).
#[derive(Clone, Copy, Debug, Default)]
pub struct VanillaMaterials;

impl VanillaMaterials {
    pub const AIR: u16 = 0;
    pub const GRASS: u16 = 2;
    pub const DIRT: u16 = 3;
    pub const SNOW_LAYER: u16 = 78;
}

impl Materials for VanillaMaterials {
    fn light_emission(&self, block: u16) -> u8 {
        match block {
            // Glowstone / jack o'lantern / lit furnace / torch / lava, roughly.
            89 | 91 | 61 => 13,
            50 => 14,
            10 | 11 => 15,
            _ => 0,
        }
    }

    fn light_absorption(&self, block: u16) -> u8 {
        match block {
            Self::AIR => 0,
            // Glass, torches, flowers, saplings, etc. are thin.
            20 | 50 | 37 | 38 | 6 => 0,
            // Water and ice dim but don't fully block light.
            8 | 9 | 79 => 2,
            // Leaves are semi-opaque in the legacy lighting model.
            18 => 1,
            _ => 15,
        }
    }

    fn is_grass_or_dirt(&self, block: u16) -> bool {
        block == Self::GRASS || block == Self::DIRT
    }

    fn is_snow_layer(&self, block: u16) -> bool {
        block == Self::SNOW_LAYER
    }

    fn air_id(&self) -> u16 {
        Self::AIR
    }

    fn dirt_id(&self) -> u16 {
        Self::DIRT
    }
}
