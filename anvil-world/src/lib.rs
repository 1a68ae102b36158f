//! A chunked world cache, Anvil chunk codec, and light propagation engine
//! for Minecraft's legacy (pre-flattening) region-file save format.
//!
//! The pieces compose roughly bottom-up:
//!
//! - [`nibble`] packs/unpacks the 4-bit metadata and light arrays.
//! - [`region`] is the raw `.mca` sector container.
//! - [`folder`] maps chunk positions onto region files.
//! - [`codec`] converts between the on-disk tag tree and a flat
//!   [`chunk::ChunkPayload`].
//! - [`cache`] keeps a bounded set of payloads resident, handing out
//!   refcounted [`chunk::ChunkView`]s.
//! - [`light`] relights a set of dirty chunks.
//! - [`world::World`] is the facade tying all of the above together.

pub mod cache;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod error;
pub mod folder;
pub mod light;
pub mod materials;
pub mod nibble;
pub mod position;
pub mod region;
pub mod world;

pub use chunk::{ChunkPayload, ChunkView};
pub use config::{CreateOptions, WorldConfig};
pub use error::{Error, Result};
pub use light::LightJob;
pub use materials::{Materials, VanillaMaterials};
pub use position::{ChunkBox, ChunkPosition};
pub use world::{LevelData, SaveJob, SaveProgress, World};
