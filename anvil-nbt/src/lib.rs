//! A typed Named Binary Tag (NBT) tree and binary codec.
//!
//! This is the tag-tree representation `anvil-world` uses for chunk, region,
//! and `level.dat` payloads. Decoding never discards information: any
//! compound entry this crate's callers do not interpret round-trips through
//! [`Compound`] unchanged, since [`Value`] and [`List`] model every NBT tag
//! kind as an explicit variant rather than through name-keyed dynamic lookup.

pub use binary::{from_binary, to_binary};
pub use compound::Compound;
pub use list::List;
pub use tag::Tag;
pub use value::Value;

pub mod binary;
pub mod compound;
pub mod error;
pub mod list;
mod tag;
pub mod value;

pub use error::Error;
