/// A chunk's position in chunk coordinates (16-block units).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChunkPosition {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkPosition {
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// The region this chunk lives in, per `(cx >> 5, cz >> 5)`.
    pub fn region(self) -> (i32, i32) {
        (self.cx >> 5, self.cz >> 5)
    }

    /// This chunk's slot index within its region, `0..1024`.
    pub fn region_local_index(self) -> usize {
        ((self.cx & 31) + 32 * (self.cz & 31)) as usize
    }
}

impl From<(i32, i32)> for ChunkPosition {
    fn from((cx, cz): (i32, i32)) -> Self {
        Self::new(cx, cz)
    }
}

impl std::fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.cx, self.cz)
    }
}

/// An axis-aligned rectangle of chunk positions, `[min, max)` on both axes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChunkBox {
    pub min_cx: i32,
    pub min_cz: i32,
    pub max_cx: i32,
    pub max_cz: i32,
}

impl ChunkBox {
    pub const fn new(min_cx: i32, min_cz: i32, max_cx: i32, max_cz: i32) -> Self {
        Self {
            min_cx,
            min_cz,
            max_cx,
            max_cz,
        }
    }

    pub fn positions(self) -> impl Iterator<Item = ChunkPosition> {
        (self.min_cx..self.max_cx)
            .flat_map(move |cx| (self.min_cz..self.max_cz).map(move |cz| ChunkPosition::new(cx, cz)))
    }
}
