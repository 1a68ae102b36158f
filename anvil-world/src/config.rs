/// Construction-time configuration for [`crate::World::open`].
#[derive(Clone, Debug)]
pub struct WorldConfig {
    /// Upper bound on the number of decoded chunk payloads the cache keeps
    /// strongly referenced at once. Also the batch size the light engine
    /// splits its work into.
    pub loaded_chunk_limit: usize,

    /// When true, all mutating paths fail with [`crate::Error::Io`], the
    /// session lock is not acquired, and scratch folders are not created.
    pub readonly: bool,

    /// Set to create a new world at `open` time rather than opening an
    /// existing one. Mutually exclusive with `readonly`.
    pub create: Option<CreateOptions>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            loaded_chunk_limit: 400,
            readonly: false,
            create: None,
        }
    }
}

/// Options used only when [`WorldConfig::create`] is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct CreateOptions {
    /// Random if `None`.
    pub random_seed: Option<u64>,
    /// Milliseconds since epoch; current time if `None`.
    pub last_played: Option<u64>,
}
