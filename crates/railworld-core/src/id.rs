use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a world node in the registry arena.
    pub struct NodeId;

    /// Identifies an event in the event registry.
    pub struct EventId;

    /// Identifies an isolated (axle-counting) section.
    pub struct IsolatedId;
}

/// Identifies a texture. Zero means "untextured"; geometry with texture zero
/// never participates in mesh merging or terrain export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u32);

impl TextureId {
    pub const NONE: TextureId = TextureId(0);

    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

/// Column/row address of a sector in the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorCoord {
    pub col: i32,
    pub row: i32,
}

impl SectorCoord {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}
