use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

/// Identifies an object in the game-object arena. Dense: ids are assigned
/// sequentially at load time and index directly into the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The arena index this id maps to.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

new_key_type! {
    /// Identifies a production table (root or nested) in the project arena.
    pub struct TableId;

    /// Identifies a recipe row within a project.
    pub struct RowId;

    /// Identifies a production link within a project.
    pub struct LinkId;
}
