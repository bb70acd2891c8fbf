//! Block positions used to locate storage around a requester.

use serde::{Deserialize, Serialize};

/// Integer block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate
    pub x: i32,
    /// Y coordinate (vertical)
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns this position shifted by the given offsets.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Checks whether `other` lies inside the storage search box around `self`.
    ///
    /// The box spans `radius` blocks horizontally, one block below and two
    /// blocks above, which covers chests on the floor and shelves at head height.
    #[must_use]
    pub const fn within_search_box(self, other: Self, radius: i32) -> bool {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        dx >= -radius && dx <= radius && dz >= -radius && dz <= radius && dy >= -1 && dy <= 2
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_box_vertical_bounds() {
        let origin = BlockPos::new(10, 64, 10);
        assert!(origin.within_search_box(origin.offset(3, -1, -3), 3));
        assert!(origin.within_search_box(origin.offset(0, 2, 0), 3));
        assert!(!origin.within_search_box(origin.offset(0, 3, 0), 3));
        assert!(!origin.within_search_box(origin.offset(0, -2, 0), 3));
        assert!(!origin.within_search_box(origin.offset(4, 0, 0), 3));
    }
}
