// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildIndex {
    SouthWest,
    SouthEast,
    NorthWest,
    NorthEast,
}

impl ChildIndex {
    pub fn all() -> [ChildIndex; 4] {
        [
            Self::SouthWest,
            Self::SouthEast,
            Self::NorthWest,
            Self::NorthEast,
        ]
    }

    pub fn to_index(&self) -> usize {
        match self {
            Self::SouthWest => 0, // 00
            Self::SouthEast => 1, // 01
            Self::NorthWest => 2, // 10
            Self::NorthEast => 3, // 11
        }
    }

    fn offset(&self) -> (i32, i32) {
        match self {
            Self::SouthWest => (0, 0),
            Self::SouthEast => (1, 0),
            Self::NorthWest => (0, 1),
            Self::NorthEast => (1, 1),
        }
    }
}

/// Names one tile: its level in the pyramid and its column and row within that level.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RasterTileIdentifier {
    pub level: usize,
    pub x: i32,
    pub y: i32,
}

impl RasterTileIdentifier {
    pub fn new(level: usize, x: i32, y: i32) -> Self {
        Self { level, x, y }
    }

    /// The quadrant of this tile one level finer, assuming the finer level has twice the
    /// posts per degree and the same posts per tile.
    pub fn child(&self, index: ChildIndex) -> Self {
        let (dx, dy) = index.offset();
        Self::new(self.level + 1, self.x * 2 + dx, self.y * 2 + dy)
    }

    pub fn children(&self) -> [Self; 4] {
        ChildIndex::all().map(|index| self.child(index))
    }
}

impl fmt::Display for RasterTileIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.y, self.x)
    }
}
