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
pub mod rectangle;

/// How the index buffer of a mesh should be interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrimitiveType {
    Triangles,
}

/// A flat, indexed mesh. Positions are in abstract grid units; the consumer decides what
/// one unit means.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    positions: Vec<[f32; 2]>,
    indices: Vec<u32>,
    primitive: PrimitiveType,
}

impl Mesh {
    pub fn new(positions: Vec<[f32; 2]>, indices: Vec<u32>, primitive: PrimitiveType) -> Self {
        debug_assert!(indices.iter().all(|&i| (i as usize) < positions.len()));
        Self {
            positions,
            indices,
            primitive,
        }
    }

    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        match self.primitive {
            PrimitiveType::Triangles => self.indices.len() / 3,
        }
    }
}
