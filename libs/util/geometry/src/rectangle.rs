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
// Regular grids of posts, tessellated into triangles.
use crate::{Mesh, PrimitiveType};
use anyhow::{ensure, Result};

/// Tessellate a `width` x `height` grid of posts with its south-west post at the origin and
/// one unit between posts. Triangles wind counter-clockwise seen from +Z.
pub fn tessellate(width: u32, height: u32) -> Result<Mesh> {
    ensure!(
        width >= 2 && height >= 2,
        "a rectangle needs at least 2x2 posts, got {width}x{height}"
    );
    let mut positions = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            positions.push([x as f32, y as f32]);
        }
    }

    let mut indices = Vec::with_capacity(((width - 1) * (height - 1) * 6) as usize);
    for y in 0..height - 1 {
        let row = y * width;
        let next_row = row + width;
        for x in 0..width - 1 {
            // lower-left triangle, then upper-right
            indices.extend_from_slice(&[row + x, row + x + 1, next_row + x + 1]);
            indices.extend_from_slice(&[row + x, next_row + x + 1, next_row + x]);
        }
    }

    Ok(Mesh::new(positions, indices, PrimitiveType::Triangles))
}

#[cfg(test)]
mod test {
    use super::*;

    fn signed_area(mesh: &Mesh, tri: &[u32]) -> f32 {
        let a = mesh.positions()[tri[0] as usize];
        let b = mesh.positions()[tri[1] as usize];
        let c = mesh.positions()[tri[2] as usize];
        ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])) / 2.
    }

    #[test]
    fn test_rectangle_counts() -> Result<()> {
        let mesh = tessellate(4, 3)?;
        assert_eq!(mesh.vertex_count(), 12);
        assert_eq!(mesh.triangle_count(), 2 * 3 * 2);
        assert_eq!(mesh.positions()[11], [3., 2.]);
        Ok(())
    }

    #[test]
    fn test_rectangle_winding_and_area() -> Result<()> {
        let mesh = tessellate(5, 5)?;
        let mut total = 0.;
        for tri in mesh.indices().chunks(3) {
            let area = signed_area(&mesh, tri);
            assert!(area > 0.);
            total += area;
        }
        assert_eq!(total, 16.);
        Ok(())
    }

    #[test]
    fn test_reject_degenerate() {
        assert!(tessellate(1, 4).is_err());
        assert!(tessellate(4, 0).is_err());
    }
}
