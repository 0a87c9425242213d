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
// The fixed set of meshes a clip level is drawn with, and where each one goes.
//
// With M = fill_patch_posts and F = M - 1, a level's window of 4F + 3 posts is covered by:
//
//   * 12 MxM field blocks around the outside of the ring;
//   * 4 ring fix-ups, 3 posts wide, closing the gaps in the middle of each side;
//   * 2 runs of degenerate triangles along the outer edges, hiding the T-junctions against
//     the next coarser level;
//   * the interior, which is either a full center patch, on the finest level drawn, or two
//     offset strips, 2 posts wide, covering what the finer level inside does not.
use crate::config::ClipmapConfig;
use anyhow::Result;
use fxhash::FxHashMap;
use geometry::{rectangle, Mesh, PrimitiveType};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PatchKind {
    FieldBlock,
    RingFixupHorizontal,
    RingFixupVertical,
    OffsetStripHorizontal,
    OffsetStripVertical,
    DegenerateTrianglesHorizontal,
    DegenerateTrianglesVertical,
    Center,
}

/// One draw of a patch mesh, offset in posts from the south-west corner of the level.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PatchPlacement {
    pub kind: PatchKind,
    pub origin: [i32; 2],
}

impl PatchPlacement {
    fn new(kind: PatchKind, x: i32, y: i32) -> Self {
        Self {
            kind,
            origin: [x, y],
        }
    }
}

// Degenerate triangles (i, i+1, i+2), for even i, along a straight run of posts.
fn degenerate_run(positions: &mut Vec<[f32; 2]>, indices: &mut Vec<u32>, run: &[[f32; 2]]) {
    let base = positions.len() as u32;
    positions.extend_from_slice(run);
    let mut i = 0;
    while i + 2 < run.len() as u32 {
        indices.extend_from_slice(&[base + i, base + i + 1, base + i + 2]);
        i += 2;
    }
}

fn degenerate_triangles(segments: i32, horizontal: bool) -> Mesh {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for edge in [0, segments] {
        let run = (0..=segments)
            .map(|i| {
                if horizontal {
                    [i as f32, edge as f32]
                } else {
                    [edge as f32, i as f32]
                }
            })
            .collect::<Vec<_>>();
        degenerate_run(&mut positions, &mut indices, &run);
    }
    Mesh::new(positions, indices, PrimitiveType::Triangles)
}

pub struct PatchMeshes {
    meshes: FxHashMap<PatchKind, Mesh>,
    fill_patch_posts: i32,
    clipmap_segments: i32,
}

impl PatchMeshes {
    pub fn new(config: &ClipmapConfig) -> Result<Self> {
        let m = config.fill_patch_posts() as u32;
        let segments = config.clipmap_segments();
        let mut meshes = FxHashMap::default();
        meshes.insert(PatchKind::FieldBlock, rectangle::tessellate(m, m)?);
        meshes.insert(PatchKind::RingFixupHorizontal, rectangle::tessellate(3, m)?);
        meshes.insert(PatchKind::RingFixupVertical, rectangle::tessellate(m, 3)?);
        meshes.insert(
            PatchKind::OffsetStripHorizontal,
            rectangle::tessellate(2 * m + 1, 2)?,
        );
        meshes.insert(PatchKind::OffsetStripVertical, rectangle::tessellate(2, 2 * m)?);
        meshes.insert(
            PatchKind::DegenerateTrianglesHorizontal,
            degenerate_triangles(segments, true),
        );
        meshes.insert(
            PatchKind::DegenerateTrianglesVertical,
            degenerate_triangles(segments, false),
        );
        meshes.insert(PatchKind::Center, rectangle::tessellate(2 * m + 1, 2 * m + 1)?);
        Ok(Self {
            meshes,
            fill_patch_posts: m as i32,
            clipmap_segments: segments,
        })
    }

    pub fn mesh(&self, kind: PatchKind) -> &Mesh {
        &self.meshes[&kind]
    }

    /// Every patch drawn for one level, in draw order.
    pub fn layout(
        &self,
        fill_ring: bool,
        offset_strip_on_east: bool,
        offset_strip_on_north: bool,
    ) -> Vec<PatchPlacement> {
        use PatchKind::*;
        let m = self.fill_patch_posts;
        let f = m - 1;
        let s = self.clipmap_segments;

        let mut patches = Vec::with_capacity(20);
        for &(x, y) in &[
            // south row
            (0, 0),
            (f, 0),
            (s - 2 * f, 0),
            (s - f, 0),
            // west and east columns
            (0, f),
            (s - f, f),
            (0, s - 2 * f),
            (s - f, s - 2 * f),
            // north row
            (0, s - f),
            (f, s - f),
            (s - 2 * f, s - f),
            (s - f, s - f),
        ] {
            patches.push(PatchPlacement::new(FieldBlock, x, y));
        }
        patches.push(PatchPlacement::new(RingFixupHorizontal, 2 * f, 0));
        patches.push(PatchPlacement::new(RingFixupHorizontal, 2 * f, s - f));
        patches.push(PatchPlacement::new(RingFixupVertical, 0, 2 * f));
        patches.push(PatchPlacement::new(RingFixupVertical, s - f, 2 * f));
        patches.push(PatchPlacement::new(DegenerateTrianglesHorizontal, 0, 0));
        patches.push(PatchPlacement::new(DegenerateTrianglesVertical, 0, 0));

        if fill_ring {
            patches.push(PatchPlacement::new(Center, f, f));
        } else {
            let strip_y = if offset_strip_on_north { s - f - 1 } else { f };
            patches.push(PatchPlacement::new(OffsetStripHorizontal, f, strip_y));
            let strip_x = if offset_strip_on_east { s - f - 1 } else { f };
            let strip_y = if offset_strip_on_north { f } else { f + 1 };
            patches.push(PatchPlacement::new(OffsetStripVertical, strip_x, strip_y));
        }
        patches
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DetailLevel;
    use fxhash::FxHashSet;

    fn meshes() -> Result<PatchMeshes> {
        PatchMeshes::new(&ClipmapConfig::for_level(DetailLevel::Low).with_clipmap_posts(31))
    }

    // Every quad (by south-west post) a placement covers.
    fn covered_quads(meshes: &PatchMeshes, placement: &PatchPlacement) -> Vec<(i32, i32)> {
        let mesh = meshes.mesh(placement.kind);
        let mut quads = FxHashSet::default();
        for tri in mesh.indices().chunks(3) {
            let xs = tri.iter().map(|&i| mesh.positions()[i as usize][0] as i32);
            let ys = tri.iter().map(|&i| mesh.positions()[i as usize][1] as i32);
            let x = xs.min().unwrap_or_default();
            let y = ys.min().unwrap_or_default();
            quads.insert((placement.origin[0] + x, placement.origin[1] + y));
        }
        quads.into_iter().collect()
    }

    fn coverage(meshes: &PatchMeshes, layout: &[PatchPlacement]) -> FxHashMap<(i32, i32), usize> {
        let mut seen = FxHashMap::default();
        for placement in layout {
            if matches!(
                placement.kind,
                PatchKind::DegenerateTrianglesHorizontal | PatchKind::DegenerateTrianglesVertical
            ) {
                continue;
            }
            for quad in covered_quads(meshes, placement) {
                *seen.entry(quad).or_insert(0) += 1;
            }
        }
        seen
    }

    #[test]
    fn test_draw_counts() -> Result<()> {
        let meshes = meshes()?;
        assert_eq!(meshes.layout(true, false, false).len(), 19);
        assert_eq!(meshes.layout(false, true, true).len(), 20);
        Ok(())
    }

    #[test]
    fn test_filled_level_covers_every_quad_once() -> Result<()> {
        let meshes = meshes()?;
        let seen = coverage(&meshes, &meshes.layout(true, false, false));
        // 31 posts: 30x30 quads.
        assert_eq!(seen.len(), 900);
        assert!(seen.values().all(|&n| n == 1));
        Ok(())
    }

    #[test]
    fn test_ring_leaves_room_for_finer_level() -> Result<()> {
        let meshes = meshes()?;
        let f = 7;
        for (east, north) in [(false, false), (true, false), (false, true), (true, true)] {
            let seen = coverage(&meshes, &meshes.layout(false, east, north));
            assert!(seen.values().all(|&n| n == 1));
            // The finer level covers a 15x15 quad square inside the ring.
            let hole_x = if east { f } else { f + 1 };
            let hole_y = if north { f } else { f + 1 };
            for y in hole_y..hole_y + 15 {
                for x in hole_x..hole_x + 15 {
                    assert!(!seen.contains_key(&(x, y)), "{x},{y} {east} {north}");
                }
            }
            assert_eq!(seen.len(), 900 - 225);
        }
        Ok(())
    }

    #[test]
    fn test_degenerate_triangles_are_flat() -> Result<()> {
        let meshes = meshes()?;
        let mesh = meshes.mesh(PatchKind::DegenerateTrianglesHorizontal);
        assert_eq!(mesh.triangle_count(), 2 * 15);
        for tri in mesh.indices().chunks(3) {
            let ys = tri
                .iter()
                .map(|&i| mesh.positions()[i as usize][1])
                .collect::<Vec<_>>();
            assert!(ys.iter().all(|&y| y == ys[0]));
        }
        Ok(())
    }
}
