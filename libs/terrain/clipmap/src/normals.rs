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
use crate::{level::ClipmapLayer, texture::ClipmapTexture};
use geodesy::Ellipsoid;
use nalgebra::Vector3;
use raster::{PostExtent, RasterLevel};
use rayon::prelude::*;

// Keep the finite difference sane where meridians converge.
const MIN_POST_SPACING_METERS: f64 = 1e-3;

/// Recompute normals for `region` plus one post on every side, clipped to the terrain
/// window. A normal depends on its four neighbors, so heights changing at the edge of a
/// region invalidate the normals just outside of it. Returns the number of posts written.
///
/// Normals are in the local east, north, up frame of each post.
pub fn update_normals(
    heights: &ClipmapLayer<f32>,
    normals: &mut ClipmapTexture<[f32; 3]>,
    raster_level: &RasterLevel,
    region: &PostExtent,
    ellipsoid: &Ellipsoid,
    height_exaggeration: f32,
) -> usize {
    let region = match heights
        .current_extent()
        .and_then(|extent| region.expanded(1).intersection(extent))
    {
        Some(region) => region,
        None => return 0,
    };

    let rows = (region.south..=region.north)
        .into_par_iter()
        .map(|y| {
            let latitude = raster_level.index_to_latitude(y as f64);
            let (along_parallel, meridional) = ellipsoid.meters_per_degree(latitude.to_radians());
            let dx = (along_parallel * raster_level.post_delta_longitude())
                .max(MIN_POST_SPACING_METERS);
            let dy = (meridional * raster_level.post_delta_latitude())
                .max(MIN_POST_SPACING_METERS);
            let height = |x: i32, y: i32| {
                heights.sample_clamped(x, y).unwrap_or_default() as f64
                    * height_exaggeration as f64
            };
            (region.west..=region.east)
                .map(|x| {
                    let dhdx = (height(x + 1, y) - height(x - 1, y)) / (2. * dx);
                    let dhdy = (height(x, y + 1) - height(x, y - 1)) / (2. * dy);
                    let n = Vector3::new(-dhdx, -dhdy, 1.).normalize();
                    [n.x as f32, n.y as f32, n.z as f32]
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    for (y, row) in (region.south..=region.north).zip(rows) {
        for (x, normal) in (region.west..=region.east).zip(row) {
            let (px, py) = heights.to_physical(x, y);
            normals.set(px, py, normal);
        }
    }
    region.area() as usize
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use approx::assert_relative_eq;
    use geodesy::{GeodeticExtent, WGS84};

    fn flat() -> Result<(ClipmapLayer<f32>, ClipmapTexture<[f32; 3]>, RasterLevel)> {
        let level = RasterLevel::new(0, GeodeticExtent::new(0., 0., 1., 1.)?, 101, 101, 64, 64)?;
        let mut heights = ClipmapLayer::new(0, 16, 16)?;
        heights.set_next_extent(PostExtent::new(20, 20, 35, 35))?;
        heights.commit((5, 9));
        let normals = ClipmapTexture::new(16, 16)?;
        Ok((heights, normals, level))
    }

    fn normal_at(
        heights: &ClipmapLayer<f32>,
        normals: &ClipmapTexture<[f32; 3]>,
        x: i32,
        y: i32,
    ) -> [f32; 3] {
        let (px, py) = heights.to_physical(x, y);
        normals.get(px, py)
    }

    #[test]
    fn test_flat_is_up() -> Result<()> {
        let (heights, mut normals, level) = flat()?;
        let window = *heights.current_extent().unwrap();
        let written = update_normals(&heights, &mut normals, &level, &window, &WGS84, 1.);
        assert_eq!(written, 256);
        for normal in normals.texels() {
            assert_relative_eq!(normal[2], 1.);
        }
        Ok(())
    }

    #[test]
    fn test_halo_is_refreshed() -> Result<()> {
        let (mut heights, mut normals, level) = flat()?;
        let window = *heights.current_extent().unwrap();
        update_normals(&heights, &mut normals, &level, &window, &WGS84, 1.);

        // Raise column 28 and refresh only that column.
        for y in 20..=35 {
            heights.write_row(28, y, &[500.]);
        }
        let column = PostExtent::new(28, 20, 28, 35);
        let written = update_normals(&heights, &mut normals, &level, &column, &WGS84, 1.);
        assert_eq!(written, 3 * 16);

        // Neighbors of the raised column tilt away from it; the column itself stays level.
        assert!(normal_at(&heights, &normals, 27, 25)[0] < 0.);
        assert!(normal_at(&heights, &normals, 29, 25)[0] > 0.);
        assert_relative_eq!(normal_at(&heights, &normals, 28, 25)[2], 1.);
        // Outside the halo nothing was touched.
        assert_relative_eq!(normal_at(&heights, &normals, 26, 25)[2], 1.);
        Ok(())
    }
}
