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
use crate::{RasterBackend, RasterLevel, RasterTileIdentifier, Texel, TileLoadError, TileTexels};
use anyhow::{anyhow, ensure, Result};
use geodesy::GeodeticExtent;

type Sampler<T> = Box<dyn Fn(f64, f64) -> T + Send + Sync + 'static>;

/// Samples a function of (longitude, latitude) in degrees at every post. Needs no data on
/// disk, so it serves as the default terrain and as a deterministic source for tests.
pub struct ProceduralBackend<T: Texel> {
    name: String,
    extent: GeodeticExtent,
    levels: Vec<RasterLevel>,
    sampler: Sampler<T>,
}

impl<T: Texel> ProceduralBackend<T> {
    pub fn new<S, F>(name: S, levels: Vec<RasterLevel>, sampler: F) -> Result<Self>
    where
        S: Into<String>,
        F: Fn(f64, f64) -> T + Send + Sync + 'static,
    {
        let name = name.into();
        ensure!(!levels.is_empty(), "procedural source {name} has no levels");
        let extent = *levels[0].extent();
        Ok(Self {
            name,
            extent,
            levels,
            sampler: Box::new(sampler),
        })
    }
}

impl ProceduralBackend<f32> {
    /// Rolling hills, in meters: a few octaves of sinusoids so that every level has detail
    /// the coarser levels cannot represent.
    pub fn rolling_hills(levels: Vec<RasterLevel>) -> Result<Self> {
        Self::new("rolling-hills", levels, |lon, lat| {
            let (x, y) = (lon.to_radians(), lat.to_radians());
            let mut height = 0f64;
            let mut amplitude = 2_000f64;
            let mut frequency = 3f64;
            for _ in 0..6 {
                height += amplitude * (x * frequency).sin() * (y * frequency * 1.3).cos();
                amplitude *= 0.45;
                frequency *= 2.1;
            }
            height as f32
        })
    }
}

impl ProceduralBackend<[u8; 4]> {
    /// A latitude banded palette for imagery.
    pub fn banded_imagery(levels: Vec<RasterLevel>) -> Result<Self> {
        Self::new("banded-imagery", levels, |lon, lat| {
            let band = ((lat + 90.) / 180. * 255.).clamp(0., 255.) as u8;
            let stripe = if (lon.floor() as i64).rem_euclid(2) == 0 {
                40
            } else {
                80
            };
            [band, stripe, 255 - band, 255]
        })
    }
}

impl<T: Texel> RasterBackend for ProceduralBackend<T> {
    type Texel = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn extent(&self) -> GeodeticExtent {
        self.extent
    }

    fn levels(&self) -> &[RasterLevel] {
        &self.levels
    }

    fn load_tile(
        &self,
        level: &RasterLevel,
        tile: &RasterTileIdentifier,
    ) -> Result<TileTexels<T>, TileLoadError> {
        if !level.contains_tile(tile) {
            return Err(TileLoadError::permanent(anyhow!(
                "tile {tile} is outside of procedural source {}",
                self.name
            )));
        }
        let extent = level.tile_data_extent(tile);
        let mut texels = Vec::with_capacity(extent.area() as usize);
        for y in extent.south..=extent.north {
            let lat = level.index_to_latitude(y as f64);
            for x in extent.west..=extent.east {
                texels.push((self.sampler)(level.index_to_longitude(x as f64), lat));
            }
        }
        TileTexels::new(extent.width() as u32, extent.height() as u32, texels)
            .map_err(TileLoadError::permanent)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_samples_at_posts() -> Result<()> {
        let levels = RasterLevel::pyramid(GeodeticExtent::whole_globe(), 2, 9, 5, 4)?;
        let backend = ProceduralBackend::new("lon", levels, |lon, _lat| lon as f32)?;
        let level = backend.levels()[1].clone();
        let texels = backend
            .load_tile(&level, &RasterTileIdentifier::new(1, 1, 0))
            .map_err(|e| anyhow!("{e}"))?;
        assert_eq!((texels.width(), texels.height()), (4, 4));
        // Level 1 has 17 posts across 360 degrees; tile 1 starts at post 4.
        assert_relative_eq!(texels.get(0, 0).unwrap_or_default(), -90.);
        assert_relative_eq!(texels.get(3, 2).unwrap_or_default(), -22.5);
        Ok(())
    }

    #[test]
    fn test_partial_edge_tile() -> Result<()> {
        let levels = RasterLevel::pyramid(GeodeticExtent::whole_globe(), 1, 9, 5, 4)?;
        let backend = ProceduralBackend::rolling_hills(levels)?;
        let level = backend.levels()[0].clone();
        let texels = backend
            .load_tile(&level, &RasterTileIdentifier::new(0, 2, 1))
            .map_err(|e| anyhow!("{e}"))?;
        assert_eq!((texels.width(), texels.height()), (1, 1));
        Ok(())
    }
}
