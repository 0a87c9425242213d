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
use crate::{PostExtent, RasterTileIdentifier};
use anyhow::{ensure, Result};
use std::fmt::Debug;

/// A single raster sample. Heights are meters as `f32`; imagery is RGBA8.
pub trait Texel: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    fn lerp(a: Self, b: Self, t: f32) -> Self;

    fn bilerp(sw: Self, se: Self, nw: Self, ne: Self, tx: f32, ty: f32) -> Self {
        Self::lerp(Self::lerp(sw, se, tx), Self::lerp(nw, ne, tx), ty)
    }
}

impl Texel for f32 {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Texel for [u8; 4] {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        let mut out = [0u8; 4];
        for i in 0..4 {
            let v = a[i] as f32 + (b[i] as f32 - a[i] as f32) * t;
            out[i] = v.round().clamp(0., 255.) as u8;
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TileStatus {
    NotRequested,
    Loading,
    Loaded,
    Unavailable,
}

/// Loaded samples for one tile, row-major from the south-west corner.
#[derive(Clone, Debug)]
pub struct TileTexels<T: Texel> {
    width: u32,
    height: u32,
    texels: Vec<T>,
}

impl<T: Texel> TileTexels<T> {
    pub fn new(width: u32, height: u32, texels: Vec<T>) -> Result<Self> {
        ensure!(
            texels.len() == width as usize * height as usize,
            "tile texels do not match dimensions: {} != {width}x{height}",
            texels.len()
        );
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[T] {
        &self.texels
    }

    /// Tile-local lookup.
    pub fn get(&self, x: i32, y: i32) -> Option<T> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.texels[y as usize * self.width as usize + x as usize])
    }

    pub fn row(&self, y: u32) -> &[T] {
        let start = y as usize * self.width as usize;
        &self.texels[start..start + self.width as usize]
    }
}

/// A tile and, if it is active, its samples.
#[derive(Debug)]
pub struct RasterTile<T: Texel> {
    identifier: RasterTileIdentifier,
    extent: PostExtent,
    status: TileStatus,
    texels: Option<TileTexels<T>>,
}

impl<T: Texel> RasterTile<T> {
    pub(crate) fn inactive(
        identifier: RasterTileIdentifier,
        extent: PostExtent,
        status: TileStatus,
    ) -> Self {
        Self {
            identifier,
            extent,
            status,
            texels: None,
        }
    }

    pub(crate) fn active(
        identifier: RasterTileIdentifier,
        extent: PostExtent,
        texels: TileTexels<T>,
    ) -> Self {
        Self {
            identifier,
            extent,
            status: TileStatus::Loaded,
            texels: Some(texels),
        }
    }

    pub fn identifier(&self) -> &RasterTileIdentifier {
        &self.identifier
    }

    /// Level-wide posts covered by the tile's data.
    pub fn extent(&self) -> &PostExtent {
        &self.extent
    }

    pub fn status(&self) -> TileStatus {
        self.status
    }

    pub fn texels(&self) -> Option<&TileTexels<T>> {
        self.texels.as_ref()
    }

    /// Sample at a level-wide post index.
    pub fn sample(&self, x: i32, y: i32) -> Option<T> {
        self.texels
            .as_ref()
            .and_then(|t| t.get(x - self.extent.west, y - self.extent.south))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_texel_lerp() {
        assert_eq!(f32::lerp(2., 4., 0.25), 2.5);
        assert_eq!(<[u8; 4]>::lerp([0, 255, 10, 255], [255, 0, 10, 255], 0.5), [128, 128, 10, 255]);
        assert_eq!(f32::bilerp(0., 1., 2., 3., 0.5, 0.5), 1.5);
    }

    #[test]
    fn test_texels_dimensions() -> Result<()> {
        assert!(TileTexels::new(2, 2, vec![0f32; 3]).is_err());
        let texels = TileTexels::new(3, 2, vec![0f32, 1., 2., 3., 4., 5.])?;
        assert_eq!(texels.get(2, 1), Some(5.));
        assert_eq!(texels.get(3, 0), None);
        assert_eq!(texels.row(1), &[3., 4., 5.]);
        Ok(())
    }

    #[test]
    fn test_tile_sample_offsets() -> Result<()> {
        let tile = RasterTile::active(
            RasterTileIdentifier::new(0, 1, 1),
            PostExtent::new(4, 4, 5, 5),
            TileTexels::new(2, 2, vec![1f32, 2., 3., 4.])?,
        );
        assert_eq!(tile.sample(5, 4), Some(2.));
        assert_eq!(tile.sample(3, 4), None);
        assert_eq!(tile.status(), TileStatus::Loaded);
        Ok(())
    }
}
