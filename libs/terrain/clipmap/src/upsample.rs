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
// Placeholder texels for posts whose tile is not resident: bilinear samples of the next
// coarser clip level at the same geographic position.
use crate::level::ClipmapLayer;
use raster::{RasterLevel, Texel};

/// Bilinear sample of `layer` at fractional logical post `(x, y)`. None if the point is
/// outside the layer's current window.
pub fn sample_bilinear<T: Texel>(layer: &ClipmapLayer<T>, x: f64, y: f64) -> Option<T> {
    let extent = layer.current_extent()?;
    if x < extent.west as f64
        || y < extent.south as f64
        || x > extent.east as f64
        || y > extent.north as f64
    {
        return None;
    }
    let x0 = (x.floor() as i32).min(extent.east);
    let y0 = (y.floor() as i32).min(extent.north);
    let x1 = (x0 + 1).min(extent.east);
    let y1 = (y0 + 1).min(extent.north);
    let tx = (x - x0 as f64) as f32;
    let ty = (y - y0 as f64) as f32;
    Some(T::bilerp(
        layer.sample(x0, y0)?,
        layer.sample(x1, y0)?,
        layer.sample(x0, y1)?,
        layer.sample(x1, y1)?,
        tx,
        ty,
    ))
}

/// Maps posts of a fine raster level onto a coarser clip layer.
pub struct Upsampler<'a, T: Texel> {
    coarser: Option<(&'a ClipmapLayer<T>, &'a RasterLevel)>,
    fine: &'a RasterLevel,
}

impl<'a, T: Texel> Upsampler<'a, T> {
    pub fn new(
        coarser: Option<(&'a ClipmapLayer<T>, &'a RasterLevel)>,
        fine: &'a RasterLevel,
    ) -> Self {
        Self { coarser, fine }
    }

    /// The placeholder for fine post `(x, y)`: the coarser level's bilinear sample, or the
    /// texel default where nothing coarser covers it.
    pub fn sample(&self, x: i32, y: i32) -> T {
        let (layer, level) = match self.coarser {
            Some(coarser) => coarser,
            None => return T::default(),
        };
        let cx = level.longitude_to_index(self.fine.index_to_longitude(x as f64));
        let cy = level.latitude_to_index(self.fine.index_to_latitude(y as f64));
        sample_bilinear(layer, cx, cy).unwrap_or_default()
    }

    pub fn fill_row(&self, x: i32, y: i32, row: &mut [T]) {
        for (i, texel) in row.iter_mut().enumerate() {
            *texel = self.sample(x + i as i32, y);
        }
    }
}
