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
use crate::texture::ClipmapTexture;
use anyhow::{ensure, Result};
use raster::PostExtent;

/// A window onto one raster level and the toroidal texture holding it.
///
/// `origin_in_texture` is the physical texel holding the south-west post of the current
/// extent. Moving the window moves the origin by the same amount, modulo the texture size, so
/// only newly exposed posts need to be written.
#[derive(Clone, Debug)]
pub struct ClipmapLayer<T> {
    raster_level: usize,
    texture: ClipmapTexture<T>,
    current_extent: Option<PostExtent>,
    next_extent: PostExtent,
    origin_in_texture: (i32, i32),
}

impl<T: Copy + Default> ClipmapLayer<T> {
    pub fn new(raster_level: usize, width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            raster_level,
            texture: ClipmapTexture::new(width, height)?,
            current_extent: None,
            next_extent: PostExtent::from_origin_and_size(0, 0, width as i32, height as i32),
            origin_in_texture: (0, 0),
        })
    }

    /// Index of the raster level this layer samples.
    pub fn raster_level(&self) -> usize {
        self.raster_level
    }

    pub fn size(&self) -> (i32, i32) {
        (self.texture.width() as i32, self.texture.height() as i32)
    }

    pub fn texture(&self) -> &ClipmapTexture<T> {
        &self.texture
    }

    pub(crate) fn texture_mut(&mut self) -> &mut ClipmapTexture<T> {
        &mut self.texture
    }

    /// What the texture holds, or None before the first update.
    pub fn current_extent(&self) -> Option<&PostExtent> {
        self.current_extent.as_ref()
    }

    pub fn next_extent(&self) -> &PostExtent {
        &self.next_extent
    }

    pub fn set_next_extent(&mut self, extent: PostExtent) -> Result<()> {
        let (width, height) = self.size();
        ensure!(
            extent.width() == width && extent.height() == height,
            "clip window {extent} does not match texture size {width}x{height}"
        );
        self.next_extent = extent;
        Ok(())
    }

    pub fn origin_in_texture(&self) -> (i32, i32) {
        self.origin_in_texture
    }

    pub fn is_current(&self) -> bool {
        self.current_extent == Some(self.next_extent)
    }

    pub(crate) fn commit(&mut self, origin_in_texture: (i32, i32)) {
        self.current_extent = Some(self.next_extent);
        self.origin_in_texture = origin_in_texture;
    }

    fn window(&self) -> &PostExtent {
        self.current_extent.as_ref().unwrap_or(&self.next_extent)
    }

    /// The physical texel of a logical post. Posts outside the window alias into it.
    pub fn to_physical(&self, x: i32, y: i32) -> (u32, u32) {
        let (width, height) = self.size();
        let window = self.window();
        (
            (self.origin_in_texture.0 + (x - window.west)).rem_euclid(width) as u32,
            (self.origin_in_texture.1 + (y - window.south)).rem_euclid(height) as u32,
        )
    }

    pub fn sample(&self, x: i32, y: i32) -> Option<T> {
        let extent = self.current_extent.as_ref()?;
        if !extent.contains(x, y) {
            return None;
        }
        let (px, py) = self.to_physical(x, y);
        Some(self.texture.get(px, py))
    }

    /// As `sample`, but clamps to the edge of the current extent.
    pub fn sample_clamped(&self, x: i32, y: i32) -> Option<T> {
        let extent = self.current_extent.as_ref()?;
        self.sample(
            x.clamp(extent.west, extent.east),
            y.clamp(extent.south, extent.north),
        )
    }

    /// Write one row of texels starting at logical post `(x, y)`. The row must not cross the
    /// physical wrap; split updates first.
    pub(crate) fn write_row(&mut self, x: i32, y: i32, row: &[T]) {
        let (px, py) = self.to_physical(x, y);
        self.texture
            .span_mut(px, py, row.len() as u32)
            .copy_from_slice(row);
    }
}

/// Everything one level of detail keeps resident: heights, their normals, and optionally
/// imagery, each in a toroidal texture.
#[derive(Clone, Debug)]
pub struct ClipmapLevel {
    index: usize,
    terrain: ClipmapLayer<f32>,
    // Shares the terrain window and origin.
    normals: ClipmapTexture<[f32; 3]>,
    imagery: Option<ClipmapLayer<[u8; 4]>>,
    offset_strip_on_east: bool,
    offset_strip_on_north: bool,
}

impl ClipmapLevel {
    pub fn new(
        index: usize,
        clipmap_posts: u32,
        imagery: Option<(usize, u32, u32)>,
    ) -> Result<Self> {
        let imagery = match imagery {
            Some((raster_level, width, height)) => {
                Some(ClipmapLayer::new(raster_level, width, height)?)
            }
            None => None,
        };
        Ok(Self {
            index,
            terrain: ClipmapLayer::new(index, clipmap_posts, clipmap_posts)?,
            normals: ClipmapTexture::new(clipmap_posts, clipmap_posts)?,
            imagery,
            offset_strip_on_east: false,
            offset_strip_on_north: false,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn terrain(&self) -> &ClipmapLayer<f32> {
        &self.terrain
    }

    pub fn terrain_mut(&mut self) -> &mut ClipmapLayer<f32> {
        &mut self.terrain
    }

    pub fn normals(&self) -> &ClipmapTexture<[f32; 3]> {
        &self.normals
    }

    /// The normal at a logical terrain post, if the post is in the current window.
    pub fn normal(&self, x: i32, y: i32) -> Option<[f32; 3]> {
        let extent = self.terrain.current_extent()?;
        if !extent.contains(x, y) {
            return None;
        }
        let (px, py) = self.terrain.to_physical(x, y);
        Some(self.normals.get(px, py))
    }

    pub(crate) fn terrain_and_normals_mut(
        &mut self,
    ) -> (&ClipmapLayer<f32>, &mut ClipmapTexture<[f32; 3]>) {
        (&self.terrain, &mut self.normals)
    }

    pub fn imagery(&self) -> Option<&ClipmapLayer<[u8; 4]>> {
        self.imagery.as_ref()
    }

    pub fn imagery_mut(&mut self) -> Option<&mut ClipmapLayer<[u8; 4]>> {
        self.imagery.as_mut()
    }

    pub fn offset_strip_on_east(&self) -> bool {
        self.offset_strip_on_east
    }

    pub fn offset_strip_on_north(&self) -> bool {
        self.offset_strip_on_north
    }

    pub(crate) fn set_offset_strips(&mut self, on_east: bool, on_north: bool) {
        self.offset_strip_on_east = on_east;
        self.offset_strip_on_north = on_north;
    }
}
