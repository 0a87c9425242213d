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
use anyhow::{ensure, Result};

/// A fixed size, row-major 2D buffer of texels. Clip levels address it toroidally: the
/// physical coordinate of a logical post is offset by the level's origin and wrapped.
#[derive(Clone, Debug)]
pub struct ClipmapTexture<T> {
    width: u32,
    height: u32,
    texels: Vec<T>,
}

impl<T: Copy + Default> ClipmapTexture<T> {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "clipmap texture must not be empty: {width}x{height}"
        );
        Ok(Self {
            width,
            height,
            texels: vec![T::default(); width as usize * height as usize],
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

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> T {
        self.texels[self.offset(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let offset = self.offset(x, y);
        self.texels[offset] = value;
    }

    /// Mutable access to `width` texels of row `y` starting at column `x`. The span must not
    /// cross the east edge of the texture.
    pub fn span_mut(&mut self, x: u32, y: u32, width: u32) -> &mut [T] {
        debug_assert!(x + width <= self.width);
        let start = self.offset(x, y);
        &mut self.texels[start..start + width as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_set() -> Result<()> {
        let mut texture = ClipmapTexture::<f32>::new(4, 3)?;
        texture.set(3, 2, 7.);
        assert_eq!(texture.get(3, 2), 7.);
        assert_eq!(texture.get(0, 0), 0.);
        Ok(())
    }

    #[test]
    fn test_span() -> Result<()> {
        let mut texture = ClipmapTexture::<u8>::new(4, 2)?;
        texture.span_mut(1, 1, 3).copy_from_slice(&[1, 2, 3]);
        assert_eq!(texture.texels(), &[0, 0, 0, 0, 0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_empty_texture_rejected() {
        assert!(ClipmapTexture::<f32>::new(0, 4).is_err());
    }
}
