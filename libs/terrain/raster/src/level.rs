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
use anyhow::{bail, ensure, Result};
use geodesy::GeodeticExtent;

/// The part of a single tile that overlaps some request, in tile-local post indices.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RasterTileRegion {
    pub tile: RasterTileIdentifier,
    pub west: i32,
    pub south: i32,
    pub east: i32,
    pub north: i32,
}

impl RasterTileRegion {
    pub fn width(&self) -> i32 {
        self.east - self.west + 1
    }

    pub fn height(&self) -> i32 {
        self.north - self.south + 1
    }

    /// The region in level-wide post indices.
    pub fn level_extent(&self, level: &RasterLevel) -> PostExtent {
        let (tile_west, tile_south) = level.tile_origin(&self.tile);
        PostExtent::new(
            tile_west + self.west,
            tile_south + self.south,
            tile_west + self.east,
            tile_south + self.north,
        )
    }
}

/// One level of a raster pyramid: a regular grid of posts over a geographic extent, cut into
/// tiles of a fixed number of posts. Tiles along the east and north edges may be partial.
#[derive(Clone, Debug)]
pub struct RasterLevel {
    index: usize,
    extent: GeodeticExtent,
    longitude_posts: i32,
    latitude_posts: i32,
    longitude_posts_per_tile: i32,
    latitude_posts_per_tile: i32,
    post_delta_longitude: f64,
    post_delta_latitude: f64,
}

impl RasterLevel {
    pub fn new(
        index: usize,
        extent: GeodeticExtent,
        longitude_posts: i32,
        latitude_posts: i32,
        longitude_posts_per_tile: i32,
        latitude_posts_per_tile: i32,
    ) -> Result<Self> {
        ensure!(
            longitude_posts >= 2 && latitude_posts >= 2,
            "raster level {index} needs at least 2x2 posts, got {longitude_posts}x{latitude_posts}"
        );
        ensure!(
            longitude_posts_per_tile >= 1 && latitude_posts_per_tile >= 1,
            "raster level {index} has empty tiles"
        );
        let post_delta_longitude = extent.width() / (longitude_posts - 1) as f64;
        let post_delta_latitude = extent.height() / (latitude_posts - 1) as f64;
        ensure!(
            post_delta_longitude.is_finite() && post_delta_longitude > 0.,
            "raster level {index} has a degenerate longitude post delta: {post_delta_longitude}"
        );
        ensure!(
            post_delta_latitude.is_finite() && post_delta_latitude > 0.,
            "raster level {index} has a degenerate latitude post delta: {post_delta_latitude}"
        );
        Ok(Self {
            index,
            extent,
            longitude_posts,
            latitude_posts,
            longitude_posts_per_tile,
            latitude_posts_per_tile,
            post_delta_longitude,
            post_delta_latitude,
        })
    }

    /// Build `level_count` levels over `extent`, each with exactly twice the resolution of
    /// the last, sharing a south-west origin and tile size.
    pub fn pyramid(
        extent: GeodeticExtent,
        level_count: usize,
        coarsest_longitude_posts: i32,
        coarsest_latitude_posts: i32,
        posts_per_tile: i32,
    ) -> Result<Vec<RasterLevel>> {
        ensure!(level_count > 0, "a raster pyramid needs at least one level");
        let mut levels = Vec::with_capacity(level_count);
        for index in 0..level_count {
            let scale = u32::try_from(index)
                .ok()
                .and_then(|shift| 1i32.checked_shl(shift))
                .filter(|scale| *scale > 0);
            let posts = |coarsest: i32| {
                scale
                    .and_then(|scale| (coarsest - 1).checked_mul(scale))
                    .and_then(|posts| posts.checked_add(1))
            };
            let (longitude_posts, latitude_posts) =
                match (posts(coarsest_longitude_posts), posts(coarsest_latitude_posts)) {
                    (Some(longitude), Some(latitude)) => (longitude, latitude),
                    _ => bail!(
                        "raster level {index} of {coarsest_longitude_posts}x\
                         {coarsest_latitude_posts} posts overflows"
                    ),
                };
            levels.push(RasterLevel::new(
                index,
                extent,
                longitude_posts,
                latitude_posts,
                posts_per_tile,
                posts_per_tile,
            )?);
        }
        Ok(levels)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn extent(&self) -> &GeodeticExtent {
        &self.extent
    }

    pub fn longitude_posts(&self) -> i32 {
        self.longitude_posts
    }

    pub fn latitude_posts(&self) -> i32 {
        self.latitude_posts
    }

    pub fn longitude_posts_per_tile(&self) -> i32 {
        self.longitude_posts_per_tile
    }

    pub fn latitude_posts_per_tile(&self) -> i32 {
        self.latitude_posts_per_tile
    }

    /// Degrees between adjacent posts, east-west.
    pub fn post_delta_longitude(&self) -> f64 {
        self.post_delta_longitude
    }

    /// Degrees between adjacent posts, north-south.
    pub fn post_delta_latitude(&self) -> f64 {
        self.post_delta_latitude
    }

    pub fn post_extent(&self) -> PostExtent {
        PostExtent::new(0, 0, self.longitude_posts - 1, self.latitude_posts - 1)
    }

    pub fn longitude_to_index(&self, longitude: f64) -> f64 {
        (longitude - self.extent.west()) / self.post_delta_longitude
    }

    pub fn latitude_to_index(&self, latitude: f64) -> f64 {
        (latitude - self.extent.south()) / self.post_delta_latitude
    }

    pub fn index_to_longitude(&self, index: f64) -> f64 {
        self.extent.west() + index * self.post_delta_longitude
    }

    pub fn index_to_latitude(&self, index: f64) -> f64 {
        self.extent.south() + index * self.post_delta_latitude
    }

    /// Tile columns and rows in this level.
    pub fn tile_count(&self) -> (i32, i32) {
        (
            (self.longitude_posts + self.longitude_posts_per_tile - 1)
                / self.longitude_posts_per_tile,
            (self.latitude_posts + self.latitude_posts_per_tile - 1)
                / self.latitude_posts_per_tile,
        )
    }

    pub fn contains_tile(&self, tile: &RasterTileIdentifier) -> bool {
        let (columns, rows) = self.tile_count();
        tile.level == self.index && tile.x >= 0 && tile.x < columns && tile.y >= 0 && tile.y < rows
    }

    pub fn tile_origin(&self, tile: &RasterTileIdentifier) -> (i32, i32) {
        (
            tile.x * self.longitude_posts_per_tile,
            tile.y * self.latitude_posts_per_tile,
        )
    }

    /// The posts a tile covers, ignoring the edge of the data set.
    pub fn tile_extent(&self, tile: &RasterTileIdentifier) -> PostExtent {
        let (west, south) = self.tile_origin(tile);
        PostExtent::from_origin_and_size(
            west,
            south,
            self.longitude_posts_per_tile,
            self.latitude_posts_per_tile,
        )
    }

    /// The posts a tile actually holds data for: partial at the east and north edges.
    pub fn tile_data_extent(&self, tile: &RasterTileIdentifier) -> PostExtent {
        let extent = self.tile_extent(tile);
        PostExtent::new(
            extent.west,
            extent.south,
            extent.east.min(self.longitude_posts - 1),
            extent.north.min(self.latitude_posts - 1),
        )
    }

    /// Partition `extent` by tile. Every post in the extent lands in exactly one region.
    /// Regions may name tiles outside the level when the extent reaches past its edges.
    pub fn get_tiles_in_extent(&self, extent: &PostExtent) -> Vec<RasterTileRegion> {
        if extent.is_empty() {
            return Vec::new();
        }
        let tile_width = self.longitude_posts_per_tile;
        let tile_height = self.latitude_posts_per_tile;
        let first_x = extent.west.div_euclid(tile_width);
        let last_x = extent.east.div_euclid(tile_width);
        let first_y = extent.south.div_euclid(tile_height);
        let last_y = extent.north.div_euclid(tile_height);

        let mut regions = Vec::with_capacity(
            ((last_x - first_x + 1) * (last_y - first_y + 1)).max(0) as usize,
        );
        for y in first_y..=last_y {
            let tile_south = y * tile_height;
            for x in first_x..=last_x {
                let tile_west = x * tile_width;
                regions.push(RasterTileRegion {
                    tile: RasterTileIdentifier::new(self.index, x, y),
                    west: extent.west.max(tile_west) - tile_west,
                    south: extent.south.max(tile_south) - tile_south,
                    east: extent.east.min(tile_west + tile_width - 1) - tile_west,
                    north: extent.north.min(tile_south + tile_height - 1) - tile_south,
                });
            }
        }
        regions
    }
}
