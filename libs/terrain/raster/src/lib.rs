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
// Raster data sets: terrain heights or imagery, stored as a pyramid of levels, each level a
// regular grid of posts cut into fixed size tiles.
//
// Post indices run west to east and south to north from the south-west corner of the data
// set's extent. Tile texels are stored row-major with low indexed rows to the south, going
// north.
mod extent;
mod identifier;
mod level;
mod procedural;
mod source;
mod tile;
mod tile_cache;

pub use crate::{
    extent::PostExtent,
    identifier::{ChildIndex, RasterTileIdentifier},
    level::{RasterLevel, RasterTileRegion},
    procedural::ProceduralBackend,
    source::{FailureKind, RasterBackend, RasterSource, TileLoadError},
    tile::{RasterTile, Texel, TileStatus, TileTexels},
    tile_cache::{
        HeightDecoder, HeightTileCache, ImageryDecoder, ImageryTileCache, TileCacheBackend,
        TileCacheIndex, TileCacheKind, TileDecoder,
    },
};
