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
// A directory of pre-cut tiles:
//
//   <root>/index.json
//   <root>/<level>/<y>/<x>.<extension>
//
// The index names the kind of data, the file extension, the geographic extent, and the post
// and tile sizes of every level, coarsest first. Files store their northern row
// first, as images do; tiles are flipped on load so that rows run south to north.
//
// Heights are little-endian i16 meters, optionally bzip2 compressed (extension ending in
// `.bz2`). Imagery is any format the image crate can decode, expanded to RGBA8.
use crate::{RasterBackend, RasterLevel, RasterTileIdentifier, Texel, TileLoadError, TileTexels};
use anyhow::{anyhow, bail, ensure, Result};
use bzip2::read::BzDecoder;
use fxhash::FxHashSet;
use geodesy::GeodeticExtent;
use json::JsonValue;
use log::trace;
use parking_lot::Mutex;
use std::{
    borrow::Cow,
    fs,
    io::{self, Read},
    marker::PhantomData,
    path::{Path, PathBuf},
};

pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TileCacheKind {
    Height,
    Color,
}

impl TileCacheKind {
    pub fn from_name(s: &str) -> Result<Self> {
        Ok(match s {
            "height" => Self::Height,
            "color" => Self::Color,
            _ => bail!("unknown tile cache kind: {s}"),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Height => "height",
            Self::Color => "color",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TileCacheIndex {
    name: String,
    kind: TileCacheKind,
    extension: String,
    extent: GeodeticExtent,
    levels: Vec<RasterLevel>,
}

impl TileCacheIndex {
    pub fn new(
        name: &str,
        kind: TileCacheKind,
        extension: &str,
        extent: GeodeticExtent,
        levels: Vec<RasterLevel>,
    ) -> Result<Self> {
        ensure!(!levels.is_empty(), "tile cache {name} has no levels");
        for (i, level) in levels.iter().enumerate() {
            ensure!(
                level.index() == i && *level.extent() == extent,
                "tile cache {name} level {i} does not cover the cache extent"
            );
        }
        Ok(Self {
            name: name.to_owned(),
            kind,
            extension: extension.to_owned(),
            extent,
            levels,
        })
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let index = json::parse(data)?;
        let name = index["name"]
            .as_str()
            .ok_or_else(|| anyhow!("no name listed in index"))?;
        let kind = TileCacheKind::from_name(
            index["kind"]
                .as_str()
                .ok_or_else(|| anyhow!("no kind listed in index"))?,
        )?;
        let extension = index["extension"]
            .as_str()
            .ok_or_else(|| anyhow!("no extension listed in index"))?;
        let bound = |name: &str| {
            index["extent"][name]
                .as_f64()
                .ok_or_else(|| anyhow!("no extent {name} listed in index"))
        };
        let extent = GeodeticExtent::new(
            bound("west")?,
            bound("south")?,
            bound("east")?,
            bound("north")?,
        )?;
        let field = |level: &JsonValue, name: &str| {
            level[name]
                .as_i32()
                .ok_or_else(|| anyhow!("index level without {name}"))
        };
        let mut levels = Vec::new();
        for (i, level) in index["levels"].members().enumerate() {
            levels.push(RasterLevel::new(
                i,
                extent,
                field(level, "longitude_posts")?,
                field(level, "latitude_posts")?,
                field(level, "longitude_posts_per_tile")?,
                field(level, "latitude_posts_per_tile")?,
            )?);
        }
        Self::new(name, kind, extension, extent, levels)
    }

    pub fn from_directory(root: &Path) -> Result<Self> {
        let data = fs::read_to_string(root.join(INDEX_FILE_NAME))?;
        Self::from_json(&data)
    }

    pub fn as_json(&self) -> Result<JsonValue> {
        let mut obj = JsonValue::new_object();
        obj.insert::<&str>("name", &self.name)?;
        obj.insert("kind", self.kind.name())?;
        obj.insert::<&str>("extension", &self.extension)?;
        obj.insert(
            "extent",
            json::object! {
                west: self.extent.west(),
                south: self.extent.south(),
                east: self.extent.east(),
                north: self.extent.north(),
            },
        )?;
        let mut levels = JsonValue::new_array();
        for level in &self.levels {
            levels.push(json::object! {
                longitude_posts: level.longitude_posts(),
                latitude_posts: level.latitude_posts(),
                longitude_posts_per_tile: level.longitude_posts_per_tile(),
                latitude_posts_per_tile: level.latitude_posts_per_tile(),
            })?;
        }
        obj.insert("levels", levels)?;
        Ok(obj)
    }

    pub fn write(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)?;
        fs::write(root.join(INDEX_FILE_NAME), self.as_json()?.pretty(2))?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TileCacheKind {
        self.kind
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn levels(&self) -> &[RasterLevel] {
        &self.levels
    }

    pub fn tile_path(&self, root: &Path, tile: &RasterTileIdentifier) -> PathBuf {
        root.join(tile.level.to_string())
            .join(tile.y.to_string())
            .join(format!("{}.{}", tile.x, self.extension))
    }
}

/// Turns the bytes of one tile file into south-first texels.
pub trait TileDecoder: Send + Sync + 'static {
    type Texel: Texel;
    const KIND: TileCacheKind;

    fn decode(data: &[u8], extension: &str, width: u32, height: u32)
        -> Result<Vec<Self::Texel>>;
}

pub struct HeightDecoder;

impl TileDecoder for HeightDecoder {
    type Texel = f32;
    const KIND: TileCacheKind = TileCacheKind::Height;

    fn decode(data: &[u8], extension: &str, width: u32, height: u32) -> Result<Vec<f32>> {
        let raw = if extension.ends_with("bz2") {
            let mut out = Vec::new();
            BzDecoder::new(data).read_to_end(&mut out)?;
            Cow::Owned(out)
        } else {
            Cow::Borrowed(data)
        };
        let (w, h) = (width as usize, height as usize);
        ensure!(
            raw.len() == w * h * 2,
            "height tile holds {} bytes, expected {}",
            raw.len(),
            w * h * 2
        );
        let mut texels = vec![0f32; w * h];
        for (i, sample) in raw.chunks_exact(2).enumerate() {
            let (row, column) = (i / w, i % w);
            texels[(h - 1 - row) * w + column] = i16::from_le_bytes([sample[0], sample[1]]) as f32;
        }
        Ok(texels)
    }
}

pub struct ImageryDecoder;

impl TileDecoder for ImageryDecoder {
    type Texel = [u8; 4];
    const KIND: TileCacheKind = TileCacheKind::Color;

    fn decode(data: &[u8], _extension: &str, width: u32, height: u32) -> Result<Vec<[u8; 4]>> {
        let image = image::load_from_memory(data)?.to_rgba8();
        ensure!(
            image.dimensions() == (width, height),
            "imagery tile is {:?}, expected {width}x{height}",
            image.dimensions()
        );
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for row in (0..height).rev() {
            for column in 0..width {
                texels.push(image.get_pixel(column, row).0);
            }
        }
        Ok(texels)
    }
}

/// Loads tiles from a tile cache directory. Tiles that are missing on disk are remembered
/// so that they are not looked for again.
pub struct TileCacheBackend<D: TileDecoder> {
    root: PathBuf,
    index: TileCacheIndex,
    missing: Mutex<FxHashSet<RasterTileIdentifier>>,
    _decoder: PhantomData<fn() -> D>,
}

pub type HeightTileCache = TileCacheBackend<HeightDecoder>;
pub type ImageryTileCache = TileCacheBackend<ImageryDecoder>;

impl<D: TileDecoder> TileCacheBackend<D> {
    pub fn open(root: &Path) -> Result<Self> {
        let index = TileCacheIndex::from_directory(root)?;
        ensure!(
            index.kind() == D::KIND,
            "tile cache {} holds {} data, not {}",
            index.name(),
            index.kind().name(),
            D::KIND.name()
        );
        Ok(Self {
            root: root.to_owned(),
            index,
            missing: Mutex::new(FxHashSet::default()),
            _decoder: PhantomData,
        })
    }

    pub fn index(&self) -> &TileCacheIndex {
        &self.index
    }

    pub fn missing_tile_count(&self) -> usize {
        self.missing.lock().len()
    }
}

impl<D: TileDecoder> RasterBackend for TileCacheBackend<D> {
    type Texel = D::Texel;

    fn name(&self) -> &str {
        self.index.name()
    }

    fn extent(&self) -> GeodeticExtent {
        self.index.extent
    }

    fn levels(&self) -> &[RasterLevel] {
        self.index.levels()
    }

    fn load_tile(
        &self,
        level: &RasterLevel,
        tile: &RasterTileIdentifier,
    ) -> Result<TileTexels<D::Texel>, TileLoadError> {
        if self.missing.lock().contains(tile) {
            return Err(TileLoadError::permanent(anyhow!(
                "tile {tile} is not in cache {}",
                self.index.name()
            )));
        }
        let path = self.index.tile_path(&self.root, tile);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("tile {} not present at {}", tile, path.display());
                self.missing.lock().insert(*tile);
                return Err(TileLoadError::permanent(e));
            }
            Err(e) => return Err(TileLoadError::transient(e)),
        };
        let extent = level.tile_data_extent(tile);
        let (width, height) = (extent.width() as u32, extent.height() as u32);
        let texels = D::decode(&data, self.index.extension(), width, height)
            .map_err(|e| TileLoadError::permanent(e.context(format!("{}", path.display()))))?;
        TileTexels::new(width, height, texels).map_err(TileLoadError::permanent)
    }
}
