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
use crate::{
    PostExtent, RasterLevel, RasterTile, RasterTileIdentifier, Texel, TileStatus, TileTexels,
};
use anyhow::{anyhow, ensure, Result};
use fxhash::FxHashMap;
use geodesy::GeodeticExtent;
use std::{fmt, sync::Arc};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Worth asking again later: I/O hiccups, busy servers.
    Transient,
    /// The tile will never load: missing or corrupt data.
    Permanent,
}

#[derive(Debug, Error)]
#[error("{kind:?} tile load failure: {error}")]
pub struct TileLoadError {
    kind: FailureKind,
    error: anyhow::Error,
}

impl TileLoadError {
    pub fn transient<E: Into<anyhow::Error>>(error: E) -> Self {
        Self {
            kind: FailureKind::Transient,
            error: error.into(),
        }
    }

    pub fn permanent<E: Into<anyhow::Error>>(error: E) -> Self {
        Self {
            kind: FailureKind::Permanent,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }
}

/// Where tile samples come from. Loading blocks, so it is called from a worker.
pub trait RasterBackend: Send + Sync + 'static {
    type Texel: Texel;

    fn name(&self) -> &str;
    fn extent(&self) -> GeodeticExtent;

    /// Levels ordered coarsest first, each with `index()` equal to its position.
    fn levels(&self) -> &[RasterLevel];

    /// Produce the samples covering `level.tile_data_extent(tile)`.
    fn load_tile(
        &self,
        level: &RasterLevel,
        tile: &RasterTileIdentifier,
    ) -> Result<TileTexels<Self::Texel>, TileLoadError>;
}

/// Tracks which tiles of a backend are resident and what state the rest are in.
pub struct RasterSource<T: Texel> {
    backend: Arc<dyn RasterBackend<Texel = T>>,
    active: FxHashMap<RasterTileIdentifier, Arc<RasterTile<T>>>,
    status: FxHashMap<RasterTileIdentifier, TileStatus>,
}

impl<T: Texel> fmt::Debug for RasterSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RasterSource")
            .field("name", &self.backend.name())
            .field("levels", &self.backend.levels().len())
            .field("active", &self.active.len())
            .finish()
    }
}

impl<T: Texel> RasterSource<T> {
    pub fn new(backend: Arc<dyn RasterBackend<Texel = T>>) -> Result<Self> {
        let levels = backend.levels();
        ensure!(
            !levels.is_empty(),
            "raster source {} has no levels",
            backend.name()
        );
        for (i, level) in levels.iter().enumerate() {
            ensure!(
                level.index() == i,
                "raster source {} level at {i} claims index {}",
                backend.name(),
                level.index()
            );
        }
        for pair in levels.windows(2) {
            ensure!(
                pair[1].post_delta_longitude() <= pair[0].post_delta_longitude()
                    && pair[1].post_delta_latitude() <= pair[0].post_delta_latitude(),
                "raster source {} levels must be ordered coarsest first",
                backend.name()
            );
        }
        Ok(Self {
            backend,
            active: FxHashMap::default(),
            status: FxHashMap::default(),
        })
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn RasterBackend<Texel = T>> {
        &self.backend
    }

    pub fn levels(&self) -> &[RasterLevel] {
        self.backend.levels()
    }

    pub fn level(&self, index: usize) -> Result<&RasterLevel> {
        self.backend.levels().get(index).ok_or_else(|| {
            anyhow!(
                "raster source {} has no level {index}",
                self.backend.name()
            )
        })
    }

    /// The same tile handle comes back for the same identifier while it stays active.
    pub fn get_tile(&self, tile: &RasterTileIdentifier) -> Result<Arc<RasterTile<T>>> {
        let level = self.level(tile.level)?;
        ensure!(
            level.contains_tile(tile),
            "tile {tile} is outside of raster source {}",
            self.backend.name()
        );
        if let Some(active) = self.active.get(tile) {
            return Ok(active.clone());
        }
        Ok(Arc::new(RasterTile::inactive(
            *tile,
            level.tile_data_extent(tile),
            self.status(tile),
        )))
    }

    pub fn status(&self, tile: &RasterTileIdentifier) -> TileStatus {
        if self.active.contains_key(tile) {
            return TileStatus::Loaded;
        }
        self.status
            .get(tile)
            .copied()
            .unwrap_or(TileStatus::NotRequested)
    }

    /// Record progress of a tile that is not resident. Use `activate_tile` to load.
    pub fn set_status(&mut self, tile: &RasterTileIdentifier, status: TileStatus) -> Result<()> {
        ensure!(
            status != TileStatus::Loaded,
            "tile {tile} must be activated with texels to become loaded"
        );
        ensure!(
            !self.active.contains_key(tile),
            "tile {tile} is active; deactivate it before changing its status"
        );
        if status == TileStatus::NotRequested {
            self.status.remove(tile);
        } else {
            self.status.insert(*tile, status);
        }
        Ok(())
    }

    pub fn activate_tile(
        &mut self,
        tile: &RasterTileIdentifier,
        texels: TileTexels<T>,
    ) -> Result<Arc<RasterTile<T>>> {
        let level = self.level(tile.level)?;
        ensure!(
            level.contains_tile(tile),
            "tile {tile} is outside of raster source {}",
            self.backend.name()
        );
        let extent = level.tile_data_extent(tile);
        ensure!(
            texels.width() as i32 == extent.width() && texels.height() as i32 == extent.height(),
            "tile {tile} loaded {}x{} texels, expected {}x{}",
            texels.width(),
            texels.height(),
            extent.width(),
            extent.height()
        );
        let active = Arc::new(RasterTile::active(*tile, extent, texels));
        self.status.remove(tile);
        self.active.insert(*tile, active.clone());
        Ok(active)
    }

    /// Drop a tile's samples. It reverts to `NotRequested` and may be loaded again.
    pub fn deactivate_tile(&mut self, tile: &RasterTileIdentifier) -> Option<Arc<RasterTile<T>>> {
        self.active.remove(tile)
    }

    pub fn active_texels(&self, tile: &RasterTileIdentifier) -> Option<&TileTexels<T>> {
        self.active.get(tile).and_then(|t| t.texels())
    }

    pub fn active_tiles(&self) -> impl Iterator<Item = &RasterTileIdentifier> + '_ {
        self.active.keys()
    }

    pub fn active_tile_count(&self) -> usize {
        self.active.len()
    }

    pub fn tile_data_extent(&self, tile: &RasterTileIdentifier) -> Result<PostExtent> {
        Ok(self.level(tile.level)?.tile_data_extent(tile))
    }

    /// Blocking load from the backend.
    pub fn load_tile_texture(
        &self,
        tile: &RasterTileIdentifier,
    ) -> Result<TileTexels<T>, TileLoadError> {
        let level = self.level(tile.level).map_err(TileLoadError::permanent)?;
        if !level.contains_tile(tile) {
            return Err(TileLoadError::permanent(anyhow!(
                "tile {tile} is outside of raster source {}",
                self.backend.name()
            )));
        }
        self.backend.load_tile(level, tile)
    }
}
