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
// Moves texels into the clip levels as their windows slide.
//
// Every frame, for each layer (heights, then imagery):
//   * drain finished tile loads and activate them;
//   * for every level, coarse to fine, write the strips the window exposed, from resident
//     tiles where we have them and from the coarser level where we do not;
//   * write each newly arrived tile, and repaint the placeholders of its unloaded
//     descendants from it;
//   * ask for the tiles the windows now need, coarse first, and cancel or evict the ones
//     they no longer do.
use crate::{
    config::{ClipmapConfig, RetryPolicy},
    level::{ClipmapLayer, ClipmapLevel},
    normals::update_normals,
    tile_loader::{InFlightRequest, TileLoader},
    update::{split_update_to_avoid_wrapping, ClipmapUpdate},
    upsample::Upsampler,
};
use anyhow::{anyhow, Result};
use fxhash::{FxHashMap, FxHashSet};
use geodesy::Ellipsoid;
use log::{debug, trace, warn};
use raster::{
    PostExtent, RasterBackend, RasterLevel, RasterSource, RasterTileIdentifier, Texel,
    TileLoadError, TileStatus,
};
use smallvec::SmallVec;
use std::{
    collections::{BTreeMap, BTreeSet},
    marker::PhantomData,
    ops::AddAssign,
    sync::Arc,
};

/// Per frame inputs shared by every layer.
#[derive(Clone, Copy, Debug)]
pub struct UpdateContext {
    pub frame: u64,
    pub ellipsoid: Ellipsoid,
    pub height_exaggeration: f32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateStats {
    pub levels_updated: usize,
    pub full_reloads: usize,
    pub texture_copies: usize,
    pub placeholder_fills: usize,
    pub texels_written: usize,
    pub normals_updated: usize,
    pub tiles_requested: usize,
    pub tiles_loaded: usize,
    pub tiles_retried: usize,
    pub tiles_unavailable: usize,
    pub tiles_cancelled: usize,
    pub tiles_evicted: usize,
    pub stale_completions: usize,
    pub tiles_in_flight: usize,
    pub active_tiles: usize,
}

impl UpdateStats {
    /// Rectangles written into any texture, from tiles or placeholders.
    pub fn texture_writes(&self) -> usize {
        self.texture_copies + self.placeholder_fills
    }
}

impl AddAssign for UpdateStats {
    fn add_assign(&mut self, other: Self) {
        self.levels_updated += other.levels_updated;
        self.full_reloads += other.full_reloads;
        self.texture_copies += other.texture_copies;
        self.placeholder_fills += other.placeholder_fills;
        self.texels_written += other.texels_written;
        self.normals_updated += other.normals_updated;
        self.tiles_requested += other.tiles_requested;
        self.tiles_loaded += other.tiles_loaded;
        self.tiles_retried += other.tiles_retried;
        self.tiles_unavailable += other.tiles_unavailable;
        self.tiles_cancelled += other.tiles_cancelled;
        self.tiles_evicted += other.tiles_evicted;
        self.stale_completions += other.stale_completions;
        self.tiles_in_flight += other.tiles_in_flight;
        self.active_tiles += other.active_tiles;
    }
}

/// Selects one layer of a clip level, so that heights and imagery share the streaming code.
pub trait LayerAccess: 'static {
    type Texel: Texel;
    const NAME: &'static str;

    fn layer(level: &ClipmapLevel) -> Option<&ClipmapLayer<Self::Texel>>;
    fn layer_mut(level: &mut ClipmapLevel) -> Option<&mut ClipmapLayer<Self::Texel>>;

    /// Runs after texels in `region` of `level` were rewritten.
    fn texels_changed(
        _level: &mut ClipmapLevel,
        _raster_level: &RasterLevel,
        _region: &PostExtent,
        _context: &UpdateContext,
    ) -> usize {
        0
    }
}

pub struct HeightLayer;

impl LayerAccess for HeightLayer {
    type Texel = f32;
    const NAME: &'static str = "terrain";

    fn layer(level: &ClipmapLevel) -> Option<&ClipmapLayer<f32>> {
        Some(level.terrain())
    }

    fn layer_mut(level: &mut ClipmapLevel) -> Option<&mut ClipmapLayer<f32>> {
        Some(level.terrain_mut())
    }

    fn texels_changed(
        level: &mut ClipmapLevel,
        raster_level: &RasterLevel,
        region: &PostExtent,
        context: &UpdateContext,
    ) -> usize {
        let (heights, normals) = level.terrain_and_normals_mut();
        update_normals(
            heights,
            normals,
            raster_level,
            region,
            &context.ellipsoid,
            context.height_exaggeration,
        )
    }
}

pub struct ImageryLayer;

impl LayerAccess for ImageryLayer {
    type Texel = [u8; 4];
    const NAME: &'static str = "imagery";

    fn layer(level: &ClipmapLevel) -> Option<&ClipmapLayer<[u8; 4]>> {
        level.imagery()
    }

    fn layer_mut(level: &mut ClipmapLevel) -> Option<&mut ClipmapLayer<[u8; 4]>> {
        level.imagery_mut()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct RetryState {
    failures: u32,
    next_attempt_frame: u64,
}

// Each finer level has twice the posts per degree, the same origin, and the same tile size, so
// a tile's children are its four quadrants.
fn is_quadtree_refinement(parent: &RasterLevel, child: &RasterLevel) -> bool {
    let close = |a: f64, b: f64| (a - b).abs() <= 1e-9 * a.abs().max(b.abs());
    close(parent.post_delta_longitude(), child.post_delta_longitude() * 2.)
        && close(parent.post_delta_latitude(), child.post_delta_latitude() * 2.)
        && parent.extent().west() == child.extent().west()
        && parent.extent().south() == child.extent().south()
        && parent.longitude_posts_per_tile() == child.longitude_posts_per_tile()
        && parent.latitude_posts_per_tile() == child.latitude_posts_per_tile()
}

/// Streams one raster source into one layer of every clip level.
pub struct LayerUpdater<A: LayerAccess> {
    source: RasterSource<A::Texel>,
    loader: TileLoader<A::Texel>,
    in_flight: FxHashMap<RasterTileIdentifier, InFlightRequest>,
    retries: FxHashMap<RasterTileIdentifier, RetryState>,
    max_requests_in_flight: usize,
    max_active_tiles: usize,
    retry_policy: RetryPolicy,
    _layer: PhantomData<fn() -> A>,
}

impl<A: LayerAccess> LayerUpdater<A> {
    pub fn new(
        backend: Arc<dyn RasterBackend<Texel = A::Texel>>,
        config: &ClipmapConfig,
    ) -> Result<Self> {
        let source = RasterSource::new(backend.clone())?;
        let loader = if config.background_loading() {
            TileLoader::background(backend)?
        } else {
            TileLoader::inline(backend)
        };
        debug!(
            "{} layer streaming {} with {} levels ({})",
            A::NAME,
            source.name(),
            source.levels().len(),
            if loader.is_background() {
                "background"
            } else {
                "inline"
            }
        );
        Ok(Self {
            source,
            loader,
            in_flight: FxHashMap::default(),
            retries: FxHashMap::default(),
            max_requests_in_flight: config.max_requests_in_flight(),
            max_active_tiles: config.max_active_tiles(),
            retry_policy: *config.retry_policy(),
            _layer: PhantomData,
        })
    }

    pub fn source(&self) -> &RasterSource<A::Texel> {
        &self.source
    }

    pub fn tiles_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn update(
        &mut self,
        levels: &mut [ClipmapLevel],
        context: &UpdateContext,
        stats: &mut UpdateStats,
    ) -> Result<()> {
        let arrived = self.drain_completions(context.frame, stats)?;
        for index in 0..levels.len() {
            self.update_level(levels, index, context, stats)?;
        }
        self.apply_new_tiles(levels, &arrived, context, stats)?;
        self.request_tile_residency(levels, context.frame, stats)?;
        stats.tiles_in_flight += self.in_flight.len();
        stats.active_tiles += self.source.active_tile_count();
        Ok(())
    }

    fn drain_completions(
        &mut self,
        frame: u64,
        stats: &mut UpdateStats,
    ) -> Result<Vec<RasterTileIdentifier>> {
        let mut completions = Vec::new();
        self.loader.drain(|completion| completions.push(completion));

        let mut arrived = Vec::new();
        for completion in completions {
            let tile = completion.tile;
            // If the tile was cancelled or re-requested since, dump the result on the floor.
            let expected = self.in_flight.get(&tile).map(|r| r.generation());
            if expected != Some(completion.generation) {
                trace!("{} discarding stale load of {}", A::NAME, tile);
                stats.stale_completions += 1;
                continue;
            }
            self.in_flight.remove(&tile);
            match completion.result {
                Ok(texels) => match self.source.activate_tile(&tile, texels) {
                    Ok(_) => {
                        self.retries.remove(&tile);
                        stats.tiles_loaded += 1;
                        arrived.push(tile);
                    }
                    Err(e) => {
                        warn!("{} tile {} is unusable: {}", A::NAME, tile, e);
                        self.source.set_status(&tile, TileStatus::Unavailable)?;
                        stats.tiles_unavailable += 1;
                    }
                },
                Err(err) => self.handle_failure(tile, err, frame, stats)?,
            }
        }
        Ok(arrived)
    }

    fn handle_failure(
        &mut self,
        tile: RasterTileIdentifier,
        err: TileLoadError,
        frame: u64,
        stats: &mut UpdateStats,
    ) -> Result<()> {
        let retry = self.retries.entry(tile).or_default();
        retry.failures += 1;
        if !err.is_permanent() && self.retry_policy.should_retry(retry.failures) {
            let delay = self.retry_policy.delay_frames(retry.failures);
            retry.next_attempt_frame = frame + delay;
            debug!(
                "{} tile {} failed ({}), retrying in {} frames",
                A::NAME,
                tile,
                err,
                delay
            );
            self.source.set_status(&tile, TileStatus::NotRequested)?;
            stats.tiles_retried += 1;
        } else {
            warn!("{} tile {} is unavailable: {}", A::NAME, tile, err);
            self.retries.remove(&tile);
            self.source.set_status(&tile, TileStatus::Unavailable)?;
            stats.tiles_unavailable += 1;
        }
        Ok(())
    }

    /// Bring one level's layer from its current to its next extent.
    pub fn update_level(
        &self,
        levels: &mut [ClipmapLevel],
        index: usize,
        context: &UpdateContext,
        stats: &mut UpdateStats,
    ) -> Result<()> {
        let (coarser_levels, rest) = levels.split_at_mut(index);
        let level = &mut rest[0];
        let coarser = coarser_levels.last().and_then(A::layer);
        let layer = match A::layer_mut(level) {
            Some(layer) => layer,
            None => return Ok(()),
        };
        if layer.is_current() {
            return Ok(());
        }

        let next = *layer.next_extent();
        let (width, height) = layer.size();
        let mut regions = SmallVec::<[PostExtent; 2]>::new();
        let origin = match layer.current_extent().copied() {
            Some(current)
                if (next.west - current.west).abs() < width
                    && (next.south - current.south).abs() < height =>
            {
                let dx = next.west - current.west;
                let dy = next.south - current.south;
                let origin = layer.origin_in_texture();

                // Columns exposed on the east or west, over every row of the new window.
                let (kept_west, kept_east) = if dx > 0 {
                    regions.push(PostExtent::new(
                        current.east + 1,
                        next.south,
                        next.east,
                        next.north,
                    ));
                    (next.west, current.east)
                } else if dx < 0 {
                    regions.push(PostExtent::new(
                        next.west,
                        next.south,
                        current.west - 1,
                        next.north,
                    ));
                    (current.west, next.east)
                } else {
                    (next.west, next.east)
                };
                // Rows exposed on the north or south, minus the columns written above.
                if dy > 0 {
                    regions.push(PostExtent::new(
                        kept_west,
                        current.north + 1,
                        kept_east,
                        next.north,
                    ));
                } else if dy < 0 {
                    regions.push(PostExtent::new(
                        kept_west,
                        next.south,
                        kept_east,
                        current.south - 1,
                    ));
                }
                (
                    (origin.0 + dx).rem_euclid(width),
                    (origin.1 + dy).rem_euclid(height),
                )
            }
            _ => {
                stats.full_reloads += 1;
                regions.push(next);
                (0, 0)
            }
        };
        layer.commit(origin);

        for region in &regions {
            self.write_region(layer, coarser, &ClipmapUpdate::new(index, *region), stats)?;
        }
        stats.levels_updated += 1;

        let raster_level = self.source.level(layer.raster_level())?;
        for region in &regions {
            stats.normals_updated += A::texels_changed(level, raster_level, region, context);
        }
        Ok(())
    }

    // Copy the texels of `update` into `layer`, tile by tile, falling back to the coarser
    // level for tiles that are not resident.
    fn write_region(
        &self,
        layer: &mut ClipmapLayer<A::Texel>,
        coarser: Option<&ClipmapLayer<A::Texel>>,
        update: &ClipmapUpdate,
        stats: &mut UpdateStats,
    ) -> Result<()> {
        let raster_level = self.source.level(layer.raster_level())?;
        let coarser = match coarser {
            Some(coarser) => Some((coarser, self.source.level(coarser.raster_level())?)),
            None => None,
        };
        let upsampler = Upsampler::new(coarser, raster_level);
        let window = *layer
            .current_extent()
            .ok_or_else(|| anyhow!("{} layer written before its first commit", A::NAME))?;

        let pieces = split_update_to_avoid_wrapping(
            update,
            &window,
            layer.origin_in_texture(),
            layer.size(),
        );
        for piece in &pieces {
            for region in raster_level.get_tiles_in_extent(piece.extent()) {
                let posts = region.level_extent(raster_level);
                let mut row = vec![A::Texel::default(); posts.width() as usize];
                let texels = if raster_level.contains_tile(&region.tile) {
                    self.source.active_texels(&region.tile)
                } else {
                    None
                };
                match texels {
                    Some(texels) => {
                        let data = raster_level.tile_data_extent(&region.tile);
                        let covered = data.west <= posts.west && data.east >= posts.east;
                        for y in posts.south..=posts.north {
                            if covered && y <= data.north {
                                let src = texels.row((y - data.south) as u32);
                                let start = (posts.west - data.west) as usize;
                                let len = row.len();
                                row.copy_from_slice(&src[start..start + len]);
                            } else {
                                for (i, texel) in row.iter_mut().enumerate() {
                                    let x = posts.west + i as i32;
                                    *texel = texels
                                        .get(x - data.west, y - data.south)
                                        .unwrap_or_else(|| upsampler.sample(x, y));
                                }
                            }
                            layer.write_row(posts.west, y, &row);
                        }
                        stats.texture_copies += 1;
                    }
                    None => {
                        for y in posts.south..=posts.north {
                            upsampler.fill_row(posts.west, y, &mut row);
                            layer.write_row(posts.west, y, &row);
                        }
                        stats.placeholder_fills += 1;
                    }
                }
                stats.texels_written += posts.area() as usize;
            }
        }
        Ok(())
    }

    // Rewrite `region` of raster level `raster_level` in every clip level showing it. Returns
    // whether any window intersected the region.
    fn refresh_region(
        &self,
        levels: &mut [ClipmapLevel],
        raster_level: usize,
        region: &PostExtent,
        context: &UpdateContext,
        stats: &mut UpdateStats,
    ) -> Result<bool> {
        let mut touched = false;
        for index in 0..levels.len() {
            let (coarser_levels, rest) = levels.split_at_mut(index);
            let level = &mut rest[0];
            let coarser = coarser_levels.last().and_then(A::layer);
            let layer = match A::layer_mut(level) {
                Some(layer) if layer.raster_level() == raster_level => layer,
                _ => continue,
            };
            let clipped = match layer
                .current_extent()
                .and_then(|extent| region.intersection(extent))
            {
                Some(clipped) => clipped,
                None => continue,
            };
            self.write_region(layer, coarser, &ClipmapUpdate::new(index, clipped), stats)?;
            let raster = self.source.level(raster_level)?;
            stats.normals_updated += A::texels_changed(level, raster, &clipped, context);
            touched = true;
        }
        Ok(touched)
    }

    fn child_tiles(&self, tile: &RasterTileIdentifier) -> Vec<RasterTileIdentifier> {
        let (parent, child) = match (
            self.source.levels().get(tile.level),
            self.source.levels().get(tile.level + 1),
        ) {
            (Some(parent), Some(child)) => (parent, child),
            _ => return Vec::new(),
        };
        if is_quadtree_refinement(parent, child) {
            return tile
                .children()
                .into_iter()
                .filter(|c| child.contains_tile(c))
                .collect();
        }
        // Otherwise, every child level tile under the parent's footprint.
        let footprint = parent.tile_data_extent(tile);
        let to_child = |x: i32, y: i32| {
            (
                child.longitude_to_index(parent.index_to_longitude(x as f64)),
                child.latitude_to_index(parent.index_to_latitude(y as f64)),
            )
        };
        let (west, south) = to_child(footprint.west, footprint.south);
        let (east, north) = to_child(footprint.east, footprint.north);
        let extent = PostExtent::new(
            west.floor() as i32,
            south.floor() as i32,
            east.ceil() as i32,
            north.ceil() as i32,
        );
        match extent.intersection(&child.post_extent()) {
            Some(extent) => child
                .get_tiles_in_extent(&extent)
                .into_iter()
                .map(|r| r.tile)
                .filter(|t| child.contains_tile(t))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Write freshly loaded tiles, each with a one post margin so that the seams against its
    /// neighbors are rebuilt, then repaint unloaded descendants from them. Each raster level
    /// is finished before the next finer one, so that descendants upsample from a coarser
    /// level that is already up to date.
    pub fn apply_new_tiles(
        &self,
        levels: &mut [ClipmapLevel],
        tiles: &[RasterTileIdentifier],
        context: &UpdateContext,
        stats: &mut UpdateStats,
    ) -> Result<()> {
        let mut dirty = BTreeMap::<usize, BTreeSet<RasterTileIdentifier>>::new();
        for tile in tiles {
            dirty.entry(tile.level).or_default().insert(*tile);
        }
        while let Some((raster_level, tiles)) = dirty.pop_first() {
            for tile in tiles {
                let region = self.source.tile_data_extent(&tile)?.expanded(1);
                if !self.refresh_region(levels, raster_level, &region, context, stats)? {
                    continue;
                }
                for child in self.child_tiles(&tile) {
                    // Loaded tiles already hold better data than their parent could give them.
                    if self.source.status(&child) != TileStatus::Loaded {
                        dirty.entry(child.level).or_default().insert(child);
                    }
                }
            }
        }
        Ok(())
    }

    /// Ask for every tile under a clip window, coarse levels first, within the request
    /// budget. Cancel requests and evict tiles that no window wants any more.
    pub fn request_tile_residency(
        &mut self,
        levels: &[ClipmapLevel],
        frame: u64,
        stats: &mut UpdateStats,
    ) -> Result<()> {
        let mut wanted = FxHashSet::default();
        let mut ordered = Vec::new();
        for level in levels {
            let layer = match A::layer(level) {
                Some(layer) => layer,
                None => continue,
            };
            let raster_level = self.source.level(layer.raster_level())?;
            let extent = match layer
                .current_extent()
                .and_then(|extent| extent.intersection(&raster_level.post_extent()))
            {
                Some(extent) => extent,
                None => continue,
            };
            for region in raster_level.get_tiles_in_extent(&extent) {
                if wanted.insert(region.tile) {
                    ordered.push(region.tile);
                }
            }
        }

        let unwanted = self
            .in_flight
            .keys()
            .filter(|tile| !wanted.contains(*tile))
            .copied()
            .collect::<Vec<_>>();
        for tile in unwanted {
            if let Some(request) = self.in_flight.remove(&tile) {
                request.cancel();
            }
            self.source.set_status(&tile, TileStatus::NotRequested)?;
            stats.tiles_cancelled += 1;
        }
        self.retries.retain(|tile, _| wanted.contains(tile));

        for tile in ordered {
            if self.in_flight.len() >= self.max_requests_in_flight {
                break;
            }
            if self.source.get_tile(&tile)?.status() != TileStatus::NotRequested {
                continue;
            }
            if let Some(retry) = self.retries.get(&tile) {
                if retry.next_attempt_frame > frame {
                    continue;
                }
            }
            self.source.set_status(&tile, TileStatus::Loading)?;
            let request = self.loader.request(tile);
            self.in_flight.insert(tile, request);
            stats.tiles_requested += 1;
        }

        let active = self.source.active_tile_count();
        if active > self.max_active_tiles {
            let mut evictable = self
                .source
                .active_tiles()
                .filter(|tile| !wanted.contains(*tile))
                .copied()
                .collect::<Vec<_>>();
            // Finest first; they are the cheapest to do without.
            evictable.sort_by(|a, b| b.cmp(a));
            for tile in evictable.into_iter().take(active - self.max_active_tiles) {
                self.source.deactivate_tile(&tile);
                stats.tiles_evicted += 1;
            }
        }
        Ok(())
    }
}

/// Streams heights, and imagery if there is any, into the clip levels.
pub struct ClipmapUpdater {
    terrain: LayerUpdater<HeightLayer>,
    imagery: Option<LayerUpdater<ImageryLayer>>,
}

impl ClipmapUpdater {
    pub fn new(
        terrain: Arc<dyn RasterBackend<Texel = f32>>,
        imagery: Option<Arc<dyn RasterBackend<Texel = [u8; 4]>>>,
        config: &ClipmapConfig,
    ) -> Result<Self> {
        Ok(Self {
            terrain: LayerUpdater::new(terrain, config)?,
            imagery: match imagery {
                Some(imagery) => Some(LayerUpdater::new(imagery, config)?),
                None => None,
            },
        })
    }

    pub fn terrain(&self) -> &LayerUpdater<HeightLayer> {
        &self.terrain
    }

    pub fn imagery(&self) -> Option<&LayerUpdater<ImageryLayer>> {
        self.imagery.as_ref()
    }

    pub fn update(
        &mut self,
        levels: &mut [ClipmapLevel],
        context: &UpdateContext,
    ) -> Result<UpdateStats> {
        let mut stats = UpdateStats::default();
        self.terrain.update(levels, context, &mut stats)?;
        if let Some(imagery) = self.imagery.as_mut() {
            imagery.update(levels, context, &mut stats)?;
        }
        trace!(
            "clipmap f:{} lv:{} cp:{} ph:{} +:{} ld:{} x:{} ev:{} out:{}",
            context.frame,
            stats.levels_updated,
            stats.texture_copies,
            stats.placeholder_fills,
            stats.tiles_requested,
            stats.tiles_loaded,
            stats.tiles_cancelled,
            stats.tiles_evicted,
            stats.tiles_in_flight,
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::terrain::coarser_extent;
    use approx::assert_relative_eq;
    use geodesy::{GeodeticExtent, WGS84};
    use raster::{FailureKind, TileTexels};
    use parking_lot::Mutex;

    // Heights are linear in degrees, so bilinear upsampling from a coarser level is exact, plus
    // a per-level offset so that upsampled texels can be told apart from loaded ones.
    fn height(longitude: f64, latitude: f64, level: usize) -> f32 {
        (longitude + 10. * latitude + 1000. * level as f64) as f32
    }

    struct ScriptedBackend {
        levels: Vec<RasterLevel>,
        failures: Mutex<FxHashMap<usize, (FailureKind, u32)>>,
        attempts: Mutex<FxHashMap<RasterTileIdentifier, u32>>,
    }

    impl ScriptedBackend {
        fn new(levels: Vec<RasterLevel>) -> Self {
            Self {
                levels,
                failures: Mutex::new(FxHashMap::default()),
                attempts: Mutex::new(FxHashMap::default()),
            }
        }

        // The first `count` loads of each tile on `level` fail.
        fn fail_level(self, level: usize, kind: FailureKind, count: u32) -> Self {
            self.failures.lock().insert(level, (kind, count));
            self
        }

        fn attempts(&self, tile: &RasterTileIdentifier) -> u32 {
            self.attempts
                .lock()
                .get(tile)
                .copied()
                .unwrap_or(0)
        }
    }

    impl RasterBackend for ScriptedBackend {
        type Texel = f32;

        fn name(&self) -> &str {
            "scripted"
        }

        fn extent(&self) -> GeodeticExtent {
            *self.levels[0].extent()
        }

        fn levels(&self) -> &[RasterLevel] {
            &self.levels
        }

        fn load_tile(
            &self,
            level: &RasterLevel,
            tile: &RasterTileIdentifier,
        ) -> Result<TileTexels<f32>, TileLoadError> {
            let attempt = {
                let mut attempts = self.attempts.lock();
                let attempt = attempts.entry(*tile).or_insert(0);
                *attempt += 1;
                *attempt
            };
            if let Some((kind, count)) = self.failures.lock().get(&tile.level) {
                if attempt <= *count {
                    return Err(match kind {
                        FailureKind::Transient => TileLoadError::transient(anyhow!("timed out")),
                        FailureKind::Permanent => TileLoadError::permanent(anyhow!("no such tile")),
                    });
                }
            }
            let extent = level.tile_data_extent(tile);
            let mut texels = Vec::new();
            for y in extent.south..=extent.north {
                for x in extent.west..=extent.east {
                    texels.push(height(
                        level.index_to_longitude(x as f64),
                        level.index_to_latitude(y as f64),
                        tile.level,
                    ));
                }
            }
            TileTexels::new(extent.width() as u32, extent.height() as u32, texels)
                .map_err(TileLoadError::permanent)
        }
    }

    fn config() -> ClipmapConfig {
        ClipmapConfig::default()
            .with_clipmap_posts(31)
            .with_background_loading(false)
            .with_max_requests_in_flight(64)
            .with_retry_policy(RetryPolicy::new(4, 1, 1))
    }

    fn context(frame: u64) -> UpdateContext {
        UpdateContext {
            frame,
            ellipsoid: *WGS84,
            height_exaggeration: 1.,
        }
    }

    fn clip_levels(count: usize) -> Result<Vec<ClipmapLevel>> {
        (0..count)
            .map(|index| ClipmapLevel::new(index, 31, None))
            .collect()
    }

    // Put the finest window at (west, south) and nest the coarser windows around it.
    fn place(
        levels: &mut [ClipmapLevel],
        config: &ClipmapConfig,
        west: i32,
        south: i32,
    ) -> Result<()> {
        let finest = levels.len() - 1;
        let mut extent = PostExtent::from_origin_and_size(west, south, 31, 31);
        levels[finest].terrain_mut().set_next_extent(extent)?;
        for index in (0..finest).rev() {
            let (coarser, on_east, on_north) = coarser_extent(&extent, config);
            levels[index].terrain_mut().set_next_extent(coarser)?;
            levels[index].set_offset_strips(on_east, on_north);
            extent = coarser;
        }
        Ok(())
    }

    fn assert_window(levels: &[ClipmapLevel], rasters: &[RasterLevel], index: usize, offset: usize) {
        let layer = levels[index].terrain();
        let raster = &rasters[index];
        let extent = *layer.current_extent().unwrap();
        for y in extent.south..=extent.north {
            for x in extent.west..=extent.east {
                let expected = height(
                    raster.index_to_longitude(x as f64),
                    raster.index_to_latitude(y as f64),
                    offset,
                );
                assert_relative_eq!(layer.sample(x, y).unwrap(), expected, epsilon = 1e-2);
            }
        }
    }

    fn rasters(count: usize) -> Result<Vec<RasterLevel>> {
        RasterLevel::pyramid(GeodeticExtent::whole_globe(), count, 129, 65, 16)
    }

    #[test]
    fn test_loads_then_goes_quiet() -> Result<()> {
        let config = config();
        let rasters = rasters(2)?;
        let backend = Arc::new(ScriptedBackend::new(rasters.clone()));
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(2)?;
        place(&mut levels, &config, 100, 40)?;

        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(0), &mut stats)?;
        assert_eq!(stats.full_reloads, 2);
        assert_eq!(stats.tiles_requested, 18);

        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(1), &mut stats)?;
        assert_eq!(stats.tiles_loaded, 18);
        assert!(stats.texture_copies > 0);
        assert!(stats.normals_updated > 0);
        assert_window(&levels, &rasters, 0, 0);
        assert_window(&levels, &rasters, 1, 1);

        // Nothing moved and nothing arrived, so nothing is written.
        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(2), &mut stats)?;
        assert_eq!(stats.texture_writes(), 0);
        assert_eq!(stats.tiles_requested, 0);
        assert_eq!(stats.levels_updated, 0);
        Ok(())
    }

    #[test]
    fn test_tile_handles_follow_residency() -> Result<()> {
        let config = config();
        let rasters = rasters(2)?;
        let backend = Arc::new(ScriptedBackend::new(rasters.clone()));
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(2)?;
        place(&mut levels, &config, 100, 40)?;
        let window = PostExtent::from_origin_and_size(100, 40, 31, 31);
        let tiles = rasters[1]
            .get_tiles_in_extent(&window)
            .into_iter()
            .map(|region| region.tile)
            .collect::<Vec<_>>();
        assert_eq!(tiles.len(), 9);
        for tile in &tiles {
            assert_eq!(updater.source().get_tile(tile)?.status(), TileStatus::NotRequested);
        }

        updater.update(&mut levels, &context(0), &mut UpdateStats::default())?;
        for tile in &tiles {
            assert_eq!(updater.source().get_tile(tile)?.status(), TileStatus::Loading);
        }

        updater.update(&mut levels, &context(1), &mut UpdateStats::default())?;
        let handles = tiles
            .iter()
            .map(|tile| updater.source().get_tile(tile))
            .collect::<Result<Vec<_>>>()?;
        assert!(handles.iter().all(|h| h.status() == TileStatus::Loaded));

        // Settled tiles stay loaded, behind the same handle.
        for frame in 2..5 {
            updater.update(&mut levels, &context(frame), &mut UpdateStats::default())?;
        }
        for (tile, handle) in tiles.iter().zip(&handles) {
            assert!(Arc::ptr_eq(&updater.source().get_tile(tile)?, handle));
        }
        Ok(())
    }

    #[test]
    fn test_incremental_shift() -> Result<()> {
        let config = config();
        let rasters = rasters(2)?;
        let backend = Arc::new(ScriptedBackend::new(rasters.clone()));
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(2)?;
        place(&mut levels, &config, 100, 40)?;
        for frame in 0..2 {
            updater.update(&mut levels, &context(frame), &mut UpdateStats::default())?;
        }

        place(&mut levels, &config, 102, 36)?;
        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(2), &mut stats)?;
        assert_eq!(stats.full_reloads, 0);
        assert_eq!(levels[1].terrain().origin_in_texture(), (2, 27));
        assert_window(&levels, &rasters, 0, 0);
        assert_window(&levels, &rasters, 1, 1);
        Ok(())
    }

    #[test]
    fn test_unavailable_tiles_inherit_from_parent() -> Result<()> {
        let config = config();
        let rasters = rasters(2)?;
        let backend = Arc::new(
            ScriptedBackend::new(rasters.clone())
                .fail_level(0, FailureKind::Transient, 1)
                .fail_level(1, FailureKind::Permanent, 1),
        );
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(2)?;
        place(&mut levels, &config, 100, 40)?;

        // Frame 1 hears of the failures, frame 2 retries the coarse tiles, frame 3 applies them.
        for frame in 0..4 {
            updater.update(&mut levels, &context(frame), &mut UpdateStats::default())?;
        }
        let fine = RasterTileIdentifier::new(1, 7, 3);
        assert_eq!(updater.source().status(&fine), TileStatus::Unavailable);
        assert_window(&levels, &rasters, 0, 0);
        // The fine level shows its parent's data, not a hole.
        assert_window(&levels, &rasters, 1, 0);

        // Newly exposed fine posts fall back to the coarse level as well.
        place(&mut levels, &config, 104, 40)?;
        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(4), &mut stats)?;
        assert!(stats.placeholder_fills > 0);
        assert_window(&levels, &rasters, 1, 0);
        Ok(())
    }

    #[test]
    fn test_loaded_children_are_not_overwritten() -> Result<()> {
        let config = config();
        let rasters = rasters(2)?;
        let backend = Arc::new(
            ScriptedBackend::new(rasters.clone()).fail_level(0, FailureKind::Transient, 1),
        );
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(2)?;
        place(&mut levels, &config, 100, 40)?;

        // The fine tiles arrive on frame 1, their parents not until frame 3.
        let mut arrived = Vec::new();
        for frame in 0..4 {
            let mut stats = UpdateStats::default();
            updater.update(&mut levels, &context(frame), &mut stats)?;
            arrived.push(stats.tiles_loaded);
        }
        assert_eq!(arrived, vec![0, 9, 0, 9]);
        assert_window(&levels, &rasters, 0, 0);
        assert_window(&levels, &rasters, 1, 1);
        Ok(())
    }

    #[test]
    fn test_transient_failures_back_off() -> Result<()> {
        let config = config().with_retry_policy(RetryPolicy::new(4, 2, 8));
        let rasters = vec![RasterLevel::new(
            0,
            GeodeticExtent::whole_globe(),
            33,
            17,
            64,
            64,
        )?];
        let backend = Arc::new(
            ScriptedBackend::new(rasters).fail_level(0, FailureKind::Transient, 2),
        );
        let mut updater = LayerUpdater::<HeightLayer>::new(backend.clone(), &config)?;
        let mut levels = clip_levels(1)?;
        place(&mut levels, &config, 0, 0)?;
        let tile = RasterTileIdentifier::new(0, 0, 0);

        let mut retried = 0;
        let mut loaded = 0;
        let mut attempts = Vec::new();
        for frame in 0..10 {
            let mut stats = UpdateStats::default();
            updater.update(&mut levels, &context(frame), &mut stats)?;
            retried += stats.tiles_retried;
            loaded += stats.tiles_loaded;
            attempts.push(backend.attempts(&tile));
        }
        // Retries wait 2 frames, then 4.
        assert_eq!(attempts, vec![1, 1, 1, 2, 2, 2, 2, 2, 3, 3]);
        assert_eq!(retried, 2);
        assert_eq!(loaded, 1);
        assert_eq!(updater.source().status(&tile), TileStatus::Loaded);
        Ok(())
    }

    #[test]
    fn test_permanent_failure_is_not_retried() -> Result<()> {
        let config = config();
        let rasters = vec![RasterLevel::new(
            0,
            GeodeticExtent::whole_globe(),
            33,
            17,
            64,
            64,
        )?];
        let backend = Arc::new(
            ScriptedBackend::new(rasters).fail_level(0, FailureKind::Permanent, u32::MAX),
        );
        let mut updater = LayerUpdater::<HeightLayer>::new(backend.clone(), &config)?;
        let mut levels = clip_levels(1)?;
        place(&mut levels, &config, 0, 0)?;
        let tile = RasterTileIdentifier::new(0, 0, 0);

        let mut unavailable = 0;
        for frame in 0..8 {
            let mut stats = UpdateStats::default();
            updater.update(&mut levels, &context(frame), &mut stats)?;
            unavailable += stats.tiles_unavailable;
        }
        assert_eq!(backend.attempts(&tile), 1);
        assert_eq!(unavailable, 1);
        assert_eq!(updater.source().status(&tile), TileStatus::Unavailable);
        // The window keeps the placeholder rather than failing.
        assert_eq!(levels[0].terrain().sample(3, 3), Some(0.));
        Ok(())
    }

    #[test]
    fn test_retries_give_up() -> Result<()> {
        let config = config().with_retry_policy(RetryPolicy::new(3, 1, 1));
        let rasters = vec![RasterLevel::new(
            0,
            GeodeticExtent::whole_globe(),
            33,
            17,
            64,
            64,
        )?];
        let backend = Arc::new(
            ScriptedBackend::new(rasters).fail_level(0, FailureKind::Transient, u32::MAX),
        );
        let mut updater = LayerUpdater::<HeightLayer>::new(backend.clone(), &config)?;
        let mut levels = clip_levels(1)?;
        place(&mut levels, &config, 0, 0)?;
        let tile = RasterTileIdentifier::new(0, 0, 0);
        for frame in 0..12 {
            updater.update(&mut levels, &context(frame), &mut UpdateStats::default())?;
        }
        assert_eq!(backend.attempts(&tile), 3);
        assert_eq!(updater.source().status(&tile), TileStatus::Unavailable);
        Ok(())
    }

    #[test]
    fn test_stale_completions_are_discarded() -> Result<()> {
        let config = config();
        let rasters = vec![RasterLevel::new(
            0,
            GeodeticExtent::whole_globe(),
            1025,
            513,
            16,
            16,
        )?];
        let backend = Arc::new(ScriptedBackend::new(rasters));
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(1)?;

        let mut stats = UpdateStats::default();
        place(&mut levels, &config, 0, 0)?;
        updater.update_level(&mut levels, 0, &context(0), &mut stats)?;
        updater.request_tile_residency(&levels, 0, &mut stats)?;
        assert_eq!(stats.tiles_requested, 4);

        // The window moves away before the first loads are drained.
        let mut stats = UpdateStats::default();
        place(&mut levels, &config, 500, 200)?;
        updater.update_level(&mut levels, 0, &context(0), &mut stats)?;
        updater.request_tile_residency(&levels, 0, &mut stats)?;
        assert_eq!(stats.tiles_cancelled, 4);
        assert_eq!(stats.tiles_requested, 9);
        let abandoned = RasterTileIdentifier::new(0, 0, 0);
        assert_eq!(updater.source().status(&abandoned), TileStatus::NotRequested);

        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(1), &mut stats)?;
        assert_eq!(stats.stale_completions, 4);
        assert_eq!(stats.tiles_loaded, 9);
        assert_eq!(updater.source().status(&abandoned), TileStatus::NotRequested);
        Ok(())
    }

    #[test]
    fn test_eviction_spares_wanted_tiles() -> Result<()> {
        let config = config().with_max_active_tiles(4);
        let rasters = vec![RasterLevel::new(
            0,
            GeodeticExtent::whole_globe(),
            1025,
            513,
            16,
            16,
        )?];
        let backend = Arc::new(ScriptedBackend::new(rasters));
        let mut updater = LayerUpdater::<HeightLayer>::new(backend, &config)?;
        let mut levels = clip_levels(1)?;

        place(&mut levels, &config, 0, 0)?;
        for frame in 0..2 {
            updater.update(&mut levels, &context(frame), &mut UpdateStats::default())?;
        }
        assert_eq!(updater.source().active_tile_count(), 4);

        place(&mut levels, &config, 500, 200)?;
        updater.update(&mut levels, &context(2), &mut UpdateStats::default())?;
        let mut stats = UpdateStats::default();
        updater.update(&mut levels, &context(3), &mut stats)?;
        assert_eq!(stats.tiles_evicted, 4);
        assert_eq!(updater.source().active_tile_count(), 9);
        Ok(())
    }
}
