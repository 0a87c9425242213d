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
    config::ClipmapConfig,
    level::ClipmapLevel,
    patch::{PatchKind, PatchMeshes},
    renderer::{DrawCommand, PatchUniforms, RenderState, TerrainRenderer},
    updater::{ClipmapUpdater, UpdateContext, UpdateStats},
};
use anyhow::{anyhow, ensure, Result};
use fxhash::FxHashMap;
use geodesy::{Ellipsoid, Geodetic3D};
use log::info;
use nalgebra::Point3;
use raster::{PostExtent, RasterBackend, RasterLevel};
use std::sync::Arc;

// A level finer than the coarsest is drawn only while the viewer is lower than this many
// times the level's footprint (posts times meters per post).
const ACTIVE_LEVEL_HEIGHT_FACTOR: f64 = 0.4;

fn floor_to_even(value: f64) -> i32 {
    let floor = value.floor() as i32;
    if floor.rem_euclid(2) == 0 {
        floor
    } else {
        floor - 1
    }
}

/// The finest level's window, centered on the viewer and aligned to even posts.
pub fn finest_extent(longitude_index: f64, latitude_index: f64, clipmap_posts: i32) -> PostExtent {
    let half = (clipmap_posts / 2) as f64;
    let west = floor_to_even(longitude_index - half);
    let south = floor_to_even(latitude_index - half);
    PostExtent::from_origin_and_size(west, south, clipmap_posts, clipmap_posts)
}

/// The window of the level one coarser than `finer`, with whether its offset strips go on the
/// east and north. The finer level lands `fill_patch_segments` posts inside the coarser ring;
/// when that would leave the coarser window odd, the window grows one post to the west (or
/// south) and the strip takes up the slack on that side instead.
pub fn coarser_extent(finer: &PostExtent, config: &ClipmapConfig) -> (PostExtent, bool, bool) {
    let posts = config.clipmap_posts();
    let fill = config.fill_patch_segments();
    let align = |finer_low: i32| {
        let low = finer_low.div_euclid(2) - fill;
        if low.rem_euclid(2) == 0 {
            (low, true)
        } else {
            (low - 1, false)
        }
    };
    let (west, on_east) = align(finer.west);
    let (south, on_north) = align(finer.south);
    (
        PostExtent::from_origin_and_size(west, south, posts, posts),
        on_east,
        on_north,
    )
}

// Adjacent terrain levels must refine exactly by two from a shared origin for the coarser
// windows to line up with the finer ones.
fn validate_terrain_levels(levels: &[RasterLevel]) -> Result<()> {
    ensure!(!levels.is_empty(), "terrain source has no levels");
    for pair in levels.windows(2) {
        let (coarse, fine) = (&pair[0], &pair[1]);
        let ratio_lon = coarse.post_delta_longitude() / fine.post_delta_longitude();
        let ratio_lat = coarse.post_delta_latitude() / fine.post_delta_latitude();
        ensure!(
            (ratio_lon - 2.).abs() < 1e-9 && (ratio_lat - 2.).abs() < 1e-9,
            "terrain level {} is not twice as fine as level {}",
            fine.index(),
            coarse.index()
        );
        ensure!(
            coarse.extent().west() == fine.extent().west()
                && coarse.extent().south() == fine.extent().south(),
            "terrain level {} does not share an origin with level {}",
            fine.index(),
            coarse.index()
        );
    }
    Ok(())
}

// The coarsest imagery level at least as fine as the terrain, else the finest there is.
fn imagery_level_for(terrain: &RasterLevel, imagery: &[RasterLevel]) -> usize {
    imagery
        .iter()
        .position(|level| {
            level.post_delta_longitude() <= terrain.post_delta_longitude()
                && level.post_delta_latitude() <= terrain.post_delta_latitude()
        })
        .unwrap_or(imagery.len() - 1)
}

fn imagery_size(config: &ClipmapConfig, terrain: &RasterLevel, imagery: &RasterLevel) -> (u32, u32) {
    let segments = config.clipmap_segments() as f64;
    let size = |terrain_delta: f64, imagery_delta: f64| {
        (segments * terrain_delta / imagery_delta).round() as u32 + 1
    };
    (
        size(
            terrain.post_delta_longitude(),
            imagery.post_delta_longitude(),
        ),
        size(terrain.post_delta_latitude(), imagery.post_delta_latitude()),
    )
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RenderStats {
    pub levels_rendered: usize,
    pub finest_level_rendered: Option<usize>,
    pub coarsest_level_rendered: Option<usize>,
    pub draws: usize,
    pub triangles: usize,
    pub draws_by_kind: FxHashMap<PatchKind, usize>,
}

/// Terrain for a whole globe, drawn as nested clip levels that follow the viewer.
///
/// Each frame, `pre_render` places every level's window around the viewer and streams the
/// exposed texels in; `render` then draws the levels finest to coarsest.
pub struct GlobeClipmapTerrain {
    config: ClipmapConfig,
    ellipsoid: Ellipsoid,
    terrain_levels: Vec<RasterLevel>,
    imagery_levels: Vec<RasterLevel>,
    levels: Vec<ClipmapLevel>,
    updater: ClipmapUpdater,
    patches: PatchMeshes,
    lod_update_enabled: bool,
    blend_regions_enabled: bool,
    frame: u64,
    viewer: Option<Geodetic3D>,
    last_update: UpdateStats,
}

impl GlobeClipmapTerrain {
    pub fn new(
        config: ClipmapConfig,
        ellipsoid: Ellipsoid,
        terrain: Arc<dyn RasterBackend<Texel = f32>>,
        imagery: Option<Arc<dyn RasterBackend<Texel = [u8; 4]>>>,
    ) -> Result<Self> {
        config.validate()?;
        let terrain_levels = terrain.levels().to_vec();
        validate_terrain_levels(&terrain_levels)?;
        let imagery_levels = match &imagery {
            Some(imagery) => {
                ensure!(
                    !imagery.levels().is_empty(),
                    "imagery source {} has no levels",
                    imagery.name()
                );
                imagery.levels().to_vec()
            }
            None => Vec::new(),
        };

        let mut levels = Vec::with_capacity(terrain_levels.len());
        for (index, raster) in terrain_levels.iter().enumerate() {
            let imagery_layer = if imagery_levels.is_empty() {
                None
            } else {
                let imagery_index = imagery_level_for(raster, &imagery_levels);
                let (width, height) =
                    imagery_size(&config, raster, &imagery_levels[imagery_index]);
                Some((imagery_index, width, height))
            };
            levels.push(ClipmapLevel::new(
                index,
                config.clipmap_posts() as u32,
                imagery_layer,
            )?);
        }

        info!(
            "clipmap terrain from {}: {} levels of {} posts{}",
            terrain.name(),
            levels.len(),
            config.clipmap_posts(),
            match &imagery {
                Some(imagery) => format!(", imagery from {}", imagery.name()),
                None => String::new(),
            }
        );
        let updater = ClipmapUpdater::new(terrain, imagery, &config)?;
        let patches = PatchMeshes::new(&config)?;
        let blend_regions_enabled = config.blend_regions_enabled();
        Ok(Self {
            config,
            ellipsoid,
            terrain_levels,
            imagery_levels,
            levels,
            updater,
            patches,
            lod_update_enabled: true,
            blend_regions_enabled,
            frame: 0,
            viewer: None,
            last_update: UpdateStats::default(),
        })
    }

    pub fn config(&self) -> &ClipmapConfig {
        &self.config
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Clip levels, coarsest first.
    pub fn levels(&self) -> &[ClipmapLevel] {
        &self.levels
    }

    pub fn updater(&self) -> &ClipmapUpdater {
        &self.updater
    }

    pub fn patches(&self) -> &PatchMeshes {
        &self.patches
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn viewer(&self) -> Option<&Geodetic3D> {
        self.viewer.as_ref()
    }

    pub fn last_update_stats(&self) -> &UpdateStats {
        &self.last_update
    }

    pub fn lod_update_enabled(&self) -> bool {
        self.lod_update_enabled
    }

    /// Freeze the clip windows where they are. Rendering carries on.
    pub fn set_lod_update_enabled(&mut self, enabled: bool) {
        self.lod_update_enabled = enabled;
    }

    pub fn blend_regions_enabled(&self) -> bool {
        self.blend_regions_enabled
    }

    pub fn set_blend_regions_enabled(&mut self, enabled: bool) {
        self.blend_regions_enabled = enabled;
    }

    /// Place every level's next window around `viewer`, finest first.
    pub fn update_next_extents(&mut self, viewer: &Geodetic3D) -> Result<()> {
        let posts = self.config.clipmap_posts();
        let finest = self.levels.len() - 1;
        let raster = &self.terrain_levels[finest];
        let extent = finest_extent(
            raster.longitude_to_index(viewer.longitude_degrees()),
            raster.latitude_to_index(viewer.latitude_degrees()),
            posts,
        );
        self.levels[finest].terrain_mut().set_next_extent(extent)?;
        self.levels[finest].set_offset_strips(false, false);

        for index in (0..finest).rev() {
            let finer = *self.levels[index + 1].terrain().next_extent();
            let (extent, on_east, on_north) = coarser_extent(&finer, &self.config);
            self.levels[index].terrain_mut().set_next_extent(extent)?;
            self.levels[index].set_offset_strips(on_east, on_north);
        }

        for (level, raster) in self.levels.iter_mut().zip(&self.terrain_levels) {
            let next = *level.terrain().next_extent();
            if let Some(imagery) = level.imagery_mut() {
                let imagery_raster = &self.imagery_levels[imagery.raster_level()];
                let (width, height) = imagery.size();
                let west = imagery_raster
                    .longitude_to_index(raster.index_to_longitude(next.west as f64))
                    .floor() as i32;
                let south = imagery_raster
                    .latitude_to_index(raster.index_to_latitude(next.south as f64))
                    .floor() as i32;
                imagery.set_next_extent(PostExtent::from_origin_and_size(
                    west, south, width, height,
                ))?;
            }
        }
        Ok(())
    }

    /// Move the clip windows under the viewer at `eye` and stream in what they expose.
    pub fn pre_render(&mut self, eye: &Point3<f64>) -> Result<UpdateStats> {
        let _span = tracing::trace_span!("clipmap_pre_render", frame = self.frame).entered();
        let viewer = self.ellipsoid.to_geodetic3d(eye);
        self.viewer = Some(viewer);
        if self.lod_update_enabled || self.frame == 0 {
            self.update_next_extents(&viewer)?;
        }
        let context = UpdateContext {
            frame: self.frame,
            ellipsoid: self.ellipsoid,
            height_exaggeration: self.config.height_exaggeration(),
        };
        let stats = self.updater.update(&mut self.levels, &context)?;
        self.frame += 1;
        self.last_update = stats;
        Ok(stats)
    }

    pub fn meters_per_post(&self, index: usize) -> f64 {
        let raster = &self.terrain_levels[index];
        let (_, meridional) = self.ellipsoid.meters_per_degree(0.);
        meridional
            * raster
                .post_delta_longitude()
                .max(raster.post_delta_latitude())
    }

    pub fn is_level_active(&self, index: usize, viewer_height: f64) -> bool {
        index == 0
            || viewer_height
                < ACTIVE_LEVEL_HEIGHT_FACTOR
                    * self.config.clipmap_posts() as f64
                    * self.meters_per_post(index)
    }

    /// Draw the active levels finest to coarsest. Only the finest level drawn fills its
    /// center; each coarser level leaves a hole for the level inside it.
    pub fn render(&self, renderer: &mut dyn TerrainRenderer) -> Result<RenderStats> {
        let _span = tracing::trace_span!("clipmap_render", frame = self.frame).entered();
        let viewer = self
            .viewer
            .ok_or_else(|| anyhow!("clipmap terrain rendered before pre_render"))?;
        let mut stats = RenderStats::default();
        let mut finer_rendered = false;
        for index in (0..self.levels.len()).rev() {
            if !self.is_level_active(index, viewer.height()) {
                continue;
            }
            self.render_level(index, !finer_rendered, &viewer, renderer, &mut stats)?;
            finer_rendered = true;
        }
        Ok(stats)
    }

    fn render_level(
        &self,
        index: usize,
        fill_ring: bool,
        viewer: &Geodetic3D,
        renderer: &mut dyn TerrainRenderer,
        stats: &mut RenderStats,
    ) -> Result<()> {
        let level = &self.levels[index];
        let coarser = index.checked_sub(1).map(|i| &self.levels[i]);
        renderer.bind_level(level, coarser)?;

        let mut uniforms = self.level_uniforms(level, coarser, viewer)?;
        for placement in self.patches.layout(
            fill_ring,
            level.offset_strip_on_east(),
            level.offset_strip_on_north(),
        ) {
            let mesh = self.patches.mesh(placement.kind);
            uniforms.patch_origin_in_clipped_level =
                [placement.origin[0] as f32, placement.origin[1] as f32];
            renderer.draw(&DrawCommand {
                level: index,
                kind: placement.kind,
                mesh,
                uniforms,
                render_state: RenderState::default(),
            })?;
            stats.draws += 1;
            stats.triangles += mesh.triangle_count();
            *stats.draws_by_kind.entry(placement.kind).or_insert(0) += 1;
        }
        stats.levels_rendered += 1;
        stats.finest_level_rendered.get_or_insert(index);
        stats.coarsest_level_rendered = Some(index);
        Ok(())
    }

    fn level_uniforms(
        &self,
        level: &ClipmapLevel,
        coarser: Option<&ClipmapLevel>,
        viewer: &Geodetic3D,
    ) -> Result<PatchUniforms> {
        let raster = &self.terrain_levels[level.index()];
        let terrain = level.terrain();
        let extent = terrain
            .current_extent()
            .ok_or_else(|| anyhow!("clip level {} has no data yet", level.index()))?;
        let origin = terrain.origin_in_texture();
        let fine_texture_origin = [origin.0 as f32 + 0.5, origin.1 as f32 + 0.5];

        let coarse_window = coarser.and_then(|c| {
            c.terrain()
                .current_extent()
                .map(|extent| (c.terrain().origin_in_texture(), *extent))
        });
        let fine_level_origin_in_coarse = match coarse_window {
            Some((coarse_origin, coarse_extent)) => [
                coarse_origin.0 as f32 + (extent.west as f32 / 2. - coarse_extent.west as f32)
                    + 0.5,
                coarse_origin.1 as f32
                    + (extent.south as f32 / 2. - coarse_extent.south as f32)
                    + 0.5,
            ],
            None => fine_texture_origin,
        };

        let (imagery_texture_origin, terrain_to_imagery_resolution_ratio) =
            match level.imagery() {
                Some(imagery) => {
                    let imagery_raster = &self.imagery_levels[imagery.raster_level()];
                    let origin = imagery.origin_in_texture();
                    (
                        [origin.0 as f32 + 0.5, origin.1 as f32 + 0.5],
                        [
                            (raster.post_delta_longitude() / imagery_raster.post_delta_longitude())
                                as f32,
                            (raster.post_delta_latitude() / imagery_raster.post_delta_latitude())
                                as f32,
                        ],
                    )
                }
                None => ([0.; 2], [1.; 2]),
            };

        Ok(PatchUniforms {
            patch_origin_in_clipped_level: [0.; 2],
            level_scale_factor: [
                raster.post_delta_longitude() as f32,
                raster.post_delta_latitude() as f32,
            ],
            level_offset_from_world_origin: [
                raster.index_to_longitude(extent.west as f64) as f32,
                raster.index_to_latitude(extent.south as f64) as f32,
            ],
            fine_texture_origin,
            fine_level_origin_in_coarse,
            view_position_in_clipped_level: [
                (raster.longitude_to_index(viewer.longitude_degrees()) - extent.west as f64)
                    as f32,
                (raster.latitude_to_index(viewer.latitude_degrees()) - extent.south as f64)
                    as f32,
            ],
            unblended_region_size: self.config.unblended_region_size(),
            one_over_blended_region_size: self.config.one_over_blended_region_size(),
            use_blend_regions: self.blend_regions_enabled && coarser.is_some(),
            height_exaggeration: self.config.height_exaggeration(),
            imagery_texture_origin,
            terrain_to_imagery_resolution_ratio,
        })
    }
}
