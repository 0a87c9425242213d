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
use anyhow::Result;
use clipmap::{
    ClipmapConfig, DetailLevelOpts, GlobeClipmapTerrain, RecordingRenderer, UpdateStats,
};
use geodesy::{Geodetic3D, GeodeticExtent, WGS84};
use log::info;
use raster::{
    HeightTileCache, ImageryTileCache, ProceduralBackend, RasterBackend, RasterLevel,
};
use std::{path::PathBuf, sync::Arc, time::Instant};
use structopt::StructOpt;
use tracelog::{TraceLog, TraceLogOpts};

/// Fly a great circle over streaming clipmap terrain and report what it takes.
#[derive(Debug, StructOpt)]
#[structopt(name = "globe")]
struct Opt {
    /// Number of frames to fly
    #[structopt(short, long, default_value = "600")]
    frames: u64,

    /// Frames between progress reports
    #[structopt(long, default_value = "60")]
    report_interval: u64,

    /// Tile cache to stream heights from, instead of procedural hills
    #[structopt(long)]
    terrain_cache: Option<PathBuf>,

    /// Tile cache to stream imagery from, instead of procedural bands
    #[structopt(long)]
    imagery_cache: Option<PathBuf>,

    /// Do not drape any imagery over the terrain
    #[structopt(long)]
    no_imagery: bool,

    /// Load tiles on the render thread
    #[structopt(long)]
    inline_loading: bool,

    /// Override the posts along each clip level's edge (2^k-1)
    #[structopt(long)]
    clipmap_posts: Option<u32>,

    /// Scale heights by this factor
    #[structopt(long, default_value = "1")]
    height_exaggeration: f32,

    /// Do not blend the edges of each level into the next coarser level
    #[structopt(long)]
    no_blend: bool,

    /// Stop moving the clip windows after this frame
    #[structopt(long)]
    freeze_lod_at: Option<u64>,

    /// Starting longitude, in degrees
    #[structopt(long, default_value = "-122.3", allow_hyphen_values = true)]
    longitude: f64,

    /// Starting latitude, in degrees
    #[structopt(long, default_value = "47.6", allow_hyphen_values = true)]
    latitude: f64,

    /// Initial heading, in degrees clockwise from north
    #[structopt(long, default_value = "75")]
    heading: f64,

    /// Height above the ellipsoid, in meters
    #[structopt(long, default_value = "3000")]
    altitude: f64,

    /// Arc flown each frame, in degrees
    #[structopt(long, default_value = "0.01")]
    speed: f64,

    #[structopt(flatten)]
    detail_opts: DetailLevelOpts,

    #[structopt(flatten)]
    tracelog_opts: TraceLogOpts,
}

// The point `distance` degrees along the great circle leaving `start` at `heading`.
fn great_circle(start: &Geodetic3D, heading: f64, distance: f64) -> Geodetic3D {
    let (lat0, lon0) = (start.latitude(), start.longitude());
    let (heading, distance) = (heading.to_radians(), distance.to_radians());
    let lat = (lat0.sin() * distance.cos() + lat0.cos() * distance.sin() * heading.cos()).asin();
    let lon = lon0
        + (heading.sin() * distance.sin() * lat0.cos())
            .atan2(distance.cos() - lat0.sin() * lat.sin());
    let lon = (lon + std::f64::consts::PI).rem_euclid(std::f64::consts::TAU) - std::f64::consts::PI;
    Geodetic3D::new(lon, lat, start.height())
}

fn terrain_backend(opt: &Opt) -> Result<Arc<dyn RasterBackend<Texel = f32>>> {
    Ok(match &opt.terrain_cache {
        Some(path) => Arc::new(HeightTileCache::open(path)?),
        None => Arc::new(ProceduralBackend::rolling_hills(RasterLevel::pyramid(
            GeodeticExtent::whole_globe(),
            9,
            129,
            65,
            256,
        )?)?),
    })
}

fn imagery_backend(opt: &Opt) -> Result<Option<Arc<dyn RasterBackend<Texel = [u8; 4]>>>> {
    if opt.no_imagery {
        return Ok(None);
    }
    Ok(Some(match &opt.imagery_cache {
        Some(path) => Arc::new(ImageryTileCache::open(path)?),
        None => Arc::new(ProceduralBackend::banded_imagery(RasterLevel::pyramid(
            GeodeticExtent::whole_globe(),
            8,
            513,
            257,
            256,
        )?)?),
    }))
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let _tracelog = TraceLog::init(&opt.tracelog_opts)?;

    let detail = opt.detail_opts.detail();
    let mut config = ClipmapConfig::for_level(detail)
        .with_height_exaggeration(opt.height_exaggeration)
        .with_blend_regions_enabled(!opt.no_blend)
        .with_background_loading(!opt.inline_loading);
    if let Some(posts) = opt.clipmap_posts {
        config = config.with_clipmap_posts(posts);
    }
    info!("detail level {:?}: {:?}", detail, config);

    let mut terrain = GlobeClipmapTerrain::new(
        config,
        *WGS84,
        terrain_backend(&opt)?,
        imagery_backend(&opt)?,
    )?;
    let mut renderer = RecordingRenderer::default();

    let start = Geodetic3D::from_degrees(opt.longitude, opt.latitude, opt.altitude);
    let mut totals = UpdateStats::default();
    let mut draws = 0;
    let mut triangles = 0;
    let flight_start = Instant::now();
    let mut report_start = Instant::now();
    for frame in 0..opt.frames {
        if opt.freeze_lod_at == Some(frame) {
            info!("freezing clip windows at frame {}", frame);
            terrain.set_lod_update_enabled(false);
        }
        let viewer = great_circle(&start, opt.heading, opt.speed * frame as f64);
        let update = terrain.pre_render(&WGS84.to_cartesian(&viewer))?;
        totals += update;

        renderer.clear();
        let rendered = terrain.render(&mut renderer)?;
        draws += rendered.draws;
        triangles += rendered.triangles;

        if opt.report_interval > 0 && (frame + 1) % opt.report_interval == 0 {
            let elapsed = report_start.elapsed();
            info!(
                "frame {} at {}: levels {:?}..={:?}, {} draws, {} tris; {} tiles active, {} in flight, {} loaded, {} unavailable; {:.2}ms/frame",
                frame,
                viewer,
                rendered.coarsest_level_rendered,
                rendered.finest_level_rendered,
                rendered.draws,
                rendered.triangles,
                update.active_tiles,
                update.tiles_in_flight,
                totals.tiles_loaded,
                totals.tiles_unavailable,
                elapsed.as_secs_f64() * 1000. / opt.report_interval as f64,
            );
            report_start = Instant::now();
        }
    }

    info!(
        "flew {} frames in {:.2}s: {} draws, {} triangles",
        opt.frames,
        flight_start.elapsed().as_secs_f64(),
        draws,
        triangles
    );
    info!(
        "streamed {} tiles ({} retried, {} unavailable, {} cancelled, {} stale, {} evicted); {} texture copies, {} placeholder fills, {} texels, {} normals",
        totals.tiles_loaded,
        totals.tiles_retried,
        totals.tiles_unavailable,
        totals.tiles_cancelled,
        totals.stale_completions,
        totals.tiles_evicted,
        totals.texture_copies,
        totals.placeholder_fills,
        totals.texels_written,
        totals.normals_updated,
    );
    Ok(())
}
