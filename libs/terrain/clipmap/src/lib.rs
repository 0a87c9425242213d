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
// Geometry clipmap terrain for a whole globe.
//
// Every level is a square window of posts, in a toroidally addressed texture, centered on the
// viewer; each coarser level covers twice the distance at half the resolution. As the viewer
// moves, only the strips of posts that a window newly exposes are streamed in, from tiles
// loaded off the render thread, with the next coarser level upsampled into any hole that
// has not arrived yet.
mod config;
mod level;
mod normals;
mod patch;
mod renderer;
mod terrain;
mod texture;
mod tile_loader;
mod update;
mod updater;
mod upsample;

pub use crate::{
    config::{ClipmapConfig, DetailLevel, DetailLevelOpts, RetryPolicy},
    level::{ClipmapLayer, ClipmapLevel},
    normals::update_normals,
    patch::{PatchKind, PatchMeshes, PatchPlacement},
    renderer::{
        CullFace, DepthTest, DrawCommand, PatchUniforms, RecordedDraw, RecordingRenderer,
        RenderState, TerrainRenderer, UniformValue,
    },
    terrain::{coarser_extent, finest_extent, GlobeClipmapTerrain, RenderStats},
    texture::ClipmapTexture,
    tile_loader::{InFlightRequest, TileCompletion, TileLoader},
    update::{split_update_to_avoid_wrapping, ClipmapUpdate},
    updater::{
        ClipmapUpdater, HeightLayer, ImageryLayer, LayerAccess, LayerUpdater, UpdateContext,
        UpdateStats,
    },
    upsample::{sample_bilinear, Upsampler},
};
