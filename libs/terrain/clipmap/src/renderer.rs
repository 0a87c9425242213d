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
// What the terrain asks of a renderer. Textures stay with the clip levels; a renderer binds
// them per level and then draws patch meshes with per-draw uniforms.
use crate::{level::ClipmapLevel, patch::PatchKind};
use anyhow::Result;
use fxhash::FxHashMap;
use geometry::Mesh;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CullFace {
    None,
    Back,
    Front,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DepthTest {
    Always,
    Less,
    LessEqual,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RenderState {
    pub cull_face: CullFace,
    pub depth_test: DepthTest,
    pub blending: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            cull_face: CullFace::Back,
            depth_test: DepthTest::Less,
            blending: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Bool(bool),
}

/// Shader inputs for one patch draw. Positions are in posts unless noted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PatchUniforms {
    pub patch_origin_in_clipped_level: [f32; 2],
    /// Degrees per post.
    pub level_scale_factor: [f32; 2],
    /// Degrees at the south-west post of the level.
    pub level_offset_from_world_origin: [f32; 2],
    pub fine_texture_origin: [f32; 2],
    pub fine_level_origin_in_coarse: [f32; 2],
    pub view_position_in_clipped_level: [f32; 2],
    pub unblended_region_size: f32,
    pub one_over_blended_region_size: f32,
    pub use_blend_regions: bool,
    pub height_exaggeration: f32,
    pub imagery_texture_origin: [f32; 2],
    pub terrain_to_imagery_resolution_ratio: [f32; 2],
}

impl PatchUniforms {
    pub fn named_values(&self) -> [(&'static str, UniformValue); 12] {
        use UniformValue::*;
        [
            (
                "patch_origin_in_clipped_level",
                Vec2(self.patch_origin_in_clipped_level),
            ),
            ("level_scale_factor", Vec2(self.level_scale_factor)),
            (
                "level_offset_from_world_origin",
                Vec2(self.level_offset_from_world_origin),
            ),
            ("fine_texture_origin", Vec2(self.fine_texture_origin)),
            (
                "fine_level_origin_in_coarse",
                Vec2(self.fine_level_origin_in_coarse),
            ),
            (
                "view_position_in_clipped_level",
                Vec2(self.view_position_in_clipped_level),
            ),
            ("unblended_region_size", Float(self.unblended_region_size)),
            (
                "one_over_blended_region_size",
                Float(self.one_over_blended_region_size),
            ),
            ("use_blend_regions", Bool(self.use_blend_regions)),
            ("height_exaggeration", Float(self.height_exaggeration)),
            ("imagery_texture_origin", Vec2(self.imagery_texture_origin)),
            (
                "terrain_to_imagery_resolution_ratio",
                Vec2(self.terrain_to_imagery_resolution_ratio),
            ),
        ]
    }
}

pub struct DrawCommand<'a> {
    pub level: usize,
    pub kind: PatchKind,
    pub mesh: &'a Mesh,
    pub uniforms: PatchUniforms,
    pub render_state: RenderState,
}

pub trait TerrainRenderer {
    /// Make `level`'s textures, and those of the next coarser level for blending, current.
    fn bind_level(&mut self, level: &ClipmapLevel, coarser: Option<&ClipmapLevel>) -> Result<()>;

    fn draw(&mut self, command: &DrawCommand) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub level: usize,
    pub kind: PatchKind,
    pub triangles: usize,
    pub uniforms: PatchUniforms,
    pub named_uniforms: Vec<(&'static str, UniformValue)>,
    pub render_state: RenderState,
}

impl RecordedDraw {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.named_uniforms
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
    }
}

/// Keeps every draw it is given. Used headless and in tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    bound_levels: Vec<usize>,
    draws: Vec<RecordedDraw>,
}

impl RecordingRenderer {
    pub fn bound_levels(&self) -> &[usize] {
        &self.bound_levels
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn draws_for_level(&self, level: usize) -> impl Iterator<Item = &RecordedDraw> + '_ {
        self.draws.iter().filter(move |d| d.level == level)
    }

    pub fn triangle_count(&self) -> usize {
        self.draws.iter().map(|d| d.triangles).sum()
    }

    pub fn draws_by_kind(&self) -> FxHashMap<PatchKind, usize> {
        let mut counts = FxHashMap::default();
        for draw in &self.draws {
            *counts.entry(draw.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&mut self) {
        self.bound_levels.clear();
        self.draws.clear();
    }
}

impl TerrainRenderer for RecordingRenderer {
    fn bind_level(&mut self, level: &ClipmapLevel, _coarser: Option<&ClipmapLevel>) -> Result<()> {
        self.bound_levels.push(level.index());
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand) -> Result<()> {
        self.draws.push(RecordedDraw {
            level: command.level,
            kind: command.kind,
            triangles: command.mesh.triangle_count(),
            uniforms: command.uniforms,
            named_uniforms: command.uniforms.named_values().to_vec(),
            render_state: command.render_state,
        });
        Ok(())
    }
}
