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
use anyhow::{bail, ensure, Error, Result};
use std::str::FromStr;
use structopt::StructOpt;

fn parse_level_str(s: &str) -> Result<u8> {
    Ok(match s {
        "low" | "lo" | "0" => 0,
        "medium" | "med" | "1" => 1,
        "high" | "hi" | "2" => 2,
        "ultra" | "max" | "3" => 3,
        _ => bail!("unrecognized detail level; expected low, medium, high, or ultra"),
    })
}

/// A baseline for how much terrain to keep resident and how hard to stream it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetailLevel {
    Low,
    Medium,
    High,
    Ultra,
}

impl DetailLevel {
    pub fn detect() -> Self {
        if cfg!(debug_assertions) {
            Self::Low
        } else {
            Self::High
        }
    }
}

impl FromStr for DetailLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match parse_level_str(s)? {
            0 => Self::Low,
            1 => Self::Medium,
            2 => Self::High,
            _ => Self::Ultra,
        })
    }
}

#[derive(Clone, Debug, StructOpt)]
pub struct DetailLevelOpts {
    /// Set the terrain detail level (low, medium, high, or ultra)
    #[structopt(long)]
    detail: Option<DetailLevel>,
}

impl DetailLevelOpts {
    pub fn detail(&self) -> DetailLevel {
        self.detail.unwrap_or_else(DetailLevel::detect)
    }
}

/// How to treat transient tile load failures. Delays are counted in frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_frames: u64,
    max_delay_frames: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_frames: 8,
            max_delay_frames: 240,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_frames: u64, max_delay_frames: u64) -> Self {
        Self {
            max_attempts,
            base_delay_frames,
            max_delay_frames,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a tile that has failed `attempts` times in a row may be asked for again.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Frames to wait after the `attempts`-th consecutive failure.
    pub fn delay_frames(&self, attempts: u32) -> u64 {
        let shift = attempts.saturating_sub(1).min(32);
        self.base_delay_frames
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_frames)
    }
}

#[derive(Clone, Debug)]
pub struct ClipmapConfig {
    clipmap_posts: u32,
    height_exaggeration: f32,
    blend_regions_enabled: bool,
    background_loading: bool,
    max_requests_in_flight: usize,
    max_active_tiles: usize,
    retry_policy: RetryPolicy,
}

impl Default for ClipmapConfig {
    fn default() -> Self {
        Self::for_level(DetailLevel::detect())
    }
}

impl ClipmapConfig {
    pub fn for_level(level: DetailLevel) -> Self {
        let (clipmap_posts, max_requests_in_flight, max_active_tiles) = match level {
            DetailLevel::Low => (127, 16, 512),
            DetailLevel::Medium => (255, 32, 1024),
            DetailLevel::High => (511, 64, 2048),
            DetailLevel::Ultra => (1023, 128, 4096),
        };
        Self {
            clipmap_posts,
            height_exaggeration: 1.,
            blend_regions_enabled: true,
            background_loading: true,
            max_requests_in_flight,
            max_active_tiles,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_clipmap_posts(mut self, clipmap_posts: u32) -> Self {
        self.clipmap_posts = clipmap_posts;
        self
    }

    pub fn with_height_exaggeration(mut self, height_exaggeration: f32) -> Self {
        self.height_exaggeration = height_exaggeration;
        self
    }

    pub fn with_blend_regions_enabled(mut self, enabled: bool) -> Self {
        self.blend_regions_enabled = enabled;
        self
    }

    pub fn with_background_loading(mut self, background_loading: bool) -> Self {
        self.background_loading = background_loading;
        self
    }

    pub fn with_max_requests_in_flight(mut self, max_requests_in_flight: usize) -> Self {
        self.max_requests_in_flight = max_requests_in_flight;
        self
    }

    pub fn with_max_active_tiles(mut self, max_active_tiles: usize) -> Self {
        self.max_active_tiles = max_active_tiles;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let posts = self.clipmap_posts;
        ensure!(
            posts >= 15 && (posts + 1).is_power_of_two(),
            "clipmap posts must be 2^k-1 with k >= 4, got {posts}"
        );
        ensure!(
            self.height_exaggeration.is_finite() && self.height_exaggeration > 0.,
            "height exaggeration must be positive"
        );
        ensure!(
            self.max_requests_in_flight > 0,
            "at least one tile request must be allowed in flight"
        );
        Ok(())
    }

    pub fn clipmap_posts(&self) -> i32 {
        self.clipmap_posts as i32
    }

    pub fn clipmap_segments(&self) -> i32 {
        self.clipmap_posts() - 1
    }

    /// Posts along one edge of a field block.
    pub fn fill_patch_posts(&self) -> i32 {
        (self.clipmap_posts() + 1) / 4
    }

    pub fn fill_patch_segments(&self) -> i32 {
        self.fill_patch_posts() - 1
    }

    /// Width in posts of the band at the outside of each level that blends into the
    /// next coarser level.
    pub fn blend_width(&self) -> i32 {
        self.clipmap_posts() / 10
    }

    pub fn unblended_region_size(&self) -> f32 {
        (self.clipmap_segments() / 2 - self.blend_width() - 1) as f32
    }

    pub fn one_over_blended_region_size(&self) -> f32 {
        10. / self.clipmap_posts() as f32
    }

    pub fn height_exaggeration(&self) -> f32 {
        self.height_exaggeration
    }

    pub fn blend_regions_enabled(&self) -> bool {
        self.blend_regions_enabled
    }

    pub fn background_loading(&self) -> bool {
        self.background_loading
    }

    pub fn max_requests_in_flight(&self) -> usize {
        self.max_requests_in_flight
    }

    pub fn max_active_tiles(&self) -> usize {
        self.max_active_tiles
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_detail() -> Result<()> {
        assert_eq!("lo".parse::<DetailLevel>()?, DetailLevel::Low);
        assert_eq!("2".parse::<DetailLevel>()?, DetailLevel::High);
        assert_eq!("max".parse::<DetailLevel>()?, DetailLevel::Ultra);
        assert!("extreme".parse::<DetailLevel>().is_err());
        Ok(())
    }

    #[test]
    fn test_detail_opts() {
        let opts = DetailLevelOpts::from_iter(["test", "--detail", "medium"]);
        assert_eq!(opts.detail(), DetailLevel::Medium);
        let opts = DetailLevelOpts::from_iter(["test"]);
        assert_eq!(opts.detail(), DetailLevel::detect());
    }

    #[test]
    fn test_derived_sizes() -> Result<()> {
        let config = ClipmapConfig::for_level(DetailLevel::Medium);
        config.validate()?;
        assert_eq!(config.clipmap_posts(), 255);
        assert_eq!(config.clipmap_segments(), 254);
        assert_eq!(config.fill_patch_posts(), 64);
        assert_eq!(config.fill_patch_segments(), 63);
        assert_eq!(config.blend_width(), 25);
        assert_eq!(config.unblended_region_size(), 101.);
        Ok(())
    }

    #[test]
    fn test_invalid_posts() {
        for posts in [0, 7, 100, 256] {
            assert!(ClipmapConfig::for_level(DetailLevel::Low)
                .with_clipmap_posts(posts)
                .validate()
                .is_err());
        }
        assert!(ClipmapConfig::for_level(DetailLevel::Low)
            .with_clipmap_posts(15)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_retry_backoff() {
        let policy = RetryPolicy::new(5, 4, 20);
        assert_eq!(policy.delay_frames(1), 4);
        assert_eq!(policy.delay_frames(2), 8);
        assert_eq!(policy.delay_frames(3), 16);
        assert_eq!(policy.delay_frames(4), 20);
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }
}
