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
use fxhash::FxHashMap;
use geodesy::GeodeticExtent;
use rand::{rngs::StdRng, Rng, SeedableRng};
use raster::{PostExtent, RasterLevel};

fn covered_posts(level: &RasterLevel, extent: &PostExtent) -> FxHashMap<(i32, i32), usize> {
    let mut seen = FxHashMap::default();
    for region in level.get_tiles_in_extent(extent) {
        assert!(region.west >= 0 && region.east < level.longitude_posts_per_tile());
        assert!(region.south >= 0 && region.north < level.latitude_posts_per_tile());
        assert!(region.width() > 0 && region.height() > 0);
        let posts = region.level_extent(level);
        for y in posts.south..=posts.north {
            for x in posts.west..=posts.east {
                *seen.entry((x, y)).or_insert(0) += 1;
            }
        }
    }
    seen
}

fn assert_partition(level: &RasterLevel, extent: &PostExtent) {
    let seen = covered_posts(level, extent);
    assert_eq!(seen.len() as i64, extent.area(), "extent {extent}");
    for y in extent.south..=extent.north {
        for x in extent.west..=extent.east {
            assert_eq!(seen.get(&(x, y)), Some(&1), "post {x},{y} of {extent}");
        }
    }
}

#[test]
fn test_partition_single_tile() -> Result<()> {
    let level = RasterLevel::new(0, GeodeticExtent::whole_globe(), 1025, 513, 64, 32)?;
    assert_partition(&level, &PostExtent::new(3, 4, 60, 30));
    assert_eq!(
        level
            .get_tiles_in_extent(&PostExtent::new(3, 4, 60, 30))
            .len(),
        1
    );
    Ok(())
}

#[test]
fn test_partition_straddles_two_tiles() -> Result<()> {
    let level = RasterLevel::new(0, GeodeticExtent::whole_globe(), 1025, 513, 64, 32)?;
    let extent = PostExtent::new(60, 4, 70, 30);
    assert_eq!(level.get_tiles_in_extent(&extent).len(), 2);
    assert_partition(&level, &extent);
    Ok(())
}

#[test]
fn test_partition_random_extents() -> Result<()> {
    let level = RasterLevel::new(0, GeodeticExtent::whole_globe(), 1025, 513, 16, 8)?;
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let west = rng.gen_range(-100..100);
        let south = rng.gen_range(-100..100);
        let extent = PostExtent::new(
            west,
            south,
            west + rng.gen_range(0..70),
            south + rng.gen_range(0..40),
        );
        assert_partition(&level, &extent);
    }
    Ok(())
}
