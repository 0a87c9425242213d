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
use raster::PostExtent;
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// One rectangle of a clip level, in logical post indices, whose texels need refreshing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClipmapUpdate {
    level: usize,
    extent: PostExtent,
}

impl ClipmapUpdate {
    pub fn new(level: usize, extent: PostExtent) -> Self {
        Self { level, extent }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn extent(&self) -> &PostExtent {
        &self.extent
    }

    pub fn west(&self) -> i32 {
        self.extent.west
    }

    pub fn south(&self) -> i32 {
        self.extent.south
    }

    pub fn east(&self) -> i32 {
        self.extent.east
    }

    pub fn north(&self) -> i32 {
        self.extent.north
    }

    pub fn width(&self) -> i32 {
        self.extent.width()
    }

    pub fn height(&self) -> i32 {
        self.extent.height()
    }
}

impl fmt::Display for ClipmapUpdate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}:{}", self.level, self.extent)
    }
}

fn split_axis(
    low: i32,
    high: i32,
    window_low: i32,
    origin: i32,
    size: i32,
) -> SmallVec<[(i32, i32); 2]> {
    let physical_low = (origin + (low - window_low)).rem_euclid(size);
    let physical_high = (origin + (high - window_low)).rem_euclid(size);
    if physical_high < physical_low {
        let first_high = low + (size - physical_low) - 1;
        smallvec![(low, first_high), (first_high + 1, high)]
    } else {
        smallvec![(low, high)]
    }
}

/// Cut `update` into pieces that each map to one contiguous rectangle of a toroidal texture
/// of `size` posts whose physical `origin` holds the south-west post of `window`. The update
/// must lie within the window. Pieces are ordered south-west, south-east, north-west,
/// north-east and cover the update exactly once.
pub fn split_update_to_avoid_wrapping(
    update: &ClipmapUpdate,
    window: &PostExtent,
    origin: (i32, i32),
    size: (i32, i32),
) -> SmallVec<[ClipmapUpdate; 4]> {
    debug_assert!(window.contains_extent(update.extent()));
    debug_assert!(update.width() <= size.0 && update.height() <= size.1);
    let columns = split_axis(update.west(), update.east(), window.west, origin.0, size.0);
    let rows = split_axis(update.south(), update.north(), window.south, origin.1, size.1);
    let mut pieces = SmallVec::new();
    for &(south, north) in &rows {
        for &(west, east) in &columns {
            pieces.push(ClipmapUpdate::new(
                update.level(),
                PostExtent::new(west, south, east, north),
            ));
        }
    }
    pieces
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_two_post_shift_is_one_column_strip() {
        // The window moved two posts east; its origin moved from 10 to 12.
        let window = PostExtent::new(102, 100, 356, 354);
        let update = ClipmapUpdate::new(0, PostExtent::new(355, 100, 356, 354));
        let pieces = split_update_to_avoid_wrapping(&update, &window, (12, 0), (255, 255));
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], update);

        // A vertical origin away from zero cuts the full height strip at the row wrap, but
        // never by column.
        let pieces = split_update_to_avoid_wrapping(&update, &window, (12, 10), (255, 255));
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            assert_eq!((piece.west(), piece.east()), (355, 356));
        }
        assert_eq!(pieces[0].north() + 1, pieces[1].south());
    }

    #[test]
    fn test_horizontal_wrap() {
        let window = PostExtent::new(0, 0, 9, 9);
        let update = ClipmapUpdate::new(2, PostExtent::new(3, 0, 6, 9));
        // Logical column 5 lands on physical column 9; 6 wraps to 0.
        let pieces = split_update_to_avoid_wrapping(&update, &window, (4, 0), (10, 10));
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].extent(), &PostExtent::new(3, 0, 5, 9));
        assert_eq!(pieces[1].extent(), &PostExtent::new(6, 0, 6, 9));
        assert!(pieces.iter().all(|p| p.level() == 2));
    }

    #[test]
    fn test_four_way_wrap() {
        let window = PostExtent::new(-5, -5, 4, 4);
        let update = ClipmapUpdate::new(0, window);
        let pieces = split_update_to_avoid_wrapping(&update, &window, (3, 7), (10, 10));
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0].extent(), &PostExtent::new(-5, -5, 1, -3));
        assert_eq!(pieces[1].extent(), &PostExtent::new(2, -5, 4, -3));
        assert_eq!(pieces[2].extent(), &PostExtent::new(-5, -2, 1, 4));
        assert_eq!(pieces[3].extent(), &PostExtent::new(2, -2, 4, 4));
    }

    #[test]
    fn test_random_updates_cover_once() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..500 {
            let size = (rng.gen_range(1..40), rng.gen_range(1..40));
            let west = rng.gen_range(-100..100);
            let south = rng.gen_range(-100..100);
            let window = PostExtent::from_origin_and_size(west, south, size.0, size.1);
            let origin = (rng.gen_range(0..size.0), rng.gen_range(0..size.1));
            let uw = rng.gen_range(window.west..=window.east);
            let ue = rng.gen_range(uw..=window.east);
            let us = rng.gen_range(window.south..=window.north);
            let un = rng.gen_range(us..=window.north);
            let update = ClipmapUpdate::new(1, PostExtent::new(uw, us, ue, un));

            let pieces = split_update_to_avoid_wrapping(&update, &window, origin, size);
            let mut hits = vec![0u32; (size.0 * size.1) as usize];
            for piece in &pieces {
                let px = |x: i32| (origin.0 + x - window.west).rem_euclid(size.0);
                let py = |y: i32| (origin.1 + y - window.south).rem_euclid(size.1);
                assert!(px(piece.west()) <= px(piece.east()));
                assert!(py(piece.south()) <= py(piece.north()));
                for y in piece.south()..=piece.north() {
                    for x in piece.west()..=piece.east() {
                        hits[(py(y) * size.0 + px(x)) as usize] += 1;
                    }
                }
            }
            let covered = hits.iter().filter(|&&h| h == 1).count() as i32;
            assert_eq!(covered, update.width() * update.height());
            assert!(hits.iter().all(|&h| h <= 1));
        }
    }
}
