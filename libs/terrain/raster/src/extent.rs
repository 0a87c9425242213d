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
use std::fmt;

/// An inclusive rectangle of post indices: `west..=east` by `south..=north`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PostExtent {
    pub west: i32,
    pub south: i32,
    pub east: i32,
    pub north: i32,
}

impl PostExtent {
    pub fn new(west: i32, south: i32, east: i32, north: i32) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn from_origin_and_size(west: i32, south: i32, width: i32, height: i32) -> Self {
        Self::new(west, south, west + width - 1, south + height - 1)
    }

    pub fn width(&self) -> i32 {
        self.east - self.west + 1
    }

    pub fn height(&self) -> i32 {
        self.north - self.south + 1
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.west && x <= self.east && y >= self.south && y <= self.north
    }

    pub fn contains_extent(&self, other: &PostExtent) -> bool {
        other.is_empty()
            || (self.contains(other.west, other.south) && self.contains(other.east, other.north))
    }

    pub fn intersection(&self, other: &PostExtent) -> Option<PostExtent> {
        let out = PostExtent::new(
            self.west.max(other.west),
            self.south.max(other.south),
            self.east.min(other.east),
            self.north.min(other.north),
        );
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    pub fn expanded(&self, posts: i32) -> PostExtent {
        PostExtent::new(
            self.west - posts,
            self.south - posts,
            self.east + posts,
            self.north + posts,
        )
    }
}

impl fmt::Display for PostExtent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}..={}]x[{}..={}]",
            self.west, self.east, self.south, self.north
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extent_size() {
        let e = PostExtent::new(-2, 3, 5, 3);
        assert_eq!(e.width(), 8);
        assert_eq!(e.height(), 1);
        assert_eq!(e.area(), 8);
        assert!(!e.is_empty());
        assert!(PostExtent::new(1, 0, 0, 0).is_empty());
        assert_eq!(PostExtent::new(1, 0, 0, 0).area(), 0);
    }

    #[test]
    fn test_extent_intersection() {
        let a = PostExtent::new(0, 0, 9, 9);
        let b = PostExtent::new(5, -5, 20, 3);
        assert_eq!(a.intersection(&b), Some(PostExtent::new(5, 0, 9, 3)));
        assert_eq!(a.intersection(&PostExtent::new(10, 0, 12, 2)), None);
        assert!(a.contains_extent(&PostExtent::new(2, 2, 9, 9)));
        assert!(!a.contains_extent(&b));
    }
}
