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
use anyhow::{ensure, Result};

/// A longitude/latitude aligned rectangle, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeodeticExtent {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl GeodeticExtent {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        ensure!(
            west.is_finite() && south.is_finite() && east.is_finite() && north.is_finite(),
            "geodetic extent must be finite"
        );
        ensure!(west < east, "geodetic extent west {west} must be less than east {east}");
        ensure!(
            south < north,
            "geodetic extent south {south} must be less than north {north}"
        );
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    pub fn whole_globe() -> Self {
        Self {
            west: -180.,
            south: -90.,
            east: 180.,
            north: 90.,
        }
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        longitude >= self.west
            && longitude <= self.east
            && latitude >= self.south
            && latitude <= self.north
    }
}
