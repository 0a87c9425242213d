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

/// A position on the surface of an ellipsoid. Angles are stored in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Geodetic2D {
    longitude: f64,
    latitude: f64,
}

impl Geodetic2D {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn from_degrees(longitude: f64, latitude: f64) -> Self {
        Self::new(longitude.to_radians(), latitude.to_radians())
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }

    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }

    pub fn with_height(&self, height: f64) -> Geodetic3D {
        Geodetic3D::new(self.longitude, self.latitude, height)
    }
}

impl fmt::Display for Geodetic2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({:0.6}°, {:0.6}°)",
            self.longitude_degrees(),
            self.latitude_degrees()
        )
    }
}

/// A position relative to the surface of an ellipsoid: radians, radians, meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Geodetic3D {
    longitude: f64,
    latitude: f64,
    height: f64,
}

impl Geodetic3D {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self::new(longitude.to_radians(), latitude.to_radians(), height)
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }

    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }

    pub fn surface(&self) -> Geodetic2D {
        Geodetic2D::new(self.longitude, self.latitude)
    }
}

impl fmt::Display for Geodetic3D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({:0.6}°, {:0.6}°, {:0.1}m)",
            self.longitude_degrees(),
            self.latitude_degrees(),
            self.height
        )
    }
}
