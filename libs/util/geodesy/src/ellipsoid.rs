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
use crate::{Geodetic2D, Geodetic3D};
use anyhow::{ensure, Result};
use nalgebra::{Point3, Vector3};
use once_cell::sync::Lazy;

pub static WGS84: Lazy<Ellipsoid> =
    Lazy::new(|| Ellipsoid::from_radii(6_378_137.0, 6_378_137.0, 6_356_752.314_245));
pub static UNIT_SPHERE: Lazy<Ellipsoid> = Lazy::new(|| Ellipsoid::from_radii(1., 1., 1.));

// Newton iteration in scale_to_geodetic_surface stops once the surface equation is this close.
const SURFACE_TOLERANCE: f64 = 1e-10;
const MAX_SURFACE_ITERATIONS: usize = 64;

/// An ellipsoid of revolution centered on the origin, with +Z through the north pole and +X
/// through the prime meridian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    radii: Vector3<f64>,
    radii_squared: Vector3<f64>,
    radii_to_the_fourth: Vector3<f64>,
    one_over_radii_squared: Vector3<f64>,
}

impl Ellipsoid {
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        ensure!(
            x > 0. && y > 0. && z > 0. && x.is_finite() && y.is_finite() && z.is_finite(),
            "ellipsoid radii must be positive and finite"
        );
        Ok(Self::from_radii(x, y, z))
    }

    fn from_radii(x: f64, y: f64, z: f64) -> Self {
        let radii = Vector3::new(x, y, z);
        let radii_squared = radii.component_mul(&radii);
        Self {
            radii,
            radii_squared,
            radii_to_the_fourth: radii_squared.component_mul(&radii_squared),
            one_over_radii_squared: radii_squared.map(|r| 1. / r),
        }
    }

    pub fn radii(&self) -> &Vector3<f64> {
        &self.radii
    }

    pub fn minimum_radius(&self) -> f64 {
        self.radii.min()
    }

    pub fn maximum_radius(&self) -> f64 {
        self.radii.max()
    }

    /// Meters spanned by one degree of longitude and one degree of latitude at `latitude`
    /// (radians). Uses the equatorial radius; good enough for post spacing and LOD selection.
    pub fn meters_per_degree(&self, latitude: f64) -> (f64, f64) {
        let meridional = self.radii.x * std::f64::consts::PI / 180.;
        (meridional * latitude.cos().abs(), meridional)
    }

    pub fn geodetic_surface_normal(&self, position: &Point3<f64>) -> Vector3<f64> {
        position
            .coords
            .component_mul(&self.one_over_radii_squared)
            .normalize()
    }

    pub fn geodetic_surface_normal_at(&self, geodetic: &Geodetic2D) -> Vector3<f64> {
        let cos_latitude = geodetic.latitude().cos();
        Vector3::new(
            cos_latitude * geodetic.longitude().cos(),
            cos_latitude * geodetic.longitude().sin(),
            geodetic.latitude().sin(),
        )
    }

    pub fn to_cartesian(&self, geodetic: &Geodetic3D) -> Point3<f64> {
        let n = self.geodetic_surface_normal_at(&geodetic.surface());
        let k = self.radii_squared.component_mul(&n);
        let gamma = k.dot(&n).sqrt();
        let surface = k / gamma;
        Point3::from(surface + n * geodetic.height())
    }

    pub fn to_geodetic2d(&self, position: &Point3<f64>) -> Geodetic2D {
        let n = self.geodetic_surface_normal(position);
        Geodetic2D::new(n.y.atan2(n.x), (n.z / n.norm()).asin())
    }

    pub fn to_geodetic3d(&self, position: &Point3<f64>) -> Geodetic3D {
        if position.coords.norm_squared() == 0. {
            return Geodetic3D::new(0., 0., -self.minimum_radius());
        }
        let surface = self.scale_to_geodetic_surface(position);
        let h = position - surface;
        let height = h.dot(&position.coords).signum() * h.norm();
        self.to_geodetic2d(&surface).with_height(height)
    }

    /// Project `position` along the geodetic surface normal onto the ellipsoid surface.
    pub fn scale_to_geodetic_surface(&self, position: &Point3<f64>) -> Point3<f64> {
        let p = position.coords;
        let beta = 1.
            / p.component_mul(&p)
                .component_mul(&self.one_over_radii_squared)
                .sum()
                .sqrt();
        let n = (p * beta)
            .component_mul(&self.one_over_radii_squared)
            .norm();
        let mut alpha = (1. - beta) * (p.norm() / n);

        let p2 = p.component_mul(&p);
        let mut d = Vector3::new(1., 1., 1.);
        let mut s = 0.;
        let mut ds_dalpha = 1.;
        for _ in 0..MAX_SURFACE_ITERATIONS {
            alpha -= s / ds_dalpha;
            d = Vector3::new(
                1. + alpha * self.one_over_radii_squared.x,
                1. + alpha * self.one_over_radii_squared.y,
                1. + alpha * self.one_over_radii_squared.z,
            );
            let d2 = d.component_mul(&d);
            let d3 = d2.component_mul(&d);
            s = p2.component_div(&self.radii_squared.component_mul(&d2)).sum() - 1.;
            ds_dalpha = -2.
                * p2
                    .component_div(&self.radii_to_the_fourth.component_mul(&d3))
                    .sum();
            if s.abs() <= SURFACE_TOLERANCE {
                break;
            }
        }
        Point3::from(p.component_div(&d))
    }
}
