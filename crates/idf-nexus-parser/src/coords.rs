// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion of IDF coordinates into the NeXus frame
//!
//! The NeXus frame has the beam along +z and +y pointing up, right handed.
//! IDF files may declare any other axis pair and handedness, spherical
//! positions and non-metre length units; everything is normalised here.

use idf_nexus_model::{AngleUnit, Axis, AxisConvention, Handedness, IdfError, Point, Result, SignedAxis};
use roxmltree::Node;

use crate::document::attr_f64;
use crate::units::Defaults;

/// Point from spherical coordinates
///
/// `theta` is the polar angle from +z and `phi` the azimuth from +x.
pub fn spherical_to_cartesian(r: f64, theta: f64, phi: f64, unit: AngleUnit) -> Point {
    let theta = unit.to_radians(theta);
    let phi = unit.to_radians(phi);
    Point::new(
        r * theta.sin() * phi.cos(),
        r * theta.sin() * phi.sin(),
        r * theta.cos(),
    )
}

/// Inverse of [`spherical_to_cartesian`], angles in degrees
pub fn cartesian_to_spherical(p: &Point) -> (f64, f64, f64) {
    let r = p.norm();
    if r == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let theta = (p.z / r).clamp(-1.0, 1.0).acos();
    let phi = p.y.atan2(p.x);
    (r, theta.to_degrees(), phi.to_degrees())
}

/// Derive the IDF to NeXus axis mapping from the declared reference frame
///
/// The beam axis maps onto NeXus z and the up axis onto NeXus y. The
/// remaining axis maps onto NeXus x with the sign of `up x beam`, flipped
/// once more for a left-handed frame.
pub fn derive_axis_convention(
    along_beam: SignedAxis,
    pointing_up: SignedAxis,
    handedness: Handedness,
) -> Result<AxisConvention> {
    let (third, cross_sign) = pointing_up.axis.cross(along_beam.axis).ok_or_else(|| {
        IdfError::reference_frame(format!(
            "along-beam and pointing-up are both the {} axis",
            along_beam.axis
        ))
    })?;

    let handed_sign = match handedness {
        Handedness::Right => 1.0,
        Handedness::Left => -1.0,
    };

    let mut nexus_axes = [Axis::X; 3];
    let mut signs = [1.0; 3];
    nexus_axes[along_beam.axis.index()] = Axis::Z;
    signs[along_beam.axis.index()] = along_beam.sign;
    nexus_axes[pointing_up.axis.index()] = Axis::Y;
    signs[pointing_up.axis.index()] = pointing_up.sign;
    nexus_axes[third.index()] = Axis::X;
    signs[third.index()] = cross_sign * along_beam.sign * pointing_up.sign * handed_sign;

    Ok(AxisConvention {
        nexus_axes,
        signs,
        along_beam,
        pointing_up,
        handedness,
    })
}

/// Converts raw IDF positions into metres in the NeXus frame
#[derive(Clone, Debug)]
pub struct CoordinateNormalizer {
    pub convention: AxisConvention,
    pub length_scale: f64,
    pub angle_unit: AngleUnit,
    /// Subtracted from top-level positions, NeXus frame
    pub origin: Point,
}

impl CoordinateNormalizer {
    /// Create a normalizer from the instrument defaults
    pub fn new(defaults: &Defaults) -> Result<Self> {
        let convention =
            derive_axis_convention(defaults.along_beam, defaults.pointing_up, defaults.handedness)?;
        Ok(Self {
            convention,
            length_scale: defaults.length_scale,
            angle_unit: defaults.angle_unit,
            origin: Point::zeros(),
        })
    }

    /// Set the origin for top-level positions
    pub fn with_origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    /// Permute and sign-flip into the NeXus frame
    ///
    /// Top-level positions are additionally made relative to the origin.
    pub fn to_nexus_frame(&self, raw: &Point, top_level: bool) -> Point {
        let p = self.convention.apply(raw);
        if top_level {
            p - self.origin
        } else {
            p
        }
    }

    /// Declared-unit angle in degrees
    pub fn angle_in_degrees(&self, angle: f64) -> f64 {
        match self.angle_unit {
            AngleUnit::Degrees => angle,
            AngleUnit::Radians => angle.to_degrees(),
        }
    }

    /// Scaled position of an element in the IDF frame
    ///
    /// Reads cartesian `x/y/z` or spherical `r/t/p`; missing components are
    /// zero. Spherical input needs the polar axis (the beam axis) to be z.
    pub fn raw_point(&self, node: Node<'_, '_>) -> Result<Point> {
        let r = attr_f64(node, "r")?;
        let t = attr_f64(node, "t")?;
        let p = attr_f64(node, "p")?;

        let point = if r.is_some() || t.is_some() || p.is_some() {
            self.check_spherical()?;
            spherical_to_cartesian(
                r.unwrap_or(0.0),
                t.unwrap_or(0.0),
                p.unwrap_or(0.0),
                self.angle_unit,
            )
        } else {
            Point::new(
                attr_f64(node, "x")?.unwrap_or(0.0),
                attr_f64(node, "y")?.unwrap_or(0.0),
                attr_f64(node, "z")?.unwrap_or(0.0),
            )
        };
        Ok(point * self.length_scale)
    }

    /// Spherical input needs the polar axis (the beam axis) along z
    pub fn check_spherical(&self) -> Result<()> {
        if self.convention.along_beam.axis != Axis::Z {
            return Err(IdfError::reference_frame(format!(
                "spherical coordinates need the polar axis along z, the beam is along {}",
                self.convention.along_beam.axis
            )));
        }
        Ok(())
    }

    /// Position of an element in the NeXus frame
    pub fn point(&self, node: Node<'_, '_>, top_level: bool) -> Result<Point> {
        Ok(self.to_nexus_frame(&self.raw_point(node)?, top_level))
    }

    /// Length value scaled to metres
    pub fn length(&self, value: f64) -> f64 {
        value * self.length_scale
    }

    /// Direction in the NeXus frame, not scaled
    pub fn direction(&self, raw: &Point) -> Point {
        self.convention.apply(raw)
    }
}
