//! 3-D geometry for obstacle-loss computation.
//!
//! Contains:
//! - `Coord`: a 3-D vector with the usual componentwise and product operations
//! - `LineSegment`: an ordered endpoint pair, parameterized by t in [0, 1]
//! - `Polygon`: a convex planar polygon with outward edge normals
//! - `Prism`: a convex body extruded from a base polygon
//! - `Cuboid`: the axis-aligned special case, built from a size triple
//!
//! Intersection of a segment with a convex body uses the Cyrus-Beck scheme:
//! the parameter interval is clipped against every face half-space, keeping
//! the latest entry and the earliest exit.

use serde::Deserialize;
use std::ops::{Add, Mul, Neg, Sub};

use crate::error::{Error, Result};

/// A 3-D point or vector. Components are finite except where a caller
/// explicitly documents NaN as "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub const ZERO: Coord = Coord { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    pub fn dot(&self, other: &Coord) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    pub fn cross(&self, other: &Coord) -> Coord {
        Coord {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Euclidean length.
    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Distance to another point.
    pub fn distance_to(&self, other: &Coord) -> f64 {
        (*other - *self).length()
    }

    /// Componentwise minimum.
    pub fn min(&self, other: &Coord) -> Coord {
        Coord {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
            z: self.z.min(other.z),
        }
    }

    /// Componentwise maximum.
    pub fn max(&self, other: &Coord) -> Coord {
        Coord {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
            z: self.z.max(other.z),
        }
    }

    /// The vector scaled to unit length. Zero-length vectors stay zero.
    pub fn normalized(&self) -> Coord {
        let len = self.length();
        if len == 0.0 {
            Coord::ZERO
        } else {
            *self * (1.0 / len)
        }
    }
}

impl Add for Coord {
    type Output = Coord;
    fn add(self, rhs: Coord) -> Coord {
        Coord::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Coord {
    type Output = Coord;
    fn sub(self, rhs: Coord) -> Coord {
        Coord::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Coord {
    type Output = Coord;
    fn mul(self, rhs: f64) -> Coord {
        Coord::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Coord {
    type Output = Coord;
    fn neg(self) -> Coord {
        Coord::new(-self.x, -self.y, -self.z)
    }
}

/// An ordered pair of endpoints. Points on the segment are
/// `point1 + (point2 - point1) * t` for t in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub point1: Coord,
    pub point2: Coord,
}

impl LineSegment {
    pub fn new(point1: Coord, point2: Coord) -> Self {
        Self { point1, point2 }
    }

    pub fn direction(&self) -> Coord {
        self.point2 - self.point1
    }

    pub fn length(&self) -> f64 {
        self.direction().length()
    }
}

/// Result of clipping a segment against a convex body: the entry and exit
/// points and the outward normals of the faces they lie on. A zero normal
/// means the segment starts inside (entry) or ends inside (exit).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentIntersection {
    pub entry: Coord,
    pub exit: Coord,
    pub entry_normal: Coord,
    pub exit_normal: Coord,
}

/// Cyrus-Beck clip of a segment against face half-spaces given as
/// (point on face, outward normal) pairs.
///
/// Exact zero comparisons are intentional: tE starts at 0 and tL at 1, and
/// ties keep the earlier result. A face parallel to the segment (D == 0)
/// with the start point outside (N < 0) rejects the whole segment.
fn clip_segment<I>(faces: I, segment: &LineSegment) -> Option<SegmentIntersection>
where
    I: IntoIterator<Item = (Coord, Coord)>,
{
    let p0 = segment.point1;
    let direction = segment.direction();
    let mut t_entry = 0.0;
    let mut t_exit = 1.0;
    let mut entry_normal = Coord::ZERO;
    let mut exit_normal = Coord::ZERO;
    for (face_point, normal) in faces {
        let n = normal.dot(&(face_point - p0));
        let d = normal.dot(&direction);
        if d < 0.0 {
            // Entering the half-space
            let t = n / d;
            if t > t_entry {
                t_entry = t;
                entry_normal = normal;
                if t_entry > t_exit {
                    return None;
                }
            }
        } else if d > 0.0 {
            // Leaving the half-space
            let t = n / d;
            if t < t_exit {
                t_exit = t;
                exit_normal = normal;
                if t_exit < t_entry {
                    return None;
                }
            }
        } else if n < 0.0 {
            // Parallel and outside
            return None;
        }
    }
    if t_entry == 0.0 {
        entry_normal = Coord::ZERO;
    }
    if t_exit == 1.0 {
        exit_normal = Coord::ZERO;
    }
    Some(SegmentIntersection {
        entry: p0 + direction * t_entry,
        exit: p0 + direction * t_exit,
        entry_normal,
        exit_normal,
    })
}

/// A convex planar polygon given as an ordered sequence of at least three
/// coplanar points. Edges are the cyclic point pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Coord>,
}

impl Polygon {
    /// Fails with `InvalidConfiguration` for fewer than three points.
    pub fn new(points: Vec<Coord>) -> Result<Self> {
        if points.len() < 3 {
            return Err(Error::InvalidConfiguration(format!(
                "a polygon needs at least three points, got {}",
                points.len()
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Coord] {
        &self.points
    }

    /// Unit normal of the polygon plane, derived from the first three
    /// points. The caller must ensure they are not collinear.
    pub fn normal_unit_vector(&self) -> Coord {
        let a = self.points[1] - self.points[0];
        let b = self.points[2] - self.points[0];
        a.cross(&b).normalized()
    }

    /// Arithmetic mean of the points. Inside the polygon for convex input.
    pub fn centroid(&self) -> Coord {
        let sum = self
            .points
            .iter()
            .fold(Coord::ZERO, |acc, p| acc + *p);
        sum * (1.0 / self.points.len() as f64)
    }

    /// Componentwise extent of the point set.
    pub fn compute_size(&self) -> Coord {
        let mut min = self.points[0];
        let mut max = self.points[0];
        for p in &self.points {
            min = min.min(p);
            max = max.max(p);
        }
        max - min
    }

    /// Outward normal of edge i, lying in the polygon plane.
    ///
    /// Computed as edge x plane-normal and oriented away from the centroid.
    pub fn edge_outward_normal(&self, edge: usize) -> Coord {
        let p1 = self.points[edge];
        let p2 = self.points[(edge + 1) % self.points.len()];
        let mut normal = (p2 - p1).cross(&self.normal_unit_vector());
        if normal.dot(&(self.centroid() - p1)) > 0.0 {
            normal = -normal;
        }
        normal
    }

    /// Clip a coplanar segment against the polygon's edge half-spaces.
    ///
    /// Returns the entry and exit points together with the outward normals
    /// of the crossed edges, or `None` when the segment misses the polygon.
    pub fn compute_intersection(&self, segment: &LineSegment) -> Option<SegmentIntersection> {
        let faces = (0..self.points.len()).map(|i| (self.points[i], self.edge_outward_normal(i)));
        clip_segment(faces, segment)
    }
}

/// A convex body formed by extruding a base polygon along its plane normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Prism {
    base: Polygon,
    height: f64,
}

impl Prism {
    /// The base polygon must be convex; the extrusion height must be a
    /// positive finite length.
    pub fn new(base: Polygon, height: f64) -> Result<Self> {
        if !(height > 0.0 && height.is_finite()) {
            return Err(Error::InvalidConfiguration(format!(
                "prism height must be positive and finite, got {height}"
            )));
        }
        Ok(Self { base, height })
    }

    pub fn base(&self) -> &Polygon {
        &self.base
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Bounding-box extent of the prism.
    pub fn compute_size(&self) -> Coord {
        let normal = self.base.normal_unit_vector();
        let offset = normal * self.height;
        let mut min = self.base.points()[0];
        let mut max = self.base.points()[0];
        for p in self.base.points() {
            let top = *p + offset;
            min = min.min(p).min(&top);
            max = max.max(p).max(&top);
        }
        max - min
    }

    /// Clip a segment against the prism's faces (base, top and one side
    /// face per base edge).
    pub fn compute_intersection(&self, segment: &LineSegment) -> Option<SegmentIntersection> {
        let normal = self.base.normal_unit_vector();
        let base_point = self.base.points()[0];
        let top_point = base_point + normal * self.height;
        let caps = [(base_point, -normal), (top_point, normal)];
        let sides =
            (0..self.base.points().len()).map(|i| (self.base.points()[i], self.base.edge_outward_normal(i)));
        clip_segment(caps.into_iter().chain(sides), segment)
    }
}

/// An axis-aligned box with the given edge lengths, centered on the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Cuboid {
    size: Coord,
    prism: Prism,
}

impl Cuboid {
    /// All three edge lengths must be positive and finite.
    pub fn new(size: Coord) -> Result<Self> {
        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0)
            || !(size.x.is_finite() && size.y.is_finite() && size.z.is_finite())
        {
            return Err(Error::InvalidConfiguration(format!(
                "cuboid size must be positive and finite, got ({}, {}, {})",
                size.x, size.y, size.z
            )));
        }
        let hx = size.x / 2.0;
        let hy = size.y / 2.0;
        let hz = size.z / 2.0;
        // Bottom rectangle wound so that the derived plane normal points up
        let base = Polygon::new(vec![
            Coord::new(-hx, -hy, -hz),
            Coord::new(hx, -hy, -hz),
            Coord::new(hx, hy, -hz),
            Coord::new(-hx, hy, -hz),
        ])?;
        let prism = Prism::new(base, size.z)?;
        Ok(Self { size, prism })
    }

    pub fn size(&self) -> Coord {
        self.size
    }

    pub fn compute_size(&self) -> Coord {
        self.size
    }

    pub fn compute_intersection(&self, segment: &LineSegment) -> Option<SegmentIntersection> {
        self.prism.compute_intersection(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64, z: f64) -> Coord {
        Coord::new(x, y, z)
    }

    fn square() -> Polygon {
        Polygon::new(vec![
            c(0.0, 0.0, 0.0),
            c(4.0, 0.0, 0.0),
            c(4.0, 4.0, 0.0),
            c(0.0, 4.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn coord_products_and_distance() {
        let a = c(1.0, 2.0, 3.0);
        let b = c(4.0, -5.0, 6.0);
        assert_eq!(a.dot(&b), 1.0 * 4.0 + 2.0 * -5.0 + 3.0 * 6.0);
        let cr = a.cross(&b);
        assert_eq!(cr, c(2.0 * 6.0 - 3.0 * -5.0, 3.0 * 4.0 - 1.0 * 6.0, 1.0 * -5.0 - 2.0 * 4.0));
        assert!((c(3.0, 4.0, 0.0).length() - 5.0).abs() < 1e-12);
        assert!((c(1.0, 1.0, 1.0).distance_to(&c(1.0, 1.0, 3.0)) - 2.0).abs() < 1e-12);
        assert_eq!(a.min(&b), c(1.0, -5.0, 3.0));
        assert_eq!(a.max(&b), c(4.0, 2.0, 6.0));
    }

    #[test]
    fn polygon_needs_three_points() {
        assert!(Polygon::new(vec![c(0.0, 0.0, 0.0), c(1.0, 0.0, 0.0)]).is_err());
    }

    #[test]
    fn polygon_normal_and_outward_edges() {
        let square = square();
        assert_eq!(square.normal_unit_vector(), c(0.0, 0.0, 1.0));
        // Every outward normal points away from the centroid
        let centroid = square.centroid();
        for i in 0..4 {
            let n = square.edge_outward_normal(i);
            assert!(n.dot(&(centroid - square.points()[i])) < 0.0, "edge {i} normal points inward");
        }
    }

    #[test]
    fn polygon_clip_from_inside_to_outside() {
        let square = square();
        let segment = LineSegment::new(c(2.0, 2.0, 0.0), c(6.0, 2.0, 0.0));
        let hit = square.compute_intersection(&segment).unwrap();
        assert_eq!(hit.entry, c(2.0, 2.0, 0.0));
        assert_eq!(hit.exit, c(4.0, 2.0, 0.0));
        // Starts inside, so the entry normal is unspecified
        assert_eq!(hit.entry_normal, Coord::ZERO);
        // Exit through the +x edge
        let n = hit.exit_normal.normalized();
        assert!((n.x - 1.0).abs() < 1e-12 && n.y.abs() < 1e-12 && n.z.abs() < 1e-12);
    }

    #[test]
    fn polygon_clip_through_and_miss() {
        let square = square();
        let through = LineSegment::new(c(-1.0, 2.0, 0.0), c(5.0, 2.0, 0.0));
        let hit = square.compute_intersection(&through).unwrap();
        assert_eq!(hit.entry, c(0.0, 2.0, 0.0));
        assert_eq!(hit.exit, c(4.0, 2.0, 0.0));
        assert!((hit.entry_normal.normalized().x + 1.0).abs() < 1e-12);

        let miss = LineSegment::new(c(-1.0, 5.0, 0.0), c(5.0, 5.0, 0.0));
        assert!(square.compute_intersection(&miss).is_none());
    }

    #[test]
    fn clip_result_is_ordered_along_segment() {
        let square = square();
        let segment = LineSegment::new(c(-2.0, -2.0, 0.0), c(6.0, 6.0, 0.0));
        let hit = square.compute_intersection(&segment).unwrap();
        let d = segment.direction();
        let t1 = (hit.entry - segment.point1).dot(&d) / d.dot(&d);
        let t2 = (hit.exit - segment.point1).dot(&d) / d.dot(&d);
        assert!(0.0 <= t1 && t1 <= t2 && t2 <= 1.0);
    }

    #[test]
    fn prism_clip_reports_face_normals() {
        let base = square();
        let prism = Prism::new(base, 2.0).unwrap();
        // Horizontal segment through the middle of the prism
        let segment = LineSegment::new(c(-1.0, 2.0, 1.0), c(5.0, 2.0, 1.0));
        let hit = prism.compute_intersection(&segment).unwrap();
        assert_eq!(hit.entry, c(0.0, 2.0, 1.0));
        assert_eq!(hit.exit, c(4.0, 2.0, 1.0));
        // Vertical segment entering through the top cap
        let vertical = LineSegment::new(c(2.0, 2.0, 3.0), c(2.0, 2.0, -1.0));
        let hit = prism.compute_intersection(&vertical).unwrap();
        assert_eq!(hit.entry, c(2.0, 2.0, 2.0));
        assert_eq!(hit.exit, c(2.0, 2.0, 0.0));
        assert_eq!(hit.entry_normal.normalized(), c(0.0, 0.0, 1.0));
        assert_eq!(hit.exit_normal.normalized(), c(0.0, 0.0, -1.0));
        // Above the prism
        let above = LineSegment::new(c(-1.0, 2.0, 3.0), c(5.0, 2.0, 3.0));
        assert!(prism.compute_intersection(&above).is_none());
    }

    #[test]
    fn cuboid_is_centered_on_origin() {
        let cuboid = Cuboid::new(c(2.0, 4.0, 6.0)).unwrap();
        assert_eq!(cuboid.compute_size(), c(2.0, 4.0, 6.0));
        let segment = LineSegment::new(c(-5.0, 0.0, 0.0), c(5.0, 0.0, 0.0));
        let hit = cuboid.compute_intersection(&segment).unwrap();
        assert_eq!(hit.entry, c(-1.0, 0.0, 0.0));
        assert_eq!(hit.exit, c(1.0, 0.0, 0.0));
        assert!(Cuboid::new(c(0.0, 1.0, 1.0)).is_err());
    }
}
