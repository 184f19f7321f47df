//! Geometric primitives a boundary element can take.
//!
//! Polygons are stored as a corner plus two unit edge directions and two
//! lengths, so a triangle and a rectangle share one parametrisation:
//! `p(s, t) = p0 + s·a·n1 + t·b·n2`. Conic sections are strips of a surface
//! of revolution about the z axis.

use crate::error::BemError;
use crate::utils::Fingerprint;
use nalgebra::Vector3;
use std::f64::consts::PI;

pub type Point3 = Vector3<f64>;

#[derive(Clone, Debug, PartialEq)]
pub struct Triangle {
    pub p0: Point3,
    pub n1: Point3,
    pub n2: Point3,
    pub a: f64,
    pub b: f64,
}

impl Triangle {
    pub fn new(a: f64, b: f64, p0: Point3, n1: Point3, n2: Point3) -> Self {
        Triangle { p0, n1: n1.normalize(), n2: n2.normalize(), a, b }
    }

    pub fn from_vertices(p0: Point3, p1: Point3, p2: Point3) -> Self {
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let (a, b) = (e1.norm(), e2.norm());
        Triangle { p0, n1: e1 / a, n2: e2 / b, a, b }
    }

    pub fn vertices(&self) -> [Point3; 3] {
        [self.p0, self.p0 + self.n1 * self.a, self.p0 + self.n2 * self.b]
    }

    pub fn area(&self) -> f64 {
        0.5 * self.a * self.b * self.n1.cross(&self.n2).norm()
    }

    pub fn centroid(&self) -> Point3 {
        self.p0 + (self.n1 * self.a + self.n2 * self.b) / 3.0
    }

    pub fn normal(&self) -> Point3 {
        self.n1.cross(&self.n2).normalize()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rectangle {
    pub p0: Point3,
    pub n1: Point3,
    pub n2: Point3,
    pub a: f64,
    pub b: f64,
}

impl Rectangle {
    pub fn new(a: f64, b: f64, p0: Point3, n1: Point3, n2: Point3) -> Self {
        Rectangle { p0, n1: n1.normalize(), n2: n2.normalize(), a, b }
    }

    pub fn vertices(&self) -> [Point3; 4] {
        let ea = self.n1 * self.a;
        let eb = self.n2 * self.b;
        [self.p0, self.p0 + ea, self.p0 + ea + eb, self.p0 + eb]
    }

    pub fn area(&self) -> f64 {
        self.a * self.b * self.n1.cross(&self.n2).norm()
    }

    pub fn centroid(&self) -> Point3 {
        self.p0 + (self.n1 * self.a + self.n2 * self.b) * 0.5
    }

    pub fn normal(&self) -> Point3 {
        self.n1.cross(&self.n2).normalize()
    }
}

/// A thin cylindrical wire between two points.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSegment {
    pub p0: Point3,
    pub p1: Point3,
    pub diameter: f64,
}

impl LineSegment {
    pub fn new(p0: Point3, p1: Point3, diameter: f64) -> Self {
        LineSegment { p0, p1, diameter }
    }

    pub fn length(&self) -> f64 {
        (self.p1 - self.p0).norm()
    }

    pub fn axis(&self) -> Point3 {
        (self.p1 - self.p0) / self.length()
    }

    pub fn area(&self) -> f64 {
        PI * self.diameter * self.length()
    }

    pub fn centroid(&self) -> Point3 {
        (self.p0 + self.p1) * 0.5
    }

    /// A unit vector perpendicular to the wire axis.
    pub fn normal(&self) -> Point3 {
        let u = self.axis();
        let helper = if u.x.abs() < 0.9 { Point3::x() } else { Point3::y() };
        u.cross(&helper).normalize()
    }

    /// Charge per unit length carried by a unit surface density.
    pub fn line_density(&self) -> f64 {
        PI * self.diameter
    }
}

/// Strip of a surface of revolution about the z axis, from `(r0, z0)` to `(r1, z1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConicSection {
    pub r0: f64,
    pub z0: f64,
    pub r1: f64,
    pub z1: f64,
}

impl ConicSection {
    pub fn new(r0: f64, z0: f64, r1: f64, z1: f64) -> Self {
        ConicSection { r0, z0, r1, z1 }
    }

    pub fn length(&self) -> f64 {
        ((self.r1 - self.r0).powi(2) + (self.z1 - self.z0).powi(2)).sqrt()
    }

    pub fn area(&self) -> f64 {
        PI * (self.r0 + self.r1) * self.length()
    }

    /// Midpoint of the generator, placed in the x–z half plane.
    pub fn centroid(&self) -> Point3 {
        Point3::new(0.5 * (self.r0 + self.r1), 0.0, 0.5 * (self.z0 + self.z1))
    }

    /// (r, z) components of the generator normal.
    pub fn meridian_normal(&self) -> (f64, f64) {
        let l = self.length();
        ((self.z1 - self.z0) / l, -(self.r1 - self.r0) / l)
    }

    pub fn normal(&self) -> Point3 {
        let (nr, nz) = self.meridian_normal();
        Point3::new(nr, 0.0, nz)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Triangle(Triangle),
    Rectangle(Rectangle),
    LineSegment(LineSegment),
    ConicSection(ConicSection),
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Triangle(_) => "triangle",
            Shape::Rectangle(_) => "rectangle",
            Shape::LineSegment(_) => "line segment",
            Shape::ConicSection(_) => "conic section",
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            Shape::Triangle(t) => t.area(),
            Shape::Rectangle(r) => r.area(),
            Shape::LineSegment(l) => l.area(),
            Shape::ConicSection(c) => c.area(),
        }
    }

    pub fn centroid(&self) -> Point3 {
        match self {
            Shape::Triangle(t) => t.centroid(),
            Shape::Rectangle(r) => r.centroid(),
            Shape::LineSegment(l) => l.centroid(),
            Shape::ConicSection(c) => c.centroid(),
        }
    }

    pub fn normal(&self) -> Point3 {
        match self {
            Shape::Triangle(t) => t.normal(),
            Shape::Rectangle(r) => r.normal(),
            Shape::LineSegment(l) => l.normal(),
            Shape::ConicSection(c) => c.normal(),
        }
    }

    /// Largest extent of the element, used to decide when a target is "near".
    pub fn size(&self) -> f64 {
        let c = self.centroid();
        match self {
            Shape::Triangle(t) => 2.0 * t.vertices().iter().map(|v| (v - c).norm()).fold(0.0, f64::max),
            Shape::Rectangle(r) => 2.0 * r.vertices().iter().map(|v| (v - c).norm()).fold(0.0, f64::max),
            Shape::LineSegment(l) => l.length().max(l.diameter),
            Shape::ConicSection(c) => c.length(),
        }
    }

    /// Corners of a flat polygon, in counter-clockwise order about the normal.
    pub fn polygon(&self) -> Option<Vec<Point3>> {
        match self {
            Shape::Triangle(t) => Some(t.vertices().to_vec()),
            Shape::Rectangle(r) => Some(r.vertices().to_vec()),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<(), BemError> {
        let area = self.area();
        if !area.is_finite() || area <= 0.0 {
            return Err(BemError::DegenerateGeometry(format!(
                "{} with non-positive area {area:e}",
                self.name()
            )));
        }
        if !self.normal().iter().all(|v| v.is_finite()) {
            return Err(BemError::DegenerateGeometry(format!("{} has no normal", self.name())));
        }
        Ok(())
    }

    pub(crate) fn hash_into(&self, fp: &mut Fingerprint) {
        match self {
            Shape::Triangle(t) => {
                fp.u64(1);
                for v in t.vertices() {
                    fp.f64(v.x).f64(v.y).f64(v.z);
                }
            }
            Shape::Rectangle(r) => {
                fp.u64(2);
                for v in r.vertices() {
                    fp.f64(v.x).f64(v.y).f64(v.z);
                }
            }
            Shape::LineSegment(l) => {
                fp.u64(3);
                for v in [l.p0, l.p1] {
                    fp.f64(v.x).f64(v.y).f64(v.z);
                }
                fp.f64(l.diameter);
            }
            Shape::ConicSection(c) => {
                fp.u64(4).f64(c.r0).f64(c.z0).f64(c.r1).f64(c.z1);
            }
        }
    }
}

impl From<Triangle> for Shape {
    fn from(t: Triangle) -> Self {
        Shape::Triangle(t)
    }
}

impl From<Rectangle> for Shape {
    fn from(r: Rectangle) -> Self {
        Shape::Rectangle(r)
    }
}

impl From<LineSegment> for Shape {
    fn from(l: LineSegment) -> Self {
        Shape::LineSegment(l)
    }
}

impl From<ConicSection> for Shape {
    fn from(c: ConicSection) -> Self {
        Shape::ConicSection(c)
    }
}
