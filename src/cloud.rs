use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::num::{Number, Point3, Vector4};

/// Triangulated points of every processed pair, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    homogeneous: Vec<Vector4>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, points: impl IntoIterator<Item = Vector4>) {
        self.homogeneous.extend(points);
    }

    pub fn len(&self) -> usize {
        self.homogeneous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.homogeneous.is_empty()
    }

    pub fn homogeneous(&self) -> &[Vector4] {
        &self.homogeneous
    }

    /// Euclidean coordinates of every point.
    pub fn points(&self) -> Vec<Point3> {
        self.homogeneous
            .iter()
            .map(|p| Point3::from(p.xyz() / p.w))
            .collect()
    }

    pub fn centroid(&self) -> Option<Point3> {
        if self.is_empty() {
            return None;
        }
        let sum = self
            .points()
            .iter()
            .fold(Point3::origin().coords, |sum, p| sum + p.coords);
        Some(Point3::from(sum / self.len() as Number))
    }

    /// One `x y z` line per point.
    pub fn to_writer<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for point in self.points() {
            writeln!(writer, "{} {} {}", point.x, point.y, point.z)?;
        }
        writer.flush()
    }

    pub fn write_xyz(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }
}
