use crate::num::{Matrix3, Number, Point2};

use itertools::Itertools;
use num_traits::Num;

/// Deviations below this are treated as a collapsed axis.
const MIN_DEVIATION: Number = 1e-12;

/// Eigenvalue ratio of the 2D scatter below which a point set is a line.
const COLLINEAR_RATIO: Number = 1e-10;

/// Center the points and scale each axis by its mean absolute deviation.
///
/// Returns the normalized points and the transform mapping original
/// homogeneous coordinates onto them.
pub fn normalize(points: &[Point2]) -> (Vec<Point2>, Matrix3) {
    let num_points = points.len().max(1) as Number;

    let (mean_x, mean_y) = {
        let points = points.iter().map(|p| (p.x, p.y));
        let (sum_x, sum_y) = sum_tuple2(points);
        (sum_x / num_points, sum_y / num_points)
    };

    let mut normalized = points
        .iter()
        .map(|p| Point2::new(p.x - mean_x, p.y - mean_y))
        .collect_vec();

    let (mean_l1_dev_x, mean_l1_dev_y) = {
        let points = normalized.iter().map(|p| (p.x.abs(), p.y.abs()));
        let (sum_x, sum_y) = sum_tuple2(points);
        (sum_x / num_points, sum_y / num_points)
    };

    // a collapsed axis keeps its unit scale
    let inv_or_one = |dev: Number| if dev > MIN_DEVIATION { 1.0 / dev } else { 1.0 };
    let mean_l1_dev_x_inv = inv_or_one(mean_l1_dev_x);
    let mean_l1_dev_y_inv = inv_or_one(mean_l1_dev_y);

    for point in normalized.iter_mut() {
        point.x *= mean_l1_dev_x_inv;
        point.y *= mean_l1_dev_y_inv;
    }

    let transform = Matrix3::new(
        mean_l1_dev_x_inv,
        0.0,
        -mean_x * mean_l1_dev_x_inv,
        0.0,
        mean_l1_dev_y_inv,
        -mean_y * mean_l1_dev_y_inv,
        0.0,
        0.0,
        1.0,
    );

    (normalized, transform)
}

/// Whether all points lie on one line (or coincide).
pub fn is_collinear(points: &[Point2]) -> bool {
    if points.len() < 3 {
        return true;
    }
    let num_points = points.len() as Number;
    let (sum_x, sum_y) = sum_tuple2(points.iter().map(|p| (p.x, p.y)));
    let (mean_x, mean_y) = (sum_x / num_points, sum_y / num_points);

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = p.x - mean_x;
        let dy = p.y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    // eigenvalues of the symmetric scatter matrix
    let half_trace = 0.5 * (sxx + syy);
    let radius = (0.25 * (sxx - syy) * (sxx - syy) + sxy * sxy).sqrt();
    let largest = half_trace + radius;
    let smallest = half_trace - radius;

    largest <= MIN_DEVIATION || smallest <= COLLINEAR_RATIO * largest
}

#[inline]
fn sum_tuple2<I, N>(iter: I) -> (N, N)
where
    I: Iterator<Item = (N, N)>,
    N: Num,
{
    iter.fold((N::zero(), N::zero()), |(x1, y1), (x2, y2)| {
        (x1 + x2, y1 + y2)
    })
}
