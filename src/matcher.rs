//! Descriptor matching between two frames with Lowe's ratio test.

use crate::config::MatcherConfig;
use crate::error::SolverError;
use crate::feature::Features;
use crate::num::{Number, Point2};

use itertools::Itertools;
use rayon::prelude::*;

/// Index-aligned keypoint pairs: `pts1[i]` in the previous frame matches
/// `pts2[i]` in the current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    pub pts1: Vec<Point2>,
    pub pts2: Vec<Point2>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.pts1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pts1.is_empty()
    }

    /// Keep the pairs whose `mask` entry is set, in order.
    pub fn filter(&self, mask: &[bool]) -> Correspondences {
        let (pts1, pts2) = self
            .pts1
            .iter()
            .zip(self.pts2.iter())
            .zip(mask.iter())
            .filter(|(_, keep)| **keep)
            .map(|((&p1, &p2), _)| (p1, p2))
            .unzip();
        Correspondences { pts1, pts2 }
    }
}

/// For each descriptor of `previous`, its two nearest neighbours in `current`.
/// A match is kept when the nearest is closer than `ratio` times the second.
pub fn match_features(
    previous: &Features,
    current: &Features,
    config: &MatcherConfig,
) -> Result<Correspondences, SolverError> {
    if let (Some(expected), Some(found)) = (previous.dimension(), current.dimension()) {
        if expected != found {
            return Err(SolverError::DescriptorDimension { expected, found });
        }
    }

    let targets = current.descriptors();
    let matches = if targets.len() < 2 {
        Vec::new()
    } else {
        previous
            .descriptors()
            .par_iter()
            .enumerate()
            .filter_map(|(source, descriptor)| {
                let (best, best_distance, second_distance) = two_nearest(descriptor, targets);
                if best_distance < config.ratio * second_distance {
                    Some((source, best))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
    };

    if matches.len() < config.min_matches {
        return Err(SolverError::InsufficientMatches {
            found: matches.len(),
            required: config.min_matches,
        });
    }

    let (pts1, pts2) = matches
        .iter()
        .map(|&(source, target)| (previous.keypoints()[source], current.keypoints()[target]))
        .unzip();
    Ok(Correspondences { pts1, pts2 })
}

/// Index of the nearest target and the two smallest L2 distances.
fn two_nearest(descriptor: &[f32], targets: &[Vec<f32>]) -> (usize, Number, Number) {
    let mut best = (usize::MAX, Number::INFINITY);
    let mut second = Number::INFINITY;
    for (index, target) in targets.iter().enumerate() {
        let distance = distance_sq(descriptor, target);
        if distance < best.1 {
            second = best.1;
            best = (index, distance);
        } else if distance < second {
            second = distance;
        }
    }
    (best.0, best.1.sqrt(), second.sqrt())
}

#[inline]
fn distance_sq(a: &[f32], b: &[f32]) -> Number {
    a.iter()
        .zip_eq(b.iter())
        .map(|(&x, &y)| {
            let d = x as Number - y as Number;
            d * d
        })
        .sum()
}
