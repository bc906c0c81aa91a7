//! Joint geometry on normalized pose coordinates.

use tvtime_common::Landmark;

/// Angle in degrees at `vertex` between the rays towards `a` and `c`.
///
/// Computed from the difference of the two ray headings and folded into
/// `[0, 180]`, so the result does not depend on which side the limb bends to.
pub fn joint_angle(a: &Landmark, vertex: &Landmark, c: &Landmark) -> f32 {
    let radians = (c.y - vertex.y).atan2(c.x - vertex.x) - (a.y - vertex.y).atan2(a.x - vertex.x);
    let angle = radians.to_degrees().abs();

    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Population variance of `samples`; zero for an empty slice.
pub fn population_variance<I>(samples: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = samples.into_iter();
    let count = iter.clone().count();
    if count == 0 {
        return 0.0;
    }

    let mean = iter.clone().sum::<f64>() / count as f64;
    iter.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64
}
