//! Vector helpers and scalar boundary policies.

use std::f64::consts::TAU;

/// Point or vector in the structure frame.
pub type Vec3 = [f64; 3];

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Unit direction of a segment with polar angle `theta` and azimuth `phi`.
#[inline]
pub fn direction(theta: f64, phi: f64) -> Vec3 {
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi.sin_cos();
    [sin_t * cos_p, sin_t * sin_p, cos_t]
}

/// Reduce an angle to `[0, 2π)`.
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs.
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Reflect a value back into `[lo, hi]` by its overshoot.
///
/// `v > hi` maps to `2·hi − v` and `v < lo` to `2·lo − v`. Overshoots wider
/// than the interval keep bouncing between the bounds. A degenerate interval
/// collapses to `lo`.
pub fn reflect(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return lo;
    }
    if value > hi {
        let mirrored = 2.0 * hi - value;
        if mirrored >= lo {
            return mirrored;
        }
    } else if value < lo {
        let mirrored = 2.0 * lo - value;
        if mirrored <= hi {
            return mirrored;
        }
    } else {
        return value;
    }

    let width = hi - lo;
    let t = (value - lo).rem_euclid(2.0 * width);
    let folded = if t <= width { lo + t } else { hi - (t - width) };
    folded.clamp(lo, hi)
}

/// Snap a value exceeding `[lo, hi]` onto the exceeded bound.
#[inline]
pub fn snap(value: f64, lo: f64, hi: f64) -> f64 {
    if value > hi {
        hi
    } else if value < lo {
        lo
    } else {
        value
    }
}
