//! Spherical linear interpolation between unit direction vectors

use sc_core::Vec3;

/// Endpoints closer than this interpolate linearly (numerically safer)
const DOT_LINEAR_THRESHOLD: f32 = 0.9995;

/// SLERP between two unit vectors.
///
/// Near-parallel endpoints fall back to normalized lerp; near-antipodal
/// endpoints rotate `a` around a perpendicular axis by `π·u` (the great
/// circle is ambiguous there, any consistent choice works).
pub fn slerp(a: Vec3, b: Vec3, u: f32) -> Vec3 {
    let dot = a.dot(&b).clamp(-1.0, 1.0);

    if dot > DOT_LINEAR_THRESHOLD {
        return a.lerp(&b, u).normalize_or_front();
    }

    if dot < -DOT_LINEAR_THRESHOLD {
        let axis = a.any_perpendicular();
        let angle = std::f32::consts::PI * u;
        // Rodrigues with axis ⊥ a: rotate a toward the antipode
        return a
            .scale(angle.cos())
            .add(&axis.cross(&a).scale(angle.sin()))
            .normalize_or_front();
    }

    let theta = dot.acos();
    let sin_theta = theta.sin();
    let wa = ((1.0 - u) * theta).sin() / sin_theta;
    let wb = (u * theta).sin() / sin_theta;
    a.scale(wa).add(&b.scale(wb))
}
