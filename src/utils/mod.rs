/// Utility functions and helpers for the simulation

pub mod spatial_hash;
pub use spatial_hash::*;

/// Mathematical utilities
pub mod math {
    use glam::Vec3;

    /// Smoothstep interpolation
    pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
        if edge1 <= edge0 {
            return if x < edge0 { 0.0 } else { 1.0 };
        }
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    /// Reflects the component of `velocity` heading into a surface with unit
    /// `normal`, keeping `damping` of it. Velocity leaving the surface is
    /// returned unchanged.
    pub fn reflect_damped(velocity: Vec3, normal: Vec3, damping: f32) -> Vec3 {
        let into = velocity.dot(normal);
        if into >= 0.0 {
            return velocity;
        }
        velocity - normal * into * (1.0 + damping)
    }

}
