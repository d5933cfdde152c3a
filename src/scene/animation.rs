//! Per-frame transform and lighting
//!
//! Every quantity here is a pure function of the frame input and the gear's
//! placement, so the animation has no state to accumulate and any instant
//! can be rendered directly.

use crate::backend::types::GearUniform;
use glam::{Mat4, Vec3};

/// Distance of the orbiting light from the scene origin
const LIGHT_ORBIT_RADIUS: f32 = 8.0;

/// Camera and timing state shared by every gear in a frame
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    pub projection: Mat4,
    /// View rotation around X and Y, in degrees
    pub view_rotation: Vec3,
    /// Camera distance along -Z
    pub zoom: f32,
    /// Animation clock in seconds
    pub time: f32,
}

/// Placement and spin of a single gear
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearPlacement {
    pub position: Vec3,
    /// Degrees per second around Z
    pub rotation_speed: f32,
    /// Phase offset in degrees.
    ///
    /// This is the sole source of desynchronization between gears; meshed
    /// gears stay visually interlocked by offset alone, with no tooth
    /// constraints.
    pub rotation_offset: f32,
}

impl GearPlacement {
    /// Z rotation at `time`, in degrees
    pub fn angle_at(&self, time: f32) -> f32 {
        self.rotation_speed * time + self.rotation_offset
    }
}

/// View matrix for the frame: a fixed look-at, then the user's X and Y
/// rotations applied on top
pub fn view_matrix(frame: &FrameInput) -> Mat4 {
    let view = Mat4::look_at_rh(
        Vec3::new(0.0, 0.0, -frame.zoom),
        Vec3::new(-1.0, -1.5, 0.0),
        Vec3::Y,
    );
    view * Mat4::from_rotation_x(frame.view_rotation.x.to_radians())
        * Mat4::from_rotation_y(frame.view_rotation.y.to_radians())
}

/// Light position at `time`: an orbit in the XZ plane at fixed height
pub fn light_position(time: f32) -> Vec3 {
    Vec3::new(
        time.to_radians().sin() * LIGHT_ORBIT_RADIUS,
        0.0,
        time.to_radians().cos() * LIGHT_ORBIT_RADIUS,
    )
}

/// Build the uniform block for one gear at one instant.
///
/// The normal matrix is the inverse transpose of view * model; the composed
/// rotations do not preserve normal directions under the plain model matrix.
pub fn gear_uniform(frame: &FrameInput, placement: &GearPlacement) -> GearUniform {
    let view = view_matrix(frame);
    let model = Mat4::from_translation(placement.position)
        * Mat4::from_rotation_z(placement.angle_at(frame.time).to_radians());

    GearUniform {
        projection: frame.projection,
        view,
        model,
        normal: (view * model).inverse().transpose(),
        light_pos: light_position(frame.time).extend(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(time: f32) -> FrameInput {
        FrameInput {
            projection: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 256.0),
            view_rotation: Vec3::new(-23.75, 41.25, 0.0),
            zoom: 16.0,
            time,
        }
    }

    fn placement() -> GearPlacement {
        GearPlacement {
            position: Vec3::new(-3.0, 0.0, 0.0),
            rotation_speed: 1.0,
            rotation_offset: 0.0,
        }
    }

    #[test]
    fn update_is_pure() {
        let a = gear_uniform(&frame(12.5), &placement());
        let b = gear_uniform(&frame(12.5), &placement());
        assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));
    }

    #[test]
    fn time_changes_only_model_and_light() {
        let a = gear_uniform(&frame(1.0), &placement());
        let b = gear_uniform(&frame(90.0), &placement());

        assert_eq!(a.projection, b.projection);
        assert_eq!(a.view, b.view);
        assert_ne!(a.model, b.model);
        assert_ne!(a.light_pos, b.light_pos);
    }

    #[test]
    fn zero_speed_pins_rotation_to_offset() {
        let spun = GearPlacement {
            rotation_speed: 0.0,
            rotation_offset: 90.0,
            ..placement()
        };
        let expected = Mat4::from_translation(spun.position)
            * Mat4::from_rotation_z(90f32.to_radians());

        for time in [0.0, 1.0, 77.7, 1e4] {
            assert_eq!(spun.angle_at(time), 90.0);
            let uniform = gear_uniform(&frame(time), &spun);
            assert!(uniform
                .model
                .to_cols_array()
                .iter()
                .zip(expected.to_cols_array().iter())
                .all(|(a, b)| (a - b).abs() < 1e-6));
        }
    }

    #[test]
    fn rotation_offset_desynchronizes() {
        let t = 3.0;
        let lead = placement();
        let lag = GearPlacement {
            rotation_offset: -9.0,
            ..lead
        };
        assert_eq!(lead.angle_at(t) - lag.angle_at(t), 9.0);
    }

    #[test]
    fn light_orbits_at_fixed_radius_and_height() {
        for time in [0.0, 30.0, 123.4, 359.0] {
            let light = light_position(time);
            assert_eq!(light.y, 0.0);
            let radius = (light.x * light.x + light.z * light.z).sqrt();
            assert!((radius - 8.0).abs() < 1e-4);
        }
        // At t = 0 the light sits on the +Z axis.
        let start = light_position(0.0);
        assert!((start - Vec3::new(0.0, 0.0, 8.0)).length() < 1e-6);
    }

    #[test]
    fn normal_matrix_is_inverse_transpose() {
        let uniform = gear_uniform(&frame(5.0), &placement());
        let expected = (uniform.view * uniform.model).inverse().transpose();
        assert_eq!(uniform.normal, expected);
    }
}
