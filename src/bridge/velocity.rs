//! Velocity to control-axis mapping

use crate::device::ControlFrame;
use bridge_shared::Twist;
use std::f64::consts::PI;

/// Translate a velocity vector into a control frame.
///
/// Linear x/y/z drive roll/pitch/throttle; angular z is the yaw rate,
/// converted from rad/s to deg/s. Values pass through unclamped.
pub fn map_velocity(twist: &Twist) -> ControlFrame {
    let linear = twist.linear();
    let angular = twist.angular();

    ControlFrame {
        pitch: linear.y as f32,
        roll: linear.x as f32,
        yaw: (angular.z * 180.0 / PI) as f32,
        throttle: linear.z as f32,
    }
}
