// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Screen-space sample windows

/// Smallest accepted sample half-width
pub const MIN_SAMPLE_RADIUS: i32 = 1;
/// Largest accepted sample half-width
pub const MAX_SAMPLE_RADIUS: i32 = 16;
/// Default half-width: a 9x9 window of 81 samples
pub const DEFAULT_SAMPLE_RADIUS: i32 = 4;

/// One sensor's sample window
///
/// Layout matches the `Region` struct in `batch_average.wgsl` (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct SensorRegion {
    pub center_x: f32,
    pub center_y: f32,
    /// Half-width in pixels, always within [`MIN_SAMPLE_RADIUS`, `MAX_SAMPLE_RADIUS`]
    pub radius: i32,
    pub sensor_id: u32,
}

impl SensorRegion {
    /// Create a region, clamping `radius` into the accepted range
    pub fn new(sensor_id: u32, center_x: f32, center_y: f32, radius: i32) -> Self {
        Self {
            center_x,
            center_y,
            radius: clamp_radius(radius),
            sensor_id,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.center_x, self.center_y)
    }

    pub fn set_center(&mut self, center_x: f32, center_y: f32) {
        self.center_x = center_x;
        self.center_y = center_y;
    }

    pub fn set_radius(&mut self, radius: i32) {
        self.radius = clamp_radius(radius);
    }
}

/// Clamp a half-width into [`MIN_SAMPLE_RADIUS`, `MAX_SAMPLE_RADIUS`]
pub fn clamp_radius(radius: i32) -> i32 {
    radius.clamp(MIN_SAMPLE_RADIUS, MAX_SAMPLE_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_clamped_on_construction() {
        assert_eq!(SensorRegion::new(1, 0.0, 0.0, 0).radius, 1);
        assert_eq!(SensorRegion::new(1, 0.0, 0.0, -5).radius, 1);
        assert_eq!(SensorRegion::new(1, 0.0, 0.0, 99).radius, 16);
        assert_eq!(SensorRegion::new(1, 0.0, 0.0, 7).radius, 7);
    }

    #[test]
    fn test_gpu_layout_size() {
        assert_eq!(std::mem::size_of::<SensorRegion>(), 16);
    }
}
