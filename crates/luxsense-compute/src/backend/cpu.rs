// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # CPU Backend
//!
//! Runs the reference kernel, spreading large batches across the rayon pool.

use super::{BackendType, ComputeBackend, DispatchConfig};
use crate::{kernel, Color, Frame, Result, SensorRegion};
use rayon::prelude::*;

/// Below this many regions a batch runs on the calling thread
const PARALLEL_THRESHOLD: usize = 64;

/// CPU backend, always available
pub struct CpuBackend {
    name: String,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            name: format!("CPU (rayon, {} threads)", rayon::current_num_threads()),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn average_samples(&mut self, samples: &[[f32; 4]]) -> Result<Option<Color>> {
        Ok(kernel::average_samples(samples))
    }

    fn average_regions(
        &mut self,
        frame: &Frame,
        regions: &[SensorRegion],
        _dispatch: &DispatchConfig,
    ) -> Result<Vec<Option<Color>>> {
        let sample = |region: &SensorRegion| kernel::average_region(frame, region.center(), region.radius);

        if regions.len() < PARALLEL_THRESHOLD {
            Ok(regions.iter().map(sample).collect())
        } else {
            Ok(regions.par_iter().map(sample).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_cpu_backend_creation() {
        let backend = CpuBackend::new();
        assert!(backend.backend_name().starts_with("CPU"));
        assert_eq!(backend.backend_type(), BackendType::Cpu);
        assert!(backend.is_available());
        assert!(!backend.is_gpu());
    }

    #[test]
    fn test_parallel_and_serial_paths_agree() {
        let frame = Frame::from_fn(128, 128, |x, y| {
            Rgba([x as f32 / 128.0, y as f32 / 128.0, ((x + y) % 7) as f32 / 7.0, 1.0])
        });
        let regions: Vec<SensorRegion> = (0..200)
            .map(|i| SensorRegion::new(i, (i * 7 % 140) as f32, (i * 3 % 130) as f32, 4))
            .collect();

        let mut backend = CpuBackend::new();
        let parallel = backend
            .average_regions(&frame, &regions, &DispatchConfig::default())
            .unwrap();
        let serial = backend
            .average_regions(&frame, &regions[..10], &DispatchConfig::default())
            .unwrap();

        assert_eq!(parallel.len(), regions.len());
        assert_eq!(&parallel[..10], &serial[..]);
        for (region, result) in regions.iter().zip(&parallel) {
            assert_eq!(*result, kernel::average_region(&frame, region.center(), region.radius));
        }
    }
}
