// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Batch Compute Engine
//!
//! Holds a table of sensor regions and averages all of them in a single
//! backend pass per frame.
//!
//! ## Locking
//! - `table` guards regions, results and the tuning knobs
//! - `backend` serialises passes; it is taken first and the table only
//!   briefly inside it, so a pass never blocks `add_sensor` for long
//! - `init_lock` only orders `initialize`/`shutdown`/backend rebuilds

use crate::collaborators::FrameSource;
use crate::error::Result;
use ahash::AHashMap;
use luxsense_compute::region::clamp_radius;
use luxsense_compute::{
    create_backend, BackendConfig, Color, ComputeBackend, DispatchConfig, SensorRegion,
};
use luxsense_config::BatchConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Regions and their last results, index-aligned
#[derive(Debug)]
struct SensorTable {
    regions: Vec<SensorRegion>,
    results: Vec<Color>,
    max_sensors: usize,
    sample_radius: i32,
    dispatch: DispatchConfig,
}

impl SensorTable {
    fn position(&self, sensor_id: u32) -> Option<usize> {
        self.regions.iter().position(|r| r.sensor_id == sensor_id)
    }

    fn enforce_capacity(&mut self) {
        if self.regions.len() > self.max_sensors {
            warn!(
                max_sensors = self.max_sensors,
                requested = self.regions.len(),
                "Sensor count exceeds maximum, truncating"
            );
            self.regions.truncate(self.max_sensors);
            self.results.truncate(self.max_sensors);
        }
    }
}

/// Sets the processing flag for the lifetime of one pass
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Averages many sensor regions per frame in one dispatch
pub struct BatchComputeEngine {
    backend_config: Mutex<BackendConfig>,
    backend: Mutex<Option<Box<dyn ComputeBackend>>>,
    table: Mutex<SensorTable>,
    initialized: AtomicBool,
    processing: AtomicBool,
    init_lock: Mutex<()>,
}

impl BatchComputeEngine {
    /// Engine with default tuning; the backend is built on [`initialize`](Self::initialize)
    pub fn new(backend_config: BackendConfig) -> Self {
        Self::from_config(&BatchConfig::default(), backend_config)
    }

    pub fn from_config(config: &BatchConfig, backend_config: BackendConfig) -> Self {
        let dispatch = DispatchConfig {
            use_optimized_kernel: config.use_optimized_kernel,
            sensors_per_thread: config.sensors_per_thread.clamp(1, 16),
        };

        Self {
            backend_config: Mutex::new(backend_config),
            backend: Mutex::new(None),
            table: Mutex::new(SensorTable {
                regions: Vec::new(),
                results: Vec::new(),
                max_sensors: config.max_sensors.max(1),
                sample_radius: clamp_radius(config.sample_radius),
                dispatch,
            }),
            initialized: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Build the compute backend
    ///
    /// Idempotent. On failure the engine stays unavailable and every
    /// `process_sensors` call returns false.
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let _init = self.init_lock.lock();
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let config = self.backend_config.lock().clone();
        let backend = create_backend(&config).map_err(|e| {
            warn!("Batch compute engine unavailable: {}", e);
            e
        })?;

        info!("Batch compute engine initialized ({})", backend.backend_name());
        *self.backend.lock() = Some(backend);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop the backend and forget every region
    pub fn shutdown(&self) {
        let _init = self.init_lock.lock();
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }

        self.processing.store(false, Ordering::Release);
        // Waits for an in-flight pass before the backend goes away
        self.backend.lock().take();
        {
            let mut table = self.table.lock();
            table.regions.clear();
            table.results.clear();
        }
        self.initialized.store(false, Ordering::Release);
        info!("Batch compute engine shut down");
    }

    pub fn is_available(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Replace the backend selection
    ///
    /// When already initialised the backend is rebuilt immediately and the
    /// region table is kept. A failed rebuild leaves the engine unavailable.
    pub fn set_backend_config(&self, config: BackendConfig) -> Result<()> {
        let _init = self.init_lock.lock();
        *self.backend_config.lock() = config.clone();
        if !self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut backend = self.backend.lock();
        match create_backend(&config) {
            Ok(new_backend) => {
                info!("Batch backend switched to {}", new_backend.backend_name());
                *backend = Some(new_backend);
                Ok(())
            }
            Err(e) => {
                warn!("Batch backend rebuild failed: {}", e);
                *backend = None;
                self.initialized.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Sensor table
    // ========================================================================

    /// Add or move a sensor using the engine's sample radius
    ///
    /// Returns false when a new id was dropped by the capacity cap.
    pub fn add_sensor(&self, sensor_id: u32, x: f32, y: f32) -> bool {
        let mut table = self.table.lock();
        let radius = table.sample_radius;
        Self::upsert(&mut table, sensor_id, x, y, radius)
    }

    /// Add or move a sensor with its own radius, clamped to [1, 16]
    pub fn add_sensor_with_radius(&self, sensor_id: u32, x: f32, y: f32, radius: i32) -> bool {
        let mut table = self.table.lock();
        Self::upsert(&mut table, sensor_id, x, y, radius)
    }

    /// True when the region is in the table afterwards
    fn upsert(table: &mut SensorTable, sensor_id: u32, x: f32, y: f32, radius: i32) -> bool {
        match table.position(sensor_id) {
            Some(index) => {
                let region = &mut table.regions[index];
                region.set_center(x, y);
                region.set_radius(radius);
                true
            }
            None => {
                table.regions.push(SensorRegion::new(sensor_id, x, y, radius));
                table.results.push(Color::BLACK);
                table.enforce_capacity();
                table.position(sensor_id).is_some()
            }
        }
    }

    pub fn remove_sensor(&self, sensor_id: u32) {
        let mut table = self.table.lock();
        if let Some(index) = table.position(sensor_id) {
            table.regions.remove(index);
            table.results.remove(index);
        }
    }

    pub fn clear_all_sensors(&self) {
        let mut table = self.table.lock();
        table.regions.clear();
        table.results.clear();
    }

    // ========================================================================
    // Tuning
    // ========================================================================

    /// Set the sample radius of every current and future region
    pub fn set_sample_radius(&self, radius: i32) {
        let mut table = self.table.lock();
        let radius = clamp_radius(radius);
        table.sample_radius = radius;
        for region in &mut table.regions {
            region.radius = radius;
        }
    }

    pub fn sample_radius(&self) -> i32 {
        self.table.lock().sample_radius
    }

    /// Soft cap checked on the next insert; existing regions are kept
    pub fn set_max_sensors(&self, max_sensors: usize) {
        self.table.lock().max_sensors = max_sensors.max(1);
    }

    pub fn set_use_optimized_kernel(&self, enabled: bool) {
        self.table.lock().dispatch.use_optimized_kernel = enabled;
    }

    pub fn set_sensors_per_thread(&self, count: u32) {
        self.table.lock().dispatch.sensors_per_thread = count.clamp(1, 16);
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        self.table.lock().dispatch
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Average every region of the current frame
    ///
    /// Returns false when the engine is not initialised, no frame is
    /// available or the pass fails. A failed pass keeps the previous results.
    pub fn process_sensors(&self, frames: &dyn FrameSource) -> bool {
        if !self.is_available() {
            return false;
        }
        // Frame acquisition counts as part of the pass
        let _processing = ProcessingGuard::new(&self.processing);
        let Some(frame) = frames.current_frame() else {
            debug!("No frame available, skipping batch pass");
            return false;
        };

        let mut slot = self.backend.lock();
        let Some(backend) = slot.as_mut() else {
            return false;
        };

        let (regions, dispatch) = {
            let table = self.table.lock();
            (table.regions.clone(), table.dispatch)
        };
        if regions.is_empty() {
            return true;
        }

        let colors = match backend.average_regions(&frame, &regions, &dispatch) {
            Ok(colors) => colors,
            Err(e) => {
                warn!("Batch pass failed on {}: {}", backend.backend_name(), e);
                return false;
            }
        };
        if colors.len() != regions.len() {
            warn!(
                expected = regions.len(),
                received = colors.len(),
                "Backend returned a partial result set, discarding pass"
            );
            return false;
        }

        // The table may have changed while the pass ran
        let mut table = self.table.lock();
        let index: AHashMap<u32, usize> = table
            .regions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.sensor_id, i))
            .collect();

        let mut updated = 0usize;
        for (region, color) in regions.iter().zip(colors) {
            if let (Some(color), Some(&i)) = (color, index.get(&region.sensor_id)) {
                table.results[i] = color;
                updated += 1;
            }
        }
        debug!(
            regions = regions.len(),
            updated,
            backend = backend.backend_name(),
            "Batch pass complete"
        );
        true
    }

    pub fn is_processing_active(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Last colour for a sensor, BLACK when the id is unknown
    pub fn get_sensor_result(&self, sensor_id: u32) -> Color {
        let table = self.table.lock();
        table
            .position(sensor_id)
            .map(|i| table.results[i])
            .unwrap_or(Color::BLACK)
    }

    /// Results in table order
    pub fn get_all_results(&self) -> Vec<Color> {
        self.table.lock().results.clone()
    }

    pub fn get_all_results_by_id(&self) -> Vec<(u32, Color)> {
        let table = self.table.lock();
        table
            .regions
            .iter()
            .zip(&table.results)
            .map(|(r, c)| (r.sensor_id, *c))
            .collect()
    }

    pub fn get_sensor_count(&self) -> usize {
        self.table.lock().regions.len()
    }

    pub fn get_max_sensors(&self) -> usize {
        self.table.lock().max_sensors
    }

    pub fn region(&self, sensor_id: u32) -> Option<SensorRegion> {
        let table = self.table.lock();
        table.position(sensor_id).map(|i| table.regions[i])
    }

    pub fn is_using_gpu(&self) -> bool {
        self.backend.lock().as_ref().map_or(false, |b| b.is_gpu())
    }

    /// Name of the active backend, `None` before initialisation
    pub fn backend_name(&self) -> Option<String> {
        self.backend
            .lock()
            .as_ref()
            .map(|b| b.backend_name().to_string())
    }
}

impl Default for BatchComputeEngine {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luxsense_compute::image::Rgba;
    use luxsense_compute::{ComputeError, Frame};

    fn cpu_engine() -> BatchComputeEngine {
        let engine = BatchComputeEngine::new(BackendConfig::cpu());
        engine.initialize().unwrap();
        engine
    }

    /// Backend that always fails, to exercise the abort path
    struct FailingBackend;

    impl ComputeBackend for FailingBackend {
        fn backend_name(&self) -> &str {
            "failing"
        }

        fn backend_type(&self) -> luxsense_compute::BackendType {
            luxsense_compute::BackendType::Cpu
        }

        fn average_samples(&mut self, _samples: &[[f32; 4]]) -> luxsense_compute::Result<Option<Color>> {
            Err(ComputeError::DispatchError("injected".to_string()))
        }

        fn average_regions(
            &mut self,
            _frame: &Frame,
            _regions: &[SensorRegion],
            _dispatch: &DispatchConfig,
        ) -> luxsense_compute::Result<Vec<Option<Color>>> {
            Err(ComputeError::DispatchError("injected".to_string()))
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let engine = cpu_engine();
        assert!(engine.is_available());
        engine.initialize().unwrap();
        assert!(engine.is_available());
        assert!(!engine.is_using_gpu());
        assert!(engine.backend_name().unwrap().starts_with("CPU"));
    }

    #[test]
    fn test_process_requires_initialization() {
        let engine = BatchComputeEngine::new(BackendConfig::cpu());
        engine.add_sensor(1, 2.0, 2.0);
        let frame = Frame::from_pixel(8, 8, Rgba([1.0, 1.0, 1.0, 1.0]));
        assert!(!engine.process_sensors(&frame));
        assert_eq!(engine.get_sensor_result(1), Color::BLACK);
    }

    #[test]
    fn test_process_without_frame_returns_false() {
        let engine = cpu_engine();
        engine.add_sensor(1, 2.0, 2.0);
        let no_frame = || None::<Frame>;
        assert!(!engine.process_sensors(&no_frame));
        assert!(!engine.is_processing_active());
    }

    #[test]
    fn test_processing_flag_covers_frame_fetch() {
        let engine = cpu_engine();
        engine.add_sensor(1, 2.0, 2.0);
        let seen_active = AtomicBool::new(false);
        let frames = || {
            seen_active.store(engine.is_processing_active(), Ordering::SeqCst);
            Some(Frame::from_pixel(8, 8, Rgba([1.0, 1.0, 1.0, 1.0])))
        };

        assert!(engine.process_sensors(&frames));
        assert!(seen_active.load(Ordering::SeqCst));
        assert!(!engine.is_processing_active());
    }

    #[test]
    fn test_add_reports_capacity_drop() {
        let engine = cpu_engine();
        engine.set_max_sensors(1);
        assert!(engine.add_sensor(1, 0.0, 0.0));
        assert!(!engine.add_sensor(2, 0.0, 0.0));
        // Moving an existing region never trips the cap
        assert!(engine.add_sensor(1, 3.0, 3.0));
        assert_eq!(engine.get_sensor_count(), 1);
    }

    #[test]
    fn test_empty_table_pass_succeeds() {
        let engine = cpu_engine();
        let frame = Frame::from_pixel(8, 8, Rgba([1.0, 1.0, 1.0, 1.0]));
        assert!(engine.process_sensors(&frame));
    }

    #[test]
    fn test_radius_clamped_on_insert_and_globally() {
        let engine = cpu_engine();
        engine.add_sensor_with_radius(1, 0.0, 0.0, 100);
        assert_eq!(engine.region(1).unwrap().radius, 16);
        engine.add_sensor_with_radius(2, 0.0, 0.0, -3);
        assert_eq!(engine.region(2).unwrap().radius, 1);

        engine.set_sample_radius(0);
        assert_eq!(engine.sample_radius(), 1);
        assert_eq!(engine.region(1).unwrap().radius, 1);
        assert_eq!(engine.region(2).unwrap().radius, 1);
    }

    #[test]
    fn test_tuning_clamps() {
        let engine = BatchComputeEngine::default();
        engine.set_sensors_per_thread(0);
        assert_eq!(engine.dispatch_config().sensors_per_thread, 1);
        engine.set_sensors_per_thread(99);
        assert_eq!(engine.dispatch_config().sensors_per_thread, 16);
        engine.set_max_sensors(0);
        assert_eq!(engine.get_max_sensors(), 1);
    }

    #[test]
    fn test_failed_pass_keeps_previous_results() {
        let engine = cpu_engine();
        engine.add_sensor(7, 4.0, 4.0);
        let white = Frame::from_pixel(8, 8, Rgba([1.0, 1.0, 1.0, 1.0]));
        assert!(engine.process_sensors(&white));
        assert_eq!(engine.get_sensor_result(7).r, 1.0);

        *engine.backend.lock() = Some(Box::new(FailingBackend));
        let black = Frame::from_pixel(8, 8, Rgba([0.0, 0.0, 0.0, 1.0]));
        assert!(!engine.process_sensors(&black));
        assert_eq!(engine.get_sensor_result(7).r, 1.0);
        assert!(!engine.is_processing_active());
    }

    #[test]
    fn test_shutdown_clears_table() {
        let engine = cpu_engine();
        engine.add_sensor(1, 0.0, 0.0);
        engine.shutdown();
        assert!(!engine.is_available());
        assert_eq!(engine.get_sensor_count(), 0);
        assert!(engine.backend_name().is_none());
        // Second shutdown is a no-op
        engine.shutdown();
    }

    #[test]
    fn test_backend_rebuild_keeps_regions() {
        let engine = cpu_engine();
        engine.add_sensor(3, 1.0, 1.0);
        engine.set_backend_config(BackendConfig::cpu()).unwrap();
        assert!(engine.is_available());
        assert_eq!(engine.get_sensor_count(), 1);
    }
}
