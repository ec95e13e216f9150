// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Sensor Registry
//!
//! Owns world-anchored sensors, keeps their screen positions current and
//! drives a [`BatchComputeEngine`] at a fixed poll rate.
//!
//! The host calls [`SensorRegistry::tick`] once per rendered frame. Every
//! method takes `&self`, so the registry can be shared behind an `Arc` and
//! sensors added or removed from any thread.

use crate::batch::BatchComputeEngine;
use crate::collaborators::{FrameSource, NullSink, SensorEvent, SensorEventSink, Vec2, Vec3, WorldToScreen};
use crate::error::{Result, SensorError};
use ahash::AHashMap;
use luxsense_compute::{BackendConfig, Color};
use luxsense_config::LuxsenseConfig;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Registry-assigned sensor handle, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the registry knows about one sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorInfo {
    pub sensor_id: SensorId,
    pub world_position: Vec3,
    /// Last projected position; zero until a projector is bound
    pub screen_position: Vec2,
    #[serde(rename = "color")]
    pub last_color: Color,
    pub metadata_label: String,
    pub is_active: bool,
    /// When a pass last delivered a result for this sensor
    #[serde(skip)]
    pub last_update: Option<Instant>,
}

#[derive(Debug)]
struct SensorTable {
    sensors: Vec<SensorInfo>,
    index: AHashMap<SensorId, usize>,
    next_id: u32,
}

impl SensorTable {
    fn get(&self, id: SensorId) -> Option<&SensorInfo> {
        self.index.get(&id).map(|&i| &self.sensors[i])
    }

    fn get_mut(&mut self, id: SensorId) -> Option<&mut SensorInfo> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.sensors[i]),
            None => None,
        }
    }

    fn clear(&mut self) {
        self.sensors.clear();
        self.index.clear();
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.index.len() == self.sensors.len()
            && self
                .sensors
                .iter()
                .enumerate()
                .all(|(i, s)| self.index.get(&s.sensor_id) == Some(&i))
    }
}

struct Collaborators {
    projector: Option<Arc<dyn WorldToScreen>>,
    frames: Option<Arc<dyn FrameSource>>,
    sink: Arc<dyn SensorEventSink>,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    poll_interval: f64,
    time_accum: f64,
    auto_update_screen_positions: bool,
    use_gpu_acceleration: bool,
}

/// Poll interval in seconds for a requested rate, between 1 Hz and 100 Hz
fn poll_interval_for(hz: f64) -> f64 {
    (1.0 / hz.max(1.0)).max(0.01)
}

/// World-anchored light sensors sampled in batches
pub struct SensorRegistry {
    batch: BatchComputeEngine,
    /// Backend used while GPU acceleration is enabled
    preferred_backend: BackendConfig,
    table: Mutex<SensorTable>,
    collaborators: RwLock<Collaborators>,
    schedule: Mutex<Schedule>,
    initialized: AtomicBool,
    sampling: AtomicBool,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::from_config(&LuxsenseConfig::default())
    }

    pub fn with_backend_config(backend_config: BackendConfig) -> Self {
        Self::build(&LuxsenseConfig::default(), backend_config)
    }

    pub fn from_config(config: &LuxsenseConfig) -> Self {
        Self::build(config, BackendConfig::from(&config.compute))
    }

    fn build(config: &LuxsenseConfig, preferred_backend: BackendConfig) -> Self {
        let use_gpu = config.registry.use_gpu_acceleration;
        let batch_backend = if use_gpu {
            preferred_backend.clone()
        } else {
            BackendConfig::cpu()
        };

        Self {
            batch: BatchComputeEngine::from_config(&config.batch, batch_backend),
            preferred_backend,
            table: Mutex::new(SensorTable {
                sensors: Vec::new(),
                index: AHashMap::new(),
                next_id: 1,
            }),
            collaborators: RwLock::new(Collaborators {
                projector: None,
                frames: None,
                sink: Arc::new(NullSink),
            }),
            schedule: Mutex::new(Schedule {
                poll_interval: poll_interval_for(config.registry.poll_hz),
                time_accum: 0.0,
                auto_update_screen_positions: config.registry.auto_update_screen_positions,
                use_gpu_acceleration: use_gpu,
            }),
            initialized: AtomicBool::new(false),
            sampling: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.batch.initialize()?;
        self.initialized.store(true, Ordering::Release);
        info!(
            "Sensor registry initialized (backend: {})",
            self.batch.backend_name().unwrap_or_default()
        );
        Ok(())
    }

    /// Stop sampling, release the backend and forget every sensor
    pub fn shutdown(&self) {
        // Closed first so no add can slip in while the tables are torn down
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop_sampling();
        self.table.lock().clear();
        self.batch.shutdown();
        info!("Sensor registry shut down");
    }

    pub fn is_available(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && self.batch.is_available()
    }

    // ========================================================================
    // Collaborators
    // ========================================================================

    pub fn set_projector<P: WorldToScreen + 'static>(&self, projector: P) {
        self.collaborators.write().projector = Some(Arc::new(projector));
    }

    pub fn clear_projector(&self) {
        self.collaborators.write().projector = None;
    }

    pub fn set_frame_source<F: FrameSource + 'static>(&self, frames: F) {
        self.collaborators.write().frames = Some(Arc::new(frames));
    }

    pub fn set_event_sink<S: SensorEventSink + 'static>(&self, sink: S) {
        self.collaborators.write().sink = Arc::new(sink);
    }

    fn project(&self, world: Vec3) -> Option<Vec2> {
        let projector = self.collaborators.read().projector.clone();
        projector.and_then(|p| p.world_to_screen(world))
    }

    // ========================================================================
    // Sensors
    // ========================================================================

    /// Register a sensor at a world position
    ///
    /// Its screen position is projected immediately when a projector is
    /// bound and starts at zero otherwise. Fails with
    /// [`SensorError::CapacityExceeded`] when the batch engine is full; the
    /// registry is left unchanged in that case.
    pub fn add_sensor(&self, world_position: Vec3, metadata_label: impl Into<String>) -> Result<SensorId> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(SensorError::NotInitialized);
        }

        let screen_position = self.project(world_position).unwrap_or(Vec2::ZERO);

        let mut table = self.table.lock();
        // Re-checked under the lock; shutdown clears the table while holding it
        if !self.initialized.load(Ordering::Acquire) {
            return Err(SensorError::NotInitialized);
        }

        // Under the table lock so a concurrent remove cannot strand the region
        let sensor_id = SensorId(table.next_id);
        if !self
            .batch
            .add_sensor(sensor_id.0, screen_position.x, screen_position.y)
        {
            return Err(SensorError::CapacityExceeded {
                max: self.batch.get_max_sensors(),
            });
        }
        table.next_id += 1;

        let index = table.sensors.len();
        table.sensors.push(SensorInfo {
            sensor_id,
            world_position,
            screen_position,
            last_color: Color::BLACK,
            metadata_label: metadata_label.into(),
            is_active: true,
            last_update: None,
        });
        table.index.insert(sensor_id, index);

        debug!(sensor_id = sensor_id.0, "Sensor added");
        Ok(sensor_id)
    }

    /// Returns false for an unknown id
    pub fn remove_sensor(&self, sensor_id: SensorId) -> bool {
        let mut table = self.table.lock();
        let Some(removed) = table.index.remove(&sensor_id) else {
            return false;
        };

        table.sensors.remove(removed);
        for index in table.index.values_mut() {
            if *index > removed {
                *index -= 1;
            }
        }
        self.batch.remove_sensor(sensor_id.0);

        debug!(sensor_id = sensor_id.0, "Sensor removed");
        true
    }

    pub fn clear_all_sensors(&self) {
        let mut table = self.table.lock();
        table.clear();
        self.batch.clear_all_sensors();
    }

    pub fn sensor_count(&self) -> usize {
        self.table.lock().sensors.len()
    }

    // ========================================================================
    // Reads (unknown ids give defaults)
    // ========================================================================

    pub fn sensor_color(&self, sensor_id: SensorId) -> Color {
        self.table
            .lock()
            .get(sensor_id)
            .map_or(Color::BLACK, |s| s.last_color)
    }

    pub fn sensor_position(&self, sensor_id: SensorId) -> Vec3 {
        self.table
            .lock()
            .get(sensor_id)
            .map_or(Vec3::default(), |s| s.world_position)
    }

    pub fn sensor_screen_position(&self, sensor_id: SensorId) -> Vec2 {
        self.table
            .lock()
            .get(sensor_id)
            .map_or(Vec2::ZERO, |s| s.screen_position)
    }

    pub fn sensor_metadata(&self, sensor_id: SensorId) -> String {
        self.table
            .lock()
            .get(sensor_id)
            .map(|s| s.metadata_label.clone())
            .unwrap_or_default()
    }

    pub fn sensor_data(&self, sensor_id: SensorId) -> Option<SensorInfo> {
        self.table.lock().get(sensor_id).cloned()
    }

    pub fn all_sensor_data(&self) -> Vec<SensorInfo> {
        self.table.lock().sensors.clone()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn set_poll_hz(&self, hz: f64) {
        self.schedule.lock().poll_interval = poll_interval_for(hz);
    }

    pub fn poll_hz(&self) -> f64 {
        1.0 / self.schedule.lock().poll_interval
    }

    /// Clamped to [1, 16] and applied to every sensor
    pub fn set_sample_radius(&self, radius: i32) {
        self.batch.set_sample_radius(radius);
    }

    pub fn sample_radius(&self) -> i32 {
        self.batch.sample_radius()
    }

    pub fn set_auto_update_screen_positions(&self, enabled: bool) {
        self.schedule.lock().auto_update_screen_positions = enabled;
    }

    pub fn auto_update_screen_positions(&self) -> bool {
        self.schedule.lock().auto_update_screen_positions
    }

    /// Switch between the configured backend and the CPU backend
    ///
    /// Takes effect immediately when initialised; sensors are kept.
    pub fn set_use_gpu_acceleration(&self, enabled: bool) -> Result<()> {
        {
            let mut schedule = self.schedule.lock();
            if schedule.use_gpu_acceleration == enabled {
                return Ok(());
            }
            schedule.use_gpu_acceleration = enabled;
        }

        let config = if enabled {
            self.preferred_backend.clone()
        } else {
            BackendConfig::cpu()
        };
        self.batch.set_backend_config(config)
    }

    pub fn use_gpu_acceleration(&self) -> bool {
        self.schedule.lock().use_gpu_acceleration
    }

    pub fn is_using_gpu(&self) -> bool {
        self.batch.is_using_gpu()
    }

    pub fn backend_name(&self) -> Option<String> {
        self.batch.backend_name()
    }

    /// The underlying batch engine
    pub fn batch(&self) -> &BatchComputeEngine {
        &self.batch
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// No-op until initialised
    pub fn start_sampling(&self) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        self.schedule.lock().time_accum = 0.0;
        self.sampling.store(true, Ordering::Release);
        info!("Sensor sampling started at {:.1} Hz", self.poll_hz());
    }

    pub fn stop_sampling(&self) {
        if self.sampling.swap(false, Ordering::AcqRel) {
            info!("Sensor sampling stopped");
        }
    }

    pub fn is_sampling_active(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    /// Run one pass now, ignoring the poll interval
    pub fn force_update_all_sensors(&self) -> bool {
        self.process_sensors()
    }

    /// Override a sensor's screen position; false for an unknown id
    pub fn update_sensor_screen_position(&self, sensor_id: SensorId, screen_position: Vec2) -> bool {
        let mut table = self.table.lock();
        let Some(sensor) = table.get_mut(sensor_id) else {
            return false;
        };
        sensor.screen_position = screen_position;
        self.batch
            .add_sensor(sensor_id.0, screen_position.x, screen_position.y);
        true
    }

    /// Per-frame tick
    pub fn tick(&self, delta: f64) {
        if !self.sampling.load(Ordering::Acquire) || !self.initialized.load(Ordering::Acquire) {
            return;
        }

        let (due, auto_update) = {
            let mut schedule = self.schedule.lock();
            schedule.time_accum += delta;
            let due = schedule.time_accum >= schedule.poll_interval;
            if due {
                schedule.time_accum = 0.0;
            }
            (due, schedule.auto_update_screen_positions)
        };

        if auto_update {
            self.update_screen_positions();
        }
        if due {
            self.process_sensors();
        }
    }

    /// Re-project every sensor and move the regions that changed
    fn update_screen_positions(&self) {
        let Some(projector) = self.collaborators.read().projector.clone() else {
            return;
        };

        // Project outside the lock; the projector is host code
        let worlds: Vec<(SensorId, Vec3)> = self
            .table
            .lock()
            .sensors
            .iter()
            .map(|s| (s.sensor_id, s.world_position))
            .collect();
        let projected: Vec<(SensorId, Vec2)> = worlds
            .into_iter()
            .filter_map(|(id, world)| projector.world_to_screen(world).map(|p| (id, p)))
            .collect();

        let mut table = self.table.lock();
        for (sensor_id, screen_position) in projected {
            if let Some(sensor) = table.get_mut(sensor_id) {
                if sensor.screen_position != screen_position {
                    sensor.screen_position = screen_position;
                    self.batch
                        .add_sensor(sensor_id.0, screen_position.x, screen_position.y);
                }
            }
        }
    }

    /// One batch pass and the notification fan-out
    fn process_sensors(&self) -> bool {
        let frames = self.collaborators.read().frames.clone();
        let Some(frames) = frames else {
            debug!("No frame source bound, skipping pass");
            return false;
        };
        if !self.batch.process_sensors(frames.as_ref()) {
            return false;
        }

        let results = self.batch.get_all_results_by_id();
        let now = Instant::now();
        let changed: Vec<(SensorId, Color)> = {
            let mut table = self.table.lock();
            results
                .into_iter()
                .filter_map(|(id, color)| {
                    let sensor_id = SensorId(id);
                    let sensor = table.get_mut(sensor_id)?;
                    sensor.last_update = Some(now);
                    if sensor.last_color == color {
                        return None;
                    }
                    sensor.last_color = color;
                    Some((sensor_id, color))
                })
                .collect()
        };

        let sink = self.collaborators.read().sink.clone();
        for (sensor_id, color) in changed {
            sink.emit(&SensorEvent::SensorUpdated { sensor_id, color });
        }
        sink.emit(&SensorEvent::AllSensorsUpdated);
        true
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SensorRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
