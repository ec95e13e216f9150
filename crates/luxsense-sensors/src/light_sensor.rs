// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Single Light Sensor
//!
//! Samples one small window of the frame and publishes its colour and
//! luminance.
//!
//! ## Sampling paths
//! - **Compute worker**: when a backend is installed, the owning thread copies
//!   the window into a staging buffer and wakes a dedicated worker that runs
//!   the reduction on the backend.
//! - **CPU fallback**: without a backend the owning thread averages the window
//!   itself, only every `cpu_frame_skip_interval` polls.
//!
//! Notifications are always emitted from [`LightSensor::process`] or
//! [`LightSensor::refresh`], i.e. on the owning thread.

use crate::collaborators::{FrameSource, NullSink, SensorEvent, SensorEventSink, Vec2};
use crate::error::{Result, SensorError};
use luxsense_compute::backend::create_gpu_backend;
use luxsense_compute::{kernel, Color, ComputeBackend, Frame, DEFAULT_SAMPLE_RADIUS};
use luxsense_config::{BackendPreference, ComputeConfig, GpuBackendSet, SensorConfig};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Half-width of the sampled window (9x9 pixels)
const SAMPLE_RADIUS: i32 = DEFAULT_SAMPLE_RADIUS;

/// How a sensor turns frames into readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingStrategy {
    ComputeWorker,
    CpuFallback,
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingStrategy::ComputeWorker => write!(f, "Compute worker with staged samples"),
            SamplingStrategy::CpuFallback => write!(f, "CPU fallback with frame skipping"),
        }
    }
}

/// Snapshot of a sensor's published reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightData {
    pub color: Color,
    pub light_level: f32,
    pub metadata_label: String,
}

/// Samples handed from the owning thread to the worker
#[derive(Debug, Default)]
struct Staging {
    samples: Vec<[f32; 4]>,
    width: u32,
    height: u32,
    ready: bool,
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    color: Color,
    light_level: f32,
}

/// State shared with the worker thread
struct Shared {
    staging: Mutex<Staging>,
    staged: Condvar,
    running: AtomicBool,
    backend: Mutex<Option<Box<dyn ComputeBackend>>>,
    reading: Mutex<Reading>,
    has_new_reading: AtomicBool,
}

impl Shared {
    fn publish(&self, color: Color) {
        let color = Color::new(color.r, color.g, color.b, 1.0);
        *self.reading.lock() = Reading {
            color,
            light_level: kernel::luminance(&color),
        };
        self.has_new_reading.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct PerfStats {
    average_ms: f64,
    sample_count: u64,
}

/// One screen-space light sensor
pub struct LightSensor {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    sink: Arc<dyn SensorEventSink>,
    gpu_backends: GpuBackendSet,
    allow_gpu: bool,
    metadata_label: String,
    screen_sample_pos: Option<Vec2>,
    poll_interval: f64,
    time_accum: f64,
    frame_skip_interval: u32,
    frame_skip_counter: u32,
    performance_target_ms: f64,
    worker_wait_timeout: Duration,
    perf: PerfStats,
}

impl LightSensor {
    pub fn new() -> Self {
        Self::from_config(&SensorConfig::default(), &ComputeConfig::default())
    }

    pub fn from_config(config: &SensorConfig, compute: &ComputeConfig) -> Self {
        let mut sensor = Self {
            shared: Arc::new(Shared {
                staging: Mutex::new(Staging::default()),
                staged: Condvar::new(),
                running: AtomicBool::new(false),
                backend: Mutex::new(None),
                reading: Mutex::new(Reading {
                    color: Color::BLACK,
                    light_level: 0.0,
                }),
                has_new_reading: AtomicBool::new(false),
            }),
            worker: None,
            sink: Arc::new(NullSink),
            gpu_backends: compute.gpu_backends,
            allow_gpu: compute.backend != BackendPreference::Cpu,
            metadata_label: String::new(),
            screen_sample_pos: None,
            poll_interval: 0.0,
            time_accum: 0.0,
            frame_skip_interval: config.cpu_frame_skip_interval.max(1),
            frame_skip_counter: 0,
            performance_target_ms: config.performance_target_ms,
            worker_wait_timeout: Duration::from_millis(config.worker_wait_timeout_ms.max(1)),
            perf: PerfStats::default(),
        };
        sensor.set_poll_hz(config.poll_hz);
        sensor
    }

    /// Install a specific backend, replacing any existing one
    ///
    /// Takes effect on the next [`start`](Self::start).
    pub fn with_backend(self, backend: Box<dyn ComputeBackend>) -> Self {
        *self.shared.backend.lock() = Some(backend);
        self
    }

    pub fn set_event_sink<S: SensorEventSink + 'static>(&mut self, sink: S) {
        self.sink = Arc::new(sink);
    }

    /// Install a GPU backend if this platform has one
    ///
    /// Returns whether a backend is installed afterwards. Without one the
    /// sensor samples on the CPU.
    pub fn initialize_compute(&mut self) -> bool {
        let mut backend = self.shared.backend.lock();
        if backend.is_some() {
            return true;
        }
        if !self.allow_gpu {
            debug!("GPU disabled by configuration, using CPU fallback");
            return false;
        }

        match create_gpu_backend(self.gpu_backends) {
            Ok(gpu) => {
                info!("Light sensor using {}", gpu.backend_name());
                *backend = Some(gpu);
                true
            }
            Err(e) => {
                debug!("No GPU backend for light sensor ({}), using CPU fallback", e);
                false
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin sampling; spawns the worker thread when a backend is installed
    pub fn start(&mut self) -> Result<()> {
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }

        self.shared.running.store(true, Ordering::Release);
        self.time_accum = 0.0;
        self.frame_skip_counter = 0;

        if self.shared.backend.lock().is_none() {
            info!("Light sensor started ({})", SamplingStrategy::CpuFallback);
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let wait_timeout = self.worker_wait_timeout;
        let handle = thread::Builder::new()
            .name("luxsense-light-sensor".to_string())
            .spawn(move || worker_loop(shared, wait_timeout))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                SensorError::WorkerSpawn(e.to_string())
            })?;
        self.worker = Some(handle);

        info!("Light sensor started ({})", SamplingStrategy::ComputeWorker);
        Ok(())
    }

    /// Stop sampling and join the worker
    pub fn stop(&mut self) {
        {
            // Flip the flag under the staging lock so a waiting worker cannot miss it
            let mut staging = self.shared.staging.lock();
            self.shared.running.store(false, Ordering::Release);
            // Samples from before a restart must never be published
            staging.ready = false;
            staging.samples.clear();
        }
        self.shared.staged.notify_all();

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Light sensor worker panicked during shutdown");
            } else {
                debug!("Light sensor worker stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    /// Per-frame tick on the owning thread
    ///
    /// Samples when the poll interval has elapsed, then emits any reading the
    /// worker (or the CPU path) has published since the last tick.
    pub fn process(&mut self, delta: f64, frames: &dyn FrameSource) {
        if self.is_running() {
            self.time_accum += delta;
            if self.time_accum >= self.poll_interval {
                self.time_accum = 0.0;
                if self.worker.is_some() {
                    if let Some(frame) = frames.current_frame() {
                        self.stage_samples(&frame);
                    }
                } else {
                    self.sample_cpu_with_skip(frames);
                }
            }
        }

        if self.shared.has_new_reading.swap(false, Ordering::AcqRel) {
            self.emit_reading();
        }
    }

    /// Sample synchronously on the calling thread, whatever the state
    ///
    /// Always emits both notifications, with the previous reading if no frame
    /// was available.
    pub fn refresh(&mut self, frames: &dyn FrameSource) -> LightData {
        if let Some(frame) = frames.current_frame() {
            self.sample_cpu(&frame);
        }
        self.shared.has_new_reading.store(false, Ordering::Release);
        self.emit_reading();
        self.light_data()
    }

    fn emit_reading(&self) {
        let reading = *self.shared.reading.lock();
        self.sink.emit(&SensorEvent::ColorUpdated(reading.color));
        self.sink
            .emit(&SensorEvent::LightLevelUpdated(reading.light_level));
    }

    fn sample_center(&self, frame: &Frame) -> (f32, f32) {
        match self.screen_sample_pos {
            Some(pos) => pos.as_tuple(),
            None => ((frame.width() / 2) as f32, (frame.height() / 2) as f32),
        }
    }

    fn sample_cpu_with_skip(&mut self, frames: &dyn FrameSource) {
        self.frame_skip_counter += 1;
        if self.frame_skip_counter < self.frame_skip_interval {
            return;
        }
        self.frame_skip_counter = 0;

        if let Some(frame) = frames.current_frame() {
            self.sample_cpu(&frame);
        }
    }

    fn sample_cpu(&mut self, frame: &Frame) {
        let started = Instant::now();
        let center = self.sample_center(frame);
        if let Some(color) = kernel::average_region(frame, center, SAMPLE_RADIUS) {
            self.shared.publish(color);
        }
        self.record_sample_time(started.elapsed());
    }

    fn stage_samples(&mut self, frame: &Frame) {
        let started = Instant::now();
        let center = self.sample_center(frame);

        // Off-frame window: keep the previous reading
        if let Some(window) = kernel::clip_window(frame.width(), frame.height(), center, SAMPLE_RADIUS) {
            let samples = kernel::extract_region(frame, center, SAMPLE_RADIUS);
            {
                let mut staging = self.shared.staging.lock();
                staging.samples = samples;
                staging.width = window.width();
                staging.height = window.height();
                staging.ready = true;
            }
            self.shared.staged.notify_one();
        }
        self.record_sample_time(started.elapsed());
    }

    fn record_sample_time(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.perf.sample_count += 1;
        let n = self.perf.sample_count as f64;
        self.perf.average_ms = (self.perf.average_ms * (n - 1.0) + ms) / n;

        if ms > self.performance_target_ms {
            debug!(
                sample_ms = ms,
                target_ms = self.performance_target_ms,
                "Sample time exceeds target"
            );
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn color(&self) -> Color {
        self.shared.reading.lock().color
    }

    pub fn light_level(&self) -> f32 {
        self.shared.reading.lock().light_level
    }

    pub fn light_data(&self) -> LightData {
        let reading = *self.shared.reading.lock();
        LightData {
            color: reading.color,
            light_level: reading.light_level,
            metadata_label: self.metadata_label.clone(),
        }
    }

    pub fn metadata_label(&self) -> &str {
        &self.metadata_label
    }

    pub fn set_metadata_label(&mut self, label: impl Into<String>) {
        self.metadata_label = label.into();
    }

    /// Sample around `pos` instead of the frame centre
    pub fn set_screen_sample_pos(&mut self, pos: Vec2) {
        self.screen_sample_pos = Some(pos);
    }

    pub fn clear_screen_sample_pos(&mut self) {
        self.screen_sample_pos = None;
    }

    /// `None` means the frame centre
    pub fn screen_sample_pos(&self) -> Option<Vec2> {
        self.screen_sample_pos
    }

    /// Poll rate in Hz, at least 1 Hz and at most 100 Hz
    pub fn set_poll_hz(&mut self, hz: f64) {
        self.poll_interval = (1.0 / hz.max(1.0)).max(0.01);
    }

    pub fn poll_hz(&self) -> f64 {
        1.0 / self.poll_interval
    }

    pub fn is_using_gpu(&self) -> bool {
        self.shared
            .backend
            .lock()
            .as_ref()
            .map_or(false, |b| b.is_gpu())
    }

    pub fn sampling_strategy(&self) -> SamplingStrategy {
        if self.shared.backend.lock().is_some() {
            SamplingStrategy::ComputeWorker
        } else {
            SamplingStrategy::CpuFallback
        }
    }

    pub fn platform_info(&self) -> String {
        luxsense_compute::platform_info()
    }

    pub fn support_status(&self) -> String {
        luxsense_compute::support_status(self.gpu_backends)
    }

    /// Running average of sample time in milliseconds
    pub fn average_sample_time(&self) -> f64 {
        self.perf.average_ms
    }

    pub fn reset_performance_stats(&mut self) {
        self.perf = PerfStats::default();
    }
}

impl Default for LightSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LightSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker thread: consume staged samples until stopped
fn worker_loop(shared: Arc<Shared>, wait_timeout: Duration) {
    debug!("Light sensor worker running");

    loop {
        let (samples, width, height) = {
            let mut staging = shared.staging.lock();
            while !staging.ready && shared.running.load(Ordering::Acquire) {
                shared.staged.wait_for(&mut staging, wait_timeout);
            }
            if !shared.running.load(Ordering::Acquire) {
                break;
            }
            staging.ready = false;
            (
                std::mem::take(&mut staging.samples),
                staging.width,
                staging.height,
            )
        };

        let result = match shared.backend.lock().as_mut() {
            Some(backend) => backend.average_samples(&samples),
            None => break,
        };

        match result {
            Ok(Some(color)) => {
                shared.publish(color);
                debug!(width, height, samples = samples.len(), "Worker published reading");
            }
            Ok(None) => {}
            Err(e) => warn!("Light sensor reduction failed: {}", e),
        }
    }

    debug!("Light sensor worker exiting");
}
