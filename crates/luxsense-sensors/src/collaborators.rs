// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Host Collaborators
//!
//! The engines never talk to a renderer or scene graph directly. A host hands
//! them a [`FrameSource`] for pixels, a [`WorldToScreen`] projector for sensor
//! positions and a [`SensorEventSink`] that receives every notification.
//!
//! Closures implement all three traits, so simple hosts need no new types:
//!
//! ```rust
//! use luxsense_sensors::{SensorEvent, SensorEventSink, Vec2, Vec3, WorldToScreen};
//!
//! let projector = |world: Vec3| Some(Vec2::new(world.x * 10.0, world.y * 10.0));
//! assert_eq!(projector.world_to_screen(Vec3::new(1.0, 2.0, 0.0)), Some(Vec2::new(10.0, 20.0)));
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! tx.emit(&SensorEvent::AllSensorsUpdated);
//! assert_eq!(rx.recv().unwrap(), SensorEvent::AllSensorsUpdated);
//! ```

use crate::registry::SensorId;
use luxsense_compute::{Color, Frame};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

/// Screen-space position in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2::new(0.0, 0.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub(crate) fn as_tuple(self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// World-space position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Supplies the most recent rendered frame
pub trait FrameSource: Send + Sync {
    /// `None` when no frame is ready yet; callers retry on their next tick
    fn current_frame(&self) -> Option<Frame>;
}

impl FrameSource for Frame {
    fn current_frame(&self) -> Option<Frame> {
        Some(self.clone())
    }
}

impl<F> FrameSource for F
where
    F: Fn() -> Option<Frame> + Send + Sync,
{
    fn current_frame(&self) -> Option<Frame> {
        self()
    }
}

/// Projects world positions onto the frame
pub trait WorldToScreen: Send + Sync {
    /// `None` when there is no active camera
    fn world_to_screen(&self, world: Vec3) -> Option<Vec2>;
}

impl<F> WorldToScreen for F
where
    F: Fn(Vec3) -> Option<Vec2> + Send + Sync,
{
    fn world_to_screen(&self, world: Vec3) -> Option<Vec2> {
        self(world)
    }
}

/// Notifications emitted by the sensor engines
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A single [`LightSensor`](crate::LightSensor) published a new colour
    ColorUpdated(Color),
    /// A single [`LightSensor`](crate::LightSensor) published a new luminance
    LightLevelUpdated(f32),
    /// A registry sensor's colour changed in the last pass
    SensorUpdated { sensor_id: SensorId, color: Color },
    /// A registry pass completed; sent once per pass after all `SensorUpdated`
    AllSensorsUpdated,
}

/// Receives sensor notifications
///
/// Called on the thread that drives the engine, never while an engine lock
/// is held, so a sink may call back into the engine.
pub trait SensorEventSink: Send + Sync {
    fn emit(&self, event: &SensorEvent);
}

impl<F> SensorEventSink for F
where
    F: Fn(&SensorEvent) + Send + Sync,
{
    fn emit(&self, event: &SensorEvent) {
        self(event)
    }
}

impl SensorEventSink for Sender<SensorEvent> {
    fn emit(&self, event: &SensorEvent) {
        // A dropped receiver just means nobody is listening anymore
        let _ = self.send(event.clone());
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SensorEventSink for NullSink {
    fn emit(&self, _event: &SensorEvent) {}
}
