//! Read-only view of one tick, consumed by renderers and telemetry.

use serde::Serialize;

use crate::arbiter::JunctionArbiter;
use crate::config::GeometryConfig;
use crate::geometry::{Rect, Vec2};
use crate::pedestrian::{Pedestrian, PedestrianId, PedestrianState};
use crate::route::{Axis, Origin};
use crate::signal::{Phase, SignalColor, SignalController};
use crate::stats::Metrics;
use crate::vehicle::{Vehicle, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgentKind {
    Vehicle,
    Pedestrian,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleView {
    pub id: VehicleId,
    pub origin: Origin,
    pub position: Vec2,
    pub bounds: Rect,
    pub sensor: Rect,
    pub speed: f32,
    pub target_speed: f32,
    pub stopped: bool,
    pub emergency: bool,
    pub ignore_pedestrians: bool,
    pub light_red: bool,
    pub junction_rank: Option<usize>,
}

impl VehicleView {
    pub fn new(v: &Vehicle, signal: &SignalController, arbiter: &JunctionArbiter, g: &GeometryConfig) -> Self {
        Self {
            id: v.id,
            origin: v.origin,
            position: v.position,
            bounds: v.bounds(),
            sensor: v.sensor,
            speed: v.current_speed,
            target_speed: v.target_speed,
            stopped: v.stopped,
            emergency: v.emergency,
            ignore_pedestrians: v.ignore_pedestrians,
            light_red: v.is_light_red(Some(signal), g),
            junction_rank: arbiter.rank(v.id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PedestrianView {
    pub id: PedestrianId,
    pub position: Vec2,
    pub bounds: Rect,
    pub state: PedestrianState,
    pub moving: bool,
}

impl From<&Pedestrian> for PedestrianView {
    fn from(p: &Pedestrian) -> Self {
        Self {
            id: p.id,
            position: p.position,
            bounds: p.bounds(),
            state: p.state,
            moving: p.moving,
        }
    }
}

/// Either kind of agent, for consumers that treat them uniformly.
#[derive(Debug, Clone, Copy)]
pub enum AgentView<'a> {
    Vehicle(&'a VehicleView),
    Pedestrian(&'a PedestrianView),
}

impl AgentView<'_> {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentView::Vehicle(_) => AgentKind::Vehicle,
            AgentView::Pedestrian(_) => AgentKind::Pedestrian,
        }
    }

    pub fn position(&self) -> Vec2 {
        match self {
            AgentView::Vehicle(v) => v.position,
            AgentView::Pedestrian(p) => p.position,
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            AgentView::Vehicle(v) => v.bounds,
            AgentView::Pedestrian(p) => p.bounds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub sim_time: f32,
    pub phase: Phase,
    pub phase_ticks: u32,
    pub north_south: SignalColor,
    pub east_west: SignalColor,
    pub emergency_override: bool,
    pub vehicles: Vec<VehicleView>,
    pub pedestrians: Vec<PedestrianView>,
    pub junction_queue: Vec<VehicleId>,
    pub epsilon: Option<f64>,
    pub metrics: Metrics,
}

impl Snapshot {
    pub fn color(&self, axis: Axis) -> SignalColor {
        match axis {
            Axis::NorthSouth => self.north_south,
            Axis::EastWest => self.east_west,
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = AgentView<'_>> {
        self.vehicles
            .iter()
            .map(AgentView::Vehicle)
            .chain(self.pedestrians.iter().map(AgentView::Pedestrian))
    }
}
