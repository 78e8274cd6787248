//! Decision and control engine for a single signalized four-way junction.
//!
//! The [`Intersection`] owns the agents and steps them on a fixed tick:
//! the [`SignalController`] (optionally steered by a [`LearningPolicy`])
//! sets the light, the [`JunctionArbiter`] orders admission to the box,
//! every [`Vehicle`] fuses pedestrian safety with rule compliance into one
//! target speed, and every [`Pedestrian`] waits for its walk phase.

pub mod arbiter;
pub mod config;
pub mod error;
pub mod geometry;
pub mod intersection;
pub mod pedestrian;
pub mod policy;
pub mod route;
pub mod signal;
pub mod snapshot;
pub mod stats;
pub mod vehicle;
#[cfg(feature = "viewer")]
pub mod viewer;

pub use arbiter::JunctionArbiter;
pub use config::SimConfig;
pub use error::{CrossingError, Result};
pub use intersection::Intersection;
pub use pedestrian::{Pedestrian, PedestrianId, PedestrianState};
pub use policy::LearningPolicy;
pub use route::{Axis, Origin};
pub use signal::{Phase, QueueLengths, SignalAction, SignalColor, SignalController};
pub use snapshot::{AgentKind, AgentView, Snapshot};
pub use vehicle::{SensingContext, Vehicle, VehicleDecision, VehicleId};
