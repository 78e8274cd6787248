use serde::Serialize;

use crate::config::PedestrianConfig;
use crate::geometry::{Rect, Vec2};
use crate::route::Axis;
use crate::signal::{SignalColor, SignalController};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PedestrianId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PedestrianState {
    Walking,
    Down,
}

#[derive(Debug, Clone)]
pub struct Pedestrian {
    pub id: PedestrianId,
    pub position: Vec2,
    pub target: Vec2,
    /// Axis the pedestrian walks along.
    pub crossing_axis: Axis,
    /// Vehicle axis whose red light releases the pedestrian.
    pub control_axis: Axis,
    direction: Vec2,
    pub radius: f32,
    pub state: PedestrianState,
    /// Released by the signal and moving toward the target.
    pub moving: bool,
    pub done: bool,
    /// Simulation time of the knockdown, in seconds.
    pub down_since: Option<f32>,
}

impl Pedestrian {
    pub fn new(
        id: PedestrianId,
        start: Vec2,
        target: Vec2,
        crossing_axis: Axis,
        control_axis: Axis,
        radius: f32,
    ) -> Self {
        let (dx, dy) = (target.x - start.x, target.y - start.y);
        let dist = dx.hypot(dy);
        let direction = if dist > 0.0 {
            Vec2::new(dx / dist, dy / dist)
        } else {
            Vec2::default()
        };

        Self {
            id,
            position: start,
            target,
            crossing_axis,
            control_axis,
            direction,
            radius,
            state: PedestrianState::Walking,
            moving: false,
            done: false,
            down_since: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::around(self.position, self.radius)
    }

    pub fn is_down(&self) -> bool {
        self.state == PedestrianState::Down
    }

    /// Still present and upright; the only pedestrians vehicles yield to.
    pub fn is_active(&self) -> bool {
        !self.done && !self.is_down()
    }

    /// Knocks the pedestrian down; repeated hits keep the first timestamp.
    pub fn hit(&mut self, now: f32) -> bool {
        if self.is_down() {
            return false;
        }
        self.state = PedestrianState::Down;
        self.down_since = Some(now);
        true
    }

    pub fn update(&mut self, signal: Option<&SignalController>, now: f32, cfg: &PedestrianConfig) {
        if self.done {
            return;
        }

        if let Some(since) = self.down_since.filter(|_| self.is_down()) {
            if now - since > cfg.despawn_secs {
                self.done = true;
            }
            return;
        }

        if !self.moving
            && signal.is_some_and(|s| s.get_color_state(self.control_axis) == SignalColor::Red)
        {
            self.moving = true;
        }

        if self.moving {
            self.position.x += self.direction.x * cfg.speed;
            self.position.y += self.direction.y * cfg.speed;

            if self.position.distance(self.target) < cfg.arrival_radius {
                self.done = true;
            }
        }
    }
}
