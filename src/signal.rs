use serde::Serialize;
use tracing::debug;

use crate::config::SignalConfig;
use crate::route::{Axis, Origin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    NsGreen,
    NsYellow,
    EwGreen,
    EwYellow,
}

impl Phase {
    /// Successor in the fixed cycle NS green → NS yellow → EW green → EW yellow.
    pub fn next(self) -> Phase {
        match self {
            Phase::NsGreen => Phase::NsYellow,
            Phase::NsYellow => Phase::EwGreen,
            Phase::EwGreen => Phase::EwYellow,
            Phase::EwYellow => Phase::NsGreen,
        }
    }

    pub fn green_for(axis: Axis) -> Phase {
        match axis {
            Axis::NorthSouth => Phase::NsGreen,
            Axis::EastWest => Phase::EwGreen,
        }
    }

    /// Axis the phase currently serves (green or clearing yellow).
    pub fn axis(self) -> Axis {
        match self {
            Phase::NsGreen | Phase::NsYellow => Axis::NorthSouth,
            Phase::EwGreen | Phase::EwYellow => Axis::EastWest,
        }
    }

    pub fn is_green(self) -> bool {
        matches!(self, Phase::NsGreen | Phase::EwGreen)
    }

    pub fn is_yellow(self) -> bool {
        !self.is_green()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalColor {
    Green,
    Yellow,
    Red,
}

/// Discrete action emitted by the learning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalAction {
    Hold,
    Switch,
}

impl SignalAction {
    pub const COUNT: usize = 2;

    pub fn from_index(index: usize) -> SignalAction {
        if index == 1 {
            SignalAction::Switch
        } else {
            SignalAction::Hold
        }
    }

    pub fn index(self) -> usize {
        match self {
            SignalAction::Hold => 0,
            SignalAction::Switch => 1,
        }
    }
}

/// Stopped-vehicle counts per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueLengths {
    pub north_south: usize,
    pub east_west: usize,
}

impl QueueLengths {
    pub fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::NorthSouth => self.north_south,
            Axis::EastWest => self.east_west,
        }
    }

    pub fn total(&self) -> usize {
        self.north_south + self.east_west
    }
}

/// Four-phase light for the single junction.
#[derive(Debug, Clone)]
pub struct SignalController {
    phase: Phase,
    timer: u32,
    emergency: bool,
    min_green: u32,
    yellow: u32,
}

impl SignalController {
    pub fn new(cfg: &SignalConfig) -> Self {
        Self {
            phase: Phase::NsGreen,
            timer: 0,
            emergency: false,
            min_green: cfg.min_green_ticks,
            yellow: cfg.yellow_ticks,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks spent in the current phase.
    pub fn timer(&self) -> u32 {
        self.timer
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Fallback controller: greedy longest-queue switching once the minimum
    /// green has run, fixed-length yellow. Returns the new phase on a transition.
    pub fn update(&mut self, queues: QueueLengths) -> Option<Phase> {
        if self.emergency {
            return None;
        }

        self.timer += 1;

        let switch = if self.phase.is_green() {
            let axis = self.phase.axis();
            self.timer > self.min_green && queues.get(axis.other()) > queues.get(axis)
        } else {
            self.timer >= self.yellow
        };

        if switch { Some(self.enter(self.phase.next())) } else { None }
    }

    /// Advances the phase timer without evaluating the queue heuristic; used
    /// while the learning policy owns green-phase decisions.
    pub fn hold(&mut self) {
        if !self.emergency {
            self.timer += 1;
        }
    }

    pub fn apply_action(&mut self, action: SignalAction) -> Option<Phase> {
        if self.emergency || self.timer < self.min_green {
            return None;
        }

        match action {
            SignalAction::Switch if self.phase.is_green() => Some(self.enter(self.phase.next())),
            _ => None,
        }
    }

    pub fn set_emergency_mode(&mut self, active: bool, direction: Option<Origin>) {
        self.emergency = active;
        if let (true, Some(origin)) = (active, direction) {
            let target = Phase::green_for(origin.axis());
            if target != self.phase {
                debug!(from = ?self.phase, to = ?target, ?origin, "emergency override");
            }
            self.phase = target;
            self.timer = 0;
        }
    }

    pub fn get_color_state(&self, axis: Axis) -> SignalColor {
        if self.phase.axis() != axis {
            SignalColor::Red
        } else if self.phase.is_green() {
            SignalColor::Green
        } else {
            SignalColor::Yellow
        }
    }

    fn enter(&mut self, phase: Phase) -> Phase {
        debug!(from = ?self.phase, to = ?phase, after_ticks = self.timer, "signal phase change");
        self.phase = phase;
        self.timer = 0;
        phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(min_green: u32, yellow: u32) -> SignalController {
        SignalController::new(&SignalConfig {
            min_green_ticks: min_green,
            yellow_ticks: yellow,
        })
    }

    fn queues(ns: usize, ew: usize) -> QueueLengths {
        QueueLengths {
            north_south: ns,
            east_west: ew,
        }
    }

    #[test]
    fn starts_north_south_green() {
        let s = controller(10, 3);
        assert_eq!(s.phase(), Phase::NsGreen);
        assert_eq!(s.get_color_state(Axis::NorthSouth), SignalColor::Green);
        assert_eq!(s.get_color_state(Axis::EastWest), SignalColor::Red);
    }

    #[test]
    fn green_holds_until_min_green_even_with_longer_cross_queue() {
        let mut s = controller(10, 3);
        for _ in 0..10 {
            assert_eq!(s.update(queues(0, 5)), None);
        }
        assert_eq!(s.update(queues(0, 5)), Some(Phase::NsYellow));
        assert_eq!(s.timer(), 0);
    }

    #[test]
    fn green_holds_while_own_queue_is_longer() {
        let mut s = controller(2, 3);
        for _ in 0..50 {
            s.update(queues(4, 4));
        }
        assert_eq!(s.phase(), Phase::NsGreen);
    }

    #[test]
    fn yellow_lasts_exactly_the_configured_ticks() {
        let mut s = controller(0, 3);
        s.update(queues(0, 1));
        assert_eq!(s.phase(), Phase::NsYellow);
        assert_eq!(s.update(queues(0, 0)), None);
        assert_eq!(s.update(queues(0, 0)), None);
        assert_eq!(s.update(queues(0, 0)), Some(Phase::EwGreen));
    }

    #[test]
    fn apply_action_respects_min_green() {
        let mut s = controller(5, 3);
        assert_eq!(s.apply_action(SignalAction::Switch), None);
        for _ in 0..5 {
            s.hold();
        }
        assert_eq!(s.apply_action(SignalAction::Hold), None);
        assert_eq!(s.apply_action(SignalAction::Switch), Some(Phase::NsYellow));
        assert_eq!(s.timer(), 0);
    }

    #[test]
    fn emergency_forces_green_and_freezes_controller() {
        let mut s = controller(0, 1);
        s.set_emergency_mode(true, Some(Origin::East));
        assert_eq!(s.phase(), Phase::EwGreen);
        assert_eq!(s.update(queues(10, 0)), None);
        for _ in 0..5 {
            s.hold();
        }
        assert_eq!(s.apply_action(SignalAction::Switch), None);
        assert_eq!(s.phase(), Phase::EwGreen);

        s.set_emergency_mode(false, None);
        assert_eq!(s.update(queues(10, 0)), Some(Phase::EwYellow));
    }

    #[test]
    fn color_query_is_idempotent_and_exclusive() {
        let mut s = controller(0, 2);
        for _ in 0..20 {
            s.update(queues(1, 2));
            let ns = s.get_color_state(Axis::NorthSouth);
            let ew = s.get_color_state(Axis::EastWest);
            assert_eq!(ns, s.get_color_state(Axis::NorthSouth));
            assert!(!(ns == SignalColor::Green && ew == SignalColor::Green));
            assert!(ns == SignalColor::Red || ew == SignalColor::Red);
        }
    }
}
