//! Per-vehicle perception, rule arbitration and kinematics.
//!
//! A tick is split in two: [`Vehicle::decide`] reads the committed state of
//! every agent and proposes a target speed, [`Vehicle::apply`] integrates it.
//! Decisions for all vehicles are computed before any of them is applied.

use serde::Serialize;
use tracing::debug;

use crate::arbiter::JunctionArbiter;
use crate::config::{GeometryConfig, SimConfig, VehicleConfig};
use crate::geometry::{Rect, Vec2};
use crate::pedestrian::Pedestrian;
use crate::route::Origin;
use crate::signal::{SignalColor, SignalController};

/// Pedestrian boxes are grown by this much before the sensor test.
const PEDESTRIAN_SENSOR_MARGIN: f32 = 20.0;
/// Distance band ahead of the stop line / crosswalk where a non-green light stops the vehicle.
const SIGNAL_STOP_BAND: (f32, f32) = (5.0, 50.0);
/// Distance band around the stop line where a vehicle claims a junction slot.
const APPROACH_BAND: (f32, f32) = (-20.0, 60.0);
/// Distance band where the far side of the junction must be free before entering.
const EXIT_CHECK_BAND: (f32, f32) = (-10.0, 20.0);
const EXIT_ZONE_LENGTH: f32 = 60.0;
const EXIT_ZONE_MARGIN: f32 = 10.0;
/// Front-bumper distance to the junction box inside which cross traffic is checked.
const BOX_APPROACH_DISTANCE: f32 = 40.0;
/// A claim is kept while the vehicle is this close to the box.
const BOX_CLAIM_MARGIN: f32 = 20.0;
const RED_LIGHT_TELEMETRY_BAND: (f32, f32) = (-10.0, 100.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VehicleId(pub u64);

/// Everything a vehicle may look at while deciding. Shared, read-only.
#[derive(Clone, Copy)]
pub struct SensingContext<'a> {
    pub signal: Option<&'a SignalController>,
    pub vehicles: &'a [Vehicle],
    pub pedestrians: &'a [Pedestrian],
    pub arbiter: &'a JunctionArbiter,
    pub cfg: &'a SimConfig,
}

/// Output of the perception and arbitration layers for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleDecision {
    /// Pedestrian safety layer.
    pub safety_speed: f32,
    /// Rule compliance layer.
    pub rule_speed: f32,
    pub target_speed: f32,
    pub sensor: Rect,
    /// Some pedestrian overlaps the vehicle's own box (with margin).
    pub pedestrian_contact: bool,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    /// Top-left corner of the bounding box.
    pub position: Vec2,
    pub origin: Origin,
    heading: Vec2,
    pub width: f32,
    pub height: f32,
    pub current_speed: f32,
    pub target_speed: f32,
    pub stopped: bool,
    pub emergency: bool,
    /// Seconds spent blocked purely by pedestrians.
    pub patience: f32,
    pub ignore_pedestrians: bool,
    /// Sensor region used in the last decision.
    pub sensor: Rect,
}

impl Vehicle {
    pub fn new(id: VehicleId, origin: Origin, cfg: &SimConfig, emergency: bool) -> Self {
        let g = &cfg.geometry;
        let (width, height) = if origin.is_horizontal() {
            (g.vehicle_length, g.vehicle_width)
        } else {
            (g.vehicle_width, g.vehicle_length)
        };

        Self {
            id,
            position: g.lane_spawn(origin),
            origin,
            heading: origin.heading(),
            width,
            height,
            current_speed: cfg.vehicle.max_speed,
            target_speed: cfg.vehicle.max_speed,
            stopped: false,
            emergency,
            patience: 0.0,
            ignore_pedestrians: false,
            sensor: Rect::default(),
        }
    }

    pub fn heading(&self) -> Vec2 {
        self.heading
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.width, self.height)
    }

    pub fn decide(&self, ctx: &SensingContext<'_>) -> VehicleDecision {
        let (safety_speed, sensor) = self.pedestrian_layer(ctx);
        let rule_speed = self.rule_layer(ctx);
        let margin = ctx.cfg.vehicle.ignore_release_margin;
        let own = self.bounds().inflate(margin, margin);
        let pedestrian_contact = ctx.pedestrians.iter().any(|p| own.intersects(&p.bounds()));

        VehicleDecision {
            safety_speed,
            rule_speed,
            target_speed: safety_speed.min(rule_speed),
            sensor,
            pedestrian_contact,
        }
    }

    pub fn apply(&mut self, decision: VehicleDecision, cfg: &SimConfig) {
        self.sensor = decision.sensor;
        self.target_speed = decision.target_speed;
        self.update_patience(&decision, cfg);
        self.integrate(&cfg.vehicle);
    }

    /// Priority 1: slow down or halt for pedestrians in the forward sensor.
    fn pedestrian_layer(&self, ctx: &SensingContext<'_>) -> (f32, Rect) {
        let v = &ctx.cfg.vehicle;
        let look_ahead = v
            .min_sensor_length
            .max(self.current_speed * v.braking_time * ctx.cfg.run.fps as f32 * v.stopping_buffer);
        let sensor = self.sensor_rect(look_ahead, v);

        if self.emergency || self.ignore_pedestrians {
            return (v.max_speed, sensor);
        }

        let center = self.bounds().center();
        let mut safe = v.max_speed;
        for p in ctx.pedestrians.iter().filter(|p| p.is_active()) {
            let zone = p.bounds().inflate(PEDESTRIAN_SENSOR_MARGIN, PEDESTRIAN_SENSOR_MARGIN);
            if !sensor.intersects(&zone) {
                continue;
            }
            let dist = center.distance(p.position);
            if dist < v.halt_distance {
                return (0.0, sensor);
            }
            let yield_factor = ((dist - v.halt_distance) / look_ahead).max(0.0);
            safe = safe.min(v.max_speed * yield_factor);
        }
        (safe, sensor)
    }

    /// Priority 2: signal, junction admission, anti-gridlock and spacing.
    fn rule_layer(&self, ctx: &SensingContext<'_>) -> f32 {
        let cfg = ctx.cfg;
        if ctx.signal.is_none() && !self.emergency {
            return 0.0;
        }
        if self.held_by_signal(ctx.signal, &cfg.geometry) {
            return 0.0;
        }
        if ctx.arbiter.is_held(self.id) {
            return 0.0;
        }

        let d_sl = self.distance_to_stop_line(&cfg.geometry);
        if in_band(d_sl, EXIT_CHECK_BAND) && !self.is_exit_clear(ctx.vehicles, &cfg.geometry) {
            return 0.0;
        }

        // Queued behind a leader in the same lane, including short of a crosswalk.
        let following = cfg.vehicle.following_distance;
        let blocked_by_leader = ctx
            .vehicles
            .iter()
            .filter(|o| o.id != self.id && o.origin == self.origin)
            .any(|o| {
                let gap = self.gap_to(o);
                gap > 0.0 && gap < following
            });
        if blocked_by_leader {
            return 0.0;
        }

        if self.is_intersection_blocked(ctx) {
            return 0.0;
        }

        cfg.vehicle.max_speed
    }

    /// Whether the light alone obliges this vehicle to stop where it is.
    /// Missing controllers stop everything but emergency vehicles.
    pub fn held_by_signal(&self, signal: Option<&SignalController>, g: &GeometryConfig) -> bool {
        if self.emergency {
            return false;
        }
        let Some(signal) = signal else {
            return true;
        };
        if signal.get_color_state(self.origin.axis()) == SignalColor::Green {
            return false;
        }
        in_band(self.distance_to_stop_line(g), SIGNAL_STOP_BAND)
            || in_band(self.distance_to_crosswalk(g), SIGNAL_STOP_BAND)
    }

    pub fn in_approach_band(&self, g: &GeometryConfig) -> bool {
        in_band(self.distance_to_stop_line(g), APPROACH_BAND)
    }

    /// Close enough to the stop line to claim a junction slot, and either
    /// served by a green light or already past the point where it would stop.
    /// Vehicles queued on red never claim, so they cannot crowd out the
    /// admitted ranks of the moving axis.
    pub fn wants_junction_claim(&self, signal: Option<&SignalController>, g: &GeometryConfig) -> bool {
        if !self.in_approach_band(g) {
            return false;
        }
        if self.emergency {
            return true;
        }
        let Some(signal) = signal else {
            return false;
        };
        signal.get_color_state(self.origin.axis()) == SignalColor::Green
            || self.distance_to_stop_line(g) <= SIGNAL_STOP_BAND.0
    }

    /// A claim survives while the vehicle still approaches under a permissive
    /// light or is on or next to the junction box.
    pub fn keeps_junction_claim(&self, signal: Option<&SignalController>, g: &GeometryConfig) -> bool {
        self.wants_junction_claim(signal, g)
            || self
                .bounds()
                .intersects(&g.junction_box().inflate(BOX_CLAIM_MARGIN, BOX_CLAIM_MARGIN))
    }

    /// Renderer hint: a non-green light is relevant to this vehicle right now.
    pub fn is_light_red(&self, signal: Option<&SignalController>, g: &GeometryConfig) -> bool {
        let Some(signal) = signal.filter(|_| !self.emergency) else {
            return false;
        };
        signal.get_color_state(self.origin.axis()) != SignalColor::Green
            && in_band(self.distance_to_stop_line(g), RED_LIGHT_TELEMETRY_BAND)
    }

    /// Signed distance from the front bumper to the stop line; negative once past it.
    pub fn distance_to_stop_line(&self, g: &GeometryConfig) -> f32 {
        let sl = g.stop_line(self.origin);
        let r = self.bounds();
        match self.origin {
            Origin::North => sl - r.bottom(),
            Origin::South => r.top() - sl,
            Origin::East => r.left() - sl,
            Origin::West => sl - r.right(),
        }
    }

    pub fn distance_to_crosswalk(&self, g: &GeometryConfig) -> f32 {
        let sl = g.stop_line(self.origin);
        let off = g.crosswalk_offset;
        let r = self.bounds();
        match self.origin {
            Origin::North => (sl - off) - r.bottom(),
            Origin::South => r.top() - (sl + off),
            Origin::East => r.left() - (sl + off),
            Origin::West => (sl - off) - r.right(),
        }
    }

    /// Distance from the front bumper to the near edge of the junction box;
    /// zero or negative once the vehicle has entered it.
    pub fn distance_to_box(&self, g: &GeometryConfig) -> f32 {
        self.distance_to_stop_line(g) + g.stop_line_gap
    }

    /// Bumper-to-bumper gap to `other` along this lane; positive when `other` is ahead.
    pub fn gap_to(&self, other: &Vehicle) -> f32 {
        let (me, them) = (self.bounds(), other.bounds());
        match self.origin {
            Origin::North => them.top() - me.bottom(),
            Origin::South => me.top() - them.bottom(),
            Origin::West => them.left() - me.right(),
            Origin::East => me.left() - them.right(),
        }
    }

    fn sensor_rect(&self, length: f32, v: &VehicleConfig) -> Rect {
        let r = self.bounds();
        let pad = v.sensor_padding;
        let gap = v.raycast_min_distance;
        match self.origin {
            Origin::West => Rect::new(r.right() + gap, r.y - pad, length, r.h + 2.0 * pad),
            Origin::East => Rect::new(r.left() - gap - length, r.y - pad, length, r.h + 2.0 * pad),
            Origin::North => Rect::new(r.x - pad, r.bottom() + gap, r.w + 2.0 * pad, length),
            Origin::South => Rect::new(r.x - pad, r.top() - gap - length, r.w + 2.0 * pad, length),
        }
    }

    /// The stretch of lane just beyond the junction box is free.
    fn is_exit_clear(&self, vehicles: &[Vehicle], g: &GeometryConfig) -> bool {
        let c = g.center();
        let half = g.road_width() / 2.0;
        let r = self.bounds();
        let exit = match self.origin {
            Origin::West => Rect::new(c.x + half, r.y, EXIT_ZONE_LENGTH, r.h),
            Origin::East => Rect::new(c.x - half - EXIT_ZONE_LENGTH, r.y, EXIT_ZONE_LENGTH, r.h),
            Origin::North => Rect::new(r.x, c.y + half, r.w, EXIT_ZONE_LENGTH),
            Origin::South => Rect::new(r.x, c.y - half - EXIT_ZONE_LENGTH, r.w, EXIT_ZONE_LENGTH),
        }
        .inflate(EXIT_ZONE_MARGIN, EXIT_ZONE_MARGIN);

        !vehicles
            .iter()
            .any(|o| o.id != self.id && o.bounds().intersects(&exit))
    }

    /// Cross traffic has the box this vehicle is about to enter: either it is
    /// already inside, or it is entering too and ranks ahead in admission
    /// order. A vehicle whose front is in the box is committed and never
    /// yields here, so two vehicles can never wait on each other.
    fn is_intersection_blocked(&self, ctx: &SensingContext<'_>) -> bool {
        let g = &ctx.cfg.geometry;
        let ahead = self.distance_to_box(g);
        if ahead <= 0.0 || ahead >= BOX_APPROACH_DISTANCE {
            return false;
        }

        let junction = g.junction_box();
        let mine = admission_key(self.id, ctx.arbiter);
        ctx.vehicles.iter().any(|o| {
            if o.id == self.id || o.origin.axis() == self.origin.axis() {
                return false;
            }
            if o.bounds().intersects(&junction) {
                return true;
            }
            let theirs = o.distance_to_box(g);
            theirs > 0.0
                && theirs < BOX_APPROACH_DISTANCE
                && !o.held_by_signal(ctx.signal, g)
                && admission_key(o.id, ctx.arbiter) < mine
        })
    }

    fn update_patience(&mut self, d: &VehicleDecision, cfg: &SimConfig) {
        let dt = cfg.run.dt();
        if d.safety_speed == 0.0 && d.rule_speed > 0.0 && self.current_speed == 0.0 {
            self.patience += dt;
        } else {
            self.patience = (self.patience - 0.5 * dt).max(0.0);
        }

        if !self.ignore_pedestrians && self.patience > cfg.vehicle.patience_threshold {
            self.ignore_pedestrians = true;
            debug!(vehicle = self.id.0, patience = self.patience, "pedestrian standoff, yielding suspended");
        }

        if self.ignore_pedestrians && !d.pedestrian_contact {
            self.ignore_pedestrians = false;
            self.patience = 0.0;
            debug!(vehicle = self.id.0, "pedestrians clear, yielding resumed");
        }
    }

    fn integrate(&mut self, v: &VehicleConfig) {
        if self.current_speed < self.target_speed {
            self.current_speed = (self.current_speed + v.acceleration).min(self.target_speed);
        } else if self.current_speed > self.target_speed {
            self.current_speed = (self.current_speed - v.deceleration).max(self.target_speed);
        }
        self.current_speed = self.current_speed.clamp(0.0, v.max_speed);

        if self.current_speed < v.stop_epsilon {
            self.current_speed = 0.0;
            self.stopped = true;
        } else {
            self.stopped = false;
            self.position.x += self.heading.x * self.current_speed;
            self.position.y += self.heading.y * self.current_speed;
        }
    }
}

fn in_band(d: f32, (lo, hi): (f32, f32)) -> bool {
    lo < d && d < hi
}

/// Total order for contested box entry: claimed ranks first, then
/// unregistered vehicles by id.
fn admission_key(id: VehicleId, arbiter: &JunctionArbiter) -> (bool, u64) {
    match arbiter.rank(id) {
        Some(rank) => (false, rank as u64),
        None => (true, id.0),
    }
}
