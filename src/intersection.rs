use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::arbiter::JunctionArbiter;
use crate::config::SimConfig;
use crate::error::Result;
use crate::geometry::{Rect, Vec2};
use crate::pedestrian::{Pedestrian, PedestrianId};
use crate::policy::{self, LearningPolicy, STATE_SIZE};
use crate::route::{Axis, Origin};
use crate::signal::{QueueLengths, SignalAction, SignalController};
use crate::snapshot::{PedestrianView, Snapshot, VehicleView};
use crate::stats::Metrics;
use crate::vehicle::{SensingContext, Vehicle, VehicleDecision, VehicleId};

/// Seed offset separating the policy's random stream from spawning.
const POLICY_SEED_SALT: u64 = 0x5151_C0DE;

/// Owns every agent at the junction and drives them one tick at a time.
pub struct Intersection {
    cfg: SimConfig,
    pub vehicles: Vec<Vehicle>,
    pub pedestrians: Vec<Pedestrian>,
    signal: SignalController,
    arbiter: JunctionArbiter,
    policy: Option<LearningPolicy>,
    last_state: Vec<f64>,
    last_action: SignalAction,
    metrics: Metrics,
    rng: ChaCha8Rng,
    tick: u64,
    next_vehicle_id: u64,
    next_pedestrian_id: u64,
}

impl Intersection {
    pub fn new(cfg: SimConfig) -> Result<Self> {
        cfg.validate()?;

        let policy = if cfg.policy.enabled {
            Some(LearningPolicy::new(&cfg.policy, cfg.run.seed ^ POLICY_SEED_SALT)?)
        } else {
            None
        };

        Ok(Self {
            signal: SignalController::new(&cfg.signal),
            arbiter: JunctionArbiter::new(cfg.vehicle.admission_slots),
            rng: ChaCha8Rng::seed_from_u64(cfg.run.seed),
            policy,
            last_state: vec![0.0; STATE_SIZE],
            last_action: SignalAction::Hold,
            metrics: Metrics::default(),
            vehicles: Vec::new(),
            pedestrians: Vec::new(),
            tick: 0,
            next_vehicle_id: 0,
            next_pedestrian_id: 0,
            cfg,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn signal(&self) -> &SignalController {
        &self.signal
    }

    pub fn arbiter(&self) -> &JunctionArbiter {
        &self.arbiter
    }

    pub fn policy(&self) -> Option<&LearningPolicy> {
        self.policy.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds elapsed.
    pub fn sim_time(&self) -> f32 {
        self.tick as f32 * self.cfg.run.dt()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.iter_mut().find(|v| v.id == id)
    }

    pub fn pedestrian_mut(&mut self, id: PedestrianId) -> Option<&mut Pedestrian> {
        self.pedestrians.iter_mut().find(|p| p.id == id)
    }

    pub fn add_vehicle(&mut self, vehicle: Vehicle) {
        self.vehicles.push(vehicle);
    }

    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        let pos = self.vehicles.iter().position(|v| v.id == id)?;
        self.arbiter.retain(|m| m != id);
        Some(self.vehicles.remove(pos))
    }

    /// Places a new vehicle at the spawn point of `origin`.
    pub fn spawn_vehicle(&mut self, origin: Origin, emergency: bool) -> VehicleId {
        let id = VehicleId(self.next_vehicle_id);
        self.next_vehicle_id += 1;
        self.add_vehicle(Vehicle::new(id, origin, &self.cfg, emergency));
        self.metrics.vehicles_spawned += 1;
        if emergency {
            self.metrics.emergency_spawned += 1;
        }
        id
    }

    /// Operator command: an emergency vehicle from a random lane. The signal
    /// override follows on the next tick.
    pub fn spawn_emergency_vehicle(&mut self) -> (VehicleId, Origin) {
        let origin = Origin::ALL[self.rng.random_range(0..Origin::ALL.len())];
        let id = self.spawn_vehicle(origin, true);
        info!(vehicle = id.0, ?origin, "emergency vehicle dispatched");
        (id, origin)
    }

    pub fn spawn_pedestrian_between(&mut self, start: Vec2, target: Vec2) -> PedestrianId {
        // Walking along x crosses the lanes of the NS road, and the reverse.
        let (crossing, control) = if (target.x - start.x).abs() >= (target.y - start.y).abs() {
            (Axis::EastWest, Axis::NorthSouth)
        } else {
            (Axis::NorthSouth, Axis::EastWest)
        };
        let id = PedestrianId(self.next_pedestrian_id);
        self.next_pedestrian_id += 1;
        self.pedestrians.push(Pedestrian::new(
            id,
            start,
            target,
            crossing,
            control,
            self.cfg.pedestrian.radius,
        ));
        self.metrics.pedestrians_spawned += 1;
        id
    }

    /// One simulation step: spawn, control the light, move every agent,
    /// remove the finished ones.
    pub fn tick(&mut self) {
        self.tick += 1;
        self.spawn_entities();

        let queues = self.queue_lengths();
        let moving = self.vehicles.iter().filter(|v| !v.stopped).count();
        self.metrics.sample(queues, moving, self.vehicles.len());

        let emergency = self.vehicles.iter().find(|v| v.emergency).map(|v| v.origin);

        if emergency.is_none()
            && self.policy.is_some()
            && self.tick % self.cfg.policy.decision_interval == 0
        {
            self.control_step(queues);
        }

        match emergency {
            Some(origin) => {
                if !self.signal.is_emergency() {
                    info!(?origin, "emergency override engaged");
                }
                self.signal.set_emergency_mode(true, Some(origin));
            }
            None => {
                if self.signal.is_emergency() {
                    info!("emergency override released");
                }
                self.signal.set_emergency_mode(false, None);
                if self.policy.is_none() || self.signal.phase().is_yellow() {
                    self.signal.update(queues);
                } else {
                    self.signal.hold();
                }
            }
        }

        self.update_entities();

        let every = self.cfg.run.health_interval_ticks;
        if every > 0 && self.tick % every == 0 {
            self.health_check();
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let g = &self.cfg.geometry;
        Snapshot {
            tick: self.tick,
            sim_time: self.sim_time(),
            phase: self.signal.phase(),
            phase_ticks: self.signal.timer(),
            north_south: self.signal.get_color_state(Axis::NorthSouth),
            east_west: self.signal.get_color_state(Axis::EastWest),
            emergency_override: self.signal.is_emergency(),
            vehicles: self
                .vehicles
                .iter()
                .map(|v| VehicleView::new(v, &self.signal, &self.arbiter, g))
                .collect(),
            pedestrians: self.pedestrians.iter().map(PedestrianView::from).collect(),
            junction_queue: self.arbiter.members().to_vec(),
            epsilon: self.policy.as_ref().map(LearningPolicy::epsilon),
            metrics: self.metrics.clone(),
        }
    }

    pub fn final_stats(&self) -> String {
        self.metrics.summary(self.tick, self.sim_time())
    }

    fn queue_lengths(&self) -> QueueLengths {
        let mut q = QueueLengths::default();
        for v in self.vehicles.iter().filter(|v| v.stopped) {
            match v.origin.axis() {
                Axis::NorthSouth => q.north_south += 1,
                Axis::EastWest => q.east_west += 1,
            }
        }
        q
    }

    fn spawn_entities(&mut self) {
        let every = self.cfg.spawn.vehicle_interval;
        if every > 0 && self.tick % every == 0 {
            let origin = Origin::ALL[self.rng.random_range(0..Origin::ALL.len())];
            let at = self.cfg.geometry.lane_spawn(origin);
            let side = self.cfg.geometry.vehicle_length;
            let pad = self.cfg.spawn.safe_distance;
            let zone = Rect::new(at.x, at.y, side, side).inflate(pad, pad);

            if self.vehicles.iter().any(|v| v.bounds().intersects(&zone)) {
                debug!(?origin, "spawn point occupied, skipping vehicle");
            } else {
                let emergency = self.rng.random::<f64>() < self.cfg.spawn.emergency_chance;
                let id = self.spawn_vehicle(origin, emergency);
                if emergency {
                    info!(vehicle = id.0, ?origin, "emergency vehicle spawned");
                }
            }
        }

        let every = self.cfg.spawn.pedestrian_interval;
        if every > 0 && self.tick % every == 0 {
            self.spawn_random_pedestrian();
        }
    }

    /// A pedestrian at a random corner heading for one of its two neighbours.
    fn spawn_random_pedestrian(&mut self) {
        let corners = self.cfg.geometry.corners();
        let from = self.rng.random_range(0..corners.len());
        let to = if self.rng.random::<bool>() {
            (from + 1) % corners.len()
        } else {
            (from + corners.len() - 1) % corners.len()
        };

        let j = self.cfg.pedestrian.spawn_jitter;
        let (jx, jy) = (self.rng.random_range(-j..=j), self.rng.random_range(-j..=j));
        let start = Vec2::new(corners[from].x + jx, corners[from].y + jy);
        let target = Vec2::new(corners[to].x + jx, corners[to].y + jy);
        self.spawn_pedestrian_between(start, target);
    }

    fn control_step(&mut self, queues: QueueLengths) {
        let Some(policy) = self.policy.as_mut() else {
            return;
        };
        let p = &self.cfg.policy;

        let state = policy::encode_state(queues, self.signal.phase(), p.queue_normalizer);
        let reward = policy::reward(self.metrics.moving_fraction, queues.total(), p.queue_penalty);
        self.metrics.cumulative_reward += reward;

        let previous = std::mem::replace(&mut self.last_state, state.clone());
        policy.record_transition(previous, self.last_action, reward, state.clone(), false);

        match policy.train_step(p.batch_size) {
            Ok(Some(loss)) => self.metrics.last_loss = Some(loss),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "policy training step failed"),
        }

        let action = policy.select_action(&state);
        self.last_action = action;
        self.metrics.policy_decisions += 1;
        if action == SignalAction::Switch {
            self.metrics.policy_switch_requests += 1;
            debug!(epsilon = policy.epsilon(), "policy requested phase switch");
        }
        if let Some(phase) = self.signal.apply_action(action) {
            info!(?phase, reward, "policy switched signal");
        }
    }

    fn update_entities(&mut self) {
        let now = self.sim_time();

        for p in &mut self.pedestrians {
            p.update(Some(&self.signal), now, &self.cfg.pedestrian);
        }
        let mut crossed = 0;
        self.pedestrians.retain(|p| {
            if p.done && p.down_since.is_none() {
                crossed += 1;
            }
            !p.done
        });
        self.metrics.pedestrians_crossed += crossed;

        self.refresh_junction_claims();

        let ctx = SensingContext {
            signal: Some(&self.signal),
            vehicles: &self.vehicles,
            pedestrians: &self.pedestrians,
            arbiter: &self.arbiter,
            cfg: &self.cfg,
        };
        let decisions: Vec<VehicleDecision> = self.vehicles.par_iter().map(|v| v.decide(&ctx)).collect();
        for (v, d) in self.vehicles.iter_mut().zip(decisions) {
            v.apply(d, &self.cfg);
        }

        self.detect_collisions(now);

        let g = &self.cfg.geometry;
        let before = self.vehicles.len();
        self.vehicles.retain(|v| g.in_bounds(v.position));
        let passed = before - self.vehicles.len();
        if passed > 0 {
            self.metrics.vehicles_passed += passed as u64;
            let vehicles = &self.vehicles;
            self.arbiter.retain(|id| vehicles.iter().any(|v| v.id == id));
        }
    }

    /// Drops claims of vehicles that left the junction area or lost the
    /// light, then registers new arrivals in creation order.
    fn refresh_junction_claims(&mut self) {
        let g = &self.cfg.geometry;
        let signal = Some(&self.signal);
        let vehicles = &self.vehicles;

        self.arbiter.retain(|id| {
            vehicles
                .iter()
                .find(|v| v.id == id)
                .is_some_and(|v| v.keeps_junction_claim(signal, g))
        });

        for v in vehicles {
            if v.wants_junction_claim(signal, g) && self.arbiter.register(v.id) {
                debug!(vehicle = v.id.0, rank = self.arbiter.len() - 1, "junction claim");
            }
        }
    }

    fn detect_collisions(&mut self, now: f32) {
        let threshold = self.cfg.vehicle.collision_force_threshold;
        for v in self.vehicles.iter().filter(|v| v.current_speed > threshold) {
            let body = v.bounds();
            for p in self.pedestrians.iter_mut().filter(|p| p.is_active()) {
                if body.intersects(&p.bounds()) && p.hit(now) {
                    self.metrics.pedestrians_knocked_down += 1;
                    warn!(vehicle = v.id.0, pedestrian = p.id.0, speed = v.current_speed, "pedestrian struck");
                }
            }
        }
    }

    fn health_check(&self) {
        let stuck = self
            .vehicles
            .iter()
            .filter(|v| v.stopped && v.patience > self.cfg.run.stuck_patience)
            .count();
        let flow = self.metrics.lifetime_flow;

        if stuck > 0 {
            warn!(
                tick = self.tick,
                vehicles = self.vehicles.len(),
                pedestrians = self.pedestrians.len(),
                stuck,
                flow,
                "health check: stalled vehicles"
            );
        } else {
            info!(
                tick = self.tick,
                vehicles = self.vehicles.len(),
                pedestrians = self.pedestrians.len(),
                flow,
                "health check"
            );
        }
    }
}
