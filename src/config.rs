use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CrossingError, Result};
use crate::geometry::{Rect, Vec2};
use crate::route::Origin;

/// Every tunable the simulation core consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub geometry: GeometryConfig,
    pub vehicle: VehicleConfig,
    pub pedestrian: PedestrianConfig,
    pub signal: SignalConfig,
    pub spawn: SpawnConfig,
    pub policy: PolicyConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub world_width: f32,
    pub world_height: f32,
    pub lane_width: f32,
    /// How far outside the world edge vehicles appear.
    pub spawn_offset: f32,
    /// Distance from the road edge to the stop line.
    pub stop_line_gap: f32,
    /// Crosswalk entrance, measured upstream from the stop line.
    pub crosswalk_offset: f32,
    pub crosswalk_width: f32,
    /// Vehicles further than this outside the world are removed.
    pub despawn_margin: f32,
    pub vehicle_length: f32,
    pub vehicle_width: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            world_width: 800.0,
            world_height: 800.0,
            lane_width: 60.0,
            spawn_offset: 50.0,
            stop_line_gap: 20.0,
            crosswalk_offset: 60.0,
            crosswalk_width: 40.0,
            despawn_margin: 100.0,
            vehicle_length: 40.0,
            vehicle_width: 20.0,
        }
    }
}

impl GeometryConfig {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.world_width / 2.0, self.world_height / 2.0)
    }

    pub fn road_width(&self) -> f32 {
        self.lane_width * 2.0
    }

    pub fn stop_margin(&self) -> f32 {
        self.road_width() / 2.0 + self.stop_line_gap
    }

    /// Stop-line coordinate on the lane's travel axis.
    pub fn stop_line(&self, origin: Origin) -> f32 {
        let c = self.center();
        let m = self.stop_margin();
        match origin {
            Origin::North => c.y - m,
            Origin::South => c.y + m,
            Origin::East => c.x + m,
            Origin::West => c.x - m,
        }
    }

    /// Top-left corner of a freshly spawned vehicle.
    pub fn lane_spawn(&self, origin: Origin) -> Vec2 {
        let c = self.center();
        let half_lane = self.lane_width / 2.0;
        match origin {
            Origin::North => Vec2::new(c.x - half_lane, -self.spawn_offset),
            Origin::South => Vec2::new(c.x + half_lane, self.world_height + self.spawn_offset),
            Origin::East => Vec2::new(self.world_width + self.spawn_offset, c.y - half_lane),
            Origin::West => Vec2::new(-self.spawn_offset, c.y + half_lane),
        }
    }

    /// The square where both roads overlap.
    pub fn junction_box(&self) -> Rect {
        let c = self.center();
        let half = self.road_width() / 2.0;
        Rect::new(c.x - half, c.y - half, self.road_width(), self.road_width())
    }

    pub fn crosswalk(&self, origin: Origin) -> Rect {
        let c = self.center();
        let half = self.road_width() / 2.0;
        let sl = self.stop_line(origin);
        let (off, w) = (self.crosswalk_offset, self.crosswalk_width);
        match origin {
            Origin::North => Rect::new(c.x - half, sl - off, self.road_width(), w),
            Origin::South => Rect::new(c.x - half, sl + off - w, self.road_width(), w),
            Origin::East => Rect::new(sl + off - w, c.y - half, w, self.road_width()),
            Origin::West => Rect::new(sl - off, c.y - half, w, self.road_width()),
        }
    }

    /// Pedestrian waiting corners, clockwise from top-left. Each sits on the
    /// centerline of the two crosswalks that meet there.
    pub fn corners(&self) -> [Vec2; 4] {
        let c = self.center();
        let d = self.stop_margin() + self.crosswalk_offset - self.crosswalk_width / 2.0;
        [
            Vec2::new(c.x - d, c.y - d),
            Vec2::new(c.x + d, c.y - d),
            Vec2::new(c.x + d, c.y + d),
            Vec2::new(c.x - d, c.y + d),
        ]
    }

    pub fn in_bounds(&self, p: Vec2) -> bool {
        let m = self.despawn_margin;
        (-m..=self.world_width + m).contains(&p.x) && (-m..=self.world_height + m).contains(&p.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub max_speed: f32,
    /// Speed gained per tick while below target.
    pub acceleration: f32,
    /// Speed shed per tick while above target.
    pub deceleration: f32,
    pub stop_epsilon: f32,
    pub braking_time: f32,
    pub stopping_buffer: f32,
    pub min_sensor_length: f32,
    pub sensor_padding: f32,
    pub raycast_min_distance: f32,
    pub halt_distance: f32,
    /// Seconds of pedestrian-only blocking before safety yielding is bypassed.
    pub patience_threshold: f32,
    pub ignore_release_margin: f32,
    pub following_distance: f32,
    pub collision_force_threshold: f32,
    /// Number of leading junction ranks allowed to proceed.
    pub admission_slots: usize,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            acceleration: 0.1,
            deceleration: 0.15,
            stop_epsilon: 0.05,
            braking_time: 1.5,
            stopping_buffer: 1.2,
            min_sensor_length: 50.0,
            sensor_padding: 30.0,
            raycast_min_distance: 12.0,
            halt_distance: 40.0,
            patience_threshold: 3.0,
            ignore_release_margin: 10.0,
            following_distance: 50.0,
            collision_force_threshold: 2.0,
            admission_slots: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PedestrianConfig {
    pub speed: f32,
    pub radius: f32,
    pub arrival_radius: f32,
    /// Seconds a knocked-down pedestrian stays before removal.
    pub despawn_secs: f32,
    pub spawn_jitter: f32,
}

impl Default for PedestrianConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            radius: 8.0,
            arrival_radius: 10.0,
            despawn_secs: 1.0,
            spawn_jitter: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub min_green_ticks: u32,
    pub yellow_ticks: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_green_ticks: 240,
            yellow_ticks: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Ticks between vehicle spawn attempts; 0 disables automatic spawning.
    pub vehicle_interval: u64,
    /// Ticks between pedestrian spawns; 0 disables automatic spawning.
    pub pedestrian_interval: u64,
    pub safe_distance: f32,
    pub emergency_chance: f64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            vehicle_interval: 150,
            pedestrian_interval: 180,
            safe_distance: 45.0,
            emergency_chance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enabled: bool,
    pub hidden_units: usize,
    pub discount: f64,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    pub learning_rate: f64,
    pub replay_capacity: usize,
    pub batch_size: usize,
    pub decision_interval: u64,
    /// Queue length that maps to a normalized state value of 1.0.
    pub queue_normalizer: f64,
    pub queue_penalty: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hidden_units: 32,
            discount: 0.95,
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.995,
            learning_rate: 0.0005,
            replay_capacity: 5000,
            batch_size: 32,
            decision_interval: 60,
            queue_normalizer: 20.0,
            queue_penalty: 0.5,
        }
    }
}

impl PolicyConfig {
    /// Checks the learning hyperparameters on their own, so a policy can be
    /// built without a full [`SimConfig`].
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(CrossingError::InvalidConfig(msg.to_string()));

        if self.batch_size == 0 || self.replay_capacity < self.batch_size {
            return invalid("policy.replay_capacity must be >= policy.batch_size > 0");
        }
        if self.hidden_units == 0 {
            return invalid("policy.hidden_units must be > 0");
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return invalid("policy.epsilon_decay must be within (0, 1]");
        }
        if self.epsilon_min < 0.0 || self.epsilon_min > self.epsilon_start || self.epsilon_start > 1.0 {
            return invalid("policy exploration must satisfy 0 <= epsilon_min <= epsilon_start <= 1");
        }
        if self.decision_interval == 0 {
            return invalid("policy.decision_interval must be > 0");
        }
        if self.queue_normalizer <= 0.0 {
            return invalid("policy.queue_normalizer must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub fps: u32,
    pub seed: u64,
    pub health_interval_ticks: u64,
    /// Patience (seconds) above which a stopped vehicle counts as stuck.
    pub stuck_patience: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            seed: 7,
            health_interval_ticks: 300,
            stuck_patience: 5.0,
        }
    }
}

impl RunConfig {
    /// Seconds per tick.
    pub fn dt(&self) -> f32 {
        1.0 / self.fps as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SimConfig {
    /// Load configuration: built-in defaults, then an optional TOML file,
    /// then `CROSSING__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&SimConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg: SimConfig = builder
            .add_source(
                Environment::with_prefix("CROSSING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(CrossingError::InvalidConfig(msg.to_string()));

        if self.run.fps == 0 {
            return invalid("run.fps must be > 0");
        }
        if self.vehicle.max_speed <= 0.0 {
            return invalid("vehicle.max_speed must be > 0");
        }
        if self.vehicle.acceleration <= 0.0 || self.vehicle.deceleration <= 0.0 {
            return invalid("vehicle acceleration and deceleration must be > 0");
        }
        if self.pedestrian.speed <= 0.0 {
            return invalid("pedestrian.speed must be > 0");
        }
        if self.signal.yellow_ticks == 0 {
            return invalid("signal.yellow_ticks must be > 0");
        }
        if !(0.0..=1.0).contains(&self.spawn.emergency_chance) {
            return invalid("spawn.emergency_chance must be within [0, 1]");
        }

        self.policy.validate()
    }
}
