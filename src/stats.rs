use serde::Serialize;

use crate::signal::QueueLengths;

/// Aggregate counters published with every snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub queues: QueueLengths,
    /// Share of present vehicles that are moving, in [0, 1].
    pub moving_fraction: f64,
    /// Running average of the moving share, in percent.
    pub lifetime_flow: f64,
    flow_samples: u64,
    flow_sum: f64,
    pub vehicles_spawned: u64,
    pub emergency_spawned: u64,
    pub vehicles_passed: u64,
    pub peak_vehicles: usize,
    pub pedestrians_spawned: u64,
    pub pedestrians_crossed: u64,
    pub pedestrians_knocked_down: u64,
    pub policy_decisions: u64,
    pub policy_switch_requests: u64,
    pub cumulative_reward: f64,
    pub last_loss: Option<f64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            queues: QueueLengths::default(),
            moving_fraction: 1.0,
            lifetime_flow: 100.0,
            flow_samples: 0,
            flow_sum: 0.0,
            vehicles_spawned: 0,
            emergency_spawned: 0,
            vehicles_passed: 0,
            peak_vehicles: 0,
            pedestrians_spawned: 0,
            pedestrians_crossed: 0,
            pedestrians_knocked_down: 0,
            policy_decisions: 0,
            policy_switch_requests: 0,
            cumulative_reward: 0.0,
            last_loss: None,
        }
    }
}

impl Metrics {
    pub fn sample(&mut self, queues: QueueLengths, moving: usize, present: usize) {
        self.queues = queues;
        self.moving_fraction = moving as f64 / present.max(1) as f64;
        self.flow_sum += self.moving_fraction * 100.0;
        self.flow_samples += 1;
        self.lifetime_flow = self.flow_sum / self.flow_samples as f64;
        self.peak_vehicles = self.peak_vehicles.max(present);
    }

    pub fn summary(&self, ticks: u64, seconds: f32) -> String {
        let loss = self
            .last_loss
            .map(|l| format!("{l:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "Smart Crossing Statistics\n\
             Simulated time: {seconds:.1}s ({ticks} ticks)\n\
             Vehicles spawned: {}\n\
             Emergency vehicles: {}\n\
             Vehicles passed: {}\n\
             Peak vehicles: {}\n\
             Pedestrians spawned: {}\n\
             Pedestrians crossed: {}\n\
             Pedestrians knocked down: {}\n\
             Average flow: {:.1}%\n\
             Policy decisions: {}\n\
             Policy switch requests: {}\n\
             Cumulative reward: {:.2}\n\
             Last training loss: {loss}",
            self.vehicles_spawned,
            self.emergency_spawned,
            self.vehicles_passed,
            self.peak_vehicles,
            self.pedestrians_spawned,
            self.pedestrians_crossed,
            self.pedestrians_knocked_down,
            self.lifetime_flow,
            self.policy_decisions,
            self.policy_switch_requests,
            self.cumulative_reward,
        )
    }
}
