//! Online-trained signal policy.
//!
//! A small value network scores the two signal actions (hold, switch) for an
//! encoded traffic state. Decisions are epsilon-greedy; training draws
//! uniform minibatches from a bounded replay buffer and bootstraps targets
//! from the same network.

pub mod network;
pub mod replay;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

pub use network::QNetwork;
pub use replay::{ReplayBuffer, Transition};

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::signal::{Phase, QueueLengths, SignalAction};
use crate::route::Axis;

/// Length of the encoded traffic state.
pub const STATE_SIZE: usize = 3;

/// Normalized NS queue, normalized EW queue (both clamped to [0, 1]) and
/// the axis holding the light (0 = NS, 1 = EW).
pub fn encode_state(queues: QueueLengths, phase: Phase, normalizer: f64) -> Vec<f64> {
    let norm = |n: usize| (n as f64 / normalizer).min(1.0);
    vec![
        norm(queues.north_south),
        norm(queues.east_west),
        match phase.axis() {
            Axis::NorthSouth => 0.0,
            Axis::EastWest => 1.0,
        },
    ]
}

/// Throughput minus a congestion penalty.
pub fn reward(moving_fraction: f64, queued: usize, queue_penalty: f64) -> f64 {
    moving_fraction - queue_penalty * queued as f64
}

pub struct LearningPolicy {
    network: QNetwork,
    replay: ReplayBuffer<Transition>,
    epsilon: f64,
    epsilon_min: f64,
    epsilon_decay: f64,
    discount: f64,
    learning_rate: f64,
    train_steps: u64,
    rng: ChaCha8Rng,
}

impl LearningPolicy {
    /// Builds a freshly initialised policy. Rejects hyperparameters that
    /// would leave the replay buffer or the network without capacity.
    pub fn new(cfg: &PolicyConfig, seed: u64) -> Result<Self> {
        cfg.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let network = QNetwork::new(&mut rng, STATE_SIZE, cfg.hidden_units, SignalAction::COUNT);
        Ok(Self {
            network,
            replay: ReplayBuffer::new(cfg.replay_capacity),
            epsilon: cfg.epsilon_start,
            epsilon_min: cfg.epsilon_min,
            epsilon_decay: cfg.epsilon_decay,
            discount: cfg.discount,
            learning_rate: cfg.learning_rate,
            train_steps: 0,
            rng,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    pub fn replay_capacity(&self) -> usize {
        self.replay.capacity()
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    pub fn network(&self) -> &QNetwork {
        &self.network
    }

    /// Epsilon-greedy choice. Inference failures fall back to a random action.
    pub fn select_action(&mut self, state: &[f64]) -> SignalAction {
        if self.rng.random::<f64>() < self.epsilon {
            return self.random_action();
        }

        match self.network.best_action(state) {
            Ok(idx) => SignalAction::from_index(idx),
            Err(e) => {
                warn!(error = %e, "policy inference failed, acting randomly");
                self.random_action()
            }
        }
    }

    pub fn record_transition(
        &mut self,
        state: Vec<f64>,
        action: SignalAction,
        reward: f64,
        next_state: Vec<f64>,
        terminal: bool,
    ) {
        self.replay.push(Transition {
            state,
            action: action.index(),
            reward,
            next_state,
            terminal,
        });
    }

    /// Trains on one uniform minibatch. Returns `Ok(None)` while the buffer
    /// holds fewer than `batch_size` transitions.
    pub fn train_step(&mut self, batch_size: usize) -> Result<Option<f64>> {
        let Some(batch) = self.replay.sample(&mut self.rng, batch_size) else {
            return Ok(None);
        };

        let loss = self.network.train(&batch, self.discount, self.learning_rate)?;
        self.train_steps += 1;
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_min);
        Ok(Some(loss))
    }

    fn random_action(&mut self) -> SignalAction {
        SignalAction::from_index(self.rng.random_range(0..SignalAction::COUNT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PolicyConfig {
        PolicyConfig {
            replay_capacity: 16,
            batch_size: 4,
            epsilon_decay: 0.5,
            epsilon_min: 0.1,
            ..PolicyConfig::default()
        }
    }

    fn fill(policy: &mut LearningPolicy, n: usize) {
        for i in 0..n {
            let s = vec![(i % 5) as f64 / 5.0, 0.3, (i % 2) as f64];
            policy.record_transition(s.clone(), SignalAction::from_index(i % 2), 0.5, s, false);
        }
    }

    #[test]
    fn encodes_clamped_queues_and_axis() {
        let q = QueueLengths {
            north_south: 40,
            east_west: 5,
        };
        assert_eq!(encode_state(q, Phase::EwYellow, 20.0), vec![1.0, 0.25, 1.0]);
        assert_eq!(encode_state(q, Phase::NsGreen, 20.0)[2], 0.0);
    }

    #[test]
    fn reward_trades_flow_against_queues() {
        assert_eq!(reward(1.0, 0, 0.5), 1.0);
        assert_eq!(reward(0.5, 3, 0.5), -1.0);
    }

    #[test]
    fn train_step_waits_for_a_full_batch() {
        let mut p = LearningPolicy::new(&cfg(), 1).unwrap();
        fill(&mut p, 3);
        assert!(p.train_step(4).unwrap().is_none());
        assert_eq!(p.epsilon(), 1.0);
        fill(&mut p, 1);
        assert!(p.train_step(4).unwrap().is_some());
        assert_eq!(p.epsilon(), 0.5);
    }

    #[test]
    fn exploration_decays_to_floor_and_replay_stays_bounded() {
        let mut p = LearningPolicy::new(&cfg(), 2).unwrap();
        let mut last = p.epsilon();
        for _ in 0..20 {
            fill(&mut p, 3);
            p.train_step(4).unwrap();
            assert!(p.epsilon() <= last);
            assert!(p.epsilon() >= 0.1);
            assert!(p.replay_len() <= p.replay_capacity());
            last = p.epsilon();
        }
        assert_eq!(p.epsilon(), 0.1);
    }

    #[test]
    fn malformed_state_falls_back_to_random_action() {
        let mut p = LearningPolicy::new(
            &PolicyConfig {
                epsilon_start: 0.0,
                epsilon_min: 0.0,
                ..cfg()
            },
            5,
        )
        .unwrap();
        let action = p.select_action(&[0.1]);
        assert!(matches!(action, SignalAction::Hold | SignalAction::Switch));
    }

    #[test]
    fn greedy_choice_is_deterministic() {
        let greedy = PolicyConfig {
            epsilon_start: 0.0,
            epsilon_min: 0.0,
            ..cfg()
        };
        let mut a = LearningPolicy::new(&greedy, 9).unwrap();
        let mut b = LearningPolicy::new(&greedy, 9).unwrap();
        let s = [0.2, 0.7, 0.0];
        assert_eq!(a.select_action(&s), b.select_action(&s));
    }

    #[test]
    fn zero_capacity_is_rejected_instead_of_panicking() {
        let empty = PolicyConfig {
            replay_capacity: 0,
            batch_size: 0,
            ..cfg()
        };
        assert!(matches!(
            LearningPolicy::new(&empty, 1),
            Err(crate::error::CrossingError::InvalidConfig(_))
        ));

        let no_hidden = PolicyConfig {
            hidden_units: 0,
            ..cfg()
        };
        assert!(LearningPolicy::new(&no_hidden, 1).is_err());
    }
}
