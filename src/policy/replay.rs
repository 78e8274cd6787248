use rand::Rng;

/// One recorded decision outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub terminal: bool,
}

/// Fixed-capacity circular buffer. Once full, each push overwrites the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct ReplayBuffer<T> {
    slots: Vec<T>,
    /// Next slot to overwrite once the buffer is full.
    head: usize,
    capacity: usize,
}

impl<T> ReplayBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. [`crate::LearningPolicy::new`] validates
    /// its configuration before building one.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay capacity must be > 0");
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entry `index` counted from the oldest.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.slots.len()).filter_map(move |i| self.get(i))
    }

    /// Uniform sample of `amount` distinct entries, or `None` if the buffer
    /// holds fewer than that.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, amount: usize) -> Option<Vec<&T>> {
        if amount > self.slots.len() {
            return None;
        }
        let picked = rand::seq::index::sample(rng, self.slots.len(), amount);
        Some(picked.iter().map(|i| &self.slots[i]).collect())
    }
}
