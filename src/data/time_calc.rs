use std::time::Duration;

/// Accumulated per-stage durations. Stage `i` is a slot in `duration`.
#[derive(Debug, Default, Clone)]
pub struct TimeCalc {
    n: Vec<u32>,
    duration: Vec<Duration>,
}

impl TimeCalc {
    /// Number of samples recorded for stage `i`.
    pub fn n_i(&self, i: usize) -> u32 {
        self.n.get(i).copied().unwrap_or(0)
    }

    pub fn avg_i(&self, i: usize) -> Option<Duration> {
        match (self.duration.get(i), self.n_i(i)) {
            (Some(total), n) if n > 0 => Some(*total / n),
            _ => None,
        }
    }

    pub fn add_or_push(&mut self, i: usize, x: Duration) {
        if i >= self.duration.len() {
            self.duration.resize(i + 1, Duration::ZERO);
            self.n.resize(i + 1, 0);
        }
        self.duration[i] += x;
        self.n[i] += 1;
    }
}
