/// RSSI smoothing.
///
/// Low-pass filtering with the exponentially weighted (infinite impulse
/// response) running-sum method. Stages are chained on the unrounded value;
/// only the final output is converted to an integer, truncating toward zero.

use heapless::Vec;

/// Maximum number of stages in one chain
pub const MAX_STAGES: usize = 4;

/// One low-pass stage. `sum` always equals `n × last output`.
#[derive(Debug, Clone, Copy)]
pub struct SignalFilter {
    sum: f32,
    n: f32,
}

impl SignalFilter {
    /// Create a stage with window `n`, seeded so its first average is
    /// `initial`. A window of 0 is treated as 1 (no smoothing).
    pub fn new(initial: f32, n: u16) -> Self {
        let n = f32::from(n.max(1));
        Self {
            sum: initial * n,
            n,
        }
    }

    /// Feed one reading, returning the new filtered value.
    pub fn update(&mut self, value: f32) -> f32 {
        let average = self.sum / self.n;
        self.sum = self.sum - average + value;
        self.sum / self.n
    }

    /// Most recent output without feeding a new sample
    pub fn value(&self) -> f32 {
        self.sum / self.n
    }

    pub fn window(&self) -> u16 {
        self.n as u16
    }
}

/// Cascade of filter stages, lightest first. An empty chain passes readings
/// through unchanged.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<SignalFilter, MAX_STAGES>,
}

impl FilterChain {
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Build a chain with one stage per entry of `windows`, all seeded at
    /// `seed`. Windows beyond [`MAX_STAGES`] are ignored.
    pub fn with_windows(seed: i32, windows: &[u16]) -> Self {
        let mut chain = Self::new();
        for &n in windows.iter().take(MAX_STAGES) {
            let _ = chain.stages.push(SignalFilter::new(seed as f32, n));
        }
        chain
    }

    pub fn stages(&self) -> &[SignalFilter] {
        &self.stages
    }

    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run one reading through every stage.
    pub fn update(&mut self, value: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(value, |acc, stage| stage.update(acc))
    }

    /// Run an RSSI reading through the chain and truncate the result toward
    /// zero.
    pub fn apply(&mut self, rssi: i8) -> i32 {
        self.update(f32::from(rssi)) as i32
    }
}
