//! Command-line overrides applied on top of a loaded configuration.

use flowsim_types::SimulationConfig;

/// Values that replace configuration fields before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub seed: Option<u64>,
    pub duration: Option<f64>,
    pub include_events: Option<bool>,
    pub include_history: Option<bool>,
}

impl RunOverrides {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }

    pub fn without_events(mut self) -> Self {
        self.include_events = Some(false);
        self
    }

    pub fn without_history(mut self) -> Self {
        self.include_history = Some(false);
        self
    }

    /// Apply every set override.
    pub fn apply(&self, mut config: SimulationConfig) -> SimulationConfig {
        if let Some(seed) = self.seed {
            config.simulation.random_seed = seed;
        }
        if let Some(duration) = self.duration {
            config.simulation.duration = duration;
        }
        if let Some(events) = self.include_events {
            config.output_options.include_events = events;
        }
        if let Some(history) = self.include_history {
            config.output_options.include_history = history;
        }
        config
    }
}
