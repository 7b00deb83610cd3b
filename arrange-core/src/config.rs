use serde::{Deserialize, Serialize};

/// Hard cap on parallel workers regardless of hardware.
pub const MAX_WORKERS: usize = 8;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateBasis {
    #[default]
    Modified,
    Created,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `None` picks `min(available_parallelism, 8)`; explicit values are clamped to `1..=8`.
    pub max_workers: Option<usize>,
    /// Timestamp used by the ByDate rule.
    pub date_basis: DateBasis,
}

impl EngineConfig {
    pub fn workers(&self) -> usize {
        match self.max_workers {
            Some(n) => n.clamp(1, MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .min(MAX_WORKERS),
        }
    }
}
