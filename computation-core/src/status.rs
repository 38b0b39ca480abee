//! Resource usage snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core usage of an engine at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesStatus {
    pub date: DateTime<Utc>,
    pub available_cores: usize,
    pub busy_cores: usize,
}

impl ResourcesStatus {
    pub fn new(available_cores: usize, busy_cores: usize) -> Self {
        Self {
            date: Utc::now(),
            available_cores,
            busy_cores,
        }
    }

    pub fn idle_cores(&self) -> usize {
        self.available_cores.saturating_sub(self.busy_cores)
    }
}
