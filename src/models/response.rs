use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub redis: bool,
    pub adapters: HashMap<String, bool>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
