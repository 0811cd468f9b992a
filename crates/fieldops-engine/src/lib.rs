#![forbid(unsafe_code)]

mod orchestrator;
mod planner;
mod schedule;
mod tools;

pub use orchestrator::Orchestrator;
pub use planner::plan;
pub use schedule::resolve_follow_up_date;
pub use tools::{
    FollowupScheduler, InventoryUpdater, InvoiceGenerator, JobLogger, RevenueRecorder, RunContext,
    ToolHandler, ToolSet,
};

use anyhow::{Context, Result};

pub const DEFAULT_LABOR_RATE_PER_HOUR: f64 = 75.00;
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Engine settings, resolved once at startup and passed by reference into the
/// orchestrator and handlers; never read ambiently mid-run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub labor_rate_per_hour: f64,
    /// Dashboard low-stock threshold. Distinct from the inventory handler's
    /// internal scan threshold, which stays hard-coded at 10.
    pub low_stock_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            labor_rate_per_hour: DEFAULT_LABOR_RATE_PER_HOUR,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Resolve the config from `LABOR_RATE_PER_HOUR` and
    /// `LOW_STOCK_THRESHOLD`, falling back to the defaults when unset.
    ///
    /// # Errors
    /// Returns an error when a variable is set but not parseable.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("LABOR_RATE_PER_HOUR") {
            config.labor_rate_per_hour = raw
                .parse()
                .with_context(|| format!("invalid LABOR_RATE_PER_HOUR '{raw}'"))?;
        }
        if let Ok(raw) = std::env::var("LOW_STOCK_THRESHOLD") {
            config.low_stock_threshold = raw
                .parse()
                .with_context(|| format!("invalid LOW_STOCK_THRESHOLD '{raw}'"))?;
        }
        Ok(config)
    }
}
