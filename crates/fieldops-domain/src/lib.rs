#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use ulid::Ulid;

pub type DateTimeUtc = OffsetDateTime;

pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

time::serde::format_description!(serde_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RunId(pub Ulid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! row_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(JobId);
row_id!(InventoryItemId);
row_id!(InvoiceId);
row_id!(FollowUpId);
row_id!(RevenueEntryId);

/// A single material consumed during a job, as spoken by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialLine {
    pub item: String,
    pub quantity: u32,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "piece".to_string()
}

/// Structured job data extracted from a voice transcript by the upstream
/// extraction collaborator. Field defaults match what the extractor is
/// allowed to omit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExtraction {
    #[serde(default = "default_customer_name")]
    pub customer_name: String,
    #[serde(default = "default_job_type")]
    pub job_type: String,
    #[serde(default)]
    pub materials_used: Vec<MaterialLine>,
    #[serde(default)]
    pub labor_hours: f64,
    #[serde(default)]
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub follow_up_reason: Option<String>,
    #[serde(default = "default_invoice_required")]
    pub invoice_required: bool,
    #[serde(default = "default_confidence_score")]
    pub confidence_score: f64,
    #[serde(default)]
    pub raw_transcript: String,
}

fn default_customer_name() -> String {
    "Unknown".to_string()
}

fn default_job_type() -> String {
    "General".to_string()
}

fn default_invoice_required() -> bool {
    true
}

fn default_confidence_score() -> f64 {
    0.85
}

impl JobExtraction {
    /// Validate the invariants the core relies on. Called at the intake
    /// boundary; an extraction that fails here never reaches the engine.
    ///
    /// # Errors
    /// Returns an error when a material line has a zero quantity or an empty
    /// item name, when `labor_hours` is negative, or when `confidence_score`
    /// is outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<()> {
        for line in &self.materials_used {
            ensure_non_empty("material item", &line.item)?;
            if line.quantity < 1 {
                return Err(anyhow!(
                    "material '{}' has quantity {}; quantity MUST be >= 1",
                    line.item,
                    line.quantity
                ));
            }
        }
        if self.labor_hours < 0.0 {
            return Err(anyhow!(
                "labor_hours MUST be non-negative, got {}",
                self.labor_hours
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(anyhow!(
                "confidence_score MUST be within [0.0, 1.0], got {}",
                self.confidence_score
            ));
        }
        Ok(())
    }
}

/// The closed set of actions the planner can emit and the orchestrator can
/// dispatch. Wire names are stable and appear in traces and CLI output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LogJob,
    UpdateInventory,
    GenerateInvoice,
    UpdateRevenue,
    ScheduleFollowup,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogJob => "log_job",
            Self::UpdateInventory => "update_inventory",
            Self::GenerateInvoice => "generate_invoice",
            Self::UpdateRevenue => "update_revenue",
            Self::ScheduleFollowup => "schedule_followup",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedAction {
    pub kind: ActionKind,
    pub reasoning: String,
}

/// Typed payload carried by a successful tool outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolData {
    Job {
        job_id: JobId,
    },
    Inventory {
        updates: Vec<String>,
        before: BTreeMap<String, i64>,
        after: BTreeMap<String, i64>,
        low_stock: Vec<String>,
    },
    Invoice {
        invoice_id: InvoiceId,
        labor_cost: f64,
        materials_cost: f64,
        total_amount: f64,
    },
    Revenue {
        revenue_id: RevenueEntryId,
        amount: f64,
    },
    Followup {
        follow_up_id: FollowUpId,
        scheduled_date: String,
        reason: String,
    },
}

/// Result of a single tool execution. Failure is a value here, never a
/// raised fault; the orchestrator aggregates these without unwinding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutcome {
    pub tool: ActionKind,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<ToolData>,
}

impl ToolOutcome {
    #[must_use]
    pub fn ok(tool: ActionKind, message: impl Into<String>, data: Option<ToolData>) -> Self {
        Self {
            tool,
            success: true,
            message: message.into(),
            data,
        }
    }

    #[must_use]
    pub fn fail(tool: ActionKind, message: impl Into<String>) -> Self {
        Self {
            tool,
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// One entry in the full reasoning trace of a run. Step 1 is always the
/// analyze step; subsequent steps carry the attempted tool and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub step_number: u32,
    pub action: String,
    pub reasoning: String,
    #[serde(default)]
    pub tool: Option<ActionKind>,
    #[serde(default)]
    pub outcome: Option<ToolOutcome>,
}

/// Compact semantic trace event, appended only for actions that succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "step", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStep {
    JobLogged,
    InventoryUpdated {
        before: BTreeMap<String, i64>,
        after: BTreeMap<String, i64>,
        low_stock: Vec<String>,
    },
    InvoiceGenerated {
        amount: f64,
    },
    RevenueRecorded {
        amount: f64,
    },
    FollowupScheduled {
        due_date: String,
    },
}

/// Typed per-action flags and key values for programmatic consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub job_logged: bool,
    pub inventory_updated: bool,
    pub invoice_generated: bool,
    pub followup_scheduled: bool,
    pub revenue_added: f64,
    #[serde(default)]
    pub low_stock_items: Vec<String>,
    #[serde(default)]
    pub next_followup_date: Option<String>,
}

/// Full result of one orchestrated run: the human-auditable step trace plus
/// the compact execution summary. Two views, two audiences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: RunId,
    pub extraction: JobExtraction,
    pub steps: Vec<WorkflowStep>,
    pub tools_executed: Vec<ActionKind>,
    pub success: bool,
    pub summary: String,
    pub execution: ExecutionSummary,
    pub trace: Vec<TraceStep>,
    pub input_hash: String,
}

// --- Persistent entities ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub customer_name: String,
    pub job_type: String,
    pub materials_used: Vec<MaterialLine>,
    pub labor_hours: f64,
    pub status: String,
    pub transcript: String,
    pub confidence_score: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub customer_name: String,
    pub job_type: String,
    pub materials_used: Vec<MaterialLine>,
    pub labor_hours: f64,
    pub status: String,
    pub transcript: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub item_name: String,
    pub quantity: i64,
    pub unit: String,
    pub unit_cost: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: DateTimeUtc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInventoryItem {
    pub item_name: String,
    pub quantity: i64,
    pub unit: String,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: InvoiceId,
    pub job_id: JobId,
    pub labor_cost: f64,
    pub materials_cost: f64,
    pub total_amount: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub job_id: JobId,
    pub labor_cost: f64,
    pub materials_cost: f64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Pending,
    Completed,
    Cancelled,
}

impl FollowUpStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUp {
    pub id: FollowUpId,
    pub job_id: JobId,
    pub customer_name: String,
    #[serde(with = "serde_date")]
    pub scheduled_date: Date,
    pub reason: String,
    pub status: FollowUpStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFollowUp {
    pub job_id: JobId,
    pub customer_name: String,
    pub scheduled_date: Date,
    pub reason: String,
    pub status: FollowUpStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueEntry {
    pub id: RevenueEntryId,
    #[serde(with = "serde_date")]
    pub date: Date,
    pub amount: f64,
    pub source: String,
    pub job_id: JobId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: DateTimeUtc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRevenueEntry {
    pub date: Date,
    pub amount: f64,
    pub source: String,
    pub job_id: JobId,
}

/// Read-only overview for the surrounding dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSummary {
    pub total_jobs_today: i64,
    pub total_revenue_today: f64,
    pub total_revenue_week: f64,
    pub total_revenue_month: f64,
    pub low_stock_items: Vec<InventoryItem>,
    pub upcoming_followups: Vec<FollowUp>,
    pub recent_jobs: Vec<Job>,
}

// --- Shared helpers ---

#[must_use]
pub fn now_utc() -> DateTimeUtc {
    OffsetDateTime::now_utc()
}

#[must_use]
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a JSON value with stable `serde_json` serialization + SHA-256.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn hash_json(value: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}

/// Ensure a string field is non-empty after trimming.
///
/// # Errors
/// Returns an error when the provided value is empty/whitespace.
pub fn ensure_non_empty(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field_name} MUST be non-empty"));
    }
    Ok(())
}

/// Format a timestamp as RFC 3339 text (the storage and wire format).
///
/// # Errors
/// Returns an error if formatting fails.
pub fn format_rfc3339(value: DateTimeUtc) -> Result<String> {
    Ok(value.format(&Rfc3339)?)
}

/// Parse RFC 3339 text into a timestamp.
///
/// # Errors
/// Returns an error when the input is not valid RFC 3339.
pub fn parse_rfc3339(input: &str) -> Result<DateTimeUtc> {
    Ok(OffsetDateTime::parse(input, &Rfc3339)?)
}

/// Format a calendar date as `YYYY-MM-DD`.
///
/// # Errors
/// Returns an error if formatting fails.
pub fn format_date(value: Date) -> Result<String> {
    Ok(value.format(&DATE_FORMAT)?)
}

/// Parse `YYYY-MM-DD` text into a calendar date.
///
/// # Errors
/// Returns an error when the input is not a valid calendar date.
pub fn parse_date(input: &str) -> Result<Date> {
    Ok(Date::parse(input, &DATE_FORMAT)?)
}
