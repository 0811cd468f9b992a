#![forbid(unsafe_code)]

use anyhow::Result;
use fieldops_domain::{
    FollowUp, FollowUpId, InventoryItem, InventoryItemId, Invoice, InvoiceId, Job, JobId,
    NewFollowUp, NewInventoryItem, NewInvoice, NewJob, NewRevenueEntry, RevenueEntryId,
};
use time::Date;

/// Transactional read/write contract the orchestrator and tool handlers run
/// against. One store handle belongs to exactly one run for the duration of
/// its transaction; tool handlers write through it but never commit.
/// `commit`/`rollback` belong to the orchestrator alone.
pub trait JobStore {
    #[allow(clippy::missing_errors_doc)]
    fn migrate(&self) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn begin(&self) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn commit(&self) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn rollback(&self) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_job(&self, job: &NewJob) -> Result<JobId>;

    /// Look up an inventory item by its lower-cased natural key.
    #[allow(clippy::missing_errors_doc)]
    fn find_inventory_item(&self, item_name: &str) -> Result<Option<InventoryItem>>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_inventory_item(&self, item: &NewInventoryItem) -> Result<InventoryItemId>;

    #[allow(clippy::missing_errors_doc)]
    fn set_inventory_quantity(&self, id: InventoryItemId, quantity: i64) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn list_inventory(&self) -> Result<Vec<InventoryItem>>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceId>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_follow_up(&self, follow_up: &NewFollowUp) -> Result<FollowUpId>;

    #[allow(clippy::missing_errors_doc)]
    fn insert_revenue_entry(&self, entry: &NewRevenueEntry) -> Result<RevenueEntryId>;

    #[allow(clippy::missing_errors_doc)]
    fn get_invoice_for_job(&self, job_id: JobId) -> Result<Option<Invoice>>;

    #[allow(clippy::missing_errors_doc)]
    fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>>;

    #[allow(clippy::missing_errors_doc)]
    fn jobs_logged_on(&self, date: Date) -> Result<i64>;

    #[allow(clippy::missing_errors_doc)]
    fn revenue_on(&self, date: Date) -> Result<f64>;

    #[allow(clippy::missing_errors_doc)]
    fn revenue_since(&self, date: Date) -> Result<f64>;

    #[allow(clippy::missing_errors_doc)]
    fn low_stock_below(&self, threshold: i64) -> Result<Vec<InventoryItem>>;

    /// Pending follow-ups scheduled on or before the given date, soonest first.
    #[allow(clippy::missing_errors_doc)]
    fn pending_follow_ups_through(&self, date: Date) -> Result<Vec<FollowUp>>;
}
