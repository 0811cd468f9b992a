use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use fieldops_domain::{
    format_date, today_utc, ActionKind, FollowUpStatus, JobExtraction, JobId, NewFollowUp,
    NewInventoryItem, NewInvoice, NewJob, NewRevenueEntry, ToolData, ToolOutcome,
};
use fieldops_store::JobStore;
use tracing::info;

use crate::schedule::resolve_follow_up_date;
use crate::EngineConfig;

/// Stock level the inventory handler scans for after a decrement. Distinct
/// from the dashboard's configurable threshold.
const LOW_STOCK_SCAN_THRESHOLD: i64 = 10;

/// Stock assumed on hand for a material never seen before.
const ASSUMED_STARTING_STOCK: i64 = 100;

const DEFAULT_UNIT_COST: f64 = 10.0;

/// Material costs keyed by name fragment; first fragment contained in the
/// spoken item name wins, anything unmatched bills at the default rate.
const MATERIAL_COSTS: &[(&str, f64)] = &[
    ("copper pipe", 25.0),
    ("pvc pipe", 12.0),
    ("wire", 8.0),
    ("circuit breaker", 35.0),
    ("faucet", 45.0),
    ("valve", 20.0),
    ("fitting", 5.0),
    ("filter", 15.0),
    ("thermostat", 60.0),
    ("insulation", 10.0),
];

/// Cross-step state threaded through a run: filled in as earlier actions
/// succeed, read by later preconditions and handlers. `absorb` returns a new
/// value rather than mutating in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunContext {
    pub job_id: Option<JobId>,
    pub invoice_total: f64,
}

impl RunContext {
    /// Fold a successful outcome into the context.
    #[must_use]
    pub fn absorb(self, outcome: &ToolOutcome) -> Self {
        if !outcome.success {
            return self;
        }
        match &outcome.data {
            Some(ToolData::Job { job_id }) => Self {
                job_id: Some(*job_id),
                ..self
            },
            Some(ToolData::Invoice { total_amount, .. }) => Self {
                invoice_total: *total_amount,
                ..self
            },
            _ => self,
        }
    }
}

/// A single bookkeeping capability. Handlers own the mutation logic for their
/// entity type but never commit; the transaction belongs to the orchestrator.
/// An `Err` here is an unexpected fault that the orchestrator converts into a
/// failed outcome at the dispatch boundary.
pub trait ToolHandler {
    fn kind(&self) -> ActionKind;

    #[allow(clippy::missing_errors_doc)]
    fn execute(
        &self,
        extraction: &JobExtraction,
        ctx: &RunContext,
        store: &dyn JobStore,
        config: &EngineConfig,
    ) -> Result<ToolOutcome>;
}

/// Closed capability table mapping each action kind to its handler.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    job_logger: JobLogger,
    inventory: InventoryUpdater,
    invoice: InvoiceGenerator,
    revenue: RevenueRecorder,
    followup: FollowupScheduler,
}

impl ToolSet {
    #[must_use]
    pub fn handler(&self, kind: ActionKind) -> &dyn ToolHandler {
        match kind {
            ActionKind::LogJob => &self.job_logger,
            ActionKind::UpdateInventory => &self.inventory,
            ActionKind::GenerateInvoice => &self.invoice,
            ActionKind::UpdateRevenue => &self.revenue,
            ActionKind::ScheduleFollowup => &self.followup,
        }
    }
}

/// Creates the job record. Always runs; every voice note produces one.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobLogger;

impl ToolHandler for JobLogger {
    fn kind(&self) -> ActionKind {
        ActionKind::LogJob
    }

    fn execute(
        &self,
        extraction: &JobExtraction,
        _ctx: &RunContext,
        store: &dyn JobStore,
        _config: &EngineConfig,
    ) -> Result<ToolOutcome> {
        let job_id = store.insert_job(&NewJob {
            customer_name: extraction.customer_name.clone(),
            job_type: extraction.job_type.clone(),
            materials_used: extraction.materials_used.clone(),
            labor_hours: extraction.labor_hours,
            status: "completed".to_string(),
            transcript: extraction.raw_transcript.clone(),
            confidence_score: extraction.confidence_score,
        })?;
        info!(%job_id, customer = %extraction.customer_name, "job logged");

        Ok(ToolOutcome::ok(
            ActionKind::LogJob,
            format!(
                "Job logged for {} (ID: {job_id})",
                extraction.customer_name
            ),
            Some(ToolData::Job { job_id }),
        ))
    }
}

/// Decrements stock per material line, creating unseen items on the fly, then
/// reports every item in the store that is running low.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryUpdater;

impl ToolHandler for InventoryUpdater {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateInventory
    }

    fn execute(
        &self,
        extraction: &JobExtraction,
        _ctx: &RunContext,
        store: &dyn JobStore,
        _config: &EngineConfig,
    ) -> Result<ToolOutcome> {
        if extraction.materials_used.is_empty() {
            return Ok(ToolOutcome::ok(
                ActionKind::UpdateInventory,
                "No materials to update",
                None,
            ));
        }

        let mut updates = Vec::new();
        let mut before = BTreeMap::new();
        let mut after = BTreeMap::new();

        for material in &extraction.materials_used {
            let requested = i64::from(material.quantity);
            if let Some(existing) = store.find_inventory_item(&material.item)? {
                // A shortage is silently clamped at zero, not rejected.
                let remaining = (existing.quantity - requested).max(0);
                store.set_inventory_quantity(existing.id, remaining)?;
                before.insert(material.item.clone(), existing.quantity);
                after.insert(material.item.clone(), remaining);
                updates.push(format!(
                    "{}: {} -> {remaining}",
                    material.item, existing.quantity
                ));
                info!(item = %material.item, from = existing.quantity, to = remaining, "inventory decremented");
            } else {
                let remaining = (ASSUMED_STARTING_STOCK - requested).max(0);
                store.insert_inventory_item(&NewInventoryItem {
                    item_name: material.item.clone(),
                    quantity: remaining,
                    unit: material.unit.clone(),
                    unit_cost: DEFAULT_UNIT_COST,
                })?;
                before.insert(material.item.clone(), ASSUMED_STARTING_STOCK);
                after.insert(material.item.clone(), remaining);
                updates.push(format!("{}: NEW (stock: {remaining})", material.item));
                info!(item = %material.item, stock = remaining, "inventory item created");
            }
        }

        // Global scan, deliberately not limited to items touched in this run.
        let low_stock: Vec<String> = store
            .list_inventory()?
            .into_iter()
            .filter(|item| item.quantity < LOW_STOCK_SCAN_THRESHOLD)
            .map(|item| item.item_name)
            .collect();

        let message = format!("Updated {} inventory items", updates.len());
        Ok(ToolOutcome::ok(
            ActionKind::UpdateInventory,
            message,
            Some(ToolData::Inventory {
                updates,
                before,
                after,
                low_stock,
            }),
        ))
    }
}

/// Prices the job (labor plus materials) and writes the invoice row.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceGenerator;

impl ToolHandler for InvoiceGenerator {
    fn kind(&self) -> ActionKind {
        ActionKind::GenerateInvoice
    }

    fn execute(
        &self,
        extraction: &JobExtraction,
        ctx: &RunContext,
        store: &dyn JobStore,
        config: &EngineConfig,
    ) -> Result<ToolOutcome> {
        if !extraction.invoice_required {
            return Ok(ToolOutcome::ok(
                ActionKind::GenerateInvoice,
                "Invoice not required",
                None,
            ));
        }

        let job_id = ctx.job_id.ok_or_else(|| anyhow!("job id not available"))?;
        let labor_cost = extraction.labor_hours * config.labor_rate_per_hour;
        let materials_cost: f64 = extraction
            .materials_used
            .iter()
            .map(|line| estimate_material_cost(&line.item, line.quantity))
            .sum();
        let total_amount = labor_cost + materials_cost;

        let invoice_id = store.insert_invoice(&NewInvoice {
            job_id,
            labor_cost,
            materials_cost,
            total_amount,
        })?;
        info!(%invoice_id, %job_id, total_amount, labor_cost, materials_cost, "invoice generated");

        Ok(ToolOutcome::ok(
            ActionKind::GenerateInvoice,
            format!("Invoice generated: ${total_amount:.2}"),
            Some(ToolData::Invoice {
                invoice_id,
                labor_cost,
                materials_cost,
                total_amount,
            }),
        ))
    }
}

fn estimate_material_cost(item_name: &str, quantity: u32) -> f64 {
    let item_lower = item_name.to_lowercase();
    let unit_cost = MATERIAL_COSTS
        .iter()
        .find(|(fragment, _)| item_lower.contains(fragment))
        .map_or(DEFAULT_UNIT_COST, |(_, cost)| *cost);
    unit_cost * f64::from(quantity)
}

/// Records the invoiced amount as revenue for today.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevenueRecorder;

impl ToolHandler for RevenueRecorder {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateRevenue
    }

    fn execute(
        &self,
        _extraction: &JobExtraction,
        ctx: &RunContext,
        store: &dyn JobStore,
        _config: &EngineConfig,
    ) -> Result<ToolOutcome> {
        let amount = ctx.invoice_total;
        if amount <= 0.0 {
            return Ok(ToolOutcome::ok(
                ActionKind::UpdateRevenue,
                "No revenue to record",
                None,
            ));
        }

        let job_id = ctx.job_id.ok_or_else(|| anyhow!("job id not available"))?;
        let revenue_id = store.insert_revenue_entry(&NewRevenueEntry {
            date: today_utc(),
            amount,
            source: "invoice".to_string(),
            job_id,
        })?;
        info!(%revenue_id, %job_id, amount, "revenue recorded");

        Ok(ToolOutcome::ok(
            ActionKind::UpdateRevenue,
            format!("Revenue of ${amount:.2} recorded"),
            Some(ToolData::Revenue { revenue_id, amount }),
        ))
    }
}

/// Resolves the follow-up date and writes the pending follow-up row.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowupScheduler;

impl ToolHandler for FollowupScheduler {
    fn kind(&self) -> ActionKind {
        ActionKind::ScheduleFollowup
    }

    fn execute(
        &self,
        extraction: &JobExtraction,
        ctx: &RunContext,
        store: &dyn JobStore,
        _config: &EngineConfig,
    ) -> Result<ToolOutcome> {
        let Some(raw_date) = extraction
            .follow_up_date
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
        else {
            return Ok(ToolOutcome::ok(
                ActionKind::ScheduleFollowup,
                "No follow-up needed",
                None,
            ));
        };

        let job_id = ctx.job_id.ok_or_else(|| anyhow!("job id not available"))?;
        let scheduled_date = resolve_follow_up_date(raw_date, today_utc());
        let reason = extraction
            .follow_up_reason
            .clone()
            .unwrap_or_else(|| "General follow-up".to_string());

        let follow_up_id = store.insert_follow_up(&NewFollowUp {
            job_id,
            customer_name: extraction.customer_name.clone(),
            scheduled_date,
            reason: reason.clone(),
            status: FollowUpStatus::Pending,
        })?;
        let scheduled_date = format_date(scheduled_date)?;
        info!(%follow_up_id, %job_id, %scheduled_date, "follow-up scheduled");

        Ok(ToolOutcome::ok(
            ActionKind::ScheduleFollowup,
            format!("Follow-up scheduled for {scheduled_date}"),
            Some(ToolData::Followup {
                follow_up_id,
                scheduled_date,
                reason,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{estimate_material_cost, RunContext};
    use fieldops_domain::{ActionKind, InvoiceId, JobId, ToolData, ToolOutcome};

    #[test]
    fn material_cost_matches_by_name_fragment() {
        assert!((estimate_material_cost("copper pipe", 3) - 75.0).abs() < 1e-9);
        assert!((estimate_material_cost("Copper Pipe (1/2 inch)", 1) - 25.0).abs() < 1e-9);
        assert!((estimate_material_cost("smart thermostat", 1) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn unmatched_material_bills_at_default_rate() {
        assert!((estimate_material_cost("mystery widget", 4) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn context_absorbs_job_and_invoice_payloads() {
        let ctx = RunContext::default();
        let ctx = ctx.absorb(&ToolOutcome::ok(
            ActionKind::LogJob,
            "ok",
            Some(ToolData::Job { job_id: JobId(7) }),
        ));
        let ctx = ctx.absorb(&ToolOutcome::ok(
            ActionKind::GenerateInvoice,
            "ok",
            Some(ToolData::Invoice {
                invoice_id: InvoiceId(1),
                labor_cost: 150.0,
                materials_cost: 75.0,
                total_amount: 225.0,
            }),
        ));
        assert_eq!(ctx.job_id, Some(JobId(7)));
        assert!((ctx.invoice_total - 225.0).abs() < f64::EPSILON);
    }

    #[test]
    fn context_ignores_failed_outcomes() {
        let ctx = RunContext::default();
        let ctx = ctx.absorb(&ToolOutcome::fail(ActionKind::LogJob, "boom"));
        assert_eq!(ctx, RunContext::default());
    }
}
