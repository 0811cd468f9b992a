use anyhow::{Context, Result};
use fieldops_domain::{
    hash_json, ActionKind, ExecutionSummary, JobExtraction, PlannedAction, RunId, RunResult,
    ToolData, ToolOutcome, TraceStep, WorkflowStep,
};
use fieldops_store::JobStore;
use tracing::{error, info, warn};

use crate::planner::plan;
use crate::tools::{RunContext, ToolSet};
use crate::EngineConfig;

/// The run state machine: plan, execute each action in order against the
/// run-exclusive store handle, then commit or roll back the whole unit of
/// work. Individual action failures are recorded and skipped over; only a
/// commit failure makes the run itself fail.
pub struct Orchestrator<'a> {
    store: &'a dyn JobStore,
    config: &'a EngineConfig,
    tools: ToolSet,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(store: &'a dyn JobStore, config: &'a EngineConfig) -> Self {
        Self {
            store,
            config,
            tools: ToolSet::default(),
        }
    }

    /// Execute the full workflow for one extraction.
    ///
    /// # Errors
    /// Returns an error only when the run transaction cannot begin or the
    /// input cannot be hashed; once execution starts, the caller always
    /// receives a structured [`RunResult`], never a raw fault.
    pub fn execute(&self, extraction: &JobExtraction) -> Result<RunResult> {
        let run_id = RunId::new();
        let input_hash = hash_json(&serde_json::to_value(extraction)?)?;
        info!(
            %run_id,
            customer = %extraction.customer_name,
            job_type = %extraction.job_type,
            "starting workflow run"
        );

        self.store
            .begin()
            .context("failed to open the run transaction")?;

        let planned = plan(extraction);
        let mut steps = vec![WorkflowStep {
            step_number: 1,
            action: "analyze_extraction".to_string(),
            reasoning: format!(
                "Analyzed voice transcript. Identified {} actions required: {}.",
                planned.len(),
                planned
                    .iter()
                    .map(|action| action.kind.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            tool: None,
            outcome: None,
        }];

        let mut ctx = RunContext::default();
        let mut tools_executed = Vec::new();
        let mut execution = ExecutionSummary::default();
        let mut trace = Vec::new();

        for (index, action) in planned.iter().enumerate() {
            let outcome = self.run_action(action, extraction, &ctx);

            if outcome.success {
                ctx = ctx.absorb(&outcome);
                tools_executed.push(action.kind);
                record_success(&outcome, &mut execution, &mut trace);
                info!(tool = %action.kind, message = %outcome.message, "tool succeeded");
            } else {
                warn!(tool = %action.kind, message = %outcome.message, "tool failed");
            }

            steps.push(WorkflowStep {
                step_number: u32::try_from(index + 2).unwrap_or(u32::MAX),
                action: format!("execute_{}", action.kind),
                reasoning: action.reasoning.clone(),
                tool: Some(action.kind),
                outcome: Some(outcome),
            });
        }

        if let Err(commit_err) = self.store.commit() {
            if let Err(rollback_err) = self.store.rollback() {
                error!(%rollback_err, "rollback after failed commit also failed");
            }
            error!(%commit_err, %run_id, "failed to commit run");
            return Ok(RunResult {
                run_id,
                extraction: extraction.clone(),
                steps,
                tools_executed,
                success: false,
                summary: format!("Workflow failed at commit stage: {commit_err}"),
                execution: ExecutionSummary::default(),
                trace: Vec::new(),
                input_hash,
            });
        }

        let summary = compose_summary(extraction, &ctx, &tools_executed);
        info!(
            %run_id,
            %summary,
            executed = tools_executed.len(),
            planned = planned.len(),
            "workflow complete"
        );

        Ok(RunResult {
            run_id,
            extraction: extraction.clone(),
            steps,
            tools_executed,
            success: true,
            summary,
            execution,
            trace,
            input_hash,
        })
    }

    fn run_action(
        &self,
        action: &PlannedAction,
        extraction: &JobExtraction,
        ctx: &RunContext,
    ) -> ToolOutcome {
        if let Some(message) = precondition_failure(action.kind, ctx) {
            return ToolOutcome::fail(action.kind, message);
        }

        let handler = self.tools.handler(action.kind);
        match handler.execute(extraction, ctx, self.store, self.config) {
            Ok(outcome) => outcome,
            Err(err) => ToolOutcome::fail(action.kind, format!("Unexpected error: {err}")),
        }
    }
}

/// Preconditions that depend on prior execution results within this run, not
/// just on the plan. A failed check yields a synthetic failed outcome and the
/// handler is never invoked.
fn precondition_failure(kind: ActionKind, ctx: &RunContext) -> Option<String> {
    match kind {
        ActionKind::GenerateInvoice if ctx.job_id.is_none() => {
            Some("Cannot generate invoice: job_id not available".to_string())
        }
        ActionKind::UpdateRevenue if ctx.job_id.is_none() || ctx.invoice_total <= 0.0 => {
            Some("Cannot record revenue: no invoice generated".to_string())
        }
        ActionKind::ScheduleFollowup if ctx.job_id.is_none() => {
            Some("Cannot schedule follow-up: job_id not available".to_string())
        }
        _ => None,
    }
}

fn record_success(
    outcome: &ToolOutcome,
    execution: &mut ExecutionSummary,
    trace: &mut Vec<TraceStep>,
) {
    match outcome.tool {
        ActionKind::LogJob => {
            execution.job_logged = true;
            trace.push(TraceStep::JobLogged);
        }
        ActionKind::UpdateInventory => {
            execution.inventory_updated = true;
            if let Some(ToolData::Inventory {
                before,
                after,
                low_stock,
                ..
            }) = &outcome.data
            {
                execution.low_stock_items = low_stock.clone();
                trace.push(TraceStep::InventoryUpdated {
                    before: before.clone(),
                    after: after.clone(),
                    low_stock: low_stock.clone(),
                });
            }
        }
        ActionKind::GenerateInvoice => {
            execution.invoice_generated = true;
            if let Some(ToolData::Invoice { total_amount, .. }) = &outcome.data {
                trace.push(TraceStep::InvoiceGenerated {
                    amount: *total_amount,
                });
            }
        }
        ActionKind::UpdateRevenue => {
            if let Some(ToolData::Revenue { amount, .. }) = &outcome.data {
                execution.revenue_added = *amount;
                trace.push(TraceStep::RevenueRecorded { amount: *amount });
            }
        }
        ActionKind::ScheduleFollowup => {
            execution.followup_scheduled = true;
            if let Some(ToolData::Followup { scheduled_date, .. }) = &outcome.data {
                execution.next_followup_date = Some(scheduled_date.clone());
                trace.push(TraceStep::FollowupScheduled {
                    due_date: scheduled_date.clone(),
                });
            }
        }
    }
}

fn compose_summary(
    extraction: &JobExtraction,
    ctx: &RunContext,
    tools_executed: &[ActionKind],
) -> String {
    let mut parts = Vec::new();
    if let Some(job_id) = ctx.job_id {
        parts.push(format!(
            "Job #{job_id} logged for {}",
            extraction.customer_name
        ));
    }
    if tools_executed.contains(&ActionKind::UpdateInventory) {
        parts.push(format!(
            "{} inventory items updated",
            extraction.materials_used.len()
        ));
    }
    if tools_executed.contains(&ActionKind::GenerateInvoice) {
        parts.push(format!("Invoice generated: ${:.2}", ctx.invoice_total));
    }
    if tools_executed.contains(&ActionKind::UpdateRevenue) {
        parts.push(format!("Revenue recorded: ${:.2}", ctx.invoice_total));
    }
    if tools_executed.contains(&ActionKind::ScheduleFollowup) {
        if let Some(date) = &extraction.follow_up_date {
            parts.push(format!("Follow-up scheduled: {date}"));
        }
    }
    parts.join(" | ")
}
