use fieldops_domain::{ActionKind, JobExtraction, PlannedAction};

/// Map an extraction to the ordered list of actions to run, with a
/// human-readable justification per action. Pure and total: no I/O, cannot
/// fail, and the same extraction always yields the same plan.
#[must_use]
pub fn plan(extraction: &JobExtraction) -> Vec<PlannedAction> {
    // Rule 1: every processed voice note produces a job record.
    let mut actions = vec![PlannedAction {
        kind: ActionKind::LogJob,
        reasoning: "Every completed job must be logged for tracking and audit purposes."
            .to_string(),
    }];

    // Rule 2: materials consumed imply an inventory decrement.
    if !extraction.materials_used.is_empty() {
        let materials_list = extraction
            .materials_used
            .iter()
            .map(|line| format!("{} {}", line.quantity, line.item))
            .collect::<Vec<_>>()
            .join(", ");
        actions.push(PlannedAction {
            kind: ActionKind::UpdateInventory,
            reasoning: format!(
                "Materials were used ({materials_list}). Inventory must be decremented \
                 to maintain accurate stock levels."
            ),
        });
    }

    // Rules 3 and 4: revenue recording is a direct consequence of invoicing
    // and never appears in a plan without a preceding invoice step.
    if extraction.invoice_required {
        actions.push(PlannedAction {
            kind: ActionKind::GenerateInvoice,
            reasoning: format!(
                "Job is billable ({}h labor). Invoice must be generated for the customer.",
                extraction.labor_hours
            ),
        });
        actions.push(PlannedAction {
            kind: ActionKind::UpdateRevenue,
            reasoning: "Invoice was generated. Revenue entry must be recorded for financial \
                        tracking."
                .to_string(),
        });
    }

    // Rule 5: a mentioned follow-up date gets scheduled.
    if let Some(date) = extraction.follow_up_date.as_deref() {
        if !date.trim().is_empty() {
            let reason = extraction
                .follow_up_reason
                .as_deref()
                .unwrap_or("general follow-up");
            actions.push(PlannedAction {
                kind: ActionKind::ScheduleFollowup,
                reasoning: format!("Follow-up requested: '{date}' ({reason}). Must be scheduled."),
            });
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::plan;
    use fieldops_domain::{ActionKind, JobExtraction, MaterialLine};

    fn bare_extraction() -> JobExtraction {
        JobExtraction {
            customer_name: "Unknown".to_string(),
            job_type: "General".to_string(),
            materials_used: Vec::new(),
            labor_hours: 0.0,
            follow_up_date: None,
            follow_up_reason: None,
            invoice_required: false,
            confidence_score: 0.85,
            raw_transcript: String::new(),
        }
    }

    fn kinds(extraction: &JobExtraction) -> Vec<ActionKind> {
        plan(extraction).into_iter().map(|a| a.kind).collect()
    }

    #[test]
    fn bare_extraction_plans_only_the_job_log() {
        assert_eq!(kinds(&bare_extraction()), vec![ActionKind::LogJob]);
    }

    #[test]
    fn revenue_always_follows_invoice() {
        let mut extraction = bare_extraction();
        extraction.invoice_required = true;
        let kinds = kinds(&extraction);
        let invoice_pos = kinds.iter().position(|k| *k == ActionKind::GenerateInvoice);
        let revenue_pos = kinds.iter().position(|k| *k == ActionKind::UpdateRevenue);
        assert!(invoice_pos.is_some());
        assert!(revenue_pos.is_some());
        assert!(invoice_pos < revenue_pos);
    }

    #[test]
    fn full_extraction_plans_all_five_actions_in_order() {
        let mut extraction = bare_extraction();
        extraction.invoice_required = true;
        extraction.materials_used = vec![MaterialLine {
            item: "copper pipe".to_string(),
            quantity: 3,
            unit: "piece".to_string(),
        }];
        extraction.follow_up_date = Some("6 months".to_string());

        assert_eq!(
            kinds(&extraction),
            vec![
                ActionKind::LogJob,
                ActionKind::UpdateInventory,
                ActionKind::GenerateInvoice,
                ActionKind::UpdateRevenue,
                ActionKind::ScheduleFollowup,
            ]
        );
    }

    #[test]
    fn blank_follow_up_date_plans_no_followup() {
        let mut extraction = bare_extraction();
        extraction.follow_up_date = Some("   ".to_string());
        assert_eq!(kinds(&extraction), vec![ActionKind::LogJob]);
    }

    #[test]
    fn inventory_reasoning_lists_each_material() {
        let mut extraction = bare_extraction();
        extraction.materials_used = vec![
            MaterialLine {
                item: "copper pipe".to_string(),
                quantity: 3,
                unit: "piece".to_string(),
            },
            MaterialLine {
                item: "valve".to_string(),
                quantity: 1,
                unit: "piece".to_string(),
            },
        ];
        let actions = plan(&extraction);
        assert!(actions[1].reasoning.contains("3 copper pipe, 1 valve"));
    }

    #[test]
    fn same_extraction_always_yields_the_same_plan() {
        let mut extraction = bare_extraction();
        extraction.invoice_required = true;
        extraction.follow_up_date = Some("2 weeks".to_string());
        assert_eq!(plan(&extraction), plan(&extraction));
    }
}
