use fieldops_domain::{JobExtraction, MaterialLine};
use fieldops_engine::{EngineConfig, InventoryUpdater, RunContext, ToolHandler};
use fieldops_store::JobStore;
use fieldops_store_sqlite::SqliteJobStore;
use proptest::prelude::*;

fn extraction_using(item: &str, quantity: u32) -> JobExtraction {
    JobExtraction {
        customer_name: "Unknown".to_string(),
        job_type: "General".to_string(),
        materials_used: vec![MaterialLine {
            item: item.to_string(),
            quantity,
            unit: "piece".to_string(),
        }],
        labor_hours: 0.0,
        follow_up_date: None,
        follow_up_reason: None,
        invoice_required: false,
        confidence_score: 0.85,
        raw_transcript: String::new(),
    }
}

proptest! {
    /// No sequence of decrements, however large the requested quantities,
    /// ever drives a stock level negative.
    #[test]
    fn inventory_quantity_is_never_negative(
        starting_stock in 0_i64..200,
        requests in proptest::collection::vec(1_u32..500, 1..12),
    ) {
        let store = SqliteJobStore::open_in_memory();
        prop_assert!(store.is_ok());
        let store = store.unwrap_or_else(|_| unreachable!());
        prop_assert!(store.migrate().is_ok());
        let inserted = store.insert_inventory_item(&fieldops_domain::NewInventoryItem {
            item_name: "copper pipe".to_string(),
            quantity: starting_stock,
            unit: "piece".to_string(),
            unit_cost: 25.0,
        });
        prop_assert!(inserted.is_ok());

        let config = EngineConfig::default();
        let updater = InventoryUpdater::default();

        for requested in requests {
            let outcome = updater.execute(
                &extraction_using("copper pipe", requested),
                &RunContext::default(),
                &store,
                &config,
            );
            prop_assert!(outcome.is_ok());
            prop_assert!(outcome.unwrap_or_else(|_| unreachable!()).success);

            let item = store.find_inventory_item("copper pipe");
            prop_assert!(item.is_ok());
            let item = item.unwrap_or_else(|_| unreachable!());
            prop_assert!(item.is_some());
            prop_assert!(item.unwrap_or_else(|| unreachable!()).quantity >= 0);
        }
    }
}
