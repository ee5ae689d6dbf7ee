use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

use vending_dashboard::types::{CREDIT_COST, IS_ENABLE};
use vending_dashboard::{
    Aggregator, FleetController, Patch, ShadowDecoder, SubmitError, SubmitOutcome, UpdateService,
};

const SHADOW: &str = r#"{
    "state": {
        "reported": {
            "welcome": "aws-iot",
            "General": { "Estado": "OK", "Saldo": "12000" },
            "Unit_2": { "CountSale": "1", "CreditCost": "5" },
            "Unit_1": { "CountSale": "3", "CreditCost": "2" }
        }
    }
}"#;

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(String, Patch)>>,
}

#[async_trait]
impl UpdateService for Recorder {
    async fn dispatch(&self, device: &str, patch: &Patch) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((device.to_string(), patch.clone()));
        Ok(())
    }
}

fn controller() -> FleetController<Recorder> {
    let snapshot = ShadowDecoder::default().decode_str("vm-01", SHADOW).unwrap();
    let controller = FleetController::new(Recorder::default(), Aggregator::default());
    controller.load(snapshot);
    controller
}

#[test]
fn fleet_totals_from_reported_state() {
    let metrics = controller().metrics("vm-01").unwrap();
    assert_eq!(metrics.sales_total, 11);
    assert_eq!(metrics.transaction_count, 4);
    assert_eq!(metrics.units[0].key, "Unit_1");
}

#[tokio::test]
async fn editing_one_unit_patches_only_that_unit() {
    let controller = controller();
    controller.begin_edit("vm-01").unwrap();
    controller.set_field("vm-01", "Unit_1", CREDIT_COST, "3").unwrap();

    let outcome = controller.submit("vm-01").await.unwrap();
    let SubmitOutcome::Dispatched(patch) = outcome else {
        panic!("expected a dispatched patch");
    };
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!({ "Unit_1": { "CreditCost": "3" } })
    );

    let sent = controller.service().sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "vm-01");
    assert!(sent[0].1.changes("Unit_2").is_none());
}

#[tokio::test]
async fn illegal_enable_flag_blocks_dispatch() {
    let controller = controller();
    controller.begin_edit("vm-01").unwrap();
    controller.set_field("vm-01", "Unit_1", IS_ENABLE, "7").unwrap();

    match controller.submit("vm-01").await {
        Err(SubmitError::Validation(e)) => {
            assert_eq!(e.unit, "Unit_1");
            assert_eq!(e.field, IS_ENABLE);
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert!(controller.service().sent.lock().unwrap().is_empty());
    assert!(!controller.is_editing("vm-01"));
}

#[tokio::test]
async fn refresh_then_edit_diffs_against_new_state() {
    let controller = controller();
    let updated = SHADOW.replace(r#""CountSale": "3", "CreditCost": "2""#, r#""CountSale": "3", "CreditCost": "3""#);
    controller.load(ShadowDecoder::default().decode_str("vm-01", &updated).unwrap());

    controller.begin_edit("vm-01").unwrap();
    controller.set_field("vm-01", "Unit_1", CREDIT_COST, "3").unwrap();
    assert_eq!(controller.submit("vm-01").await.unwrap(), SubmitOutcome::NoChanges);
}
