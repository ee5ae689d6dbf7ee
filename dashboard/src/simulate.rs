use rand::Rng;
use serde_json::{json, Map, Value};

use crate::types::{
    COUNT_LIMIT, COUNT_SALE, COUNT_WARNING, CREDIT_COST, IS_ENABLE, RECORD_COUNT, TIME_CYCLE,
};

/// Builds a plausible shadow document for a vending machine with `units` slots.
pub fn generate_shadow(units: u32, prefix: &str) -> Value {
    let mut rng = rand::thread_rng();
    let mut reported = Map::new();

    for n in 1..=units {
        let sales: u32 = rng.gen_range(0..120);
        let enabled = if rng.gen_bool(0.85) { "1" } else { "0" };
        let unit = json!({
            TIME_CYCLE: rng.gen_range(500..3000u32).to_string(),
            IS_ENABLE: enabled,
            COUNT_SALE: sales.to_string(),
            COUNT_WARNING: rng.gen_range(80..150u32).to_string(),
            COUNT_LIMIT: rng.gen_range(150..300u32).to_string(),
            RECORD_COUNT: (sales + rng.gen_range(0..400u32)).to_string(),
            CREDIT_COST: (rng.gen_range(1..20u32) * 100).to_string(),
        });
        reported.insert(format!("{prefix}{n}"), unit);
    }
    reported.insert(
        "General".to_string(),
        json!({ "Estado": "OK", "Saldo": rng.gen_range(0..50_000u32).to_string() }),
    );
    reported.insert("welcome".to_string(), json!("aws-iot"));

    json!({ "state": { "reported": reported } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ShadowDecoder;
    use crate::metrics::Aggregator;

    #[test]
    fn simulated_shadow_decodes() {
        let doc = generate_shadow(12, "Bomba_");
        let snapshot = ShadowDecoder::with_prefix("Bomba_").decode("sim", &doc).unwrap();
        assert_eq!(snapshot.units().len(), 12);
        assert_eq!(snapshot.units()[9].key, "Bomba_10");
        assert!(snapshot.general().is_some());

        let fleet = Aggregator::default().fleet(snapshot.units());
        assert!(fleet.units.iter().all(|u| u.unit_cost >= 100 && u.record_count >= u.sale_count));
    }
}
