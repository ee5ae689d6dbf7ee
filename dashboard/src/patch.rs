use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ValidationError;
use crate::types::{Patch, UnitRecord, IS_ENABLE};

/// Fields whose value must be one of a fixed set of literals.
pub const CONSTRAINED_FIELDS: &[(&str, &[&str])] = &[(IS_ENABLE, &["0", "1"])];

fn allowed_values(field: &str) -> Option<&'static [&'static str]> {
    CONSTRAINED_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, allowed)| *allowed)
}

/// Per-unit changes between `original` and `working`, before validation.
fn changed_fields<'a>(
    original: Option<&UnitRecord>,
    working: &'a UnitRecord,
) -> BTreeMap<&'a str, &'a str> {
    working
        .fields
        .iter()
        .filter(|(field, value)| original.and_then(|o| o.get(field)) != Some(value.as_str()))
        .map(|(field, value)| (field.as_str(), value.as_str()))
        .collect()
}

/// Checks constrained fields among the edited values.
pub fn validate(original: &[UnitRecord], working: &[UnitRecord]) -> Result<(), ValidationError> {
    for unit in working {
        let before = original.iter().find(|o| o.key == unit.key);
        for (field, value) in changed_fields(before, unit) {
            let Some(allowed) = allowed_values(field) else {
                continue;
            };
            if !allowed.contains(&value) {
                return Err(ValidationError {
                    unit: unit.key.clone(),
                    field: field.to_string(),
                    value: value.to_string(),
                    allowed,
                });
            }
        }
    }
    Ok(())
}

/// Builds the sparse patch taking `original` to `working`.
///
/// A field lands in the patch when it is new or differs by exact string
/// comparison, so `"5"` and `"05"` count as a change. Units without changes
/// are left out. Neither input is modified.
pub fn synthesize(original: &[UnitRecord], working: &[UnitRecord]) -> Result<Patch, ValidationError> {
    validate(original, working)?;

    let mut patch = BTreeMap::new();
    for unit in working {
        let before = original.iter().find(|o| o.key == unit.key);
        let changes: BTreeMap<String, String> = changed_fields(before, unit)
            .into_iter()
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect();
        if changes.is_empty() {
            continue;
        }
        debug!(unit = %unit.key, fields = changes.len(), "unit changed");
        patch.insert(unit.key.clone(), changes);
    }
    Ok(Patch(patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{COUNT_SALE, CREDIT_COST};

    fn original() -> Vec<UnitRecord> {
        vec![
            UnitRecord::new("Unit_1", 1)
                .with_field(COUNT_SALE, "3")
                .with_field(CREDIT_COST, "2")
                .with_field(IS_ENABLE, "1"),
            UnitRecord::new("Unit_2", 2)
                .with_field(COUNT_SALE, "1")
                .with_field(CREDIT_COST, "5"),
        ]
    }

    #[test]
    fn unmodified_copy_yields_empty_patch() {
        let original = original();
        let working = original.clone();
        let patch = synthesize(&original, &working).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn only_changed_fields_are_included() {
        let original = original();
        let mut working = original.clone();
        working[0].fields.insert(CREDIT_COST.into(), "3".into());

        let patch = synthesize(&original, &working).unwrap();
        assert_eq!(patch.units().collect::<Vec<_>>(), vec!["Unit_1"]);
        let changes = patch.changes("Unit_1").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get(CREDIT_COST).map(String::as_str), Some("3"));
    }

    #[test]
    fn new_fields_are_changes() {
        let original = original();
        let mut working = original.clone();
        working[1].fields.insert("CountLimit".into(), "40".into());

        let patch = synthesize(&original, &working).unwrap();
        assert_eq!(
            patch.changes("Unit_2").and_then(|c| c.get("CountLimit")).map(String::as_str),
            Some("40")
        );
    }

    #[test]
    fn comparison_is_string_exact() {
        let original = original();
        let mut working = original.clone();
        working[1].fields.insert(CREDIT_COST.into(), "05".into());

        let patch = synthesize(&original, &working).unwrap();
        assert_eq!(patch.field_count(), 1);
        assert!(patch.changes("Unit_2").is_some());
    }

    #[test]
    fn unit_missing_from_original_is_all_new() {
        let original = original();
        let mut working = original.clone();
        working.push(UnitRecord::new("Unit_3", 3).with_field(CREDIT_COST, "7"));

        let patch = synthesize(&original, &working).unwrap();
        assert_eq!(patch.units().collect::<Vec<_>>(), vec!["Unit_3"]);
    }

    #[test]
    fn illegal_enable_flag_names_unit_and_field() {
        let original = original();
        let mut working = original.clone();
        working[1].fields.insert(IS_ENABLE.into(), "2".into());
        working[0].fields.insert(CREDIT_COST.into(), "9".into());

        let err = synthesize(&original, &working).unwrap_err();
        assert_eq!(err.unit, "Unit_2");
        assert_eq!(err.field, IS_ENABLE);
        assert_eq!(err.value, "2");
        assert!(err.to_string().contains("Unit_2.IsEnable"));
    }

    #[test]
    fn legal_enable_flag_passes() {
        let original = original();
        let mut working = original.clone();
        working[0].fields.insert(IS_ENABLE.into(), "0".into());

        let patch = synthesize(&original, &working).unwrap();
        assert_eq!(
            patch.changes("Unit_1").and_then(|c| c.get(IS_ENABLE)).map(String::as_str),
            Some("0")
        );
    }

    #[test]
    fn untouched_bad_flag_from_device_does_not_block() {
        let original = vec![UnitRecord::new("Unit_1", 1).with_field(IS_ENABLE, "9")];
        let mut working = original.clone();
        working[0].fields.insert(CREDIT_COST.into(), "4".into());

        let patch = synthesize(&original, &working).unwrap();
        assert_eq!(patch.field_count(), 1);
    }

    #[test]
    fn inputs_are_left_alone() {
        let original = original();
        let mut working = original.clone();
        working[0].fields.insert(CREDIT_COST.into(), "3".into());
        let (o, w) = (original.clone(), working.clone());

        let _ = synthesize(&original, &working);
        assert_eq!(original, o);
        assert_eq!(working, w);
    }
}
