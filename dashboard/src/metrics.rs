use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{
    UnitRecord, COUNT_LIMIT, COUNT_SALE, COUNT_WARNING, CREDIT_COST, IS_ENABLE, RECORD_COUNT,
    TIME_CYCLE,
};

/// Which counter drives per-unit revenue.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RevenueBasis {
    /// `CountSale × CreditCost`
    #[default]
    Sales,
    /// `RecordCount × CreditCost`
    Records,
}

impl FromStr for RevenueBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales" | "sale" | "countsale" => Ok(RevenueBasis::Sales),
            "records" | "record" | "recordcount" => Ok(RevenueBasis::Records),
            other => Err(format!("unknown revenue basis {other:?}")),
        }
    }
}

impl fmt::Display for RevenueBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevenueBasis::Sales => write!(f, "sales"),
            RevenueBasis::Records => write!(f, "records"),
        }
    }
}

/// Reads a base-10 integer from the start of `s`.
///
/// Leading whitespace and a sign are accepted and trailing characters are
/// ignored, so `" 12abc"` is 12. Returns `None` when no digit is found or the
/// value does not fit in an `i64`.
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

pub fn coerce(value: Option<&str>, default: i64) -> i64 {
    value.and_then(parse_leading_int).unwrap_or(default)
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UnitMetrics {
    pub key: String,
    pub cycle_time: Option<String>,
    pub unit_cost: i64,
    pub count_limit: i64,
    pub sale_count: i64,
    pub record_count: i64,
    pub warning_threshold: i64,
    pub sales_revenue: i64,
    pub record_revenue: i64,
    /// Either `sales_revenue` or `record_revenue`, per the aggregator's basis.
    pub revenue: i64,
    pub enabled: bool,
    pub warning: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FleetMetrics {
    pub units: Vec<UnitMetrics>,
    pub sales_total: i64,
    pub transaction_count: i64,
    pub record_total: i64,
    pub enabled_units: usize,
    pub warning: bool,
}

impl FleetMetrics {
    pub fn warning_units(&self) -> impl Iterator<Item = &UnitMetrics> {
        self.units.iter().filter(|u| u.warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator {
    pub default: i64,
    pub basis: RevenueBasis,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator {
            default: 0,
            basis: RevenueBasis::Sales,
        }
    }
}

impl Aggregator {
    pub fn new(default: i64, basis: RevenueBasis) -> Self {
        Aggregator { default, basis }
    }

    pub fn unit(&self, unit: &UnitRecord) -> UnitMetrics {
        let num = |field: &str| coerce(unit.get(field), self.default);

        let unit_cost = num(CREDIT_COST);
        let sale_count = num(COUNT_SALE);
        let record_count = num(RECORD_COUNT);
        let warning_threshold = num(COUNT_WARNING);
        let sales_revenue = sale_count.saturating_mul(unit_cost);
        let record_revenue = record_count.saturating_mul(unit_cost);

        UnitMetrics {
            key: unit.key.clone(),
            cycle_time: unit.get(TIME_CYCLE).map(str::to_string),
            unit_cost,
            count_limit: num(COUNT_LIMIT),
            sale_count,
            record_count,
            warning_threshold,
            sales_revenue,
            record_revenue,
            revenue: match self.basis {
                RevenueBasis::Sales => sales_revenue,
                RevenueBasis::Records => record_revenue,
            },
            enabled: unit.get(IS_ENABLE) == Some("1"),
            warning: sale_count >= warning_threshold,
        }
    }

    pub fn fleet(&self, units: &[UnitRecord]) -> FleetMetrics {
        let units: Vec<UnitMetrics> = units.iter().map(|u| self.unit(u)).collect();
        FleetMetrics {
            sales_total: units.iter().fold(0i64, |acc, u| acc.saturating_add(u.revenue)),
            transaction_count: units.iter().fold(0i64, |acc, u| acc.saturating_add(u.sale_count)),
            record_total: units.iter().fold(0i64, |acc, u| acc.saturating_add(u.record_count)),
            enabled_units: units.iter().filter(|u| u.enabled).count(),
            warning: units.iter().any(|u| u.warning),
            units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_int_parsing() {
        assert_eq!(parse_leading_int("42"), Some(42));
        assert_eq!(parse_leading_int("  7"), Some(7));
        assert_eq!(parse_leading_int("-3"), Some(-3));
        assert_eq!(parse_leading_int("+5"), Some(5));
        assert_eq!(parse_leading_int("12abc"), Some(12));
        assert_eq!(parse_leading_int("3.9"), Some(3));
        assert_eq!(parse_leading_int("05"), Some(5));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(parse_leading_int("99999999999999999999999"), None);
    }

    #[test]
    fn coerce_falls_back_to_default() {
        assert_eq!(coerce(Some("abc"), 0), 0);
        assert_eq!(coerce(Some("abc"), 9), 9);
        assert_eq!(coerce(None, 4), 4);
        assert_eq!(coerce(Some("8"), 4), 8);
    }

    #[test]
    fn unit_metrics_from_partial_record() {
        let unit = UnitRecord::new("Unit_1", 1)
            .with_field(COUNT_SALE, "4")
            .with_field(CREDIT_COST, "250")
            .with_field(RECORD_COUNT, "6")
            .with_field(COUNT_WARNING, "10")
            .with_field(IS_ENABLE, "1");

        let m = Aggregator::default().unit(&unit);
        assert_eq!(m.sales_revenue, 1000);
        assert_eq!(m.record_revenue, 1500);
        assert_eq!(m.revenue, 1000);
        assert!(m.enabled);
        assert!(!m.warning);
        assert_eq!(m.cycle_time, None);

        let by_records = Aggregator::new(0, RevenueBasis::Records).unit(&unit);
        assert_eq!(by_records.revenue, 1500);
    }

    #[test]
    fn enabled_requires_exact_one() {
        let agg = Aggregator::default();
        for value in ["0", "01", "true", " 1", ""] {
            let unit = UnitRecord::new("Unit_1", 1).with_field(IS_ENABLE, value);
            assert!(!agg.unit(&unit).enabled, "{value:?} should be disabled");
        }
        assert!(!agg.unit(&UnitRecord::new("Unit_1", 1)).enabled);
    }

    #[test]
    fn warning_when_sales_reach_threshold() {
        let agg = Aggregator::default();
        let at = UnitRecord::new("Unit_1", 1)
            .with_field(COUNT_SALE, "10")
            .with_field(COUNT_WARNING, "10");
        let below = UnitRecord::new("Unit_2", 2)
            .with_field(COUNT_SALE, "9")
            .with_field(COUNT_WARNING, "10");
        assert!(agg.unit(&at).warning);
        assert!(!agg.unit(&below).warning);

        let fleet = agg.fleet(&[below.clone()]);
        assert!(!fleet.warning);
        let fleet = agg.fleet(&[below, at]);
        assert!(fleet.warning);
        assert_eq!(fleet.warning_units().count(), 1);
    }

    #[test]
    fn fleet_totals() {
        let units = vec![
            UnitRecord::new("Unit_1", 1)
                .with_field(COUNT_SALE, "3")
                .with_field(CREDIT_COST, "2")
                .with_field(IS_ENABLE, "1"),
            UnitRecord::new("Unit_2", 2)
                .with_field(COUNT_SALE, "1")
                .with_field(CREDIT_COST, "5"),
            UnitRecord::new("Unit_3", 3).with_field(COUNT_SALE, "garbage"),
        ];
        let fleet = Aggregator::default().fleet(&units);
        assert_eq!(fleet.sales_total, 11);
        assert_eq!(fleet.transaction_count, 4);
        assert_eq!(fleet.enabled_units, 1);
        assert_eq!(fleet.units.len(), 3);
    }

    #[test]
    fn arithmetic_saturates() {
        let unit = UnitRecord::new("Unit_1", 1)
            .with_field(COUNT_SALE, &i64::MAX.to_string())
            .with_field(CREDIT_COST, "2");
        let fleet = Aggregator::default().fleet(&[unit.clone(), unit]);
        assert_eq!(fleet.sales_total, i64::MAX);
        assert_eq!(fleet.transaction_count, i64::MAX);
    }

    #[test]
    fn revenue_basis_parsing() {
        assert_eq!("sales".parse::<RevenueBasis>(), Ok(RevenueBasis::Sales));
        assert_eq!("Records".parse::<RevenueBasis>(), Ok(RevenueBasis::Records));
        assert!("profit".parse::<RevenueBasis>().is_err());
        assert_eq!(RevenueBasis::Records.to_string(), "records");
    }
}
