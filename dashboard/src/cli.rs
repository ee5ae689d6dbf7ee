use clap::{Parser, Subcommand};
use std::str::FromStr;

#[derive(Debug, Parser)]
#[command(name = "vending-dashboard", about = "Monitor and edit vending machines through their shadows")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Poll the fleet, log metrics and cache snapshots (default)
    Monitor,
    /// List things known to the backend
    Things,
    /// Edit unit fields and send the resulting patch
    Set {
        device: String,
        /// Edits as `Unit_1.CreditCost=300`
        #[arg(required = true)]
        edits: Vec<FieldAssignment>,
    },
    /// Ask a machine to publish its state again
    Refresh { device: String },
    /// Write a JSON report of a machine's units
    Report { device: String },
    /// Show the latest dispatches for a machine
    History {
        device: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

/// `<unit>.<field>=<value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAssignment {
    pub unit: String,
    pub field: String,
    pub value: String,
}

impl FromStr for FieldAssignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <unit>.<field>=<value>, got {s:?}"))?;
        let (unit, field) = target
            .split_once('.')
            .ok_or_else(|| format!("expected <unit>.<field> before '=', got {target:?}"))?;
        if unit.is_empty() || field.is_empty() {
            return Err(format!("empty unit or field in {s:?}"));
        }
        Ok(FieldAssignment {
            unit: unit.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
