use std::collections::BTreeSet;

use tracing::warn;

use crate::dataset::{Column, MineTable};

pub const MISSING_COUNTRY_WARNING: &str = "No 'Country' column found in the dataset.";

/// Result of narrowing the table to the selected countries.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub table: MineTable,
    pub warning: Option<String>,
}

/// Sorted distinct country values, or `None` when the sheet has no Country column.
pub fn country_options(table: &MineTable) -> Option<Vec<String>> {
    if !table.has_column(Column::Country) {
        return None;
    }
    let unique: BTreeSet<&str> = table
        .records
        .iter()
        .filter_map(|record| record.country.as_deref())
        .collect();
    Some(unique.into_iter().map(str::to_string).collect())
}

/// Keeps the rows whose country is selected.
///
/// `None` is the default selection, which is every distinct country. Either
/// way the result is a membership test, so rows without a country value are
/// never kept. Without a Country column the full table is returned along with
/// a warning.
pub fn apply(table: &MineTable, selection: Option<&[String]>) -> FilterOutcome {
    if !table.has_column(Column::Country) {
        warn!(sheet = %table.sheet, "{}", MISSING_COUNTRY_WARNING);
        return FilterOutcome {
            table: table.clone(),
            warning: Some(MISSING_COUNTRY_WARNING.to_string()),
        };
    }

    let defaults;
    let selected = match selection {
        Some(selected) => selected,
        None => {
            defaults = country_options(table).unwrap_or_default();
            defaults.as_slice()
        }
    };

    let selected: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
    let records = table
        .records
        .iter()
        .filter(|record| {
            record
                .country
                .as_deref()
                .is_some_and(|country| selected.contains(country))
        })
        .cloned()
        .collect();

    FilterOutcome {
        table: table.with_records(records),
        warning: None,
    }
}
