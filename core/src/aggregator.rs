//! Rollup of monthly targets into quarter and year totals.
//!
//! Pure: no store access, no hidden state. A quarter row exists only when at
//! least one of its months does; absence means "no data", never zero.

use crate::{
    error::{TargetError, TargetResult},
    record::{Metrics, Period, TargetRecord},
};
use std::collections::BTreeMap;

/// Quarter rows (ascending) plus the year row derived from one owner's months.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub quarters: Vec<TargetRecord>,
    pub year: TargetRecord,
}

/// Sum the monthly rows of one (scope, owner, year) into quarter and year rows.
///
/// Returns `Ok(None)` for an empty input. Every row must be a month row of the
/// same owner and year.
pub fn aggregate(monthly: &[TargetRecord]) -> TargetResult<Option<Rollup>> {
    let Some(first) = monthly.first() else {
        return Ok(None);
    };

    let mut by_quarter: BTreeMap<u32, Metrics> = BTreeMap::new();
    for row in monthly {
        if !row.scope.same_owner(&first.scope) || row.year != first.year {
            return Err(TargetError::validation(format!(
                "cannot aggregate {} {} together with {} {}",
                row.scope, row.year, first.scope, first.year
            )));
        }
        let quarter = match row.period {
            Period::Month(_) => row.period.quarter_number(),
            Period::Quarter(_) | Period::Year => None,
        }
        .ok_or_else(|| {
            TargetError::validation(format!("aggregate expects month rows, got {:?}", row.period))
        })?;
        *by_quarter.entry(quarter).or_default() += row.metrics;
    }

    let quarters: Vec<TargetRecord> = by_quarter
        .iter()
        .map(|(q, metrics)| TargetRecord::new(first.scope, Period::Quarter(*q), first.year, *metrics))
        .collect();
    let year_total: Metrics = by_quarter.values().sum();

    Ok(Some(Rollup {
        quarters,
        year: TargetRecord::new(first.scope, Period::Year, first.year, year_total),
    }))
}
