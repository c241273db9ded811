//! Manager backfill: a department manager's personal monthly target is
//! whatever the department target leaves after the other members' targets,
//! floored at zero for each metric.

use crate::{
    error::{TargetError, TargetResult},
    record::{Metrics, Period, Scope, TargetRecord},
    types::UserId,
};

/// Compute the manager's monthly row from the department's monthly row and
/// the monthly rows of every other individual in that department.
///
/// `others_month` must not contain the manager and must all sit in the same
/// department, year and month as `department_month`.
pub fn backfill_manager(
    department_month: &TargetRecord,
    others_month: &[TargetRecord],
    manager: UserId,
) -> TargetResult<TargetRecord> {
    let department = match department_month.scope {
        Scope::Department { department } => department,
        Scope::Individual { .. } | Scope::Company => {
            return Err(TargetError::validation(format!(
                "backfill needs a department row, got {}",
                department_month.scope
            )))
        }
    };
    let month = match department_month.period {
        Period::Month(m) => m,
        Period::Quarter(_) | Period::Year => {
            return Err(TargetError::validation(format!(
                "backfill needs a month row, got {:?}",
                department_month.period
            )))
        }
    };

    for other in others_month {
        let in_department = match other.scope {
            Scope::Individual { user, department: d } => user != manager && d == Some(department),
            Scope::Department { .. } | Scope::Company => false,
        };
        if !in_department || other.year != department_month.year || other.period != Period::Month(month) {
            return Err(TargetError::validation(format!(
                "{} {} {:?} is not a peer of the manager of department {department} for {}-{month:02}",
                other.scope, other.year, other.period, department_month.year
            )));
        }
    }

    let peers: Metrics = others_month.iter().map(|r| &r.metrics).sum();
    let metrics = department_month.metrics.saturating_sub(&peers);

    log::debug!(
        "backfill department={department} manager={manager} {}-{month:02}: {metrics:?}",
        department_month.year
    );

    Ok(TargetRecord::new(
        Scope::Individual {
            user: manager,
            department: Some(department),
        },
        Period::Month(month),
        department_month.year,
        metrics,
    ))
}
