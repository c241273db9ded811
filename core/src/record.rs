//! The target data model: who a target belongs to, which period it covers,
//! and the three metrics it carries.
//!
//! RULE: scope and period are closed sum types. Every site that branches on
//! them matches exhaustively, so a new variant is a compile error until each
//! site has been reviewed.

use crate::{
    error::{TargetError, TargetResult},
    types::{DepartmentId, RecordId, UserId, Year},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

// ── Scope ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Individual,
    Department,
    Company,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Individual => "individual",
            ScopeKind::Department => "department",
            ScopeKind::Company => "company",
        }
    }

    pub fn parse(s: &str) -> TargetResult<Self> {
        match s {
            "individual" => Ok(ScopeKind::Individual),
            "department" => Ok(ScopeKind::Department),
            "company" => Ok(ScopeKind::Company),
            other => Err(TargetError::validation(format!("unknown scope kind '{other}'"))),
        }
    }
}

/// Ownership of a target.
///
/// An individual's department is context for the manager backfill rule. It is
/// part of the row's natural key but not of its owner identity: two rows of
/// the same user are owned by the same scope whatever department they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Individual {
        user: UserId,
        department: Option<DepartmentId>,
    },
    Department {
        department: DepartmentId,
    },
    Company,
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Individual { .. } => ScopeKind::Individual,
            Scope::Department { .. } => ScopeKind::Department,
            Scope::Company => ScopeKind::Company,
        }
    }

    pub fn user(&self) -> Option<UserId> {
        match self {
            Scope::Individual { user, .. } => Some(*user),
            Scope::Department { .. } | Scope::Company => None,
        }
    }

    pub fn department(&self) -> Option<DepartmentId> {
        match self {
            Scope::Individual { department, .. } => *department,
            Scope::Department { department } => Some(*department),
            Scope::Company => None,
        }
    }

    /// Same owner, ignoring an individual's department context.
    pub fn same_owner(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Individual { user: a, .. }, Scope::Individual { user: b, .. }) => a == b,
            (Scope::Department { department: a }, Scope::Department { department: b }) => a == b,
            (Scope::Company, Scope::Company) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Individual { user, .. } => write!(f, "individual:{user}"),
            Scope::Department { department } => write!(f, "department:{department}"),
            Scope::Company => write!(f, "company"),
        }
    }
}

// ── Period ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Month,
    Quarter,
    Year,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Month => "month",
            PeriodKind::Quarter => "quarter",
            PeriodKind::Year => "year",
        }
    }

    pub fn parse(s: &str) -> TargetResult<Self> {
        match s {
            "month" => Ok(PeriodKind::Month),
            "quarter" => Ok(PeriodKind::Quarter),
            "year" => Ok(PeriodKind::Year),
            other => Err(TargetError::validation(format!("unknown period kind '{other}'"))),
        }
    }
}

/// The time slice a target covers. Construct through [`Period::month`] and
/// [`Period::quarter`] so the numbers are always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Month(u32),
    Quarter(u32),
    Year,
}

/// Quarter (1-4) containing `month`. Expects 1..=12; 0 maps to the first
/// quarter rather than underflowing.
pub fn quarter_of_month(month: u32) -> u32 {
    month.saturating_sub(1) / 3 + 1
}

impl Period {
    pub fn month(month: u32) -> TargetResult<Self> {
        if (1..=12).contains(&month) {
            Ok(Period::Month(month))
        } else {
            Err(TargetError::validation(format!("month {month} is outside 1..=12")))
        }
    }

    pub fn quarter(quarter: u32) -> TargetResult<Self> {
        if (1..=4).contains(&quarter) {
            Ok(Period::Quarter(quarter))
        } else {
            Err(TargetError::validation(format!("quarter {quarter} is outside 1..=4")))
        }
    }

    pub fn kind(&self) -> PeriodKind {
        match self {
            Period::Month(_) => PeriodKind::Month,
            Period::Quarter(_) => PeriodKind::Quarter,
            Period::Year => PeriodKind::Year,
        }
    }

    pub fn month_number(&self) -> Option<u32> {
        match self {
            Period::Month(m) => Some(*m),
            Period::Quarter(_) | Period::Year => None,
        }
    }

    /// Quarter number; derived for months, absent for the year.
    pub fn quarter_number(&self) -> Option<u32> {
        match self {
            Period::Month(m) => Some(quarter_of_month(*m)),
            Period::Quarter(q) => Some(*q),
            Period::Year => None,
        }
    }

    /// Rebuild a period from its stored columns, checking they agree.
    pub fn from_columns(
        kind: PeriodKind,
        month: Option<u32>,
        quarter: Option<u32>,
    ) -> TargetResult<Self> {
        let period = match (kind, month, quarter) {
            (PeriodKind::Month, Some(m), _) => Period::month(m)?,
            (PeriodKind::Quarter, None, Some(q)) => Period::quarter(q)?,
            (PeriodKind::Year, None, None) => Period::Year,
            _ => {
                return Err(TargetError::validation(format!(
                    "inconsistent period columns: kind={} month={month:?} quarter={quarter:?}",
                    kind.as_str()
                )))
            }
        };
        if period.quarter_number() != quarter {
            return Err(TargetError::validation(format!(
                "quarter {quarter:?} does not match period {period:?}"
            )));
        }
        Ok(period)
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// The three target figures. Each is tracked independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub contract_amount: Decimal,
    #[serde(default)]
    pub gross_profit: Decimal,
    #[serde(default)]
    pub revenue: Decimal,
}

impl Metrics {
    pub fn new(contract_amount: Decimal, gross_profit: Decimal, revenue: Decimal) -> Self {
        Self {
            contract_amount,
            gross_profit,
            revenue,
        }
    }

    /// `max(0, self - other)` for every metric.
    pub fn saturating_sub(&self, other: &Metrics) -> Metrics {
        let floor = |a: Decimal, b: Decimal| (a - b).max(Decimal::ZERO);
        Metrics {
            contract_amount: floor(self.contract_amount, other.contract_amount),
            gross_profit: floor(self.gross_profit, other.gross_profit),
            revenue: floor(self.revenue, other.revenue),
        }
    }

    pub fn is_non_negative(&self) -> bool {
        self.contract_amount >= Decimal::ZERO
            && self.gross_profit >= Decimal::ZERO
            && self.revenue >= Decimal::ZERO
    }
}

impl Add for Metrics {
    type Output = Metrics;

    fn add(self, rhs: Metrics) -> Metrics {
        Metrics {
            contract_amount: self.contract_amount + rhs.contract_amount,
            gross_profit: self.gross_profit + rhs.gross_profit,
            revenue: self.revenue + rhs.revenue,
        }
    }
}

impl AddAssign for Metrics {
    fn add_assign(&mut self, rhs: Metrics) {
        *self = *self + rhs;
    }
}

impl<'a> Sum<&'a Metrics> for Metrics {
    fn sum<I: Iterator<Item = &'a Metrics>>(iter: I) -> Metrics {
        iter.fold(Metrics::default(), |acc, m| acc + *m)
    }
}

// ── Record ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: Option<RecordId>,
    pub scope: Scope,
    pub period: Period,
    pub year: Year,
    pub metrics: Metrics,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl TargetRecord {
    /// A not-yet-persisted row.
    pub fn new(scope: Scope, period: Period, year: Year, metrics: Metrics) -> Self {
        Self {
            id: None,
            scope,
            period,
            year,
            metrics,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            scope_kind: self.scope.kind(),
            period_kind: self.period.kind(),
            year: self.year,
            month: self.period.month_number(),
            quarter: self.period.quarter_number(),
            user: self.scope.user(),
            department: self.scope.department(),
        }
    }
}

/// The tuple that identifies at most one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub scope_kind: ScopeKind,
    pub period_kind: PeriodKind,
    pub year: Year,
    pub month: Option<u32>,
    pub quarter: Option<u32>,
    pub user: Option<UserId>,
    pub department: Option<DepartmentId>,
}
