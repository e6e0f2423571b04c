//! Monthly budget versus actual spend, grouped by purchasing group.
//!
//! Every figure is recomputed from the spend log on each call; nothing is
//! cached between invocations.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::store::Collection;

pub const DEFAULT_ALERT_THRESHOLD: f64 = 90.0;
const HIGH_VALUE_DEFAULT_FRACTION: f64 = 0.7;
const HIGH_VALUE_CRITICAL_FRACTION: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendRecord {
    #[serde(rename = "Part Name")]
    pub part_name: String,
    #[serde(rename = "Group Name")]
    pub group_name: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SpendLog {
    records: Vec<SpendRecord>,
}

/// Records are decoded one at a time; a malformed entry is dropped with a
/// warning instead of discarding the whole log.
impl<'de> Deserialize<'de> for SpendLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let records = raw
            .into_iter()
            .enumerate()
            .filter_map(
                |(index, value)| match serde_json::from_value::<SpendRecord>(value) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(index, error = %err, "skipping malformed spend record");
                        None
                    }
                },
            )
            .collect();
        Ok(Self { records })
    }
}

impl Collection for SpendLog {
    const FILE_NAME: &'static str = "sample.json";
}

impl SpendLog {
    pub fn records(&self) -> &[SpendRecord] {
        &self.records
    }
}

impl FromIterator<SpendRecord> for SpendLog {
    fn from_iter<I: IntoIterator<Item = SpendRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Budgets are keyed by trimmed, lower-cased group name.
pub fn group_key(group_name: &str) -> String {
    group_name.trim().to_lowercase()
}

pub fn default_budgets() -> BTreeMap<String, f64> {
    [
        ("groupa", 50_000.0),
        ("groupb", 40_000.0),
        ("groupc", 55_500.0),
        ("parts", 290_000.0),
    ]
    .into_iter()
    .map(|(key, amount)| (key.to_string(), amount))
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetTable {
    monthly: BTreeMap<String, f64>,
}

impl BudgetTable {
    pub fn new(monthly: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            monthly: monthly
                .into_iter()
                .map(|(group, amount)| (group_key(&group), amount))
                .collect(),
        }
    }

    /// Monthly budget for a group; zero when the group has none.
    pub fn monthly_for(&self, group_name: &str) -> f64 {
        self.monthly
            .get(&group_key(group_name))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.monthly.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Current,
    Previous,
}

impl FromStr for Period {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "current" | "current-month" => Ok(Self::Current),
            "previous" | "previous-month" | "prev" => Ok(Self::Previous),
            _ => Err(format!(
                "unknown period `{raw}` (expected `current` or `previous`)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodWindow {
    pub period: Period,
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    pub days_in_month: u32,
    pub elapsed_days: u32,
}

impl PeriodWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("no {period:?} month window exists around {today}")]
    OutOfRange { today: NaiveDate, period: Period },
}

/// `None` when the window would leave the representable calendar.
pub fn month_window(today: NaiveDate, period: Period) -> Option<PeriodWindow> {
    let current = today.with_day(1)?;
    let start = match period {
        Period::Current => current,
        Period::Previous => current.checked_sub_months(Months::new(1))?,
    };
    let end = start.checked_add_months(Months::new(1))?;
    let days_in_month = u32::try_from((end - start).num_days()).unwrap_or(30);
    let elapsed_days = match period {
        Period::Current => today.day(),
        Period::Previous => days_in_month,
    };
    Some(PeriodWindow {
        period,
        start,
        end,
        days_in_month,
        elapsed_days,
    })
}

pub fn filter_period<'a>(records: &'a [SpendRecord], window: &PeriodWindow) -> Vec<&'a SpendRecord> {
    records
        .iter()
        .filter(|record| window.contains(record.date))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub group_key: String,
    pub group_name: String,
    pub actual: f64,
    pub active_days: usize,
}

/// Spend per group, ordered by group key. The display name is the first
/// spelling seen for that key.
pub fn group_totals(records: &[&SpendRecord]) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<String, (String, f64, BTreeSet<NaiveDate>)> = BTreeMap::new();
    for record in records {
        let entry = groups
            .entry(group_key(&record.group_name))
            .or_insert_with(|| (record.group_name.trim().to_string(), 0.0, BTreeSet::new()));
        entry.1 += record.amount;
        entry.2.insert(record.date);
    }
    groups
        .into_iter()
        .map(|(group_key, (group_name, actual, days))| GroupTotal {
            group_key,
            group_name,
            actual,
            active_days: days.len(),
        })
        .collect()
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilizationStatus {
    Normal,
    Warning,
    Danger,
}

impl UtilizationStatus {
    pub fn classify(utilization_pct: f64) -> Self {
        if utilization_pct <= 80.0 {
            Self::Normal
        } else if utilization_pct <= 100.0 {
            Self::Warning
        } else {
            Self::Danger
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub group: String,
    pub budget: f64,
    pub actual: f64,
    pub variance: f64,
    pub variance_pct: f64,
    pub utilization_pct: f64,
    pub status: UtilizationStatus,
}

pub fn budget_comparison(totals: &[GroupTotal], budgets: &BudgetTable) -> Vec<ComparisonRow> {
    totals
        .iter()
        .map(|total| {
            let budget = budgets.monthly_for(&total.group_key);
            let variance = total.actual - budget;
            let utilization_pct = percent(total.actual, budget);
            ComparisonRow {
                group: total.group_name.clone(),
                budget,
                actual: total.actual,
                variance,
                variance_pct: percent(variance, budget),
                utilization_pct,
                status: UtilizationStatus::classify(utilization_pct),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedVariance {
    pub rank: usize,
    pub group: String,
    pub variance: f64,
    pub variance_pct: f64,
    pub over_budget: bool,
}

/// Largest absolute deviation from budget first.
pub fn variance_ranking(rows: &[ComparisonRow]) -> Vec<RankedVariance> {
    let mut sorted = rows.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| b.variance.abs().total_cmp(&a.variance.abs()));
    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, row)| RankedVariance {
            rank: idx + 1,
            group: row.group.clone(),
            variance: row.variance,
            variance_pct: row.variance_pct,
            over_budget: row.variance > 0.0,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub group: String,
    pub actual_to_date: f64,
    pub daily_average: f64,
    pub projected_total: f64,
    pub budget: f64,
    pub projected_variance: f64,
    pub risk: RiskLevel,
}

/// Projects month-end spend from the average of the days that saw any
/// spend, extended over the days left in the month.
pub fn forecast(
    totals: &[GroupTotal],
    budgets: &BudgetTable,
    window: &PeriodWindow,
) -> Vec<ForecastRow> {
    let remaining = f64::from(window.days_in_month.saturating_sub(window.elapsed_days));
    totals
        .iter()
        .map(|total| {
            let budget = budgets.monthly_for(&total.group_key);
            let daily_average = if total.active_days > 0 {
                total.actual / total.active_days as f64
            } else {
                0.0
            };
            let projected_total = total.actual + daily_average * remaining;
            let risk = if projected_total > budget * 1.1 {
                RiskLevel::High
            } else if projected_total > budget {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            };
            ForecastRow {
                group: total.group_name.clone(),
                actual_to_date: total.actual,
                daily_average,
                projected_total,
                budget,
                projected_variance: projected_total - budget,
                risk,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub group: String,
    pub utilization_pct: f64,
    pub over_threshold: f64,
    pub level: AlertLevel,
}

pub fn alerts(rows: &[ComparisonRow], threshold_pct: f64) -> Vec<AlertRow> {
    rows.iter()
        .filter(|row| row.budget > 0.0 && row.utilization_pct >= threshold_pct)
        .map(|row| AlertRow {
            group: row.group.clone(),
            utilization_pct: row.utilization_pct,
            over_threshold: row.actual - row.budget * threshold_pct / 100.0,
            level: if row.utilization_pct > 100.0 {
                AlertLevel::Critical
            } else {
                AlertLevel::Warning
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighValuePart {
    pub part_name: String,
    pub group_name: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub over_threshold: f64,
    pub level: AlertLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighValueParts {
    pub threshold: f64,
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub parts: Vec<HighValuePart>,
}

/// Purchases at or above `threshold`, largest first. Without a threshold,
/// 70% of the largest purchase in the period is used.
pub fn high_value_parts(records: &[&SpendRecord], threshold: Option<f64>) -> HighValueParts {
    let max_amount = records
        .iter()
        .map(|record| record.amount)
        .fold(0.0_f64, f64::max);
    let threshold = threshold.unwrap_or(max_amount * HIGH_VALUE_DEFAULT_FRACTION);

    let mut parts = records
        .iter()
        .filter(|record| record.amount >= threshold)
        .map(|record| HighValuePart {
            part_name: record.part_name.clone(),
            group_name: record.group_name.clone(),
            date: record.date,
            amount: record.amount,
            over_threshold: record.amount - threshold,
            level: if record.amount > max_amount * HIGH_VALUE_CRITICAL_FRACTION {
                AlertLevel::Critical
            } else {
                AlertLevel::Warning
            },
        })
        .collect::<Vec<_>>();
    parts.sort_by(|a, b| b.amount.total_cmp(&a.amount));

    let total = parts.iter().map(|part| part.amount).sum::<f64>();
    let average = if parts.is_empty() {
        0.0
    } else {
        total / parts.len() as f64
    };
    HighValueParts {
        threshold,
        count: parts.len(),
        total,
        average,
        parts,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    pub total_spent: f64,
    pub total_budget: f64,
    pub overall_utilization_pct: f64,
    pub groups_over_budget: usize,
    pub group_count: usize,
}

pub fn summarize(rows: &[ComparisonRow], budgets: &BudgetTable) -> BudgetSummary {
    let total_spent = rows.iter().map(|row| row.actual).sum::<f64>();
    let total_budget = budgets.total();
    BudgetSummary {
        total_spent,
        total_budget,
        overall_utilization_pct: percent(total_spent, total_budget),
        groups_over_budget: rows.iter().filter(|row| row.variance > 0.0).count(),
        group_count: rows.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub window: PeriodWindow,
    pub summary: BudgetSummary,
    pub comparison: Vec<ComparisonRow>,
    pub ranking: Vec<RankedVariance>,
    pub forecast: Vec<ForecastRow>,
    pub alert_threshold: f64,
    pub alerts: Vec<AlertRow>,
    pub high_value: HighValueParts,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportOptions {
    pub today: NaiveDate,
    pub period: Period,
    pub alert_threshold: f64,
    pub parts_threshold: Option<f64>,
}

pub fn build_report(
    log: &SpendLog,
    budgets: &BudgetTable,
    options: ReportOptions,
) -> Result<BudgetReport, BudgetError> {
    let window =
        month_window(options.today, options.period).ok_or(BudgetError::OutOfRange {
            today: options.today,
            period: options.period,
        })?;
    let records = filter_period(log.records(), &window);
    let totals = group_totals(&records);
    let comparison = budget_comparison(&totals, budgets);
    Ok(BudgetReport {
        window,
        summary: summarize(&comparison, budgets),
        ranking: variance_ranking(&comparison),
        forecast: forecast(&totals, budgets, &window),
        alert_threshold: options.alert_threshold,
        alerts: alerts(&comparison, options.alert_threshold),
        high_value: high_value_parts(&records, options.parts_threshold),
        comparison,
    })
}
