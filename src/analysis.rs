use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Serialize, Serializer, ser::SerializeMap};
use thiserror::Error;

use crate::table::{Cell, Table};

pub const PROFIT_KEYWORDS: [&str; 6] = ["profit", "gain", "résultat", "result", "net", "total"];
pub const DRAWDOWN_KEYWORDS: [&str; 4] = ["drawdown", "dd", "perte", "loss"];

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("empty table: {rows} rows x {columns} columns")]
    EmptyTable { rows: usize, columns: usize },
    #[error("no column matched profit keywords {keywords:?}; available columns: {columns:?}")]
    MissingProfitColumn {
        keywords: Vec<String>,
        columns: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnRoles {
    pub profit_column: Option<String>,
    pub drawdown_column: Option<String>,
    pub variable_columns: Vec<String>,
}

impl ColumnRoles {
    pub fn require_profit(&self) -> Result<&str, AnalysisError> {
        match &self.profit_column {
            Some(c) => Ok(c),
            None => {
                let mut columns: Vec<String> = self.drawdown_column.iter().cloned().collect();
                columns.extend(self.variable_columns.iter().cloned());
                Err(AnalysisError::MissingProfitColumn {
                    keywords: PROFIT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
                    columns,
                })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FilterCriteria {
    pub min_profit: f64,
    pub max_drawdown: f64,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            min_profit: 7000.0,
            max_drawdown: 7.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilteredResult {
    pub row_indices: Vec<usize>,
    pub total_count: usize,
    pub filtered_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableCategory {
    Signal,
    Risk,
    Timing,
    Filter,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopValue {
    pub value: Cell,
    pub best_profit: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariableStat {
    pub name: String,
    pub category: VariableCategory,
    pub occurrence_count: usize,
    pub profit_min: Option<f64>,
    pub profit_max: Option<f64>,
    pub profit_mean: Option<f64>,
    pub top_values: Vec<TopValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedOptimization {
    pub rank: usize,
    pub profit: f64,
    pub drawdown: Option<f64>,
    #[serde(serialize_with = "serialize_pairs")]
    pub variables: Vec<(String, Cell)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FilterSummary {
    pub total_count: usize,
    pub filtered_count: usize,
    pub success_rate_pct: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total_profit: f64,
    pub average_profit: f64,
    pub max_profit: f64,
    pub min_profit: f64,
    pub max_drawdown: Option<f64>,
    pub average_drawdown: Option<f64>,
    pub winning_count: usize,
    pub losing_count: usize,
    pub win_rate_pct: f64,
    pub average_win: Option<f64>,
    pub average_loss: Option<f64>,
    pub profit_factor: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub roles: ColumnRoles,
    pub summary: FilterSummary,
    pub metrics: Option<AggregateMetrics>,
    pub variable_stats: Vec<VariableStat>,
    pub best_optimizations: Vec<RankedOptimization>,
}

fn serialize_pairs<S>(pairs: &[(String, Cell)], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut m = s.serialize_map(Some(pairs.len()))?;
    for (k, v) in pairs {
        m.serialize_entry(k, v)?;
    }
    m.end()
}

pub fn classify(table: &Table) -> Result<ColumnRoles, AnalysisError> {
    if table.column_count() == 0 || table.row_count() == 0 {
        return Err(AnalysisError::EmptyTable {
            rows: table.row_count(),
            columns: table.column_count(),
        });
    }

    let matches_any = |name: &str, keywords: &[&str]| {
        let lower = name.to_lowercase();
        keywords.iter().any(|kw| lower.contains(kw))
    };

    let profit_column = table
        .columns()
        .iter()
        .find(|c| matches_any(c, &PROFIT_KEYWORDS))
        .cloned();

    let drawdown_column = table
        .columns()
        .iter()
        .filter(|c| Some(*c) != profit_column.as_ref())
        .find(|c| matches_any(c, &DRAWDOWN_KEYWORDS))
        .cloned();

    let variable_columns = table
        .columns()
        .iter()
        .filter(|c| Some(*c) != profit_column.as_ref() && Some(*c) != drawdown_column.as_ref())
        .cloned()
        .collect();

    Ok(ColumnRoles {
        profit_column,
        drawdown_column,
        variable_columns,
    })
}

fn profit_index(table: &Table, roles: &ColumnRoles) -> Result<usize, AnalysisError> {
    let name = roles.require_profit()?;
    table
        .column_index(name)
        .ok_or_else(|| AnalysisError::MissingProfitColumn {
            keywords: PROFIT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            columns: table.columns().to_vec(),
        })
}

pub fn filter(
    table: &Table,
    roles: &ColumnRoles,
    criteria: &FilterCriteria,
) -> Result<FilteredResult, AnalysisError> {
    let pi = profit_index(table, roles)?;
    let di = roles
        .drawdown_column
        .as_deref()
        .and_then(|c| table.column_index(c));

    let mut row_indices = Vec::new();
    for ri in 0..table.row_count() {
        let Some(profit) = table.cell(ri, pi).as_f64() else {
            continue;
        };
        if profit < criteria.min_profit {
            continue;
        }
        if let Some(di) = di {
            let Some(dd) = table.cell(ri, di).as_f64() else {
                continue;
            };
            if dd > criteria.max_drawdown {
                continue;
            }
        }
        row_indices.push(ri);
    }

    Ok(FilteredResult {
        filtered_count: row_indices.len(),
        total_count: table.row_count(),
        row_indices,
    })
}

#[derive(Clone, Debug, PartialEq)]
enum GroupKey {
    Num(f64),
    Text(String),
}

fn group_key(cell: &Cell) -> GroupKey {
    match cell {
        Cell::Number(v) => GroupKey::Num(*v),
        Cell::Text(s) => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => GroupKey::Num(v),
            _ => GroupKey::Text(s.clone()),
        },
        Cell::Empty => GroupKey::Text(String::new()),
    }
}

impl GroupKey {
    fn fingerprint(&self) -> String {
        match self {
            GroupKey::Num(v) => format!("n:{}", v),
            GroupKey::Text(s) => format!("t:{}", s),
        }
    }

    fn display_cell(&self) -> Cell {
        match self {
            GroupKey::Num(v) => Cell::Number(*v),
            GroupKey::Text(s) if s.is_empty() => Cell::Empty,
            GroupKey::Text(s) => Cell::Text(s.clone()),
        }
    }

    // numbers ascending before text, text lexicographic
    fn natural_cmp(&self, other: &GroupKey) -> Ordering {
        match (self, other) {
            (GroupKey::Num(a), GroupKey::Num(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (GroupKey::Num(_), GroupKey::Text(_)) => Ordering::Less,
            (GroupKey::Text(_), GroupKey::Num(_)) => Ordering::Greater,
            (GroupKey::Text(a), GroupKey::Text(b)) => a.cmp(b),
        }
    }
}

struct GroupAcc {
    key: GroupKey,
    count: usize,
    best_profit: f64,
}

pub fn categorize_variable(name: &str) -> VariableCategory {
    let categories: [(&[&str], VariableCategory); 4] = [
        (
            &[
                "rsi",
                "ma",
                "ema",
                "sma",
                "macd",
                "bollinger",
                "stoch",
                "period",
            ],
            VariableCategory::Signal,
        ),
        (
            &["sl", "tp", "stop", "take", "risk", "position", "lot"],
            VariableCategory::Risk,
        ),
        (
            &["hour", "time", "session", "day", "week"],
            VariableCategory::Timing,
        ),
        (
            &["filter", "confirm", "trend", "volume"],
            VariableCategory::Filter,
        ),
    ];

    let lower = name.to_lowercase();
    for (keywords, cat) in categories {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return cat;
        }
    }
    VariableCategory::Other
}

pub fn analyze(
    table: &Table,
    filtered: &FilteredResult,
    roles: &ColumnRoles,
    top_k: usize,
) -> Result<Vec<VariableStat>, AnalysisError> {
    let pi = profit_index(table, roles)?;

    let profits: Vec<f64> = filtered
        .row_indices
        .iter()
        .filter_map(|&ri| table.cell(ri, pi).as_f64())
        .collect();

    // global filtered-set profit bounds, repeated on every variable section
    let (profit_min, profit_max, profit_mean) = if profits.is_empty() {
        (None, None, None)
    } else {
        let min = profits.iter().copied().fold(f64::INFINITY, f64::min);
        let max = profits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = profits.iter().sum::<f64>() / profits.len() as f64;
        (Some(min), Some(max), Some(mean))
    };

    let mut stats = Vec::with_capacity(roles.variable_columns.len());
    for var in &roles.variable_columns {
        let Some(vi) = table.column_index(var) else {
            continue;
        };

        // insertion-ordered grouping keeps ties reproducible
        let mut groups: Vec<GroupAcc> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        for &ri in &filtered.row_indices {
            let key = group_key(table.cell(ri, vi));
            let fp = key.fingerprint();
            let slot = *slots.entry(fp).or_insert_with(|| {
                groups.push(GroupAcc {
                    key,
                    count: 0,
                    best_profit: f64::NEG_INFINITY,
                });
                groups.len() - 1
            });
            groups[slot].count += 1;
            if let Some(p) = table.cell(ri, pi).as_f64() {
                if p > groups[slot].best_profit {
                    groups[slot].best_profit = p;
                }
            }
        }

        let occurrence_count = groups.len();

        groups.sort_by(|a, b| {
            b.best_profit
                .partial_cmp(&a.best_profit)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.key.natural_cmp(&b.key))
        });
        groups.truncate(top_k);

        let top_values = groups
            .into_iter()
            .map(|g| TopValue {
                value: g.key.display_cell(),
                best_profit: g.best_profit,
                count: g.count,
            })
            .collect();

        stats.push(VariableStat {
            name: var.clone(),
            category: categorize_variable(var),
            occurrence_count,
            profit_min,
            profit_max,
            profit_mean,
            top_values,
        });
    }

    Ok(stats)
}

pub fn rank(
    table: &Table,
    filtered: &FilteredResult,
    roles: &ColumnRoles,
    n: usize,
) -> Result<Vec<RankedOptimization>, AnalysisError> {
    let pi = profit_index(table, roles)?;
    let di = roles
        .drawdown_column
        .as_deref()
        .and_then(|c| table.column_index(c));

    let mut ordered: Vec<(usize, f64)> = filtered
        .row_indices
        .iter()
        .filter_map(|&ri| table.cell(ri, pi).as_f64().map(|p| (ri, p)))
        .collect();

    // stable sort: equal profits keep filtered-set order
    ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ordered.truncate(n);

    let ranked = ordered
        .into_iter()
        .enumerate()
        .map(|(i, (ri, profit))| {
            let variables = roles
                .variable_columns
                .iter()
                .filter_map(|c| {
                    table
                        .column_index(c)
                        .map(|ci| (c.clone(), table.cell(ri, ci).clone()))
                })
                .collect();
            RankedOptimization {
                rank: i + 1,
                profit,
                drawdown: di.and_then(|di| table.cell(ri, di).as_f64()),
                variables,
            }
        })
        .collect();

    Ok(ranked)
}

fn aggregate_metrics(
    table: &Table,
    filtered: &FilteredResult,
    pi: usize,
    di: Option<usize>,
) -> Option<AggregateMetrics> {
    let profits: Vec<f64> = filtered
        .row_indices
        .iter()
        .filter_map(|&ri| table.cell(ri, pi).as_f64())
        .collect();
    if profits.is_empty() {
        return None;
    }

    let total_profit: f64 = profits.iter().sum();
    let average_profit = total_profit / profits.len() as f64;
    let max_profit = profits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_profit = profits.iter().copied().fold(f64::INFINITY, f64::min);

    // drawdown magnitudes, sign-insensitive
    let dds: Vec<f64> = di
        .map(|di| {
            filtered
                .row_indices
                .iter()
                .filter_map(|&ri| table.cell(ri, di).as_f64())
                .map(f64::abs)
                .collect()
        })
        .unwrap_or_default();
    let (max_drawdown, average_drawdown) = if dds.is_empty() {
        (None, None)
    } else {
        (
            Some(dds.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            Some(dds.iter().sum::<f64>() / dds.len() as f64),
        )
    };

    let wins: Vec<f64> = profits.iter().copied().filter(|&p| p > 0.0).collect();
    let losses: Vec<f64> = profits.iter().copied().filter(|&p| p < 0.0).collect();
    let gross_wins: f64 = wins.iter().sum();
    let gross_losses: f64 = losses.iter().map(|p| p.abs()).sum();

    Some(AggregateMetrics {
        total_profit,
        average_profit,
        max_profit,
        min_profit,
        max_drawdown,
        average_drawdown,
        winning_count: wins.len(),
        losing_count: losses.len(),
        win_rate_pct: wins.len() as f64 / profits.len() as f64 * 100.0,
        average_win: (!wins.is_empty()).then(|| gross_wins / wins.len() as f64),
        average_loss: (!losses.is_empty()).then(|| gross_losses / losses.len() as f64),
        profit_factor: (gross_losses > 0.0).then(|| gross_wins / gross_losses),
    })
}

pub fn assemble(
    table: &Table,
    criteria: &FilterCriteria,
    top_k: usize,
    n: usize,
) -> Result<AnalysisResult, AnalysisError> {
    let roles = classify(table)?;
    let pi = profit_index(table, &roles)?;
    let di = roles
        .drawdown_column
        .as_deref()
        .and_then(|c| table.column_index(c));

    let filtered = filter(table, &roles, criteria)?;
    let metrics = aggregate_metrics(table, &filtered, pi, di);
    let variable_stats = analyze(table, &filtered, &roles, top_k)?;
    let best_optimizations = rank(table, &filtered, &roles, n)?;

    Ok(AnalysisResult {
        summary: FilterSummary {
            total_count: filtered.total_count,
            filtered_count: filtered.filtered_count,
            success_rate_pct: filtered.filtered_count as f64 / filtered.total_count as f64 * 100.0,
        },
        roles,
        metrics,
        variable_stats,
        best_optimizations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(raw: &str) -> Cell {
        Cell::parse(raw)
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| cell(v)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn sample_table() -> Table {
        table(
            &["Profit", "Drawdown", "RSI_Period"],
            &[
                &["8000", "3", "14"],
                &["7500", "9", "21"],
                &["9000", "2", "14"],
            ],
        )
    }

    #[test]
    fn classify_assigns_roles_in_column_order() {
        let t = table(
            &["RSI_Period", "Net Profit", "Drawdown %", "StopLoss"],
            &[&["14", "8000", "3", "50"]],
        );
        let roles = classify(&t).unwrap();
        assert_eq!(roles.profit_column.as_deref(), Some("Net Profit"));
        assert_eq!(roles.drawdown_column.as_deref(), Some("Drawdown %"));
        assert_eq!(roles.variable_columns, vec!["RSI_Period", "StopLoss"]);
    }

    #[test]
    fn classify_profit_wins_over_drawdown_on_same_column() {
        // "Total DD" contains both keyword sets; profit is matched first
        let t = table(&["Total DD", "Other"], &[&["1", "2"]]);
        let roles = classify(&t).unwrap();
        assert_eq!(roles.profit_column.as_deref(), Some("Total DD"));
        assert_eq!(roles.drawdown_column, None);
        assert_eq!(roles.variable_columns, vec!["Other"]);
    }

    #[test]
    fn classify_rejects_empty_table() {
        let t = Table::new(vec!["Profit".to_string()], Vec::new()).unwrap();
        assert_eq!(
            classify(&t),
            Err(AnalysisError::EmptyTable {
                rows: 0,
                columns: 1
            })
        );
    }

    #[test]
    fn missing_profit_column_is_fatal() {
        let t = table(&["Param1", "Param2"], &[&["1", "2"]]);
        let roles = classify(&t).unwrap();
        assert_eq!(roles.profit_column, None);

        let err = assemble(&t, &FilterCriteria::default(), 5, 15).unwrap_err();
        match err {
            AnalysisError::MissingProfitColumn { columns, .. } => {
                assert_eq!(columns, vec!["Param1", "Param2"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn filter_applies_inclusive_bounds() {
        let t = sample_table();
        let roles = classify(&t).unwrap();
        let f = filter(
            &t,
            &roles,
            &FilterCriteria {
                min_profit: 7500.0,
                max_drawdown: 3.0,
            },
        )
        .unwrap();
        // 7500/9 fails drawdown, 8000/3 and 9000/2 pass on the inclusive bounds
        assert_eq!(f.row_indices, vec![0, 2]);
        assert_eq!(f.total_count, 3);
        assert_eq!(f.filtered_count, 2);
    }

    #[test]
    fn filter_excludes_malformed_rows() {
        let t = table(
            &["Profit", "Drawdown", "X"],
            &[
                &["8000", "3", "1"],
                &["n/a", "3", "2"],
                &["9000", "", "3"],
                &["9000", "5", "4"],
            ],
        );
        let roles = classify(&t).unwrap();
        let f = filter(&t, &roles, &FilterCriteria::default()).unwrap();
        assert_eq!(f.row_indices, vec![0, 3]);
        assert_eq!(f.total_count, 4);
    }

    #[test]
    fn filter_without_drawdown_column_only_checks_profit() {
        let t = table(
            &["Profit", "Step"],
            &[&["8000", "1"], &["5000", "2"], &["7000", "3"]],
        );
        let roles = classify(&t).unwrap();
        assert_eq!(roles.drawdown_column, None);
        let f = filter(&t, &roles, &FilterCriteria::default()).unwrap();
        assert_eq!(f.row_indices, vec![0, 2]);
    }

    #[test]
    fn analyze_concrete_scenario() {
        let t = sample_table();
        let roles = classify(&t).unwrap();
        let f = filter(&t, &roles, &FilterCriteria::default()).unwrap();
        assert_eq!(f.filtered_count, 2);

        let stats = analyze(&t, &f, &roles, 5).unwrap();
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.name, "RSI_Period");
        assert_eq!(s.category, VariableCategory::Signal);
        assert_eq!(s.occurrence_count, 1);
        assert_eq!(s.profit_min, Some(8000.0));
        assert_eq!(s.profit_max, Some(9000.0));
        assert_eq!(s.profit_mean, Some(8500.0));
        assert_eq!(s.top_values.len(), 1);
        assert_eq!(s.top_values[0].value, Cell::Number(14.0));
        assert_eq!(s.top_values[0].best_profit, 9000.0);
        assert_eq!(s.top_values[0].count, 2);
    }

    #[test]
    fn analyze_normalizes_numeric_values_across_types() {
        let t = table(
            &["Profit", "Lot"],
            &[&["8000", "14"], &["9000", "14.0"], &["8500", "fast"]],
        );
        let roles = classify(&t).unwrap();
        let f = filter(
            &t,
            &roles,
            &FilterCriteria {
                min_profit: 0.0,
                max_drawdown: 7.0,
            },
        )
        .unwrap();
        let stats = analyze(&t, &f, &roles, 5).unwrap();
        let s = &stats[0];
        // 14 and 14.0 collapse into one group, "fast" stays its own
        assert_eq!(s.occurrence_count, 2);
        let sum: usize = s.top_values.iter().map(|v| v.count).sum();
        assert_eq!(sum, f.filtered_count);
    }

    #[test]
    fn top_values_tie_break_chain() {
        // equal best profit: higher count first; equal count: value ascending
        let t = table(
            &["Profit", "Step"],
            &[
                &["9000", "30"],
                &["9000", "10"],
                &["8000", "10"],
                &["9000", "20"],
            ],
        );
        let roles = classify(&t).unwrap();
        let f = filter(
            &t,
            &roles,
            &FilterCriteria {
                min_profit: 0.0,
                max_drawdown: 7.0,
            },
        )
        .unwrap();
        let stats = analyze(&t, &f, &roles, 5).unwrap();
        let vals: Vec<Cell> = stats[0].top_values.iter().map(|v| v.value.clone()).collect();
        assert_eq!(
            vals,
            vec![Cell::Number(10.0), Cell::Number(20.0), Cell::Number(30.0)]
        );
        assert_eq!(stats[0].top_values[0].count, 2);
    }

    #[test]
    fn top_values_truncate_to_top_k() {
        let t = table(
            &["Profit", "Step"],
            &[&["1", "a"], &["2", "b"], &["3", "c"], &["4", "d"]],
        );
        let roles = classify(&t).unwrap();
        let f = filter(
            &t,
            &roles,
            &FilterCriteria {
                min_profit: 0.0,
                max_drawdown: 7.0,
            },
        )
        .unwrap();
        let stats = analyze(&t, &f, &roles, 2).unwrap();
        assert_eq!(stats[0].occurrence_count, 4);
        assert_eq!(stats[0].top_values.len(), 2);
        assert_eq!(stats[0].top_values[0].value, Cell::Text("d".to_string()));
    }

    #[test]
    fn group_counts_sum_to_filtered_count() {
        let t = table(
            &["Profit", "A", "B"],
            &[
                &["8000", "1", "x"],
                &["8100", "2", ""],
                &["8200", "1", "x"],
                &["8300", "3", "y"],
            ],
        );
        let roles = classify(&t).unwrap();
        let f = filter(&t, &roles, &FilterCriteria::default()).unwrap();
        let stats = analyze(&t, &f, &roles, 10).unwrap();
        for s in &stats {
            let sum: usize = s.top_values.iter().map(|v| v.count).sum();
            assert_eq!(sum, f.filtered_count, "variable {}", s.name);
        }
    }

    #[test]
    fn rank_is_stable_on_equal_profit() {
        let t = table(
            &["Profit", "Step"],
            &[
                &["8000", "first"],
                &["9000", "top"],
                &["8000", "second"],
                &["8000", "third"],
            ],
        );
        let roles = classify(&t).unwrap();
        let f = filter(&t, &roles, &FilterCriteria::default()).unwrap();
        let ranked = rank(&t, &f, &roles, 10).unwrap();

        assert_eq!(ranked.len(), 4);
        for w in ranked.windows(2) {
            assert!(w[0].profit >= w[1].profit);
        }
        assert_eq!(ranked[0].variables[0].1, Cell::Text("top".to_string()));
        assert_eq!(ranked[1].variables[0].1, Cell::Text("first".to_string()));
        assert_eq!(ranked[2].variables[0].1, Cell::Text("second".to_string()));
        assert_eq!(ranked[3].variables[0].1, Cell::Text("third".to_string()));
        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rank_truncates_to_n() {
        let t = sample_table();
        let roles = classify(&t).unwrap();
        let f = filter(&t, &roles, &FilterCriteria::default()).unwrap();
        let ranked = rank(&t, &f, &roles, 2).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].profit, 9000.0);
        assert_eq!(ranked[0].drawdown, Some(2.0));
        assert_eq!(
            ranked[0].variables,
            vec![("RSI_Period".to_string(), Cell::Number(14.0))]
        );
        assert_eq!(ranked[1].profit, 8000.0);
    }

    #[test]
    fn assemble_concrete_scenario() {
        let t = sample_table();
        let result = assemble(&t, &FilterCriteria::default(), 5, 15).unwrap();

        assert_eq!(result.summary.total_count, 3);
        assert_eq!(result.summary.filtered_count, 2);
        assert!((result.summary.success_rate_pct - 66.666).abs() < 0.01);

        assert_eq!(result.variable_stats.len(), 1);
        assert_eq!(result.variable_stats[0].occurrence_count, 1);
        assert_eq!(result.best_optimizations.len(), 2);
        assert_eq!(result.best_optimizations[0].profit, 9000.0);

        let m = result.metrics.unwrap();
        assert_eq!(m.total_profit, 17000.0);
        assert_eq!(m.max_drawdown, Some(3.0));
        assert_eq!(m.winning_count, 2);
        assert_eq!(m.losing_count, 0);
        assert_eq!(m.profit_factor, None);
    }

    #[test]
    fn assemble_is_deterministic() {
        let t = table(
            &["Profit", "Drawdown", "A", "B"],
            &[
                &["8000", "3", "1", "x"],
                &["8000", "2", "2", "y"],
                &["9500", "1", "1", "x"],
                &["7200", "6", "3", "z"],
            ],
        );
        let a = assemble(&t, &FilterCriteria::default(), 5, 15).unwrap();
        let b = assemble(&t, &FilterCriteria::default(), 5, 15).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_filtered_set_produces_empty_statistics() {
        let mut rows = Vec::new();
        for i in 0..1000 {
            rows.push(vec![
                Cell::Number(100.0 + i as f64),
                Cell::Number(20.0),
                Cell::Number((i % 7) as f64),
            ]);
        }
        let t = Table::new(
            vec![
                "Profit".to_string(),
                "Drawdown".to_string(),
                "Step".to_string(),
            ],
            rows,
        )
        .unwrap();

        let result = assemble(&t, &FilterCriteria::default(), 5, 15).unwrap();
        assert_eq!(result.summary.total_count, 1000);
        assert_eq!(result.summary.filtered_count, 0);
        assert_eq!(result.summary.success_rate_pct, 0.0);
        assert_eq!(result.metrics, None);
        assert_eq!(result.variable_stats.len(), 1);
        assert_eq!(result.variable_stats[0].occurrence_count, 0);
        assert_eq!(result.variable_stats[0].top_values, Vec::new());
        assert_eq!(result.variable_stats[0].profit_min, None);
        assert_eq!(result.variable_stats[0].profit_mean, None);
        assert!(result.best_optimizations.is_empty());
    }
}
