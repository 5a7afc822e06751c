use std::fmt::Write;

use chrono::Utc;
use serde_json::{Value, json};

use crate::analysis::{AnalysisResult, FilterCriteria, VariableCategory};

fn category_label(cat: VariableCategory) -> &'static str {
    match cat {
        VariableCategory::Signal => "signal",
        VariableCategory::Risk => "risk",
        VariableCategory::Timing => "timing",
        VariableCategory::Filter => "filter",
        VariableCategory::Other => "other",
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{:.2}", x),
        None => "-".to_string(),
    }
}

pub fn render_report(result: &AnalysisResult, criteria: &FilterCriteria) -> String {
    let mut out = String::new();
    let line = "=".repeat(80);
    let rule = "-".repeat(40);

    let _ = writeln!(out, "{line}");
    let _ = writeln!(out, "         OPTIMIZATION ANALYSIS REPORT");
    let _ = writeln!(out, "{line}");
    let _ = writeln!(out);

    let _ = writeln!(out, "SUMMARY");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "- Total optimizations: {}", result.summary.total_count);
    let _ = writeln!(
        out,
        "- Profitable optimizations (profit >= {:.2}, drawdown <= {:.2}): {}",
        criteria.min_profit, criteria.max_drawdown, result.summary.filtered_count
    );
    let _ = writeln!(
        out,
        "- Success rate: {:.1}%",
        result.summary.success_rate_pct
    );
    if let Some(profit) = &result.roles.profit_column {
        let _ = writeln!(out, "- Profit column: {profit}");
    }
    if let Some(dd) = &result.roles.drawdown_column {
        let _ = writeln!(out, "- Drawdown column: {dd}");
    }
    let _ = writeln!(out);

    if let Some(m) = &result.metrics {
        let _ = writeln!(out, "AGGREGATE METRICS");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "- Total profit: {:.2}", m.total_profit);
        let _ = writeln!(out, "- Average profit: {:.2}", m.average_profit);
        let _ = writeln!(out, "- Max profit: {:.2}", m.max_profit);
        let _ = writeln!(out, "- Min profit: {:.2}", m.min_profit);
        let _ = writeln!(out, "- Max drawdown: {}", fmt_opt(m.max_drawdown));
        let _ = writeln!(out, "- Average drawdown: {}", fmt_opt(m.average_drawdown));
        let _ = writeln!(
            out,
            "- Win rate: {:.1}% ({} winning / {} losing)",
            m.win_rate_pct, m.winning_count, m.losing_count
        );
        let _ = writeln!(out, "- Average win: {}", fmt_opt(m.average_win));
        let _ = writeln!(out, "- Average loss: {}", fmt_opt(m.average_loss));
        let _ = writeln!(out, "- Profit factor: {}", fmt_opt(m.profit_factor));
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "VARIABLE ANALYSIS");
    let _ = writeln!(out, "{rule}");
    for s in &result.variable_stats {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}] ({})", s.name, category_label(s.category));
        let _ = writeln!(out, "   - Distinct values tested: {}", s.occurrence_count);
        let _ = writeln!(out, "   - Profit min: {}", fmt_opt(s.profit_min));
        let _ = writeln!(out, "   - Profit max: {}", fmt_opt(s.profit_max));
        let _ = writeln!(out, "   - Profit mean: {}", fmt_opt(s.profit_mean));
        if !s.top_values.is_empty() {
            let _ = writeln!(out, "   - Top {} values:", s.top_values.len());
            for (i, tv) in s.top_values.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "     {}. {} -> {:.2} (x{})",
                    i + 1,
                    tv.value,
                    tv.best_profit,
                    tv.count
                );
            }
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "TOP {} OPTIMIZATIONS",
        result.best_optimizations.len()
    );
    let _ = writeln!(out, "{rule}");
    for opt in &result.best_optimizations {
        let _ = writeln!(out);
        let _ = writeln!(out, "#{} - Profit: {:.2}", opt.rank, opt.profit);
        if let Some(dd) = opt.drawdown {
            let _ = writeln!(out, "   Drawdown: {:.2}", dd);
        }
        for (name, value) in &opt.variables {
            let _ = writeln!(out, "   {name}: {value}");
        }
    }

    out
}

pub fn export_json(result: &AnalysisResult, criteria: &FilterCriteria) -> Value {
    json!({
        "generated_at_utc": Utc::now().to_rfc3339(),
        "criteria": criteria,
        "roles": result.roles,
        "summary": result.summary,
        "metrics": result.metrics,
        "variable_stats": result.variable_stats,
        "best_optimizations": result.best_optimizations,
    })
}
