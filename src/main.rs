mod analysis;
mod report;
mod table;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use analysis::FilterCriteria;

#[derive(Parser, Debug)]
#[command(author, version, about = "MT5 optimization results analyzer")]
struct Args {
    /// CSV export of the optimization pass results
    input: PathBuf,
    #[arg(long, default_value_t = 7000.0)]
    min_profit: f64,
    #[arg(long, default_value_t = 7.0)]
    max_drawdown: f64,
    #[arg(long, default_value_t = 5)]
    top_k: usize,
    #[arg(long, default_value_t = 15)]
    top_n: usize,
    #[arg(long, default_value = "optimization_report.txt")]
    report: PathBuf,
    #[arg(long, default_value = "optimization_data.json")]
    json: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let table = table::load_table_from_csv(&args.input)?;
    println!(
        "loaded {} optimizations, {} columns from {}",
        table.row_count(),
        table.column_count(),
        args.input.display()
    );

    let criteria = FilterCriteria {
        min_profit: args.min_profit,
        max_drawdown: args.max_drawdown,
    };
    let result = analysis::assemble(&table, &criteria, args.top_k, args.top_n)?;

    println!(
        "profit column: {}",
        result.roles.profit_column.as_deref().unwrap_or("-")
    );
    println!(
        "drawdown column: {}",
        result.roles.drawdown_column.as_deref().unwrap_or("-")
    );
    println!(
        "filtered {}/{} (profit >= {:.2}, drawdown <= {:.2}, success rate {:.1}%)",
        result.summary.filtered_count,
        result.summary.total_count,
        criteria.min_profit,
        criteria.max_drawdown,
        result.summary.success_rate_pct
    );

    let report_text = report::render_report(&result, &criteria);
    fs::write(&args.report, report_text)
        .with_context(|| format!("failed to write {}", args.report.display()))?;

    let payload = report::export_json(&result, &criteria);
    fs::write(&args.json, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("failed to write {}", args.json.display()))?;

    println!("Saved report: {}", args.report.display());
    println!("Saved data: {}", args.json.display());

    Ok(())
}
