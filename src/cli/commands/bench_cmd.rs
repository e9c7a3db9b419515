//! bench-compare command - Flag benchmark regressions between two runs

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::bench::{compare, BenchmarkReport};
use crate::cli::{Context, Exit};
use crate::ui::output::print_table;

/// Print a table comparing `head` with `base`. Fails when any benchmark got
/// slower by more than `max_regression`.
pub fn bench_compare(ctx: &Context, base: &Path, head: &Path, max_regression: f64) -> Result<()> {
    let base = BenchmarkReport::load(&ctx.resolve(base)?)?;
    let head = BenchmarkReport::load(&ctx.resolve(head)?)?;
    let comparisons = compare(&base, &head, max_regression)?;
    debug!("compared {} benchmarks", comparisons.len());

    let mut rows = vec![vec![
        "name".to_string(),
        "base".to_string(),
        "head".to_string(),
        "change".to_string(),
        String::new(),
    ]];
    for c in &comparisons {
        rows.push(vec![
            c.name.clone(),
            format!("{:.6}", c.base_mean),
            format!("{:.6}", c.head_mean),
            format!("{:+.1}%", c.change() * 100.0),
            if c.regressed { "REGRESSED" } else { "" }.to_string(),
        ]);
    }
    print_table(&rows);

    if comparisons.iter().any(|c| c.regressed) {
        return Err(Exit(1).into());
    }
    Ok(())
}
