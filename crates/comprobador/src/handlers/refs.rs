//! Refs command handler.

use super::load_harness_config;
use crate::commands::{RefsArgs, RefsFormat};
use crate::error::CliResult;
use comprobar::SelectorTable;
use std::fmt::Write as _;

/// Render a table as aligned text, one reference per line
#[must_use]
pub fn render_refs_text(table: &SelectorTable) -> String {
    let width = table.iter().map(|(r, _)| r.as_str().len()).max().unwrap_or(0);
    let mut out = String::new();
    for (ui_ref, strategies) in table.iter() {
        let rendered: Vec<String> = strategies.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "{:<width$}  {}", ui_ref.as_str(), rendered.join(" | "));
    }
    out
}

/// Execute the refs command, returning what it printed.
pub fn execute_refs(args: &RefsArgs) -> CliResult<String> {
    let harness = load_harness_config(args.config.as_deref(), &args.selectors)?;
    let table = harness.selector_table()?;
    let out = match args.format {
        RefsFormat::Text => render_refs_text(&table),
        RefsFormat::Yaml => table.to_yaml()?,
    };
    print!("{out}");
    Ok(out)
}
