use tabled::{Table, Tabled, settings::Style};

use crate::dump::Reference;
use crate::moniker::{Range, ResolvedLocation};
use crate::storage::DbStats;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct ReferenceRow {
    #[tabled(rename = "Dump")]
    dump_id: i64,
    #[tabled(rename = "Filter")]
    filter: String,
}

#[derive(Tabled)]
struct LocationRow {
    #[tabled(rename = "Repo")]
    repository_id: i64,
    #[tabled(rename = "Commit")]
    commit: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Range")]
    range: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Uploads", &stats.uploads.to_string());
    builder.add_row("Dumps", &stats.dumps.to_string());
    builder.add_row("Packages", &stats.packages.to_string());
    builder.add_row("References", &stats.references.to_string());
    builder.add_row("Commit edges", &stats.commits.to_string());
    builder.build()
}

/// Filters are opaque; only their size is shown
pub fn references_table(references: &[Reference]) -> String {
    let rows: Vec<ReferenceRow> = references
        .iter()
        .map(|r| ReferenceRow {
            dump_id: r.dump_id,
            filter: format!("{} bytes", r.filter.len()),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn locations_table(locations: &[ResolvedLocation]) -> String {
    let rows: Vec<LocationRow> = locations
        .iter()
        .map(|l| LocationRow {
            repository_id: l.repository_id,
            commit: l.commit.chars().take(12).collect(),
            path: l.path.clone(),
            range: format_range(&l.range),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

fn format_range(range: &Range) -> String {
    format!(
        "{}:{}-{}:{}",
        range.start.line, range.start.character, range.end.line, range.end.character
    )
}
