use std::io::{self, Write};

use tabled::builder::Builder;
use tabled::settings::Style;

use crate::reconcile::{Completion, IncompleteDlcRecord, IncompleteUpdateRecord};

pub fn render_completion<W: Write>(out: &mut W, completion: &Completion) -> io::Result<()> {
    writeln!(
        out,
        "Local library completion status: {:.2}% (have {} titles, out of {} titles)",
        completion.percent(),
        completion.owned,
        completion.total
    )
}

pub fn render_missing_updates<W: Write>(out: &mut W, records: &[IncompleteUpdateRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "All titles are up to date!");
    }

    let mut builder = Builder::default();
    builder.push_record(header(&[
        "#",
        "Title",
        "TitleId",
        "Local version",
        "Latest version",
        "Update date",
    ]));
    for (index, record) in records.iter().enumerate() {
        builder.push_record([
            index.to_string(),
            record.name.clone(),
            record.id.to_string(),
            record.local_version.to_string(),
            record.latest_version.to_string(),
            record
                .latest_release_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        ]);
    }
    builder.push_record(total_row(6, records.len()));

    writeln!(out, "Found available updates:\n")?;
    writeln!(out, "{}", builder.build().with(Style::psql()))
}

pub fn render_missing_dlc<W: Write>(out: &mut W, records: &[IncompleteDlcRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "No missing DLC!");
    }

    let mut builder = Builder::default();
    builder.push_record(header(&["#", "Title", "TitleId", "Missing DLC (TitleId - Name)"]));
    for (index, record) in records.iter().enumerate() {
        let missing = record
            .missing
            .iter()
            .map(|entry| match &entry.name {
                Some(name) => format!("{} - {}", entry.id, name),
                None => entry.id.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        builder.push_record([
            index.to_string(),
            record.name.clone(),
            record.id.to_string(),
            missing,
        ]);
    }
    builder.push_record(total_row(4, records.len()));

    writeln!(out, "Found missing DLC:\n")?;
    writeln!(out, "{}", builder.build().with(Style::psql()))
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|column| column.to_string()).collect()
}

/// Blank cells with "Total" and the count in the last two columns.
fn total_row(columns: usize, total: usize) -> Vec<String> {
    let mut row = vec![String::new(); columns - 2];
    row.push("Total".to_string());
    row.push(total.to_string());
    row
}
