use std::fmt::Write as _;

use crate::{data::format_date, store::DailyRecord};

const HEADERS: [&str; 7] = [
    "id",
    "country_name",
    "province",
    "date",
    "confirmed",
    "deaths",
    "recovered",
];
// id and the three counts
const NUMERIC: [bool; 7] = [true, false, false, false, true, true, true];

pub fn render_records(records: &[DailyRecord]) -> String {
    let rows = records.iter().map(record_cells).collect::<Vec<_>>();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&HEADERS.map(str::to_string), &widths));
    let separator = widths.map(|w| "-".repeat(w));
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_records(records: &[DailyRecord]) {
    print!("{}", render_records(records));
}

fn record_cells(record: &DailyRecord) -> [String; 7] {
    [
        record.id.to_string(),
        record.country_name.clone(),
        record.province.clone(),
        format_date(record.date),
        record.confirmed.to_string(),
        record.deaths.to_string(),
        record.recovered.to_string(),
    ]
}

fn format_row(cells: &[String; 7], widths: &[usize; 7]) -> String {
    let mut line = cells
        .iter()
        .zip(widths.iter().copied())
        .zip(NUMERIC)
        .map(|((cell, width), numeric)| {
            if numeric {
                format!("{cell:>width$}")
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}
