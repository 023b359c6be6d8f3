//! Common Observability Utilities
//!
//! Table formatting shared by the trackers that log status snapshots.

fn format_row(list: Vec<String>) -> String {
    format!("| {} |\n", list.join(" | "))
}

/// Calculate column widths based on headers and all row values
fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let num_cols = rows
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .max(headers.len());

    (0..num_cols)
        .map(|i| {
            let header_width = headers.get(i).map(|h| h.len()).unwrap_or(0);
            let max_row_width = rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.len())
                .max()
                .unwrap_or(0);
            header_width.max(max_row_width)
        })
        .collect()
}

fn format_headers(headers: &[&str], widths: &[usize], output: &mut String) {
    if headers.is_empty() {
        return;
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(&format_row(header_line));

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&format!("|-{}-|\n", separator.join("-|-")));
}

fn format_data_rows(rows: &[Vec<String>], widths: &[usize], output: &mut String) {
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(cell.len());
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(&format_row(cells));
    }
}

/// Format a table with headers and rows. Empty when there are no rows.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let widths = calculate_column_widths(headers, rows);
    let mut output = String::new();

    format_headers(headers, &widths, &mut output);
    format_data_rows(rows, &widths, &mut output);

    output
}

/// Format elapsed time as "Xm Ys" or "Ys"
pub fn format_elapsed_secs(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
