use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Column listing with a dashed rule under the header, two spaces between
/// columns. Used for the backup snapshot listing.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", format_table(headers, &rows));
}

fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{cell:<width$}")
            })
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = line(&header);
    out.push_str(&line(&rule));
    for row in rows {
        out.push_str(&line(row));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_pad_to_the_widest_cell() {
        let rows = vec![
            vec!["state-20260828-090000.tfstate".to_string(), "2".to_string()],
            vec!["x.tfstate".to_string(), "1024".to_string()],
        ];
        let table = format_table(&["FILE", "BYTES"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("FILE"));
        assert_eq!(lines[1], format!("{}  {}", "-".repeat(29), "-".repeat(5)));
        assert!(lines[2].contains("state-20260828-090000.tfstate  2"));
        assert!(lines[3].starts_with("x.tfstate "));
    }

    #[test]
    fn extra_cells_beyond_headers_are_kept() {
        let rows = vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]];
        let table = format_table(&["ONE", "TWO"], &rows);
        assert!(table.lines().last().unwrap().contains('c'));
    }
}
