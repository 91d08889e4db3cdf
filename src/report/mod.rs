//! Tabular report output.
//!
//! A `Table` is a list of rows of string cells where every row has the same
//! number of cells. The first row is the header. Tables render to the console,
//! to semicolon separated CSV, or to a minimal HTML document.

pub mod format;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use comfy_table::{ContentArrangement, Table as ConsoleTable, TableComponent, presets};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("row has {got} cells but the table has {expected} columns")]
    RowWidth { expected: usize, got: usize },
    #[error("output file {0} has no file extension")]
    NoExtension(PathBuf),
    #[error("unknown file type: {0}. Supported types are html and csv")]
    UnknownFormat(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output file format, picked by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Html,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| TableError::NoExtension(path.to_path_buf()))?;

        match ext.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "html" | "htm" => Ok(Self::Html),
            other => Err(TableError::UnknownFormat(other.to_string())),
        }
    }
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<head>
    <style>
        table, th, td {
            border: 1px solid black;
            border-collapse: collapse;
        }
        th, td {
            padding: 5px;
            text-align: center;
        }
        td {
            font-weight: 300;
        }
        tr {
            height: 28px;
        }
        table {
            width: 100%;
        }
    </style>
</head>
<body>
<table>
"#;

const HTML_TAIL: &str = "</table>\n</body>\n";

#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the given header row.
    pub fn with_header<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            rows: vec![header.into_iter().map(Into::into).collect()],
        }
    }

    /// Append a row. Every row must have as many cells as the first one.
    pub fn push_row<S: Into<String>>(
        &mut self,
        cells: impl IntoIterator<Item = S>,
    ) -> Result<(), TableError> {
        let row: Vec<String> = cells.into_iter().map(Into::into).collect();
        if let Some(first) = self.rows.first() {
            if first.len() != row.len() {
                return Err(TableError::RowWidth {
                    expected: first.len(),
                    got: row.len(),
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows, including the header.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn cells(&self) -> impl Iterator<Item = Vec<&str>> {
        self.rows.iter().map(|row| {
            row.iter()
                .map(|cell| if cell.trim().is_empty() { "-" } else { cell.as_str() })
                .collect()
        })
    }

    /// Padded columns separated by ` | `, one line per row.
    ///
    /// Cells wrap to the terminal width when stdout is a terminal.
    pub fn render_console(&self) -> String {
        self.render_console_with_width(None)
    }

    /// Console rendering wrapped to `width` columns, or to the terminal
    /// width when `width` is `None`.
    pub fn render_console_with_width(&self, width: Option<u16>) -> String {
        let mut rows = self.cells();
        let Some(header) = rows.next() else {
            return String::new();
        };

        let mut table = ConsoleTable::new();
        table
            .load_preset(presets::NOTHING)
            .set_style(TableComponent::VerticalLines, '|')
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header);
        for row in rows {
            table.add_row(row);
        }
        if let Some(width) = width {
            table.set_width(width);
        }
        if let Some(first) = table.column_mut(0) {
            first.set_padding((0, 1));
        }

        let mut out = String::new();
        for line in table.to_string().lines() {
            let line = line.trim_end();
            if !line.is_empty() {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Every cell followed by `;`, no quoting.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in self.cells() {
            for cell in row {
                out.push_str(cell);
                out.push(';');
            }
            out.push('\n');
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from(HTML_HEAD);
        for (index, row) in self.cells().enumerate() {
            let tag = if index == 0 { "th" } else { "td" };
            out.push_str("<tr>\n");
            for cell in row {
                let _ = writeln!(out, "<{tag}>{}</{tag}>", escape_html(cell));
            }
            out.push_str("</tr>\n");
        }
        out.push_str(HTML_TAIL);
        out
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Csv => self.to_csv(),
            OutputFormat::Html => self.to_html(),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Write `table` to `path` in the format its extension names, creating
/// parent directories as needed. Empty tables are not written.
pub async fn write_table_to_file(table: &Table, path: &Path) -> Result<PathBuf, TableError> {
    let format = OutputFormat::from_path(path)?;
    let path = std::path::absolute(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if table.is_empty() {
        return Ok(path);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TableError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(&path, table.render(format))
        .await
        .map_err(|source| TableError::Io {
            path: path.clone(),
            source,
        })?;

    debug!(path = %path.display(), rows = table.len(), ?format, "Wrote report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::with_header(["Name", "Status"]);
        table.push_row(["NIGHTLY", "Completed"]).unwrap();
        table.push_row(["X", ""]).unwrap();
        table
    }

    #[test]
    fn test_row_width_must_match() {
        let mut table = Table::with_header(["A", "B"]);
        let err = table.push_row(["only one"]).unwrap_err();
        assert!(matches!(err, TableError::RowWidth { expected: 2, got: 1 }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_console_pads_columns() {
        let rendered = sample().render_console();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "Name    | Status");
        assert_eq!(lines[1], "NIGHTLY | Completed");
        assert_eq!(lines[2], "X       | -");
    }

    #[test]
    fn test_console_wraps_to_width() {
        let mut table = Table::with_header(["Job", "Message"]);
        table
            .push_row(["NIGHTLY", "volume 1234L5 mounted on drive 3 of library LIB01"])
            .unwrap();

        let rendered = table.render_console_with_width(Some(30));
        let lines: Vec<_> = rendered.lines().collect();

        assert!(lines.len() > 2);
        assert!(lines.iter().all(|line| line.chars().count() <= 30));
        assert!(lines[0].starts_with("Job"));
        assert!(rendered.contains("1234L5"));
    }

    #[test]
    fn test_console_empty_table() {
        assert_eq!(Table::new().render_console(), "");
    }

    #[test]
    fn test_csv_terminates_every_cell() {
        assert_eq!(sample().to_csv(), "Name;Status;\nNIGHTLY;Completed;\nX;-;\n");
    }

    #[test]
    fn test_html_header_and_escaping() {
        let mut table = Table::with_header(["Job"]);
        table.push_row(["<b>&</b>"]).unwrap();
        let html = table.to_html();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<th>Job</th>"));
        assert!(html.contains("<td>&lt;b&gt;&amp;&lt;/b&gt;</td>"));
        assert!(html.trim_end().ends_with("</body>"));
    }

    #[test]
    fn test_output_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("r.CSV")).unwrap(), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("r.htm")).unwrap(), OutputFormat::Html);
        assert!(matches!(
            OutputFormat::from_path(Path::new("r.xlsx")),
            Err(TableError::UnknownFormat(ext)) if ext == "xlsx"
        ));
        assert!(matches!(
            OutputFormat::from_path(Path::new("report")),
            Err(TableError::NoExtension(_))
        ));
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.csv");

        let written = write_table_to_file(&sample(), &path).await.unwrap();

        assert_eq!(written, path);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Name;Status;"));
    }

    #[tokio::test]
    async fn test_unknown_type_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        assert!(write_table_to_file(&sample(), &path).await.is_err());
        assert!(!path.exists());
    }
}
