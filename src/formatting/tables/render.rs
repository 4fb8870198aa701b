// src/formatting/tables/render.rs
//! Markdown and HTML rendering for laid-out tables.

use super::CellGrid;
use std::fmt::Write;

/// Trait for rendering tables to different formats.
pub trait TableRenderer {
    /// Renders the table to the target format.
    fn render(&self, grid: &CellGrid) -> String;
}

/// Pipe-table renderer. The first row is the header unless the grid is
/// headerless; merged positions repeat their origin's text.
pub struct MarkdownTableRenderer;

impl TableRenderer for MarkdownTableRenderer {
    fn render(&self, grid: &CellGrid) -> String {
        if grid.is_empty() {
            return "*No data available.*".to_string();
        }

        let mut output = String::new();
        let mut rows = grid.rows.iter();

        if grid.headerless {
            render_row(&mut output, std::iter::repeat("").take(grid.column_count()));
        } else if let Some(header) = rows.next() {
            render_row(&mut output, header.iter().map(|c| c.text.as_str()));
        }
        let _ = write!(output, "|");
        for _ in 0..grid.column_count() {
            let _ = write!(output, " --- |");
        }
        let _ = writeln!(output);
        for row in rows {
            render_row(&mut output, row.iter().map(|c| c.text.as_str()));
        }

        output.truncate(output.trim_end().len());
        output
    }
}

fn render_row<'a>(output: &mut String, cells: impl Iterator<Item = &'a str>) {
    let _ = write!(output, "|");
    for cell in cells {
        let _ = write!(output, " {} |", escape_for_table(cell));
    }
    let _ = writeln!(output);
}

/// HTML renderer; merges become `rowspan`/`colspan` and covered
/// positions are omitted.
pub struct HtmlTableRenderer;

impl TableRenderer for HtmlTableRenderer {
    fn render(&self, grid: &CellGrid) -> String {
        if grid.is_empty() {
            return "*No data available.*".to_string();
        }

        let mut output = String::from("<table>\n");
        for row in &grid.rows {
            let _ = write!(output, "<tr>");
            for cell in row.iter().filter(|c| !c.covered) {
                let _ = write!(output, "<td");
                if cell.row_span > 1 {
                    let _ = write!(output, " rowspan=\"{}\"", cell.row_span);
                }
                if cell.col_span > 1 {
                    let _ = write!(output, " colspan=\"{}\"", cell.col_span);
                }
                let _ = write!(output, ">{}</td>", escape_for_html_cell(&cell.text));
            }
            let _ = writeln!(output, "</tr>");
        }
        output.push_str("</table>");
        output
    }
}

/// Escapes text for use in a Markdown table cell.
pub fn escape_for_table(text: &str) -> String {
    text.replace('|', "\\|")
        .replace('\n', "<br>")
        .replace('\r', "")
}

/// Escapes text for use inside an HTML `<td>`; line breaks become `<br>`.
pub fn escape_for_html_cell(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\n' => escaped.push_str("<br>"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::super::Cell;
    use super::*;
    use pretty_assertions::assert_eq;

    fn merged_grid() -> CellGrid {
        let origin = Cell {
            text: "A".to_string(),
            row_span: 2,
            col_span: 2,
            covered: false,
        };
        let covered = Cell {
            text: "A".to_string(),
            row_span: 1,
            col_span: 1,
            covered: true,
        };
        CellGrid {
            rows: vec![
                vec![origin, covered.clone(), Cell::plain("B")],
                vec![covered.clone(), covered, Cell::plain("C")],
            ],
            headerless: false,
        }
    }

    #[test]
    fn test_markdown_repeats_merged_text() {
        assert_eq!(
            MarkdownTableRenderer.render(&merged_grid()),
            "| A | A | B |\n| --- | --- | --- |\n| A | A | C |"
        );
    }

    #[test]
    fn test_html_spans() {
        assert_eq!(
            HtmlTableRenderer.render(&merged_grid()),
            "<table>\n<tr><td rowspan=\"2\" colspan=\"2\">A</td><td>B</td></tr>\n<tr><td>C</td></tr>\n</table>"
        );
    }

    #[test]
    fn test_html_cells_are_escaped() {
        let grid = CellGrid {
            rows: vec![vec![Cell::plain("a < b && c > d"), Cell::plain("x\r\ny")]],
            ..CellGrid::default()
        };
        assert_eq!(
            HtmlTableRenderer.render(&grid),
            "<table>\n<tr><td>a &lt; b &amp;&amp; c &gt; d</td><td>x<br>y</td></tr>\n</table>"
        );
    }

    #[test]
    fn test_headerless_grid_gets_an_empty_header() {
        let mut grid = CellGrid::from_rows(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
        ]);
        grid.headerless = true;
        assert_eq!(
            MarkdownTableRenderer.render(&grid),
            "|  |  |\n| --- | --- |\n| a | b |\n| c | d |"
        );
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(
            MarkdownTableRenderer.render(&CellGrid::default()),
            "*No data available.*"
        );
    }

    #[test]
    fn test_escape_for_table() {
        assert_eq!(escape_for_table("Line1|Line2"), "Line1\\|Line2");
        assert_eq!(escape_for_table("Line1\nLine2"), "Line1<br>Line2");
        assert_eq!(escape_for_table("Line1\r\nLine2"), "Line1<br>Line2");
    }
}
