//! Plain-text rendering of a finished timing matrix.

use std::io;

use fanout_common::StrategyKind;
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use ratatui::layout::Constraint;
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::Span;
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType};

use crate::matrix::TimingMatrix;

const MISSING: &str = "-";
const COLUMN_GAP: &str = "  ";
const SERIES_COLORS: [Color; 4] = [Color::Cyan, Color::Yellow, Color::Green, Color::Magenta];

/// One row per strategy, one column per batch size, cells in milliseconds.
///
/// ```
/// use fanout_harness::report::render_table;
/// use fanout_harness::{StrategyKind, TimingMatrix};
///
/// let mut matrix = TimingMatrix::new();
/// matrix.record(StrategyKind::Sequential, 1, 120.5).unwrap();
/// matrix.record(StrategyKind::Async, 1, 80.0).unwrap();
///
/// let table = render_table(&matrix, &[1], &[StrategyKind::Sequential, StrategyKind::Async]);
/// assert!(table.contains("120.50 ms"));
/// assert!(table.lines().nth(3).unwrap().starts_with("async"));
/// ```
pub fn render_table(
    matrix: &TimingMatrix,
    batch_sizes: &[usize],
    strategies: &[StrategyKind],
) -> String {
    let header: Vec<String> = std::iter::once("strategy".to_string())
        .chain(batch_sizes.iter().map(|n| n.to_string()))
        .collect();
    let rows: Vec<Vec<String>> = strategies
        .iter()
        .map(|&kind| {
            std::iter::once(kind.to_string())
                .chain(batch_sizes.iter().map(|&n| match matrix.get(kind, n) {
                    Some(ms) => format!("{ms:.2} ms"),
                    None => MISSING.to_string(),
                }))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            std::iter::once(&header)
                .chain(rows.iter())
                .map(|row| row[col].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |row: &[String]| -> String {
        row.iter()
            .zip(&widths)
            .enumerate()
            .map(|(col, (cell, &width))| {
                if col == 0 {
                    format!("{cell:<width$}")
                } else {
                    format!("{cell:>width$}")
                }
            })
            .collect::<Vec<_>>()
            .join(COLUMN_GAP)
            .trim_end()
            .to_string()
    };

    let rule_width =
        widths.iter().sum::<usize>() + COLUMN_GAP.len() * widths.len().saturating_sub(1);
    let mut out = String::new();
    out.push_str(&format_row(&header));
    out.push('\n');
    out.push_str(&"-".repeat(rule_width));
    out.push('\n');
    for row in &rows {
        out.push_str(&format_row(row));
        out.push('\n');
    }
    out
}

/// Line chart of elapsed time against batch size, one line per strategy,
/// drawn off-screen and returned as text.
pub fn render_chart(
    matrix: &TimingMatrix,
    batch_sizes: &[usize],
    strategies: &[StrategyKind],
    width: u16,
    height: u16,
) -> io::Result<String> {
    let series: Vec<(StrategyKind, Vec<(f64, f64)>)> = strategies
        .iter()
        .map(|&kind| {
            let points = matrix
                .series(kind)
                .into_iter()
                .filter(|(n, _)| batch_sizes.contains(n))
                .map(|(n, ms)| (n as f64, ms))
                .collect();
            (kind, points)
        })
        .collect();

    let x_min = batch_sizes.iter().copied().min().unwrap_or(0) as f64;
    let x_max = batch_sizes.iter().copied().max().unwrap_or(1) as f64;
    let (x_min, x_max) = if x_max > x_min {
        (x_min, x_max)
    } else {
        ((x_min - 1.0).max(0.0), x_max + 1.0)
    };
    let y_peak = series
        .iter()
        .flat_map(|(_, points)| points.iter().map(|&(_, ms)| ms))
        .fold(0.0_f64, f64::max);
    let y_max = if y_peak > 0.0 { y_peak * 1.1 } else { 1.0 };

    let datasets: Vec<Dataset> = series
        .iter()
        .enumerate()
        .map(|(i, (kind, points))| {
            Dataset::default()
                .name(kind.to_string())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(SERIES_COLORS[i % SERIES_COLORS.len()]))
                .data(points)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" fetch time by batch size "),
        )
        .x_axis(
            Axis::default()
                .title("batch size")
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{x_min:.0}")),
                    Span::raw(format!("{:.0}", (x_min + x_max) / 2.0)),
                    Span::raw(format!("{x_max:.0}")),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("ms")
                .bounds([0.0, y_max])
                .labels(vec![
                    Span::raw("0"),
                    Span::raw(format!("{:.0}", y_max / 2.0)),
                    Span::raw(format!("{y_max:.0}")),
                ]),
        )
        .hidden_legend_constraints((Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)));

    let mut terminal = Terminal::new(TestBackend::new(width.max(20), height.max(8)))?;
    terminal.draw(|frame| frame.render_widget(chart, frame.area()))?;

    let buffer = terminal.backend().buffer();
    let area = buffer.area;
    let mut text = String::with_capacity((area.width as usize + 1) * area.height as usize);
    for y in 0..area.height {
        let line: String = (0..area.width).map(|x| buffer[(x, y)].symbol()).collect();
        text.push_str(line.trim_end());
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TimingMatrix {
        let mut m = TimingMatrix::new();
        for (kind, base) in [
            (StrategyKind::Sequential, 100.0),
            (StrategyKind::Async, 20.0),
            (StrategyKind::ThreadPool, 25.0),
            (StrategyKind::ProcessPool, 60.0),
        ] {
            for n in [1usize, 3, 5] {
                m.record(kind, n, base * n as f64 + 0.1).unwrap();
            }
        }
        m
    }

    #[test]
    fn table_has_a_row_per_strategy_and_a_column_per_size() {
        let table = render_table(&sample(), &[1, 3, 5], &StrategyKind::ALL);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 2 + 4);
        let header: Vec<&str> = lines[0].split_whitespace().collect();
        assert_eq!(header, vec!["strategy", "1", "3", "5"]);
        assert!(lines[1].chars().all(|c| c == '-'));
        assert!(lines[2].starts_with("sequential"));
        assert!(lines[2].ends_with("500.10 ms"));
        assert!(lines[5].starts_with("process-pool"));
        assert!(lines[3].contains("20.10 ms"));
    }

    #[test]
    fn table_columns_line_up() {
        let table = render_table(&sample(), &[1, 3, 5], &StrategyKind::ALL);
        let widths: Vec<usize> = table
            .lines()
            .filter(|l| !l.starts_with('-'))
            .map(|l| l.chars().count())
            .collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{table}");
    }

    #[test]
    fn missing_cells_render_as_dash() {
        let mut m = TimingMatrix::new();
        m.record(StrategyKind::Sequential, 1, 1.0).unwrap();
        let table = render_table(&m, &[1, 2], &[StrategyKind::Sequential]);
        let row = table.lines().nth(2).unwrap();
        assert!(row.ends_with(MISSING), "{row}");
    }

    #[test]
    fn chart_is_drawn_with_title_and_legend() {
        let chart = render_chart(&sample(), &[1, 3, 5], &StrategyKind::ALL, 80, 24).unwrap();
        let lines: Vec<&str> = chart.lines().collect();

        assert_eq!(lines.len(), 24);
        assert!(chart.contains("fetch time by batch size"));
        for kind in StrategyKind::ALL {
            assert!(chart.contains(kind.as_str()), "legend lacks {kind}:\n{chart}");
        }
    }

    #[test]
    fn chart_handles_single_size_and_empty_matrix() {
        let single = render_chart(&sample(), &[3], &StrategyKind::ALL, 60, 20).unwrap();
        assert_eq!(single.lines().count(), 20);

        let empty = render_chart(&TimingMatrix::new(), &[1], &[StrategyKind::Async], 10, 4).unwrap();
        assert_eq!(empty.lines().count(), 8);
    }
}
