use std::io::IsTerminal as _;

use crate::config::Theme;

/// Abstraction over user-facing output.
///
/// Workflows report progress through this trait rather than printing, so the
/// command layer decides on colours and tests can stay silent.
pub trait UserOutput {
    /// Informational status message (e.g., "Allocating ports...")
    fn status(&self, message: &str);

    /// Success message (e.g., "Instance calm-otter created")
    fn success(&self, message: &str);

    /// Warning message (e.g., "Failed to stop containers")
    fn warning(&self, message: &str);

    /// Error message
    fn error(&self, message: &str);

    /// Plain line, no decoration (tables, paths)
    fn plain(&self, message: &str);
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    status: &'static str,
    success: &'static str,
    warning: &'static str,
    error: &'static str,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                status: "\x1b[36m",
                success: "\x1b[92m",
                warning: "\x1b[93m",
                error: "\x1b[91m",
            },
            Theme::Light => Self {
                status: "\x1b[34m",
                success: "\x1b[32m",
                warning: "\x1b[33m",
                error: "\x1b[31m",
            },
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Standard CLI output: stdout for progress, stderr for problems.
#[derive(Debug, Clone, Copy)]
pub struct CliOutput {
    palette: Option<Palette>,
}

impl CliOutput {
    /// Colours follow `theme` unless `NO_COLOR` is set or stdout is not a terminal.
    pub fn new(theme: Theme) -> Self {
        let colour = std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
        Self {
            palette: colour.then(|| Palette::for_theme(theme)),
        }
    }

    fn paint(&self, pick: fn(&Palette) -> &'static str, message: &str) -> String {
        match &self.palette {
            Some(palette) => format!("{}{}{}", pick(palette), message, RESET),
            None => message.to_string(),
        }
    }
}

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", self.paint(|p| p.status, message));
    }

    fn success(&self, message: &str) {
        println!("{}", self.paint(|p| p.success, message));
    }

    fn warning(&self, message: &str) {
        eprintln!("{}", self.paint(|p| p.warning, &format!("Warning: {}", message)));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", self.paint(|p| p.error, &format!("Error: {}", message)));
    }

    fn plain(&self, message: &str) {
        println!("{}", message);
    }
}

/// Suppresses all output. Used for `--json` runs and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn plain(&self, _message: &str) {}
}

/// Render rows as a left-aligned table with a header underline.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(headers, &widths));
    lines.push(format_row(
        &rule.iter().map(String::as_str).collect::<Vec<_>>(),
        &widths,
    ));
    for row in rows {
        lines.push(format_row(
            &row.iter().map(String::as_str).collect::<Vec<_>>(),
            &widths,
        ));
    }
    lines
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
