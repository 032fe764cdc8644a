use owo_colors::OwoColorize;
use quarry_core::{CaptureSource, FieldKind, FieldSpec, RunReport, Schema};

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!(
        "\n{} {} {}",
        "Quarry".bold().bright_blue(),
        "v".dimmed(),
        VERSION.dimmed()
    );
    eprintln!("{}", "Capture structured records from web pages\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{}/{}]", step, total).dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print timing information with color coding
pub fn print_timing(label: &str, duration: std::time::Duration) {
    let ms = duration.as_secs_f64() * 1000.0;
    let indicator = if ms < 1000.0 {
        "fast".dimmed().to_string()
    } else if ms < 10_000.0 {
        "moderate".bright_yellow().to_string()
    } else {
        "slow".bright_red().to_string()
    };

    eprintln!("  {} {:>8.2}ms ({})", format!("{}:", label).dimmed(), ms, indicator);
}

/// Print one line per target of a pipeline run
pub fn print_run_report(report: &RunReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(target) => {
                let source = match target.source {
                    CaptureSource::Cache => "cached",
                    CaptureSource::Fetched => "fetched",
                };
                print_success(&format!(
                    "{} ({}): {} records, {} shards",
                    target.key.bright_white(),
                    source,
                    target.records,
                    target.shards.len()
                ));
            }
            Err(e) => print_error(&format!("{}: {}", outcome.target.url, e)),
        }
    }
}

/// Print the compiled field tree of a schema
pub fn print_schema(schema: &Schema) {
    eprintln!(
        "  {} {}",
        "Base:".dimmed(),
        schema.base_selector_source().bright_white()
    );
    print_fields(schema.fields(), 1);
}

fn print_fields(fields: &[FieldSpec], depth: usize) {
    for field in fields {
        let kind = match field.kind() {
            FieldKind::Text => "text".to_string(),
            FieldKind::Attribute(attr) => format!("attribute[{}]", attr),
            FieldKind::List(_) => "list".to_string(),
        };
        eprintln!(
            "{}{} {} {}",
            "  ".repeat(depth + 1),
            field.name().bright_white(),
            kind.dimmed(),
            field.selector_source().cyan()
        );
        if let FieldKind::List(sub) = field.kind() {
            print_fields(sub, depth + 1);
        }
    }
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
