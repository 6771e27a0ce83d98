//! Bootstrap command handler.
//!
//! The session already bootstrapped the engine; this only reports what
//! that run did.

use std::fmt::Write as _;

use chime_core::BootstrapReport;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

fn detail(report: &BootstrapReport) -> String {
    if report.created.is_empty() && report.failed.is_empty() {
        return "Every alarm type already has a resource".into();
    }
    let mut out = String::new();
    if report.migrated_legacy {
        out.push_str("Migrated legacy calendars\n");
    }
    for id in &report.created {
        let _ = writeln!(out, "Created {id}");
    }
    for failure in &report.failed {
        let _ = writeln!(out, "Failed to create '{}': {}", failure.name, failure.error);
    }
    out.trim_end().to_owned()
}

pub fn handle(report: &BootstrapReport, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(&global.output, report, detail, |r| {
        r.created
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
