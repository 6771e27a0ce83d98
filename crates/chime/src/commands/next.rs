//! Next-alarm command handler.

use chime_core::{AlarmController, EventRecord};

use crate::cli::{GlobalOpts, NextArgs};
use crate::error::CliError;
use crate::output;

use super::{alarms, util};

fn detail(e: &EventRecord) -> String {
    format!(
        "{}  {}  ({} in {})",
        alarms::trigger_text(e),
        e.summary,
        e.id,
        e.resource_id
    )
}

pub fn handle(controller: &AlarmController, args: &NextArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let next = match &args.resource {
        Some(resource) => {
            let id = util::resolve_resource(controller, resource)?;
            controller.earliest_trigger(&id)
        }
        None => controller.global_earliest_trigger(),
    };

    let Some(event) = next else {
        if !global.quiet {
            eprintln!("No alarms due");
        }
        return Ok(());
    };
    let out = output::render_single(&global.output, &event, detail, |e| e.id.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
