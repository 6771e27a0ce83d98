//! Resource command handlers.

use tabled::Tabled;

use chime_core::{
    AlarmController, Colour, Command as CoreCommand, CommandResult, ResourceRecord,
};

use crate::cli::{CategoryArg, GlobalOpts, ResourcesArgs, ResourcesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Types")]
    types: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Standard")]
    standard: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Colour")]
    colour: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl ResourceRow {
    fn new(r: &ResourceRecord, color: bool) -> Self {
        let mut enabled = output::categories(r.enabled_types);
        if r.is_read_only() {
            enabled.push_str(" (ro)");
        }
        Self {
            id: r.id.to_string(),
            name: r.name.clone(),
            types: output::categories(r.supported_types),
            enabled,
            standard: output::categories(r.standard_for),
            format: output::paint_format(r.format, color),
            colour: r.background_colour.map(|c| c.to_string()).unwrap_or_default(),
            location: r.location.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &AlarmController,
    args: ResourcesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ResourcesCommand::List { category } => {
            let resources = match category {
                Some(c) => controller.resources_supporting(c.into()),
                None => controller.resources(),
            };
            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &resources,
                |r| ResourceRow::new(r, color),
                |r| r.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ResourcesCommand::Enable { resource, category } => {
            set_enabled(controller, &resource, category, true, global).await
        }

        ResourcesCommand::Disable { resource, category } => {
            set_enabled(controller, &resource, category, false, global).await
        }

        ResourcesCommand::Standard {
            resource,
            categories,
        } => {
            let id = util::resolve_resource(controller, &resource)?;
            let result = controller
                .execute(CoreCommand::SetResourceStandard {
                    resource: id.clone(),
                    categories: util::category_set(&categories),
                })
                .await?;
            if let CommandResult::StandardGranted { requested, granted } = result {
                if granted != requested && !global.quiet {
                    eprintln!(
                        "Standard for {} only: a resource can only be standard for enabled types",
                        output::categories(granted)
                    );
                }
            }
            if !global.quiet {
                eprintln!("Standard resource updated");
            }
            Ok(())
        }

        ResourcesCommand::Colour { resource, colour } => {
            let id = util::resolve_resource(controller, &resource)?;
            let colour = colour
                .as_deref()
                .map(str::parse::<Colour>)
                .transpose()
                .map_err(|reason| CliError::Validation {
                    field: "colour".into(),
                    reason,
                })?;
            controller
                .execute(CoreCommand::SetBackgroundColour {
                    resource: id,
                    colour,
                })
                .await?;
            if !global.quiet {
                eprintln!("Colour updated");
            }
            Ok(())
        }

        ResourcesCommand::Sync { resource } => {
            let id = util::resolve_resource(controller, &resource)?;
            controller
                .execute(CoreCommand::SynchronizeResource { resource: id.clone() })
                .await?;
            controller.flush().await?;
            if !global.quiet {
                eprintln!(
                    "Synchronized {} alarms",
                    controller.events_of(&id, None).len()
                );
            }
            Ok(())
        }

        ResourcesCommand::Remove { resource } => {
            let id = util::resolve_resource(controller, &resource)?;
            controller
                .execute(CoreCommand::RemoveResource { resource: id })
                .await?;
            if !global.quiet {
                eprintln!("Resource removed");
            }
            Ok(())
        }
    }
}

async fn set_enabled(
    controller: &AlarmController,
    resource: &str,
    category: CategoryArg,
    enabled: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::resolve_resource(controller, resource)?;
    let result = controller
        .execute(CoreCommand::SetResourceEnabled {
            resource: id,
            category: category.into(),
            enabled,
        })
        .await?;
    if let CommandResult::TypesGranted { requested, granted } = result {
        if granted != requested && !global.quiet {
            eprintln!(
                "Enabled for {} only: another resource at the same location already holds the rest",
                output::categories(granted)
            );
        }
    }
    if !global.quiet {
        eprintln!("Resource updated");
    }
    Ok(())
}
