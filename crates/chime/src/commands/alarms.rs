//! Alarm command handlers.

use tabled::Tabled;

use chime_core::{
    AlarmController, CategorySet, Command as CoreCommand, CommandResult, CoreError, EventId,
    EventRecord, NewEvent,
};

use crate::cli::{AlarmsArgs, AlarmsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(super) struct AlarmRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    category: String,
    #[tabled(rename = "Next trigger")]
    trigger: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

impl From<&EventRecord> for AlarmRow {
    fn from(e: &EventRecord) -> Self {
        Self {
            id: e.id.to_string(),
            resource: e.resource_id.to_string(),
            category: e.category.to_string(),
            trigger: trigger_text(e),
            enabled: if e.enabled { "yes" } else { "no" }.into(),
            summary: e.summary.clone(),
        }
    }
}

pub(super) fn trigger_text(e: &EventRecord) -> String {
    match e.next_trigger {
        Some(t) if e.date_only => t.format("%Y-%m-%d").to_string(),
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".into(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &AlarmController,
    args: AlarmsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AlarmsCommand::List { resource, category } => {
            let filter = category.map(|c| CategorySet::single(c.into()));
            let mut alarms = match resource {
                Some(resource) => {
                    let id = util::resolve_resource(controller, &resource)?;
                    controller.events_of(&id, filter)
                }
                None => controller.with_store(|store| {
                    store
                        .resources()
                        .flat_map(|r| store.events_of(&r.id, filter).cloned())
                        .collect()
                }),
            };
            alarms.sort_by(|a, b| {
                (a.next_trigger.is_none(), a.next_trigger, &a.id)
                    .cmp(&(b.next_trigger.is_none(), b.next_trigger, &b.id))
            });
            let out = output::render_list(
                &global.output,
                &alarms,
                |e| AlarmRow::from(e),
                |e| e.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AlarmsCommand::Add {
            summary,
            at,
            category,
            resource,
            date_only,
            disabled,
        } => {
            let resource = resource
                .map(|r| util::resolve_resource(controller, &r))
                .transpose()?;
            let event = NewEvent {
                category: category.into(),
                enabled: !disabled,
                next_trigger: at,
                date_only,
                summary,
            };
            let result = controller
                .execute(CoreCommand::AddEvent { resource, event })
                .await?;
            if let CommandResult::EventAdded { resource, id } = result {
                if !global.quiet {
                    eprintln!("Alarm added to {resource}");
                }
                output::print_output(id.as_str(), global.quiet);
            }
            Ok(())
        }

        AlarmsCommand::Delete { id, resource } => {
            let id = EventId::new(id);
            let resource = match resource {
                Some(resource) => util::resolve_resource(controller, &resource)?,
                None => match controller.event_by_global_id(&id)? {
                    Some(event) => event.resource_id,
                    None => {
                        return Err(CoreError::EventNotFound {
                            resource: "any".into(),
                            id,
                        }
                        .into());
                    }
                },
            };
            controller
                .execute(CoreCommand::DeleteEvent { resource, id })
                .await?;
            if !global.quiet {
                eprintln!("Alarm deleted");
            }
            Ok(())
        }
    }
}
