//! Shared helpers for command handlers.

use chime_core::{AlarmController, CategorySet, ResourceId};

use crate::cli::CategoryArg;
use crate::error::CliError;

/// Resolve a resource by ID or by its display name.
pub fn resolve_resource(controller: &AlarmController, identifier: &str) -> Result<ResourceId, CliError> {
    let resources = controller.resources();
    if let Some(r) = resources.iter().find(|r| r.id.as_str() == identifier) {
        return Ok(r.id.clone());
    }
    let named: Vec<_> = resources.iter().filter(|r| r.name == identifier).collect();
    match named.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => Err(CliError::NotFound {
            kind: "Resource".into(),
            identifier: identifier.into(),
            list_command: "resources list".into(),
        }),
        several => Err(CliError::Validation {
            field: "resource".into(),
            reason: format!(
                "{} resources are named '{identifier}'; use the ID instead",
                several.len()
            ),
        }),
    }
}

pub fn category_set(categories: &[CategoryArg]) -> CategorySet {
    categories
        .iter()
        .fold(CategorySet::EMPTY, |set, c| set.with((*c).into()))
}
