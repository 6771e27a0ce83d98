//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod alarms;
pub mod bootstrap;
pub mod config_cmd;
pub mod next;
pub mod resources;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::session::Session;

/// Dispatch an engine-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = &session.controller;
    match cmd {
        Command::Bootstrap => bootstrap::handle(&session.bootstrap, global),
        Command::Resources(args) => resources::handle(controller, args, global).await,
        Command::Alarms(args) => alarms::handle(controller, args, global).await,
        Command::Next(args) => next::handle(controller, &args, global),
        // Config is handled before a session is opened
        Command::Config(args) => config_cmd::handle(args, global),
    }
}
