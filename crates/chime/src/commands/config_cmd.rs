//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;
use crate::session;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(chime_config::config_path);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = session::load_config(global)?;
            // Validate before printing so mistakes surface here.
            chime_config::to_engine_config(&cfg)?;
            let out = toml::to_string_pretty(&cfg)?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }
    }
}
