//! Command dispatch: bridges CLI args -> core collections -> output formatting.

pub mod config_cmd;
pub mod records;
pub mod util;
pub mod watch;

use sailor_core::Sailor;

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// What every backend-bound handler needs.
pub struct Context<'a> {
    pub sailor: &'a Sailor,
    pub global: &'a GlobalOpts,
    pub format: OutputFormat,
}

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context<'_>) -> Result<(), CliError> {
    match cmd {
        Command::List(args) => records::list(ctx, args).await,
        Command::Get(args) => records::get(ctx, args).await,
        Command::Create(args) => records::create(ctx, args).await,
        Command::Update(args) => records::update(ctx, args).await,
        Command::Delete(args) => records::delete(ctx, args).await,
        Command::Watch(args) => watch::handle(ctx, args).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "does not talk to a backend".into(),
        }),
    }
}
