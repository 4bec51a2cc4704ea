mod cli;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Color(args) => run::color(args),
        Command::Inspect(args) => run::inspect(args),
        Command::Pack(args) => run::pack(run::load_settings(cli.config.as_deref())?, args),
        Command::Check(args) => run::check(run::load_settings(cli.config.as_deref())?, args),
    }
}
