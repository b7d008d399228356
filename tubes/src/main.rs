use clap::ArgMatches;
use colored::Colorize;
use tracing::Level;
use tubes::commands::command_argument_builder;
use tubes::{CliError, Command, Context, render_json, run};

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    init_tracing(matches.get_flag("quiet"), matches.get_flag("verbose"));

    match execute(&matches).await {
        Ok(json) => println!("{}", json),
        Err(err) => exit_with(err),
    }
}

async fn execute(matches: &ArgMatches) -> Result<String, CliError> {
    let context = Context::from_matches(matches)?;
    let command = Command::from_matches(matches)?;
    let value = run(&command, &context).await?;
    render_json(&value)
}

/// Logs go to stderr; stdout only ever carries the JSON result.
fn init_tracing(quiet: bool, verbose: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn exit_with(err: CliError) -> ! {
    eprintln!("{} {}", "✗".red().bold(), err.describe().red());
    std::process::exit(err.exit_code());
}
