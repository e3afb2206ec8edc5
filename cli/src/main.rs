mod commands;
mod envs;
mod error;
mod logger;
mod project;
mod runner;
mod writer;
use crate::commands::Commands;
use crate::logger::Logger;
use crate::runner::{Runnable, Runner};
use crate::writer::Writer;
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    arg_required_else_help = true,
    name = "tapestry-infra",
    version,
    about = "Synthesize tapestryworlds infrastructure for every deployment environment",
    long_about = "Builds the queue, bucket, Fargate service and Lambda function stacks for production, staging and test, and writes CloudFormation templates ready for deployment."
)]
struct Cli {
    /// Project directory with infra.toml and .env
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    path: PathBuf,

    /// Print structured (JSON) output instead of plain text
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Derive a runner from the command and run it
///
/// Errors terminate the process with a non-zero exit code.
fn run(command: &impl Runnable, path: &Path, writer: &Writer) {
    if let Err(error) = command.runner(path, writer).run() {
        let message = format!("\n{}\n{error}\n", console::style("Error").red().bold());

        if writer.error(&message).is_err() {
            eprintln!("{message}");
        }

        std::process::exit(1);
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    Logger::init();

    let cli = Cli::parse();
    let writer = Writer::new(cli.json);

    // Match all commands here, in one place
    match &cli.command {
        Commands::Synth(cmd) => run(cmd, &cli.path, &writer),
        Commands::List(cmd) => run(cmd, &cli.path, &writer),
        Commands::Envs(cmd) => run(cmd, &cli.path, &writer),
    }

    Ok(())
}
