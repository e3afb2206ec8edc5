pub mod envs;
pub mod list;
pub mod synth;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize CloudFormation templates into a cloud assembly directory
    Synth(synth::SynthCommand),

    /// List stacks and their resource names
    List(list::ListCommand),

    /// Show resolved environment variables of the service and the function
    Envs(envs::EnvsCommand),
}
