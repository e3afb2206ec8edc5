use crate::error::Error;
use crate::runner::{Runnable, Runner};
use crate::writer::Writer;
use serde_json::json;
use std::path::{Path, PathBuf};
use tapestry_common::App;

#[derive(clap::Args, Clone)]
pub(crate) struct SynthCommand {
    /// Comma-separated list of environments (production, staging, test by default)
    #[arg(value_delimiter = ',')]
    environments: Vec<String>,

    /// Output directory, relative to the project
    #[arg(short, long, value_name = "DIR", default_value = "cdk.out")]
    output: PathBuf,
}

impl Runnable for SynthCommand {
    fn runner<'a>(&self, project_path: &'a Path, writer: &'a Writer) -> impl Runner + 'a {
        SynthRunner {
            command: self.clone(),
            project_path,
            writer,
        }
    }
}

struct SynthRunner<'a> {
    command: SynthCommand,
    project_path: &'a Path,
    writer: &'a Writer,
}

impl Runner for SynthRunner<'_> {
    fn project_path(&self) -> &Path {
        self.project_path
    }

    /// Build a stack per environment and write the cloud assembly
    fn run(&mut self) -> Result<(), Error> {
        let project = self.project()?;
        let environments = self.environments(&project, &self.command.environments)?;
        let mut app = App::new(project.path.join(&self.command.output));

        app.create_stacks(&project.config, &environments, &project.target)?;

        if app.stacks().is_empty() {
            self.writer.text(&format!(
                "{}\n",
                console::style("No environments selected, writing an empty assembly").yellow()
            ))?;
        }

        let assembly = app.synth()?;

        for artifact in &assembly.artifacts {
            self.writer.text(&format!(
                "{} {} {}\n",
                console::style("Synthesized").green().bold(),
                console::style(&artifact.stack_name).bold(),
                console::style(format!("({})", artifact.environment)).dim(),
            ))?;
        }

        self.writer.text(&format!(
            "\n{} {}\n",
            console::style("Cloud assembly").dim(),
            assembly.directory.display()
        ))?;

        self.writer.json(json!({
            "directory": assembly.directory.to_string_lossy(),
            "stacks": assembly
                .artifacts
                .iter()
                .map(|artifact| json!({
                    "stackName": artifact.stack_name,
                    "environment": artifact.environment,
                    "templateFile": artifact.template_file,
                    "assetsFile": artifact.assets_file,
                }))
                .collect::<Vec<_>>()
        }))
    }
}
