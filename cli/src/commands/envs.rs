use crate::error::Error;
use crate::runner::{Runnable, Runner};
use crate::writer::Writer;
use serde_json::{json, Map, Value};
use std::path::Path;

#[derive(clap::Args, Clone)]
pub(crate) struct EnvsCommand {
    /// Comma-separated list of environments (production, staging, test by default)
    #[arg(value_delimiter = ',')]
    environments: Vec<String>,
}

impl Runnable for EnvsCommand {
    fn runner<'a>(&self, project_path: &'a Path, writer: &'a Writer) -> impl Runner + 'a {
        EnvsRunner {
            command: self.clone(),
            project_path,
            writer,
        }
    }
}

struct EnvsRunner<'a> {
    command: EnvsCommand,
    project_path: &'a Path,
    writer: &'a Writer,
}

impl Runner for EnvsRunner<'_> {
    fn project_path(&self) -> &Path {
        self.project_path
    }

    /// Lists env vars passed to the service and the function in every environment
    fn run(&mut self) -> Result<(), Error> {
        let project = self.project()?;
        let environments = self.environments(&project, &self.command.environments)?;
        let mut result = Map::new();

        if environments.is_empty() {
            self.writer
                .text(&format!("{}\n", console::style("No environments selected").yellow()))?;
        }

        for environment in environments {
            let resolved = project.config.resolve(&environment);

            self.writer.text(&format!(
                "{} {}\n",
                console::style(environment.label()).bold(),
                console::style(format!("for {}", resolved.stack_name)).dim()
            ))?;

            for (key, value) in &resolved.service_env {
                self.writer
                    .text(&format!("{} {value}\n", console::style(key).dim()))?;
            }

            self.writer.text("\n")?;
            result.insert(environment.label().to_string(), json!(resolved.service_env));
        }

        self.writer.json(Value::Object(result))
    }
}
