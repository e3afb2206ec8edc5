use crate::error::Error;
use crate::runner::{Runnable, Runner};
use crate::writer::Writer;
use serde_json::json;
use std::path::Path;
use tabled::settings::{peaker::Priority, style::Style, Settings, Width};
use tabled::{Table, Tabled};
use tapestry_common::{App, Stack};
use terminal_size::{terminal_size, Width as TerminalWidth};

#[derive(Tabled, Clone)]
struct StackRow {
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Function")]
    function: String,
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Bucket")]
    bucket: String,
}

impl From<&Stack> for StackRow {
    fn from(stack: &Stack) -> Self {
        StackRow {
            stack: stack.name.clone(),
            environment: stack.environment.to_string(),
            service: stack.service.name.clone(),
            function: stack.function.name.clone(),
            queue: stack.queue.name.clone(),
            bucket: stack.bucket.name.clone(),
        }
    }
}

#[derive(clap::Args, Clone)]
pub(crate) struct ListCommand {
    /// Comma-separated list of environments (production, staging, test by default)
    #[arg(value_delimiter = ',')]
    environments: Vec<String>,
}

impl Runnable for ListCommand {
    fn runner<'a>(&self, project_path: &'a Path, writer: &'a Writer) -> impl Runner + 'a {
        ListRunner {
            command: self.clone(),
            project_path,
            writer,
        }
    }
}

struct ListRunner<'a> {
    command: ListCommand,
    project_path: &'a Path,
    writer: &'a Writer,
}

impl Runner for ListRunner<'_> {
    fn project_path(&self) -> &Path {
        self.project_path
    }

    /// Prints out resource names of every stack, without synthesizing anything
    fn run(&mut self) -> Result<(), Error> {
        let project = self.project()?;
        let environments = self.environments(&project, &self.command.environments)?;
        let mut app = App::new(project.path.join("cdk.out"));
        let stacks = app.create_stacks(&project.config, &environments, &project.target)?;

        if self.writer.is_structured() {
            return self.writer.json(json!(stacks
                .iter()
                .map(|stack| json!({
                    "stackName": stack.name,
                    "environment": stack.environment,
                    "service": stack.service.name,
                    "function": stack.function.name,
                    "queue": stack.queue.name,
                    "bucket": stack.bucket.name,
                }))
                .collect::<Vec<_>>()));
        }

        if stacks.is_empty() {
            return self
                .writer
                .text(&format!("{}\n", console::style("No stacks found").yellow()));
        }

        let mut table = Table::new(stacks.iter().map(StackRow::from));
        table.with(Style::modern());

        // Fit the table into the terminal when there is one
        if let Some((TerminalWidth(width), _)) = terminal_size() {
            let width: usize = width.into();

            table.with(
                Settings::default()
                    .with(Width::wrap(width).priority(Priority::max(true)))
                    .with(Width::increase(width)),
            );
        }

        self.writer.text(&format!("Stacks\n{table}\n"))
    }
}
