use crate::{error::Error, project::Project, writer::Writer};
use std::error::Error as StdError;
use std::path::Path;
use tapestry_common::Environment;

pub(crate) trait Runner {
    /// Directory of the project, passed with --path
    fn project_path(&self) -> &Path;

    /// Current working project
    fn project(&self) -> Result<Project, Error> {
        Project::from_path(self.project_path()).map_err(|e| {
            self.error(
                Some("Failed to load the project"),
                Some(&format!("{e:#}")),
                Some(e.into()),
            )
        })
    }

    /// Environments requested in the command line, or the project defaults
    fn environments(
        &self,
        project: &Project,
        requested: &[String],
    ) -> Result<Vec<Environment>, Error> {
        if requested.is_empty() {
            return Ok(project.environments.clone());
        }

        Environment::parse_all(requested).map_err(|e| {
            self.error(Some("Invalid environment"), Some(&e.to_string()), None)
        })
    }

    /// Run the command
    ///
    /// Returns an error shown to the user in case of failure
    fn run(&mut self) -> Result<(), Error>;

    /// Construct an error shown to the user
    fn error(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        origin: Option<Box<dyn StdError>>,
    ) -> Error {
        if let Some(origin) = origin {
            log::error!("{origin:?}");
        }

        if let Some(title) = title {
            Error::new(title, description)
        } else {
            Error::new(
                "Failed to run the command",
                Some("Run again with RUST_LOG=debug for details"),
            )
        }
    }
}

/// Return a runner for a command
pub(crate) trait Runnable {
    fn runner<'a>(&self, project_path: &'a Path, writer: &'a Writer) -> impl Runner + 'a;
}
