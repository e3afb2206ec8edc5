use crate::envs::{Envs, DOTENV_FILENAME};
use eyre::WrapErr;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tapestry_common::{DeployTarget, Environment, StackConfig};

pub const CONFIG_FILENAME: &str = "infra.toml";

/// The infrastructure project being synthesized
///
/// Built from infra.toml and the dotenv file in the project directory,
/// both are optional.
#[derive(Debug, Clone)]
pub(crate) struct Project {
    pub path: PathBuf,

    /// Base configuration, resolved per environment later
    pub config: StackConfig,

    pub target: DeployTarget,

    /// Environments built when none are passed in the command line
    pub environments: Vec<Environment>,
}

impl Project {
    pub fn from_path(path: &Path) -> eyre::Result<Self> {
        let file = FileConfig::from_path(path)?;
        let stack = file.stack;

        let dotenv = path.join(stack.dotenv.as_deref().unwrap_or(DOTENV_FILENAME));
        let mut config = StackConfig::base(Envs::load(&dotenv));

        if let Some(name) = stack.service_name {
            config.fargate_service_name = name;
        }

        if let Some(name) = stack.function_name {
            config.lambda_fn_name = name;
        }

        if let Some(name) = stack.queue_name {
            config.sqs_queue_name = name;
        }

        if let Some(name) = stack.bucket_name {
            config.s3_bucket_name = name;
        }

        // Image directory is relative to the project
        config.images.directory = path.join(
            stack
                .image_directory
                .unwrap_or_else(|| config.images.directory.clone()),
        );

        let environments = match stack.environments {
            Some(labels) => Environment::parse_all(labels.as_slice())
                .wrap_err_with(|| format!("Invalid environments in {CONFIG_FILENAME}"))?,
            None => Environment::defaults(),
        };

        Ok(Project {
            path: path.to_path_buf(),
            config,
            target: DeployTarget {
                account: file
                    .deploy
                    .account
                    .or_else(|| std::env::var("CDK_DEFAULT_ACCOUNT").ok()),
                region: file
                    .deploy
                    .region
                    .or_else(|| std::env::var("CDK_DEFAULT_REGION").ok()),
            },
            environments,
        })
    }
}

/// FileConfig is the structure of infra.toml
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    /// [stack]
    /// bucket_name = "tapestryworlds-s3-images-bucket"
    #[serde(default)]
    pub stack: StackSection,

    /// [deploy]
    /// region = "us-east-1"
    #[serde(default)]
    pub deploy: DeploySection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StackSection {
    pub service_name: Option<String>,
    pub function_name: Option<String>,
    pub queue_name: Option<String>,
    pub bucket_name: Option<String>,
    pub image_directory: Option<PathBuf>,
    pub environments: Option<Vec<String>>,
    pub dotenv: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DeploySection {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl FileConfig {
    fn from_path(path: &Path) -> eyre::Result<Self> {
        let config_toml_path = path.join(CONFIG_FILENAME);

        if let Ok(toml_string) = std::fs::read_to_string(&config_toml_path) {
            toml::from_str(&toml_string)
                .inspect_err(|e| log::error!("{config_toml_path:?}: {e:?}"))
                .wrap_err_with(|| format!("Failed to parse {CONFIG_FILENAME}"))
        } else {
            // Return default config if infra.toml is not found
            log::debug!("No {CONFIG_FILENAME} in {path:?}, using defaults");
            Ok(FileConfig::default())
        }
    }
}
