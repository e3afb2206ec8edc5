use crate::asset::{
    bootstrap_version_parameter, StackAssets, ASSEMBLY_VERSION, BOOTSTRAP_VERSION,
};
use crate::config::StackConfig;
use crate::environment::Environment;
use crate::stack::{DeployTarget, Stack};
use crate::template::Template;
use eyre::WrapErr;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;

pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Collection of stacks synthesized together into a cloud assembly
pub struct App {
    outdir: PathBuf,
    stacks: Vec<Stack>,
}

/// A synthesized stack, file names are relative to the assembly directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub stack_name: String,
    pub environment: Environment,
    pub template_file: String,
    pub assets_file: String,
}

/// Result of the synthesis
#[derive(Clone, Debug)]
pub struct CloudAssembly {
    pub directory: PathBuf,
    pub artifacts: Vec<Artifact>,
}

impl App {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        App {
            outdir: outdir.into(),
            stacks: vec![],
        }
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Build one stack per requested environment
    ///
    /// Every environment is built independently, in the order requested.
    /// A repeated environment is only built once.
    pub fn create_stacks(
        &mut self,
        base: &StackConfig,
        environments: &[Environment],
        target: &DeployTarget,
    ) -> eyre::Result<&[Stack]> {
        for environment in environments {
            if self.stacks.iter().any(|s| &s.environment == environment) {
                log::warn!("Environment {environment} requested more than once, skipping");
                continue;
            }

            let stack = Stack::builder()
                .set_config(base.resolve(environment))
                .set_target(target.clone())
                .build()
                .wrap_err_with(|| format!("Failed to create {environment} stack"))?;

            self.stacks.push(stack);
        }

        Ok(&self.stacks)
    }

    /// Write templates, asset manifests and the assembly manifest to the output dir
    pub fn synth(&self) -> eyre::Result<CloudAssembly> {
        fs::create_dir_all(&self.outdir)
            .inspect_err(|e| log::error!("Failed to create {:?}: {e:?}", self.outdir))
            .wrap_err("Failed to create the output directory")?;

        let mut artifacts = vec![];

        for stack in &self.stacks {
            let assets = StackAssets::from_stack(stack)?;
            let template = Template::new(stack, &assets)?;

            let artifact = Artifact {
                stack_name: stack.name.clone(),
                environment: stack.environment.clone(),
                template_file: format!("{}.template.json", stack.name),
                assets_file: format!("{}.assets.json", stack.name),
            };

            self.write(&artifact.template_file, &template.to_string_pretty()?)?;
            self.write(&artifact.assets_file, &pretty(&assets.manifest())?)?;

            log::info!("Synthesized {} into {:?}", stack.name, self.outdir);
            artifacts.push(artifact);
        }

        self.write(MANIFEST_FILENAME, &pretty(&self.manifest(&artifacts))?)?;

        Ok(CloudAssembly {
            directory: self.outdir.clone(),
            artifacts,
        })
    }

    /// Assembly manifest
    ///
    /// Every stack is a CFN stack artifact depending on the asset manifest
    /// artifact of its images, so the images are published before deployment.
    fn manifest(&self, artifacts: &[Artifact]) -> Value {
        let mut entries = Map::new();

        for (stack, artifact) in self.stacks.iter().zip(artifacts) {
            let assets_id = format!("{}.assets", artifact.stack_name);

            entries.insert(
                assets_id.clone(),
                json!({
                    "type": "cdk:asset-manifest",
                    "properties": {
                        "file": artifact.assets_file,
                        "requiresBootstrapStackVersion": BOOTSTRAP_VERSION,
                        "bootstrapStackVersionSsmParameter": bootstrap_version_parameter()
                    }
                }),
            );

            entries.insert(
                artifact.stack_name.clone(),
                json!({
                    "type": "aws:cloudformation:stack",
                    "environment": stack.target.to_uri(),
                    "properties": {
                        "templateFile": artifact.template_file,
                        "stackName": artifact.stack_name
                    },
                    "dependencies": [assets_id],
                    "displayName": artifact.stack_name
                }),
            );
        }

        json!({
            "version": ASSEMBLY_VERSION,
            "artifacts": entries
        })
    }

    fn write(&self, filename: &str, contents: &str) -> eyre::Result<()> {
        let path = self.outdir.join(filename);

        fs::write(&path, contents)
            .inspect_err(|e| log::error!("Failed to write {path:?}: {e:?}"))
            .wrap_err_with(|| format!("Failed to write {filename}"))
    }
}

fn pretty(value: &Value) -> eyre::Result<String> {
    serde_json::to_string_pretty(value).wrap_err("Failed to serialize JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_environments_means_no_stacks() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(dir.path().join("cdk.out"));

        let stacks = app
            .create_stacks(&StackConfig::default(), &[], &DeployTarget::default())
            .unwrap();
        assert!(stacks.is_empty());

        let assembly = app.synth().unwrap();
        assert!(assembly.artifacts.is_empty());

        let manifest: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("cdk.out").join(MANIFEST_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["artifacts"], json!({}));
    }

    #[test]
    fn every_requested_environment_is_built() {
        let mut app = App::new("cdk.out");

        let stacks = app
            .create_stacks(
                &StackConfig::default(),
                &[Environment::Production, Environment::Staging, Environment::Test],
                &DeployTarget::default(),
            )
            .unwrap();

        let names = stacks.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "CdkFastApiJwtStack",
                "StagingCdkFastApiJwtStack",
                "TestCdkFastApiJwtStack"
            ]
        );
    }

    #[test]
    fn repeated_environment_is_built_once() {
        let mut app = App::new("cdk.out");

        app.create_stacks(
            &StackConfig::default(),
            &[Environment::Test, Environment::Test],
            &DeployTarget::default(),
        )
        .unwrap();

        assert_eq!(app.stacks().len(), 1);
    }

    #[test]
    fn invalid_configuration_fails_the_whole_run() {
        let mut base = StackConfig::default();
        base.lambda_fn_name = "x".repeat(60);
        let mut app = App::new("cdk.out");

        // Production fits into 64 chars, "staging-" prefix does not
        let result = app.create_stacks(
            &base,
            &[Environment::Production, Environment::Staging],
            &DeployTarget::default(),
        );

        assert!(result.is_err());
    }
}
