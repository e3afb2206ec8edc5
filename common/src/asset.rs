use crate::stack::{DockerImage, Stack};
use eyre::{eyre, WrapErr};
use serde_json::{json, Map, Value};
use std::fs;
use std::hash::Hasher;
use std::path::Path;
use twox_hash::XxHash64;
use walkdir::WalkDir;

/// Qualifier of the default CDK bootstrap stack
const BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

pub const ASSEMBLY_VERSION: &str = "36.0.0";

/// Minimal bootstrap stack version able to publish the assets
pub const BOOTSTRAP_VERSION: u32 = 6;

pub fn bootstrap_version_parameter() -> String {
    format!("/cdk-bootstrap/{BOOTSTRAP_QUALIFIER}/version")
}

/// A container image source together with its content hash
///
/// The hash is used as the image tag, so an unchanged directory
/// never produces a new image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DockerImageAsset {
    pub source: DockerImage,
    pub hash: String,
}

impl DockerImageAsset {
    pub fn from_source(source: &DockerImage) -> eyre::Result<Self> {
        let hash = hash_image_source(source)
            .inspect_err(|e| log::error!("Failed to hash {:?}: {e:?}", source.directory))
            .wrap_err_with(|| {
                format!("Failed to prepare docker image asset {:?}", source.directory)
            })?;

        log::debug!("Image {:?}/{} hashed as {hash}", source.directory, source.file);
        Ok(DockerImageAsset {
            source: source.clone(),
            hash,
        })
    }

    fn repository_name() -> String {
        format!("cdk-{BOOTSTRAP_QUALIFIER}-container-assets-${{AWS::AccountId}}-${{AWS::Region}}")
    }

    /// Image URI as resolved by CloudFormation in the target account and region
    pub fn image_uri(&self) -> Value {
        json!({
            "Fn::Sub": format!(
                "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{}",
                Self::repository_name(),
                self.hash
            )
        })
    }

    /// Entry of the "dockerImages" section of an assets manifest
    fn manifest_entry(&self) -> Value {
        json!({
            "source": {
                "directory": self.source.directory.to_string_lossy(),
                "dockerFile": self.source.file,
                "platform": self.source.platform
            },
            "destinations": {
                "current_account-current_region": {
                    "repositoryName": Self::repository_name(),
                    "imageTag": self.hash,
                    "assumeRoleArn": format!(
                        "arn:${{AWS::Partition}}:iam::${{AWS::AccountId}}:role/cdk-{BOOTSTRAP_QUALIFIER}-image-publishing-role-${{AWS::AccountId}}-${{AWS::Region}}"
                    )
                }
            }
        })
    }
}

/// Images a stack needs to be built and published before deployment
#[derive(Clone, Debug)]
pub struct StackAssets {
    pub service: DockerImageAsset,
    pub function: DockerImageAsset,
}

impl StackAssets {
    pub fn from_stack(stack: &Stack) -> eyre::Result<Self> {
        Ok(StackAssets {
            service: DockerImageAsset::from_source(&stack.service.image)?,
            function: DockerImageAsset::from_source(&stack.function.image)?,
        })
    }

    /// The assets manifest consumed by the asset publishing tool
    pub fn manifest(&self) -> Value {
        let mut images = Map::new();

        for asset in [&self.service, &self.function] {
            images.insert(asset.hash.clone(), asset.manifest_entry());
        }

        json!({
            "version": ASSEMBLY_VERSION,
            "files": {},
            "dockerImages": images
        })
    }
}

/// Hash the build context and the build parameters of an image
///
/// Hidden entries (.git, .env and alike) are skipped, the rest is
/// walked in a sorted order so the hash is stable across runs.
pub fn hash_image_source(source: &DockerImage) -> eyre::Result<String> {
    let directory = &source.directory;

    if !directory.is_dir() {
        return Err(eyre!("Image directory {directory:?} does not exist"));
    }

    let mut hasher = XxHash64::default();
    write_field(&mut hasher, source.file.as_bytes());
    write_field(&mut hasher, source.platform.as_bytes());

    let entries = WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

    for entry in entries {
        let entry = entry.wrap_err("Failed to walk the image directory")?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(directory)
            .wrap_err("Failed to build relative path")?;

        let contents = fs::read(entry.path())
            .wrap_err_with(|| format!("Failed to read {:?}", entry.path()))?;

        write_field(&mut hasher, relative.to_string_lossy().as_bytes());
        write_field(&mut hasher, &contents);
    }

    Ok(format!("{:016x}", hasher.finish()))
}

/// Length prefixed, so adjacent fields never run into each other
fn write_field(hasher: &mut XxHash64, bytes: &[u8]) {
    hasher.write_u64(bytes.len() as u64);
    hasher.write(bytes);
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
