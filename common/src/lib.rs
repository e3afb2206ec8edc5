pub mod app;
pub mod asset;
pub mod config;
pub mod environment;
pub mod stack;
pub mod template;

pub use app::{App, Artifact, CloudAssembly};
pub use config::{resolve, ImageSources, ResolvedConfig, StackConfig};
pub use environment::Environment;
pub use stack::{DeployTarget, Stack};
