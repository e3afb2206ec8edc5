mod sanitize;
#[allow(clippy::module_inception)]
mod template;

pub use sanitize::{escape_resource_name, logical_id};
pub use template::{CfnResource, Template};
