use eyre::eyre;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Name of the production stack, other stacks prepend a capitalized label to it
pub const STACK_NAME_BASE: &str = "CdkFastApiJwtStack";

/// Labels end up inside S3 bucket names, so only lowercase is allowed
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").unwrap());

/// Deployment environment a stack is built for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Environment {
    Production,
    Staging,
    Test,

    /// Any other label, treated like staging and test
    Other(String),
}

impl Environment {
    /// Environments built when none are requested explicitly
    pub fn defaults() -> Vec<Environment> {
        vec![
            Environment::Production,
            Environment::Staging,
            Environment::Test,
        ]
    }

    pub fn label(&self) -> &str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
            Environment::Other(label) => label,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Apply the environment prefix to a resource name
    ///
    /// Production names are returned unchanged, any other environment
    /// gets "<label>-" in front of the name.
    pub fn prefixed(&self, name: &str) -> String {
        if self.is_production() {
            name.to_string()
        } else {
            format!("{}-{name}", self.label())
        }
    }

    /// CloudFormation stack name, e.g. "StagingCdkFastApiJwtStack"
    pub fn stack_name(&self) -> String {
        if self.is_production() {
            return STACK_NAME_BASE.to_string();
        }

        let mut chars = self.label().chars();

        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };

        format!("{capitalized}{STACK_NAME_BASE}")
    }

    /// Parse a list of labels, e.g. from a comma separated CLI argument
    pub fn parse_all<S: AsRef<str>>(labels: &[S]) -> eyre::Result<Vec<Environment>> {
        labels.iter().map(|label| label.as_ref().parse()).collect()
    }
}

impl FromStr for Environment {
    type Err = eyre::Report;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();

        match label {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "test" => Ok(Environment::Test),
            _ if LABEL.is_match(label) => Ok(Environment::Other(label.to_string())),
            _ => Err(eyre!(
                "Invalid environment label {label:?}: use lowercase letters, digits and hyphens"
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_parse_into_variants() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!(" test ".parse::<Environment>().unwrap(), Environment::Test);

        assert_eq!(
            "qa-2".parse::<Environment>().unwrap(),
            Environment::Other("qa-2".into())
        );
    }

    #[test]
    fn invalid_labels_are_rejected() {
        for label in ["", "Prod", "qa_1", "-dev", "dev-", "1dev", "dev--x"] {
            assert!(label.parse::<Environment>().is_err(), "{label:?} parsed");
        }
    }

    #[test]
    fn only_production_is_left_unprefixed() {
        assert_eq!(Environment::Production.prefixed("bucket"), "bucket");
        assert_eq!(Environment::Staging.prefixed("bucket"), "staging-bucket");
        assert_eq!(Environment::Other("qa".into()).prefixed("bucket"), "qa-bucket");
    }

    #[test]
    fn stack_names_capitalize_the_label() {
        assert_eq!(Environment::Production.stack_name(), "CdkFastApiJwtStack");
        assert_eq!(Environment::Staging.stack_name(), "StagingCdkFastApiJwtStack");
        assert_eq!(Environment::Test.stack_name(), "TestCdkFastApiJwtStack");
        assert_eq!(
            Environment::Other("qa-2".into()).stack_name(),
            "Qa-2CdkFastApiJwtStack"
        );
    }

    #[test]
    fn parse_all_stops_at_first_invalid_label() {
        let parsed = Environment::parse_all(&["test", "staging"]).unwrap();
        assert_eq!(parsed, vec![Environment::Test, Environment::Staging]);
        assert!(Environment::parse_all(&["test", "Bad"]).is_err());
    }
}
