use crate::environment::Environment;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const FARGATE_SERVICE_NAME: &str = "tapestryworlds-service";
pub const LAMBDA_FN_NAME: &str = "lambda-command-fn";
pub const SQS_QUEUE_NAME: &str = "tapestryworlds-sqs-sqs_queue.fifo";
pub const S3_BUCKET_NAME: &str = "tapestryworlds-s3-images-bucket";

/// Env var keys injected into non-production configurations
pub const APP_ENV_KEY: &str = "APP_ENV";
pub const S3_BUCKET_NAME_KEY: &str = "S3_BUCKET_NAME";
pub const SQS_QUEUE_NAME_KEY: &str = "SQS_QUEUE_NAME";

/// Where the container images of the service and the function are built from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSources {
    /// Directory with both Dockerfiles, the build context
    pub directory: PathBuf,

    pub service_dockerfile: String,
    pub function_dockerfile: String,
    pub platform: String,
}

impl Default for ImageSources {
    fn default() -> Self {
        ImageSources {
            directory: PathBuf::from("../fast-api-jwt"),
            service_dockerfile: "Dockerfile.fargate.service".into(),
            function_dockerfile: "Dockerfile.lambda.handler".into(),
            platform: "linux/amd64".into(),
        }
    }
}

/// Base configuration shared by all environments
///
/// Names here are production names. Constructed once and passed to
/// [`StackConfig::resolve`] for every environment being built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    /// Env vars of both the service and the function
    pub service_env: BTreeMap<String, String>,

    pub fargate_service_name: String,
    pub lambda_fn_name: String,
    pub sqs_queue_name: String,
    pub s3_bucket_name: String,
    pub images: ImageSources,
}

impl StackConfig {
    /// Default resource names with the given base env vars
    pub fn base(service_env: BTreeMap<String, String>) -> Self {
        StackConfig {
            service_env,
            fargate_service_name: FARGATE_SERVICE_NAME.into(),
            lambda_fn_name: LAMBDA_FN_NAME.into(),
            sqs_queue_name: SQS_QUEUE_NAME.into(),
            s3_bucket_name: S3_BUCKET_NAME.into(),
            images: ImageSources::default(),
        }
    }

    /// Resolve the configuration for a specific environment
    pub fn resolve(&self, environment: &Environment) -> ResolvedConfig {
        resolve(self, environment)
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig::base(BTreeMap::new())
    }
}

/// Environment specific configuration, consumed by the stack assembler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub environment: Environment,
    pub stack_name: String,
    pub service_env: BTreeMap<String, String>,
    pub fargate_service_name: String,
    pub lambda_fn_name: String,
    pub sqs_queue_name: String,
    pub s3_bucket_name: String,
    pub images: ImageSources,
}

/// Copy the template and patch it for the environment
///
/// Unless the environment is production, names get the "<label>-" prefix
/// and the env vars receive the active environment label together with
/// the resolved bucket and queue names. Production keeps the template's
/// env vars as they are.
pub fn resolve(template: &StackConfig, environment: &Environment) -> ResolvedConfig {
    let template = template.clone();
    let s3_bucket_name = environment.prefixed(&template.s3_bucket_name);
    let sqs_queue_name = environment.prefixed(&template.sqs_queue_name);
    let mut service_env = template.service_env;

    if !environment.is_production() {
        service_env.insert(APP_ENV_KEY.into(), environment.label().into());
        service_env.insert(S3_BUCKET_NAME_KEY.into(), s3_bucket_name.clone());
        service_env.insert(SQS_QUEUE_NAME_KEY.into(), sqs_queue_name.clone());
    }

    log::debug!(
        "Resolved {} config: bucket {s3_bucket_name}, queue {sqs_queue_name}",
        environment.label()
    );

    ResolvedConfig {
        stack_name: environment.stack_name(),
        fargate_service_name: environment.prefixed(&template.fargate_service_name),
        lambda_fn_name: environment.prefixed(&template.lambda_fn_name),
        sqs_queue_name,
        s3_bucket_name,
        service_env,
        images: template.images,
        environment: environment.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> StackConfig {
        StackConfig::base(BTreeMap::from([
            ("DATABASE_URL".to_string(), "postgres://db".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
        ]))
    }

    #[test]
    fn non_production_names_are_prefixed() {
        for environment in [
            Environment::Staging,
            Environment::Test,
            Environment::Other("qa".into()),
        ] {
            let resolved = template().resolve(&environment);
            let label = environment.label();

            assert_eq!(resolved.fargate_service_name, format!("{label}-{FARGATE_SERVICE_NAME}"));
            assert_eq!(resolved.lambda_fn_name, format!("{label}-{LAMBDA_FN_NAME}"));
            assert_eq!(resolved.sqs_queue_name, format!("{label}-{SQS_QUEUE_NAME}"));
            assert_eq!(resolved.s3_bucket_name, format!("{label}-{S3_BUCKET_NAME}"));
        }
    }

    #[test]
    fn production_names_are_unchanged() {
        let base = template();
        let resolved = base.resolve(&Environment::Production);

        assert_eq!(resolved.fargate_service_name, base.fargate_service_name);
        assert_eq!(resolved.lambda_fn_name, base.lambda_fn_name);
        assert_eq!(resolved.sqs_queue_name, base.sqs_queue_name);
        assert_eq!(resolved.s3_bucket_name, base.s3_bucket_name);
        assert_eq!(resolved.stack_name, "CdkFastApiJwtStack");
    }

    #[test]
    fn env_vars_carry_environment_and_resolved_names() {
        let resolved = template().resolve(&Environment::Staging);

        assert_eq!(resolved.service_env[APP_ENV_KEY], "staging");
        assert_eq!(
            resolved.service_env[S3_BUCKET_NAME_KEY],
            "staging-tapestryworlds-s3-images-bucket"
        );
        assert_eq!(
            resolved.service_env[SQS_QUEUE_NAME_KEY],
            "staging-tapestryworlds-sqs-sqs_queue.fifo"
        );
        assert_eq!(resolved.service_env["DATABASE_URL"], "postgres://db");
    }

    #[test]
    fn production_keeps_template_env_vars() {
        let mut base = template();
        base.service_env.insert(APP_ENV_KEY.into(), "local".into());

        let resolved = base.resolve(&Environment::Production);

        assert_eq!(resolved.service_env, base.service_env);
        assert_eq!(resolved.service_env[APP_ENV_KEY], "local");
        assert!(!resolved.service_env.contains_key(S3_BUCKET_NAME_KEY));
        assert!(!resolved.service_env.contains_key(SQS_QUEUE_NAME_KEY));
    }

    #[test]
    fn resolved_configs_share_nothing() {
        let base = template();
        let mut staging = base.resolve(&Environment::Staging);
        let test = base.resolve(&Environment::Test);

        staging.service_env.insert("DATABASE_URL".into(), "changed".into());
        staging.s3_bucket_name.push_str("-changed");

        assert_eq!(test.service_env["DATABASE_URL"], "postgres://db");
        assert_eq!(test.s3_bucket_name, "test-tapestryworlds-s3-images-bucket");
        assert_eq!(base.service_env["DATABASE_URL"], "postgres://db");
        assert!(!base.service_env.contains_key(APP_ENV_KEY));
        assert_eq!(base, template());
    }
}
