mod resources;
mod validate;

use crate::config::ResolvedConfig;
use crate::environment::Environment;
use eyre::{OptionExt, WrapErr};
pub use resources::*;
use std::time::Duration;

pub const QUEUE_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);
pub const FUNCTION_TIMEOUT: Duration = Duration::from_secs(300);
pub const CONTAINER_PORT: u16 = 8080;

const FUNCTION_DESCRIPTION: &str = "Lambda to execute commands (modifications to the database)";

/// AWS account and region a stack is deployed to
///
/// Unset values are resolved by the deployment tool at deploy time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployTarget {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl DeployTarget {
    /// Environment string of the cloud assembly manifest, "aws://<account>/<region>"
    pub fn to_uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region"),
        )
    }
}

/// All declared resources of a single environment
///
/// A plain value: inspecting it never touches any cloud API.
#[derive(Clone, Debug)]
pub struct Stack {
    pub name: String,
    pub environment: Environment,
    pub target: DeployTarget,
    pub queue: Queue,
    pub bucket: Bucket,
    pub service: FargateService,
    pub function: DockerFunction,
    pub event_sources: Vec<EventSource>,
    pub outputs: Vec<Output>,
}

impl Stack {
    pub fn builder() -> StackBuilder {
        StackBuilder::default()
    }

    /// Declared resources in the order they were created
    pub fn resources(&self) -> Vec<Resource<'_>> {
        vec![
            Resource::Queue(&self.queue),
            Resource::Bucket(&self.bucket),
            Resource::Service(&self.service),
            Resource::Function(&self.function),
        ]
    }
}

/// Assembles a [`Stack`] from a resolved configuration
#[derive(Default)]
pub struct StackBuilder {
    config: Option<ResolvedConfig>,
    target: Option<DeployTarget>,
}

impl StackBuilder {
    /// Declare all resources and wire them together
    ///
    /// Either the whole stack is declared or an error is returned,
    /// nothing is rolled back since nothing is provisioned here.
    pub fn build(self) -> eyre::Result<Stack> {
        let config = self
            .config
            .ok_or_eyre("No configuration provided to the stack")?;

        let queue = Self::queue(&config)?;
        let bucket = Self::bucket(&config)?;
        let service = Self::service(&config)?;
        let function = Self::function(&config)?;

        let event_sources = vec![EventSource {
            queue: queue.name.clone(),
            function: function.name.clone(),
        }];

        log::info!(
            "Assembled stack {} for {} environment",
            config.stack_name,
            config.environment
        );

        Ok(Stack {
            name: config.stack_name,
            environment: config.environment,
            target: self.target.unwrap_or_default(),
            queue,
            bucket,
            service,
            function,
            event_sources,
            outputs: Self::outputs(),
        })
    }

    pub fn set_config(mut self, config: ResolvedConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn set_target(mut self, target: DeployTarget) -> Self {
        self.target = Some(target);
        self
    }

    fn queue(config: &ResolvedConfig) -> eyre::Result<Queue> {
        validate::fifo_queue_name(&config.sqs_queue_name)
            .wrap_err("Failed to declare the queue")?;

        Ok(Queue {
            name: config.sqs_queue_name.clone(),
            fifo: true,
            visibility_timeout: QUEUE_VISIBILITY_TIMEOUT,
        })
    }

    fn bucket(config: &ResolvedConfig) -> eyre::Result<Bucket> {
        validate::bucket_name(&config.s3_bucket_name).wrap_err("Failed to declare the bucket")?;

        Ok(Bucket {
            name: config.s3_bucket_name.clone(),
            public_read_access: true,
            removal_policy: RemovalPolicy::Destroy,
        })
    }

    fn service(config: &ResolvedConfig) -> eyre::Result<FargateService> {
        validate::service_name(&config.fargate_service_name)
            .wrap_err("Failed to declare the service")?;

        Ok(FargateService {
            name: config.fargate_service_name.clone(),
            image: DockerImage {
                directory: config.images.directory.clone(),
                file: config.images.service_dockerfile.clone(),
                platform: config.images.platform.clone(),
            },
            container_port: CONTAINER_PORT,
            public_load_balancer: true,
            environment: config.service_env.clone(),
            cpu: 256,
            memory_mib: 512,
            desired_count: 1,
        })
    }

    fn function(config: &ResolvedConfig) -> eyre::Result<DockerFunction> {
        validate::function_name(&config.lambda_fn_name)
            .wrap_err("Failed to declare the function")?;

        Ok(DockerFunction {
            name: config.lambda_fn_name.clone(),
            image: DockerImage {
                directory: config.images.directory.clone(),
                file: config.images.function_dockerfile.clone(),
                platform: config.images.platform.clone(),
            },
            environment: config.service_env.clone(),
            description: FUNCTION_DESCRIPTION.into(),
            timeout: FUNCTION_TIMEOUT,
        })
    }

    /// Outputs shown to operators after provisioning
    fn outputs() -> Vec<Output> {
        [
            ("S3BucketName", OutputValue::BucketName, "S3 Bucket Name"),
            ("FargateServiceName", OutputValue::ServiceName, "Fargate Service Name"),
            ("LambdaFunctionName", OutputValue::FunctionName, "Lambda function name"),
            ("SQSqueueName", OutputValue::QueueName, "SQS queue name"),
            ("SQSqueueARN", OutputValue::QueueArn, "SQS queue ARN"),
            ("SQSqueueURL", OutputValue::QueueUrl, "SQS queue URL"),
        ]
        .into_iter()
        .map(|(id, value, description)| Output {
            id: id.into(),
            value,
            description: description.into(),
        })
        .collect()
    }
}
