use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Queue {
    pub name: String,

    /// Ordered, exactly-once delivery
    pub fifo: bool,

    pub visibility_timeout: Duration,
}

/// What happens to a resource when the stack is deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalPolicy {
    Destroy,
}

impl RemovalPolicy {
    /// Value of DeletionPolicy/UpdateReplacePolicy in the template
    pub fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub public_read_access: bool,
    pub removal_policy: RemovalPolicy,
}

/// Container image built from a local Dockerfile
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DockerImage {
    pub directory: PathBuf,
    pub file: String,
    pub platform: String,
}

/// Fargate service behind an application load balancer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FargateService {
    pub name: String,
    pub image: DockerImage,
    pub container_port: u16,
    pub public_load_balancer: bool,
    pub environment: BTreeMap<String, String>,
    pub cpu: u32,
    pub memory_mib: u32,
    pub desired_count: u32,
}

/// Lambda function packaged as a container image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DockerFunction {
    pub name: String,
    pub image: DockerImage,
    pub environment: BTreeMap<String, String>,
    pub description: String,
    pub timeout: Duration,
}

/// Messages enqueued to `queue` invoke `function`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSource {
    pub queue: String,
    pub function: String,
}

/// Resource attribute exposed as a stack output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputValue {
    BucketName,
    ServiceName,
    FunctionName,
    QueueName,
    QueueArn,
    QueueUrl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub id: String,
    pub value: OutputValue,
    pub description: String,
}

/// A reference to one of the declared resources, in declaration order
#[derive(Clone, Copy, Debug)]
pub enum Resource<'a> {
    Queue(&'a Queue),
    Bucket(&'a Bucket),
    Service(&'a FargateService),
    Function(&'a DockerFunction),
}

impl Resource<'_> {
    pub fn name(&self) -> &str {
        match self {
            Resource::Queue(queue) => &queue.name,
            Resource::Bucket(bucket) => &bucket.name,
            Resource::Service(service) => &service.name,
            Resource::Function(function) => &function.name,
        }
    }
}
