use super::sanitize::logical_id;
use crate::asset::StackAssets;
use crate::stack::{
    Bucket, DockerFunction, EventSource, FargateService, Output, OutputValue, Queue, Stack,
};
use eyre::{eyre, WrapErr};
use serde_json::{json, Map, Value};

const CONTAINER_NAME: &str = "web";
const LISTENER_PORT: u16 = 80;

/// Permissions a function needs to consume messages from a queue
const SQS_CONSUME_ACTIONS: [&str; 5] = [
    "sqs:ReceiveMessage",
    "sqs:ChangeMessageVisibility",
    "sqs:GetQueueUrl",
    "sqs:DeleteMessage",
    "sqs:GetQueueAttributes",
];

/// CloudFormation template of a single stack
#[derive(Clone, Debug)]
pub struct Template {
    stack_name: String,
    description: String,
    parameters: Map<String, Value>,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
}

#[derive(Clone, Debug)]
pub struct CfnResource {
    name: String,
    resource: Value,
}

impl Template {
    /// Translate the stack descriptor into CFN resources
    pub fn new(stack: &Stack, assets: &StackAssets) -> eyre::Result<Self> {
        let mut template = Template {
            stack_name: stack.name.clone(),
            description: format!(
                "tapestryworlds infrastructure ({} environment)",
                stack.environment
            ),
            parameters: Map::new(),
            resources: Map::new(),
            outputs: Map::new(),
        };

        template.add_network_parameters();
        template.add_resource(Self::queue(&stack.queue));

        for resource in Self::bucket(&stack.bucket) {
            template.add_resource(resource);
        }

        let service_image = assets.service.image_uri();

        for resource in Self::service(&stack.service, service_image) {
            template.add_resource(resource);
        }

        let function_image = assets.function.image_uri();
        let queues = stack
            .event_sources
            .iter()
            .filter(|source| source.function == stack.function.name)
            .map(|source| source.queue.as_str())
            .collect::<Vec<_>>();

        for resource in Self::function(&stack.function, function_image, &queues) {
            template.add_resource(resource);
        }

        for event_source in &stack.event_sources {
            template.add_resource(Self::event_source(event_source));
        }

        for output in &stack.outputs {
            template.add_output(stack, output);
        }

        template.check_references()?;
        Ok(template)
    }

    /// Add a resource to the CFN template
    fn add_resource(&mut self, CfnResource { name, resource }: CfnResource) {
        if self.resources.insert(name.clone(), resource).is_some() {
            log::warn!("Resource {name} is declared twice, the last one wins");
        }
    }

    fn add_output(&mut self, stack: &Stack, output: &Output) {
        let value = match output.value {
            OutputValue::BucketName => json!({"Ref": logical_id("Bucket", &stack.bucket.name)}),
            OutputValue::ServiceName => json!({
                "Fn::GetAtt": [logical_id("Service", &stack.service.name), "Name"]
            }),
            OutputValue::FunctionName => {
                json!({"Ref": logical_id("Function", &stack.function.name)})
            }
            OutputValue::QueueName => json!({
                "Fn::GetAtt": [logical_id("Queue", &stack.queue.name), "QueueName"]
            }),
            OutputValue::QueueArn => json!({
                "Fn::GetAtt": [logical_id("Queue", &stack.queue.name), "Arn"]
            }),
            // Ref of a queue is its URL
            OutputValue::QueueUrl => json!({"Ref": logical_id("Queue", &stack.queue.name)}),
        };

        self.outputs.insert(
            output.id.clone(),
            json!({
                "Description": output.description,
                "Value": value,
            }),
        );
    }

    /// The service is deployed into an existing VPC
    fn add_network_parameters(&mut self) {
        self.parameters.insert(
            "VpcId".into(),
            json!({
                "Type": "AWS::EC2::VPC::Id",
                "Description": "VPC of the load balanced service"
            }),
        );

        self.parameters.insert(
            "SubnetIds".into(),
            json!({
                "Type": "List<AWS::EC2::Subnet::Id>",
                "Description": "Public subnets of the load balancer and the service tasks"
            }),
        );
    }

    fn queue(queue: &Queue) -> CfnResource {
        let mut properties = json!({
            "QueueName": queue.name,
            "VisibilityTimeout": queue.visibility_timeout.as_secs(),
        });

        if queue.fifo {
            properties["FifoQueue"] = json!(true);
        }

        CfnResource {
            name: logical_id("Queue", &queue.name),
            resource: json!({
                "Type": "AWS::SQS::Queue",
                "Properties": properties,
                "UpdateReplacePolicy": "Delete",
                "DeletionPolicy": "Delete"
            }),
        }
    }

    fn bucket(bucket: &Bucket) -> Vec<CfnResource> {
        let name = logical_id("Bucket", &bucket.name);
        let policy = bucket.removal_policy.as_cfn();

        let mut resources = vec![CfnResource {
            name: name.clone(),
            resource: json!({
                "Type": "AWS::S3::Bucket",
                "Properties": {
                    "BucketName": bucket.name,
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": !bucket.public_read_access,
                        "BlockPublicPolicy": !bucket.public_read_access,
                        "IgnorePublicAcls": !bucket.public_read_access,
                        "RestrictPublicBuckets": !bucket.public_read_access
                    }
                },
                "UpdateReplacePolicy": policy,
                "DeletionPolicy": policy
            }),
        }];

        if bucket.public_read_access {
            resources.push(CfnResource {
                name: logical_id("BucketPolicy", &bucket.name),
                resource: json!({
                    "Type": "AWS::S3::BucketPolicy",
                    "Properties": {
                        "Bucket": {"Ref": name},
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Action": "s3:GetObject",
                                "Effect": "Allow",
                                "Principal": {"AWS": "*"},
                                "Resource": {
                                    "Fn::Join": ["", [{"Fn::GetAtt": [name, "Arn"]}, "/*"]]
                                }
                            }]
                        }
                    }
                }),
            });
        }

        resources
    }

    /// Cluster, task, load balancer and the ECS service itself
    fn service(service: &FargateService, image: Value) -> Vec<CfnResource> {
        let cluster = logical_id("Cluster", &service.name);
        let execution_role = logical_id("TaskExecutionRole", &service.name);
        let task_definition = logical_id("TaskDefinition", &service.name);
        let lb_security_group = logical_id("LoadBalancerSecurityGroup", &service.name);
        let service_security_group = logical_id("ServiceSecurityGroup", &service.name);
        let load_balancer = logical_id("LoadBalancer", &service.name);
        let target_group = logical_id("TargetGroup", &service.name);
        let listener = logical_id("Listener", &service.name);
        let port = service.container_port;

        vec![
            CfnResource {
                name: cluster.clone(),
                resource: json!({"Type": "AWS::ECS::Cluster"}),
            },
            CfnResource {
                name: execution_role.clone(),
                resource: json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("ecs-tasks.amazonaws.com"),
                        "ManagedPolicyArns": [managed_policy_arn(
                            "service-role/AmazonECSTaskExecutionRolePolicy"
                        )]
                    }
                }),
            },
            CfnResource {
                name: task_definition.clone(),
                resource: json!({
                    "Type": "AWS::ECS::TaskDefinition",
                    "Properties": {
                        "Family": service.name,
                        "Cpu": service.cpu.to_string(),
                        "Memory": service.memory_mib.to_string(),
                        "NetworkMode": "awsvpc",
                        "RequiresCompatibilities": ["FARGATE"],
                        "ExecutionRoleArn": {"Fn::GetAtt": [execution_role, "Arn"]},
                        "RuntimePlatform": runtime_platform(&service.image.platform),
                        "ContainerDefinitions": [{
                            "Name": CONTAINER_NAME,
                            "Image": image,
                            "Essential": true,
                            "PortMappings": [{"ContainerPort": port, "Protocol": "tcp"}],
                            "Environment": service
                                .environment
                                .iter()
                                .map(|(name, value)| json!({"Name": name, "Value": value}))
                                .collect::<Vec<_>>()
                        }]
                    }
                }),
            },
            CfnResource {
                name: lb_security_group.clone(),
                resource: json!({
                    "Type": "AWS::EC2::SecurityGroup",
                    "Properties": {
                        "GroupDescription": format!("Load balancer of {}", service.name),
                        "VpcId": {"Ref": "VpcId"},
                        "SecurityGroupIngress": [{
                            "CidrIp": "0.0.0.0/0",
                            "IpProtocol": "tcp",
                            "FromPort": LISTENER_PORT,
                            "ToPort": LISTENER_PORT
                        }]
                    }
                }),
            },
            CfnResource {
                name: service_security_group.clone(),
                resource: json!({
                    "Type": "AWS::EC2::SecurityGroup",
                    "Properties": {
                        "GroupDescription": format!("Tasks of {}", service.name),
                        "VpcId": {"Ref": "VpcId"},
                        "SecurityGroupIngress": [{
                            "SourceSecurityGroupId": {"Fn::GetAtt": [lb_security_group, "GroupId"]},
                            "IpProtocol": "tcp",
                            "FromPort": port,
                            "ToPort": port
                        }]
                    }
                }),
            },
            CfnResource {
                name: load_balancer.clone(),
                resource: json!({
                    "Type": "AWS::ElasticLoadBalancingV2::LoadBalancer",
                    "Properties": {
                        "Type": "application",
                        "Scheme": if service.public_load_balancer { "internet-facing" } else { "internal" },
                        "Subnets": {"Ref": "SubnetIds"},
                        "SecurityGroups": [{"Fn::GetAtt": [lb_security_group, "GroupId"]}]
                    }
                }),
            },
            CfnResource {
                name: target_group.clone(),
                resource: json!({
                    "Type": "AWS::ElasticLoadBalancingV2::TargetGroup",
                    "Properties": {
                        "Port": port,
                        "Protocol": "HTTP",
                        "TargetType": "ip",
                        "VpcId": {"Ref": "VpcId"}
                    }
                }),
            },
            CfnResource {
                name: listener.clone(),
                resource: json!({
                    "Type": "AWS::ElasticLoadBalancingV2::Listener",
                    "Properties": {
                        "LoadBalancerArn": {"Ref": load_balancer},
                        "Port": LISTENER_PORT,
                        "Protocol": "HTTP",
                        "DefaultActions": [{
                            "Type": "forward",
                            "TargetGroupArn": {"Ref": target_group}
                        }]
                    }
                }),
            },
            CfnResource {
                name: logical_id("Service", &service.name),
                resource: json!({
                    "Type": "AWS::ECS::Service",
                    "DependsOn": [listener],
                    "Properties": {
                        "ServiceName": service.name,
                        "Cluster": {"Ref": cluster},
                        "LaunchType": "FARGATE",
                        "DesiredCount": service.desired_count,
                        "TaskDefinition": {"Ref": task_definition},
                        "LoadBalancers": [{
                            "ContainerName": CONTAINER_NAME,
                            "ContainerPort": port,
                            "TargetGroupArn": {"Ref": target_group}
                        }],
                        "NetworkConfiguration": {
                            "AwsvpcConfiguration": {
                                "AssignPublicIp": "ENABLED",
                                "Subnets": {"Ref": "SubnetIds"},
                                "SecurityGroups": [
                                    {"Fn::GetAtt": [service_security_group, "GroupId"]}
                                ]
                            }
                        }
                    }
                }),
            },
        ]
    }

    /// Execution role and the function, allowed to consume from `queues`
    fn function(function: &DockerFunction, image: Value, queues: &[&str]) -> Vec<CfnResource> {
        let role = logical_id("FunctionRole", &function.name);

        let mut role_properties = json!({
            "AssumeRolePolicyDocument": assume_role_policy("lambda.amazonaws.com"),
            "ManagedPolicyArns": [managed_policy_arn(
                "service-role/AWSLambdaBasicExecutionRole"
            )]
        });

        if !queues.is_empty() {
            role_properties["Policies"] = json!([{
                "PolicyName": "ConsumeQueueMessages",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": SQS_CONSUME_ACTIONS,
                        "Resource": queues
                            .iter()
                            .map(|queue| json!({"Fn::GetAtt": [logical_id("Queue", queue), "Arn"]}))
                            .collect::<Vec<_>>()
                    }]
                }
            }]);
        }

        vec![
            CfnResource {
                name: role.clone(),
                resource: json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": role_properties
                }),
            },
            CfnResource {
                name: logical_id("Function", &function.name),
                resource: json!({
                    "Type": "AWS::Lambda::Function",
                    "DependsOn": [role],
                    "Properties": {
                        "FunctionName": function.name,
                        "Description": function.description,
                        "PackageType": "Image",
                        "Code": {"ImageUri": image},
                        "Role": {"Fn::GetAtt": [role, "Arn"]},
                        "Timeout": function.timeout.as_secs(),
                        "Architectures": [architecture(&function.image.platform)],
                        "Environment": {
                            "Variables": function.environment
                        }
                    }
                }),
            },
        ]
    }

    fn event_source(event_source: &EventSource) -> CfnResource {
        let function = logical_id("Function", &event_source.function);

        CfnResource {
            name: format!(
                "{}{}",
                logical_id("EventSourceMapping", &event_source.function),
                logical_id("", &event_source.queue)
            ),
            resource: json!({
                "Type": "AWS::Lambda::EventSourceMapping",
                "Properties": {
                    "EventSourceArn": {
                        "Fn::GetAtt": [logical_id("Queue", &event_source.queue), "Arn"]
                    },
                    "FunctionName": {"Ref": function}
                }
            }),
        }
    }

    /// Every Ref and Fn::GetAtt must point at a declared resource or parameter
    fn check_references(&self) -> eyre::Result<()> {
        let mut targets = vec![];

        for value in self.resources.values().chain(self.outputs.values()) {
            collect_references(value, &mut targets);
        }

        for target in targets {
            let is_pseudo = target.starts_with("AWS::");

            if !is_pseudo
                && !self.resources.contains_key(&target)
                && !self.parameters.contains_key(&target)
            {
                return Err(eyre!("Unresolved reference to {target}"))
                    .wrap_err_with(|| format!("Invalid template for {}", self.stack_name));
            }
        }

        Ok(())
    }

    /// Resources of a given CFN type, e.g. "AWS::SQS::Queue"
    pub fn resources_of_type(&self, cfn_type: &str) -> Vec<(&str, &Value)> {
        self.resources
            .iter()
            .filter(|(_, resource)| resource["Type"] == cfn_type)
            .map(|(name, resource)| (name.as_str(), resource))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": self.description,
            "Parameters": self.parameters,
            "Resources": self.resources,
            "Outputs": self.outputs,
        })
    }

    pub fn to_string_pretty(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(&self.to_json())
            .wrap_err_with(|| format!("Failed to serialize template of {}", self.stack_name))
    }
}

fn collect_references(value: &Value, targets: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                targets.push(target.clone());
            }

            if let Some(Value::String(target)) = map
                .get("Fn::GetAtt")
                .and_then(|attr| attr.as_array())
                .and_then(|attr| attr.first())
            {
                targets.push(target.clone());
            }

            map.values().for_each(|v| collect_references(v, targets));
        }
        Value::Array(values) => values.iter().for_each(|v| collect_references(v, targets)),
        _ => {}
    }
}

fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": {"Service": service}
        }]
    })
}

fn managed_policy_arn(policy: &str) -> Value {
    json!({"Fn::Sub": format!("arn:${{AWS::Partition}}:iam::aws:policy/{policy}")})
}

/// "linux/amd64" -> "x86_64", "linux/arm64" -> "arm64"
fn architecture(platform: &str) -> &'static str {
    if platform.ends_with("arm64") {
        "arm64"
    } else {
        "x86_64"
    }
}

fn runtime_platform(platform: &str) -> Value {
    json!({
        "CpuArchitecture": if architecture(platform) == "arm64" { "ARM64" } else { "X86_64" },
        "OperatingSystemFamily": "LINUX"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::DockerImageAsset;
    use crate::config::StackConfig;
    use crate::environment::Environment;

    fn template(environment: Environment) -> Template {
        let stack = Stack::builder()
            .set_config(StackConfig::default().resolve(&environment))
            .build()
            .unwrap();

        let assets = StackAssets {
            service: DockerImageAsset {
                source: stack.service.image.clone(),
                hash: "aaaa".into(),
            },
            function: DockerImageAsset {
                source: stack.function.image.clone(),
                hash: "bbbb".into(),
            },
        };

        Template::new(&stack, &assets).unwrap()
    }

    #[test]
    fn queue_is_fifo_with_visibility_timeout() {
        let template = template(Environment::Test);
        let queues = template.resources_of_type("AWS::SQS::Queue");

        assert_eq!(queues.len(), 1);
        let properties = &queues[0].1["Properties"];
        assert_eq!(properties["QueueName"], "test-tapestryworlds-sqs-sqs_queue.fifo");
        assert_eq!(properties["FifoQueue"], true);
        assert_eq!(properties["VisibilityTimeout"], 300);
    }

    #[test]
    fn bucket_is_public_and_deleted_with_stack() {
        let template = template(Environment::Test);
        let buckets = template.resources_of_type("AWS::S3::Bucket");

        assert_eq!(buckets.len(), 1);
        let bucket = buckets[0].1;
        assert_eq!(bucket["Properties"]["BucketName"], "test-tapestryworlds-s3-images-bucket");
        assert_eq!(bucket["DeletionPolicy"], "Delete");
        assert_eq!(
            bucket["Properties"]["PublicAccessBlockConfiguration"]["BlockPublicPolicy"],
            false
        );

        let policies = template.resources_of_type("AWS::S3::BucketPolicy");
        assert_eq!(policies.len(), 1);
        assert_eq!(
            policies[0].1["Properties"]["PolicyDocument"]["Statement"][0]["Action"],
            "s3:GetObject"
        );
    }

    #[test]
    fn function_runs_image_with_timeout() {
        let template = template(Environment::Test);
        let functions = template.resources_of_type("AWS::Lambda::Function");

        assert_eq!(functions.len(), 1);
        let properties = &functions[0].1["Properties"];
        assert_eq!(properties["FunctionName"], "test-lambda-command-fn");
        assert_eq!(properties["Timeout"], 300);
        assert_eq!(properties["PackageType"], "Image");
        assert_eq!(properties["Architectures"][0], "x86_64");
        assert_eq!(properties["Environment"]["Variables"]["APP_ENV"], "test");

        let uri = properties["Code"]["ImageUri"]["Fn::Sub"].as_str().unwrap();
        assert!(uri.ends_with(":bbbb"));
    }

    #[test]
    fn exactly_one_event_source_mapping() {
        let template = template(Environment::Staging);
        let mappings = template.resources_of_type("AWS::Lambda::EventSourceMapping");

        assert_eq!(mappings.len(), 1);
        let properties = &mappings[0].1["Properties"];
        assert_eq!(
            properties["EventSourceArn"]["Fn::GetAtt"][0],
            logical_id("Queue", "staging-tapestryworlds-sqs-sqs_queue.fifo")
        );
        assert_eq!(
            properties["FunctionName"]["Ref"],
            logical_id("Function", "staging-lambda-command-fn")
        );
    }

    #[test]
    fn function_role_can_consume_queue() {
        let template = template(Environment::Production);
        let role = &template.resources[&logical_id("FunctionRole", "lambda-command-fn")];
        let statement = &role["Properties"]["Policies"][0]["PolicyDocument"]["Statement"][0];

        assert_eq!(statement["Action"][0], "sqs:ReceiveMessage");
        assert_eq!(
            statement["Resource"][0]["Fn::GetAtt"][0],
            logical_id("Queue", "tapestryworlds-sqs-sqs_queue.fifo")
        );
    }

    #[test]
    fn service_exposes_container_port() {
        let template = template(Environment::Production);
        let services = template.resources_of_type("AWS::ECS::Service");

        assert_eq!(services.len(), 1);
        let properties = &services[0].1["Properties"];
        assert_eq!(properties["ServiceName"], "tapestryworlds-service");
        assert_eq!(properties["LoadBalancers"][0]["ContainerPort"], 8080);

        let tasks = template.resources_of_type("AWS::ECS::TaskDefinition");
        let container = &tasks[0].1["Properties"]["ContainerDefinitions"][0];
        assert_eq!(container["PortMappings"][0]["ContainerPort"], 8080);
        // Production runs with the base env vars only
        assert_eq!(container["Environment"], json!([]));

        let staging = self::template(Environment::Staging);
        let tasks = staging.resources_of_type("AWS::ECS::TaskDefinition");
        assert!(tasks[0].1["Properties"]["ContainerDefinitions"][0]["Environment"]
            .as_array()
            .unwrap()
            .contains(&json!({"Name": "APP_ENV", "Value": "staging"})));

        let balancers = template.resources_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer");
        assert_eq!(balancers[0].1["Properties"]["Scheme"], "internet-facing");
    }

    #[test]
    fn outputs_reference_declared_resources() {
        let json = template(Environment::Test).to_json();
        let outputs = json["Outputs"].as_object().unwrap();

        assert_eq!(outputs.len(), 6);
        assert_eq!(
            outputs["SQSqueueURL"]["Value"]["Ref"],
            logical_id("Queue", "test-tapestryworlds-sqs-sqs_queue.fifo")
        );
        assert_eq!(outputs["FargateServiceName"]["Value"]["Fn::GetAtt"][1], "Name");
        assert_eq!(outputs["S3BucketName"]["Description"], "S3 Bucket Name");
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut template = template(Environment::Test);

        template.add_resource(CfnResource {
            name: "Broken".into(),
            resource: json!({"Type": "AWS::SQS::QueuePolicy", "Properties": {"Queues": [{"Ref": "Missing"}]}}),
        });

        assert!(template.check_references().is_err());
    }
}
