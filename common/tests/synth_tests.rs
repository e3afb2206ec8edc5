use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tapestry_common::{App, DeployTarget, Environment, StackConfig};

fn image_directory(root: &Path) -> std::path::PathBuf {
    let directory = root.join("fast-api-jwt");
    fs::create_dir_all(&directory).unwrap();
    fs::write(directory.join("Dockerfile.fargate.service"), "FROM python:3.12").unwrap();
    fs::write(directory.join("Dockerfile.lambda.handler"), "FROM public.ecr.aws/lambda/python").unwrap();
    fs::write(directory.join("main.py"), "app = None").unwrap();
    directory
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn synthesizes_all_default_environments() {
    let root = tempfile::tempdir().unwrap();
    let mut base = StackConfig::base(BTreeMap::from([(
        "DATABASE_URL".to_string(),
        "postgres://db".to_string(),
    )]));
    base.images.directory = image_directory(root.path());

    let target = DeployTarget {
        account: Some("123456789012".into()),
        region: Some("eu-west-1".into()),
    };

    let outdir = root.path().join("cdk.out");
    let mut app = App::new(outdir.clone());
    app.create_stacks(&base, &Environment::defaults(), &target)
        .unwrap();
    let assembly = app.synth().unwrap();

    assert_eq!(assembly.artifacts.len(), 3);

    let manifest = read_json(&outdir.join("manifest.json"));
    let staging = &manifest["artifacts"]["StagingCdkFastApiJwtStack"];
    assert_eq!(staging["type"], "aws:cloudformation:stack");
    assert_eq!(staging["environment"], "aws://123456789012/eu-west-1");
    assert_eq!(
        staging["properties"]["templateFile"],
        "StagingCdkFastApiJwtStack.template.json"
    );
    assert_eq!(
        staging["dependencies"],
        serde_json::json!(["StagingCdkFastApiJwtStack.assets"])
    );
    assert!(staging.get("metadata").is_none());

    let staging_assets = &manifest["artifacts"]["StagingCdkFastApiJwtStack.assets"];
    assert_eq!(staging_assets["type"], "cdk:asset-manifest");
    assert_eq!(
        staging_assets["properties"]["file"],
        "StagingCdkFastApiJwtStack.assets.json"
    );
    assert!(outdir.join("StagingCdkFastApiJwtStack.assets.json").is_file());

    // One stack artifact and one asset manifest artifact per environment
    assert_eq!(manifest["artifacts"].as_object().unwrap().len(), 6);

    let template = read_json(&outdir.join("TestCdkFastApiJwtStack.template.json"));
    let resources = template["Resources"].as_object().unwrap();

    let of_type = |cfn_type: &str| {
        resources
            .values()
            .filter(|r| r["Type"] == cfn_type)
            .collect::<Vec<_>>()
    };

    let queues = of_type("AWS::SQS::Queue");
    assert_eq!(queues.len(), 1);
    assert_eq!(
        queues[0]["Properties"]["QueueName"],
        "test-tapestryworlds-sqs-sqs_queue.fifo"
    );

    let functions = of_type("AWS::Lambda::Function");
    assert_eq!(functions[0]["Properties"]["FunctionName"], "test-lambda-command-fn");
    assert_eq!(
        functions[0]["Properties"]["Environment"]["Variables"]["DATABASE_URL"],
        "postgres://db"
    );

    assert_eq!(of_type("AWS::Lambda::EventSourceMapping").len(), 1);
    assert_eq!(template["Outputs"].as_object().unwrap().len(), 6);

    let assets = read_json(&outdir.join("TestCdkFastApiJwtStack.assets.json"));
    assert_eq!(assets["dockerImages"].as_object().unwrap().len(), 2);
}

#[test]
fn production_template_uses_unprefixed_names() {
    let root = tempfile::tempdir().unwrap();
    let mut base = StackConfig::default();
    base.images.directory = image_directory(root.path());

    let mut app = App::new(root.path().join("out"));
    app.create_stacks(&base, &[Environment::Production], &DeployTarget::default())
        .unwrap();
    app.synth().unwrap();

    let template = read_json(&root.path().join("out").join("CdkFastApiJwtStack.template.json"));
    let text = template.to_string();

    assert!(text.contains("\"tapestryworlds-s3-images-bucket\""));
    assert!(text.contains("\"tapestryworlds-service\""));
    assert!(!text.contains("production-"));
}

#[test]
fn missing_image_directory_fails_synthesis() {
    let root = tempfile::tempdir().unwrap();
    let mut base = StackConfig::default();
    base.images.directory = root.path().join("nope");

    let mut app = App::new(root.path().join("out"));
    app.create_stacks(&base, &[Environment::Test], &DeployTarget::default())
        .unwrap();

    assert!(app.synth().is_err());
}
