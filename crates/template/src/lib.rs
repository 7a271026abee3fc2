use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const OPEN_CIDR: &str = "0.0.0.0/0";
const ADMIN_PORTS: [i64; 2] = [22, 3389];

/// Result of one check stage for one template file.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub valid: bool,
    pub message: String,
}

impl CheckOutcome {
    fn pass(message: impl Into<String>) -> Self {
        Self { valid: true, message: message.into() }
    }
    fn fail(message: impl Into<String>) -> Self {
        Self { valid: false, message: message.into() }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("AWS credentials not configured")]
    MissingCredentials,
    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Remote "validate structured document" collaborator.
#[async_trait]
pub trait RemoteValidator: Send + Sync {
    async fn validate(&self, template_body: &str) -> Result<(), RemoteError>;
}

/// Production validator backed by the CloudFormation ValidateTemplate API.
pub struct CfnValidator {
    client: aws_sdk_cloudformation::Client,
}

impl CfnValidator {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteValidator for CfnValidator {
    async fn validate(&self, template_body: &str) -> Result<(), RemoteError> {
        use aws_sdk_cloudformation::error::ProvideErrorMetadata;
        match self.client.validate_template().template_body(template_body).send().await {
            Ok(_) => Ok(()),
            Err(err) => match err.as_service_error() {
                Some(svc) => Err(RemoteError::Rejected {
                    code: svc.code().unwrap_or("Unknown").to_string(),
                    message: svc.message().unwrap_or("no message").to_string(),
                }),
                None => Err(RemoteError::Transport(err.to_string())),
            },
        }
    }
}

/// Report for one input file. Syntax failure leaves `remote` unset; remote
/// failure leaves `issues` empty. Security issues are warnings and never fail
/// the file.
#[derive(Debug)]
pub struct TemplateReport {
    pub path: PathBuf,
    pub syntax: CheckOutcome,
    pub remote: Option<CheckOutcome>,
    pub issues: Vec<String>,
}

impl TemplateReport {
    pub fn passed(&self) -> bool {
        self.syntax.valid && self.remote.as_ref().map_or(false, |r| r.valid)
    }
}

pub fn check_syntax(path: &Path) -> CheckOutcome {
    match std::fs::read_to_string(path) {
        Ok(body) => match serde_yaml::from_str::<serde_yaml::Value>(&body) {
            Ok(_) => CheckOutcome::pass("valid YAML syntax"),
            Err(err) => CheckOutcome::fail(format!("YAML syntax error: {err}")),
        },
        Err(err) => CheckOutcome::fail(format!("error reading file: {err}")),
    }
}

pub async fn check_remote(validator: &dyn RemoteValidator, path: &Path) -> CheckOutcome {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(err) => return CheckOutcome::fail(format!("error reading file: {err}")),
    };
    match validator.validate(&body).await {
        Ok(()) => CheckOutcome::pass("valid CloudFormation template"),
        Err(RemoteError::MissingCredentials) => CheckOutcome::fail("AWS credentials not configured"),
        Err(RemoteError::Rejected { code, message }) => {
            CheckOutcome::fail(format!("CloudFormation validation error ({code}): {message}"))
        }
        Err(RemoteError::Transport(msg)) => CheckOutcome::fail(format!("unexpected error: {msg}")),
    }
}

// Template schema for the security walk. Only the keys the rules probe are
// typed; everything else is ignored. Absence of an optional block is the rule
// signal.
#[derive(Debug, Deserialize)]
struct Template {
    #[serde(rename = "Resources", default)]
    resources: BTreeMap<String, Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "Type", default)]
    type_name: String,
    #[serde(rename = "Properties", default)]
    properties: serde_yaml::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BucketProperties {
    #[serde(rename = "PublicAccessBlockConfiguration")]
    public_access_block: Option<serde_yaml::Value>,
    #[serde(rename = "BucketEncryption")]
    encryption: Option<serde_yaml::Value>,
    #[serde(rename = "VersioningConfiguration")]
    versioning: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecurityGroupProperties {
    #[serde(rename = "SecurityGroupIngress")]
    ingress: Vec<IngressRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IngressRule {
    #[serde(rename = "CidrIp")]
    cidr_ip: Option<String>,
    #[serde(rename = "FromPort")]
    from_port: Option<i64>,
}

/// Walks `Resources` and applies the fixed security rules. Any parse error is
/// folded into a single issue string; this never fails the file.
pub fn security_issues(path: &Path) -> Vec<String> {
    match walk_resources(path) {
        Ok(issues) => issues,
        Err(err) => vec![format!("error checking security rules: {err}")],
    }
}

fn walk_resources(path: &Path) -> Result<Vec<String>> {
    let body = std::fs::read_to_string(path)?;
    let template: Template = serde_yaml::from_str(&body)?;
    let mut issues = Vec::new();
    for (name, resource) in &template.resources {
        match resource.type_name.as_str() {
            "AWS::S3::Bucket" => {
                let props: BucketProperties = typed_properties(&resource.properties)?;
                if props.public_access_block.is_none() {
                    issues.push(format!("{name}: Missing PublicAccessBlockConfiguration"));
                }
                if props.encryption.is_none() {
                    issues.push(format!("{name}: Missing BucketEncryption"));
                }
                if props.versioning.is_none() {
                    issues.push(format!("{name}: Missing VersioningConfiguration"));
                }
            }
            "AWS::EC2::SecurityGroup" => {
                let props: SecurityGroupProperties = typed_properties(&resource.properties)?;
                for rule in &props.ingress {
                    if rule.cidr_ip.as_deref() != Some(OPEN_CIDR) {
                        continue;
                    }
                    if let Some(port) = rule.from_port {
                        if ADMIN_PORTS.contains(&port) {
                            issues.push(format!("{name}: Allows {port} from 0.0.0.0/0"));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(issues)
}

fn typed_properties<T>(value: &serde_yaml::Value) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_value(value.clone())?)
}

/// Full per-file pipeline: syntax, then remote validation, then security
/// rules, short-circuiting on the first failed stage.
pub async fn check_template(validator: &dyn RemoteValidator, path: &Path) -> TemplateReport {
    let syntax = check_syntax(path);
    if !syntax.valid {
        return TemplateReport { path: path.to_path_buf(), syntax, remote: None, issues: Vec::new() };
    }
    let remote = check_remote(validator, path).await;
    let issues = if remote.valid { security_issues(path) } else { Vec::new() };
    TemplateReport { path: path.to_path_buf(), syntax, remote: Some(remote), issues }
}

/// Resolves the CLI target to the list of template files to check: the file
/// itself, or a recursive walk filtered to .yml/.yaml.
pub fn collect_templates(target: &Path) -> Result<Vec<PathBuf>> {
    if target.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }
    if target.is_dir() {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(target)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(path.extension().and_then(|ext| ext.to_str()), Some("yml") | Some("yaml"))
            })
            .collect();
        files.sort();
        return Ok(files);
    }
    anyhow::bail!("{} is not a valid file or directory", target.display())
}
