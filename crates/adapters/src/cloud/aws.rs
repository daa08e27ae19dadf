// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance directory backed by the `aws` command line tool

use super::{CloudError, InstanceDirectory};
use crate::command::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use async_trait::async_trait;
use fence_core::{InstanceId, InstanceRecord, InstanceState};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// How to reach the EC2 API through the CLI.
///
/// Credentials are resolved by the CLI itself (environment, profile or
/// instance role).
#[derive(Debug, Clone)]
pub struct AwsCliConfig {
    pub aws: String,
    pub region: String,
    pub profile: Option<String>,
    /// Only instances carrying every one of these tags are listed
    pub tags: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl Default for AwsCliConfig {
    fn default() -> Self {
        Self {
            aws: "aws".to_string(),
            region: "eu-west-1".to_string(),
            profile: None,
            tags: BTreeMap::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    instance_id: String,
    #[serde(default)]
    private_ip_address: Option<String>,
    state: Ec2State,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2State {
    name: String,
}

impl From<Ec2Instance> for InstanceRecord {
    fn from(instance: Ec2Instance) -> Self {
        let address = instance.private_ip_address.as_deref().and_then(|raw| {
            raw.parse::<Ipv4Addr>()
                .map_err(|_| {
                    tracing::warn!(
                        instance = %instance.instance_id,
                        address = raw,
                        "ignoring unparseable private address"
                    )
                })
                .ok()
        });
        InstanceRecord::new(
            instance.instance_id,
            address,
            InstanceState::from_cloud_name(&instance.state.name),
        )
    }
}

/// Parse `aws ec2 describe-instances --output json`
pub(crate) fn parse_instances(output: &str) -> Result<Vec<InstanceRecord>, CloudError> {
    let parsed: DescribeInstancesOutput = serde_json::from_str(output.trim())?;
    Ok(parsed
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(InstanceRecord::from)
        .collect())
}

/// EC2 directory driven through the AWS CLI
#[derive(Clone)]
pub struct AwsCliDirectory<R> {
    runner: R,
    config: AwsCliConfig,
}

impl<R: CommandRunner> AwsCliDirectory<R> {
    pub fn new(runner: R, config: AwsCliConfig) -> Self {
        Self { runner, config }
    }

    fn base_args(&self, subcommand: &str) -> Vec<String> {
        let mut args = vec![
            "ec2".to_string(),
            subcommand.to_string(),
            "--region".to_string(),
            self.config.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(profile) = &self.config.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<String, CloudError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(self
            .runner
            .execute(self.config.timeout, &self.config.aws, &args)
            .await?)
    }

    async fn describe(&self, state: Option<&str>) -> Result<Vec<InstanceRecord>, CloudError> {
        let mut args = self.base_args("describe-instances");
        let mut filters: Vec<String> = self
            .config
            .tags
            .iter()
            .map(|(key, value)| format!("Name=tag:{},Values={}", key, value))
            .collect();
        if let Some(state) = state {
            filters.push(format!("Name=instance-state-name,Values={}", state));
        }
        if !filters.is_empty() {
            args.push("--filters".to_string());
            args.extend(filters);
        }

        let output = self.run(args).await?;
        let instances = parse_instances(&output)?;
        tracing::trace!(count = instances.len(), state, "described instances");
        Ok(instances)
    }
}

#[async_trait]
impl<R: CommandRunner> InstanceDirectory for AwsCliDirectory<R> {
    async fn list_all(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        self.describe(None).await
    }

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        self.describe(Some("running")).await
    }

    async fn list_terminated(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        self.describe(Some("terminated")).await
    }

    async fn exists(&self, id: &InstanceId) -> Result<bool, CloudError> {
        Ok(self.list_all().await?.iter().any(|i| &i.id == id))
    }

    async fn terminate(&self, id: &InstanceId) -> Result<(), CloudError> {
        tracing::info!(instance = %id, region = %self.config.region, "terminating instance");
        if !self.exists(id).await? {
            return Err(CloudError::NotFound(id.clone()));
        }
        let mut args = self.base_args("terminate-instances");
        args.push("--instance-ids".to_string());
        args.push(id.to_string());
        self.run(args).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;
