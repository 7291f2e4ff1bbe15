//! Plan files: declarative group/item definitions backed by shell commands.
//!
//! A plan is YAML (or JSON, by extension) with scheduling defaults and a
//! list of groups. Each item either runs a shell command or is skipped
//! with a reason.

use crate::cancel::CancelSignal;
use crate::error::{Result, SchedulerError};
use crate::options::GroupSetDefaults;
use crate::work::{ItemOutcome, WorkGroup, WorkItem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Top-level plan document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunPlan {
    /// Scheduling defaults carried by the plan itself.
    #[serde(default)]
    pub options: GroupSetDefaults,
    #[serde(default)]
    pub groups: Vec<PlanGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanGroup {
    pub name: String,
    /// Keep this group out of the parallel phase.
    #[serde(default)]
    pub sequential: bool,
    #[serde(default)]
    pub items: Vec<PlanItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub name: String,
    /// Shell command, executed through `sh -c`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    /// Skip without running, recording this reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
    /// Wall-clock budget for the command, e.g. `30s` or `5m`.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl RunPlan {
    /// Load and validate a plan file. `.json` parses as JSON, anything else
    /// as YAML.
    pub fn load(path: &Path) -> Result<RunPlan> {
        let text = std::fs::read_to_string(path).map_err(|source| SchedulerError::PlanRead {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let plan: RunPlan = if is_json {
            serde_json::from_str(&text).map_err(|e| SchedulerError::PlanParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&text).map_err(|e| SchedulerError::PlanParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        plan.validate()?;
        debug!(groups = plan.groups.len(), "plan loaded");
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(SchedulerError::InvalidPlan(
                    "group with an empty name".to_string(),
                ));
            }
            for item in &group.items {
                if item.run.is_none() && item.skip.is_none() {
                    return Err(SchedulerError::InvalidPlan(format!(
                        "item '{}' in group '{}' has neither 'run' nor 'skip'",
                        item.name, group.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Split the plan into its scheduling defaults and schedulable groups.
    pub fn into_parts(self) -> (GroupSetDefaults, Vec<WorkGroup>) {
        let defaults = self.options;
        let groups = self
            .groups
            .into_iter()
            .map(|group| {
                let items = group
                    .items
                    .into_iter()
                    .map(|item| Arc::new(ShellWorkItem::from(item)) as Arc<dyn WorkItem>)
                    .collect();
                WorkGroup::with_items(group.name, items).sequential_only(group.sequential)
            })
            .collect();
        (defaults, groups)
    }
}

/// Work item that runs a shell command to completion.
///
/// Cancellation never interrupts a command already running; the scheduler
/// simply stops starting new items once the signal fires.
#[derive(Debug, Clone)]
pub struct ShellWorkItem {
    name: String,
    command: Option<String>,
    skip: Option<String>,
    timeout: Option<Duration>,
}

impl From<PlanItem> for ShellWorkItem {
    fn from(item: PlanItem) -> Self {
        Self {
            name: item.name,
            command: item.run,
            skip: item.skip,
            timeout: item.timeout,
        }
    }
}

#[async_trait]
impl WorkItem for ShellWorkItem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _cancel: &CancelSignal) -> ItemOutcome {
        if let Some(reason) = &self.skip {
            return ItemOutcome::Skipped(reason.clone());
        }
        let Some(command) = &self.command else {
            return ItemOutcome::Failed("item has no command".to_string());
        };

        debug!(item = %self.name, "running shell command");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => {
                    return ItemOutcome::Failed(format!("timed out after {limit:?}"));
                }
            },
            None => output.await,
        };

        match output {
            Ok(output) if output.status.success() => ItemOutcome::Passed,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = match output.status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                };
                ItemOutcome::Failed(format!("{detail}: {}", stderr.trim()))
            }
            Err(e) => ItemOutcome::Failed(format!("failed to spawn shell: {e}")),
        }
    }
}
