//! Execution policy: how much parallelism a run gets and how it is enforced.

use crate::ordering::TypeRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a bounded parallel phase enforces its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyStrategy {
    /// Admission gate: at most N group bodies start; each runs unimpeded
    /// once admitted.
    #[default]
    Conservative,
    /// Shared throttle: all groups start, but at most N continuations make
    /// progress at any instant.
    Aggressive,
}

impl fmt::Display for ConcurrencyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyStrategy::Conservative => write!(f, "conservative"),
            ConcurrencyStrategy::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for ConcurrencyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(ConcurrencyStrategy::Conservative),
            "aggressive" => Ok(ConcurrencyStrategy::Aggressive),
            other => Err(format!(
                "unknown strategy '{other}' (expected 'conservative' or 'aggressive')"
            )),
        }
    }
}

/// Scheduling defaults carried by the work-set definition itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSetDefaults {
    pub parallelism_disabled: bool,
    /// `0` means "resolve to the processor count"; negative means unbounded.
    pub max_concurrent_groups: i32,
    pub strategy: ConcurrencyStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_orderer: Option<TypeRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_orderer: Option<TypeRef>,
}

/// Caller-side overrides. `None` defers to the definition's defaults.
#[derive(Debug, Clone, Default)]
pub struct RunnerOverrides {
    pub parallelism_disabled: Option<bool>,
    pub max_concurrent_groups: Option<i32>,
    pub strategy: Option<ConcurrencyStrategy>,
}

/// The resolved, immutable policy for one run.
///
/// Built once by [`ExecutionOptions::resolve`]; the sentinel meanings of
/// `max_concurrent_groups` (`0` = processor count) are gone after that, so
/// every later read sees the same concrete numbers.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    parallelism_disabled: bool,
    max_concurrent_groups: i32,
    strategy: ConcurrencyStrategy,
    group_orderer: Option<TypeRef>,
    item_orderer: Option<TypeRef>,
}

impl ExecutionOptions {
    /// Merge definition defaults with caller overrides and pin the
    /// processor-count sentinel to a concrete value.
    pub fn resolve(defaults: &GroupSetDefaults, overrides: &RunnerOverrides) -> Self {
        let mut max_concurrent_groups = overrides
            .max_concurrent_groups
            .unwrap_or(defaults.max_concurrent_groups);
        if max_concurrent_groups == 0 {
            max_concurrent_groups = default_processor_count() as i32;
        }

        Self {
            parallelism_disabled: overrides
                .parallelism_disabled
                .unwrap_or(defaults.parallelism_disabled),
            max_concurrent_groups,
            strategy: overrides.strategy.unwrap_or(defaults.strategy),
            group_orderer: defaults.group_orderer.clone(),
            item_orderer: defaults.item_orderer.clone(),
        }
    }

    pub fn parallelism_disabled(&self) -> bool {
        self.parallelism_disabled
    }

    pub fn max_concurrent_groups(&self) -> i32 {
        self.max_concurrent_groups
    }

    pub fn strategy(&self) -> ConcurrencyStrategy {
        self.strategy
    }

    pub fn group_orderer(&self) -> Option<&TypeRef> {
        self.group_orderer.as_ref()
    }

    pub fn item_orderer(&self) -> Option<&TypeRef> {
        self.item_orderer.as_ref()
    }

    /// The concurrency limit as a bound, or `None` when unbounded.
    pub fn concurrency_bound(&self) -> Option<usize> {
        (self.max_concurrent_groups > 0).then_some(self.max_concurrent_groups as usize)
    }

    /// One-line description of the active policy, e.g. `parallel (4 threads)`.
    pub fn describe(&self) -> String {
        if self.parallelism_disabled {
            return "non-parallel".to_string();
        }

        let max = self.max_concurrent_groups;
        let mut threads = if max < 0 {
            "unlimited".to_string()
        } else {
            max.to_string()
        };
        threads.push_str(" thread");
        if max != 1 {
            threads.push('s');
        }
        if max > 0 && self.strategy == ConcurrencyStrategy::Aggressive {
            threads.push_str("/aggressive");
        }
        format!("parallel ({threads})")
    }
}

fn default_processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults_with_max(max: i32) -> GroupSetDefaults {
        GroupSetDefaults {
            max_concurrent_groups: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let defaults = GroupSetDefaults {
            parallelism_disabled: true,
            max_concurrent_groups: 2,
            strategy: ConcurrencyStrategy::Conservative,
            ..Default::default()
        };
        let overrides = RunnerOverrides {
            parallelism_disabled: Some(false),
            max_concurrent_groups: Some(8),
            strategy: Some(ConcurrencyStrategy::Aggressive),
        };

        let options = ExecutionOptions::resolve(&defaults, &overrides);
        assert!(!options.parallelism_disabled());
        assert_eq!(options.max_concurrent_groups(), 8);
        assert_eq!(options.strategy(), ConcurrencyStrategy::Aggressive);
    }

    #[test]
    fn test_unset_overrides_defer_to_defaults() {
        let defaults = GroupSetDefaults {
            max_concurrent_groups: 3,
            strategy: ConcurrencyStrategy::Aggressive,
            ..Default::default()
        };

        let options = ExecutionOptions::resolve(&defaults, &RunnerOverrides::default());
        assert_eq!(options.max_concurrent_groups(), 3);
        assert_eq!(options.strategy(), ConcurrencyStrategy::Aggressive);
    }

    #[test]
    fn test_zero_resolves_to_processor_count_once() {
        let options =
            ExecutionOptions::resolve(&defaults_with_max(0), &RunnerOverrides::default());
        let expected = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4) as i32;
        assert_eq!(options.max_concurrent_groups(), expected);
        assert!(options.max_concurrent_groups() > 0);

        // Resolution happened once; clones carry the pinned number.
        assert_eq!(options.clone().max_concurrent_groups(), expected);
    }

    #[test]
    fn test_negative_means_unbounded() {
        let options =
            ExecutionOptions::resolve(&defaults_with_max(-1), &RunnerOverrides::default());
        assert_eq!(options.concurrency_bound(), None);
        assert_eq!(
            ExecutionOptions::resolve(&defaults_with_max(5), &RunnerOverrides::default())
                .concurrency_bound(),
            Some(5)
        );
    }

    #[test]
    fn test_describe_formats() {
        let serial = ExecutionOptions::resolve(
            &GroupSetDefaults {
                parallelism_disabled: true,
                ..Default::default()
            },
            &RunnerOverrides::default(),
        );
        assert_eq!(serial.describe(), "non-parallel");

        let bounded =
            ExecutionOptions::resolve(&defaults_with_max(3), &RunnerOverrides::default());
        assert_eq!(bounded.describe(), "parallel (3 threads)");

        let single =
            ExecutionOptions::resolve(&defaults_with_max(1), &RunnerOverrides::default());
        assert_eq!(single.describe(), "parallel (1 thread)");

        let unbounded =
            ExecutionOptions::resolve(&defaults_with_max(-1), &RunnerOverrides::default());
        assert_eq!(unbounded.describe(), "parallel (unlimited threads)");

        let aggressive = ExecutionOptions::resolve(
            &defaults_with_max(4),
            &RunnerOverrides {
                strategy: Some(ConcurrencyStrategy::Aggressive),
                ..Default::default()
            },
        );
        assert_eq!(aggressive.describe(), "parallel (4 threads/aggressive)");

        // The aggressive marker only applies to bounded runs.
        let unbounded_aggressive = ExecutionOptions::resolve(
            &defaults_with_max(-1),
            &RunnerOverrides {
                strategy: Some(ConcurrencyStrategy::Aggressive),
                ..Default::default()
            },
        );
        assert_eq!(unbounded_aggressive.describe(), "parallel (unlimited threads)");
    }

    #[test]
    fn test_strategy_parse_round_trip() {
        assert_eq!(
            "conservative".parse::<ConcurrencyStrategy>().unwrap(),
            ConcurrencyStrategy::Conservative
        );
        assert_eq!(
            "Aggressive".parse::<ConcurrencyStrategy>().unwrap(),
            ConcurrencyStrategy::Aggressive
        );
        assert!("eager".parse::<ConcurrencyStrategy>().is_err());
        assert_eq!(ConcurrencyStrategy::Aggressive.to_string(), "aggressive");
    }
}
