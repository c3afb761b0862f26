//! Analysis configuration.
use std::time::Duration;

use serde::Deserialize;

use crate::schedule::OrderingPolicy;

/// Order in which buffered configurations are handed to build workers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOrder {
    Insertion,
    Difference,
    Interaction,
}

/// Declares [`AnalysisConfig`] together with [`AnalysisConfigUpdate`].
macro_rules! analysis_config {
    ($(
        $(#[doc = $doc:expr])+
        $field:ident: $ty:ty = $default:expr,
    )*) => {
        /// Configurable parameters of analyses and build runs.
        #[derive(Clone, Debug, PartialEq, Deserialize)]
        #[serde(default)]
        pub struct AnalysisConfig {
            $(
                $(#[doc = $doc])+
                pub $field: $ty,
            )*
        }

        impl Default for AnalysisConfig {
            fn default() -> AnalysisConfig {
                AnalysisConfig {
                    $($field: $default,)*
                }
            }
        }

        /// Partial update of an [`AnalysisConfig`].
        #[derive(Clone, Default, Debug, PartialEq, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct AnalysisConfigUpdate {
            $(
                $(#[doc = $doc])+
                pub $field: Option<$ty>,
            )*
        }

        impl AnalysisConfigUpdate {
            pub fn new() -> AnalysisConfigUpdate {
                AnalysisConfigUpdate::default()
            }

            /// Merges another update into this one. Values set in `other` take precedence.
            pub fn merge(&mut self, other: AnalysisConfigUpdate) {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field;
                    }
                )*
            }

            /// Overwrites all values of `config` that are set in this update.
            pub fn apply(&self, config: &mut AnalysisConfig) {
                $(
                    if let Some(value) = &self.$field {
                        config.$field = value.clone();
                    }
                )*
            }
        }

        impl AnalysisConfig {
            /// Describes all options.
            pub fn help() -> String {
                let mut help = String::new();
                $(
                    let lines: &[&str] = &[$($doc),+];
                    help.push_str(stringify!($field));
                    help.push_str(":");
                    for line in lines.iter() {
                        help.push_str(" ");
                        help.push_str(line.trim());
                    }
                    help.push_str("\n");
                )*
                help
            }
        }
    };
}

analysis_config! {
    /// Number of models kept to skip implication checks. (Default: 1000)
    solution_buffer: usize = 1000,

    /// Number of configurations buffered before the producer has to wait. (Default: 500)
    scheduler_capacity: usize = 500,

    /// Buffer all configurations and sort them before building any. (Default: false)
    buffer_first: bool = false,

    /// Build order: "insertion", "difference" or "interaction". (Default: "insertion")
    order: BuildOrder = BuildOrder::Insertion,

    /// Size of the feature combinations covered by the interaction order. (Default: 2)
    interaction_strength: usize = 2,

    /// Number of build workers, 0 for twice the available parallelism. (Default: 0)
    workers: usize = 0,

    /// Milliseconds a waiting producer or worker sleeps between cancellation checks.
    /// (Default: 1000)
    wait_interval_ms: u64 = 1000,

    /// Configurations counted before the count is reported as a lower bound. (Default: 1000000)
    count_limit: u64 = 1_000_000,

    /// Stop after this many configurations, 0 for no limit. (Default: 0)
    max_configurations: u64 = 0,

    /// Count the configurations before building to know the expected total. (Default: false)
    count_first: bool = false,

    /// Maximal number of clauses a single constraint may translate to. (Default: 100000)
    clause_limit: usize = 100_000,
}

impl AnalysisConfig {
    pub fn ordering_policy(&self) -> OrderingPolicy {
        match self.order {
            BuildOrder::Insertion => OrderingPolicy::Insertion,
            BuildOrder::Difference => OrderingPolicy::Difference,
            BuildOrder::Interaction => OrderingPolicy::Interaction {
                strength: self.interaction_strength,
            },
        }
    }

    /// Number of build workers to start.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|threads| threads.get() * 2)
            .unwrap_or(2)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    /// The budget ceiling for enumeration, if any.
    pub fn target(&self) -> Option<u64> {
        if self.max_configurations == 0 {
            None
        } else {
            Some(self.max_configurations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Error;

    #[test]
    fn defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.solution_buffer, 1000);
        assert_eq!(config.scheduler_capacity, 500);
        assert_eq!(config.ordering_policy(), OrderingPolicy::Insertion);
        assert_eq!(config.target(), None);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn merge_and_apply() -> Result<(), Error> {
        let mut update = AnalysisConfigUpdate::new();
        update.merge(toml::from_str("order = \"interaction\"\nworkers = 3")?);
        update.merge(toml::from_str("interaction_strength = 3")?);
        update.merge(toml::from_str("workers = 5")?);

        let mut config = AnalysisConfig::default();
        update.apply(&mut config);

        assert_eq!(config.workers, 5);
        assert_eq!(config.worker_count(), 5);
        assert_eq!(
            config.ordering_policy(),
            OrderingPolicy::Interaction { strength: 3 }
        );
        assert_eq!(config.solution_buffer, 1000);
        Ok(())
    }

    #[test]
    fn unknown_options_are_rejected() {
        assert!(toml::from_str::<AnalysisConfigUpdate>("solution_bufer = 3").is_err());
        assert!(toml::from_str::<AnalysisConfigUpdate>("order = \"random\"").is_err());
    }

    #[test]
    fn partial_config_file() -> Result<(), Error> {
        let config: AnalysisConfig = toml::from_str("buffer_first = true\nmax_configurations = 7")?;
        assert!(config.buffer_first);
        assert_eq!(config.target(), Some(7));
        assert_eq!(config.clause_limit, 100_000);
        Ok(())
    }

    #[test]
    fn help_lists_every_option() {
        let help = AnalysisConfig::help();
        assert!(help.contains("solution_buffer: Number of models kept"));
        assert!(help.contains("(Default: 1000)"));
        assert!(help.contains("wait_interval_ms: Milliseconds"));
        assert_eq!(help.lines().count(), 11);
    }
}
