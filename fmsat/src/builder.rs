//! Building configurations in parallel while they are produced.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{info, warn};

use crate::backend::Backend;
use crate::config::AnalysisConfig;
use crate::configuration::BuilderConfiguration;
use crate::count::{count_configurations, ConfigurationCount};
use crate::enumerate::{ConfigurationEnumerator, ConfigurationSink};
use crate::model::FeatureModel;
use crate::monitor::CancelFlag;
use crate::schedule::{BuildProgress, ConfigurationScheduler};
use crate::solver::{AnalysisError, BaseFormula, IncrementalSolver};

/// Builds a single configuration.
///
/// Called concurrently from all worker threads.
pub trait BuildWorker: Sync {
    fn build(&self, configuration: &BuilderConfiguration) -> Result<(), anyhow::Error>;
}

impl<F> BuildWorker for F
where
    F: Fn(&BuilderConfiguration) -> Result<(), anyhow::Error> + Sync,
{
    fn build(&self, configuration: &BuilderConfiguration) -> Result<(), anyhow::Error> {
        self(configuration)
    }
}

/// Where the configurations of a build run come from.
#[derive(Clone, Debug)]
pub enum BuildSource {
    /// Every valid configuration of the model.
    AllValid,
    /// A precomputed sample, e.g. a t-wise covering array.
    Sample(Vec<BuilderConfiguration>),
}

/// Feeds configurations of a feature model to a pool of build workers.
///
/// The calling thread produces configurations into a [`ConfigurationScheduler`] while the
/// workers pull from it. A builder performs a single run. Its progress can be observed and the
/// run canceled from other threads.
pub struct ConfigurationBuilder<'a> {
    model: &'a FeatureModel,
    backend: Arc<dyn Backend>,
    config: AnalysisConfig,
    cancel: CancelFlag,
    scheduler: ConfigurationScheduler,
    started: AtomicBool,
}

/// Ends production even when the producer unwinds, so that no worker waits forever.
struct FinishGuard<'a>(&'a ConfigurationScheduler);

impl<'a> Drop for FinishGuard<'a> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
        self.0.finish();
    }
}

/// Cancels the run when a worker unwinds, so that the producer does not wait for free space
/// forever.
struct CancelOnPanic<'a>(&'a ConfigurationScheduler);

impl<'a> Drop for CancelOnPanic<'a> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

impl<'a> ConfigurationBuilder<'a> {
    pub fn new(
        model: &'a FeatureModel,
        backend: Arc<dyn Backend>,
        config: AnalysisConfig,
    ) -> ConfigurationBuilder<'a> {
        let universe = model
            .concrete_features()
            .map(|feature| model.name(feature).to_owned())
            .collect();
        let cancel = CancelFlag::new();
        let scheduler =
            ConfigurationScheduler::from_config(&config, universe).with_cancel_flag(cancel.clone());
        ConfigurationBuilder {
            model,
            backend,
            config,
            cancel,
            scheduler,
            started: AtomicBool::new(false),
        }
    }

    /// Flag that cancels the run when set.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Cancels the run, waking up the producer and all workers.
    pub fn cancel(&self) {
        self.scheduler.cancel();
    }

    pub fn progress(&self) -> BuildProgress {
        self.scheduler.progress()
    }

    /// Produces the configurations of `source` and builds each of them with `worker`.
    ///
    /// Failed builds are counted, not propagated. Production errors cancel the run and are
    /// returned after all workers stopped. A panicking worker cancels the run and the panic is
    /// resumed on the calling thread once production has stopped.
    pub fn run(
        &self,
        source: BuildSource,
        worker: &dyn BuildWorker,
    ) -> Result<BuildProgress, AnalysisError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Configuration builder was already run");
            return Ok(self.progress());
        }

        let scheduler = &self.scheduler;
        let workers = self.config.worker_count();
        info!("Building with {} workers", workers);

        let produced = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| scope.spawn(move || build_loop(scheduler, worker)))
                .collect();

            let produced = {
                let _guard = FinishGuard(scheduler);
                let produced = self.produce(source);
                match &produced {
                    Err(_) => scheduler.cancel(),
                    Ok(()) if scheduler.is_buffer_first() && !scheduler.is_canceled() => {
                        scheduler.sort()
                    }
                    Ok(()) => (),
                }
                produced
            };

            for handle in handles {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
            }
            produced
        });

        let progress = self.progress();
        info!(
            "Built {} of {} configurations, {} failed{}",
            progress.built,
            progress.emitted,
            progress.failed,
            if progress.canceled { ", canceled" } else { "" }
        );
        produced.map(|()| progress)
    }

    fn produce(&self, source: BuildSource) -> Result<(), AnalysisError> {
        let target = self.config.target();
        match source {
            BuildSource::Sample(configurations) => {
                let limit = target.map_or(configurations.len(), |target| {
                    configurations.len().min(target as usize)
                });
                self.scheduler.set_expected(Some(limit as u64));
                for configuration in configurations.into_iter().take(limit) {
                    if !self.scheduler.add_configuration(configuration) {
                        break;
                    }
                }
                Ok(())
            }
            BuildSource::AllValid => {
                let base = Arc::new(self.model.base_formula(self.config.clause_limit)?);

                if self.config.count_first {
                    let solver = IncrementalSolver::new(self.backend.clone(), base.clone());
                    let projection: Vec<_> = self
                        .model
                        .concrete_features()
                        .map(|feature| feature.var())
                        .collect();
                    let count = count_configurations(
                        &solver,
                        &projection,
                        self.config.count_limit,
                        &self.cancel,
                    )?;
                    if let ConfigurationCount::Exact(count) = count {
                        let expected = target.map_or(count, |target| count.min(target));
                        self.scheduler.set_expected(Some(expected));
                    }
                }

                self.enumerate(base, target)
            }
        }
    }

    fn enumerate(&self, base: Arc<BaseFormula>, target: Option<u64>) -> Result<(), AnalysisError> {
        let solver = IncrementalSolver::new(self.backend.clone(), base);
        let mut sink = &self.scheduler;
        ConfigurationEnumerator::new(self.model, solver, &self.cancel)
            .with_target(target)
            .enumerate(&mut sink as &mut dyn ConfigurationSink)?;
        Ok(())
    }
}

fn build_loop(scheduler: &ConfigurationScheduler, worker: &dyn BuildWorker) {
    let _guard = CancelOnPanic(scheduler);
    while let Some(configuration) = scheduler.wait_configuration() {
        match worker.build(&configuration) {
            Ok(()) => scheduler.record_build(true),
            Err(err) => {
                warn!("Building configuration {} failed: {:#}", configuration.id(), err);
                scheduler.record_build(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::time::Duration;

    use anyhow::anyhow;
    use parking_lot::Mutex;

    use crate::backend::VarisatBackend;
    use crate::config::BuildOrder;
    use crate::model::GroupType;
    use crate::test::ScriptedBackend;

    fn config(workers: usize) -> AnalysisConfig {
        AnalysisConfig {
            workers,
            scheduler_capacity: 2,
            wait_interval_ms: 5,
            ..AnalysisConfig::default()
        }
    }

    fn succeed(_: &BuilderConfiguration) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn alternatives() -> FeatureModel {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        model.set_group(root, GroupType::Alternative);
        for name in ["A", "B", "C", "D", "E"].iter() {
            model.add_feature(root, *name).unwrap();
        }
        model
    }

    #[test]
    fn builds_every_valid_configuration() {
        let model = alternatives();
        let built = Mutex::new(vec![]);
        let builder = ConfigurationBuilder::new(&model, Arc::new(VarisatBackend), config(3));

        let worker = |configuration: &BuilderConfiguration| -> Result<(), anyhow::Error> {
            built.lock().push(configuration.to_string());
            Ok(())
        };
        let progress = builder.run(BuildSource::AllValid, &worker).unwrap();

        let mut built = built.into_inner();
        built.sort();
        assert_eq!(built, vec!["00001 A", "00002 B", "00003 C", "00004 D", "00005 E"]);
        assert_eq!(progress.emitted, 5);
        assert_eq!(progress.built, 5);
        assert!(progress.finished);
        assert!(!progress.canceled);
    }

    #[test]
    fn failed_builds_are_counted() {
        let model = alternatives();
        let sample = (1..=4)
            .map(|id| BuilderConfiguration::new(id, vec![format!("F{}", id)]))
            .collect();
        let builder = ConfigurationBuilder::new(&model, Arc::new(VarisatBackend), config(2));

        let worker = |configuration: &BuilderConfiguration| {
            if configuration.id() % 2 == 0 {
                Err(anyhow!("compiler error"))
            } else {
                Ok(())
            }
        };
        let progress = builder.run(BuildSource::Sample(sample), &worker).unwrap();

        assert_eq!(progress.expected, Some(4));
        assert_eq!((progress.built, progress.failed), (2, 2));
    }

    #[test]
    fn buffer_first_builds_in_sorted_order() {
        let model = alternatives();
        let sample = vec![
            BuilderConfiguration::new(1, vec!["A"]),
            BuilderConfiguration::new(2, vec!["A", "B"]),
            BuilderConfiguration::new(3, vec!["A", "B", "C"]),
            BuilderConfiguration::new(4, vec!["D"]),
        ];
        let config = AnalysisConfig {
            buffer_first: true,
            order: BuildOrder::Difference,
            ..config(1)
        };
        let order = Mutex::new(vec![]);
        let builder = ConfigurationBuilder::new(&model, Arc::new(VarisatBackend), config);

        let worker = |configuration: &BuilderConfiguration| -> Result<(), anyhow::Error> {
            order.lock().push(configuration.id());
            Ok(())
        };
        builder.run(BuildSource::Sample(sample), &worker).unwrap();

        assert_eq!(order.into_inner(), vec![3, 4, 1, 2]);
    }

    #[test]
    fn count_first_and_budget() {
        let model = alternatives();
        let config = AnalysisConfig {
            count_first: true,
            max_configurations: 3,
            ..config(2)
        };
        let builder = ConfigurationBuilder::new(&model, Arc::new(VarisatBackend), config);

        let progress = builder.run(BuildSource::AllValid, &succeed).unwrap();

        assert_eq!(progress.expected, Some(3));
        assert_eq!(progress.emitted, 3);
        assert_eq!(progress.built, 3);
    }

    #[test]
    fn unavailable_backend_aborts() {
        let model = alternatives();
        let builder =
            ConfigurationBuilder::new(&model, Arc::new(ScriptedBackend::unavailable()), config(2));

        let result = builder.run(BuildSource::AllValid, &succeed);

        assert!(matches!(result, Err(AnalysisError::Unavailable { .. })));
        assert!(builder.progress().canceled);
        assert_eq!(builder.progress().built, 0);
    }

    #[test]
    fn cancel_from_worker() {
        let model = alternatives();
        let builder = ConfigurationBuilder::new(&model, Arc::new(VarisatBackend), config(1));
        let cancel = builder.cancel_flag();

        let worker = |_: &BuilderConfiguration| -> Result<(), anyhow::Error> {
            cancel.cancel();
            thread::sleep(Duration::from_millis(10));
            Ok(())
        };
        let progress = builder.run(BuildSource::AllValid, &worker).unwrap();

        assert!(progress.canceled);
        assert!(progress.built < 5);
    }

    #[test]
    fn panicking_worker_cancels_the_run() {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let model = alternatives();
            let config = AnalysisConfig {
                scheduler_capacity: 1,
                ..config(1)
            };
            let builder = ConfigurationBuilder::new(&model, Arc::new(VarisatBackend), config);

            let worker = |_: &BuilderConfiguration| -> Result<(), anyhow::Error> {
                panic!("worker crashed")
            };
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                builder.run(BuildSource::AllValid, &worker)
            }));
            let _ = sender.send((result.is_err(), builder.progress()));
        });

        let (panicked, progress) = receiver
            .recv_timeout(Duration::from_secs(30))
            .expect("builder still running after its worker panicked");
        assert!(panicked);
        assert!(progress.canceled);
        assert!(progress.finished);
        assert_eq!(progress.built, 0);
    }
}
