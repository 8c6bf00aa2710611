//! The engine: registry of systems, scenarios and jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use valicy_core::{RetirementPolicy, WidthGainPolicy};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::job::Job;
use crate::reaper::Reaper;
use crate::registry::{Scenario, System};
use crate::sync::{read, write};

type PolicyFactory = Arc<dyn Fn() -> Box<dyn RetirementPolicy> + Send + Sync>;

pub(crate) struct Registry {
    config: EngineConfig,
    policy: PolicyFactory,
    systems: RwLock<BTreeMap<String, Arc<System>>>,
    scenarios: RwLock<BTreeMap<String, Arc<Scenario>>>,
    jobs: RwLock<BTreeMap<(String, String, String), Job>>,
}

impl Registry {
    /// Abandon expired runs in every job.
    pub(crate) fn sweep(&self) -> usize {
        let jobs: Vec<Job> = read(&self.jobs).values().cloned().collect();
        jobs.iter().map(Job::reclaim_expired).sum()
    }
}

/// In-process validation engine.
///
/// Holds every system, scenario and job created through it. All methods take
/// `&self` and are safe to call from many threads.
///
/// ```ignore
/// let engine = Engine::new(EngineConfig::default())?;
/// let system = engine.get_or_create_system("system_0");
/// let scenario = engine.get_or_create_scenario("scenario_0");
/// scenario.configure(features, outputs)?;
/// let job = engine.get_or_create_job(&system, &scenario, "job_0")?;
/// for run in job.get_runs(2000) {
///     let run = run?;
///     let mut output = run.get_result_dict();
///     output.insert("output_0".into(), model(&run.get_test_features()));
///     run.send(&output)?;
/// }
/// ```
pub struct Engine {
    // Dropped first so the sweep thread is joined before the registry goes.
    reaper: Option<Reaper>,
    registry: Arc<Registry>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.registry.config)
            .field("background_sweep", &self.reaper.is_some())
            .finish()
    }
}

impl Engine {
    /// Create an engine with the default retirement policy
    /// ([`WidthGainPolicy`] with `retirement_min_width_gain`).
    pub fn new(config: EngineConfig) -> Result<Self> {
        let min_gain = config.retirement_min_width_gain;
        Self::with_retirement_policy(config, move || {
            Box::new(WidthGainPolicy::new(min_gain)) as Box<dyn RetirementPolicy>
        })
    }

    /// Create an engine whose jobs use a custom retirement policy. The
    /// factory is called once per job.
    pub fn with_retirement_policy<F>(config: EngineConfig, policy: F) -> Result<Self>
    where
        F: Fn() -> Box<dyn RetirementPolicy> + Send + Sync + 'static,
    {
        config.validate()?;
        let registry = Arc::new(Registry {
            config,
            policy: Arc::new(policy),
            systems: RwLock::new(BTreeMap::new()),
            scenarios: RwLock::new(BTreeMap::new()),
            jobs: RwLock::new(BTreeMap::new()),
        });

        let reaper = if registry.config.background_sweep {
            let reaper = Reaper::spawn(Arc::downgrade(&registry), registry.config.sweep_interval)
                .map_err(|e| EngineError::InvalidConfig {
                    field: "background_sweep",
                    reason: format!("failed to spawn reaper thread: {e}"),
                })?;
            Some(reaper)
        } else {
            None
        };

        tracing::info!(
            background_sweep = reaper.is_some(),
            seed = registry.config.seed,
            "engine started"
        );
        Ok(Self { reaper, registry })
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.registry.config
    }

    /// Get the system with this name, creating it if needed.
    pub fn get_or_create_system(&self, name: &str) -> Arc<System> {
        if let Some(system) = read(&self.registry.systems).get(name) {
            return Arc::clone(system);
        }
        let mut systems = write(&self.registry.systems);
        Arc::clone(
            systems
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(System::new(name))),
        )
    }

    /// Get the scenario with this name, creating it if needed.
    pub fn get_or_create_scenario(&self, name: &str) -> Arc<Scenario> {
        if let Some(scenario) = read(&self.registry.scenarios).get(name) {
            return Arc::clone(scenario);
        }
        let mut scenarios = write(&self.registry.scenarios);
        Arc::clone(
            scenarios
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Scenario::new(name))),
        )
    }

    /// Get the job with this name for `system` in `scenario`, creating it if
    /// needed.
    ///
    /// Creating the first job freezes the scenario's schema. Fails with
    /// [`EngineError::ScenarioNotConfigured`] if features or outputs are
    /// missing.
    pub fn get_or_create_job(&self, system: &System, scenario: &Scenario, name: &str) -> Result<Job> {
        let key = (
            system.name().to_string(),
            scenario.name().to_string(),
            name.to_string(),
        );
        if let Some(job) = read(&self.registry.jobs).get(&key) {
            return Ok(job.clone());
        }

        let mut jobs = write(&self.registry.jobs);
        if let Some(job) = jobs.get(&key) {
            return Ok(job.clone());
        }
        let schema = scenario.lock_schema()?;
        let job = Job::new(
            system.name(),
            scenario.name(),
            name,
            schema,
            &self.registry.config,
            (self.registry.policy)(),
        );
        jobs.insert(key, job.clone());
        Ok(job)
    }

    /// All systems, by name.
    pub fn systems(&self) -> Vec<Arc<System>> {
        read(&self.registry.systems).values().cloned().collect()
    }

    /// All scenarios, by name.
    pub fn scenarios(&self) -> Vec<Arc<Scenario>> {
        read(&self.registry.scenarios).values().cloned().collect()
    }

    /// All jobs.
    pub fn jobs(&self) -> Vec<Job> {
        read(&self.registry.jobs).values().cloned().collect()
    }

    /// Jobs created for a scenario.
    pub fn jobs_for(&self, scenario: &Scenario) -> Vec<Job> {
        read(&self.registry.jobs)
            .iter()
            .filter(|((_, s, _), _)| s == scenario.name())
            .map(|(_, job)| job.clone())
            .collect()
    }

    /// Sweep every job for expired runs now. Returns the number abandoned.
    pub fn reclaim_expired(&self) -> usize {
        self.registry.sweep()
    }
}
