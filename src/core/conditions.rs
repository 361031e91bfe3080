//! Conditions: run-dependent objects served to processors.
//!
//! Each conditions object is served by one provider. Objects are cached
//! together with their interval of validity and re-requested from the
//! provider once the current event falls outside that interval.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::Parameters;
use crate::domain::{EventHeader, RunHeader};

use super::error::FrameworkError;

/// A conditions object of any type
pub type ConditionsObject = Arc<dyn Any + Send + Sync>;

/// Runs and data kinds a conditions object applies to
///
/// A negative run bound means "unbounded" on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalOfValidity {
    pub first_run: i32,
    pub last_run: i32,
    pub valid_for_data: bool,
    pub valid_for_mc: bool,
}

impl IntervalOfValidity {
    pub fn new(first_run: i32, last_run: i32, valid_for_data: bool, valid_for_mc: bool) -> Self {
        Self {
            first_run,
            last_run,
            valid_for_data,
            valid_for_mc,
        }
    }

    /// Valid for every run, data and simulation
    pub fn unlimited() -> Self {
        Self::new(-1, -1, true, true)
    }

    /// Does this interval cover the given event?
    pub fn valid_for(&self, context: &ConditionsContext) -> bool {
        let kind_ok = if context.is_real_data {
            self.valid_for_data
        } else {
            self.valid_for_mc
        };
        let after_first = self.first_run < 0 || context.run >= self.first_run;
        let before_last = self.last_run < 0 || context.run <= self.last_run;
        kind_ok && after_first && before_last
    }

    /// Do the two intervals share at least one run and data kind?
    pub fn overlaps(&self, other: &IntervalOfValidity) -> bool {
        let kinds = (self.valid_for_data && other.valid_for_data)
            || (self.valid_for_mc && other.valid_for_mc);
        if !kinds {
            return false;
        }

        let lo = |iov: &Self| if iov.first_run < 0 { i32::MIN } else { iov.first_run };
        let hi = |iov: &Self| if iov.last_run < 0 { i32::MAX } else { iov.last_run };
        lo(self) <= hi(other) && lo(other) <= hi(self)
    }
}

impl fmt::Display for IntervalOfValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |run: i32| {
            if run < 0 {
                "*".to_string()
            } else {
                run.to_string()
            }
        };
        write!(f, "runs [{}, {}]", bound(self.first_run), bound(self.last_run))?;
        match (self.valid_for_data, self.valid_for_mc) {
            (true, true) => write!(f, " data+mc"),
            (true, false) => write!(f, " data"),
            (false, true) => write!(f, " mc"),
            (false, false) => write!(f, " none"),
        }
    }
}

/// What the conditions system knows about the current event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionsContext {
    pub run: i32,
    pub is_real_data: bool,
}

impl From<&EventHeader> for ConditionsContext {
    fn from(header: &EventHeader) -> Self {
        Self {
            run: header.run,
            is_real_data: header.is_real_data,
        }
    }
}

/// Serves one conditions object
pub trait ConditionsProvider {
    /// Called once before any event is processed
    fn on_process_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called at each run transition, before processors see the run
    fn on_new_run(&mut self, _header: &mut RunHeader) -> Result<()> {
        Ok(())
    }

    /// Provide the object valid for the given event
    fn condition(
        &mut self,
        context: &ConditionsContext,
    ) -> Result<(ConditionsObject, IntervalOfValidity)>;
}

struct ProviderSlot {
    tag: String,
    provider: Box<dyn ConditionsProvider>,
}

struct CachedObject {
    object: ConditionsObject,
    iov: IntervalOfValidity,
}

/// All providers of a process and their cached objects
#[derive(Default)]
pub struct Conditions {
    providers: BTreeMap<String, ProviderSlot>,
    cache: HashMap<String, CachedObject>,
    context: ConditionsContext,
}

impl fmt::Debug for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditions")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("cached", &self.cache.keys().collect::<Vec<_>>())
            .field("context", &self.context)
            .finish()
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider for `object_name`
    pub fn add_provider(
        &mut self,
        object_name: &str,
        tag: &str,
        provider: Box<dyn ConditionsProvider>,
    ) -> Result<(), FrameworkError> {
        if self.providers.contains_key(object_name) {
            return Err(FrameworkError::DuplicateConditionsProvider(object_name.to_string()));
        }
        self.providers.insert(
            object_name.to_string(),
            ProviderSlot {
                tag: tag.to_string(),
                provider,
            },
        );
        Ok(())
    }

    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Tag of the provider serving `object_name`
    pub fn tag(&self, object_name: &str) -> Option<&str> {
        self.providers.get(object_name).map(|s| s.tag.as_str())
    }

    pub fn on_process_start(&mut self) -> Result<()> {
        for (name, slot) in self.providers.iter_mut() {
            slot.provider
                .on_process_start()
                .with_context(|| format!("Conditions provider '{}' failed to start", name))?;
        }
        Ok(())
    }

    pub fn on_new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        for (name, slot) in self.providers.iter_mut() {
            slot.provider
                .on_new_run(header)
                .with_context(|| format!("Conditions provider '{}' failed at new run", name))?;
        }
        Ok(())
    }

    /// Update the current event
    pub fn set_context(&mut self, context: ConditionsContext) {
        self.context = context;
    }

    pub fn context(&self) -> ConditionsContext {
        self.context
    }

    /// Get a conditions object valid for the current event
    pub fn get<T: Any + Send + Sync>(&mut self, object_name: &str) -> Result<Arc<T>> {
        let cached = self
            .cache
            .get(object_name)
            .filter(|c| c.iov.valid_for(&self.context))
            .map(|c| c.object.clone());

        let object = match cached {
            Some(object) => object,
            None => {
                let slot = self
                    .providers
                    .get_mut(object_name)
                    .ok_or_else(|| FrameworkError::MissingConditionsProvider(object_name.to_string()))?;
                let (object, iov) = slot
                    .provider
                    .condition(&self.context)
                    .with_context(|| format!("Failed to load conditions object '{}'", object_name))?;
                debug!(object = object_name, %iov, "Loaded conditions object");
                self.cache.insert(
                    object_name.to_string(),
                    CachedObject {
                        object: object.clone(),
                        iov,
                    },
                );
                object
            }
        };

        object.downcast::<T>().map_err(|_| {
            FrameworkError::ConditionsType {
                name: object_name.to_string(),
                expected: std::any::type_name::<T>(),
            }
            .into()
        })
    }
}

/// Seeds handed out by [`RandomNumberSeedService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomSeeds {
    master: u64,
}

impl RandomSeeds {
    pub fn new(master: u64) -> Self {
        Self { master }
    }

    pub fn master(&self) -> u64 {
        self.master
    }

    /// Seed for the named consumer: the master seed offset by a digest of
    /// the name, so each consumer gets an independent but reproducible seed
    pub fn seed(&self, name: &str) -> u64 {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        self.master.wrapping_add(u64::from_le_bytes(bytes))
    }
}

/// How the master seed is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// The run number
    Run,

    /// A configured value
    External,

    /// Wall-clock time at the first run
    Time,
}

/// Provides [`RandomSeeds`] derived from one master seed per process
#[derive(Debug)]
pub struct RandomNumberSeedService {
    mode: SeedMode,
    external_seed: Option<u64>,
    seeds: Option<Arc<RandomSeeds>>,
}

impl RandomNumberSeedService {
    pub const CLASS_NAME: &'static str = "framework::RandomNumberSeedService";
    pub const OBJECT_NAME: &'static str = "RandomNumberSeedService";

    /// Run header parameter the master seed is recorded under
    pub const MASTER_SEED_PARAMETER: &'static str = "RandomNumberMasterSeed[RandomNumberSeedService]";

    pub fn configure(parameters: &Parameters) -> Result<Self> {
        let mode: SeedMode = parameters.get_or("seed_mode", SeedMode::Run)?;
        let external_seed: Option<u64> = parameters.get_or("seed", None)?;
        if mode == SeedMode::External && external_seed.is_none() {
            return Err(FrameworkError::InvalidConfig(
                "seed_mode 'external' requires a 'seed' parameter".to_string(),
            )
            .into());
        }
        // the master seed is recorded as an int run header parameter
        if let Some(seed) = external_seed.filter(|s| *s > i32::MAX as u64) {
            return Err(FrameworkError::InvalidConfig(format!(
                "seed {} does not fit in a run header int parameter (max {})",
                seed,
                i32::MAX
            ))
            .into());
        }
        Ok(Self {
            mode,
            external_seed,
            seeds: None,
        })
    }
}

impl ConditionsProvider for RandomNumberSeedService {
    fn on_new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        if self.seeds.is_none() {
            let master = match self.mode {
                SeedMode::Run => header.run_number.max(0) as u64,
                SeedMode::External => self.external_seed.unwrap_or_default(),
                SeedMode::Time => Utc::now().timestamp().max(0) as u64,
            };
            info!(mode = ?self.mode, master, "Random number master seed chosen");
            self.seeds = Some(Arc::new(RandomSeeds::new(master)));
        }

        if let Some(seeds) = &self.seeds {
            let recorded = i32::try_from(seeds.master()).with_context(|| {
                format!("Master seed {} cannot be recorded in the run header", seeds.master())
            })?;
            header.set_int_parameter(Self::MASTER_SEED_PARAMETER, recorded);
        }
        Ok(())
    }

    fn condition(
        &mut self,
        context: &ConditionsContext,
    ) -> Result<(ConditionsObject, IntervalOfValidity)> {
        let seeds = self.seeds.clone().with_context(|| {
            format!(
                "Random seeds requested for run {} before any run started",
                context.run
            )
        })?;
        let object: ConditionsObject = seeds;
        Ok((object, IntervalOfValidity::unlimited()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Calibration {
        gain: f64,
    }

    /// Serves a different calibration for runs below and above 10
    struct SplitProvider;

    impl ConditionsProvider for SplitProvider {
        fn condition(
            &mut self,
            context: &ConditionsContext,
        ) -> Result<(ConditionsObject, IntervalOfValidity)> {
            let (gain, iov) = if context.run < 10 {
                (1.0, IntervalOfValidity::new(-1, 9, true, true))
            } else {
                (2.0, IntervalOfValidity::new(10, -1, true, true))
            };
            let object: ConditionsObject = Arc::new(Calibration { gain });
            Ok((object, iov))
        }
    }

    #[test]
    fn test_iov_validity() {
        let iov = IntervalOfValidity::new(5, 10, false, true);
        let mc = |run| ConditionsContext {
            run,
            is_real_data: false,
        };
        assert!(iov.valid_for(&mc(5)));
        assert!(iov.valid_for(&mc(10)));
        assert!(!iov.valid_for(&mc(11)));
        assert!(!iov.valid_for(&ConditionsContext {
            run: 7,
            is_real_data: true
        }));
        assert!(IntervalOfValidity::unlimited().valid_for(&mc(123)));
    }

    #[test]
    fn test_iov_overlaps() {
        let a = IntervalOfValidity::new(1, 10, true, true);
        let b = IntervalOfValidity::new(10, -1, true, false);
        let c = IntervalOfValidity::new(11, 20, true, true);
        let d = IntervalOfValidity::new(1, 10, false, true);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert!(!b.overlaps(&d));
    }

    #[test]
    fn test_cache_refreshes_outside_iov() {
        let mut conditions = Conditions::new();
        conditions
            .add_provider("EcalGain", "v1", Box::new(SplitProvider))
            .unwrap();

        conditions.set_context(ConditionsContext { run: 3, is_real_data: false });
        assert_eq!(conditions.get::<Calibration>("EcalGain").unwrap().gain, 1.0);
        conditions.set_context(ConditionsContext { run: 4, is_real_data: false });
        assert_eq!(conditions.get::<Calibration>("EcalGain").unwrap().gain, 1.0);
        conditions.set_context(ConditionsContext { run: 12, is_real_data: false });
        assert_eq!(conditions.get::<Calibration>("EcalGain").unwrap().gain, 2.0);
        assert_eq!(conditions.tag("EcalGain"), Some("v1"));
    }

    #[test]
    fn test_missing_and_mistyped_objects() {
        let mut conditions = Conditions::new();
        conditions
            .add_provider("EcalGain", "v1", Box::new(SplitProvider))
            .unwrap();

        let err = conditions.get::<Calibration>("HcalGain").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameworkError>(),
            Some(FrameworkError::MissingConditionsProvider(_))
        ));

        let err = conditions.get::<String>("EcalGain").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameworkError>(),
            Some(FrameworkError::ConditionsType { .. })
        ));

        assert!(conditions
            .add_provider("EcalGain", "v2", Box::new(SplitProvider))
            .is_err());
    }

    #[test]
    fn test_seed_service_run_mode() {
        let mut service = RandomNumberSeedService::configure(&Parameters::new()).unwrap();
        let mut header = RunHeader::new(42);
        service.on_new_run(&mut header).unwrap();
        assert_eq!(header.int_parameter(RandomNumberSeedService::MASTER_SEED_PARAMETER), Some(42));

        let (object, iov) = service.condition(&ConditionsContext::default()).unwrap();
        assert_eq!(iov, IntervalOfValidity::unlimited());
        let seeds = object.downcast::<RandomSeeds>().unwrap();
        assert_eq!(seeds.master(), 42);
        assert_eq!(seeds.seed("ecal"), RandomSeeds::new(42).seed("ecal"));
        assert_ne!(seeds.seed("ecal"), seeds.seed("hcal"));
    }

    #[test]
    fn test_seed_service_external_mode() {
        let params = Parameters::new()
            .with("seed_mode", "external")
            .with("seed", 1234);
        let mut service = RandomNumberSeedService::configure(&params).unwrap();
        let mut header = RunHeader::new(1);
        service.on_new_run(&mut header).unwrap();
        let (object, _) = service.condition(&ConditionsContext::default()).unwrap();
        assert_eq!(object.downcast::<RandomSeeds>().unwrap().master(), 1234);

        let missing = Parameters::new().with("seed_mode", "external");
        assert!(RandomNumberSeedService::configure(&missing).is_err());
    }

    #[test]
    fn test_external_seed_must_fit_the_run_header() {
        let largest = Parameters::new()
            .with("seed_mode", "external")
            .with("seed", i32::MAX);
        let mut service = RandomNumberSeedService::configure(&largest).unwrap();
        let mut header = RunHeader::new(1);
        service.on_new_run(&mut header).unwrap();
        assert_eq!(
            header.int_parameter(RandomNumberSeedService::MASTER_SEED_PARAMETER),
            Some(i32::MAX)
        );

        let too_large = Parameters::new()
            .with("seed_mode", "external")
            .with("seed", 5_000_000_000u64);
        let err = RandomNumberSeedService::configure(&too_large).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameworkError>(),
            Some(FrameworkError::InvalidConfig(_))
        ));
    }
}
