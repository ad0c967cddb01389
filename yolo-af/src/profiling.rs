//! The profiling toolkit that can be disabled in compile-time.

use crate::common::*;

#[cfg(feature = "profiling")]
lazy_static! {
    static ref PROFILING_CONFIG: ProfilingConfig = {
        match envy::prefixed("YOLOAF_").from_env() {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "failed to load profiling environment variables, fallback to default values: {:?}",
                    err
                );
                Default::default()
            }
        }
    };
    static ref REGISTERED_TIMINGS: dashmap::DashSet<&'static str> = dashmap::DashSet::new();
}

/// Read from `YOLOAF_PROFILING_WHITELIST`, a comma separated list of timing
/// names to report. All timings are reported when it is unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub profiling_whitelist: Option<HashSet<String>>,
}

#[cfg(feature = "profiling")]
#[derive(Debug)]
pub struct Timing {
    name: &'static str,
    instant: Instant,
    elapsed: Vec<(&'static str, Duration)>,
}

#[cfg(not(feature = "profiling"))]
#[derive(Debug)]
pub struct Timing;

impl Timing {
    pub fn new(name: &'static str) -> Self {
        #[cfg(feature = "profiling")]
        {
            if REGISTERED_TIMINGS.insert(name) {
                info!("registered timing profile '{}'", name);
            }

            Self {
                name,
                instant: Instant::now(),
                elapsed: vec![],
            }
        }

        #[cfg(not(feature = "profiling"))]
        {
            let _ = name;
            Self
        }
    }

    pub fn add_event(&mut self, name: &'static str) {
        #[cfg(feature = "profiling")]
        {
            self.elapsed.push((name, self.instant.elapsed()));
            self.instant = Instant::now();
        }

        #[cfg(not(feature = "profiling"))]
        let _ = name;
    }

    pub fn report(&self) {
        #[cfg(feature = "profiling")]
        {
            let can_report = PROFILING_CONFIG
                .profiling_whitelist
                .as_ref()
                .map(|whitelist| whitelist.contains(self.name))
                .unwrap_or(true);

            if can_report {
                info!("profiling report for '{}'", self.name);
                self.elapsed.iter().for_each(|(name, elapsed)| {
                    info!("- {}\t{:?}", name, elapsed);
                });
            }
        }
    }
}
