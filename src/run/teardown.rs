//! Scoped best-effort container teardown.
//!
//! Containers are registered the moment the run commits to them and
//! stopped in reverse registration order when the run exits, whether it
//! succeeded or bailed early. Stop failures are logged, never raised, and
//! each container is stopped at most once.

use super::log_streams;
use crate::docker::ContainerRuntime;
use std::time::Duration;
use tracing::info;

#[derive(Default)]
pub struct Teardown {
    entries: Vec<(String, Duration)>,
}

impl Teardown {
    pub fn new() -> Self {
        Teardown::default()
    }

    /// Registers `container` for teardown with the given stop grace period.
    /// Registering the same name twice keeps the first entry.
    pub fn register(&mut self, container: &str, grace: Duration) {
        if self.entries.iter().any(|(name, _)| name == container) {
            return;
        }
        self.entries.push((container.to_string(), grace));
    }

    #[cfg(test)]
    pub fn registered(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Stops every registered container, most recently registered first.
    pub async fn execute(self, runtime: &dyn ContainerRuntime) {
        for (container, grace) in self.entries.into_iter().rev() {
            info!("stopping and removing {}", container);
            let result = runtime.stop(&container, grace, true).await;
            log_streams(&result);
            match result.outcome {
                Ok(()) => info!("removed {}", container),
                Err(e) => info!("could not stop {}: {}", container, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_deduplicates() {
        let mut teardown = Teardown::new();
        teardown.register("service", Duration::ZERO);
        teardown.register("analyzer_0", Duration::ZERO);
        teardown.register("service", Duration::from_secs(10));
        assert_eq!(teardown.registered(), vec!["service", "analyzer_0"]);
    }
}
