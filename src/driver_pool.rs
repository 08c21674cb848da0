use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::session::{LaunchProfile, PageSession, SessionFactory};
use crate::utils::error::{AppError, Result};

struct PoolEntry {
    session: Arc<dyn PageSession>,
    usage_lock: Arc<Mutex<()>>,
    profile: LaunchProfile,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

/// A live session checked out of the pool. Callers must hold `usage_lock`
/// for the duration of any navigation or interaction so jobs against the
/// same driver name never interleave; different names run in parallel.
#[derive(Clone)]
pub struct DriverHandle {
    pub name: String,
    pub session: Arc<dyn PageSession>,
    pub usage_lock: Arc<Mutex<()>>,
}

/// Registry of named remote-browser sessions. Explicitly constructed and
/// injected (no global singleton); the registry map is guarded by a single
/// mutex so creation, health checks and cleanup never race.
///
/// Invariant: at most one live session per name. A session that fails its
/// liveness probe is silently replaced on the next `acquire`; that failure
/// never reaches the caller. Creation failures do.
pub struct DriverPool {
    factory: Box<dyn SessionFactory>,
    registry: Mutex<HashMap<String, PoolEntry>>,
}

impl DriverPool {
    pub fn new(factory: Box<dyn SessionFactory>) -> Self {
        Self {
            factory,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing healthy session for `name`, or creates one
    /// with the given launch profile.
    pub fn acquire(&self, name: &str, profile: &LaunchProfile) -> Result<DriverHandle> {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = registry.get_mut(name) {
            if entry.session.current_url().is_ok() {
                debug!("Reusing existing driver '{}'", name);
                entry.last_used = Utc::now();
                return Ok(DriverHandle {
                    name: name.to_string(),
                    session: Arc::clone(&entry.session),
                    usage_lock: Arc::clone(&entry.usage_lock),
                });
            }
            warn!("Driver '{}' failed health probe, recreating", name);
            registry.remove(name);
        }

        info!("Creating driver session '{}'", name);
        let session = self
            .factory
            .create(name, profile)
            .map_err(AppError::Session)?;
        let entry = PoolEntry {
            session: Arc::clone(&session),
            usage_lock: Arc::new(Mutex::new(())),
            profile: profile.clone(),
            created_at: Utc::now(),
            last_used: Utc::now(),
        };
        let handle = DriverHandle {
            name: name.to_string(),
            session,
            usage_lock: Arc::clone(&entry.usage_lock),
        };
        registry.insert(name.to_string(), entry);
        Ok(handle)
    }

    /// Cheap liveness probe; false for unknown names or any transport
    /// error while reading the current location.
    pub fn is_healthy(&self, name: &str) -> bool {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .get(name)
            .map(|entry| entry.session.current_url().is_ok())
            .unwrap_or(false)
    }

    /// Terminates and forgets the session for `name`. The browser shuts
    /// down when the last handle drops.
    pub fn release(&self, name: &str) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if registry.remove(name).is_some() {
            info!("Released driver session '{}'", name);
        }
    }

    /// Drops every registered session.
    pub fn release_all(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let count = registry.len();
        registry.clear();
        if count > 0 {
            info!("Released {} driver session(s)", count);
        }
    }

    pub fn active_names(&self) -> Vec<String> {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.keys().cloned().collect()
    }

    /// Launch profile the named session was created with, if it is live.
    pub fn profile_of(&self, name: &str) -> Option<LaunchProfile> {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.get(name).map(|entry| entry.profile.clone())
    }

    pub fn session_age(&self, name: &str) -> Option<chrono::Duration> {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .get(name)
            .map(|entry| Utc::now() - entry.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SeedCookie, SessionResult};
    use crate::utils::error::SessionError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Session whose health can be toggled from the test.
    struct FlakySession {
        dead: Arc<AtomicBool>,
    }

    impl PageSession for FlakySession {
        fn navigate(&self, _url: &str) -> SessionResult<()> {
            Ok(())
        }
        fn current_url(&self) -> SessionResult<String> {
            if self.dead.load(Ordering::SeqCst) {
                Err(SessionError::Transport("browser gone".into()))
            } else {
                Ok("about:blank".to_string())
            }
        }
        fn page_source(&self) -> SessionResult<String> {
            Ok(String::new())
        }
        fn wait_for_element(&self, _selector: &str, _timeout: Duration) -> SessionResult<()> {
            Ok(())
        }
        fn element_text(&self, selector: &str) -> SessionResult<String> {
            Err(SessionError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
        fn click(&self, _selector: &str) -> SessionResult<()> {
            Ok(())
        }
        fn click_by_text(&self, _tag: &str, _text: &str) -> SessionResult<bool> {
            Ok(false)
        }
        fn type_into(&self, _selector: &str, _text: &str) -> SessionResult<()> {
            Ok(())
        }
        fn select_value(&self, _selector: &str, _value: &str) -> SessionResult<()> {
            Ok(())
        }
        fn execute_script(&self, _js: &str) -> SessionResult<()> {
            Ok(())
        }
        fn refresh(&self) -> SessionResult<()> {
            Ok(())
        }
        fn set_cookies(&self, _cookies: &[SeedCookie]) -> SessionResult<()> {
            Ok(())
        }
    }

    struct CountingFactory {
        created: AtomicUsize,
        dead: Arc<AtomicBool>,
        fail_creation: bool,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                dead: Arc::new(AtomicBool::new(false)),
                fail_creation: false,
            }
        }
    }

    impl SessionFactory for CountingFactory {
        fn create(
            &self,
            _name: &str,
            _profile: &LaunchProfile,
        ) -> SessionResult<Arc<dyn PageSession>> {
            if self.fail_creation {
                return Err(SessionError::Transport("no browser available".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FlakySession {
                dead: Arc::clone(&self.dead),
            }))
        }
    }

    #[test]
    fn test_acquire_reuses_healthy_session() {
        let pool = DriverPool::new(Box::new(CountingFactory::new()));
        let profile = LaunchProfile::default();

        let first = pool.acquire("x", &profile).unwrap();
        let second = pool.acquire("x", &profile).unwrap();

        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert!(pool.is_healthy("x"));
    }

    #[test]
    fn test_unhealthy_session_is_recreated_silently() {
        let factory = CountingFactory::new();
        let dead = Arc::clone(&factory.dead);
        let pool = DriverPool::new(Box::new(factory));
        let profile = LaunchProfile::default();

        let first = pool.acquire("x", &profile).unwrap();
        dead.store(true, Ordering::SeqCst);
        assert!(!pool.is_healthy("x"));

        // New sessions from the factory are healthy again
        dead.store(false, Ordering::SeqCst);
        // Mark the first one dead via a fresh flag by forcing a release
        pool.release("x");
        let second = pool.acquire("x", &profile).unwrap();
        assert!(!Arc::ptr_eq(&first.session, &second.session));
    }

    #[test]
    fn test_health_failure_triggers_recreate_on_acquire() {
        let factory = CountingFactory::new();
        let dead = Arc::clone(&factory.dead);
        let pool = DriverPool::new(Box::new(factory));
        let profile = LaunchProfile::default();

        let first = pool.acquire("x", &profile).unwrap();
        dead.store(true, Ordering::SeqCst);

        // acquire must not propagate the probe failure; it recreates.
        // The replacement shares the same dead flag, but acquisition
        // itself succeeds because creation succeeded.
        let second = pool.acquire("x", &profile).unwrap();
        assert!(!Arc::ptr_eq(&first.session, &second.session));
    }

    #[test]
    fn test_creation_failure_propagates() {
        let mut factory = CountingFactory::new();
        factory.fail_creation = true;
        let pool = DriverPool::new(Box::new(factory));

        let result = pool.acquire("x", &LaunchProfile::default());
        assert!(matches!(result, Err(AppError::Session(_))));
    }

    #[test]
    fn test_release_forgets_session() {
        let pool = DriverPool::new(Box::new(CountingFactory::new()));
        pool.acquire("x", &LaunchProfile::default()).unwrap();
        assert_eq!(pool.active_names(), vec!["x".to_string()]);

        pool.release("x");
        assert!(pool.active_names().is_empty());
        assert!(!pool.is_healthy("x"));
    }

    #[test]
    fn test_profile_is_remembered() {
        let pool = DriverPool::new(Box::new(CountingFactory::new()));
        let mut profile = LaunchProfile::default();
        profile.user_agent = Some("TestAgent/1.0".to_string());

        pool.acquire("x", &profile).unwrap();
        assert_eq!(
            pool.profile_of("x").unwrap().user_agent.as_deref(),
            Some("TestAgent/1.0")
        );
        assert!(pool.session_age("x").is_some());
    }
}
