/*!
Sonde scriptée pour tests sans hôtes SSH

Remplace SshProbe : chaque hostname reçoit une réponse programmée (latence,
échec, délai ou panique). Tous les appels sont enregistrés pour vérifier
qu'aucune I/O n'a eu lieu ou que le marker est partagé par le batch.
*/

use async_trait::async_trait;
use edgepick_core::clock::Clock;
use edgepick_core::model::Target;
use edgepick_core::probe::{ProbeOutcome, RemoteProbe};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
enum Scripted {
    Reply { latency_ms: i64, delay: Duration },
    Fail { delay: Duration },
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCall {
    pub hostname: String,
    pub marker: String,
}

/// Sonde mock, les hôtes non scriptés échouent
#[derive(Clone, Default)]
pub struct MockProbe {
    script: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<ProbeCall>>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, host: &str, step: Scripted) -> Self {
        self.script.lock().insert(host.to_string(), step);
        self
    }

    pub fn succeed(self, host: &str, latency_ms: i64) -> Self {
        self.script(host, Scripted::Reply { latency_ms, delay: Duration::ZERO })
    }

    /// Répond après `delay` : permet d'inverser l'ordre de complétion
    pub fn succeed_after(self, host: &str, latency_ms: i64, delay: Duration) -> Self {
        self.script(host, Scripted::Reply { latency_ms, delay })
    }

    pub fn fail(self, host: &str) -> Self {
        self.script(host, Scripted::Fail { delay: Duration::ZERO })
    }

    pub fn fail_after(self, host: &str, delay: Duration) -> Self {
        self.script(host, Scripted::Fail { delay })
    }

    /// Le worker meurt sans rapporter de résultat
    pub fn panic_on(self, host: &str) -> Self {
        self.script(host, Scripted::Panic)
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn shared(&self) -> Arc<dyn RemoteProbe> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl RemoteProbe for MockProbe {
    async fn execute(&self, target: &Target, marker: &str) -> ProbeOutcome {
        self.calls.lock().push(ProbeCall {
            hostname: target.hostname.clone(),
            marker: marker.to_string(),
        });
        let step = self.script.lock().get(&target.hostname).cloned();
        tracing::debug!(host = %target.hostname, ?step, "[MOCK] probe");

        match step {
            Some(Scripted::Reply { latency_ms, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                ProbeOutcome { latency_ms, success: true }
            }
            Some(Scripted::Fail { delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                ProbeOutcome::failed()
            }
            Some(Scripted::Panic) => panic!("scripted probe panic for {}", target.hostname),
            None => ProbeOutcome::failed(),
        }
    }
}

/// Horloge figée, avançable à la main
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn at(now: OffsetDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::target;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_scripted_replies() {
        let probe = MockProbe::new().succeed("a", 12).fail("b");

        assert_eq!(probe.execute(&target("a"), "m").await, ProbeOutcome { latency_ms: 12, success: true });
        assert_eq!(probe.execute(&target("b"), "m").await, ProbeOutcome::failed());
        assert_eq!(probe.execute(&target("unscripted"), "m").await, ProbeOutcome::failed());

        let hosts: Vec<String> = probe.calls().into_iter().map(|c| c.hostname).collect();
        assert_eq!(hosts, vec!["a", "b", "unscripted"]);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::at(datetime!(2024-05-01 12:00:00 UTC));
        clock.advance(time::Duration::minutes(5));
        assert_eq!(clock.now(), datetime!(2024-05-01 12:05:00 UTC));
    }
}
