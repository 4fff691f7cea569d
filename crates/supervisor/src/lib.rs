//! Keeps a fixed set of long-running units alive.
//!
//! Every unit runs in its own task under a watch loop. A unit that returns
//! an error, panics or returns at all before shutdown is restarted after a
//! capped exponential backoff. `shutdown` cancels every unit and waits for
//! them to finish.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn};

use common::Result;

pub type UnitFactory = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// How to (re)create a unit. The factory is called once per start with a
/// fresh token that is cancelled on shutdown.
#[derive(Clone)]
pub struct UnitSpec {
    pub name: String,
    factory: UnitFactory,
}

impl UnitSpec {
    pub fn new<F, Fut>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move |token| Box::pin(factory(token))),
        }
    }
}

/// Restart delay policy: doubles from `initial` up to `max`. A unit that
/// stayed up for at least `max` starts over from `initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { initial: Duration::from_millis(500), max: Duration::from_secs(30) }
    }
}

impl Backoff {
    pub fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Running,
    /// Waiting out the backoff after an abnormal exit.
    Restarting,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub state: UnitState,
    pub restart_count: u32,
}

struct Unit {
    name: String,
    handle: JoinHandle<()>,
    status: Arc<Mutex<UnitStatus>>,
}

pub struct Supervisor {
    token: CancellationToken,
    backoff: Backoff,
    grace: Duration,
    units: Mutex<Vec<Unit>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

impl Supervisor {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            token: CancellationToken::new(),
            backoff,
            grace: Duration::from_secs(10),
            units: Mutex::new(Vec::new()),
        }
    }

    /// How long `shutdown` waits for a unit before aborting it.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Launch `spec` under supervision.
    pub fn start(&self, spec: UnitSpec) {
        let status = Arc::new(Mutex::new(UnitStatus {
            name: spec.name.clone(),
            state: UnitState::Running,
            restart_count: 0,
        }));
        let name = spec.name.clone();
        let handle = tokio::spawn(watch(spec, self.token.clone(), self.backoff, status.clone()));
        info!(unit = %name, "Unit started");
        units(&self.units).push(Unit { name, handle, status });
    }

    /// Units currently running (not waiting to restart, not stopped).
    pub fn managed_count(&self) -> usize {
        units(&self.units)
            .iter()
            .filter(|u| lock(&u.status).state == UnitState::Running)
            .count()
    }

    pub fn status(&self) -> Vec<UnitStatus> {
        units(&self.units).iter().map(|u| lock(&u.status).clone()).collect()
    }

    /// Cancel every unit and wait for each to return. Units still running
    /// after the grace period are aborted.
    pub async fn shutdown(&self) {
        info!("Supervisor shutting down");
        self.token.cancel();
        let drained: Vec<Unit> = units(&self.units).drain(..).collect();
        for mut unit in drained {
            match tokio::time::timeout(self.grace, &mut unit.handle).await {
                Ok(Ok(())) => info!(unit = %unit.name, "Unit stopped"),
                Ok(Err(e)) => error!(unit = %unit.name, error = %e, "Unit watch task failed"),
                Err(_) => {
                    warn!(unit = %unit.name, grace_ms = self.grace.as_millis() as u64, "Unit ignored shutdown, aborting");
                    unit.handle.abort();
                }
            }
            lock(&unit.status).state = UnitState::Stopped;
        }
    }
}

async fn watch(spec: UnitSpec, token: CancellationToken, backoff: Backoff, status: Arc<Mutex<UnitStatus>>) {
    let mut delay = backoff.initial;
    loop {
        lock(&status).state = UnitState::Running;
        let started = Instant::now();
        let child = token.child_token();
        // Dropping the handle aborts the instance, so an aborted watch takes it down too.
        let outcome = AbortOnDropHandle::new(tokio::spawn((spec.factory)(child.clone()))).await;
        child.cancel();

        if token.is_cancelled() {
            if let Ok(Err(e)) = &outcome {
                warn!(unit = %spec.name, error = %e, "Unit returned an error during shutdown");
            }
            lock(&status).state = UnitState::Stopped;
            return;
        }

        match outcome {
            Ok(Ok(())) => warn!(unit = %spec.name, "Unit exited unexpectedly"),
            Ok(Err(e)) => error!(unit = %spec.name, error = %e, "Unit failed"),
            Err(e) if e.is_panic() => error!(unit = %spec.name, "Unit panicked"),
            Err(e) => error!(unit = %spec.name, error = %e, "Unit task cancelled"),
        }

        if started.elapsed() >= backoff.max {
            delay = backoff.initial;
        }
        let restarts = {
            let mut s = lock(&status);
            s.state = UnitState::Restarting;
            s.restart_count += 1;
            s.restart_count
        };
        info!(unit = %spec.name, restarts, delay_ms = delay.as_millis() as u64, "Restarting unit");

        tokio::select! {
            _ = token.cancelled() => {
                lock(&status).state = UnitState::Stopped;
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        delay = backoff.next(delay);
    }
}

fn lock(status: &Mutex<UnitStatus>) -> MutexGuard<'_, UnitStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

fn units(units: &Mutex<Vec<Unit>>) -> MutexGuard<'_, Vec<Unit>> {
    units.lock().unwrap_or_else(|e| e.into_inner())
}
