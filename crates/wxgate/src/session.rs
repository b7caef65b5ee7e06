//! Login state of the remote account and the watcher that tracks it.
//!
//! The watcher polls the remote's login check. The first success marks the
//! session logged in; a "not logged in" answer after that stops the serve
//! context with [`StopCause::LoggedOut`]. Failed checks (network errors,
//! timeouts) are not taken as a logout, but too many of them in a row while
//! logged in stop the context with [`StopCause::RemoteUnreachable`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use wxgate_protocol::GatewayStatus;

use crate::config::SessionConfig;
use crate::context::{ServeContext, StopCause};
use crate::remote::RemoteEndpoint;

/// Login state as seen by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggedOut,
    LoggedIn,
}

/// Lock-free login flag plus transition timestamps (unix millis, 0 = unset).
#[derive(Debug, Default)]
struct LoginCell {
    logged_in: AtomicBool,
    logged_in_at: AtomicI64,
    logged_out_at: AtomicI64,
}

impl LoginCell {
    fn state(&self) -> LoginState {
        if self.logged_in.load(Ordering::Acquire) {
            LoginState::LoggedIn
        } else {
            LoginState::LoggedOut
        }
    }

    fn set_logged_in(&self) {
        self.logged_in_at
            .store(Utc::now().timestamp_millis(), Ordering::Release);
        self.logged_in.store(true, Ordering::Release);
    }

    fn set_logged_out(&self) {
        self.logged_in.store(false, Ordering::Release);
        self.logged_out_at
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }
}

fn timestamp(millis: &AtomicI64) -> Option<DateTime<Utc>> {
    match millis.load(Ordering::Acquire) {
        0 => None,
        ms => DateTime::from_timestamp_millis(ms),
    }
}

/// Polling parameters for [`SessionController::spawn_login_watcher`].
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub check_timeout: Duration,
    /// Consecutive failed checks tolerated while logged in. `0` disables.
    pub unreachable_budget: u32,
}

impl From<&SessionConfig> for WatchConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            check_timeout: Duration::from_millis(config.check_timeout_ms),
            unreachable_budget: config.unreachable_budget,
        }
    }
}

/// Owns the login state and, through the watcher, the serve context's
/// logout transition.
#[derive(Clone)]
pub struct SessionController {
    remote: Arc<dyn RemoteEndpoint>,
    ctx: ServeContext,
    cell: Arc<LoginCell>,
}

impl SessionController {
    pub fn new(remote: Arc<dyn RemoteEndpoint>, ctx: ServeContext) -> Self {
        Self {
            remote,
            ctx,
            cell: Arc::new(LoginCell::default()),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.cell.state() == LoginState::LoggedIn
    }

    pub fn state(&self) -> LoginState {
        self.cell.state()
    }

    pub fn context(&self) -> &ServeContext {
        &self.ctx
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            logged_in: self.is_logged_in(),
            active: self.ctx.is_active(),
            stop_cause: self.ctx.cause().map(|cause| cause.to_string()),
            logged_in_at: timestamp(&self.cell.logged_in_at),
            logged_out_at: timestamp(&self.cell.logged_out_at),
        }
    }

    /// Start polling the remote login check until the context stops.
    pub fn spawn_login_watcher(&self, config: WatchConfig) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.watch(config).await })
    }

    async fn watch(self, config: WatchConfig) {
        debug!(interval = ?config.poll_interval, "Login watcher started");

        let mut interval = tokio::time::interval(config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.ctx.stopped() => break,
                _ = interval.tick() => {}
            }

            let check = tokio::time::timeout(config.check_timeout, self.remote.check_login());
            let outcome = match self.ctx.run(check).await {
                Ok(outcome) => outcome,
                Err(_) => break,
            };

            match outcome {
                Ok(Ok(true)) => {
                    failures = 0;
                    if !self.is_logged_in() {
                        self.cell.set_logged_in();
                        info!("Account logged in");
                    }
                }
                Ok(Ok(false)) => {
                    failures = 0;
                    if self.is_logged_in() {
                        self.cell.set_logged_out();
                        warn!("Account logged out, stopping gateway");
                        self.ctx.stop(StopCause::LoggedOut);
                        break;
                    }
                    debug!("Waiting for login");
                }
                Ok(Err(e)) => {
                    if self.record_failure(&mut failures, &config, &e.to_string()) {
                        break;
                    }
                }
                Err(_) => {
                    let reason = format!("login check timed out after {:?}", config.check_timeout);
                    if self.record_failure(&mut failures, &config, &reason) {
                        break;
                    }
                }
            }
        }

        debug!("Login watcher stopped");
    }

    /// Count a failed check. Returns `true` once the budget is exhausted and
    /// the context has been stopped.
    fn record_failure(&self, failures: &mut u32, config: &WatchConfig, reason: &str) -> bool {
        if !self.is_logged_in() {
            debug!(reason, "Login check failed before login");
            return false;
        }

        *failures += 1;
        warn!(failures = *failures, reason, "Login check failed");
        if config.unreachable_budget == 0 || *failures <= config.unreachable_budget {
            return false;
        }

        self.cell.set_logged_out();
        self.ctx.stop(StopCause::RemoteUnreachable(format!(
            "{} consecutive login checks failed, last: {}",
            *failures, reason
        )));
        true
    }
}
