//! Remote round-trip probing
//!
//! A probe opens an authenticated SSH session to one target, runs
//! `echo <marker>` and times the command from session-ready to completion.
//! Every failure mode (connect, auth, timeout, wrong output) is logged and
//! reported as the `-1` sentinel. Nothing propagates past `execute`.

use crate::error::ProbeFailure;
use crate::model::{Target, LATENCY_SENTINEL};
use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Result of one round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub latency_ms: i64,
    pub success: bool,
}

impl ProbeOutcome {
    pub fn measured(elapsed: Duration) -> Self {
        Self {
            latency_ms: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            success: true,
        }
    }

    pub fn failed() -> Self {
        Self { latency_ms: LATENCY_SENTINEL, success: false }
    }
}

/// One authenticated round-trip against a single target.
#[async_trait]
pub trait RemoteProbe: Send + Sync {
    async fn execute(&self, target: &Target, marker: &str) -> ProbeOutcome;
}

/// Probe timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Accepts any host key.
struct TrustOnFirstUse;

#[async_trait]
impl client::Handler for TrustOnFirstUse {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// SSH password-auth probe
pub struct SshProbe {
    settings: ProbeSettings,
    config: Arc<client::Config>,
}

impl SshProbe {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings, config: Arc::new(client::Config::default()) }
    }

    async fn round_trip(&self, target: &Target, marker: &str) -> Result<Duration, ProbeFailure> {
        let connect_timeout = self.settings.connect_timeout;
        let session = timeout(connect_timeout, self.open_session(target))
            .await
            .map_err(|_| ProbeFailure::ConnectTimeout(connect_timeout))??;

        let command_timeout = self.settings.command_timeout;
        let started = Instant::now();
        let output = timeout(command_timeout, run_echo(&session, marker))
            .await
            .map_err(|_| ProbeFailure::CommandTimeout(command_timeout));
        let elapsed = started.elapsed();

        if let Err(e) = session.disconnect(Disconnect::ByApplication, "", "en").await {
            debug!(host = %target.hostname, error = %e, "disconnect failed");
        }

        let output = output??;
        if !output.contains(marker) {
            return Err(ProbeFailure::MarkerMismatch { expected: marker.to_string(), output });
        }
        Ok(elapsed)
    }

    async fn open_session(&self, target: &Target) -> Result<client::Handle<TrustOnFirstUse>, ProbeFailure> {
        let mut session = client::connect(Arc::clone(&self.config), target.address(), TrustOnFirstUse)
            .await
            .map_err(ProbeFailure::Connect)?;

        let accepted = session
            .authenticate_password(target.username.as_str(), target.password.as_str())
            .await
            .map_err(ProbeFailure::Connect)?;
        if !accepted {
            return Err(ProbeFailure::AuthRejected(target.username.clone()));
        }
        Ok(session)
    }
}

impl Default for SshProbe {
    fn default() -> Self {
        Self::new(ProbeSettings::default())
    }
}

async fn run_echo(session: &client::Handle<TrustOnFirstUse>, marker: &str) -> Result<String, ProbeFailure> {
    let mut channel = session.channel_open_session().await.map_err(ProbeFailure::Session)?;
    channel
        .exec(true, format!("echo {marker}"))
        .await
        .map_err(ProbeFailure::Session)?;

    let mut stdout = Vec::new();
    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(&data[..]),
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }

    match exit_status {
        Some(code) if code != 0 => Err(ProbeFailure::ExitStatus(code)),
        _ => Ok(String::from_utf8_lossy(&stdout).into_owned()),
    }
}

#[async_trait]
impl RemoteProbe for SshProbe {
    async fn execute(&self, target: &Target, marker: &str) -> ProbeOutcome {
        match self.round_trip(target, marker).await {
            Ok(elapsed) => {
                let outcome = ProbeOutcome::measured(elapsed);
                debug!(host = %target.hostname, latency_ms = outcome.latency_ms, "probe ok");
                outcome
            }
            Err(e) => {
                warn!(host = %target.hostname, error = %e, "probe failed");
                ProbeOutcome::failed()
            }
        }
    }
}
