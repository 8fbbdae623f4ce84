//! Scripted collaborators for driving the supervision loops on virtual time.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{CommandError, ConnectError};
use crate::power::{PowerMonitor, PowerSource};
use crate::probe::Prober;
use crate::remote::{RemoteSession, RemoteTransport};
use crate::status::StatusHandle;
use crate::supervisor::{Collaborators, RemoteCommands, SupervisionContext};
use crate::target::{SupervisedTarget, Timings};
use crate::wol::{MacAddress, WakeTrigger};

pub const SHUTDOWN: &str = "systemctl poweroff";
pub const STATS: &str = "bd-client";

pub fn timings() -> Timings {
    Timings {
        ping_attempts: 4,
        wake_interval: Duration::from_secs(10),
        connect_retry_limit: 5,
        connect_retry_interval: Duration::from_secs(10),
        power_poll: Duration::from_secs(5),
        stats_poll: Duration::from_secs(10),
        grace_period: Duration::from_secs(240),
        countdown_poll: Duration::from_secs(1),
        shutdown_settle: Duration::from_secs(20),
    }
}

pub fn target() -> SupervisedTarget {
    SupervisedTarget {
        host: "nas".to_string(),
        address: "192.168.1.20".parse().unwrap(),
        mac: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
        timings: timings(),
    }
}

/// Power source as a function of virtual time since construction.
pub struct TimedPower {
    start: Instant,
    source_at: Box<dyn Fn(Duration) -> PowerSource + Send + Sync>,
    pub last: Arc<Mutex<Option<PowerSource>>>,
}

impl TimedPower {
    pub fn new(source_at: impl Fn(Duration) -> PowerSource + Send + Sync + 'static) -> Self {
        Self {
            start: Instant::now(),
            source_at: Box::new(source_at),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn always(source: PowerSource) -> Self {
        Self::new(move |_| source)
    }
}

#[async_trait]
impl PowerMonitor for TimedPower {
    async fn current_source(&self) -> anyhow::Result<PowerSource> {
        let source = (self.source_at)(self.start.elapsed());
        *self.last.lock().unwrap() = Some(source);
        Ok(source)
    }
}

/// Power source replayed call by call; the last entry repeats.
pub struct ScriptedPower {
    script: Mutex<VecDeque<PowerSource>>,
    pub last: Arc<Mutex<Option<PowerSource>>>,
}

impl ScriptedPower {
    pub fn new(script: impl IntoIterator<Item = PowerSource>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl PowerMonitor for ScriptedPower {
    async fn current_source(&self) -> anyhow::Result<PowerSource> {
        let mut script = self.script.lock().unwrap();
        let source = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            *script.front().unwrap_or(&PowerSource::Mains)
        };
        *self.last.lock().unwrap() = Some(source);
        Ok(source)
    }
}

pub struct BrokenPower;

#[async_trait]
impl PowerMonitor for BrokenPower {
    async fn current_source(&self) -> anyhow::Result<PowerSource> {
        Err(anyhow::anyhow!("power_supply class unreadable"))
    }
}

/// Replays probe results, then answers `fallback` forever.
pub struct ScriptedProber {
    script: Mutex<VecDeque<bool>>,
    fallback: Box<dyn Fn(Duration) -> bool + Send + Sync>,
    start: Instant,
    pub calls: Arc<Mutex<Vec<Duration>>>,
}

impl ScriptedProber {
    pub fn new(script: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self::with_fallback(script, move |_| fallback)
    }

    pub fn with_fallback(
        script: impl IntoIterator<Item = bool>,
        fallback: impl Fn(Duration) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Box::new(fallback),
            start: Instant::now(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _address: IpAddr, _attempts: u32) -> bool {
        let elapsed = self.start.elapsed();
        self.calls.lock().unwrap().push(elapsed);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| (self.fallback)(elapsed))
    }
}

/// Records the power source the supervisor last observed at each wake.
pub struct RecordingWaker {
    power_seen: Arc<Mutex<Option<PowerSource>>>,
    pub wakes: Arc<Mutex<Vec<Option<PowerSource>>>>,
}

impl RecordingWaker {
    pub fn new(power_seen: Arc<Mutex<Option<PowerSource>>>) -> Self {
        Self {
            power_seen,
            wakes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl WakeTrigger for RecordingWaker {
    async fn wake(&self, _mac: MacAddress) {
        let seen = *self.power_seen.lock().unwrap();
        self.wakes.lock().unwrap().push(seen);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stats {
    Json(&'static str),
    ChannelError,
}

/// Everything the fake remote side observed.
#[derive(Default)]
pub struct Journal {
    pub connects: Vec<Duration>,
    pub commands: Vec<(Duration, String)>,
    pub closes: Vec<Duration>,
    pub alive_checks: Vec<Duration>,
}

impl Journal {
    pub fn shutdowns(&self) -> Vec<Duration> {
        self.commands.iter().filter(|(_, c)| c == SHUTDOWN).map(|(t, _)| *t).collect()
    }

    pub fn stats_calls(&self) -> usize {
        self.commands.iter().filter(|(_, c)| c == STATS).count()
    }
}

pub struct FakeTransport {
    start: Instant,
    connect_script: Mutex<VecDeque<bool>>,
    pub journal: Arc<Mutex<Journal>>,
    pub stats: Stats,
    pub shutdown_fails: Arc<Mutex<bool>>,
    /// Channel reports dead once this much virtual time has passed.
    pub dies_after: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            connect_script: Mutex::new(VecDeque::new()),
            journal: Arc::new(Mutex::new(Journal::default())),
            stats: Stats::Json(r#"{"cpu": 12.5, "uptime": 3600}"#),
            shutdown_fails: Arc::new(Mutex::new(false)),
            dies_after: None,
        }
    }

    /// `false` entries fail the matching connect attempt; afterwards connects succeed.
    pub fn with_connects(self, script: impl IntoIterator<Item = bool>) -> Self {
        *self.connect_script.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn connect(&self, target: &SupervisedTarget) -> Result<Box<dyn RemoteSession>, ConnectError> {
        let now = self.start.elapsed();
        self.journal.lock().unwrap().connects.push(now);
        let ok = self.connect_script.lock().unwrap().pop_front().unwrap_or(true);
        if !ok {
            return Err(ConnectError::Refused {
                host: target.host.clone(),
                reason: "Connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeSession {
            start: self.start,
            journal: self.journal.clone(),
            stats: self.stats.clone(),
            shutdown_fails: self.shutdown_fails.clone(),
            dies_at: self.dies_after,
        }))
    }
}

struct FakeSession {
    start: Instant,
    journal: Arc<Mutex<Journal>>,
    stats: Stats,
    shutdown_fails: Arc<Mutex<bool>>,
    dies_at: Option<Duration>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn run(&self, command: &str) -> Result<String, CommandError> {
        let now = self.start.elapsed();
        self.journal.lock().unwrap().commands.push((now, command.to_string()));
        let channel_error = || CommandError::Channel {
            command: command.to_string(),
            stderr: "Connection reset by peer".to_string(),
        };
        match command {
            SHUTDOWN if *self.shutdown_fails.lock().unwrap() => Err(channel_error()),
            SHUTDOWN => Ok(String::new()),
            STATS => match &self.stats {
                Stats::Json(body) => Ok(body.to_string()),
                Stats::ChannelError => Err(channel_error()),
            },
            _ => Err(CommandError::Failed {
                command: command.to_string(),
                code: 127,
                stderr: "command not found".to_string(),
            }),
        }
    }

    async fn is_alive(&self) -> bool {
        let now = self.start.elapsed();
        self.journal.lock().unwrap().alive_checks.push(now);
        self.dies_at.map_or(true, |at| now < at)
    }

    async fn close(&mut self) {
        let now = self.start.elapsed();
        self.journal.lock().unwrap().closes.push(now);
    }
}

pub fn context(
    prober: Arc<dyn Prober>,
    waker: Arc<dyn WakeTrigger>,
    power: Arc<dyn PowerMonitor>,
    transport: Arc<dyn RemoteTransport>,
    telemetry: bool,
) -> SupervisionContext {
    SupervisionContext {
        target: target(),
        collab: Collaborators { prober, waker, power, transport },
        commands: RemoteCommands {
            shutdown: SHUTDOWN.to_string(),
            stats: telemetry.then(|| STATS.to_string()),
        },
        status: StatusHandle::new(),
    }
}
