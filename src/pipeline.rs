//! Pipeline assembly.
//!
//! Builds the two links, moves each end into the one stage that uses it,
//! and spawns the stages as named threads. Startup is all-or-nothing: if
//! any stage fails to spawn or register with the watchdog, [`Pipeline::spawn`]
//! returns the error and the caller is expected to exit.
//!
//! Stage priorities ([`StageId::priority`]) are applied through the
//! `before_spawn` hook of [`Pipeline::spawn_with`]. The firmware uses it to
//! set the FreeRTOS priority of each stage thread; hosted builds leave
//! scheduling to the OS and the priority is advisory.

use std::fmt;
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::alert::AlertSink;
use crate::allowlist::AllowList;
use crate::board;
use crate::config::{ConfigError, PipelineConfig};
use crate::link::{link, LinkId};
use crate::source::NetworkSource;
use crate::stage::{run_forever, Alerter, Classifier, Monitor, Stage};
use crate::stats::{PipelineStats, StatusReport};
use crate::watchdog::{StageId, WatchdogBinding, WatchdogError};

#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    Spawn { stage: StageId, source: io::Error },
    Watchdog(WatchdogError),
    /// A stage never reported back during startup.
    NoRegistration(StageId),
    /// A stage thread ended. Stages never return, so this means it panicked.
    StageExited(StageId),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid pipeline config: {e}"),
            Self::Spawn { stage, source } => write!(f, "failed to spawn {stage}: {source}"),
            Self::Watchdog(e) => write!(f, "watchdog registration failed: {e}"),
            Self::NoRegistration(stage) => write!(f, "{stage} did not register in time"),
            Self::StageExited(stage) => write!(f, "{stage} stage exited"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Spawn { source, .. } => Some(source),
            Self::Watchdog(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<WatchdogError> for PipelineError {
    fn from(e: WatchdogError) -> Self {
        Self::Watchdog(e)
    }
}

/// A running pipeline. Dropping it detaches the stage threads; they keep
/// running until the process ends.
#[derive(Debug)]
pub struct Pipeline {
    stats: Arc<PipelineStats>,
    handles: Vec<(StageId, JoinHandle<()>)>,
}

impl Pipeline {
    /// Validate `config`, wire the links and start all three stages.
    ///
    /// Consumers are started before producers so the first observation has
    /// somewhere to go. Every stage must register with the watchdog within
    /// one watchdog timeout.
    pub fn spawn<S, K, W>(
        config: PipelineConfig,
        source: S,
        allow: AllowList,
        sink: K,
        watchdog: Arc<W>,
    ) -> Result<Self, PipelineError>
    where
        S: NetworkSource + Send + 'static,
        K: AlertSink + Send + 'static,
        W: WatchdogBinding + Send + 'static,
    {
        Self::spawn_with(config, source, allow, sink, watchdog, |_| Ok(()))
    }

    /// Like [`Pipeline::spawn`], calling `before_spawn` on the calling
    /// thread right before each stage thread is created.
    pub fn spawn_with<S, K, W, P>(
        config: PipelineConfig,
        source: S,
        allow: AllowList,
        sink: K,
        watchdog: Arc<W>,
        mut before_spawn: P,
    ) -> Result<Self, PipelineError>
    where
        S: NetworkSource + Send + 'static,
        K: AlertSink + Send + 'static,
        W: WatchdogBinding + Send + 'static,
        P: FnMut(StageId) -> io::Result<()>,
    {
        config.validate()?;

        let stats = Arc::new(PipelineStats::new());
        let (tx12, rx12) = link(LinkId::Observations);
        let (tx23, rx23) = link(LinkId::Verdicts);

        let alerter = Alerter::new(rx23, sink, config, Arc::clone(&stats));
        let classifier = Classifier::new(rx12, tx23, allow, config, Arc::clone(&stats));
        let monitor = Monitor::new(source, tx12, config, Arc::clone(&stats)).map_err(|source| {
            PipelineError::Spawn {
                stage: StageId::Monitor,
                source,
            }
        })?;

        let (ready_tx, ready_rx) = mpsc::sync_channel(StageId::ALL.len());
        let mut handles = Vec::with_capacity(StageId::ALL.len());

        handles.push(spawn_stage(alerter, &watchdog, &ready_tx, &mut before_spawn)?);
        handles.push(spawn_stage(classifier, &watchdog, &ready_tx, &mut before_spawn)?);
        handles.push(spawn_stage(monitor, &watchdog, &ready_tx, &mut before_spawn)?);
        drop(ready_tx);

        let deadline = Instant::now() + config.watchdog_timeout;
        let mut registered = [false; 3];
        while let Some(missing) = StageId::ALL
            .into_iter()
            .find(|stage| !registered[stage.index()])
        {
            let left = deadline.saturating_duration_since(Instant::now());
            match ready_rx.recv_timeout(left) {
                Ok(Ok(id)) => {
                    registered[id.index()] = true;
                    log::debug!("{} ready", id);
                }
                Ok(Err(e)) => return Err(PipelineError::Watchdog(e)),
                Err(_) => return Err(PipelineError::NoRegistration(missing)),
            }
        }

        log::info!("pipeline started: monitor → classifier → alerter");
        Ok(Self { stats, handles })
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn status(&self) -> StatusReport {
        self.stats.snapshot()
    }

    /// Block until a stage thread ends and report which one. Under normal
    /// operation this never returns.
    pub fn wait(self) -> PipelineError {
        let (tx, rx) = mpsc::channel();
        for (stage, handle) in self.handles {
            let tx = tx.clone();
            // Joiners are detached; only the first exit matters.
            let _ = thread::Builder::new()
                .name(format!("join-{stage}"))
                .spawn(move || {
                    let _ = handle.join();
                    let _ = tx.send(stage);
                });
        }
        drop(tx);
        match rx.recv() {
            Ok(stage) => PipelineError::StageExited(stage),
            Err(_) => PipelineError::StageExited(StageId::Monitor),
        }
    }
}

fn spawn_stage<T, W, P>(
    mut stage: T,
    watchdog: &Arc<W>,
    ready: &mpsc::SyncSender<Result<StageId, WatchdogError>>,
    before_spawn: &mut P,
) -> Result<(StageId, JoinHandle<()>), PipelineError>
where
    T: Stage + Send + 'static,
    W: WatchdogBinding + Send + 'static,
    P: FnMut(StageId) -> io::Result<()>,
{
    let id = stage.id();
    before_spawn(id).map_err(|source| PipelineError::Spawn { stage: id, source })?;
    let watchdog = Arc::clone(watchdog);
    let ready = ready.clone();

    let handle = thread::Builder::new()
        .name(id.as_str().into())
        .stack_size(board::STAGE_STACK_SIZE)
        .spawn(move || {
            // Registration happens on the stage's own thread, matching
            // task-watchdog APIs that subscribe the calling task.
            let registered = watchdog.register(id);
            let ok = registered.is_ok();
            let _ = ready.send(registered.map(|()| id));
            drop(ready);
            if ok {
                run_forever(&mut stage, &*watchdog);
            }
        })
        .map_err(|source| PipelineError::Spawn { stage: id, source })?;

    log::info!(target: id.as_str(), "{} thread spawned (priority {})", id, id.priority());
    Ok((id, handle))
}
