use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use incident_cell::FailureTrackerService;
use realtime_cell::EventBus;
use shared_database::MonitorRepository;
use shared_models::{MONITOR_CREATED_CHANNEL, MONITOR_DELETED_CHANNEL, MONITOR_UPDATED_CHANNEL};

use crate::error::MonitorError;
use crate::services::prober::ProberService;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first probe of a job registered from a control
    /// signal, so changes take effect promptly instead of waiting a full
    /// interval.
    pub register_fire_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            register_fire_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
enum SchedulerCommand {
    Register {
        monitor_id: Uuid,
        reset_failures: bool,
    },
    Remove {
        monitor_id: Uuid,
    },
}

/// Keeps exactly one recurring probe job per active monitor. Control
/// signals from the bus are funneled into an internal command queue; the
/// run loop is the only owner of the job table, so jobs are never mutated
/// from two tasks at once.
pub struct MonitorSchedulerService {
    config: SchedulerConfig,
    monitors: Arc<dyn MonitorRepository>,
    prober: Arc<ProberService>,
    failures: Arc<FailureTrackerService>,
    bus: Arc<dyn EventBus>,
}

impl MonitorSchedulerService {
    pub fn new(
        monitors: Arc<dyn MonitorRepository>,
        prober: Arc<ProberService>,
        failures: Arc<FailureTrackerService>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config: SchedulerConfig::default(),
            monitors,
            prober,
            failures,
            bus,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers jobs for every active monitor, then consumes control
    /// signals until the bus subscription ends.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), MonitorError> {
        let mut jobs: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

        let monitors = self.monitors.find_active().await?;
        info!(count = monitors.len(), "registering jobs for active monitors");
        for monitor in monitors {
            let period = Duration::from_secs(monitor.interval.max(1));
            let handle = self.spawn_job(monitor.id, period, period);
            jobs.insert(monitor.id, handle);
        }

        let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
        self.spawn_control_listener(tx).await?;

        while let Some(command) = rx.recv().await {
            match command {
                SchedulerCommand::Register {
                    monitor_id,
                    reset_failures,
                } => {
                    let monitor = match self.monitors.find_by_id(monitor_id).await {
                        Ok(Some(monitor)) => monitor,
                        Ok(None) => {
                            debug!(%monitor_id, "control signal for unknown monitor, ignoring");
                            continue;
                        }
                        Err(e) => {
                            error!(%monitor_id, error = %e, "failed to load monitor for control signal");
                            continue;
                        }
                    };

                    if reset_failures {
                        self.failures.reset(monitor_id).await;
                    }

                    if let Some(job) = jobs.remove(&monitor_id) {
                        job.abort();
                    }
                    let period = Duration::from_secs(monitor.interval.max(1));
                    let handle =
                        self.spawn_job(monitor_id, period, self.config.register_fire_delay);
                    jobs.insert(monitor_id, handle);
                    info!(%monitor_id, interval_secs = monitor.interval, "monitor job registered");
                }
                SchedulerCommand::Remove { monitor_id } => {
                    if let Some(job) = jobs.remove(&monitor_id) {
                        job.abort();
                        info!(%monitor_id, "monitor job removed");
                    }
                    self.failures.reset(monitor_id).await;
                }
            }
        }

        info!("scheduler control loop ended");
        for job in jobs.values() {
            job.abort();
        }
        Ok(())
    }

    /// One recurring probe loop. Every tick re-fetches the snapshot so
    /// edits apply on the next probe; a missing or inactive monitor skips
    /// the tick.
    fn spawn_job(
        &self,
        monitor_id: Uuid,
        period: Duration,
        initial_delay: Duration,
    ) -> JoinHandle<()> {
        let monitors = Arc::clone(&self.monitors);
        let prober = Arc::clone(&self.prober);

        tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match monitors.find_by_id(monitor_id).await {
                    Ok(Some(monitor)) if monitor.active => {
                        prober.probe(&monitor).await;
                    }
                    Ok(Some(_)) => {
                        debug!(%monitor_id, "monitor inactive, skipping probe");
                    }
                    Ok(None) => {
                        debug!(%monitor_id, "monitor missing, skipping probe");
                    }
                    Err(e) => {
                        warn!(%monitor_id, error = %e, "failed to load monitor snapshot");
                    }
                }
            }
        })
    }

    /// Pumps bus control signals into the command queue. The payload on the
    /// control channels is the monitor id as a plain string.
    async fn spawn_control_listener(
        &self,
        tx: mpsc::Sender<SchedulerCommand>,
    ) -> Result<(), MonitorError> {
        let mut subscription = self
            .bus
            .subscribe(&[
                MONITOR_CREATED_CHANNEL,
                MONITOR_UPDATED_CHANNEL,
                MONITOR_DELETED_CHANNEL,
            ])
            .await?;
        info!("scheduler subscribed to monitor control channels");

        tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                let raw_id = message.payload.trim().trim_matches('"');
                let monitor_id = match Uuid::parse_str(raw_id) {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(
                            channel = %message.channel,
                            payload = %message.payload,
                            "control signal with invalid monitor id"
                        );
                        continue;
                    }
                };

                let command = match message.channel.as_str() {
                    MONITOR_CREATED_CHANNEL => SchedulerCommand::Register {
                        monitor_id,
                        reset_failures: false,
                    },
                    MONITOR_UPDATED_CHANNEL => SchedulerCommand::Register {
                        monitor_id,
                        reset_failures: true,
                    },
                    MONITOR_DELETED_CHANNEL => SchedulerCommand::Remove { monitor_id },
                    _ => continue,
                };

                if tx.send(command).await.is_err() {
                    break;
                }
            }
            debug!("scheduler control listener ended");
        });

        Ok(())
    }
}
