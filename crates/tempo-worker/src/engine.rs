use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use tempo_chains::{Chain, ChainStore, ExecutionRecord, PlannedTask};
use tempo_core::LogLevel;
use tempo_cron::Schedule;
use tempo_notify::{ChainSignal, NotificationPublisher, SignalCommand};
use tempo_sessions::{ChainLimits, LockCoordinator};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WorkerError};
use crate::executor::Executor;

/// Next run of an `@every` / `@after` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Due(DateTime<Utc>),
    /// An `@after` run is in progress; the next one is timed from its end.
    Running,
}

/// State shared between the tick loop and the chain runs it spawns.
struct Shared<E> {
    store: ChainStore,
    coordinator: LockCoordinator,
    publisher: Arc<NotificationPublisher>,
    executor: E,
    client_name: String,
    pid: i64,
    stops: DashMap<i64, watch::Sender<bool>>,
    slots: DashMap<i64, Slot>,
}

/// The worker's scheduling loop.
///
/// Each tick: claim the client name (retrying until it is free), refresh the
/// heartbeat, then start every runnable chain whose schedule is due.
/// START/STOP signals on the client's notification channel are handled
/// between ticks.
pub struct Engine<E: Executor> {
    shared: Arc<Shared<E>>,
    tick_interval: Duration,
    locked: bool,
    rebooted: bool,
    last_minute: Option<DateTime<Utc>>,
    runs: JoinSet<()>,
}

impl<E: Executor> Engine<E> {
    pub fn new(
        store: ChainStore,
        coordinator: LockCoordinator,
        publisher: Arc<NotificationPublisher>,
        executor: E,
        client_name: String,
        tick_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                coordinator,
                publisher,
                executor,
                client_name,
                pid: i64::from(std::process::id()),
                stops: DashMap::new(),
                slots: DashMap::new(),
            }),
            tick_interval,
            locked: false,
            rebooted: false,
            last_minute: None,
            runs: JoinSet::new(),
        }
    }

    /// Main loop. Runs until `shutdown` becomes `true`, then stops running
    /// chains, waits for them and releases the client name.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(client_name = %self.shared.client_name, pid = self.shared.pid, "worker engine started");
        let mut signals = self.shared.publisher.subscribe(&self.shared.client_name);
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()) {
                        error!("worker tick error: {e}");
                    }
                }
                msg = signals.recv() => self.on_signal(msg),
                Some(joined) = self.runs.join_next(), if !self.runs.is_empty() => {
                    if let Err(e) = joined {
                        error!("chain run aborted: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("worker engine shutting down");
                        break;
                    }
                }
            }
        }

        for stop in self.shared.stops.iter() {
            stop.value().send_replace(true);
        }
        self.drain().await;
        if self.locked {
            if let Err(e) = self.shared.coordinator.release() {
                error!("failed to release client name: {e}");
            }
        }
        info!("worker engine stopped");
    }

    /// Wait for every spawned chain run to finish.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.runs.join_next().await {
            if let Err(e) = joined {
                error!("chain run aborted: {e}");
            }
        }
    }

    fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        if self.locked {
            if !shared.coordinator.heartbeat(&shared.client_name)? {
                warn!(client_name = %shared.client_name, "client name lost, stopping running chains");
                self.locked = false;
                shared.stops.retain(|_, stop| {
                    stop.send_replace(true);
                    false
                });
                return Ok(());
            }
        } else {
            if !shared.coordinator.try_acquire(shared.pid, &shared.client_name)? {
                debug!(client_name = %shared.client_name, "client name busy, retrying next tick");
                return Ok(());
            }
            self.locked = true;
        }

        let minute = now.duration_trunc(chrono::Duration::minutes(1)).unwrap_or(now);
        let new_minute = self.last_minute != Some(minute);
        self.last_minute = Some(minute);
        let startup = !self.rebooted;
        self.rebooted = true;

        for chain in shared.store.runnable_chains(&shared.client_name)? {
            // Chains without a schedule only run when signalled.
            let Some(run_at) = chain.run_at.as_deref() else {
                continue;
            };
            let schedule = match Schedule::parse(run_at) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(chain_id = chain.chain_id, "skipping chain with invalid schedule: {e}");
                    continue;
                }
            };
            match schedule {
                Schedule::Reboot if startup => self.spawn_run(chain, None),
                Schedule::Reboot => {}
                Schedule::Cron(expr) => {
                    if new_minute && expr.is_due_at(minute) {
                        self.spawn_run(chain, None);
                    }
                }
                Schedule::Every(every) => {
                    if self.slot_due(chain.chain_id, now) {
                        let next = now.checked_add_signed(every).unwrap_or(DateTime::<Utc>::MAX_UTC);
                        shared.slots.insert(chain.chain_id, Slot::Due(next));
                        self.spawn_run(chain, None);
                    }
                }
                Schedule::After(after) => {
                    if self.slot_due(chain.chain_id, now) {
                        shared.slots.insert(chain.chain_id, Slot::Running);
                        self.spawn_run(chain, Some(after));
                    }
                }
            }
        }
        Ok(())
    }

    fn slot_due(&self, chain_id: i64, now: DateTime<Utc>) -> bool {
        match self.shared.slots.get(&chain_id).map(|slot| *slot) {
            None => true,
            Some(Slot::Due(at)) => now >= at,
            Some(Slot::Running) => false,
        }
    }

    fn on_signal(&mut self, msg: std::result::Result<String, RecvError>) {
        let payload = match msg {
            Ok(payload) => payload,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "chain signals lost");
                return;
            }
            Err(RecvError::Closed) => return,
        };
        let signal = match ChainSignal::parse(&payload) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(%payload, "ignoring chain signal: {e}");
                return;
            }
        };
        info!(chain_id = signal.chain_id, command = %signal.command, "chain signal received");
        match signal.command {
            SignalCommand::Start if !self.locked => {
                warn!(chain_id = signal.chain_id, "client name not held, ignoring START");
            }
            SignalCommand::Start => match self.shared.store.get_chain(signal.chain_id) {
                Ok(chain) => self.spawn_run(chain, None),
                Err(e) => warn!("cannot start chain: {e}"),
            },
            SignalCommand::Stop => {
                if let Some((_, stop)) = self.shared.stops.remove(&signal.chain_id) {
                    stop.send_replace(true);
                }
            }
        }
    }

    fn spawn_run(&mut self, chain: Chain, after: Option<chrono::Duration>) {
        let shared = Arc::clone(&self.shared);
        let stop = shared
            .stops
            .entry(chain.chain_id)
            .or_insert_with(|| watch::channel(false).0)
            .subscribe();
        self.runs
            .spawn(async move { shared.run_chain(chain, stop, after).await });
    }
}

impl<E: Executor> Shared<E> {
    async fn run_chain(
        &self,
        chain: Chain,
        mut stop: watch::Receiver<bool>,
        after: Option<chrono::Duration>,
    ) {
        let chain_id = chain.chain_id;
        let limits = ChainLimits {
            max_instances: chain.max_instances,
            exclusive: chain.exclusive_execution,
        };
        match self
            .coordinator
            .register_chain_start(chain_id, &self.client_name, limits)
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(chain_id, "chain start held back by execution limits");
                self.finish_slot(chain_id, after);
                return;
            }
            Err(e) => {
                error!(chain_id, "cannot mark chain as running: {e}");
                self.finish_slot(chain_id, after);
                return;
            }
        }

        info!(chain_id, chain = %chain.chain_name, "chain started");
        let result = self.execute_chain(&chain, &mut stop).await;

        if let Err(e) = self.coordinator.register_chain_end(chain_id, &self.client_name) {
            error!(chain_id, "cannot clear running marker: {e}");
        }
        match result {
            Ok(()) => {
                info!(chain_id, "chain finished");
                if chain.self_destruct {
                    match self.store.delete_job(&chain.chain_name) {
                        Ok(_) => info!(chain_id, "self-destructing chain deleted"),
                        Err(e) => error!(chain_id, "cannot delete self-destructing chain: {e}"),
                    }
                }
            }
            Err(e) => {
                warn!(chain_id, "chain failed: {e}");
                self.log(
                    LogLevel::Error,
                    &format!("chain {} failed: {e}", chain.chain_name),
                    Some(json!({ "chain_id": chain_id })),
                );
            }
        }
        self.finish_slot(chain_id, after);
    }

    fn finish_slot(&self, chain_id: i64, after: Option<chrono::Duration>) {
        if let Some(after) = after {
            let next = Utc::now()
                .checked_add_signed(after)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.slots.insert(chain_id, Slot::Due(next));
        }
    }

    async fn execute_chain(&self, chain: &Chain, stop: &mut watch::Receiver<bool>) -> Result<()> {
        let plan = self.store.plan_chain(chain.chain_id)?;
        let tasks = async {
            for planned in &plan.tasks {
                self.execute_task(chain, planned, stop).await?;
            }
            Ok(())
        };
        with_timeout("chain", chain.timeout, tasks).await
    }

    async fn execute_task(
        &self,
        chain: &Chain,
        planned: &PlannedTask,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let task = &planned.task;
        let invocations: Vec<Option<&Value>> = if planned.params.is_empty() {
            vec![None]
        } else {
            planned.params.iter().map(Some).collect()
        };

        for param in invocations {
            if *stop.borrow() {
                return Err(WorkerError::Stopped(chain.chain_id));
            }
            let started = Utc::now();
            let outcome = tokio::select! {
                res = with_timeout("task", task.timeout, self.executor.execute(chain, task, param)) => res,
                _ = stopped(stop) => Err(WorkerError::Stopped(chain.chain_id)),
            };
            let (returncode, output) = match &outcome {
                Ok(out) => (out.returncode, out.output.clone()),
                Err(e) => (-1, Some(e.to_string())),
            };
            self.store.log_execution(&ExecutionRecord {
                chain_id: chain.chain_id,
                task_id: task.task_id,
                command: task.command.clone(),
                kind: task.kind,
                last_run: started.to_rfc3339(),
                finished: Utc::now().to_rfc3339(),
                returncode,
                pid: self.pid,
                output,
                client_name: self.client_name.clone(),
                ignore_error: task.ignore_error,
            })?;

            let failure = match outcome {
                Ok(out) if out.returncode == 0 => None,
                Ok(out) => Some(WorkerError::TaskFailed {
                    returncode: out.returncode,
                    message: out.output.unwrap_or_default(),
                }),
                Err(e) => Some(e),
            };
            if let Some(err) = failure {
                if matches!(err, WorkerError::Stopped(_)) || !task.ignore_error {
                    return Err(err);
                }
                warn!(task_id = task.task_id, "task failed, continuing: {err}");
            }
        }
        Ok(())
    }

    fn log(&self, level: LogLevel, message: &str, data: Option<Value>) {
        if let Err(e) = self
            .store
            .log_message(self.pid, &self.client_name, level, message, data.as_ref())
        {
            error!("cannot write log row: {e}");
        }
    }
}

/// Resolves once `stop` is set; never resolves if its sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Bound `fut` by `ms` milliseconds; zero or negative means unbounded.
async fn with_timeout<T>(
    what: &'static str,
    ms: i64,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match u64::try_from(ms) {
        Ok(ms) if ms > 0 => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| WorkerError::Timeout { what, ms })?,
        _ => fut.await,
    }
}
