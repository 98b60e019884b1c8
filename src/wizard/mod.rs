//! Ingest wizard: select a source, pick a folder, confirm, watch the run and
//! commit the result to the workspace registry.
//!
//! [`Wizard`] is a cheap handle over shared state. Every mutation happens
//! under a short synchronous lock that is never held across an await, then
//! reachability is re-checked, background work (polling, completion fetch)
//! is spawned outside the lock and watchers are notified.

pub mod guard;
pub mod poller;
pub mod types;


use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

pub use guard::InteractionGuard;
pub use poller::{PollControl, ProgressPoller};
pub use types::*;

use crate::api::{IngestError, IngestService, IngestStatus, ProgressSnapshot, StartIngestRequest};
use crate::config::WizardConfig;
use crate::lock;
use crate::workspace::{SourceCommit, WorkspaceStore, DEFAULT_SOURCE_KIND};

struct WizardInner {
    mode: WizardMode,
    step: WizardStep,
    state: WizardState,
    guard: InteractionGuard,
    /// Bumped on every entry to and exit from progress
    poll_generation: u64,
    poll_failures: u32,
    completion_loading: bool,
    completion_error: Option<String>,
    /// Set once the wizard has finished or been exited
    closed: bool,
}

/// Background work requested by a transition, started once the lock is released
enum Effect {
    StartPolling(u64),
    LoadCompletion,
}

enum FinishPlan {
    Commit(SourceCommit),
    Skip,
    Suppressed,
}

impl WizardInner {
    /// A run has been started and hasn't reached done yet
    fn run_active(&self) -> bool {
        self.state.ingest_started && !self.state.ingest_completed
    }

    fn go_to(&mut self, step: WizardStep, lock_window: Option<Duration>) {
        if let Some(window) = lock_window {
            self.guard.lock(window);
        }
        self.step = step;
    }

    /// Clamp the step to what the state allows and react to step changes
    fn settle(&mut self, before: WizardStep, config: &WizardConfig) -> Vec<Effect> {
        let max = self.state.max_reachable_index();
        if self.step.index() > max {
            let target = WizardStep::from_index(max);
            debug!(from = %self.step, to = %target, "Step not reachable yet, redirecting");
            self.go_to(target, Some(config.nav_lock()));
        }

        let mut effects = Vec::new();
        if self.step == before {
            return effects;
        }
        debug!(from = %before, to = %self.step, "Wizard step changed");

        match before {
            WizardStep::Confirm => self.guard.clear_start_intent(),
            WizardStep::Progress => self.poll_generation += 1,
            _ => {}
        }

        match self.step {
            WizardStep::Progress => {
                self.poll_generation += 1;
                self.poll_failures = 0;
                effects.push(Effect::StartPolling(self.poll_generation));
            }
            WizardStep::Complete => {
                if self.state.stats.is_none() && !self.completion_loading {
                    effects.push(Effect::LoadCompletion);
                }
            }
            WizardStep::Select | WizardStep::Configure | WizardStep::Confirm => {}
        }
        effects
    }
}

/// Handle to one wizard run
#[derive(Clone)]
pub struct Wizard {
    inner: Arc<Mutex<WizardInner>>,
    client: Arc<dyn IngestService>,
    store: WorkspaceStore,
    config: Arc<WizardConfig>,
    revision: Arc<watch::Sender<u64>>,
}

impl Wizard {
    /// Begin a run. In reingest mode the folder is seeded from the active source.
    pub fn new(
        mode: WizardMode,
        client: Arc<dyn IngestService>,
        store: WorkspaceStore,
        config: WizardConfig,
    ) -> Self {
        let path = match mode {
            WizardMode::Reingest => store.active_source().map(|source| source.path),
            WizardMode::Onboarding | WizardMode::AddSource => None,
        };
        let state = WizardState {
            source_id: config.default_source.clone(),
            path,
            ..Default::default()
        };
        info!(mode = %mode, seeded_path = ?state.path, "Wizard opened");

        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(WizardInner {
                mode,
                step: WizardStep::Select,
                state,
                guard: InteractionGuard::new(),
                poll_generation: 0,
                poll_failures: 0,
                completion_loading: false,
                completion_error: None,
                closed: false,
            })),
            client,
            store,
            config: Arc::new(config),
            revision: Arc::new(revision),
        }
    }

    pub fn mode(&self) -> WizardMode {
        lock(&self.inner).mode
    }

    pub fn step(&self) -> WizardStep {
        lock(&self.inner).step
    }

    pub fn state(&self) -> WizardState {
        lock(&self.inner).state.clone()
    }

    pub fn max_reachable_index(&self) -> usize {
        lock(&self.inner).state.max_reachable_index()
    }

    pub fn details(&self) -> StepDetails {
        self.step().details()
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub(crate) fn client(&self) -> &Arc<dyn IngestService> {
        &self.client
    }

    /// Receiver that changes after every applied mutation
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let inner = lock(&self.inner);
        WizardSnapshot {
            mode: inner.mode,
            step: inner.step,
            state: inner.state.clone(),
            max_reachable_index: inner.state.max_reachable_index(),
            locked: inner.guard.is_locked(),
            starting: inner.guard.is_starting(),
            cancelling: inner.guard.is_cancelling(),
            finishing: inner.guard.is_finishing(),
        }
    }

    /// Mutate under the lock, settle reachability, then run effects and notify
    fn apply<R>(&self, mutate: impl FnOnce(&mut WizardInner, &WizardConfig) -> R) -> R {
        let (result, effects) = {
            let mut inner = lock(&self.inner);
            let before = inner.step;
            let result = mutate(&mut *inner, &*self.config);
            let effects = inner.settle(before, &self.config);
            (result, effects)
        };
        self.run_effects(effects);
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
        result
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime available, background wizard work skipped");
            return;
        };
        for effect in effects {
            match effect {
                Effect::StartPolling(generation) => {
                    let poller =
                        ProgressPoller::new(self.clone(), generation, self.config.poll_interval());
                    handle.spawn(poller.run());
                }
                Effect::LoadCompletion => {
                    let wizard = self.clone();
                    handle.spawn(async move {
                        wizard.load_completion().await;
                    });
                }
            }
        }
    }

    /// Choose a source kind from the catalog
    pub fn select_source(&self, id: &str) -> Result<(), WizardError> {
        let option = SourceOption::find(id)
            .filter(|option| option.available)
            .ok_or_else(|| WizardError::UnavailableSource(id.to_string()))?;

        self.apply(|inner, _| {
            if inner.state.ingest_started {
                return Err(WizardError::RunInProgress);
            }
            inner.state.source_id = Some(option.id.to_string());
            Ok(())
        })
    }

    /// Choose the folder to ingest. A blank path clears the selection.
    pub fn select_path(&self, path: &str) -> Result<(), WizardError> {
        let path = path.trim();
        if path.is_empty() {
            return self.clear_path();
        }
        self.apply(|inner, _| {
            if inner.state.ingest_started {
                return Err(WizardError::RunInProgress);
            }
            inner.state.path = Some(path.to_string());
            Ok(())
        })
    }

    pub fn clear_path(&self) -> Result<(), WizardError> {
        self.apply(|inner, _| {
            if inner.state.ingest_started {
                return Err(WizardError::RunInProgress);
            }
            inner.state.path = None;
            Ok(())
        })
    }

    /// Jump to a step. Steps beyond what the state allows are corrected to the
    /// furthest reachable one; returns where the wizard ended up.
    pub fn navigate(&self, step: WizardStep) -> Result<WizardStep, WizardError> {
        self.apply(|inner, config| {
            if inner.guard.is_busy() {
                return Err(WizardError::Busy);
            }
            let leaving_progress = inner.step == WizardStep::Progress && step != inner.step;
            if leaving_progress && inner.run_active() {
                return Err(WizardError::RunInProgress);
            }
            inner.go_to(step, Some(config.nav_lock()));
            Ok(())
        })?;
        Ok(self.step())
    }

    /// Forward button on select and configure
    pub fn advance(&self) -> Result<WizardStep, WizardError> {
        self.apply(|inner, config| {
            if inner.guard.is_busy() {
                return Err(WizardError::Busy);
            }
            let next = match inner.step {
                WizardStep::Select if inner.state.source_id.is_some() => WizardStep::Configure,
                WizardStep::Configure if inner.state.path.is_some() => WizardStep::Confirm,
                WizardStep::Select | WizardStep::Configure => {
                    return Err(WizardError::Incomplete(inner.step))
                }
                other => return Err(WizardError::WrongStep(other)),
            };
            inner.go_to(next, Some(config.nav_lock()));
            Ok(next)
        })
    }

    /// Back button on configure and confirm. Clears nothing.
    pub fn go_back(&self) -> Result<WizardStep, WizardError> {
        self.apply(|inner, config| {
            if inner.guard.is_busy() {
                return Err(WizardError::Busy);
            }
            let previous = match inner.step {
                WizardStep::Configure => WizardStep::Select,
                WizardStep::Confirm => WizardStep::Configure,
                other => return Err(WizardError::WrongStep(other)),
            };
            inner.go_to(previous, Some(config.nav_lock()));
            Ok(previous)
        })
    }

    /// The start button on confirm: records the explicit intent, then starts
    pub async fn request_start(&self) -> StartOutcome {
        let armed = {
            let mut inner = lock(&self.inner);
            if inner.step == WizardStep::Confirm {
                inner.guard.arm_start_intent();
                true
            } else {
                false
            }
        };
        if !armed {
            debug!("Start suppressed: not on confirm");
            return StartOutcome::Suppressed(StartSuppressed::NotOnConfirm);
        }
        self.start_ingest().await
    }

    /// Run the start sequence if the guard allows it.
    ///
    /// Only proceeds with an armed start intent, outside the interaction lock
    /// and with no other start in flight. Failures are reported through the
    /// confirm step rather than returned as errors.
    #[instrument(skip(self))]
    pub async fn start_ingest(&self) -> StartOutcome {
        let prepared = self.apply(|inner, config| {
            if inner.step != WizardStep::Confirm {
                debug!("Start suppressed: not on confirm");
                return Err(StartOutcome::Suppressed(StartSuppressed::NotOnConfirm));
            }
            if !inner.guard.take_start_intent() {
                debug!("Start suppressed: no explicit start intent");
                return Err(StartOutcome::Suppressed(StartSuppressed::NoIntent));
            }
            if inner.guard.is_locked() {
                debug!("Start suppressed: interaction lock active");
                return Err(StartOutcome::Suppressed(StartSuppressed::Locked));
            }
            if inner.guard.is_starting() {
                debug!("Start suppressed: already starting");
                return Err(StartOutcome::Suppressed(StartSuppressed::InFlight));
            }
            if inner.state.ingest_started {
                debug!("Start suppressed: a run is already underway");
                return Err(StartOutcome::Suppressed(StartSuppressed::AlreadyRunning));
            }
            let Some(path) = inner.state.path.clone() else {
                inner.state.ingest_error = Some(MISSING_PATH_MESSAGE.to_string());
                return Err(StartOutcome::MissingPath);
            };
            let source = inner
                .state
                .source_id
                .clone()
                .unwrap_or_else(|| DEFAULT_SOURCE_KIND.to_string());

            inner.guard.try_begin_start();
            inner.guard.lock(config.nav_lock());
            inner.state.source_id = Some(source.clone());
            inner.state.ingest_started = true;
            inner.state.ingest_completed = false;
            inner.state.ingest_error = None;
            inner.state.progress = None;
            Ok(StartIngestRequest { source, path })
        });
        let request = match prepared {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };

        info!(source = %request.source, path = %request.path, "Starting ingestion");
        let result = self.run_start_sequence(&request).await;

        self.apply(|inner, config| {
            inner.guard.end_start();
            match result {
                Ok(snapshot) => {
                    if snapshot.is_some() {
                        inner.state.progress = snapshot;
                    }
                    inner.guard.lock(config.start_lock());
                    inner.go_to(WizardStep::Progress, None);
                    StartOutcome::Started
                }
                Err(err) => {
                    let message = err.user_message(START_FAILED_MESSAGE);
                    warn!(call = err.call().name(), "Failed to start ingestion: {}", message);
                    inner.state.roll_back(message.clone());
                    inner.go_to(WizardStep::Confirm, None);
                    StartOutcome::Failed(message)
                }
            }
        })
    }

    async fn run_start_sequence(
        &self,
        request: &StartIngestRequest,
    ) -> Result<Option<ProgressSnapshot>, IngestError> {
        self.client.init_storage().await?;
        self.client.start_ingest(request).await?;
        Ok(self.warm_up().await)
    }

    /// Poll briefly until the worker reports the run underway.
    ///
    /// Best effort: poll failures are retried and running out of budget just
    /// means the progress step starts without a fresh snapshot. The budget is
    /// a hard deadline; a slow poll is abandoned when it runs out.
    async fn warm_up(&self) -> Option<ProgressSnapshot> {
        let deadline = Instant::now() + self.config.warmup_budget();
        let mut latest = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, self.client.get_progress()).await {
                Ok(Ok(snapshot)) => {
                    let underway = snapshot.status.is_underway();
                    latest = Some(snapshot);
                    if underway {
                        break;
                    }
                }
                Ok(Err(e)) => warn!("Warm-up progress poll failed: {}", e),
                Err(_) => {
                    debug!("Warm-up budget ran out during a progress poll");
                    break;
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.config.warmup_interval().min(remaining)).await;
        }

        if latest.is_none() {
            debug!("Warm-up ended without a progress snapshot");
        }
        latest
    }

    pub(crate) fn is_poll_active(&self, generation: u64) -> bool {
        let inner = lock(&self.inner);
        inner.poll_generation == generation && inner.step == WizardStep::Progress
    }

    /// Apply one steady-state poll result for `generation`
    pub(crate) fn apply_poll(
        &self,
        generation: u64,
        result: Result<ProgressSnapshot, IngestError>,
    ) -> PollControl {
        self.apply(|inner, config| {
            if inner.poll_generation != generation || inner.step != WizardStep::Progress {
                debug!(generation, "Discarding late progress result");
                return PollControl::Stop;
            }

            let snapshot = match result {
                Ok(snapshot) => {
                    inner.poll_failures = 0;
                    snapshot
                }
                Err(err) => {
                    inner.poll_failures += 1;
                    warn!(failures = inner.poll_failures, "Progress poll failed: {}", err);
                    let limit = config.max_poll_failures;
                    if limit > 0 && inner.poll_failures >= limit {
                        inner.state.roll_back(err.user_message(POLL_FAILED_MESSAGE));
                        inner.go_to(WizardStep::Confirm, Some(config.nav_lock()));
                        return PollControl::Stop;
                    }
                    return PollControl::Continue;
                }
            };

            debug!(
                status = %snapshot.status,
                done = snapshot.done,
                total = snapshot.total,
                "Progress"
            );
            match snapshot.status {
                IngestStatus::Done => {
                    inner.state.progress = Some(snapshot);
                    if !inner.state.ingest_completed {
                        inner.state.ingest_completed = true;
                        info!("Ingestion complete");
                    }
                    inner.go_to(WizardStep::Complete, None);
                    PollControl::Stop
                }
                IngestStatus::Error => {
                    let message = snapshot
                        .error
                        .clone()
                        .filter(|message| !message.trim().is_empty())
                        .unwrap_or_else(|| INGEST_FAILED_MESSAGE.to_string());
                    warn!("Ingestion failed: {}", message);
                    inner.state.progress = Some(snapshot);
                    inner.state.roll_back(message);
                    inner.go_to(WizardStep::Confirm, Some(config.nav_lock()));
                    PollControl::Stop
                }
                IngestStatus::Cancelled => {
                    info!("Worker reports ingestion cancelled");
                    inner.state.progress = Some(snapshot);
                    inner.state.roll_back(CANCELLED_MESSAGE);
                    inner.go_to(WizardStep::Confirm, Some(config.nav_lock()));
                    PollControl::Stop
                }
                IngestStatus::Idle | IngestStatus::Running => {
                    inner.state.progress = Some(snapshot);
                    PollControl::Continue
                }
            }
        })
    }

    /// Cancel the running ingest. A second call while one is outstanding is a no-op.
    #[instrument(skip(self))]
    pub async fn cancel_ingest(&self) -> CancelOutcome {
        let begun = self.apply(|inner, _| {
            inner.step == WizardStep::Progress && inner.guard.try_begin_cancel()
        });
        if !begun {
            debug!("Cancel suppressed");
            return CancelOutcome::Suppressed;
        }

        info!("Cancel requested");
        let result = self.client.cancel_ingest().await;

        self.apply(|inner, config| {
            inner.guard.end_cancel();
            match result {
                Ok(()) => {
                    inner.state.roll_back(CANCELLED_MESSAGE);
                    inner.guard.clear_start_intent();
                    inner.guard.lock(config.cancel_lock());
                    inner.go_to(WizardStep::Confirm, Some(config.nav_lock()));
                    CancelOutcome::Cancelled
                }
                Err(err) => {
                    let message = err.user_message("Failed to cancel ingestion");
                    warn!("Failed to cancel ingestion: {}", message);
                    CancelOutcome::Failed(message)
                }
            }
        })
    }

    /// Fetch stats and the latest emails for the complete step, once
    #[instrument(skip(self))]
    pub async fn load_completion(&self) -> CompletionLoad {
        let begun = self.apply(|inner, _| {
            if inner.state.stats.is_some() {
                return Err(CompletionLoad::Cached);
            }
            if inner.completion_loading {
                return Err(CompletionLoad::InFlight);
            }
            inner.completion_loading = true;
            inner.completion_error = None;
            Ok(())
        });
        if let Err(outcome) = begun {
            return outcome;
        }

        let limit = self.config.completion_email_limit;
        let result = tokio::try_join!(self.client.get_stats(), self.client.get_emails(limit));

        self.apply(|inner, _| {
            inner.completion_loading = false;
            if inner.step != WizardStep::Complete {
                debug!("Left complete before completion data arrived");
                return CompletionLoad::Discarded;
            }
            match result {
                Ok((stats, emails)) => {
                    debug!(total = stats.total, emails = emails.len(), "Completion data loaded");
                    inner.state.stats = Some(stats);
                    inner.state.emails = emails;
                    CompletionLoad::Loaded
                }
                Err(err) => {
                    warn!("Failed to load completion data: {}", err);
                    inner.completion_error = Some(COMPLETION_LOAD_MESSAGE.to_string());
                    CompletionLoad::Failed
                }
            }
        })
    }

    /// Record the run in the workspace registry and close the wizard.
    ///
    /// A failed write leaves the wizard on complete so finish can be retried.
    #[instrument(skip(self))]
    pub async fn finish(&self) -> Result<FinishOutcome, WizardError> {
        let plan = self.apply(|inner, _| {
            if inner.closed {
                return Ok(FinishPlan::Suppressed);
            }
            if inner.step != WizardStep::Complete {
                return Err(WizardError::WrongStep(inner.step));
            }
            if inner.guard.is_finishing() {
                return Ok(FinishPlan::Suppressed);
            }
            let Some(path) = inner.state.path.clone() else {
                return Ok(FinishPlan::Skip);
            };
            inner.guard.try_begin_finish();
            Ok(FinishPlan::Commit(SourceCommit {
                path,
                kind: inner
                    .state
                    .source_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SOURCE_KIND.to_string()),
                total_emails: inner.state.stats.as_ref().map_or(0, |stats| stats.total),
                timestamp: chrono::Utc::now().timestamp_millis(),
            }))
        })?;

        let commit = match plan {
            FinishPlan::Commit(commit) => commit,
            FinishPlan::Skip => {
                self.close();
                return Ok(FinishOutcome::Skipped(ExitDestination::Dashboard));
            }
            FinishPlan::Suppressed => {
                debug!("Finish suppressed: already finishing");
                return Ok(FinishOutcome::Suppressed);
            }
        };

        let store = self.store.clone();
        let committed = tokio::task::spawn_blocking(move || store.commit_source(&commit)).await;
        self.apply(|inner, _| inner.guard.end_finish());

        let source = committed??;
        self.close();
        info!(id = %source.id, path = %source.path, "Wizard finished");
        Ok(FinishOutcome::Committed {
            source,
            destination: ExitDestination::Dashboard,
        })
    }

    /// Leave the wizard without finishing
    pub fn exit(&self) -> Result<ExitDestination, WizardError> {
        self.apply(|inner, _| {
            if inner.guard.is_busy() {
                return Err(WizardError::Busy);
            }
            inner.poll_generation += 1;
            inner.closed = true;
            Ok(())
        })?;

        let destination = if self.store.onboarding_complete() {
            ExitDestination::Dashboard
        } else {
            ExitDestination::Welcome
        };
        info!(destination = destination.route(), "Leaving wizard");
        Ok(destination)
    }

    /// Retire any poller so nothing more is applied after the wizard closes
    fn close(&self) {
        self.apply(|inner, _| {
            inner.poll_generation += 1;
            inner.closed = true;
        });
    }

    pub fn view(&self) -> StepView {
        let inner = lock(&self.inner);
        let state = &inner.state;
        match inner.step {
            WizardStep::Select => StepView::Select {
                options: SourceOption::all(),
                selected: state.source_id.clone(),
            },
            WizardStep::Configure => StepView::Configure {
                path: state.path.clone(),
            },
            WizardStep::Confirm => StepView::Confirm {
                source: state.source_id.clone(),
                path: state.path.clone(),
                error: state.ingest_error.clone(),
            },
            WizardStep::Progress => {
                let snapshot = state.progress.clone().unwrap_or_default();
                StepView::Progress {
                    status: snapshot.status,
                    percent: snapshot.percent(),
                    note: snapshot.display_note(),
                    done: snapshot.done,
                    total: (snapshot.total > 0).then_some(snapshot.total),
                }
            }
            WizardStep::Complete => StepView::Complete {
                loading: inner.completion_loading,
                error: inner.completion_error.clone(),
                stats: state.stats.clone(),
                emails: state.emails.clone(),
            },
        }
    }

    /// Footer buttons for the current step
    pub fn controls(&self) -> FooterControls {
        let inner = lock(&self.inner);
        let details = inner.step.details();
        let state = &inner.state;
        let guard = &inner.guard;

        let mut controls = FooterControls {
            next_label: details.next_label,
            next_enabled: true,
            back_enabled: false,
            cancel_label: "Cancel",
            cancel_enabled: true,
            busy: false,
            busy_label: None,
        };

        match inner.step {
            WizardStep::Select => {
                controls.next_enabled = state.source_id.is_some();
                if inner.mode == WizardMode::Onboarding {
                    controls.cancel_label = "Exit setup";
                }
            }
            WizardStep::Configure => {
                controls.back_enabled = true;
                controls.next_enabled = state.path.is_some();
            }
            WizardStep::Confirm => {
                let starting = guard.is_starting();
                controls.back_enabled = true;
                controls.next_label = Some(if starting {
                    "Starting…"
                } else {
                    details.next_label.unwrap_or("Start")
                });
                controls.next_enabled = state.path.is_some() && !starting;
                controls.busy = starting;
                controls.busy_label = Some("Starting…");
            }
            WizardStep::Progress => {
                let cancelling = guard.is_cancelling();
                controls.next_enabled = false;
                controls.cancel_label = if cancelling {
                    "Cancelling…"
                } else {
                    "Cancel ingest"
                };
                controls.cancel_enabled = !cancelling;
            }
            WizardStep::Complete => {
                let finishing = guard.is_finishing();
                controls.next_label = Some(if finishing {
                    "Finishing…"
                } else {
                    details.next_label.unwrap_or("Finish")
                });
                controls.next_enabled = !finishing;
                controls.busy = finishing;
                controls.busy_label = Some("Finishing…");
                controls.cancel_label = "Later";
            }
        }
        controls
    }
}
