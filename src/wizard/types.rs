//! Type definitions for the ingest wizard

use std::fmt;

use thiserror::Error;

use crate::api::{EmailSummary, IngestStatus, ProgressSnapshot, StatsSummary};
use crate::workspace::{AppSource, StoreError};

/// Message shown on confirm when start is pressed without a folder
pub const MISSING_PATH_MESSAGE: &str = "Select a folder to continue.";

/// Message shown after a cancelled run, local or worker-side
pub const CANCELLED_MESSAGE: &str = "Ingestion cancelled";

/// Fallback when a start attempt fails without a usable message
pub const START_FAILED_MESSAGE: &str = "Failed to start ingestion";

/// Fallback when the worker reports an error status without a message
pub const INGEST_FAILED_MESSAGE: &str = "Ingestion failed";

/// Fallback when progress polling keeps failing
pub const POLL_FAILED_MESSAGE: &str = "Lost contact with the ingest worker";

/// Shown on complete when stats or emails couldn't be fetched
pub const COMPLETION_LOAD_MESSAGE: &str =
    "Unable to load stats. You can still finish and view the dashboard.";

/// Steps of the ingest wizard, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    /// Choose a mail source kind
    Select,
    /// Choose the local folder
    Configure,
    /// Review and start
    Confirm,
    /// Ingest running
    Progress,
    /// Summary and finish
    Complete,
}

impl WizardStep {
    pub const ORDER: [WizardStep; 5] = [
        WizardStep::Select,
        WizardStep::Configure,
        WizardStep::Confirm,
        WizardStep::Progress,
        WizardStep::Complete,
    ];

    pub fn index(&self) -> usize {
        match self {
            WizardStep::Select => 0,
            WizardStep::Configure => 1,
            WizardStep::Confirm => 2,
            WizardStep::Progress => 3,
            WizardStep::Complete => 4,
        }
    }

    /// Step at `index`, clamped to the last step
    pub fn from_index(index: usize) -> Self {
        Self::ORDER[index.min(Self::ORDER.len() - 1)]
    }

    /// Route identifier, e.g. "confirm"
    pub fn key(&self) -> &'static str {
        match self {
            WizardStep::Select => "select",
            WizardStep::Configure => "configure",
            WizardStep::Confirm => "confirm",
            WizardStep::Progress => "progress",
            WizardStep::Complete => "complete",
        }
    }

    /// Parse a route identifier. Unknown identifiers land on the first step.
    pub fn parse(key: &str) -> Self {
        Self::ORDER
            .into_iter()
            .find(|step| step.key() == key.trim())
            .unwrap_or(WizardStep::Select)
    }

    pub fn details(&self) -> StepDetails {
        match self {
            WizardStep::Select => StepDetails {
                title: "Choose a mail source",
                subtitle: "MailLens currently supports Apple Mail mailboxes stored on this device.",
                next_label: Some("Continue"),
            },
            WizardStep::Configure => StepDetails {
                title: "Pick your mail folder",
                subtitle: "Select the local folder you want MailLens to ingest.",
                next_label: Some("Review"),
            },
            WizardStep::Confirm => StepDetails {
                title: "Confirm settings",
                subtitle: "Double-check the source and folder before starting ingestion.",
                next_label: Some("Start Ingestion"),
            },
            WizardStep::Progress => StepDetails {
                title: "Ingestion in progress",
                subtitle: "MailLens is processing your emails locally.",
                next_label: None,
            },
            WizardStep::Complete => StepDetails {
                title: "All set!",
                subtitle: "Review your stats and head to the dashboard.",
                next_label: Some("Finish"),
            },
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Header text for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDetails {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub next_label: Option<&'static str>,
}

/// Why the wizard was opened. Only labels and seeding depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WizardMode {
    /// First run after install
    #[default]
    Onboarding,
    /// Re-run the active source
    Reingest,
    /// Connect another source
    AddSource,
}

impl WizardMode {
    /// Parse a mode string; anything unrecognized is onboarding
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "reingest" => WizardMode::Reingest,
            "addsource" => WizardMode::AddSource,
            _ => WizardMode::Onboarding,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            WizardMode::Onboarding => "onboarding",
            WizardMode::Reingest => "reingest",
            WizardMode::AddSource => "addsource",
        }
    }
}

impl fmt::Display for WizardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A mail source kind offered on the select step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOption {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub available: bool,
}

/// Source kinds in display order
pub const SOURCE_OPTIONS: &[SourceOption] = &[
    SourceOption {
        id: "emlx",
        label: "Apple Mail (macOS)",
        description: "Ingest the .emlx mailboxes Apple Mail keeps on this device",
        available: true,
    },
    SourceOption {
        id: "gmail",
        label: "Gmail",
        description: "(Coming soon)",
        available: false,
    },
    SourceOption {
        id: "mbox",
        label: "Generic mbox Archive",
        description: "(Coming soon)",
        available: false,
    },
];

impl SourceOption {
    pub fn all() -> &'static [SourceOption] {
        SOURCE_OPTIONS
    }

    pub fn find(id: &str) -> Option<&'static SourceOption> {
        SOURCE_OPTIONS.iter().find(|option| option.id == id)
    }
}

/// Everything the wizard knows about the current run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardState {
    pub source_id: Option<String>,
    pub path: Option<String>,
    pub ingest_started: bool,
    pub ingest_completed: bool,
    pub ingest_error: Option<String>,
    pub progress: Option<ProgressSnapshot>,
    pub stats: Option<StatsSummary>,
    pub emails: Vec<EmailSummary>,
}

impl WizardState {
    /// Furthest step index the current state allows
    pub fn max_reachable_index(&self) -> usize {
        if self.source_id.is_none() {
            0
        } else if self.path.is_none() {
            1
        } else if !self.ingest_started {
            2
        } else if !self.ingest_completed {
            3
        } else {
            WizardStep::ORDER.len() - 1
        }
    }

    /// Forget the current run after a failure or cancel
    pub(crate) fn roll_back(&mut self, message: impl Into<String>) {
        self.ingest_started = false;
        self.ingest_completed = false;
        self.ingest_error = Some(message.into());
    }
}

/// What a step shows, one variant per step
#[derive(Debug, Clone, PartialEq)]
pub enum StepView {
    Select {
        options: &'static [SourceOption],
        selected: Option<String>,
    },
    Configure {
        path: Option<String>,
    },
    Confirm {
        source: Option<String>,
        path: Option<String>,
        error: Option<String>,
    },
    Progress {
        status: IngestStatus,
        percent: f64,
        note: String,
        done: u64,
        /// `None` until the worker knows the total
        total: Option<u64>,
    },
    Complete {
        loading: bool,
        error: Option<String>,
        stats: Option<StatsSummary>,
        emails: Vec<EmailSummary>,
    },
}

/// Footer buttons for the current step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterControls {
    /// `None` when the step has no forward action
    pub next_label: Option<&'static str>,
    pub next_enabled: bool,
    pub back_enabled: bool,
    pub cancel_label: &'static str,
    pub cancel_enabled: bool,
    pub busy: bool,
    pub busy_label: Option<&'static str>,
}

/// Point-in-time copy of the whole wizard, for front ends and logs
#[derive(Debug, Clone, PartialEq)]
pub struct WizardSnapshot {
    pub mode: WizardMode,
    pub step: WizardStep,
    pub state: WizardState,
    pub max_reachable_index: usize,
    pub locked: bool,
    pub starting: bool,
    pub cancelling: bool,
    pub finishing: bool,
}

/// Where the app goes once the wizard closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDestination {
    Dashboard,
    Welcome,
}

impl ExitDestination {
    pub fn route(&self) -> &'static str {
        match self {
            ExitDestination::Dashboard => "/dashboard",
            ExitDestination::Welcome => "/welcome",
        }
    }
}

/// Why a start request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSuppressed {
    NotOnConfirm,
    NoIntent,
    Locked,
    InFlight,
    /// The current run hasn't finished, failed or been cancelled
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Worker accepted the run; the wizard is on progress
    Started,
    /// No folder chosen; the confirm step shows a validation message
    MissingPath,
    /// Init or start failed; back on confirm with this message
    Failed(String),
    Suppressed(StartSuppressed),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled,
    /// Worker refused or was unreachable; state is unchanged
    Failed(String),
    /// Not on progress, or another cancel is outstanding
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionLoad {
    Loaded,
    /// Stats were already cached
    Cached,
    /// Another fetch is outstanding
    InFlight,
    /// Fetch failed; finish is still allowed
    Failed,
    /// The wizard left the complete step before the fetch returned
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// Source recorded in the workspace registry
    Committed {
        source: AppSource,
        destination: ExitDestination,
    },
    /// Nothing to record, the wizard just closes
    Skipped(ExitDestination),
    /// A finish is already in flight
    Suppressed,
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Another wizard action is still in progress")]
    Busy,
    #[error("Source '{0}' is not available")]
    UnavailableSource(String),
    #[error("Action not available on the {0} step")]
    WrongStep(WizardStep),
    #[error("The {0} step is not complete yet")]
    Incomplete(WizardStep),
    #[error("Cannot change the selection while an ingest is running")]
    RunInProgress,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
