//! Centralized environment variable registry.
//!
//! Single source of truth for the environment variables maillens reads. It
//! backs the `maillens env` listing.
//!
//! All variables use the `MAILLENS_` prefix with a `__` separator for nested
//! config paths (e.g., `MAILLENS_WORKER__BASE_URL` sets `worker.base_url`).

/// An environment variable definition
#[derive(Debug, Clone)]
pub struct EnvVar {
    /// Environment variable name (e.g., "MAILLENS_WORKER__BASE_URL")
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Category for grouping in listings
    pub category: EnvVarCategory,
    /// Default value if not set
    pub default: Option<&'static str>,
    /// Example value
    pub example: Option<&'static str>,
}

impl EnvVar {
    /// Dotted config key this variable overrides, e.g. "worker.base_url"
    pub fn config_key(&self) -> String {
        self.name
            .trim_start_matches("MAILLENS_")
            .split("__")
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Current value in the process environment
    pub fn current_value(&self) -> Option<String> {
        std::env::var(self.name).ok()
    }
}

/// Categories for organizing environment variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVarCategory {
    /// Ingest worker connection
    Worker,
    /// Wizard timing and defaults
    Wizard,
    /// File path configuration
    Paths,
    /// Logging configuration
    Logging,
}

impl EnvVarCategory {
    /// Display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvVarCategory::Worker => "Worker",
            EnvVarCategory::Wizard => "Wizard",
            EnvVarCategory::Paths => "Paths",
            EnvVarCategory::Logging => "Logging",
        }
    }

    /// All categories in display order
    pub fn all() -> &'static [EnvVarCategory] {
        &[
            EnvVarCategory::Worker,
            EnvVarCategory::Wizard,
            EnvVarCategory::Paths,
            EnvVarCategory::Logging,
        ]
    }
}

/// Static registry of all documented environment variables
pub static ENV_VARS: &[EnvVar] = &[
    // === Worker ===
    EnvVar {
        name: "MAILLENS_WORKER__BASE_URL",
        description: "Base URL of the local ingest worker",
        category: EnvVarCategory::Worker,
        default: Some("http://127.0.0.1:8000"),
        example: Some("http://127.0.0.1:9000"),
    },
    EnvVar {
        name: "MAILLENS_WORKER__REQUEST_TIMEOUT_SECS",
        description: "Per-request timeout for worker calls, in seconds",
        category: EnvVarCategory::Worker,
        default: Some("30"),
        example: Some("10"),
    },
    // === Wizard ===
    EnvVar {
        name: "MAILLENS_WIZARD__NAV_LOCK_MS",
        description: "Interaction lock after a step change, in milliseconds",
        category: EnvVarCategory::Wizard,
        default: Some("450"),
        example: Some("0"),
    },
    EnvVar {
        name: "MAILLENS_WIZARD__START_LOCK_MS",
        description: "Interaction lock after ingestion starts, in milliseconds",
        category: EnvVarCategory::Wizard,
        default: Some("600"),
        example: None,
    },
    EnvVar {
        name: "MAILLENS_WIZARD__CANCEL_LOCK_MS",
        description: "Interaction lock after a cancel, in milliseconds",
        category: EnvVarCategory::Wizard,
        default: Some("800"),
        example: None,
    },
    EnvVar {
        name: "MAILLENS_WIZARD__WARMUP_BUDGET_MS",
        description: "How long to wait for the worker to report a run underway",
        category: EnvVarCategory::Wizard,
        default: Some("3000"),
        example: Some("5000"),
    },
    EnvVar {
        name: "MAILLENS_WIZARD__WARMUP_INTERVAL_MS",
        description: "Delay between warm-up progress polls, in milliseconds",
        category: EnvVarCategory::Wizard,
        default: Some("150"),
        example: None,
    },
    EnvVar {
        name: "MAILLENS_WIZARD__POLL_INTERVAL_MS",
        description: "Progress poll interval while ingesting, in milliseconds",
        category: EnvVarCategory::Wizard,
        default: Some("1000"),
        example: Some("500"),
    },
    EnvVar {
        name: "MAILLENS_WIZARD__MAX_POLL_FAILURES",
        description: "Consecutive failed progress polls before giving up (0 = never)",
        category: EnvVarCategory::Wizard,
        default: Some("3"),
        example: Some("0"),
    },
    EnvVar {
        name: "MAILLENS_WIZARD__COMPLETION_EMAIL_LIMIT",
        description: "Latest emails shown after a completed ingest",
        category: EnvVarCategory::Wizard,
        default: Some("10"),
        example: Some("25"),
    },
    EnvVar {
        name: "MAILLENS_WIZARD__DEFAULT_SOURCE",
        description: "Source kind preselected when the wizard opens",
        category: EnvVarCategory::Wizard,
        default: Some("emlx"),
        example: None,
    },
    // === Paths ===
    EnvVar {
        name: "MAILLENS_PATHS__STATE",
        description: "Directory holding the workspace registry and log files",
        category: EnvVarCategory::Paths,
        default: None,
        example: Some("/var/lib/maillens"),
    },
    // === Logging ===
    EnvVar {
        name: "MAILLENS_LOGGING__LEVEL",
        description: "Log level filter (trace, debug, info, warn, error); RUST_LOG takes precedence",
        category: EnvVarCategory::Logging,
        default: Some("info"),
        example: Some("debug"),
    },
    EnvVar {
        name: "MAILLENS_LOGGING__TO_FILE",
        description: "Write logs to a timestamped file under the state directory",
        category: EnvVarCategory::Logging,
        default: Some("false"),
        example: Some("true"),
    },
];

/// Get all environment variables for a given category
pub fn env_vars_for_category(category: EnvVarCategory) -> impl Iterator<Item = &'static EnvVar> {
    ENV_VARS.iter().filter(move |v| v.category == category)
}

/// Get environment variables grouped by category
pub fn env_vars_by_category() -> Vec<(EnvVarCategory, Vec<&'static EnvVar>)> {
    EnvVarCategory::all()
        .iter()
        .map(|cat| {
            let vars: Vec<&EnvVar> = env_vars_for_category(*cat).collect();
            (*cat, vars)
        })
        .filter(|(_, vars)| !vars.is_empty())
        .collect()
}
