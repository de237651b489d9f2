//! Environment-driven configuration

use crate::calendar::DEFAULT_CALENDAR_ID;
use crate::plan::DEFAULT_TIME_ZONE;
use crate::state_machine::state::DEFAULT_TERMINATION_SENTINEL;
use crate::tools::SyncPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_TURNS: u32 = 10;
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Hard upper bound on participant turns
    pub max_turns: u32,
    pub termination_sentinel: String,
    /// Storage key for this session's plan. `None` keys the plan by session
    /// id; a fixed key makes sessions share (and serialize on) one slot.
    pub plan_key: Option<String>,
    /// Upper bound on a single participant turn
    pub turn_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            termination_sentinel: DEFAULT_TERMINATION_SENTINEL.to_string(),
            plan_key: None,
            turn_timeout: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    #[must_use]
    pub fn with_plan_key(mut self, key: impl Into<String>) -> Self {
        self.plan_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// Storage key for `session_id`
    pub fn plan_key_for(&self, session_id: &str) -> String {
        self.plan_key
            .clone()
            .unwrap_or_else(|| session_id.to_string())
    }
}

/// Settings shared by the persist and sync tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub calendar_id: String,
    /// Applied to records that omit a timezone
    pub default_time_zone: String,
    pub sync_policy: SyncPolicy,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            default_time_zone: DEFAULT_TIME_ZONE.to_string(),
            sync_policy: SyncPolicy::default(),
        }
    }
}

/// Inference provider settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway base URL; when set the gateway handles authentication
    pub gateway: Option<String>,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Everything the binary needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub llm: LlmConfig,
    /// Bearer token for the calendar API
    pub calendar_token: Option<String>,
    pub tools: ToolSettings,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparsable values fall back
    /// to their defaults with a warning.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let db_path = var("STUDY_PLANNER_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.study-planner/planner.db"))
            },
            PathBuf::from,
        );

        let llm = LlmConfig {
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            gateway: var("LLM_GATEWAY"),
            model: var("STUDY_PLANNER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let sync_policy = var("STUDY_PLANNER_SYNC_POLICY")
            .and_then(|raw| {
                raw.parse()
                    .map_err(|e: String| tracing::warn!(error = %e, "Ignoring sync policy"))
                    .ok()
            })
            .unwrap_or_default();

        let tools = ToolSettings {
            calendar_id: var("STUDY_PLANNER_CALENDAR_ID")
                .unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string()),
            default_time_zone: var("STUDY_PLANNER_TIME_ZONE")
                .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string()),
            sync_policy,
        };

        let session = SessionConfig {
            max_turns: parse_or("STUDY_PLANNER_MAX_TURNS", var("STUDY_PLANNER_MAX_TURNS"))
                .unwrap_or(DEFAULT_MAX_TURNS),
            termination_sentinel: DEFAULT_TERMINATION_SENTINEL.to_string(),
            plan_key: var("STUDY_PLANNER_PLAN_KEY"),
            turn_timeout: parse_or(
                "STUDY_PLANNER_TURN_TIMEOUT_SECS",
                var("STUDY_PLANNER_TURN_TIMEOUT_SECS"),
            )
            .map(Duration::from_secs),
        };

        Self {
            db_path,
            llm,
            calendar_token: var("GOOGLE_CALENDAR_TOKEN"),
            tools,
            session,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}
