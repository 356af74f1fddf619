//! Configuration management
//!
//! This module handles loading, validation, and management of the Elicit
//! configuration. Configuration is stored in TOML format at
//! ~/.elicit/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **session**: Turn limits, history bounds, fallback strategy, ranking policy
//! - **signals**: Active signal names and detector thresholds
//! - **phases**: Phase thresholds and per-phase strategy multipliers/bonuses
//! - **strategies**: Strategy definitions with their signal-weight maps
//!
//! Unknown signal keys inside a strategy's `signal_weights` are not validation
//! errors. They are dropped when the strategy is compiled and reported on the
//! compiled definition.
//!
//! # Examples
//!
//! ```no_run
//! use elicit_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Fallback strategy: {}", config.session.fallback_strategy);
//! # Ok(())
//! # }
//! ```

use crate::phase::Phase;
use crate::scoring::{FocusPreference, NodeBinding, RankingPolicy};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Per-session turn settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Signal detector settings
    #[serde(default)]
    pub signals: SignalsConfig,

    /// Phase thresholds and reweighting
    #[serde(default)]
    pub phases: PhasesConfig,

    /// Strategy definitions, in declaration order
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyConfig>,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// Session-level settings used by the turn orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Stop after this many turns
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Bound on the persisted strategy history
    #[serde(default = "default_strategy_history_len")]
    pub strategy_history_len: usize,

    /// Bound on each concept's response-depth history
    #[serde(default = "default_response_depth_history_len")]
    pub response_depth_history_len: usize,

    /// Node-free strategy selected when ranking produces nothing usable
    #[serde(default = "default_fallback_strategy")]
    pub fallback_strategy: String,

    /// Joint or two-stage ranking
    #[serde(default)]
    pub ranking_policy: RankingPolicy,

    /// Stop once conversation saturation reaches this value (0.0-1.0)
    #[serde(default = "default_saturation_stop_threshold")]
    pub saturation_stop_threshold: f64,

    /// Stop after this many consecutive fallback selections
    #[serde(default = "default_max_consecutive_fallbacks")]
    pub max_consecutive_fallbacks: u32,

    /// Timeout for the response-quality detector, in milliseconds
    #[serde(default = "default_quality_timeout_ms")]
    pub quality_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            strategy_history_len: default_strategy_history_len(),
            response_depth_history_len: default_response_depth_history_len(),
            fallback_strategy: default_fallback_strategy(),
            ranking_policy: RankingPolicy::default(),
            saturation_stop_threshold: default_saturation_stop_threshold(),
            max_consecutive_fallbacks: default_max_consecutive_fallbacks(),
            quality_timeout_ms: default_quality_timeout_ms(),
        }
    }
}

/// Signal detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Signals to compute each turn. Empty means every registered signal.
    #[serde(default)]
    pub active: Vec<String>,

    /// Turns without yield before a concept counts as stagnating
    #[serde(default = "default_stagnation_threshold")]
    pub stagnation_threshold: u32,

    /// Turns over which `node.recency_score` decays to zero
    #[serde(default = "default_recency_horizon")]
    pub recency_horizon: u32,

    /// Longest-chain length that saturates `graph.max_depth`
    #[serde(default = "default_chain_target")]
    pub chain_target: u32,

    /// Degree that saturates `node.edge_count`
    #[serde(default = "default_edge_count_cap")]
    pub edge_count_cap: u32,

    /// Edges per concept that saturates the edge-density term
    #[serde(default = "default_target_edge_density")]
    pub target_edge_density: f64,

    /// Turn count that saturates the turn-floor term of saturation
    #[serde(default = "default_turn_floor")]
    pub turn_floor: u32,

    /// Concept count that saturates `graph.node_count`
    #[serde(default = "default_node_count_target")]
    pub node_count_target: usize,

    /// EWMA smoothing factor for concept-growth velocity (0.0-1.0)
    #[serde(default = "default_velocity_alpha")]
    pub velocity_alpha: f64,

    /// Number of recent strategy selections the temporal signals look at
    #[serde(default = "default_repetition_window")]
    pub repetition_window: usize,

    /// Saturation at which `meta.saturated` turns true (0.0-1.0)
    #[serde(default = "default_saturated_threshold")]
    pub saturated_threshold: f64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            active: Vec::new(),
            stagnation_threshold: default_stagnation_threshold(),
            recency_horizon: default_recency_horizon(),
            chain_target: default_chain_target(),
            edge_count_cap: default_edge_count_cap(),
            target_edge_density: default_target_edge_density(),
            turn_floor: default_turn_floor(),
            node_count_target: default_node_count_target(),
            velocity_alpha: default_velocity_alpha(),
            repetition_window: default_repetition_window(),
            saturated_threshold: default_saturated_threshold(),
        }
    }
}

/// Phase thresholds plus the per-phase reweighting tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesConfig {
    /// Graphs with fewer concepts than this stay in the early phase
    #[serde(default = "default_early_max_concepts")]
    pub early_max_concepts: usize,

    /// Graphs with at least this many concepts are late
    #[serde(default = "default_late_min_concepts")]
    pub late_min_concepts: usize,

    /// Saturation at or above this value is late regardless of size
    #[serde(default = "default_late_saturation")]
    pub late_saturation: f64,

    #[serde(default = "default_early_phase")]
    pub early: PhaseConfig,

    #[serde(default = "default_mid_phase")]
    pub mid: PhaseConfig,

    #[serde(default = "default_late_phase")]
    pub late: PhaseConfig,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            early_max_concepts: default_early_max_concepts(),
            late_min_concepts: default_late_min_concepts(),
            late_saturation: default_late_saturation(),
            early: default_early_phase(),
            mid: default_mid_phase(),
            late: default_late_phase(),
        }
    }
}

impl PhasesConfig {
    /// Reweighting table for the given phase
    pub fn for_phase(&self, phase: Phase) -> &PhaseConfig {
        match phase {
            Phase::Early => &self.early,
            Phase::Mid => &self.mid,
            Phase::Late => &self.late,
        }
    }
}

/// Per-phase multiplicative weight and additive bonus, keyed by strategy name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default, alias = "signal_weights")]
    pub strategy_weights: BTreeMap<String, f64>,

    #[serde(default, alias = "phase_bonuses")]
    pub bonuses: BTreeMap<String, f64>,
}

impl PhaseConfig {
    /// Multiplier for a strategy, 1.0 when the phase has no entry
    pub fn multiplier(&self, strategy: &str) -> f64 {
        self.strategy_weights.get(strategy).copied().unwrap_or(1.0)
    }

    /// Bonus for a strategy, 0.0 when the phase has no entry
    pub fn bonus(&self, strategy: &str) -> f64 {
        self.bonuses.get(strategy).copied().unwrap_or(0.0)
    }
}

/// Strategy definition as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,

    /// Technique the question generator should apply
    pub technique: String,

    #[serde(default)]
    pub node_binding: NodeBinding,

    /// Signal key (e.g. `node.exhausted`, `llm.depth_bucket.low`) to weight
    #[serde(default)]
    pub signal_weights: BTreeMap<String, f64>,

    #[serde(default)]
    pub focus_preference: FocusPreference,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.elicit")
}

fn default_max_turns() -> u32 {
    20
}

fn default_strategy_history_len() -> usize {
    10
}

fn default_response_depth_history_len() -> usize {
    5
}

fn default_fallback_strategy() -> String {
    "broaden".to_string()
}

fn default_saturation_stop_threshold() -> f64 {
    0.85
}

fn default_max_consecutive_fallbacks() -> u32 {
    3
}

fn default_quality_timeout_ms() -> u64 {
    1500
}

fn default_stagnation_threshold() -> u32 {
    3
}

fn default_recency_horizon() -> u32 {
    10
}

fn default_chain_target() -> u32 {
    4
}

fn default_edge_count_cap() -> u32 {
    10
}

fn default_target_edge_density() -> f64 {
    2.0
}

fn default_turn_floor() -> u32 {
    15
}

fn default_node_count_target() -> usize {
    25
}

fn default_velocity_alpha() -> f64 {
    0.4
}

fn default_repetition_window() -> usize {
    5
}

fn default_saturated_threshold() -> f64 {
    0.75
}

fn default_early_max_concepts() -> usize {
    5
}

fn default_late_min_concepts() -> usize {
    25
}

fn default_late_saturation() -> f64 {
    0.7
}

fn phase_table(weights: &[(&str, f64)], bonuses: &[(&str, f64)]) -> PhaseConfig {
    PhaseConfig {
        strategy_weights: weights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        bonuses: bonuses.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    }
}

fn default_early_phase() -> PhaseConfig {
    phase_table(
        &[("broaden", 1.3), ("deepen", 0.8), ("reflect", 0.5)],
        &[("broaden", 0.2)],
    )
}

fn default_mid_phase() -> PhaseConfig {
    phase_table(&[("deepen", 1.3), ("connect", 1.1)], &[("deepen", 0.2)])
}

fn default_late_phase() -> PhaseConfig {
    phase_table(
        &[("reflect", 1.4), ("connect", 1.2), ("broaden", 0.7)],
        &[("reflect", 0.3)],
    )
}

fn strategy(
    name: &str,
    technique: &str,
    node_binding: NodeBinding,
    weights: &[(&str, f64)],
    focus_preference: FocusPreference,
) -> StrategyConfig {
    StrategyConfig {
        name: name.to_string(),
        technique: technique.to_string(),
        node_binding,
        signal_weights: weights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        focus_preference,
    }
}

fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        strategy(
            "deepen",
            "laddering",
            NodeBinding::Required,
            &[
                ("llm.depth_bucket.mid", 0.4),
                ("llm.engagement", 0.3),
                ("node.opportunity", 0.6),
                ("node.is_current_focus", 0.3),
                ("node.exhausted", -1.0),
                ("temporal.strategy_repetition", -0.3),
            ],
            FocusPreference::Current,
        ),
        strategy(
            "clarify",
            "probing",
            NodeBinding::Required,
            &[
                ("llm.certainty", -0.4),
                ("llm.specificity", -0.3),
                ("node.is_current_focus", 0.5),
                ("node.focus_streak.high", -0.4),
                ("temporal.strategy_repetition", -0.5),
            ],
            FocusPreference::Current,
        ),
        strategy(
            "connect",
            "relating",
            NodeBinding::Required,
            &[
                ("node.is_orphan", 0.8),
                ("node.recency_score", 0.2),
                ("graph.orphan_ratio", 0.4),
                ("temporal.strategy_repetition", -0.3),
            ],
            FocusPreference::LeastExplored,
        ),
        strategy(
            "revitalize",
            "elaboration",
            NodeBinding::Required,
            &[
                ("node.yield_stagnation", 0.4),
                ("node.focus_streak.none", 0.3),
                ("node.exhaustion_score", -0.4),
                ("llm.engagement", -0.2),
                ("temporal.turns_since_strategy", 0.2),
            ],
            FocusPreference::LeastExplored,
        ),
        strategy(
            "broaden",
            "exploration",
            NodeBinding::Unbound,
            &[
                ("llm.depth_bucket.low", 0.4),
                ("graph.max_depth", 0.2),
                ("meta.phase.early", 0.3),
                ("temporal.strategy_repetition", -0.4),
            ],
            FocusPreference::Recent,
        ),
        strategy(
            "reflect",
            "summarizing",
            NodeBinding::Unbound,
            &[
                ("graph.chain_complete", 0.5),
                ("meta.saturation", 0.6),
                ("meta.phase.late", 0.3),
                ("temporal.strategy_repetition", -0.6),
            ],
            FocusPreference::Shallowest,
        ),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location (~/.elicit/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.elicit/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".elicit").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            session: SessionConfig::default(),
            signals: SignalsConfig::default(),
            phases: PhasesConfig::default(),
            strategies: default_strategies(),
        }
    }

    /// Look up a strategy by name
    pub fn strategy(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies.iter().find(|s| s.name == name)
    }

    /// Path of the sqlite session store inside the data directory
    pub fn session_db_path(&self) -> PathBuf {
        self.core.data_dir.join("sessions.db")
    }

    /// Validate and process configuration
    ///
    /// Expands `~` in the data directory; does not create it.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.strategies.is_empty() {
            return Err(EngineError::Config(
                "At least one strategy must be defined".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if strategy.name.trim().is_empty() {
                return Err(EngineError::Config(
                    "Strategy names must not be empty".to_string(),
                ));
            }
            if !seen.insert(strategy.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "Duplicate strategy '{}'",
                    strategy.name
                )));
            }
            if strategy.signal_weights.values().any(|w| !w.is_finite()) {
                return Err(EngineError::Config(format!(
                    "Strategy '{}' has a non-finite signal weight",
                    strategy.name
                )));
            }
        }

        match self.strategy(&self.session.fallback_strategy) {
            None => {
                return Err(EngineError::Config(format!(
                    "Fallback strategy '{}' is not defined",
                    self.session.fallback_strategy
                )))
            }
            Some(fallback) if fallback.node_binding == NodeBinding::Required => {
                return Err(EngineError::Config(format!(
                    "Fallback strategy '{}' must have node_binding = \"none\"",
                    fallback.name
                )))
            }
            Some(_) => {}
        }

        for (name, value) in [
            (
                "session.saturation_stop_threshold",
                self.session.saturation_stop_threshold,
            ),
            ("signals.velocity_alpha", self.signals.velocity_alpha),
            (
                "signals.saturated_threshold",
                self.signals.saturated_threshold,
            ),
            ("phases.late_saturation", self.phases.late_saturation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if self.session.strategy_history_len == 0 || self.session.response_depth_history_len == 0
        {
            return Err(EngineError::Config(
                "History lengths must be greater than zero".to_string(),
            ));
        }

        if self.phases.early_max_concepts > self.phases.late_min_concepts {
            return Err(EngineError::Config(
                "phases.early_max_concepts must not exceed phases.late_min_concepts".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
