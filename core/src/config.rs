//! Process-wide configuration (spec §6 table). Defaults match the source;
//! every field is overridable via `HEXGAME_<FIELD>` environment variables,
//! generalizing the teacher's `GameConfig.json` hot-reload idiom to a
//! scaled-out process that may not share a filesystem with its peers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub start_delay_ms: u64,
    pub auto_expand_interval_ms: u64,
    pub auto_capture_threshold: u32,
    pub hex_value: i64,
    pub exp_growth: f64,
    pub occupied_base: i64,
    pub attack_mult: f64,
    pub base_income: i64,
    pub starting_points: i64,
    pub starting_max_points: i64,
    pub upgrade_bank_cost: i64,
    pub upgrade_fort_cost: i64,
    pub upgrade_city_cost: i64,
    pub player_colors: Vec<String>,
    pub min_ready: usize,
    pub economy_tick_ms: u64,
    pub drain_grace_secs: u64,
    pub session_ttl_secs: u64,
    pub event_log_cap: usize,
    pub kv_command_timeout_ms: u64,
    pub kv_connect_timeout_ms: u64,
    pub kv_pool_size: usize,
    pub mountain_chains_min: u32,
    pub mountain_chains_max: u32,
    pub mountain_chain_length_min: u32,
    pub mountain_chain_length_max: u32,
    pub mountain_chain_spacing: i32,
    pub mountain_area_size: i32,
    pub mountain_density: f64,
    pub mountain_zigzag_chance: f64,
    pub river_count: u32,
    pub river_length: u32,
    pub river_min_spacing: i32,
    pub river_fork_chance: f64,
    pub river_fork_length: u32,
    pub river_discount: f64,
    pub fort_strength_mult: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            start_delay_ms: 5_000,
            auto_expand_interval_ms: 10_000,
            auto_capture_threshold: 3,
            hex_value: 10,
            exp_growth: 5.0,
            occupied_base: 5,
            attack_mult: 2.5,
            base_income: 2,
            starting_points: 200,
            starting_max_points: 200,
            upgrade_bank_cost: 100,
            upgrade_fort_cost: 300,
            upgrade_city_cost: 200,
            player_colors: [
                "#e74c3c", "#3498db", "#2ecc71", "#f1c40f", "#9b59b6", "#1abc9c", "#e67e22",
                "#34495e",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_ready: 2,
            economy_tick_ms: 1_000,
            drain_grace_secs: 60,
            session_ttl_secs: 3_600,
            event_log_cap: 10_000,
            kv_command_timeout_ms: 5_000,
            kv_connect_timeout_ms: 10_000,
            kv_pool_size: 10,
            mountain_chains_min: 3,
            mountain_chains_max: 10,
            mountain_chain_length_min: 8,
            mountain_chain_length_max: 10,
            mountain_chain_spacing: 6,
            mountain_area_size: 60,
            mountain_density: 0.15,
            mountain_zigzag_chance: 0.2,
            river_count: 3,
            river_length: 20,
            river_min_spacing: 15,
            river_fork_chance: 0.3,
            river_fork_length: 8,
            river_discount: 0.7,
            fort_strength_mult: 2.0,
        }
    }
}

impl Settings {
    /// Overlays environment variables of the form `HEXGAME_START_DELAY_MS`
    /// onto the defaults. Unknown or malformed keys are ignored; a
    /// misconfigured env should not stop the process from booting with sane
    /// values, it should fall back to them.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        macro_rules! overlay {
            ($field:ident) => {
                if let Ok(raw) = std::env::var(concat!("HEXGAME_", stringify!($field))) {
                    if let Ok(parsed) = raw.parse() {
                        settings.$field = parsed;
                    }
                }
            };
        }
        overlay!(start_delay_ms);
        overlay!(auto_expand_interval_ms);
        overlay!(auto_capture_threshold);
        overlay!(base_income);
        overlay!(starting_points);
        overlay!(starting_max_points);
        overlay!(min_ready);
        overlay!(economy_tick_ms);
        overlay!(drain_grace_secs);
        overlay!(kv_pool_size);
        settings
    }
}
