//! Game configuration
//!
//! Every tunable of the simulation lives here. Values can be overridden from
//! JSON; missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Result, SimError};
use crate::sim::BulletPreset;

/// Player character setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub width: f32,
    pub height: f32,
    /// Pixels moved per tick while a direction is held
    pub step_size: f32,
    pub life: i32,
    pub max_life: i32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            width: 16.0,
            height: 16.0,
            step_size: 3.0,
            life: 1,
            max_life: 1,
        }
    }
}

/// Enemy fleet formation and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub rows: u32,
    pub cols: u32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub enemy_size: f32,
    pub spacing: f32,
    pub enemy_life: i32,
    /// Life impact of touching an enemy
    pub contact_impact: i32,
    /// Shared pacing speed at spawn
    pub initial_step: f32,
    /// Added to the shared speed whenever a member leaves the stage
    pub speed_increment: f32,
    /// Horizontal pacing lane width
    pub pace_span: f32,
    /// Distance of each slide down
    pub slide_distance: f32,
    pub min_fire_ms: f64,
    pub max_fire_ms: f64,
    /// Delay before row `n` starts pacing is `n * row_start_delay_ms`
    pub row_start_delay_ms: f64,
    /// Slide delay is `|row - last_row| * slide_delay_ms`
    pub slide_delay_ms: f64,
    pub bullet: BulletPreset,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 8,
            origin_x: 0.0,
            origin_y: 0.0,
            enemy_size: 16.0,
            spacing: 10.0,
            enemy_life: 1,
            contact_impact: -1,
            initial_step: 1.0,
            speed_increment: 0.075,
            pace_span: 270.0,
            slide_distance: 16.0,
            min_fire_ms: 1000.0,
            max_fire_ms: 24000.0,
            row_start_delay_ms: 500.0,
            slide_delay_ms: 750.0,
            bullet: BulletPreset::UpOrDown,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// RNG seed for fire intervals
    pub seed: u64,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub scheduler_capacity: usize,
    pub player: PlayerConfig,
    pub fleet: FleetConfig,
    /// Maximum vertical gap for two characters to count as touching
    pub collision_threshold: f32,
    /// Knockback distance applied by bullets
    pub knockback: f32,
    /// Movement lock after taking damage
    pub hit_lock_ms: f64,
    /// Ghost period after taking damage
    pub invulnerable_ms: f64,
    pub ghost_alpha: f32,
    pub bullets_hit_bullets: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            viewport_width: VIEWPORT_WIDTH,
            viewport_height: VIEWPORT_HEIGHT,
            scheduler_capacity: crate::sim::scheduler::DEFAULT_CAPACITY,
            player: PlayerConfig::default(),
            fleet: FleetConfig::default(),
            collision_threshold: COLLISION_THRESHOLD,
            knockback: 8.0,
            hit_lock_ms: 250.0,
            invulnerable_ms: 1000.0,
            ghost_alpha: 0.5,
            bullets_hit_bullets: false,
        }
    }
}

impl GameConfig {
    /// Parse and validate a JSON override
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SimError::InvalidConfig(msg.to_string()));
        if self.viewport_width <= 0.0 || self.viewport_height <= 0.0 {
            return invalid("viewport must have a positive size");
        }
        if self.scheduler_capacity == 0 {
            return invalid("scheduler capacity must be positive");
        }
        if self.player.step_size <= 0.0 {
            return invalid("player step size must be positive");
        }
        if self.fleet.initial_step <= 0.0 {
            return invalid("fleet step must be positive");
        }
        if self.fleet.min_fire_ms > self.fleet.max_fire_ms {
            return invalid("fleet fire interval is inverted");
        }
        if !(0.0..=1.0).contains(&self.ghost_alpha) {
            return invalid("ghost alpha must be within 0..=1");
        }
        Ok(())
    }

    /// LocalStorage key of the optional JSON override
    const STORAGE_KEY: &'static str = "zombie_raid_config";

    /// Read the optional override from LocalStorage (WASM only). Nothing is
    /// ever written back. Without one, the defaults are seeded from the
    /// clock.
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(config) => {
                        log::info!("Loaded config override from LocalStorage");
                        return config;
                    }
                    Err(e) => log::warn!("Ignoring config override: {}", e),
                }
            }
        }

        // Without an override every page load plays a different raid
        let seed = js_sys::Date::now() as u64;
        log::info!("Using default config, seed {}", seed);
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Native stub
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        log::debug!("No config store on native; key {}", Self::STORAGE_KEY);
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GameConfig::from_json(r#"{ "seed": 7, "fleet": { "rows": 2 } }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.fleet.rows, 2);
        assert_eq!(config.fleet.cols, 8);
        assert_eq!(config.player.step_size, 3.0);
    }

    #[test]
    fn test_round_trip() {
        let config = GameConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(GameConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            GameConfig::from_json(r#"{ "viewport_width": 0 }"#),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(GameConfig::from_json("not json").is_err());
        let mut config = GameConfig::default();
        config.fleet.min_fire_ms = 5.0;
        config.fleet.max_fire_ms = 1.0;
        assert!(config.validate().is_err());
    }
}
