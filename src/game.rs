//! Game bootstrap
//!
//! Builds the world, drops the player in, starts the collision engine and
//! lets the raid begin. The host drives it with `frame` and `render`.

use crate::config::GameConfig;
use crate::error::Result;
use crate::renderer::RenderSink;
use crate::sim::{Ai, Button, Control, Sim, ZombieRaid};

pub struct Game {
    sim: Sim,
    raid: ZombieRaid,
}

impl Game {
    pub fn new(config: GameConfig) -> Result<Self> {
        let fleet = config.fleet.clone();
        let mut sim = Sim::new(config)?;
        sim.spawn_player()?;
        sim.start_player_control()?;
        sim.start_engine()?;

        let mut raid = ZombieRaid::new(fleet);
        raid.start(&mut sim)?;

        log::info!(
            "Game ready: {}x{} viewport, {} enemies",
            sim.config().viewport_width,
            sim.config().viewport_height,
            raid.characters().len()
        );
        Ok(Self { sim, raid })
    }

    /// Advance to `now_ms`. Start presses toggle pause; other presses made
    /// while paused are dropped.
    pub fn frame(&mut self, now_ms: f64) {
        while self.sim.joystick.take(Button::Start) {
            self.sim.toggle_pause();
        }
        if self.sim.is_paused() {
            self.sim.joystick.clear_buttons();
        }
        self.sim.frame(now_ms);
    }

    pub fn render(&mut self, sink: &mut dyn RenderSink) {
        self.sim.flush_render(sink);
    }

    pub fn key_down(&mut self, control: Control) {
        self.sim.joystick.key_down(control);
    }

    pub fn key_up(&mut self, control: Control) {
        self.sim.joystick.key_up(control);
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut Sim {
        &mut self.sim
    }

    pub fn raid(&self) -> &ZombieRaid {
        &self.raid
    }

    /// Raid members still on the stage
    pub fn enemies_alive(&self) -> usize {
        self.raid
            .characters()
            .iter()
            .filter(|&&enemy| self.sim.is_character_alive(enemy))
            .count()
    }

    /// Player still on the stage
    pub fn is_player_alive(&self) -> bool {
        self.sim
            .player()
            .is_some_and(|player| self.sim.is_character_alive(player))
    }
}
