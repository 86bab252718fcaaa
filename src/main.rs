//! Zombie Raid entry point
//!
//! The browser build renders into `#game` and runs on animation frames. The
//! native build plays a short headless round and logs how it went.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use web_sys::KeyboardEvent;

    use zombie_raid::platform::event_control;
    use zombie_raid::renderer::DomRenderer;
    use zombie_raid::{Game, GameConfig};

    /// Element the viewport is mounted under
    const ROOT_ID: &str = "game";

    struct Host {
        game: Game,
        renderer: DomRenderer,
    }

    pub fn run() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Logger already set: {}", e).into());
        }

        log::info!("Zombie Raid starting...");

        let window = web_sys::window().ok_or("no window")?;
        let document = window.document().ok_or("no document")?;
        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        let game = Game::new(GameConfig::load()).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let renderer = DomRenderer::new(ROOT_ID, game.sim().viewport())
            .ok_or_else(|| JsValue::from_str(&format!("no #{} element", ROOT_ID)))?;
        let host = Rc::new(RefCell::new(Host { game, renderer }));

        setup_keyboard(&window, host.clone())?;
        request_animation_frame(host);
        Ok(())
    }

    fn setup_keyboard(window: &web_sys::Window, host: Rc<RefCell<Host>>) -> Result<(), JsValue> {
        {
            let host = host.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                if let Some(control) = event_control(&event) {
                    event.prevent_default();
                    host.borrow_mut().game.key_down(control);
                }
            });
            window.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            if let Some(control) = event_control(&event) {
                event.prevent_default();
                host.borrow_mut().game.key_up(control);
            }
        });
        window.add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref())?;
        closure.forget();
        Ok(())
    }

    fn request_animation_frame(host: Rc<RefCell<Host>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(host, time);
        });
        if let Err(e) = window.request_animation_frame(closure.as_ref().unchecked_ref()) {
            log::error!("requestAnimationFrame failed: {:?}", e);
            return;
        }
        closure.forget();
    }

    fn game_loop(host: Rc<RefCell<Host>>, time: f64) {
        {
            let mut h = host.borrow_mut();
            let Host { game, renderer } = &mut *h;
            game.frame(time);
            game.render(renderer);
        }

        request_animation_frame(host);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() -> Result<(), JsValue> {
    wasm_game::run()
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> zombie_raid::Result<()> {
    use zombie_raid::consts::FRAME_MS;
    use zombie_raid::sim::{Button, Control, Heading};
    use zombie_raid::{Game, GameConfig};

    /// About thirty seconds of play
    const FRAMES: u32 = 1875;

    env_logger::init();
    log::info!("Zombie Raid (native) starting a headless round...");

    let mut game = Game::new(GameConfig::load())?;

    // Strafe back and forth, firing every few frames
    for frame in 1..=FRAMES {
        if frame % 120 == 1 {
            let (release, hold) = if (frame / 120) % 2 == 0 {
                (Heading::Right, Heading::Left)
            } else {
                (Heading::Left, Heading::Right)
            };
            game.key_up(Control::Move(release));
            game.key_down(Control::Move(hold));
        }
        if frame % 8 == 0 {
            game.key_up(Control::Press(Button::Action));
        }
        game.frame(f64::from(frame) * FRAME_MS);

        if !game.is_player_alive() || game.enemies_alive() == 0 {
            break;
        }
    }

    log::info!(
        "Round over after {} ticks: player {}, {} enemies left",
        game.sim().ticks(),
        if game.is_player_alive() { "alive" } else { "down" },
        game.enemies_alive()
    );
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
