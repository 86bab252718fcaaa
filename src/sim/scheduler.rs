//! Per-frame callback scheduler
//!
//! Three queues drive all time-based behavior:
//! - tick callbacks, invoked once per tick in registration order
//! - pending completions, run after the callback pass of the following tick
//! - millisecond timers, fired from the host clock whether or not ticks are paused
//!
//! The scheduler is generic over the context it hands to callbacks so that the
//! context can own it; `run_frame` performs the take/call/restore dance.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, SimError};

/// Default number of callback slots before compaction
pub const DEFAULT_CAPACITY: usize = 32_000;

/// Handle to a registered tick callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(u64);

/// Handle to a pending timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub type TickFn<C> = Box<dyn FnMut(&mut C)>;
pub type OnceFn<C> = Box<dyn FnOnce(&mut C)>;

enum Callback<C> {
    Every(TickFn<C>),
    Once(OnceFn<C>),
}

struct Slot<C> {
    id: TickId,
    /// `None` while the callback is running
    callback: Option<Callback<C>>,
}

struct Deferred<C> {
    due_tick: u64,
    callback: OnceFn<C>,
}

struct Timer<C> {
    id: TimerId,
    due_ms: f64,
    callback: OnceFn<C>,
}

/// Ordered callback list with holes, compaction and pause
pub struct Scheduler<C> {
    slots: Vec<Option<Slot<C>>>,
    index: HashMap<TickId, usize>,
    capacity: usize,
    next_id: u64,
    paused: bool,
    in_pass: bool,
    ticks: u64,
    completions: VecDeque<Deferred<C>>,
    timers: Vec<Timer<C>>,
    next_timer: u64,
    now_ms: f64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<C> Scheduler<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            capacity: capacity.max(1),
            next_id: 0,
            paused: false,
            in_pass: false,
            ticks: 0,
            completions: VecDeque::new(),
            timers: Vec::new(),
            next_timer: 0,
            now_ms: 0.0,
        }
    }

    /// Invoke `callback` every tick until unregistered
    pub fn register(&mut self, callback: impl FnMut(&mut C) + 'static) -> Result<TickId> {
        self.push(Callback::Every(Box::new(callback)))
    }

    /// Invoke `callback` on the next tick only
    pub fn register_once(&mut self, callback: impl FnOnce(&mut C) + 'static) -> Result<TickId> {
        self.push(Callback::Once(Box::new(callback)))
    }

    fn push(&mut self, callback: Callback<C>) -> Result<TickId> {
        if self.index.len() >= self.capacity {
            return Err(SimError::SchedulerExhausted(self.capacity));
        }
        // Slots cannot move while a pass is iterating them; the list may
        // overshoot until `end_pass` compacts it.
        if self.slots.len() >= self.capacity && !self.in_pass {
            self.compact();
        }

        let id = TickId(self.next_id);
        self.next_id += 1;
        self.index.insert(id, self.slots.len());
        self.slots.push(Some(Slot {
            id,
            callback: Some(callback),
        }));
        Ok(id)
    }

    /// Remove a callback. Returns false when it was not registered.
    pub fn unregister(&mut self, id: TickId) -> bool {
        match self.index.remove(&id) {
            Some(slot) => {
                self.slots[slot] = None;
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: TickId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of live callbacks
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of slots including holes
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Queue a one-shot that runs after the callback pass of the next tick
    pub fn defer(&mut self, callback: impl FnOnce(&mut C) + 'static) {
        self.completions.push_back(Deferred {
            due_tick: self.ticks + 1,
            callback: Box::new(callback),
        });
    }

    pub fn pending_completions(&self) -> usize {
        self.completions.len()
    }

    /// Run `callback` once `delay_ms` of host time has elapsed
    pub fn set_timeout(
        &mut self,
        delay_ms: f64,
        callback: impl FnOnce(&mut C) + 'static,
    ) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.timers.push(Timer {
            id,
            due_ms: self.now_ms + delay_ms.max(0.0),
            callback: Box::new(callback),
        });
        id
    }

    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        match self.timers.iter().position(|t| t.id == id) {
            Some(pos) => {
                self.timers.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Host clock as of the last frame
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    fn compact(&mut self) {
        let before = self.slots.len();
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                self.index.insert(slot.id, pos);
            }
        }
        log::debug!("Scheduler compacted {} -> {} slots", before, self.slots.len());
    }

    fn begin_pass(&mut self) -> usize {
        self.in_pass = true;
        self.ticks += 1;
        self.slots.len()
    }

    fn end_pass(&mut self) {
        self.in_pass = false;
        if self.slots.len() >= self.capacity {
            self.compact();
        }
    }

    fn take(&mut self, pos: usize) -> Option<(TickId, Callback<C>)> {
        let slot = self.slots.get_mut(pos)?.as_mut()?;
        let callback = slot.callback.take()?;
        Some((slot.id, callback))
    }

    fn restore(&mut self, pos: usize, id: TickId, callback: Callback<C>) {
        // Dropped if the callback unregistered itself while running
        if let Some(Some(slot)) = self.slots.get_mut(pos) {
            if slot.id == id && slot.callback.is_none() {
                slot.callback = Some(callback);
            }
        }
    }

    fn pop_due_completion(&mut self) -> Option<OnceFn<C>> {
        if self.completions.front()?.due_tick > self.ticks {
            return None;
        }
        self.completions.pop_front().map(|d| d.callback)
    }

    fn advance_clock(&mut self, now_ms: f64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    fn pop_due_timer(&mut self) -> Option<OnceFn<C>> {
        let now = self.now_ms;
        let pos = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= now)
            .min_by(|(_, a), (_, b)| {
                a.due_ms
                    .partial_cmp(&b.due_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            })
            .map(|(pos, _)| pos)?;
        Some(self.timers.remove(pos).callback)
    }
}

/// A context that owns a scheduler of itself
pub trait Scheduled: Sized {
    fn scheduler(&mut self) -> &mut Scheduler<Self>;

    /// Runs after every callback (tick, completion or timer)
    fn after_callback(&mut self) {}

    /// Runs once at the end of every unpaused tick
    fn after_tick(&mut self) {}
}

/// Fire due timers, then run one tick unless paused
pub fn run_frame<C: Scheduled>(ctx: &mut C, now_ms: f64) {
    fire_timers(ctx, now_ms);
    run_tick(ctx);
}

/// Fire every timer due at `now_ms`. Pause does not apply.
pub fn fire_timers<C: Scheduled>(ctx: &mut C, now_ms: f64) {
    ctx.scheduler().advance_clock(now_ms);
    while let Some(callback) = ctx.scheduler().pop_due_timer() {
        callback(ctx);
        ctx.after_callback();
    }
}

/// Run one tick: the callback pass over the current snapshot, then due completions
pub fn run_tick<C: Scheduled>(ctx: &mut C) {
    if ctx.scheduler().is_paused() {
        return;
    }

    let count = ctx.scheduler().begin_pass();
    for pos in 0..count {
        let Some((id, callback)) = ctx.scheduler().take(pos) else {
            continue;
        };
        match callback {
            Callback::Every(mut f) => {
                f(ctx);
                ctx.scheduler().restore(pos, id, Callback::Every(f));
            }
            Callback::Once(f) => {
                ctx.scheduler().unregister(id);
                f(ctx);
            }
        }
        ctx.after_callback();
    }

    while let Some(completion) = ctx.scheduler().pop_due_completion() {
        completion(ctx);
        ctx.after_callback();
    }

    ctx.scheduler().end_pass();
    ctx.after_tick();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Ctx {
        scheduler: Scheduler<Ctx>,
        log: Vec<String>,
    }

    impl Ctx {
        fn new(capacity: usize) -> Self {
            Self {
                scheduler: Scheduler::new(capacity),
                log: Vec::new(),
            }
        }
    }

    impl Scheduled for Ctx {
        fn scheduler(&mut self) -> &mut Scheduler<Self> {
            &mut self.scheduler
        }
    }

    fn logger(name: &'static str) -> impl FnMut(&mut Ctx) + 'static {
        move |ctx: &mut Ctx| ctx.log.push(name.to_string())
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let mut ctx = Ctx::new(16);
        ctx.scheduler.register(logger("a")).unwrap();
        ctx.scheduler.register(logger("b")).unwrap();
        run_tick(&mut ctx);
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["a", "b", "a", "b"]);
        assert_eq!(ctx.scheduler.ticks(), 2);
    }

    #[test]
    fn test_register_once_runs_once() {
        let mut ctx = Ctx::new(16);
        let id = ctx.scheduler.register_once(|ctx: &mut Ctx| ctx.log.push("once".into())).unwrap();
        run_tick(&mut ctx);
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["once"]);
        assert!(!ctx.scheduler.is_registered(id));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut ctx = Ctx::new(16);
        let id = ctx.scheduler.register(logger("a")).unwrap();
        assert!(ctx.scheduler.unregister(id));
        assert!(!ctx.scheduler.unregister(id));
        run_tick(&mut ctx);
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn test_unregister_during_pass() {
        let mut ctx = Ctx::new(16);
        let later: Rc<Cell<Option<TickId>>> = Rc::new(Cell::new(None));
        let own: Rc<Cell<Option<TickId>>> = Rc::new(Cell::new(None));

        let (later_ref, own_ref) = (later.clone(), own.clone());
        let first = ctx
            .scheduler
            .register(move |ctx: &mut Ctx| {
                ctx.log.push("first".into());
                if let Some(id) = later_ref.get() {
                    ctx.scheduler.unregister(id);
                }
                if let Some(id) = own_ref.get() {
                    ctx.scheduler.unregister(id);
                }
            })
            .unwrap();
        own.set(Some(first));
        later.set(Some(ctx.scheduler.register(logger("second")).unwrap()));

        run_tick(&mut ctx);
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["first"]);
        assert!(ctx.scheduler.is_empty());
    }

    #[test]
    fn test_registration_during_pass_runs_next_tick() {
        let mut ctx = Ctx::new(16);
        ctx.scheduler
            .register_once(|ctx: &mut Ctx| {
                ctx.log.push("outer".into());
                ctx.scheduler.register_once(logger_once("inner")).unwrap();
            })
            .unwrap();
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["outer"]);
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["outer", "inner"]);
    }

    fn logger_once(name: &'static str) -> impl FnOnce(&mut Ctx) + 'static {
        move |ctx: &mut Ctx| ctx.log.push(name.to_string())
    }

    #[test]
    fn test_deferred_runs_after_next_pass() {
        let mut ctx = Ctx::new(16);
        ctx.scheduler.register(logger("tick")).unwrap();
        ctx.scheduler
            .register_once(|ctx: &mut Ctx| ctx.scheduler.defer(logger_once("done")))
            .unwrap();
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["tick"]);
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["tick", "tick", "done"]);
    }

    #[test]
    fn test_pause_suspends_ticks_but_not_timers() {
        let mut ctx = Ctx::new(16);
        ctx.scheduler.register(logger("tick")).unwrap();
        ctx.scheduler.set_timeout(100.0, logger_once("timer"));
        ctx.scheduler.pause();
        run_frame(&mut ctx, 50.0);
        assert!(ctx.log.is_empty());
        run_frame(&mut ctx, 120.0);
        assert_eq!(ctx.log, vec!["timer"]);
        ctx.scheduler.resume();
        run_frame(&mut ctx, 130.0);
        assert_eq!(ctx.log, vec!["timer", "tick"]);
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let mut ctx = Ctx::new(16);
        ctx.scheduler.set_timeout(30.0, logger_once("late"));
        ctx.scheduler.set_timeout(10.0, logger_once("early"));
        let cancelled = ctx.scheduler.set_timeout(20.0, logger_once("cancelled"));
        assert!(ctx.scheduler.clear_timeout(cancelled));
        fire_timers(&mut ctx, 40.0);
        assert_eq!(ctx.log, vec!["early", "late"]);
        assert_eq!(ctx.scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_compaction_reclaims_holes() {
        let mut ctx = Ctx::new(4);
        let ids: Vec<TickId> = (0..4)
            .map(|_| ctx.scheduler.register(|_: &mut Ctx| {}).unwrap())
            .collect();
        ctx.scheduler.unregister(ids[1]);
        ctx.scheduler.unregister(ids[2]);
        assert_eq!(ctx.scheduler.slot_count(), 4);

        ctx.scheduler.register(logger("new")).unwrap();
        assert_eq!(ctx.scheduler.slot_count(), 3);
        assert!(ctx.scheduler.unregister(ids[3]));
        run_tick(&mut ctx);
        assert_eq!(ctx.log, vec!["new"]);
    }

    #[test]
    fn test_exhausted_scheduler_fails_loudly() {
        let mut ctx = Ctx::new(2);
        ctx.scheduler.register(|_: &mut Ctx| {}).unwrap();
        ctx.scheduler.register(|_: &mut Ctx| {}).unwrap();
        let err = ctx.scheduler.register(|_: &mut Ctx| {}).unwrap_err();
        assert_eq!(err, SimError::SchedulerExhausted(2));
    }
}
