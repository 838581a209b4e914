//! Scripted effects on one sprite: property tweens (`Modify`), windowed flag
//! flips (`Toggle`), repeating sub-timelines (`Loop`), and externally fired
//! sub-timelines (`Trigger`). Commands are immutable once constructed; only
//! the runtime cursors of composite commands mutate during playback.

use crate::{
    core::{Color, SpriteState, TimeMs, Vec2},
    ease::Easing,
    event::{EventRunner, RunnerStep, TimelineEvent},
};

/// The sprite property a `Modify` command writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Property {
    Position,
    PositionX,
    PositionY,
    Scale,
    ScaleVector,
    ScaleFactor,
    Rotation,
    Color,
    Opacity,
}

impl Property {
    /// Length of this property's value vector.
    pub fn arity(self) -> usize {
        match self {
            Self::Position | Self::ScaleVector => 2,
            Self::Color => 3,
            Self::PositionX
            | Self::PositionY
            | Self::Scale
            | Self::ScaleFactor
            | Self::Rotation
            | Self::Opacity => 1,
        }
    }

    /// Write a resolved value vector into the sprite state. Shapes that do
    /// not match the property's arity are ignored (arity is validated at
    /// load time).
    pub fn write(self, state: &mut SpriteState, vals: &[f32]) {
        match (self, vals) {
            (Self::Position, &[x, y]) => state.position = Vec2::new(x, y),
            (Self::PositionX, &[x]) => state.position.x = x,
            (Self::PositionY, &[y]) => state.position.y = y,
            (Self::Scale, &[s]) => state.scale = Vec2::splat(s),
            (Self::ScaleVector, &[x, y]) => state.scale = Vec2::new(x, y),
            (Self::ScaleFactor, &[f]) => state.scale_factor = f,
            (Self::Rotation, &[r]) => state.rotation = r,
            (Self::Color, &[r, g, b]) => state.color = Color::new(r, g, b),
            (Self::Opacity, &[a]) => state.opacity = a.clamp(0.0, 1.0),
            _ => {}
        }
    }
}

/// A continuous (or instantaneous) tween of one property.
#[derive(Clone, Debug, PartialEq)]
pub struct ModifyCommand {
    pub property: Property,
    pub easing: Easing,
    pub start_time: TimeMs,
    pub end_time: TimeMs,
    pub start_values: Vec<f32>,
    pub end_values: Vec<f32>,
}

impl ModifyCommand {
    pub fn has_fixed_endpoints(&self) -> bool {
        self.start_values == self.end_values
    }

    /// Whether the command needs per-frame updates while active. Commands
    /// with equal endpoints or zero duration only ever apply their start/end
    /// snapshots.
    pub fn is_varying(&self) -> bool {
        self.end_time > self.start_time && !self.has_fixed_endpoints()
    }

    fn progress(&self, time: TimeMs) -> f32 {
        let duration = self.end_time.0 - self.start_time.0;
        if duration <= 0 {
            return 1.0;
        }
        ((time.0 - self.start_time.0) as f32 / duration as f32).clamp(0.0, 1.0)
    }

    fn write_eased(&self, eased: f32, state: &mut SpriteState) {
        let mut vals = [0.0f32; 4];
        let n = self.property.arity().min(vals.len());
        for i in 0..n {
            let a = self.start_values.get(i).copied().unwrap_or(0.0);
            let b = self.end_values.get(i).copied().unwrap_or(a);
            vals[i] = a + (b - a) * eased;
        }
        self.property.write(state, &vals[..n]);
    }

    /// Continuous update at `time` (scope-local clock).
    pub fn update(&self, time: TimeMs, state: &mut SpriteState) {
        self.write_eased(self.easing.apply(self.progress(time)), state);
    }

    /// Jump to the start snapshot. Idempotent.
    pub fn start(&self, state: &mut SpriteState) {
        self.write_eased(0.0, state);
    }

    /// Jump to the end snapshot. Idempotent.
    pub fn end(&self, state: &mut SpriteState) {
        self.write_eased(1.0, state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ToggleKind {
    FlipHorizontal,
    FlipVertical,
    AdditiveBlend,
}

/// A flag held on for `[start_time, end_time)`. An instantaneous toggle
/// (equal times) instead contributes a permanent initial value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToggleCommand {
    pub kind: ToggleKind,
    pub start_time: TimeMs,
    pub end_time: TimeMs,
}

impl ToggleCommand {
    pub fn apply(&self, state: &mut SpriteState, on: bool) {
        match self.kind {
            ToggleKind::FlipHorizontal => state.flip_h = on,
            ToggleKind::FlipVertical => state.flip_v = on,
            ToggleKind::AdditiveBlend => state.additive_blend = on,
        }
    }

    pub fn is_instantaneous(&self) -> bool {
        self.start_time == self.end_time
    }
}

/// The named external events a `Trigger` can listen for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TriggerEvent {
    Passing,
    Failing,
    HitSoundClap,
    HitSoundFinish,
    HitSoundWhistle,
}

impl TriggerEvent {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Passing" => Some(Self::Passing),
            "Failing" => Some(Self::Failing),
            "HitSoundClap" => Some(Self::HitSoundClap),
            "HitSoundFinish" => Some(Self::HitSoundFinish),
            "HitSoundWhistle" => Some(Self::HitSoundWhistle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Passing => "Passing",
            Self::Failing => "Failing",
            Self::HitSoundClap => "HitSoundClap",
            Self::HitSoundFinish => "HitSoundFinish",
            Self::HitSoundWhistle => "HitSoundWhistle",
        }
    }
}

/// Discrete action over one scope's command list, referencing the owning
/// command by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandAction {
    /// Insert into the active set and jump the command to its start.
    Activate(usize),
    /// Remove from the active set and jump the command to its end.
    Deactivate(usize),
    /// Instantaneous set-to-start (non-varying commands, toggle on).
    ApplyStart(usize),
    /// Instantaneous set-to-end (non-varying commands, toggle off).
    ApplyEnd(usize),
}

/// Flatten a scope's commands into discrete timeline events. Varying
/// commands get Activate/Deactivate pairs; everything else applies its
/// boundary snapshots directly. Instantaneous toggles emit nothing — they
/// are folded into the initial-value scan.
pub(crate) fn compile_events(commands: &[Command]) -> Vec<TimelineEvent<CommandAction>> {
    let mut events = Vec::new();
    let mut push = |time: TimeMs, action: CommandAction| events.push(TimelineEvent { time, action });
    for (i, cmd) in commands.iter().enumerate() {
        match cmd {
            Command::Modify(m) => {
                if m.is_varying() {
                    push(m.start_time, CommandAction::Activate(i));
                    push(m.end_time, CommandAction::Deactivate(i));
                } else {
                    push(m.start_time, CommandAction::ApplyStart(i));
                    push(m.end_time, CommandAction::ApplyEnd(i));
                }
            }
            Command::Toggle(t) => {
                if !t.is_instantaneous() {
                    push(t.start_time, CommandAction::ApplyStart(i));
                    push(t.end_time, CommandAction::ApplyEnd(i));
                }
            }
            Command::Loop(l) => {
                push(l.start_time(), CommandAction::Activate(i));
                push(l.end_time(), CommandAction::Deactivate(i));
            }
            Command::Trigger(t) => {
                push(t.start_time(), CommandAction::Activate(i));
                push(t.end_time(), CommandAction::Deactivate(i));
            }
        }
    }
    events
}

/// Execute one event inside a leaf scope (a Loop or Trigger body, which may
/// only contain Modify/Toggle commands).
pub(crate) fn apply_leaf_action(
    commands: &[Command],
    active: &mut Vec<usize>,
    state: &mut SpriteState,
    action: CommandAction,
) {
    match action {
        CommandAction::Activate(i) => {
            if let Command::Modify(m) = &commands[i] {
                m.start(state);
            }
            if !active.contains(&i) {
                active.push(i);
            }
        }
        CommandAction::Deactivate(i) => {
            active.retain(|&j| j != i);
            if let Command::Modify(m) = &commands[i] {
                m.end(state);
            }
        }
        CommandAction::ApplyStart(i) => match &commands[i] {
            Command::Modify(m) => m.start(state),
            Command::Toggle(t) => t.apply(state, true),
            _ => {}
        },
        CommandAction::ApplyEnd(i) => match &commands[i] {
            Command::Modify(m) => m.end(state),
            Command::Toggle(t) => t.apply(state, false),
            _ => {}
        },
    }
}

/// Drive a leaf scope to `local`: replay due events, then continuously
/// update whatever is active.
fn run_leaf_scope(
    runner: &mut EventRunner<CommandAction>,
    commands: &[Command],
    active: &mut Vec<usize>,
    local: TimeMs,
    state: &mut SpriteState,
) {
    runner.update(local, |step| match step {
        RunnerStep::Reset => active.clear(),
        RunnerStep::Event(action) => apply_leaf_action(commands, active, state, action),
    });
    for &i in active.iter() {
        if let Command::Modify(m) = &commands[i] {
            m.update(local, state);
        }
    }
}

/// A child timeline replayed `loop_count` times.
///
/// The loop occupies `[origin + body_start, origin + body_start +
/// body_duration * loop_count)` on its parent clock; every iteration the
/// child runner is reset so the body re-enters from its own start.
#[derive(Clone, Debug)]
pub struct LoopCommand {
    start_time: TimeMs,
    loop_count: u32,
    body_start: TimeMs,
    body_duration_ms: i32,
    commands: Vec<Command>,
    runner: EventRunner<CommandAction>,
    active: Vec<usize>,
    iteration: Option<i64>,
}

impl LoopCommand {
    /// `declared_start` is the loop's scripted origin; child times are
    /// relative to it. Degenerate (empty or zero-length) bodies are clamped
    /// to a 1 ms duration so iteration arithmetic stays defined.
    pub fn new(declared_start: TimeMs, loop_count: u32, commands: Vec<Command>) -> Self {
        let body_start = commands.iter().map(|c| c.start_time().0).min().unwrap_or(0);
        let body_end = commands.iter().map(|c| c.end_time().0).max().unwrap_or(0);
        let body_duration_ms = (body_end - body_start).max(1);
        let runner = EventRunner::new(compile_events(&commands));
        Self {
            start_time: TimeMs(declared_start.0.saturating_add(body_start)),
            loop_count: loop_count.max(1),
            body_start: TimeMs(body_start),
            body_duration_ms,
            commands,
            runner,
            active: Vec::new(),
            iteration: None,
        }
    }

    pub fn start_time(&self) -> TimeMs {
        self.start_time
    }

    pub fn end_time(&self) -> TimeMs {
        let end = i64::from(self.start_time.0)
            + i64::from(self.body_duration_ms) * i64::from(self.loop_count);
        TimeMs(end.min(i64::from(i32::MAX)) as i32)
    }

    /// The scripted origin child times are measured from.
    pub fn origin(&self) -> TimeMs {
        TimeMs(self.start_time.0 - self.body_start.0)
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Iteration index recorded by the last `update`, if any.
    pub fn current_iteration(&self) -> Option<i64> {
        self.iteration
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Jump the child runner back to its start bound.
    pub(crate) fn start(&mut self) {
        self.iteration = None;
        self.runner.reset();
        self.active.clear();
    }

    /// Jump the child runner to its end bound, leaving the body's final
    /// values applied.
    pub(crate) fn end(&mut self, state: &mut SpriteState) {
        self.start();
        let end_local = TimeMs(self.body_start.0.saturating_add(self.body_duration_ms));
        self.run_body(end_local, state);
    }

    pub fn update(&mut self, time: TimeMs, state: &mut SpriteState) {
        let elapsed = i64::from(time.0) - i64::from(self.start_time.0);
        let dur = i64::from(self.body_duration_ms);
        let iter = elapsed.div_euclid(dur);
        if self.iteration != Some(iter) {
            if iter >= i64::from(self.loop_count) {
                tracing::debug!(
                    iteration = iter,
                    declared = self.loop_count,
                    "loop clock ran past its declared iteration count"
                );
            }
            self.runner.reset();
            self.active.clear();
            self.iteration = Some(iter);
        }
        let local = TimeMs((elapsed.rem_euclid(dur) + i64::from(self.body_start.0)) as i32);
        self.run_body(local, state);
    }

    fn run_body(&mut self, local: TimeMs, state: &mut SpriteState) {
        let Self {
            runner,
            commands,
            active,
            ..
        } = self;
        run_leaf_scope(runner, commands, active, local, state);
    }
}

/// A child timeline replayed once per matching external event.
///
/// Child times are local to the fire instant. At most one invocation is live
/// at a time: re-firing restarts the body from local time zero.
#[derive(Clone, Debug)]
pub struct TriggerCommand {
    event: TriggerEvent,
    start_time: TimeMs,
    end_time: TimeMs,
    body_len_ms: i32,
    commands: Vec<Command>,
    runner: EventRunner<CommandAction>,
    active: Vec<usize>,
    fire_time: Option<TimeMs>,
}

impl TriggerCommand {
    pub fn new(
        event: TriggerEvent,
        start_time: TimeMs,
        end_time: TimeMs,
        commands: Vec<Command>,
    ) -> Self {
        let body_len_ms = commands
            .iter()
            .map(|c| c.end_time().0)
            .max()
            .unwrap_or(0)
            .max(0);
        let runner = EventRunner::new(compile_events(&commands));
        Self {
            event,
            start_time,
            end_time,
            body_len_ms,
            commands,
            runner,
            active: Vec::new(),
            fire_time: None,
        }
    }

    pub fn event(&self) -> TriggerEvent {
        self.event
    }

    pub fn start_time(&self) -> TimeMs {
        self.start_time
    }

    /// End of the listening window (the registration timeout), not of any
    /// running invocation.
    pub fn end_time(&self) -> TimeMs {
        self.end_time
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_running(&self) -> bool {
        self.fire_time.is_some()
    }

    /// Start (or restart) the body at `at`. A live invocation is discarded
    /// wholesale; there is no queuing or overlap.
    pub fn fire(&mut self, at: TimeMs) {
        self.fire_time = Some(at);
        self.runner.reset();
        self.active.clear();
    }

    /// Discard any live invocation without applying further state.
    pub(crate) fn halt(&mut self) {
        self.fire_time = None;
        self.runner.reset();
        self.active.clear();
    }

    pub fn update(&mut self, time: TimeMs, state: &mut SpriteState) {
        let Some(fired) = self.fire_time else {
            return;
        };
        let local = i64::from(time.0) - i64::from(fired.0);
        if local < 0 {
            // Seeking to before the fire instant discards the invocation.
            self.halt();
            return;
        }
        if local > i64::from(self.body_len_ms) {
            // Drive the body to its end bound once, then stop; the final
            // frame holds from here on.
            let end_local = TimeMs(self.body_len_ms);
            self.run_body(end_local, state);
            self.fire_time = None;
            return;
        }
        self.run_body(TimeMs(local as i32), state);
    }

    fn run_body(&mut self, local: TimeMs, state: &mut SpriteState) {
        let Self {
            runner,
            commands,
            active,
            ..
        } = self;
        run_leaf_scope(runner, commands, active, local, state);
    }
}

/// One scripted effect. A closed set: `update`/`start`/`end` dispatch
/// exhaustively, so a new kind cannot silently miss a call site.
#[derive(Clone, Debug)]
pub enum Command {
    Modify(ModifyCommand),
    Toggle(ToggleCommand),
    Loop(LoopCommand),
    Trigger(TriggerCommand),
}

impl Command {
    pub fn start_time(&self) -> TimeMs {
        match self {
            Self::Modify(m) => m.start_time,
            Self::Toggle(t) => t.start_time,
            Self::Loop(l) => l.start_time(),
            Self::Trigger(t) => t.start_time(),
        }
    }

    pub fn end_time(&self) -> TimeMs {
        match self {
            Self::Modify(m) => m.end_time,
            Self::Toggle(t) => t.end_time,
            Self::Loop(l) => l.end_time(),
            Self::Trigger(t) => t.end_time(),
        }
    }

    /// Clear all runtime cursors (loop iterations, trigger invocations).
    pub(crate) fn reset_runtime(&mut self) {
        match self {
            Self::Modify(_) | Self::Toggle(_) => {}
            Self::Loop(l) => l.start(),
            Self::Trigger(t) => t.halt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fade(t0: i32, t1: i32, from: f32, to: f32) -> ModifyCommand {
        ModifyCommand {
            property: Property::Opacity,
            easing: Easing::Linear,
            start_time: TimeMs(t0),
            end_time: TimeMs(t1),
            start_values: vec![from],
            end_values: vec![to],
        }
    }

    #[test]
    fn modify_interpolates_linearly() {
        let cmd = fade(0, 1000, 0.0, 1.0);
        let mut state = SpriteState::default();
        cmd.update(TimeMs(250), &mut state);
        assert!((state.opacity - 0.25).abs() < 1e-6);
        cmd.update(TimeMs(2000), &mut state);
        assert_eq!(state.opacity, 1.0);
    }

    #[test]
    fn modify_boundaries_are_idempotent() {
        let cmd = fade(0, 100, 0.2, 0.8);
        let mut state = SpriteState::default();
        cmd.end(&mut state);
        let once = state;
        cmd.end(&mut state);
        assert_eq!(state, once);
        cmd.start(&mut state);
        let s1 = state;
        cmd.start(&mut state);
        assert_eq!(state, s1);
        assert!((s1.opacity - 0.2).abs() < 1e-6);
    }

    #[test]
    fn modify_writes_only_its_property() {
        let cmd = ModifyCommand {
            property: Property::Position,
            easing: Easing::Linear,
            start_time: TimeMs(0),
            end_time: TimeMs(10),
            start_values: vec![10.0, 20.0],
            end_values: vec![30.0, 40.0],
        };
        let before = SpriteState::default();
        let mut state = before;
        cmd.update(TimeMs(5), &mut state);
        assert_eq!(state.position, Vec2::new(20.0, 30.0));
        assert_eq!(state.opacity, before.opacity);
        assert_eq!(state.rotation, before.rotation);
    }

    #[test]
    fn zero_duration_modify_is_not_varying() {
        let cmd = fade(100, 100, 0.0, 1.0);
        assert!(!cmd.is_varying());
        let fixed = fade(0, 100, 0.5, 0.5);
        assert!(!fixed.is_varying());
    }

    #[test]
    fn toggle_sets_and_clears_flags() {
        let cmd = ToggleCommand {
            kind: ToggleKind::AdditiveBlend,
            start_time: TimeMs(0),
            end_time: TimeMs(50),
        };
        let mut state = SpriteState::default();
        cmd.apply(&mut state, true);
        assert!(state.additive_blend);
        cmd.apply(&mut state, false);
        assert!(!state.additive_blend);
    }

    #[test]
    fn compile_skips_instantaneous_toggles() {
        let commands = vec![
            Command::Toggle(ToggleCommand {
                kind: ToggleKind::FlipHorizontal,
                start_time: TimeMs(10),
                end_time: TimeMs(10),
            }),
            Command::Toggle(ToggleCommand {
                kind: ToggleKind::FlipVertical,
                start_time: TimeMs(10),
                end_time: TimeMs(20),
            }),
        ];
        let events = compile_events(&commands);
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|e| matches!(e.action, CommandAction::ApplyStart(1) | CommandAction::ApplyEnd(1)))
        );
    }

    #[test]
    fn loop_reenters_body_each_iteration() {
        // Body: fade 0 -> 1 over [0, 100); three iterations from t = 0.
        let body = vec![Command::Modify(fade(0, 100, 0.0, 1.0))];
        let mut lp = LoopCommand::new(TimeMs(0), 3, body);
        assert_eq!(lp.start_time(), TimeMs(0));
        assert_eq!(lp.end_time(), TimeMs(300));

        let mut state = SpriteState::default();
        for (time, iter) in [(50, 0), (150, 1), (250, 2)] {
            lp.update(TimeMs(time), &mut state);
            assert!((state.opacity - 0.5).abs() < 1e-6, "at t={time}");
            assert_eq!(lp.current_iteration(), Some(iter));
        }
    }

    #[test]
    fn loop_tolerates_overrun_past_declared_count() {
        let body = vec![Command::Modify(fade(0, 100, 0.0, 1.0))];
        let mut lp = LoopCommand::new(TimeMs(0), 2, body);
        let mut state = SpriteState::default();
        // Two declared iterations end at 200; the implied third still runs.
        lp.update(TimeMs(250), &mut state);
        assert_eq!(lp.current_iteration(), Some(2));
        assert!((state.opacity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn loop_offsets_child_times_from_declared_start() {
        // Child window [20, 120) relative to a loop declared at 1000.
        let body = vec![Command::Modify(fade(20, 120, 0.0, 1.0))];
        let lp = LoopCommand::new(TimeMs(1000), 2, body);
        assert_eq!(lp.start_time(), TimeMs(1020));
        assert_eq!(lp.end_time(), TimeMs(1220));
        assert_eq!(lp.origin(), TimeMs(1000));
    }

    #[test]
    fn loop_end_applies_final_body_values() {
        let body = vec![Command::Modify(fade(0, 100, 0.0, 1.0))];
        let mut lp = LoopCommand::new(TimeMs(0), 3, body);
        let mut state = SpriteState::default();
        state.opacity = 0.0;
        lp.end(&mut state);
        assert_eq!(state.opacity, 1.0);
    }

    #[test]
    fn trigger_runs_only_after_fire() {
        let body = vec![Command::Modify(fade(0, 20, 0.0, 1.0))];
        let mut tr = TriggerCommand::new(TriggerEvent::HitSoundClap, TimeMs(0), TimeMs(1000), body);
        let mut state = SpriteState::default();
        state.opacity = 0.25;

        tr.update(TimeMs(500), &mut state);
        assert_eq!(state.opacity, 0.25, "unfired trigger must not execute");

        tr.fire(TimeMs(500));
        tr.update(TimeMs(510), &mut state);
        assert!((state.opacity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn trigger_refire_restarts_from_local_zero() {
        let body = vec![Command::Modify(fade(0, 20, 0.0, 1.0))];
        let mut tr = TriggerCommand::new(TriggerEvent::HitSoundClap, TimeMs(0), TimeMs(1000), body);
        let mut state = SpriteState::default();

        tr.fire(TimeMs(10));
        tr.update(TimeMs(15), &mut state);
        assert!((state.opacity - 0.25).abs() < 1e-6);

        // Firing again at 15 discards the first run entirely.
        tr.fire(TimeMs(15));
        tr.update(TimeMs(15), &mut state);
        assert_eq!(state.opacity, 0.0);
    }

    #[test]
    fn trigger_holds_final_frame_after_body_ends() {
        let body = vec![Command::Modify(fade(0, 20, 0.0, 1.0))];
        let mut tr = TriggerCommand::new(TriggerEvent::Passing, TimeMs(0), TimeMs(1000), body);
        let mut state = SpriteState::default();

        tr.fire(TimeMs(0));
        tr.update(TimeMs(100), &mut state);
        assert_eq!(state.opacity, 1.0);
        assert!(!tr.is_running());

        // Further updates leave the held state alone.
        state.opacity = 0.7;
        tr.update(TimeMs(200), &mut state);
        assert_eq!(state.opacity, 0.7);
    }

    #[test]
    fn trigger_event_names_round_trip() {
        for ev in [
            TriggerEvent::Passing,
            TriggerEvent::Failing,
            TriggerEvent::HitSoundClap,
            TriggerEvent::HitSoundFinish,
            TriggerEvent::HitSoundWhistle,
        ] {
            assert_eq!(TriggerEvent::parse(ev.name()), Some(ev));
        }
        assert_eq!(TriggerEvent::parse("HitSoundKazoo"), None);
    }
}
