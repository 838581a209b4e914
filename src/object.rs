//! One storyboarded sprite: its owned command list, the per-object event
//! runner, the active-command set, and the resolved visual state renderers
//! read after each frame.

use std::collections::HashMap;

use crate::{
    command::{Command, CommandAction, ModifyCommand, Property, ToggleKind, compile_events},
    core::{SpriteState, TimeMs, Vec2},
    event::{EventRunner, RunnerStep},
    storyboard::{ObjectKey, TriggerKey, TriggerRegistry},
};

/// When a layer should hold this object as a member, derived from its fade
/// commands (trigger-driven fades are event-conditional and excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayWindow {
    /// Opacity can be nonzero before any fade runs; the object belongs to
    /// its layer from the start.
    pub initially_attached: bool,
    /// First instant opacity can become nonzero, when not initially
    /// attached. `None` with `initially_attached == false` means the object
    /// can never become visible.
    pub attach: Option<TimeMs>,
    /// Instant after which opacity is guaranteed zero forever, if any.
    pub detach: Option<TimeMs>,
}

#[derive(Clone, Debug)]
pub struct TimelineObject {
    source: String,
    state: SpriteState,
    initial: SpriteState,
    commands: Vec<Command>,
    runner: EventRunner<CommandAction>,
    active: Vec<usize>,
}

impl TimelineObject {
    /// Build an object from its parsed top-level commands. The initial
    /// (resting) state is computed here, once, by the earliest-command scan.
    pub fn new(source: impl Into<String>, declared_position: Vec2, commands: Vec<Command>) -> Self {
        let initial = scan_initial(SpriteState::at(declared_position), &commands);
        let runner = EventRunner::new(compile_events(&commands));
        Self {
            source: source.into(),
            state: initial,
            initial,
            commands,
            runner,
            active: Vec::new(),
        }
    }

    /// Texture path (or other asset key) this sprite was declared with.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolved visual state at the last updated time. Only meaningful for
    /// rendering while the object is a member of its layer.
    pub fn state(&self) -> &SpriteState {
        &self.state
    }

    pub fn initial_state(&self) -> &SpriteState {
        &self.initial
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Latest end time across this object's commands.
    pub fn end_time(&self) -> TimeMs {
        self.commands
            .iter()
            .map(Command::end_time)
            .max()
            .unwrap_or(TimeMs(0))
    }

    /// Restore the resting state: initial values back onto the live state,
    /// cursor to zero, active set and all composite runtime cursors cleared.
    pub fn reset(&mut self, registry: &mut TriggerRegistry, key: ObjectKey) {
        self.state = self.initial;
        self.active.clear();
        self.runner.reset();
        for (i, cmd) in self.commands.iter_mut().enumerate() {
            if let Command::Trigger(t) = cmd {
                registry.deregister(t.event(), TriggerKey::new(key, i));
            }
            cmd.reset_runtime();
        }
    }

    /// Route an external event to the trigger command at `index`.
    pub fn fire_trigger(&mut self, index: usize, at: TimeMs) {
        if let Some(Command::Trigger(t)) = self.commands.get_mut(index) {
            t.fire(at);
        }
    }

    pub fn update(&mut self, time: TimeMs, registry: &mut TriggerRegistry, key: ObjectKey) {
        let Self {
            commands,
            runner,
            active,
            state,
            initial,
            ..
        } = self;

        runner.update(time, |step| match step {
            RunnerStep::Reset => {
                // Replay is history-independent only if properties whose
                // events lie wholly after the seek target also revert.
                *state = *initial;
                active.clear();
                for (i, cmd) in commands.iter_mut().enumerate() {
                    if let Command::Trigger(t) = cmd {
                        registry.deregister(t.event(), TriggerKey::new(key, i));
                    }
                    cmd.reset_runtime();
                }
            }
            RunnerStep::Event(action) => {
                exec_object_action(commands, active, state, registry, key, action);
            }
        });

        for &i in active.iter() {
            match &mut commands[i] {
                Command::Modify(m) => m.update(time, state),
                Command::Loop(l) => l.update(time, state),
                Command::Toggle(_) | Command::Trigger(_) => {}
            }
        }

        // Running triggers are driven outside the normal active set; they
        // only exist while an external event invocation is live.
        for cmd in commands.iter_mut() {
            if let Command::Trigger(t) = cmd {
                if t.is_running() {
                    t.update(time, state);
                }
            }
        }
    }

    /// Compute the window during which this object's opacity is capable of
    /// being nonzero. Conservative on purpose: attaching too early or
    /// detaching too late never changes rendered output, since opacity zero
    /// draws nothing.
    pub fn display_window(&self) -> DisplayWindow {
        let mut fades: Vec<(i32, i32, f32, f32)> = Vec::new();
        for cmd in &self.commands {
            match cmd {
                Command::Modify(m) if m.property == Property::Opacity => {
                    fades.push(fade_entry(m.start_time.0, m.end_time.0, m));
                }
                Command::Loop(l) => {
                    for child in l.commands() {
                        if let Command::Modify(m) = child {
                            if m.property == Property::Opacity {
                                fades.push(fade_entry(l.start_time().0, l.end_time().0, m));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let initially_attached = self.initial.opacity > 0.0;
        let Some(last_end) = fades.iter().map(|f| f.1).max() else {
            return DisplayWindow {
                initially_attached,
                attach: None,
                detach: None,
            };
        };

        let attach = if initially_attached {
            None
        } else {
            fades
                .iter()
                .filter(|f| f.2 != 0.0 || f.3 != 0.0)
                .map(|f| f.0)
                .min()
                .map(TimeMs)
        };

        // Opacity is guaranteed zero after the last fade only if every fade
        // reaching that boundary ends at zero.
        let ends_zero = fades
            .iter()
            .filter(|f| f.1 == last_end)
            .all(|f| f.3 == 0.0);
        let detach = ends_zero.then_some(TimeMs(last_end));

        DisplayWindow {
            initially_attached,
            attach,
            detach,
        }
    }
}

fn fade_entry(start: i32, end: i32, m: &ModifyCommand) -> (i32, i32, f32, f32) {
    let sv = m.start_values.first().copied().unwrap_or(0.0);
    let ev = m.end_values.first().copied().unwrap_or(sv);
    (start, end, sv, ev)
}

fn exec_object_action(
    commands: &mut [Command],
    active: &mut Vec<usize>,
    state: &mut SpriteState,
    registry: &mut TriggerRegistry,
    key: ObjectKey,
    action: CommandAction,
) {
    match action {
        CommandAction::Activate(i) => {
            match &mut commands[i] {
                Command::Modify(m) => m.start(state),
                Command::Loop(l) => l.start(),
                Command::Trigger(t) => {
                    // Listening begins; the body only runs once fired, so
                    // triggers never join the active set.
                    registry.register(t.event(), TriggerKey::new(key, i));
                    return;
                }
                Command::Toggle(_) => {}
            }
            if !active.contains(&i) {
                active.push(i);
            }
        }
        CommandAction::Deactivate(i) => {
            active.retain(|&j| j != i);
            match &mut commands[i] {
                Command::Modify(m) => m.end(state),
                Command::Loop(l) => l.end(state),
                Command::Trigger(t) => {
                    registry.deregister(t.event(), TriggerKey::new(key, i));
                }
                Command::Toggle(_) => {}
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

/// Order-independent fold over all commands: for every property, the start
/// values of the earliest-starting command touching it become the object's
/// resting value. Recurses into loop bodies with their absolute offsets;
/// trigger bodies never contribute (they are event-conditional). Toggles
/// contribute only when instantaneous.
fn scan_initial(mut state: SpriteState, commands: &[Command]) -> SpriteState {
    let mut earliest: HashMap<Property, (i32, usize, &[f32])> = HashMap::new();
    let mut toggles: Vec<ToggleKind> = Vec::new();
    let mut seq = 0;
    walk_initial(commands, 0, &mut seq, &mut earliest, &mut toggles);

    // Properties can write overlapping sprite fields (Position vs
    // PositionX/PositionY, the scale channels), so the entries must apply
    // in a defined order, not map iteration order: by start time, ties in
    // script order.
    let mut entries: Vec<(Property, i32, usize, &[f32])> = earliest
        .into_iter()
        .map(|(property, (at, order, values))| (property, at, order, values))
        .collect();
    entries.sort_by_key(|&(_, at, order, _)| (at, order));
    for (property, _, _, values) in entries {
        property.write(&mut state, &values[..values.len().min(property.arity())]);
    }
    for kind in toggles {
        match kind {
            ToggleKind::FlipHorizontal => state.flip_h = true,
            ToggleKind::FlipVertical => state.flip_v = true,
            ToggleKind::AdditiveBlend => state.additive_blend = true,
        }
    }
    state
}

fn walk_initial<'a>(
    commands: &'a [Command],
    base: i32,
    seq: &mut usize,
    earliest: &mut HashMap<Property, (i32, usize, &'a [f32])>,
    toggles: &mut Vec<ToggleKind>,
) {
    for cmd in commands {
        match cmd {
            Command::Modify(m) => {
                let at = base.saturating_add(m.start_time.0);
                let order = *seq;
                *seq += 1;
                let entry = earliest
                    .entry(m.property)
                    .or_insert((at, order, m.start_values.as_slice()));
                // Strictly earlier wins; ties keep the first in script order.
                if at < entry.0 {
                    *entry = (at, order, m.start_values.as_slice());
                }
            }
            Command::Toggle(t) => {
                if t.is_instantaneous() {
                    toggles.push(t.kind);
                }
            }
            Command::Loop(l) => {
                walk_initial(
                    l.commands(),
                    base.saturating_add(l.origin().0),
                    seq,
                    earliest,
                    toggles,
                );
            }
            Command::Trigger(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{ModifyCommand, ToggleCommand},
        ease::Easing,
        storyboard::LayerId,
    };

    fn modify(property: Property, t0: i32, t1: i32, start: Vec<f32>, end: Vec<f32>) -> Command {
        Command::Modify(ModifyCommand {
            property,
            easing: Easing::Linear,
            start_time: TimeMs(t0),
            end_time: TimeMs(t1),
            start_values: start,
            end_values: end,
        })
    }

    fn ctx() -> (TriggerRegistry, ObjectKey) {
        (
            TriggerRegistry::default(),
            ObjectKey::new(LayerId::Background, 0),
        )
    }

    #[test]
    fn initial_values_come_from_earliest_command_per_property() {
        let obj = TimelineObject::new(
            "sprite.png",
            Vec2::new(320.0, 240.0),
            vec![
                modify(Property::Opacity, 500, 1000, vec![0.0], vec![1.0]),
                modify(
                    Property::Position,
                    200,
                    400,
                    vec![10.0, 20.0],
                    vec![30.0, 40.0],
                ),
            ],
        );
        // Neither command has started, yet each property's earliest command
        // defines the resting value.
        assert_eq!(obj.initial_state().opacity, 0.0);
        assert_eq!(obj.initial_state().position, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn overlapping_properties_rest_in_command_order() {
        // PositionX is declared first but starts later; the earlier whole
        // Position write must land first, then the x override. The resting
        // pose has to come out the same on every load.
        let commands = vec![
            modify(Property::PositionX, 200, 300, vec![9.0], vec![0.0]),
            modify(Property::Position, 100, 150, vec![5.0, 5.0], vec![0.0, 0.0]),
        ];
        for _ in 0..64 {
            let obj = TimelineObject::new("s.png", Vec2::default(), commands.clone());
            assert_eq!(obj.initial_state().position, Vec2::new(9.0, 5.0));
        }
    }

    #[test]
    fn overlapping_properties_tie_breaks_in_script_order() {
        // Equal start times fall back to declaration order: the vector
        // scale applies first, the later-declared uniform scale wins.
        let commands = vec![
            modify(Property::ScaleVector, 0, 100, vec![2.0, 3.0], vec![1.0, 1.0]),
            modify(Property::Scale, 0, 100, vec![4.0], vec![1.0]),
        ];
        for _ in 0..64 {
            let obj = TimelineObject::new("s.png", Vec2::default(), commands.clone());
            assert_eq!(obj.initial_state().scale, Vec2::splat(4.0));
        }
    }

    #[test]
    fn initial_scan_recurses_into_loops_but_not_triggers() {
        let loop_cmd = Command::Loop(crate::command::LoopCommand::new(
            TimeMs(100),
            2,
            vec![modify(Property::Rotation, 0, 50, vec![1.5], vec![0.0])],
        ));
        let trig = Command::Trigger(crate::command::TriggerCommand::new(
            crate::command::TriggerEvent::HitSoundClap,
            TimeMs(0),
            TimeMs(1000),
            vec![modify(Property::Scale, 0, 50, vec![3.0], vec![1.0])],
        ));
        let obj = TimelineObject::new("s.png", Vec2::default(), vec![loop_cmd, trig]);
        assert_eq!(obj.initial_state().rotation, 1.5);
        // Trigger bodies must not contribute before they ever fire.
        assert_eq!(obj.initial_state().scale, Vec2::splat(1.0));
    }

    #[test]
    fn instantaneous_toggle_contributes_initial_flag() {
        let obj = TimelineObject::new(
            "s.png",
            Vec2::default(),
            vec![
                Command::Toggle(ToggleCommand {
                    kind: ToggleKind::AdditiveBlend,
                    start_time: TimeMs(100),
                    end_time: TimeMs(100),
                }),
                Command::Toggle(ToggleCommand {
                    kind: ToggleKind::FlipHorizontal,
                    start_time: TimeMs(0),
                    end_time: TimeMs(200),
                }),
            ],
        );
        assert!(obj.initial_state().additive_blend);
        // Windowed toggles do not contribute an initial value.
        assert!(!obj.initial_state().flip_h);
    }

    #[test]
    fn rewind_matches_fresh_playback() {
        let commands = vec![
            modify(Property::Opacity, 0, 100, vec![0.0], vec![1.0]),
            modify(Property::Opacity, 100, 200, vec![1.0], vec![0.0]),
        ];
        let (mut reg, key) = ctx();

        let mut seeked = TimelineObject::new("s.png", Vec2::default(), commands.clone());
        seeked.update(TimeMs(150), &mut reg, key);
        seeked.update(TimeMs(50), &mut reg, key);

        let mut fresh = TimelineObject::new("s.png", Vec2::default(), commands);
        fresh.update(TimeMs(50), &mut reg, key);

        assert_eq!(seeked.state(), fresh.state());
        assert!((seeked.state().opacity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn replay_is_deterministic_across_call_histories() {
        let commands = vec![
            modify(Property::Opacity, 0, 1000, vec![0.0], vec![1.0]),
            modify(Property::Rotation, 200, 600, vec![0.0], vec![3.0]),
        ];
        let (mut reg, key) = ctx();

        let mut stepped = TimelineObject::new("s.png", Vec2::default(), commands.clone());
        for t in [0, 100, 700, 300, 900, 450] {
            stepped.update(TimeMs(t), &mut reg, key);
        }

        let mut direct = TimelineObject::new("s.png", Vec2::default(), commands);
        direct.update(TimeMs(450), &mut reg, key);

        assert_eq!(stepped.state(), direct.state());
    }

    #[test]
    fn scenario_fade_with_rewind() {
        let commands = vec![modify(Property::Opacity, 0, 1000, vec![0.0], vec![1.0])];
        let (mut reg, key) = ctx();
        let mut obj = TimelineObject::new("s.png", Vec2::default(), commands);

        for (t, expect) in [(0, 0.0), (500, 0.5), (1000, 1.0), (250, 0.25)] {
            obj.update(TimeMs(t), &mut reg, key);
            assert!(
                (obj.state().opacity - expect).abs() < 1e-6,
                "t={t} expected {expect} got {}",
                obj.state().opacity
            );
        }
    }

    #[test]
    fn reset_restores_resting_state() {
        let commands = vec![modify(Property::Opacity, 0, 100, vec![0.25], vec![1.0])];
        let (mut reg, key) = ctx();
        let mut obj = TimelineObject::new("s.png", Vec2::default(), commands);
        obj.update(TimeMs(100), &mut reg, key);
        assert_eq!(obj.state().opacity, 1.0);
        obj.reset(&mut reg, key);
        assert_eq!(obj.state(), obj.initial_state());
        assert_eq!(obj.state().opacity, 0.25);
    }

    #[test]
    fn display_window_with_no_fades_uses_default_opacity() {
        let obj = TimelineObject::new(
            "s.png",
            Vec2::default(),
            vec![modify(Property::Rotation, 0, 100, vec![0.0], vec![1.0])],
        );
        let w = obj.display_window();
        assert!(w.initially_attached);
        assert_eq!(w.attach, None);
        assert_eq!(w.detach, None);
    }

    #[test]
    fn display_window_tracks_fade_bounds() {
        let obj = TimelineObject::new(
            "s.png",
            Vec2::default(),
            vec![
                modify(Property::Opacity, 400, 800, vec![0.0], vec![1.0]),
                modify(Property::Opacity, 800, 1200, vec![1.0], vec![0.0]),
            ],
        );
        let w = obj.display_window();
        assert!(!w.initially_attached);
        assert_eq!(w.attach, Some(TimeMs(400)));
        assert_eq!(w.detach, Some(TimeMs(1200)));
    }

    #[test]
    fn display_window_never_visible_object() {
        let obj = TimelineObject::new(
            "s.png",
            Vec2::default(),
            vec![modify(Property::Opacity, 0, 100, vec![0.0], vec![0.0])],
        );
        let w = obj.display_window();
        assert!(!w.initially_attached);
        assert_eq!(w.attach, None);
        assert_eq!(w.detach, Some(TimeMs(100)));
    }
}
