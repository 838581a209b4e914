//! The storyboard aggregate: four ordered object layers, a master event
//! runner that compacts layer membership to each object's visibility window,
//! and the registry routing external trigger events to listening commands.

use std::collections::HashMap;

use crate::{
    command::TriggerEvent,
    core::{Color, TimeMs, Vec2},
    event::{EventRunner, RunnerStep, TimelineEvent},
    object::TimelineObject,
};

/// The four storyboard layers, in update/draw order. Pass and Fail are
/// mutually exclusive at render time: only one of the two is drawn,
/// selected by the failing flag.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LayerId {
    Background,
    Fail,
    Pass,
    Foreground,
}

impl LayerId {
    pub const ALL: [LayerId; 4] = [Self::Background, Self::Fail, Self::Pass, Self::Foreground];

    /// Layer lookup by script name. Unknown names are a structural script
    /// defect, reported as a hard load error by the caller.
    pub fn from_name(name: &str) -> Option<LayerId> {
        match name {
            "Background" => Some(Self::Background),
            "Fail" => Some(Self::Fail),
            "Pass" => Some(Self::Pass),
            "Foreground" => Some(Self::Foreground),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Background => "Background",
            Self::Fail => "Fail",
            Self::Pass => "Pass",
            Self::Foreground => "Foreground",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Background => 0,
            Self::Fail => 1,
            Self::Pass => 2,
            Self::Foreground => 3,
        }
    }
}

/// Stable handle to one object: its layer plus its declaration index within
/// that layer. Objects never move between layers, so keys stay valid for
/// the storyboard's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub layer: LayerId,
    pub index: usize,
}

impl ObjectKey {
    pub fn new(layer: LayerId, index: usize) -> Self {
        Self { layer, index }
    }
}

/// Handle to one trigger command: the owning object plus the command's
/// index in that object's top-level list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub object: ObjectKey,
    pub command: usize,
}

impl TriggerKey {
    pub fn new(object: ObjectKey, command: usize) -> Self {
        Self { object, command }
    }
}

/// Which trigger commands are currently listening for each external event.
///
/// Owned by the storyboard (no process-wide statics); mutated only when a
/// trigger's enclosing scope starts or ends. Register and deregister are
/// idempotent so replays after a rewind cannot double-subscribe.
#[derive(Clone, Debug, Default)]
pub struct TriggerRegistry {
    listeners: HashMap<TriggerEvent, Vec<TriggerKey>>,
}

impl TriggerRegistry {
    pub fn register(&mut self, event: TriggerEvent, key: TriggerKey) {
        let keys = self.listeners.entry(event).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn deregister(&mut self, event: TriggerEvent, key: TriggerKey) {
        if let Some(keys) = self.listeners.get_mut(&event) {
            keys.retain(|k| *k != key);
        }
    }

    pub fn listeners(&self, event: TriggerEvent) -> &[TriggerKey] {
        self.listeners.get(&event).map_or(&[], Vec::as_slice)
    }
}

/// Attach or detach one object from its layer.
#[derive(Clone, Copy, Debug)]
struct MembershipAction {
    key: ObjectKey,
    attach: bool,
}

#[derive(Clone, Debug, Default)]
struct Layer {
    objects: Vec<TimelineObject>,
    attached: Vec<bool>,
    initial_attached: Vec<bool>,
}

/// A fully loaded storyboard, updated once per rendered frame with the
/// host's authoritative playback time.
#[derive(Clone, Debug)]
pub struct Storyboard {
    layers: [Layer; 4],
    master: EventRunner<MembershipAction>,
    registry: TriggerRegistry,
    is_failing: bool,
    end_time: TimeMs,
}

impl Storyboard {
    /// Assemble a storyboard from per-layer object lists (declaration order
    /// preserved). Computes each object's visibility window and compiles
    /// the membership events of the master runner.
    pub fn from_layers(objects: [Vec<TimelineObject>; 4]) -> Self {
        let end_time = objects
            .iter()
            .flatten()
            .map(TimelineObject::end_time)
            .max()
            .unwrap_or(TimeMs(0));

        let mut events = Vec::new();
        let mut built: [Layer; 4] = Default::default();
        for (slot, layer_objects) in built.iter_mut().zip(objects) {
            slot.objects = layer_objects;
        }

        for lid in LayerId::ALL {
            let layer = &mut built[lid.index()];
            let mut attached = Vec::with_capacity(layer.objects.len());
            for (i, obj) in layer.objects.iter().enumerate() {
                let key = ObjectKey::new(lid, i);
                let window = obj.display_window();
                attached.push(window.initially_attached);
                if let Some(at) = window.attach {
                    events.push(TimelineEvent {
                        time: at,
                        action: MembershipAction { key, attach: true },
                    });
                }
                if let Some(dt) = window.detach {
                    // A detach falling on the storyboard's own end boundary
                    // would be a redundant instruction; the wind-down covers it.
                    if dt < end_time {
                        events.push(TimelineEvent {
                            time: dt,
                            action: MembershipAction { key, attach: false },
                        });
                    }
                }
            }
            layer.initial_attached = attached.clone();
            layer.attached = attached;
        }

        Self {
            layers: built,
            master: EventRunner::new(events),
            registry: TriggerRegistry::default(),
            is_failing: false,
            end_time,
        }
    }

    /// Latest command end time across all objects.
    pub fn end_time(&self) -> TimeMs {
        self.end_time
    }

    /// Whether the Fail layer (instead of Pass) is currently selected.
    pub fn is_failing(&self) -> bool {
        self.is_failing
    }

    pub fn objects(&self, layer: LayerId) -> &[TimelineObject] {
        &self.layers[layer.index()].objects
    }

    pub fn is_attached(&self, key: ObjectKey) -> bool {
        self.layers[key.layer.index()]
            .attached
            .get(key.index)
            .copied()
            .unwrap_or(false)
    }

    /// Advance (or rewind) the whole storyboard to `time`: master runner
    /// first, so membership changes land before any layer iterates, then
    /// background, the selected pass-or-fail layer, and foreground, each
    /// object in declaration order.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn update(&mut self, time: TimeMs) {
        let Self {
            layers,
            master,
            registry,
            is_failing,
            ..
        } = self;

        master.update(time, |step| match step {
            RunnerStep::Reset => {
                for layer in layers.iter_mut() {
                    layer.attached.copy_from_slice(&layer.initial_attached);
                }
            }
            RunnerStep::Event(action) => {
                let layer = &mut layers[action.key.layer.index()];
                if let Some(slot) = layer.attached.get_mut(action.key.index) {
                    *slot = action.attach;
                }
            }
        });

        for lid in Self::update_order(*is_failing) {
            let layer = &mut layers[lid.index()];
            for i in 0..layer.objects.len() {
                if layer.attached[i] {
                    layer.objects[i].update(time, registry, ObjectKey::new(lid, i));
                }
            }
        }
    }

    fn update_order(is_failing: bool) -> [LayerId; 3] {
        [
            LayerId::Background,
            if is_failing {
                LayerId::Fail
            } else {
                LayerId::Pass
            },
            LayerId::Foreground,
        ]
    }

    /// Deliver an external event to every listening trigger. Passing and
    /// Failing additionally select the pass/fail layer. An event with no
    /// listeners is a no-op.
    pub fn fire_trigger_event(&mut self, event: TriggerEvent, time: TimeMs) {
        match event {
            TriggerEvent::Passing => self.is_failing = false,
            TriggerEvent::Failing => self.is_failing = true,
            _ => {}
        }
        let keys: Vec<TriggerKey> = self.registry.listeners(event).to_vec();
        for key in keys {
            let layer = &mut self.layers[key.object.layer.index()];
            if let Some(obj) = layer.objects.get_mut(key.object.index) {
                obj.fire_trigger(key.command, time);
            }
        }
    }

    /// Return everything to its load-time state: initial memberships,
    /// resting object values, empty registry, pass layer selected.
    pub fn reset(&mut self) {
        let Self {
            layers,
            master,
            registry,
            ..
        } = self;
        master.reset();
        for lid in LayerId::ALL {
            let layer = &mut layers[lid.index()];
            layer.attached.copy_from_slice(&layer.initial_attached);
            for i in 0..layer.objects.len() {
                layer.objects[i].reset(registry, ObjectKey::new(lid, i));
            }
        }
        self.is_failing = false;
    }

    /// Resolved visual state of every currently drawn sprite, in draw order
    /// (background, pass-or-fail, foreground; declaration order within each
    /// layer). Read by the renderer after `update` returns.
    pub fn snapshot(&self) -> Vec<SpriteSnapshot> {
        let mut out = Vec::new();
        for lid in Self::update_order(self.is_failing) {
            let layer = &self.layers[lid.index()];
            for (i, obj) in layer.objects.iter().enumerate() {
                if !layer.attached[i] {
                    continue;
                }
                let s = obj.state();
                out.push(SpriteSnapshot {
                    source: obj.source().to_string(),
                    layer: lid,
                    position: s.position,
                    scale: s.scale,
                    scale_factor: s.scale_factor,
                    rotation: s.rotation,
                    color: s.color,
                    opacity: s.opacity,
                    flip_h: s.flip_h,
                    flip_v: s.flip_v,
                    additive_blend: s.additive_blend,
                    transform: s.to_affine(),
                });
            }
        }
        out
    }
}

/// One drawn sprite as the renderer consumes it.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SpriteSnapshot {
    pub source: String,
    pub layer: LayerId,
    pub position: Vec2,
    pub scale: Vec2,
    pub scale_factor: f32,
    pub rotation: f32,
    pub color: Color,
    pub opacity: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    pub additive_blend: bool,
    pub transform: kurbo::Affine,
}
