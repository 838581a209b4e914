#![forbid(unsafe_code)]

pub mod command;
pub mod core;
pub mod ease;
pub mod error;
pub mod event;
pub mod object;
pub mod script;
pub mod storyboard;

pub use command::{
    Command, LoopCommand, ModifyCommand, Property, ToggleCommand, ToggleKind, TriggerCommand,
    TriggerEvent,
};
pub use core::{Color, SpriteState, TimeMs, Vec2};
pub use ease::Easing;
pub use error::{PlayheadError, PlayheadResult};
pub use event::{EventRunner, RunnerStep, TimelineEvent};
pub use object::{DisplayWindow, TimelineObject};
pub use script::{CommandDoc, Diagnostic, ObjectDoc, StoryboardDoc};
pub use storyboard::{LayerId, ObjectKey, SpriteSnapshot, Storyboard, TriggerKey, TriggerRegistry};
