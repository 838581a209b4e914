//! Script load surface: the serde document model for storyboard JSON and the
//! builder that decodes it into a live [`Storyboard`].
//!
//! Loading is lenient about individual commands: a malformed entry (unknown
//! token, bad easing id, wrong value arity, inverted window) is skipped and
//! reported as a [`Diagnostic`], and the rest of the script still loads. An
//! unknown layer name is structural and fails the whole load.

use crate::{
    command::{Command, LoopCommand, ModifyCommand, Property, ToggleCommand, ToggleKind,
        TriggerCommand, TriggerEvent},
    core::{TimeMs, Vec2},
    ease::Easing,
    error::{PlayheadError, PlayheadResult},
    object::TimelineObject,
    storyboard::{LayerId, Storyboard},
};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StoryboardDoc {
    pub objects: Vec<ObjectDoc>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ObjectDoc {
    pub layer: String,
    pub source: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub commands: Vec<CommandDoc>,
}

/// One scripted command as it appears in the document.
///
/// `Modify` carries a property token (`M`, `MX`, `MY`, `S`, `V`, `SS`, `R`,
/// `C`, `F`) and an easing id in 0..=34; `Toggle` a kind token (`H`, `V`,
/// `A`). Times are integer milliseconds on the script clock.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum CommandDoc {
    Modify {
        property: String,
        #[serde(default)]
        easing: i64,
        start_time: i32,
        end_time: i32,
        start: Vec<f32>,
        /// Empty means "same as start" (a hold).
        #[serde(default)]
        end: Vec<f32>,
    },
    Toggle {
        kind: String,
        start_time: i32,
        end_time: i32,
    },
    Loop {
        start_time: i32,
        count: i64,
        commands: Vec<CommandDoc>,
    },
    Trigger {
        event: String,
        start_time: i32,
        end_time: i32,
        commands: Vec<CommandDoc>,
    },
}

/// A script entry that was skipped during load, with the document path it
/// came from (`objects[2].commands[1]` style).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

fn property_token(token: &str) -> Option<Property> {
    match token {
        "M" => Some(Property::Position),
        "MX" => Some(Property::PositionX),
        "MY" => Some(Property::PositionY),
        "S" => Some(Property::Scale),
        "V" => Some(Property::ScaleVector),
        "SS" => Some(Property::ScaleFactor),
        "R" => Some(Property::Rotation),
        "C" => Some(Property::Color),
        "F" => Some(Property::Opacity),
        _ => None,
    }
}

fn toggle_token(token: &str) -> Option<ToggleKind> {
    match token {
        "H" => Some(ToggleKind::FlipHorizontal),
        "V" => Some(ToggleKind::FlipVertical),
        "A" => Some(ToggleKind::AdditiveBlend),
        _ => None,
    }
}

/// Parse a storyboard document from JSON text.
pub fn parse_str(json: &str) -> PlayheadResult<StoryboardDoc> {
    serde_json::from_str(json).map_err(|e| PlayheadError::script(format!("parse storyboard JSON: {e}")))
}

/// Parse and build in one step.
pub fn load_str(json: &str) -> PlayheadResult<(Storyboard, Vec<Diagnostic>)> {
    build(&parse_str(json)?)
}

/// Decode a document into a live storyboard plus the diagnostics for every
/// entry that had to be skipped.
pub fn build(doc: &StoryboardDoc) -> PlayheadResult<(Storyboard, Vec<Diagnostic>)> {
    let mut diagnostics = Vec::new();
    let mut layers: [Vec<TimelineObject>; 4] = Default::default();

    for (oi, obj) in doc.objects.iter().enumerate() {
        let Some(layer) = LayerId::from_name(&obj.layer) else {
            return Err(PlayheadError::script(format!(
                "objects[{oi}]: unknown layer '{}'",
                obj.layer
            )));
        };

        let mut commands = Vec::with_capacity(obj.commands.len());
        for (ci, cmd) in obj.commands.iter().enumerate() {
            let path = format!("objects[{oi}].commands[{ci}]");
            if let Some(decoded) = decode_command(cmd, &path, true, &mut diagnostics) {
                commands.push(decoded);
            }
        }

        let slot = match layer {
            LayerId::Background => &mut layers[0],
            LayerId::Fail => &mut layers[1],
            LayerId::Pass => &mut layers[2],
            LayerId::Foreground => &mut layers[3],
        };
        slot.push(TimelineObject::new(
            obj.source.clone(),
            Vec2::new(obj.x, obj.y),
            commands,
        ));
    }

    Ok((Storyboard::from_layers(layers), diagnostics))
}

fn skip(diagnostics: &mut Vec<Diagnostic>, path: &str, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!(path, %message, "skipping malformed script entry");
    diagnostics.push(Diagnostic {
        path: path.to_string(),
        message,
    });
}

fn decode_command(
    doc: &CommandDoc,
    path: &str,
    allow_composite: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Command> {
    match doc {
        CommandDoc::Modify {
            property,
            easing,
            start_time,
            end_time,
            start,
            end,
        } => {
            let Some(prop) = property_token(property) else {
                skip(diagnostics, path, format!("unknown property token '{property}'"));
                return None;
            };
            let Some(ease) = Easing::from_id(*easing) else {
                skip(diagnostics, path, format!("easing id {easing} out of range"));
                return None;
            };
            if end_time < start_time {
                skip(diagnostics, path, "end time before start time");
                return None;
            }
            if start.len() != prop.arity() {
                skip(
                    diagnostics,
                    path,
                    format!(
                        "property '{property}' takes {} value(s), got {}",
                        prop.arity(),
                        start.len()
                    ),
                );
                return None;
            }
            let end_values = if end.is_empty() {
                start.clone()
            } else if end.len() == prop.arity() {
                end.clone()
            } else {
                skip(
                    diagnostics,
                    path,
                    format!(
                        "property '{property}' takes {} end value(s), got {}",
                        prop.arity(),
                        end.len()
                    ),
                );
                return None;
            };
            Some(Command::Modify(ModifyCommand {
                property: prop,
                easing: ease,
                start_time: TimeMs(*start_time),
                end_time: TimeMs(*end_time),
                start_values: start.clone(),
                end_values,
            }))
        }
        CommandDoc::Toggle {
            kind,
            start_time,
            end_time,
        } => {
            let Some(kind) = toggle_token(kind) else {
                skip(diagnostics, path, "unknown toggle kind (expected H, V, or A)");
                return None;
            };
            if end_time < start_time {
                skip(diagnostics, path, "end time before start time");
                return None;
            }
            Some(Command::Toggle(ToggleCommand {
                kind,
                start_time: TimeMs(*start_time),
                end_time: TimeMs(*end_time),
            }))
        }
        CommandDoc::Loop {
            start_time,
            count,
            commands,
        } => {
            if !allow_composite {
                skip(diagnostics, path, "loops cannot nest inside another composite");
                return None;
            }
            if *count <= 0 {
                skip(diagnostics, path, format!("loop count {count} must be positive"));
                return None;
            }
            let children = decode_children(commands, path, diagnostics);
            Some(Command::Loop(LoopCommand::new(
                TimeMs(*start_time),
                (*count).min(i64::from(u32::MAX)) as u32,
                children,
            )))
        }
        CommandDoc::Trigger {
            event,
            start_time,
            end_time,
            commands,
        } => {
            if !allow_composite {
                skip(diagnostics, path, "triggers cannot nest inside another composite");
                return None;
            }
            let Some(event) = TriggerEvent::parse(event) else {
                skip(diagnostics, path, format!("unknown trigger event '{event}'"));
                return None;
            };
            if end_time < start_time {
                skip(diagnostics, path, "end time before start time");
                return None;
            }
            let children = decode_children(commands, path, diagnostics);
            Some(Command::Trigger(TriggerCommand::new(
                event,
                TimeMs(*start_time),
                TimeMs(*end_time),
                children,
            )))
        }
    }
}

fn decode_children(
    docs: &[CommandDoc],
    parent: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Command> {
    docs.iter()
        .enumerate()
        .filter_map(|(i, child)| {
            let path = format!("{parent}.commands[{i}]");
            decode_command(child, &path, false, diagnostics)
        })
        .collect()
}
