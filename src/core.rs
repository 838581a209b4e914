//! Shared value types for the interpreter: the millisecond clock, small
//! geometry/color types, and the resolved sprite state read by renderers.

/// Playback position in integer milliseconds. The host clock is the only
/// source of these; no other time format is accepted.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TimeMs(pub i32);

impl TimeMs {
    pub fn saturating_add(self, other: TimeMs) -> TimeMs {
        TimeMs(self.0.saturating_add(other.0))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }
}

/// Sprite tint in the script's 0..=255 channel domain. Interpolated as f32 so
/// eased color commands stay smooth.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 255.0,
        g: 255.0,
        b: 255.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// The resolved visual state of one sprite at the current playback position.
///
/// Values are only meaningful for rendering while the owning object is a
/// member of its layer; a detached object's state must not be drawn.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpriteState {
    pub position: Vec2,
    pub scale: Vec2,
    /// Uniform multiplier applied on top of `scale` (the script's special
    /// scale channel, typically used for resolution-independent sizing).
    pub scale_factor: f32,
    /// Radians, clockwise.
    pub rotation: f32,
    pub color: Color,
    /// 0 = fully transparent, 1 = opaque.
    pub opacity: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    pub additive_blend: bool,
}

impl SpriteState {
    /// Resting state for a sprite declared at `position`, before any command
    /// has contributed an initial value.
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            scale: Vec2::splat(1.0),
            scale_factor: 1.0,
            rotation: 0.0,
            color: Color::WHITE,
            opacity: 1.0,
            flip_h: false,
            flip_v: false,
            additive_blend: false,
        }
    }

    /// Renderer-facing transform: translate, then rotate, then scale, with
    /// flips folded in as axis mirroring.
    pub fn to_affine(&self) -> kurbo::Affine {
        let mut sx = f64::from(self.scale.x) * f64::from(self.scale_factor);
        let mut sy = f64::from(self.scale.y) * f64::from(self.scale_factor);
        if self.flip_h {
            sx = -sx;
        }
        if self.flip_v {
            sy = -sy;
        }
        kurbo::Affine::translate((f64::from(self.position.x), f64::from(self.position.y)))
            * kurbo::Affine::rotate(f64::from(self.rotation))
            * kurbo::Affine::scale_non_uniform(sx, sy)
    }
}

impl Default for SpriteState {
    fn default() -> Self {
        Self::at(Vec2::default())
    }
}
