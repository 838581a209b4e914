use std::f32::consts::PI;

/// The closed set of easing curves a script can name.
///
/// Scripts encode easings by integer id (0..=34); the id -> curve mapping is
/// a wire contract and must not be renumbered. `Out`/`In` (ids 1 and 2) are
/// the legacy aliases for the quadratic pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Easing {
    Linear,
    Out,
    In,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InQuart,
    OutQuart,
    InOutQuart,
    InQuint,
    OutQuint,
    InOutQuint,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
    InElastic,
    OutElastic,
    OutElasticHalf,
    OutElasticQuarter,
    InOutElastic,
    InBack,
    OutBack,
    InOutBack,
    InBounce,
    OutBounce,
    InOutBounce,
}

pub const EASING_ID_MAX: i64 = 34;

impl Easing {
    /// Decode a script easing id. Ids outside 0..=34 are malformed.
    pub fn from_id(id: i64) -> Option<Easing> {
        let e = match id {
            0 => Self::Linear,
            1 => Self::Out,
            2 => Self::In,
            3 => Self::InQuad,
            4 => Self::OutQuad,
            5 => Self::InOutQuad,
            6 => Self::InCubic,
            7 => Self::OutCubic,
            8 => Self::InOutCubic,
            9 => Self::InQuart,
            10 => Self::OutQuart,
            11 => Self::InOutQuart,
            12 => Self::InQuint,
            13 => Self::OutQuint,
            14 => Self::InOutQuint,
            15 => Self::InSine,
            16 => Self::OutSine,
            17 => Self::InOutSine,
            18 => Self::InExpo,
            19 => Self::OutExpo,
            20 => Self::InOutExpo,
            21 => Self::InCirc,
            22 => Self::OutCirc,
            23 => Self::InOutCirc,
            24 => Self::InElastic,
            25 => Self::OutElastic,
            26 => Self::OutElasticHalf,
            27 => Self::OutElasticQuarter,
            28 => Self::InOutElastic,
            29 => Self::InBack,
            30 => Self::OutBack,
            31 => Self::InOutBack,
            32 => Self::InBounce,
            33 => Self::OutBounce,
            34 => Self::InOutBounce,
            _ => return None,
        };
        Some(e)
    }

    /// Map a time fraction through the curve. Input is clamped to [0, 1];
    /// the elastic/back/bounce families may transiently leave [0, 1] on the
    /// way to their endpoint.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Out | Self::OutQuad => t * (2.0 - t),
            Self::In | Self::InQuad => t * t,
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Self::InQuart => t.powi(4),
            Self::OutQuart => 1.0 - (1.0 - t).powi(4),
            Self::InOutQuart => {
                if t < 0.5 {
                    8.0 * t.powi(4)
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(4) / 2.0
                }
            }
            Self::InQuint => t.powi(5),
            Self::OutQuint => 1.0 - (1.0 - t).powi(5),
            Self::InOutQuint => {
                if t < 0.5 {
                    16.0 * t.powi(5)
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(5) / 2.0
                }
            }
            Self::InSine => 1.0 - (t * PI / 2.0).cos(),
            Self::OutSine => (t * PI / 2.0).sin(),
            Self::InOutSine => -((PI * t).cos() - 1.0) / 2.0,
            Self::InExpo => {
                if t == 0.0 {
                    0.0
                } else {
                    2.0_f32.powf(10.0 * t - 10.0)
                }
            }
            Self::OutExpo => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2.0_f32.powf(-10.0 * t)
                }
            }
            Self::InOutExpo => {
                if t == 0.0 {
                    0.0
                } else if t == 1.0 {
                    1.0
                } else if t < 0.5 {
                    2.0_f32.powf(20.0 * t - 10.0) / 2.0
                } else {
                    (2.0 - 2.0_f32.powf(-20.0 * t + 10.0)) / 2.0
                }
            }
            Self::InCirc => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            Self::OutCirc => (1.0 - (t - 1.0).powi(2)).max(0.0).sqrt(),
            Self::InOutCirc => {
                if t < 0.5 {
                    (1.0 - (1.0 - (2.0 * t).powi(2)).max(0.0).sqrt()) / 2.0
                } else {
                    ((1.0 - (-2.0 * t + 2.0).powi(2)).max(0.0).sqrt() + 1.0) / 2.0
                }
            }
            Self::InElastic => elastic_in(t),
            Self::OutElastic => elastic_out(t, 1.0),
            Self::OutElasticHalf => elastic_out(t, 0.5),
            Self::OutElasticQuarter => elastic_out(t, 0.25),
            Self::InOutElastic => elastic_in_out(t),
            Self::InBack => {
                const C1: f32 = 1.70158;
                (C1 + 1.0) * t * t * t - C1 * t * t
            }
            Self::OutBack => {
                const C1: f32 = 1.70158;
                let u = t - 1.0;
                1.0 + (C1 + 1.0) * u * u * u + C1 * u * u
            }
            Self::InOutBack => {
                const C2: f32 = 1.70158 * 1.525;
                if t < 0.5 {
                    ((2.0 * t).powi(2) * ((C2 + 1.0) * 2.0 * t - C2)) / 2.0
                } else {
                    ((2.0 * t - 2.0).powi(2) * ((C2 + 1.0) * (2.0 * t - 2.0) + C2) + 2.0) / 2.0
                }
            }
            Self::InBounce => 1.0 - bounce_out(1.0 - t),
            Self::OutBounce => bounce_out(t),
            Self::InOutBounce => {
                if t < 0.5 {
                    (1.0 - bounce_out(1.0 - 2.0 * t)) / 2.0
                } else {
                    (1.0 + bounce_out(2.0 * t - 1.0)) / 2.0
                }
            }
        }
    }

    /// Eased value between two endpoints: `(1 - e) * start + e * end`.
    pub fn interpolate(self, start: f32, end: f32, t: f32) -> f32 {
        let e = self.apply(t);
        start + (end - start) * e
    }
}

fn elastic_in(t: f32) -> f32 {
    if t == 0.0 {
        0.0
    } else if t == 1.0 {
        1.0
    } else {
        let c4 = (2.0 * PI) / 0.3;
        -(2.0_f32.powf(10.0 * t - 10.0)) * ((t - 1.075) * c4).sin()
    }
}

/// `rate` scales how far through the sine cycle the curve travels; the half
/// and quarter variants deliberately settle mid-oscillation (their value at
/// t = 1 is not 1).
fn elastic_out(t: f32, rate: f32) -> f32 {
    if t == 0.0 {
        return 0.0;
    }
    if t == 1.0 && rate == 1.0 {
        return 1.0;
    }
    let c4 = (2.0 * PI) / 0.3;
    2.0_f32.powf(-10.0 * t) * ((rate * t - 0.075) * c4).sin() + 1.0
}

fn elastic_in_out(t: f32) -> f32 {
    if t == 0.0 {
        0.0
    } else if t == 1.0 {
        1.0
    } else {
        let c5 = (2.0 * PI) / 4.5;
        if t < 0.5 {
            -(2.0_f32.powf(20.0 * t - 10.0) * ((20.0 * t - 11.125) * c5).sin()) / 2.0
        } else {
            2.0_f32.powf(-20.0 * t + 10.0) * ((20.0 * t - 11.125) * c5).sin() / 2.0 + 1.0
        }
    }
}

fn bounce_out(t: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;

    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}
