use crate::BackendError;

pub const SPEAKER_FRONT_LEFT: u32 = 0x1;
pub const SPEAKER_FRONT_RIGHT: u32 = 0x2;
pub const SPEAKER_FRONT_CENTER: u32 = 0x4;
pub const SPEAKER_LOW_FREQUENCY: u32 = 0x8;
pub const SPEAKER_BACK_LEFT: u32 = 0x10;
pub const SPEAKER_BACK_RIGHT: u32 = 0x20;
pub const SPEAKER_FRONT_LEFT_OF_CENTER: u32 = 0x40;
pub const SPEAKER_FRONT_RIGHT_OF_CENTER: u32 = 0x80;
pub const SPEAKER_BACK_CENTER: u32 = 0x100;
pub const SPEAKER_SIDE_LEFT: u32 = 0x200;
pub const SPEAKER_SIDE_RIGHT: u32 = 0x400;

pub const SPEAKER_MONO: u32 = SPEAKER_FRONT_CENTER;
pub const SPEAKER_STEREO: u32 = SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT;
pub const SPEAKER_QUAD: u32 =
    SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT | SPEAKER_BACK_LEFT | SPEAKER_BACK_RIGHT;
pub const SPEAKER_5POINT1: u32 = SPEAKER_FRONT_LEFT
    | SPEAKER_FRONT_RIGHT
    | SPEAKER_FRONT_CENTER
    | SPEAKER_LOW_FREQUENCY
    | SPEAKER_BACK_LEFT
    | SPEAKER_BACK_RIGHT;
pub const SPEAKER_7POINT1: u32 = SPEAKER_5POINT1 | SPEAKER_SIDE_LEFT | SPEAKER_SIDE_RIGHT;

// (mask bit, azimuth in radians, clockwise from front). LFE has no position.
const SPEAKER_POSITIONS: [(u32, Option<f32>); 11] = [
    (SPEAKER_FRONT_LEFT, Some(-std::f32::consts::FRAC_PI_4)),
    (SPEAKER_FRONT_RIGHT, Some(std::f32::consts::FRAC_PI_4)),
    (SPEAKER_FRONT_CENTER, Some(0.0)),
    (SPEAKER_LOW_FREQUENCY, None),
    (SPEAKER_BACK_LEFT, Some(-3.0 * std::f32::consts::FRAC_PI_4)),
    (SPEAKER_BACK_RIGHT, Some(3.0 * std::f32::consts::FRAC_PI_4)),
    (SPEAKER_FRONT_LEFT_OF_CENTER, Some(-std::f32::consts::FRAC_PI_8)),
    (SPEAKER_FRONT_RIGHT_OF_CENTER, Some(std::f32::consts::FRAC_PI_8)),
    (SPEAKER_BACK_CENTER, Some(std::f32::consts::PI)),
    (SPEAKER_SIDE_LEFT, Some(-std::f32::consts::FRAC_PI_2)),
    (SPEAKER_SIDE_RIGHT, Some(std::f32::consts::FRAC_PI_2)),
];

/// Default speaker layout for a channel count.
pub fn channel_mask_for(channels: u16) -> u32 {
    match channels {
        1 => SPEAKER_MONO,
        2 => SPEAKER_STEREO,
        4 => SPEAKER_QUAD,
        6 => SPEAKER_5POINT1,
        8 => SPEAKER_7POINT1,
        // Unknown layouts: assign positions in mask-bit order.
        n => (1u32 << n.min(11)) - 1,
    }
}

/// Coefficient tables consulted by 3D positioning.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialTables {
    pub channel_mask: u32,
    pub speed_of_sound: f32,
    /// Propagation delay per meter of emitter distance.
    pub seconds_per_meter: f32,
    /// Azimuth per output channel, in channel order; `None` for the LFE channel.
    pub speaker_azimuths: Vec<Option<f32>>,
}

impl SpatialTables {
    pub fn new(channel_mask: u32, speed_of_sound: f32) -> Result<Self, BackendError> {
        if !speed_of_sound.is_finite() || speed_of_sound <= 0.0 {
            return Err(BackendError::InvalidCall(format!(
                "speed of sound must be positive, got {}",
                speed_of_sound
            )));
        }
        if channel_mask == 0 {
            return Err(BackendError::InvalidCall("empty channel mask".into()));
        }
        let speaker_azimuths = SPEAKER_POSITIONS
            .iter()
            .filter(|(bit, _)| channel_mask & bit != 0)
            .map(|(_, azimuth)| *azimuth)
            .collect();
        Ok(Self {
            channel_mask,
            speed_of_sound,
            seconds_per_meter: 1.0 / speed_of_sound,
            speaker_azimuths,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.speaker_azimuths.len()
    }
}
