// lightscale.rs — shared-exponent light samples and gamma encoding

use std::sync::OnceLock;

use crate::shared::Vec3;

/// One entry per possible 8-bit exponent, -128..=127.
static POW2_TABLE: OnceLock<[f32; 256]> = OnceLock::new();

fn pow2_table() -> &'static [f32; 256] {
    POW2_TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = 2.0f64.powi(i as i32 - 128) as f32;
        }
        table
    })
}

/// `2^exponent`, read from the process-wide table.
#[inline]
pub fn light_scale(exponent: i8) -> f32 {
    pow2_table()[(exponent as i32 + 128) as usize]
}

/// RGB with a shared power-of-two exponent, as stored in lighting lumps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorRgbExp32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub exponent: i8,
}

impl ColorRgbExp32 {
    pub const SIZE: usize = 4;

    pub fn from_bytes(b: &[u8]) -> Self {
        ColorRgbExp32 {
            r: b[0],
            g: b[1],
            b: b[2],
            exponent: b[3] as i8,
        }
    }

    /// Linear colour, `c * 2^e / 255` per channel.
    pub fn to_linear(&self) -> Vec3 {
        let scale = light_scale(self.exponent) / 255.0;
        [
            self.r as f32 * scale,
            self.g as f32 * scale,
            self.b as f32 * scale,
        ]
    }
}

#[inline]
pub fn gamma_encode(linear: f32, gamma: f32) -> f32 {
    linear.powf(1.0 / gamma)
}

/// Decode a stored sample and gamma-encode it for display.
pub fn color_shift_pixel(color: &ColorRgbExp32, gamma: f32) -> Vec3 {
    let linear = color.to_linear();
    [
        gamma_encode(linear[0], gamma),
        gamma_encode(linear[1], gamma),
        gamma_encode(linear[2], gamma),
    ]
}
