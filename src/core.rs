use crate::error::{DeckError, DeckResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Logical working-surface width for slide thumbnails, in canvas units.
pub const THUMB_SURFACE_W: u32 = 1024;
/// Logical working-surface height for slide thumbnails, in canvas units.
pub const THUMB_SURFACE_H: u32 = 576;
/// Downscale applied when encoding the working surface (~256x144 output).
pub const THUMB_SCALE: f64 = 0.25;

/// Straight-alpha RGBA8 color as it appears in the slide document model.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8::opaque(255, 255, 255);
    pub const BLACK: Rgba8 = Rgba8::opaque(0, 0, 0);
    pub const TRANSPARENT: Rgba8 = Rgba8 {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb` or `#rrggbb` hex notation (leading `#` optional).
    pub fn from_hex(hex: &str) -> DeckResult<Self> {
        let s = hex.trim().trim_start_matches('#');
        let parse2 = |s: &str| -> DeckResult<u8> {
            u8::from_str_radix(s, 16)
                .map_err(|_| DeckError::validation(format!("invalid hex color '{hex}'")))
        };
        match s.len() {
            6 => Ok(Self::opaque(
                parse2(&s[0..2])?,
                parse2(&s[2..4])?,
                parse2(&s[4..6])?,
            )),
            3 => {
                let widen = |c: &str| -> DeckResult<u8> {
                    let v = parse2(c)?;
                    Ok(v * 16 + v)
                };
                Ok(Self::opaque(
                    widen(&s[0..1])?,
                    widen(&s[1..2])?,
                    widen(&s[2..3])?,
                ))
            }
            _ => Err(DeckError::validation(format!(
                "invalid hex color '{hex}' (expected #rgb or #rrggbb)"
            ))),
        }
    }

    /// Lenient variant used for document colors: malformed input falls back
    /// to opaque white, mirroring how the host editor resolves bad colors.
    pub fn from_hex_or_white(hex: &str) -> Self {
        Self::from_hex(hex).unwrap_or(Self::WHITE)
    }

    /// Linear interpolation in straight-alpha space.
    pub fn lerp(self, other: Rgba8, t: f64) -> Rgba8 {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| -> u8 {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * t)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgba8 {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

/// Premultiply straight-alpha RGBA8 bytes in place.
pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Undo premultiplication, returning straight-alpha bytes in place.
pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}
