// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Reflectivity-to-RGB color mapping.

/// Lower bound of the supported dBZ range; values below this clamp.
pub const DBZ_MIN: f32 = -35.0;
/// Upper bound of the supported dBZ range; values above this clamp.
pub const DBZ_MAX: f32 = 85.0;

/// Maps a reflectivity value (dBZ) to an opaque RGBA pixel, and exposes the
/// supported range so callers can clamp or treat out-of-range values as missing.
pub trait ColorMap: Send + Sync {
    fn color_for_dbz(&self, dbz: f32) -> [u8; 4];
    fn range(&self) -> (f32, f32) {
        (DBZ_MIN, DBZ_MAX)
    }
}

/// Breakpoint table for the national radar composite's reflectivity scale:
/// one RGB triple every 5 dBZ from -35 to 85, linearly interpolated in between.
const KEY_BREAKPOINTS: &[(f32, [u8; 3])] = &[
    (-35.0, [0, 0, 0]),
    (-30.0, [115, 126, 139]),
    (-25.0, [105, 117, 130]),
    (-20.0, [172, 196, 212]),
    (-15.0, [140, 172, 200]),
    (-10.0, [96, 140, 188]),
    (-5.0, [52, 108, 180]),
    (0.0, [12, 76, 168]),
    (5.0, [0, 100, 144]),
    (10.0, [0, 140, 108]),
    (15.0, [0, 180, 64]),
    (20.0, [0, 232, 12]),
    (25.0, [84, 240, 0]),
    (30.0, [208, 228, 0]),
    (35.0, [252, 204, 0]),
    (40.0, [252, 168, 0]),
    (45.0, [252, 100, 0]),
    (50.0, [248, 20, 0]),
    (55.0, [216, 8, 0]),
    (60.0, [152, 16, 0]),
    (65.0, [164, 40, 96]),
    (70.0, [204, 72, 200]),
    (75.0, [244, 108, 244]),
    (80.0, [252, 140, 252]),
    (85.0, [252, 172, 252]),
];

#[derive(Default, Clone, Copy)]
pub struct ReflectivityColorMap;

impl ColorMap for ReflectivityColorMap {
    fn color_for_dbz(&self, dbz: f32) -> [u8; 4] {
        let clamped = dbz.clamp(DBZ_MIN, DBZ_MAX);

        if let Some(&(_, rgb)) = KEY_BREAKPOINTS.iter().find(|(key, _)| *key == clamped) {
            return [rgb[0], rgb[1], rgb[2], 255];
        }

        let upper_idx = KEY_BREAKPOINTS.iter().position(|(key, _)| *key > clamped).unwrap_or(KEY_BREAKPOINTS.len() - 1);
        let lower_idx = upper_idx.saturating_sub(1);
        let (lower_key, lower_rgb) = KEY_BREAKPOINTS[lower_idx];
        let (upper_key, upper_rgb) = KEY_BREAKPOINTS[upper_idx];

        if (upper_key - lower_key).abs() < f32::EPSILON {
            return [lower_rgb[0], lower_rgb[1], lower_rgb[2], 255];
        }

        let factor = (clamped - lower_key) / (upper_key - lower_key);
        let lerp = |a: u8, b: u8| -> u8 { (a as f32 + factor * (b as f32 - a as f32)) as u8 };
        [lerp(lower_rgb[0], upper_rgb[0]), lerp(lower_rgb[1], upper_rgb[1]), lerp(lower_rgb[2], upper_rgb[2]), 255]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_breakpoints_match_table() {
        let cmap = ReflectivityColorMap;
        assert_eq!(cmap.color_for_dbz(-35.0), [0, 0, 0, 255]);
        assert_eq!(cmap.color_for_dbz(0.0), [12, 76, 168, 255]);
        assert_eq!(cmap.color_for_dbz(85.0), [252, 172, 252, 255]);
    }

    #[test]
    fn midpoint_interpolates_between_breakpoints() {
        let cmap = ReflectivityColorMap;
        let color = cmap.color_for_dbz(2.5);
        let low = cmap.color_for_dbz(0.0);
        let high = cmap.color_for_dbz(5.0);
        for i in 0..3 {
            assert!(color[i] >= low[i].min(high[i]) && color[i] <= low[i].max(high[i]));
        }
    }

    #[test]
    fn out_of_range_values_clamp() {
        let cmap = ReflectivityColorMap;
        assert_eq!(cmap.color_for_dbz(-1000.0), cmap.color_for_dbz(DBZ_MIN));
        assert_eq!(cmap.color_for_dbz(1000.0), cmap.color_for_dbz(DBZ_MAX));
    }
}
