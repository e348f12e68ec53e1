// src/utils/fixed_point.rs

/// No-data sentinel in raw (pre-scaling) index rasters.
pub const NODATA_F32: f32 = -999.0;
/// No-data sentinel in scaled integer rasters.
pub const NODATA_I16: i16 = -10000;
/// Top of the scaled integer range.
pub const SCALE_MAX: i32 = 10000;

/// Scale a [-1, 1] index into 0..10000: `(v + 1) * 5000`.
pub fn scale_signed_unit(data: &[f32]) -> Vec<i16> {
    data.iter()
        .map(|&value| {
            if value == NODATA_F32 || value.is_nan() {
                NODATA_I16
            } else {
                let clamped = value.clamp(-1.0, 1.0);
                ((clamped + 1.0) * (SCALE_MAX as f32 / 2.0)).round() as i16
            }
        })
        .collect()
}

/// Inverse of [`scale_signed_unit`]; `None` for the no-data sentinel.
pub fn unscale_signed_unit(value: i16) -> Option<f32> {
    if value == NODATA_I16 {
        None
    } else {
        Some(value as f32 / (SCALE_MAX as f32 / 2.0) - 1.0)
    }
}

/// Scale a [0, 1] index into 0..10000: `v * 10000`.
pub fn scale_unit(data: &[f32]) -> Vec<i16> {
    data.iter()
        .map(|&value| {
            if value == NODATA_F32 || value.is_nan() {
                NODATA_I16
            } else {
                (value.clamp(0.0, 1.0) * SCALE_MAX as f32).round() as i16
            }
        })
        .collect()
}

/// Inverse of [`scale_unit`]; `None` for the no-data sentinel.
pub fn unscale_unit(value: i16) -> Option<f32> {
    if value == NODATA_I16 {
        None
    } else {
        Some(value as f32 / SCALE_MAX as f32)
    }
}

/// Clamp raw reflectance digital numbers into the 0..10000 storage range.
/// Used by TrueColor, which is a band stack rather than algebra.
pub fn scale_reflectance(data: &[f32]) -> Vec<i16> {
    data.iter()
        .map(|&value| {
            if value == NODATA_F32 || value.is_nan() {
                NODATA_I16
            } else {
                value.clamp(0.0, SCALE_MAX as f32).round() as i16
            }
        })
        .collect()
}
