//! Accuracy-bounded quantization for cache entries.
//!
//! Values are rounded to multiples of `step = 2 * accuracy * max|x|` and stored as successive
//! differences, which bincode's variable-length integers pack tightly for smooth fields.

use serde::{Deserialize, Serialize};

use crate::config::CompressionConfig;

/// Quantized magnitudes beyond this fall back to raw storage.
const MAX_LEVEL: f64 = (1u64 << 52) as f64;

/// A stored field, tagged with its representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldData {
    Raw(Vec<f32>),
    Quantized { step: f64, deltas: Vec<i64> },
}

impl FieldData {
    pub fn encode(values: Vec<f32>, compression: &CompressionConfig) -> FieldData {
        if !compression.enabled {
            return FieldData::Raw(values);
        }

        match quantize(&values, compression.accuracy) {
            Some((step, deltas)) => FieldData::Quantized { step, deltas },
            None => FieldData::Raw(values),
        }
    }

    pub fn value_count(&self) -> usize {
        match self {
            FieldData::Raw(values) => values.len(),
            FieldData::Quantized { deltas, .. } => deltas.len(),
        }
    }

    pub fn decode(self) -> Vec<f32> {
        match self {
            FieldData::Raw(values) => values,
            FieldData::Quantized { step, deltas } => {
                let mut level = 0i64;
                deltas
                    .into_iter()
                    .map(|d| {
                        level += d;
                        (level as f64 * step) as f32
                    })
                    .collect()
            }
        }
    }
}

fn quantize(values: &[f32], accuracy: f32) -> Option<(f64, Vec<i64>)> {
    if accuracy.is_nan() || accuracy <= 0.0 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let max = values.iter().fold(0.0f64, |m, &v| m.max((v as f64).abs()));
    let step = if max == 0.0 { 1.0 } else { 2.0 * accuracy as f64 * max };

    let mut previous = 0i64;
    let mut deltas = Vec::with_capacity(values.len());

    for &v in values {
        let level = (v as f64 / step).round();
        if level.abs() > MAX_LEVEL {
            return None;
        }

        let level = level as i64;
        deltas.push(level - previous);
        previous = level;
    }

    Some((step, deltas))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(accuracy: f32) -> CompressionConfig {
        CompressionConfig { enabled: true, accuracy }
    }

    #[test]
    fn disabled_compression_stores_raw_values() {
        let data = FieldData::encode(vec![1.0, 2.0], &CompressionConfig::default());

        assert_eq!(data, FieldData::Raw(vec![1.0, 2.0]));
    }

    #[test]
    fn reconstruction_error_is_bounded() {
        let values: Vec<f32> = (0..500).map(|i| (i as f32 * 0.37).sin() * 12.5 - 3.0).collect();
        let accuracy = 1e-5;

        let data = FieldData::encode(values.clone(), &enabled(accuracy));
        assert!(matches!(data, FieldData::Quantized { .. }));

        let max = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let bound = accuracy * max * 1.01 + f32::EPSILON * max;

        for (a, b) in values.iter().zip(data.decode()) {
            assert!((a - b).abs() <= bound, "{a} vs {b}");
        }
    }

    #[test]
    fn zero_field_is_exact() {
        let data = FieldData::encode(vec![0.0; 8], &enabled(1e-5));

        assert_eq!(data.decode(), vec![0.0; 8]);
    }

    #[test]
    fn non_finite_values_fall_back_to_raw() {
        let data = FieldData::encode(vec![1.0, f32::NAN], &enabled(1e-5));

        assert!(matches!(data, FieldData::Raw(_)));
        assert_eq!(data.value_count(), 2);
    }

    #[test]
    fn smooth_fields_shrink() {
        let values: Vec<f32> = (0..4096).map(|i| (i as f32 / 4096.0).powi(2)).collect();
        let config = bincode::config::standard();

        let raw = bincode::serde::encode_to_vec(FieldData::Raw(values.clone()), config).unwrap();
        let packed = bincode::serde::encode_to_vec(FieldData::encode(values, &enabled(1e-3)), config).unwrap();

        assert!(packed.len() < raw.len());
    }
}
