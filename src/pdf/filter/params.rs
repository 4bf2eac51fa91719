//! Decode parameters shared by Flate and LZW

use crate::pdf::object::Dictionary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    /// 1 = none, 2 = TIFF, 10-15 = PNG
    pub predictor: i64,
    pub colors: i64,
    pub bits_per_component: i64,
    pub columns: i64,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(dict: Option<&Dictionary>) -> Self {
        let defaults = Self::default();
        let Some(dict) = dict else {
            return defaults;
        };
        Self {
            predictor: dict.get_int("Predictor").unwrap_or(defaults.predictor),
            colors: dict.get_int("Colors").unwrap_or(defaults.colors),
            bits_per_component: dict
                .get_int("BitsPerComponent")
                .unwrap_or(defaults.bits_per_component),
            columns: dict.get_int("Columns").unwrap_or(defaults.columns),
        }
    }

    pub fn is_active(&self) -> bool {
        self.predictor > 1
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.colors.max(1) as usize * self.bits_per_component.max(1) as usize).div_ceil(8)
    }

    pub fn bytes_per_row(&self) -> usize {
        (self.colors.max(1) as usize
            * self.bits_per_component.max(1) as usize
            * self.columns.max(1) as usize)
            .div_ceil(8)
    }
}

/// `EarlyChange` of an LZW parameter dictionary; defaults to on.
pub fn early_change(dict: Option<&Dictionary>) -> bool {
    dict.and_then(|d| d.get_int("EarlyChange")).is_none_or(|v| v != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_dict() {
        let dict = Dictionary::new().with("Predictor", 12).with("Columns", 4);
        let params = PredictorParams::from_dict(Some(&dict));
        assert_eq!(params.predictor, 12);
        assert_eq!(params.colors, 1);
        assert_eq!(params.bytes_per_row(), 4);
        assert!(params.is_active());
    }

    #[test]
    fn test_params_default() {
        let params = PredictorParams::from_dict(None);
        assert!(!params.is_active());
        assert_eq!(params.bytes_per_pixel(), 1);
    }

    #[test]
    fn test_early_change() {
        assert!(early_change(None));
        let dict = Dictionary::new().with("EarlyChange", 0);
        assert!(!early_change(Some(&dict)));
    }
}
