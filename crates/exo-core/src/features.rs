//! Raw payload -> fixed-order model row.
//!
//! The classifier was trained on exactly [`EXPECTED_FEATURES`], in this order.
//! Anything the caller did not send becomes `NaN`, which every model adapter
//! treats as "missing".

use crate::schema::RawFeatures;

pub const FEATURE_DIM: usize = 15;

pub const EXPECTED_FEATURES: [&str; FEATURE_DIM] = [
    "pl_orbper",
    "pl_orbsmax",
    "pl_eqt",
    "pl_insol",
    "pl_imppar",
    "pl_trandep",
    "pl_trandur",
    "pl_ratdor",
    "pl_ratror",
    "st_teff",
    "st_rad",
    "st_mass",
    "st_met",
    "st_logg",
    "sy_imag",
];

/// Slot every magnitude band collapses onto.
pub const CANONICAL_MAG: &str = "sy_imag";

/// Fallback bands for [`CANONICAL_MAG`], nearest wavelength to the i band first.
pub const MAG_ALIAS_PRIORITY: [&str; 6] = [
    "sy_zmag", "sy_rmag", "sy_gmag", "sy_jmag", "sy_hmag", "sy_kmag",
];

/// One model input row. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_DIM]);

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        EXPECTED_FEATURES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    pub fn missing_count(&self) -> usize {
        self.0.iter().filter(|v| v.is_nan()).count()
    }
}

/// Resolve the magnitude-band family to a single value.
///
/// `sy_imag` wins when present; otherwise the first present band in
/// [`MAG_ALIAS_PRIORITY`].
pub fn resolve_magnitude(raw: &RawFeatures) -> Option<(&'static str, f64)> {
    std::iter::once(CANONICAL_MAG)
        .chain(MAG_ALIAS_PRIORITY)
        .find_map(|name| raw.get(name).map(|v| (name, v)))
}

/// Map a raw payload onto the fixed feature order. Never fails.
pub fn map_features(raw: &RawFeatures) -> (FeatureVector, &'static [&'static str; FEATURE_DIM]) {
    let mag = resolve_magnitude(raw).map(|(_, v)| v);

    let mut row = [f64::NAN; FEATURE_DIM];
    for (slot, name) in row.iter_mut().zip(EXPECTED_FEATURES) {
        let v = if name == CANONICAL_MAG { mag } else { raw.get(name) };
        if let Some(v) = v {
            *slot = v;
        }
    }

    (FeatureVector(row), &EXPECTED_FEATURES)
}
