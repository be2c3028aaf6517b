// crates/exo-core/src/schema.rs
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Inbound feature payload.
///
/// Every field is optional: upstream schema versions disagree on which
/// columns they send, and a `null` is the same as an absent key. Unknown keys
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    pub pl_orbper: Option<f64>,
    pub pl_orbsmax: Option<f64>,
    pub pl_eqt: Option<f64>,
    pub pl_insol: Option<f64>,
    pub pl_imppar: Option<f64>,
    pub pl_trandep: Option<f64>,
    pub pl_trandur: Option<f64>,
    pub pl_ratdor: Option<f64>,
    pub pl_ratror: Option<f64>,
    pub st_teff: Option<f64>,
    pub st_rad: Option<f64>,
    pub st_mass: Option<f64>,
    pub st_met: Option<f64>,
    pub st_logg: Option<f64>,

    // photometric bands; only sy_imag feeds the model, the rest are aliases for it
    pub sy_gmag: Option<f64>,
    pub sy_rmag: Option<f64>,
    pub sy_imag: Option<f64>,
    pub sy_zmag: Option<f64>,
    pub sy_jmag: Option<f64>,
    pub sy_hmag: Option<f64>,
    pub sy_kmag: Option<f64>,
}

impl RawFeatures {
    /// Build from loosely typed `(name, value)` pairs. Unknown names are skipped.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<f64>)>,
    {
        let mut out = Self::default();
        for (name, v) in pairs {
            if let Some(slot) = out.slot_mut(name) {
                *slot = v;
            }
        }
        out
    }

    /// Build from a JSON object: numbers are taken, everything else is absent.
    pub fn from_json_map(obj: &Map<String, Value>) -> Self {
        Self::from_pairs(obj.iter().map(|(k, v)| (k.as_str(), v.as_f64())))
    }

    /// Number of fields carrying a value.
    pub fn present_count(&self) -> usize {
        Self::FIELD_NAMES
            .iter()
            .filter(|n| self.get(n).is_some())
            .count()
    }

    pub const FIELD_NAMES: [&'static str; 21] = [
        "pl_orbper", "pl_orbsmax", "pl_eqt", "pl_insol", "pl_imppar", "pl_trandep",
        "pl_trandur", "pl_ratdor", "pl_ratror", "st_teff", "st_rad", "st_mass", "st_met",
        "st_logg", "sy_gmag", "sy_rmag", "sy_imag", "sy_zmag", "sy_jmag", "sy_hmag", "sy_kmag",
    ];

    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "pl_orbper" => self.pl_orbper,
            "pl_orbsmax" => self.pl_orbsmax,
            "pl_eqt" => self.pl_eqt,
            "pl_insol" => self.pl_insol,
            "pl_imppar" => self.pl_imppar,
            "pl_trandep" => self.pl_trandep,
            "pl_trandur" => self.pl_trandur,
            "pl_ratdor" => self.pl_ratdor,
            "pl_ratror" => self.pl_ratror,
            "st_teff" => self.st_teff,
            "st_rad" => self.st_rad,
            "st_mass" => self.st_mass,
            "st_met" => self.st_met,
            "st_logg" => self.st_logg,
            "sy_gmag" => self.sy_gmag,
            "sy_rmag" => self.sy_rmag,
            "sy_imag" => self.sy_imag,
            "sy_zmag" => self.sy_zmag,
            "sy_jmag" => self.sy_jmag,
            "sy_hmag" => self.sy_hmag,
            "sy_kmag" => self.sy_kmag,
            _ => None,
        }
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<f64>> {
        let slot = match name {
            "pl_orbper" => &mut self.pl_orbper,
            "pl_orbsmax" => &mut self.pl_orbsmax,
            "pl_eqt" => &mut self.pl_eqt,
            "pl_insol" => &mut self.pl_insol,
            "pl_imppar" => &mut self.pl_imppar,
            "pl_trandep" => &mut self.pl_trandep,
            "pl_trandur" => &mut self.pl_trandur,
            "pl_ratdor" => &mut self.pl_ratdor,
            "pl_ratror" => &mut self.pl_ratror,
            "st_teff" => &mut self.st_teff,
            "st_rad" => &mut self.st_rad,
            "st_mass" => &mut self.st_mass,
            "st_met" => &mut self.st_met,
            "st_logg" => &mut self.st_logg,
            "sy_gmag" => &mut self.sy_gmag,
            "sy_rmag" => &mut self.sy_rmag,
            "sy_imag" => &mut self.sy_imag,
            "sy_zmag" => &mut self.sy_zmag,
            "sy_jmag" => &mut self.sy_jmag,
            "sy_hmag" => &mut self.sy_hmag,
            "sy_kmag" => &mut self.sy_kmag,
            _ => return None,
        };
        Some(slot)
    }
}

/// Per-feature weights in rank order (most important first).
///
/// Serializes as a JSON object whose key order is the rank order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeWeights(pub Vec<(String, f64)>);

impl AttributeWeights {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

impl Serialize for AttributeWeights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, w) in &self.0 {
            map.serialize_entry(name, w)?;
        }
        map.end()
    }
}

/// Outcome of one prediction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Positive-class probability.
    pub probability: f64,
    /// Max class probability. Not calibrated.
    pub confidence: f64,
    pub weights: AttributeWeights,
}
