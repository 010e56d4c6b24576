//! serde adapters for `f64` values that may be non-finite.
//!
//! JSON has no literal for infinity or NaN and `serde_json` silently writes them
//! as `null`. Model bounds are routinely `(-inf, inf)`, so non-finite values are
//! written as the strings `"Infinity"`, `"-Infinity"` and `"NaN"` and read back
//! from either form.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
}

fn to_repr(x: f64) -> Repr {
    if x.is_finite() {
        Repr::Number(x)
    } else if x.is_nan() {
        Repr::Text("NaN".into())
    } else if x > 0.0 {
        Repr::Text("Infinity".into())
    } else {
        Repr::Text("-Infinity".into())
    }
}

fn from_repr(repr: Repr) -> Result<f64, String> {
    match repr {
        Repr::Number(x) => Ok(x),
        Repr::Text(s) => match s.as_str() {
            "Infinity" | "inf" => Ok(f64::INFINITY),
            "-Infinity" | "-inf" => Ok(f64::NEG_INFINITY),
            "NaN" | "nan" => Ok(f64::NAN),
            other => Err(format!("'{}' is not a number", other)),
        },
    }
}

/// Converts a single float into its JSON form.
pub fn to_json(x: f64) -> serde_json::Value {
    match to_repr(x) {
        Repr::Number(n) => serde_json::json!(n),
        Repr::Text(s) => serde_json::Value::String(s),
    }
}

/// `#[serde(with = "float::real")]` for a single `f64`.
pub mod real {
    use super::*;

    pub fn serialize<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        to_repr(*x).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        from_repr(Repr::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "float::reals")]` for a `Vec<f64>`.
pub mod reals {
    use super::*;

    pub fn serialize<S: Serializer>(xs: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(xs.iter().map(|x| to_repr(*x)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(|r| from_repr(r).map_err(D::Error::custom))
            .collect()
    }
}
