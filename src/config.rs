//! Problem and solve options.

use crate::error::{CanonError, Result};

/// Options for encoding, reformulation and solving.
///
/// Validated once on construction through [`Options::from_pairs`]; the
/// struct is plain data afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Print solver output.
    pub verbose: bool,
    /// Maximum solver iterations.
    pub max_iter: u32,
    /// Time limit in seconds.
    pub time_limit: f64,
    /// Absolute duality gap tolerance.
    pub tol_gap_abs: f64,
    /// Relative duality gap tolerance.
    pub tol_gap_rel: f64,
    /// Largest negative eigenvalue still treated as zero when factoring
    /// quadratic forms.
    pub psd_tolerance: f64,
    /// Turn single-variable linear rows into bound tightenings.
    pub bound_tightening: bool,
    /// Retract variables left unreferenced by a constraint removal.
    pub prune_dangling: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            verbose: false,
            max_iter: 100,
            time_limit: f64::INFINITY,
            tol_gap_abs: 1e-8,
            tol_gap_rel: 1e-8,
            psd_tolerance: 1e-9,
            bound_tightening: false,
            prune_dangling: true,
        }
    }
}

/// The subset of options that changes how the standard form is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingPolicy {
    pub bound_tightening: bool,
}

impl Options {
    /// Build options from `(key, value)` string pairs over the defaults.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut options = Options::default();
        for (key, value) in pairs {
            options.set(key, value)?;
        }
        Ok(options)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "verbose" => self.verbose = parse_bool(key, value)?,
            "max_iter" => {
                self.max_iter = value
                    .parse()
                    .map_err(|_| invalid(key, value, "a non-negative integer"))?
            }
            "time_limit" => self.time_limit = parse_positive(key, value)?,
            "tol_gap_abs" => self.tol_gap_abs = parse_positive(key, value)?,
            "tol_gap_rel" => self.tol_gap_rel = parse_positive(key, value)?,
            "psd_tolerance" => {
                let v: f64 = value
                    .parse()
                    .map_err(|_| invalid(key, value, "a number"))?;
                if !(v >= 0.0) {
                    return Err(invalid(key, value, "a non-negative number"));
                }
                self.psd_tolerance = v;
            }
            "bound_tightening" => self.bound_tightening = parse_bool(key, value)?,
            "prune_dangling" => self.prune_dangling = parse_bool(key, value)?,
            _ => return Err(CanonError::InvalidOption(format!("unknown key '{}'", key))),
        }
        Ok(())
    }

    pub fn encoding_policy(&self) -> EncodingPolicy {
        EncodingPolicy {
            bound_tightening: self.bound_tightening,
        }
    }
}

fn invalid(key: &str, value: &str, wanted: &str) -> CanonError {
    CanonError::InvalidOption(format!("{} = '{}', expected {}", key, value, wanted))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, value, "a boolean")),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<f64> {
    let v: f64 = value
        .parse()
        .map_err(|_| invalid(key, value, "a number"))?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(invalid(key, value, "a positive number"))
    }
}
