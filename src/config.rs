//! Run-wide settings, validated once before any tree is read.
//!
//! Nothing here is global: a [`RunConfig`] is built from the command line (or
//! the Python API), checked, and then passed by reference to everything that
//! needs it.

use thiserror::Error;

use crate::pattern::{Pattern, PatternError};

/// Decimal places kept in reported relative tolerances.
pub const TOLERANCE_DECIMALS: i32 = 3;

/// Default minimum subtree size when a seed taxon is in use.
pub const DEFAULT_MIN_SIZE: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tolerance must be a non-negative number, got {0}")]
    Tolerance(f64),
    #[error("minimum subtree size must be at least 1")]
    MinSize,
    #[error("minimum subtree size must be given explicitly when no seed taxon is used")]
    MinSizeRequired,
    #[error("no criteria given")]
    NoCriteria,
    #[error("invalid seed taxon pattern: {0}")]
    SeedPattern(#[from] PatternError),
}

/// Allowed share of off-target taxa in an accepted subtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// Fraction of the subtree, `0 <= f < 1`.
    Relative(f64),
    /// Number of taxa.
    Absolute(f64),
}

impl Tolerance {
    /// Values below 1 are relative, everything else absolute.
    ///
    /// ```
    /// # use tree_sorter::config::Tolerance;
    /// assert_eq!(Tolerance::from_value(0.1).unwrap(), Tolerance::Relative(0.1));
    /// assert_eq!(Tolerance::from_value(2.0).unwrap(), Tolerance::Absolute(2.0));
    /// ```
    pub fn from_value(value: f64) -> Result<Self, ConfigError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Tolerance(value));
        }
        Ok(if value < 1.0 {
            Tolerance::Relative(value)
        } else {
            Tolerance::Absolute(value)
        })
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Relative(0.0)
    }
}

/// What the criteria engine and the search need per evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub min_size: usize,
    pub tolerance: Tolerance,
}

impl SearchSettings {
    pub fn new(min_size: usize, tolerance: Tolerance) -> Result<Self, ConfigError> {
        if min_size == 0 {
            return Err(ConfigError::MinSize);
        }
        Ok(SearchSettings { min_size, tolerance })
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            min_size: DEFAULT_MIN_SIZE,
            tolerance: Tolerance::default(),
        }
    }
}

/// How seed taxa are chosen for each tree file.
#[derive(Debug, Clone)]
pub enum SeedSelection {
    /// Every tree taxon whose name matches is tried as its own seed.
    Matching(Pattern),
    /// The seed given by the input list, or derived from the file name.
    FromSource,
    /// No seed constraint.
    Unconstrained,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub settings: SearchSettings,
    pub seed: SeedSelection,
}

impl RunConfig {
    /// Validate raw option values.
    ///
    /// `seed_pattern` is `Some("")` when seeds come from the input source,
    /// `Some(pattern)` for explicit matching and `None` when running unseeded.
    /// Unseeded runs need an explicit `min_size`.
    pub fn new(
        tolerance: f64,
        min_size: Option<usize>,
        seed_pattern: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let seed = match seed_pattern.map(str::trim) {
            None => SeedSelection::Unconstrained,
            Some("") => SeedSelection::FromSource,
            Some(p) => SeedSelection::Matching(Pattern::compile(p)?),
        };
        let min_size = match (min_size, &seed) {
            (Some(m), _) => m,
            (None, SeedSelection::Unconstrained) => return Err(ConfigError::MinSizeRequired),
            (None, _) => DEFAULT_MIN_SIZE,
        };
        let settings = SearchSettings::new(min_size, Tolerance::from_value(tolerance)?)?;
        Ok(RunConfig { settings, seed })
    }

    pub fn search_settings(&self) -> &SearchSettings {
        &self.settings
    }
}

/// Round a fraction to [`TOLERANCE_DECIMALS`] places.
pub fn round_tolerance(value: f64) -> f64 {
    let scale = 10f64.powi(TOLERANCE_DECIMALS);
    (value * scale).round() / scale
}
