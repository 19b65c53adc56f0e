//! Named composition rules and their evaluation against a taxon set.
//!
//! # Syntax
//! A criterion is written `NAME=DEFINITION`, where the definition is a comma
//! separated list of groups, each optionally preceded by a quantifier:
//!
//! ```text
//! some_two=0.125+(Toxo*,Bobo*),4+Karo*,Mimi-123-2
//!          ^^^^^^ ^^^^^^^^^^^^^ ^^ ^^^^^ ^^^^^^^^^^
//!          rel.   group of two  abs. one  unquantified
//! ```
//!
//! - `0.125+` : at least 12.5% of the subtree must match the group (`>=`).
//! - `4+`     : more than 4 taxa must match the group (strictly `>`).
//! - no quantifier: the group only marks taxa as on-target.
//!
//! # Evaluation
//! Taxa matched by any group are on-target. A subtree is accepted when every
//! group meets its threshold and the off-target taxa fit the tolerance.

use std::str::FromStr;
use thiserror::Error;

use crate::config::{round_tolerance, SearchSettings, Tolerance};
use crate::pattern::{Pattern, PatternError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("criterion '{0}' must look like NAME=DEFINITION")]
    MissingName(String),
    #[error("criterion '{0}' has an empty definition")]
    EmptyDefinition(String),
    #[error("criterion name '{0}' is used more than once")]
    Duplicate(String),
    #[error("criterion '{criterion}': quantifier '{value}' must be a fraction below 1 or a whole number")]
    Threshold { criterion: String, value: String },
    #[error("criterion '{criterion}': quantifier '{value}' is not followed by a group")]
    DanglingQuantifier { criterion: String, value: String },
    #[error("criterion '{0}': group opened with '(' is never closed")]
    UnclosedGroup(String),
    #[error("criterion '{0}': groups cannot be nested or follow each other without ','")]
    MisplacedBracket(String),
    #[error("criterion '{criterion}': {source}")]
    Pattern {
        criterion: String,
        #[source]
        source: PatternError,
    },
}

/// Minimum number of matching taxa for a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// Fraction of the subtree, inclusive.
    Relative(f64),
    /// Count of taxa, exclusive.
    Absolute(u32),
}

impl Threshold {
    /// The absolute test is strict (`>`) while the relative one is not
    /// (`>=`). This mirrors the established behaviour of the tool and is kept
    /// until product owners decide otherwise.
    #[inline]
    pub fn passes(&self, matched: usize, total: usize) -> bool {
        match *self {
            Threshold::Relative(t) => matched as f64 / total as f64 >= t,
            Threshold::Absolute(k) => matched > k as usize,
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Relative(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct QuantifiedGroup {
    pub threshold: Threshold,
    pub patterns: Vec<Pattern>,
}

impl QuantifiedGroup {
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// Outcome of an accepted evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Off-target share, rounded to three decimals.
    pub relative_used: f64,
    pub absolute_used: usize,
}

#[derive(Debug, Clone)]
pub struct Criterion {
    pub name: String,
    pub groups: Vec<QuantifiedGroup>,
}

impl Criterion {
    /// Compile a definition (the part after `=`).
    pub fn new(name: &str, definition: &str) -> Result<Self, CriteriaError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CriteriaError::MissingName(format!("{name}={definition}")));
        }
        let groups = parse_definition(name, definition)?;
        Ok(Criterion {
            name: name.to_string(),
            groups,
        })
    }

    /// Score a candidate subtree.
    ///
    /// Returns `None` when the subtree is rejected: too small, missing the
    /// seed, a group below its threshold, or too many off-target taxa.
    pub fn evaluate(
        &self,
        taxa: &[&str],
        settings: &SearchSettings,
        seed: Option<&str>,
    ) -> Option<Evaluation> {
        let total = taxa.len();
        if total == 0 || total < settings.min_size {
            return None;
        }
        if let Some(seed) = seed {
            if !taxa.contains(&seed) {
                return None;
            }
        }

        let mut on_target = vec![false; total];
        for group in &self.groups {
            let mut matched = 0;
            for (i, name) in taxa.iter().enumerate() {
                if group.matches(name) {
                    matched += 1;
                    on_target[i] = true;
                }
            }
            if !group.threshold.passes(matched, total) {
                return None;
            }
        }

        let off = on_target.iter().filter(|hit| !**hit).count();
        let share = off as f64 / total as f64;
        let within = match settings.tolerance {
            Tolerance::Relative(limit) => share <= limit,
            Tolerance::Absolute(limit) => off as f64 <= limit,
        };
        // round(share * total) is exactly `off`; only the share is rounded.
        within.then_some(Evaluation {
            relative_used: round_tolerance(share),
            absolute_used: off,
        })
    }
}

impl FromStr for Criterion {
    type Err = CriteriaError;

    /// Parse `NAME=DEFINITION`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, definition) = s
            .split_once('=')
            .ok_or_else(|| CriteriaError::MissingName(s.to_string()))?;
        if name.trim().is_empty() {
            return Err(CriteriaError::MissingName(s.to_string()));
        }
        Criterion::new(name, definition)
    }
}

/// Compile every `NAME=DEFINITION` string, keeping their order.
pub fn compile_criteria<I, S>(definitions: I) -> Result<Vec<Criterion>, CriteriaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut criteria: Vec<Criterion> = Vec::new();
    for def in definitions {
        let criterion: Criterion = def.as_ref().parse()?;
        if criteria.iter().any(|c| c.name == criterion.name) {
            return Err(CriteriaError::Duplicate(criterion.name));
        }
        criteria.push(criterion);
    }
    Ok(criteria)
}

fn parse_definition(criterion: &str, definition: &str) -> Result<Vec<QuantifiedGroup>, CriteriaError> {
    let mut groups = Vec::new();
    let mut pending: Option<(Threshold, String)> = None;
    let mut rest = definition.trim();

    let compile = |token: &str| {
        Pattern::compile(token).map_err(|source| CriteriaError::Pattern {
            criterion: criterion.to_string(),
            source,
        })
    };

    while !rest.is_empty() {
        if let Some((threshold, value, after)) = split_quantifier(criterion, rest)? {
            if let Some((_, previous)) = pending {
                return Err(CriteriaError::DanglingQuantifier {
                    criterion: criterion.to_string(),
                    value: previous,
                });
            }
            pending = Some((threshold, value));
            rest = after.trim_start_matches(',').trim_start();
            continue;
        }

        let threshold = pending.take().map(|(t, _)| t).unwrap_or_default();
        let (patterns, after) = if let Some(body) = rest.strip_prefix('(') {
            let close = body
                .find(')')
                .ok_or_else(|| CriteriaError::UnclosedGroup(criterion.to_string()))?;
            let inner = &body[..close];
            if inner.contains('(') {
                return Err(CriteriaError::MisplacedBracket(criterion.to_string()));
            }
            let patterns = inner.split(',').map(compile).collect::<Result<Vec<_>, _>>()?;
            let after = body[close + 1..].trim_start();
            if !(after.is_empty() || after.starts_with(',')) {
                return Err(CriteriaError::MisplacedBracket(criterion.to_string()));
            }
            (patterns, after)
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            (vec![compile(&rest[..end])?], &rest[end..])
        };

        groups.push(QuantifiedGroup { threshold, patterns });
        rest = after.strip_prefix(',').unwrap_or(after).trim_start();
    }

    if let Some((_, value)) = pending {
        return Err(CriteriaError::DanglingQuantifier {
            criterion: criterion.to_string(),
            value,
        });
    }
    if groups.is_empty() {
        return Err(CriteriaError::EmptyDefinition(criterion.to_string()));
    }
    Ok(groups)
}

/// Split a leading `<number>+` off `rest`.
///
/// Text before the first `+` that does not parse as a number is not a
/// quantifier (taxon names may start with digits).
fn split_quantifier<'a>(
    criterion: &str,
    rest: &'a str,
) -> Result<Option<(Threshold, String, &'a str)>, CriteriaError> {
    if !rest.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return Ok(None);
    }
    let Some((number, after)) = rest.split_once('+') else {
        return Ok(None);
    };
    let Ok(value) = number.trim().parse::<f64>() else {
        return Ok(None);
    };

    let threshold = if (0.0..1.0).contains(&value) {
        Threshold::Relative(value)
    } else if value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Threshold::Absolute(value as u32)
    } else {
        return Err(CriteriaError::Threshold {
            criterion: criterion.to_string(),
            value: number.to_string(),
        });
    };
    Ok(Some((threshold, number.to_string(), after)))
}
