//! Typed parsing of generator-supplied trade plans
//!
//! Plans arrive as text. Single-leg plans carry one value per field; multi-leg
//! plans carry `,` or `;` separated lists that are zipped positionally onto
//! legs. A comma between two digits groups thousands and never splits a value.
//! A short list is tolerated by reusing its first value, and every such
//! fallback is reported as a [`ParseWarning`].

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::common::errors::{EngineError, Result};
use crate::common::types::{split_list, PriceLevels, Side, Suggestion, TradePlan};

/// Parse one price value such as `54`, `₹1,250.50` or `Rs. 82`
pub fn parse_price(field: &str, raw: &str) -> Result<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('₹')
        .trim_start_matches("Rs.")
        .trim_start_matches("Rs")
        .trim_start_matches("INR")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    match Decimal::from_str(&cleaned) {
        Ok(value) if value > Decimal::ZERO => Ok(value),
        _ => Err(EngineError::invalid_price(field, raw)),
    }
}

/// Parse the levels of a single-leg plan
pub fn parse_levels(plan: &TradePlan) -> Result<PriceLevels> {
    Ok(PriceLevels {
        entry: parse_price("entry", &plan.entry)?,
        target: parse_price("target", &plan.target)?,
        stop_loss: parse_price("stop_loss", &plan.stop_loss)?,
    })
}

/// Direction inference from explicit tokens and title keywords
#[derive(Debug, Clone)]
pub struct DirectionRules {
    sell_keywords: Vec<String>,
}

impl DirectionRules {
    pub fn new<I, S>(sell_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sell_keywords: sell_keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }

    /// Explicit `BUY`/`SELL` token in a leg descriptor
    pub fn explicit(descriptor: &str) -> Option<Side> {
        descriptor
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|token| match token.to_ascii_uppercase().as_str() {
                "BUY" | "LONG" => Some(Side::Buy),
                "SELL" | "SHORT" => Some(Side::Sell),
                _ => None,
            })
    }

    /// Side implied by the title; absence of a selling keyword means BUY
    pub fn from_title(&self, title: &str) -> Side {
        let title = title.to_lowercase();
        let words: Vec<&str> = title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let normalized = words.join(" ");

        let sells = self.sell_keywords.iter().any(|kw| {
            if kw.contains(' ') {
                normalized.contains(kw.as_str())
            } else {
                words.iter().any(|w| w == kw)
            }
        });
        if sells {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    /// Explicit token first, then the title heuristic
    pub fn infer(&self, descriptor: &str, title: &str) -> Side {
        Self::explicit(descriptor).unwrap_or_else(|| self.from_title(title))
    }

    /// Direction of a single-leg suggestion
    pub fn side_of(&self, suggestion: &Suggestion) -> Side {
        suggestion.direction.unwrap_or_else(|| {
            self.infer(&suggestion.instrument.strike, &suggestion.title)
        })
    }
}

impl Default for DirectionRules {
    fn default() -> Self {
        Self::new(crate::config::types::EngineConfig::default().sell_keywords)
    }
}

/// A list that did not line up with the number of legs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub field: &'static str,
    pub legs: usize,
    pub values: usize,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.values < self.legs {
            write!(
                f,
                "{} has {} value(s) for {} legs; reusing the first value",
                self.field, self.values, self.legs
            )
        } else {
            write!(
                f,
                "{} has {} values for {} legs; extra values ignored",
                self.field, self.values, self.legs
            )
        }
    }
}

/// Parsed plan for one leg
#[derive(Debug, Clone, PartialEq)]
pub struct LegPlan {
    pub index: usize,
    pub descriptor: String,
    pub instrument_key: String,
    pub side: Side,
    pub levels: PriceLevels,
}

/// All legs of a multi-leg plan plus the fallbacks that were applied
#[derive(Debug, Clone, PartialEq)]
pub struct LegPlanSet {
    pub legs: Vec<LegPlan>,
    pub warnings: Vec<ParseWarning>,
}

impl LegPlanSet {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Pick the value for leg `index`, falling back to the first value
fn positional<'a>(values: &[&'a str], index: usize) -> Option<&'a str> {
    values.get(index).or_else(|| values.first()).copied()
}

fn check_len(field: &'static str, values: usize, legs: usize, warnings: &mut Vec<ParseWarning>) {
    if values != legs {
        warnings.push(ParseWarning {
            field,
            legs,
            values,
        });
    }
}

/// Split a multi-leg suggestion into per-leg plans
pub fn plan_legs(raw: &Suggestion, rules: &DirectionRules) -> Result<LegPlanSet> {
    let descriptors = split_list(&raw.instrument.strike);
    let keys = split_list(&raw.instrument.instrument_key);
    let leg_count = descriptors.len().max(keys.len());

    if leg_count < 2 {
        return Err(EngineError::MalformedLegDescriptor(format!(
            "suggestion {} names {} instrument(s); a strategy needs at least two",
            raw.id, leg_count
        )));
    }
    if keys.is_empty() {
        return Err(EngineError::MalformedLegDescriptor(format!(
            "suggestion {} has no instrument keys",
            raw.id
        )));
    }

    let entries = split_list(&raw.plan.entry);
    let targets = split_list(&raw.plan.target);
    let stops = split_list(&raw.plan.stop_loss);

    let mut warnings = Vec::new();
    if !descriptors.is_empty() {
        check_len("strike", descriptors.len(), leg_count, &mut warnings);
    }
    check_len("instrument_key", keys.len(), leg_count, &mut warnings);
    check_len("entry", entries.len(), leg_count, &mut warnings);
    check_len("target", targets.len(), leg_count, &mut warnings);
    check_len("stop_loss", stops.len(), leg_count, &mut warnings);

    let title_side = rules.from_title(&raw.title);
    let mut legs = Vec::with_capacity(leg_count);
    for index in 0..leg_count {
        let descriptor = positional(&descriptors, index).unwrap_or_default();
        let instrument_key = positional(&keys, index).unwrap_or_default();
        let entry = positional(&entries, index).unwrap_or_default();
        let target = positional(&targets, index).unwrap_or_default();
        let stop = positional(&stops, index).unwrap_or_default();

        let side = DirectionRules::explicit(descriptor).unwrap_or(title_side);
        legs.push(LegPlan {
            index,
            descriptor: descriptor.to_string(),
            instrument_key: instrument_key.to_string(),
            side,
            levels: PriceLevels {
                entry: parse_price("entry", entry)?,
                target: parse_price("target", target)?,
                stop_loss: parse_price("stop_loss", stop)?,
            },
        });
    }

    Ok(LegPlanSet { legs, warnings })
}
