//! Sportybet normalizer. Sportybet encodes market parameters as
//! `key=value|key=value` specifier strings (spec §4.B Specifier parsing).

use super::{finish_mapping, BatchResult, MappedMarket};
use crate::error::MappingError;
use crate::model::{MarketClass, OutcomeOdds, Platform};
use crate::registry::MarketRegistry;
use serde::Deserialize;
use std::collections::HashMap;

/// Specifier strings longer than this are rejected outright to bound
/// parsing cost (spec §4.B Guard).
const MAX_SPECIFIER_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutcome {
    pub description: String,
    pub odds: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMarket {
    pub market_id: String,
    pub specifiers: Option<String>,
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub markets: Vec<RawMarket>,
}

/// Parses a `key=value|key=value` specifier string into a map. Rejects
/// strings over [`MAX_SPECIFIER_LEN`] chars before doing any further work.
fn parse_specifiers(market_id: &str, raw: &str) -> Result<HashMap<String, String>, MappingError> {
    if raw.len() > MAX_SPECIFIER_LEN {
        return Err(MappingError::InvalidSpecifier(market_id.to_string()));
    }
    let mut map = HashMap::new();
    for pair in raw.split('|') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next();
        match value {
            Some(v) => {
                map.insert(key.to_string(), v.to_string());
            }
            None => return Err(MappingError::InvalidSpecifier(market_id.to_string())),
        }
    }
    Ok(map)
}

/// `hcp` may be a single value or a pair `"1,2"` that quarter-line betting
/// splits into two half-lines (spec §4.B Specifier parsing).
fn parse_hcp(market_id: &str, value: &str) -> Result<Vec<f64>, MappingError> {
    let parts: Vec<&str> = value.split(',').collect();
    let mut lines = Vec::with_capacity(parts.len());
    for part in parts {
        let parsed: f64 = part
            .trim()
            .parse()
            .map_err(|_| MappingError::InvalidSpecifier(market_id.to_string()))?;
        lines.push(parsed);
    }
    if lines.is_empty() {
        return Err(MappingError::InvalidSpecifier(market_id.to_string()));
    }
    Ok(lines)
}

fn parse_total(market_id: &str, value: &str) -> Result<f64, MappingError> {
    value.trim().parse().map_err(|_| MappingError::InvalidSpecifier(market_id.to_string()))
}

pub fn normalize(registry: &MarketRegistry, raw_event: &RawEvent) -> Vec<Result<MappedMarket, MappingError>> {
    let mut out = Vec::new();
    for market in &raw_event.markets {
        match normalize_market(registry, market) {
            Ok(mapped) => out.extend(mapped.into_iter().map(Ok)),
            Err(e) => out.push(Err(e)),
        }
    }
    out
}

pub fn normalize_batch(registry: &MarketRegistry, raw_event: &RawEvent) -> BatchResult {
    let mut result = BatchResult::default();
    for outcome in normalize(registry, raw_event) {
        match outcome {
            Ok(m) => result.push_ok(m),
            Err(e) => result.push_err(e),
        }
    }
    result
}

fn normalize_market(registry: &MarketRegistry, raw: &RawMarket) -> Result<Vec<MappedMarket>, MappingError> {
    let definition = registry
        .find_by_sportybet_id(&raw.market_id)
        .ok_or_else(|| MappingError::UnknownMarket(raw.market_id.clone()))?;

    let specifiers = match &raw.specifiers {
        Some(s) => parse_specifiers(&raw.market_id, s)?,
        None => HashMap::new(),
    };

    let lines: Vec<Option<f64>> = if definition.has_flag(MarketClass::OverUnder) {
        let total = specifiers
            .get("total")
            .ok_or_else(|| MappingError::UnknownParamMarket(raw.market_id.clone()))?;
        vec![Some(parse_total(&raw.market_id, total)?)]
    } else if definition.has_flag(MarketClass::Handicap) {
        let hcp = specifiers
            .get("hcp")
            .ok_or_else(|| MappingError::UnknownParamMarket(raw.market_id.clone()))?;
        parse_hcp(&raw.market_id, hcp)?.into_iter().map(Some).collect()
    } else if definition.has_flag(MarketClass::Variant) {
        if let Some(variant) = specifiers.get("variant") {
            if variant.is_empty() {
                return Err(MappingError::UnknownParamMarket(raw.market_id.clone()));
            }
        }
        vec![None]
    } else {
        vec![None]
    };

    let mut outcomes = Vec::with_capacity(raw.outcomes.len());
    for (position, raw_outcome) in raw.outcomes.iter().enumerate() {
        let matched = definition
            .match_outcome_by_name(Platform::Sportybet, &raw_outcome.description)
            .or_else(|| definition.match_outcome_by_position(position as u32));
        if matched.is_none() {
            continue;
        }
        outcomes.push(OutcomeOdds {
            name: raw_outcome.description.clone(),
            odds: raw_outcome.odds,
            active: raw_outcome.active,
        });
    }

    lines
        .into_iter()
        .map(|line| finish_mapping(definition, line, outcomes.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MarketRegistry {
        MarketRegistry::load()
    }

    fn outcome(desc: &str, odds: f64) -> RawOutcome {
        RawOutcome { description: desc.to_string(), odds, active: true }
    }

    #[test]
    fn total_specifier_becomes_line() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "18".to_string(),
                specifiers: Some("total=2.5".to_string()),
                outcomes: vec![outcome("Over", 1.9), outcome("Under", 1.9)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert!(result.errors.is_empty());
        assert_eq!(result.markets[0].line, Some(2.5));
    }

    #[test]
    fn hcp_pair_splits_into_two_half_lines() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "16".to_string(),
                specifiers: Some("hcp=1,2".to_string()),
                outcomes: vec![outcome("Home", 1.95), outcome("Away", 1.85)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert!(result.errors.is_empty());
        assert_eq!(result.markets.len(), 2);
        assert_eq!(result.markets[0].line, Some(1.0));
        assert_eq!(result.markets[1].line, Some(2.0));
    }

    #[test]
    fn over_under_missing_total_is_unknown_param_market() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "18".to_string(),
                specifiers: Some("variant=x".to_string()),
                outcomes: vec![outcome("Over", 1.9), outcome("Under", 1.9)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert_eq!(result.errors, vec![MappingError::UnknownParamMarket("18".to_string())]);
    }

    #[test]
    fn specifier_longer_than_1000_chars_is_rejected() {
        let reg = registry();
        let long = format!("total={}", "9".repeat(1001));
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "18".to_string(),
                specifiers: Some(long),
                outcomes: vec![outcome("Over", 1.9), outcome("Under", 1.9)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert_eq!(result.errors, vec![MappingError::InvalidSpecifier("18".to_string())]);
    }

    #[test]
    fn outcome_fallback_to_position_when_description_unrecognized() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "1".to_string(),
                specifiers: None,
                outcomes: vec![outcome("Local Win", 1.85), outcome("Tie", 3.40), outcome("Visitor Win", 4.20)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert!(result.errors.is_empty());
        assert_eq!(result.markets[0].outcomes.len(), 3);
    }
}
