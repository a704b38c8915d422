//! Reference-platform normalizer. The reference platform returns markets
//! on a single call already keyed by its own market id, so normalization
//! here is a straight registry lookup plus outcome match (spec §4.B,
//! §4.C Discovery vs detail).

use super::{finish_mapping, BatchResult, MappedMarket};
use crate::error::MappingError;
use crate::model::{MarketClass, OutcomeOdds, Platform};
use crate::registry::MarketRegistry;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutcome {
    pub name: String,
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
    pub line: Option<f64>,
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub markets: Vec<RawMarket>,
}

/// Normalizes one reference-platform event into a list of mapped markets.
pub fn normalize(registry: &MarketRegistry, raw_event: &RawEvent) -> Vec<Result<MappedMarket, MappingError>> {
    raw_event.markets.iter().map(|m| normalize_market(registry, m)).collect()
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

fn normalize_market(registry: &MarketRegistry, raw: &RawMarket) -> Result<MappedMarket, MappingError> {
    let definition = registry
        .find_by_reference_id(&raw.market_id)
        .ok_or_else(|| MappingError::UnknownMarket(raw.market_id.clone()))?;

    if definition.has_flag(MarketClass::OverUnder) || definition.has_flag(MarketClass::Handicap) {
        if raw.line.is_none() {
            return Err(MappingError::InvalidSpecifier(raw.market_id.clone()));
        }
    }

    let mut outcomes = Vec::with_capacity(raw.outcomes.len());
    for (position, raw_outcome) in raw.outcomes.iter().enumerate() {
        let matched = definition
            .match_outcome_by_name(Platform::Reference, &raw_outcome.name)
            .or_else(|| definition.match_outcome_by_position(position as u32));
        if matched.is_none() {
            continue;
        }
        outcomes.push(OutcomeOdds {
            name: raw_outcome.name.clone(),
            odds: raw_outcome.odds,
            active: raw_outcome.active,
        });
    }

    finish_mapping(definition, raw.line, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MarketRegistry {
        MarketRegistry::load()
    }

    fn outcome(name: &str, odds: f64) -> RawOutcome {
        RawOutcome { name: name.to_string(), odds, active: true }
    }

    #[test]
    fn normalizes_1x2_by_name() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "1096783".to_string(),
                line: None,
                outcomes: vec![outcome("Home", 1.85), outcome("Draw", 3.40), outcome("Away", 4.20)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert!(result.errors.is_empty());
        assert_eq!(result.markets.len(), 1);
        assert!((result.markets[0].margin - 5.1735).abs() < 1e-3);
    }

    #[test]
    fn unknown_market_id_is_structured_error() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket { market_id: "nope".to_string(), line: None, outcomes: vec![] }],
        };
        let result = normalize_batch(&reg, &raw);
        assert_eq!(result.markets.len(), 0);
        assert_eq!(result.errors, vec![MappingError::UnknownMarket("nope".to_string())]);
    }

    #[test]
    fn over_under_without_line_is_invalid_specifier() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "1096785".to_string(),
                line: None,
                outcomes: vec![outcome("Over", 1.9), outcome("Under", 1.9)],
            }],
        };
        let result = normalize_batch(&reg, &raw);
        assert_eq!(result.errors, vec![MappingError::InvalidSpecifier("1096785".to_string())]);
    }

    #[test]
    fn idempotent_normalization() {
        let reg = registry();
        let raw = RawEvent {
            markets: vec![RawMarket {
                market_id: "1096783".to_string(),
                line: None,
                outcomes: vec![outcome("Home", 1.85), outcome("Draw", 3.40), outcome("Away", 4.20)],
            }],
        };
        let first = normalize_batch(&reg, &raw).markets;
        let second = normalize_batch(&reg, &raw).markets;
        assert_eq!(first, second);
    }
}
