//! Bet9ja normalizer. Bet9ja ships odds as a flat `key -> odds` map; keys
//! encode the market, an optional parameter, and the outcome in one string
//! (spec §4.B Bet9ja key decomposition).

use super::{finish_mapping, BatchResult, MappedMarket};
use crate::error::MappingError;
use crate::model::OutcomeOdds;
use crate::registry::MarketRegistry;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawOdds {
    pub value: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// `key -> odds` as delivered by the Bet9ja feed, e.g.
/// `"S_OU@2.5_O" -> 1.9`.
pub type RawOddsMap = HashMap<String, RawOdds>;

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^S_([A-Z0-9_\-]+?)(?:@([^_]+))?_(.+)$").unwrap())
}

struct DecomposedKey {
    market_prefix: String,
    param: Option<String>,
    outcome_suffix: String,
}

fn decompose(key: &str) -> Result<DecomposedKey, MappingError> {
    let captures = key_pattern()
        .captures(key)
        .ok_or_else(|| MappingError::InvalidKeyFormat(key.to_string()))?;
    Ok(DecomposedKey {
        market_prefix: captures.get(1).unwrap().as_str().to_string(),
        param: captures.get(2).map(|m| m.as_str().to_string()),
        outcome_suffix: captures.get(3).unwrap().as_str().to_string(),
    })
}

/// Normalizes a whole odds map in one call, grouping by `(market_prefix,
/// param)` before mapping (spec §4.B Grouping rule) and returning the
/// successes alongside a structured error per failed group/key (spec §4.B
/// Partial batch success).
pub fn normalize_batch(registry: &MarketRegistry, odds_map: &RawOddsMap) -> BatchResult {
    let mut result = BatchResult::default();

    // Group by (market_prefix, param); within a group, sort suffixes for a
    // deterministic outcome order (position fallback needs a stable index).
    let mut groups: HashMap<(String, Option<String>), Vec<(String, RawOdds)>> = HashMap::new();
    for (key, odds) in odds_map {
        match decompose(key) {
            Ok(decomposed) => {
                groups
                    .entry((decomposed.market_prefix, decomposed.param))
                    .or_default()
                    .push((decomposed.outcome_suffix, *odds));
            }
            Err(e) => result.push_err(e),
        }
    }

    let mut group_keys: Vec<&(String, Option<String>)> = groups.keys().collect();
    group_keys.sort();

    for group_key in group_keys {
        let entries = &groups[group_key];
        match normalize_group(registry, group_key, entries) {
            Ok(market) => result.push_ok(market),
            Err(e) => result.push_err(e),
        }
    }

    result
}

fn normalize_group(
    registry: &MarketRegistry,
    (prefix, param): &(String, Option<String>),
    entries: &[(String, RawOdds)],
) -> Result<MappedMarket, MappingError> {
    let definition = registry
        .find_by_bet9ja_key(prefix)
        .ok_or_else(|| MappingError::UnknownMarket(prefix.clone()))?;

    let line = match param {
        Some(p) => Some(p.parse::<f64>().map_err(|_| MappingError::InvalidSpecifier(prefix.clone()))?),
        None => None,
    };

    let mut sorted_entries = entries.to_vec();
    sorted_entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut outcomes = Vec::with_capacity(sorted_entries.len());
    for (position, (suffix, odds)) in sorted_entries.iter().enumerate() {
        let matched = definition
            .match_outcome_by_name(crate::model::Platform::Bet9ja, suffix)
            .or_else(|| definition.match_outcome_by_position(position as u32));
        if matched.is_none() {
            continue;
        }
        outcomes.push(OutcomeOdds {
            name: suffix.clone(),
            odds: odds.value,
            active: odds.active,
        });
    }

    finish_mapping(definition, line, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MarketRegistry {
        MarketRegistry::load()
    }

    fn odds(v: f64) -> RawOdds {
        RawOdds { value: v, active: true }
    }

    #[test]
    fn grouped_key_decomposition_e5() {
        // E5: two O/U lines, two outcomes each.
        let reg = registry();
        let mut map = RawOddsMap::new();
        map.insert("S_OU@2.5_O".to_string(), odds(1.9));
        map.insert("S_OU@2.5_U".to_string(), odds(1.9));
        map.insert("S_OU@3.5_O".to_string(), odds(2.6));
        map.insert("S_OU@3.5_U".to_string(), odds(1.45));

        let result = normalize_batch(&reg, &map);
        assert!(result.errors.is_empty());
        assert_eq!(result.markets.len(), 2);

        let mut lines: Vec<f64> = result.markets.iter().map(|m| m.line.unwrap()).collect();
        lines.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(lines, vec![2.5, 3.5]);
        for market in &result.markets {
            assert_eq!(market.outcomes.len(), 2);
        }
    }

    #[test]
    fn lookup_uses_prefix_not_full_key() {
        let reg = registry();
        let mut map = RawOddsMap::new();
        map.insert("S_1X2_1".to_string(), odds(1.85));
        map.insert("S_1X2_X".to_string(), odds(3.40));
        map.insert("S_1X2_2".to_string(), odds(4.20));

        let result = normalize_batch(&reg, &map);
        assert!(result.errors.is_empty());
        assert_eq!(result.markets.len(), 1);
        assert_eq!(result.markets[0].reference_market_id, "1096783");
    }

    #[test]
    fn malformed_key_is_invalid_key_format() {
        let reg = registry();
        let mut map = RawOddsMap::new();
        map.insert("not-a-valid-key".to_string(), odds(1.5));
        let result = normalize_batch(&reg, &map);
        assert_eq!(result.errors, vec![MappingError::InvalidKeyFormat("not-a-valid-key".to_string())]);
    }

    #[test]
    fn unknown_prefix_is_unknown_market() {
        let reg = registry();
        let mut map = RawOddsMap::new();
        map.insert("S_ZZZZ_1".to_string(), odds(1.5));
        let result = normalize_batch(&reg, &map);
        assert_eq!(result.errors, vec![MappingError::UnknownMarket("ZZZZ".to_string())]);
    }
}
