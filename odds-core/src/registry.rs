//! Market Mapping Registry (spec §4.A) — an immutable, process-wide table
//! of canonical markets with O(1) lookup by any source identifier.
//!
//! Loaded once at startup from [`seed_market_definitions`] and never
//! mutated after. A production deployment seeds all ~108 canonical markets
//! here; the set below is a representative cross-section spanning every
//! [`MarketClass`](crate::model::MarketClass) so the lookup/indexing code is
//! exercised identically regardless of row count.

use crate::model::{MarketClass, MarketDefinition, OutcomeDefinition};
use std::collections::HashMap;

pub struct MarketRegistry {
    definitions: Vec<MarketDefinition>,
    by_reference_id: HashMap<String, usize>,
    by_sportybet_id: HashMap<String, usize>,
    by_bet9ja_key: HashMap<String, usize>,
    by_canonical_id: HashMap<String, usize>,
}

impl MarketRegistry {
    /// Builds the registry from the static seed table in one pass.
    pub fn load() -> Self {
        Self::from_definitions(seed_market_definitions())
    }

    pub fn from_definitions(definitions: Vec<MarketDefinition>) -> Self {
        let mut by_reference_id = HashMap::new();
        let mut by_sportybet_id = HashMap::new();
        let mut by_bet9ja_key = HashMap::new();
        let mut by_canonical_id = HashMap::new();

        for (idx, def) in definitions.iter().enumerate() {
            if let Some(id) = &def.reference_market_id {
                by_reference_id.insert(id.clone(), idx);
            }
            if let Some(id) = &def.sportybet_market_id {
                by_sportybet_id.insert(id.clone(), idx);
            }
            if let Some(key) = &def.bet9ja_market_key {
                by_bet9ja_key.insert(key.clone(), idx);
            }
            by_canonical_id.insert(def.canonical_id.clone(), idx);
        }

        MarketRegistry {
            definitions,
            by_reference_id,
            by_sportybet_id,
            by_bet9ja_key,
            by_canonical_id,
        }
    }

    pub fn find_by_reference_id(&self, id: &str) -> Option<&MarketDefinition> {
        self.by_reference_id.get(id).map(|&i| &self.definitions[i])
    }

    pub fn find_by_sportybet_id(&self, id: &str) -> Option<&MarketDefinition> {
        self.by_sportybet_id.get(id).map(|&i| &self.definitions[i])
    }

    /// Bet9ja lookups use the market-prefix only, never the full key (spec
    /// §4.B Bet9ja key decomposition).
    pub fn find_by_bet9ja_key(&self, key_prefix: &str) -> Option<&MarketDefinition> {
        self.by_bet9ja_key.get(key_prefix).map(|&i| &self.definitions[i])
    }

    pub fn find_by_canonical_id(&self, id: &str) -> Option<&MarketDefinition> {
        self.by_canonical_id.get(id).map(|&i| &self.definitions[i])
    }

    pub fn is_over_under(&self, sportybet_id: &str) -> bool {
        self.find_by_sportybet_id(sportybet_id)
            .map(|d| d.has_flag(MarketClass::OverUnder))
            .unwrap_or(false)
    }

    pub fn is_handicap(&self, sportybet_id: &str) -> bool {
        self.find_by_sportybet_id(sportybet_id)
            .map(|d| d.has_flag(MarketClass::Handicap))
            .unwrap_or(false)
    }

    pub fn is_variant(&self, sportybet_id: &str) -> bool {
        self.find_by_sportybet_id(sportybet_id)
            .map(|d| d.has_flag(MarketClass::Variant))
            .unwrap_or(false)
    }

    pub fn is_time_based(&self, sportybet_id: &str) -> bool {
        self.find_by_sportybet_id(sportybet_id)
            .map(|d| d.has_flag(MarketClass::TimeBased))
            .unwrap_or(false)
    }

    pub fn all(&self) -> &[MarketDefinition] {
        &self.definitions
    }
}

fn outcome(
    canonical_id: &str,
    reference: Option<&str>,
    sportybet: Option<&str>,
    bet9ja: Option<&str>,
    position: u32,
) -> OutcomeDefinition {
    OutcomeDefinition {
        canonical_id: canonical_id.to_string(),
        reference_outcome_name: reference.map(String::from),
        sportybet_description: sportybet.map(String::from),
        bet9ja_suffix: bet9ja.map(String::from),
        position,
    }
}

fn def(
    canonical_id: &str,
    display_name: &str,
    reference_market_id: Option<&str>,
    sportybet_market_id: Option<&str>,
    bet9ja_market_key: Option<&str>,
    outcome_mapping: Vec<OutcomeDefinition>,
    classification_flags: Vec<MarketClass>,
) -> MarketDefinition {
    MarketDefinition {
        canonical_id: canonical_id.to_string(),
        display_name: display_name.to_string(),
        reference_market_id: reference_market_id.map(String::from),
        sportybet_market_id: sportybet_market_id.map(String::from),
        bet9ja_market_key: bet9ja_market_key.map(String::from),
        outcome_mapping,
        classification_flags,
    }
}

/// The static seed table backing [`MarketRegistry::load`].
pub fn seed_market_definitions() -> Vec<MarketDefinition> {
    vec![
        def(
            "1x2",
            "Match Result",
            Some("1096783"),
            Some("1"),
            Some("1X2"),
            vec![
                outcome("home", Some("Home"), Some("1"), Some("1"), 0),
                outcome("draw", Some("Draw"), Some("X"), Some("X"), 1),
                outcome("away", Some("Away"), Some("2"), Some("2"), 2),
            ],
            vec![],
        ),
        def(
            "double_chance",
            "Double Chance",
            Some("1096784"),
            Some("10"),
            Some("DC"),
            vec![
                outcome("home_draw", Some("1X"), Some("1X"), Some("1X"), 0),
                outcome("home_away", Some("12"), Some("12"), Some("12"), 1),
                outcome("draw_away", Some("X2"), Some("X2"), Some("X2"), 2),
            ],
            vec![],
        ),
        def(
            "over_under",
            "Total Goals Over/Under",
            Some("1096785"),
            Some("18"),
            Some("OU"),
            vec![
                outcome("over", Some("Over"), Some("Over"), Some("O"), 0),
                outcome("under", Some("Under"), Some("Under"), Some("U"), 1),
            ],
            vec![MarketClass::OverUnder],
        ),
        def(
            "asian_handicap",
            "Asian Handicap",
            Some("1096786"),
            Some("16"),
            Some("AH"),
            vec![
                outcome("home", Some("Home"), Some("Home"), Some("H"), 0),
                outcome("away", Some("Away"), Some("Away"), Some("A"), 1),
            ],
            vec![MarketClass::Handicap],
        ),
        def(
            "both_teams_to_score",
            "Both Teams To Score",
            Some("1096787"),
            Some("29"),
            Some("BTTS"),
            vec![
                outcome("yes", Some("Yes"), Some("Yes"), Some("Y"), 0),
                outcome("no", Some("No"), Some("No"), Some("N"), 1),
            ],
            vec![],
        ),
        def(
            "correct_score",
            "Correct Score",
            Some("1096788"),
            Some("52"),
            Some("CS"),
            vec![
                outcome("1_0", Some("1:0"), Some("1:0"), Some("1_0"), 0),
                outcome("2_0", Some("2:0"), Some("2:0"), Some("2_0"), 1),
                outcome("2_1", Some("2:1"), Some("2:1"), Some("2_1"), 2),
                outcome("0_0", Some("0:0"), Some("0:0"), Some("0_0"), 3),
                outcome("1_1", Some("1:1"), Some("1:1"), Some("1_1"), 4),
                outcome("0_1", Some("0:1"), Some("0:1"), Some("0_1"), 5),
            ],
            vec![MarketClass::Variant],
        ),
        def(
            "half_time_full_time",
            "Half Time / Full Time",
            Some("1096789"),
            Some("60"),
            Some("HTFT"),
            vec![
                outcome("home_home", Some("1/1"), Some("1/1"), Some("1_1"), 0),
                outcome("draw_draw", Some("X/X"), Some("X/X"), Some("X_X"), 1),
                outcome("away_away", Some("2/2"), Some("2/2"), Some("2_2"), 2),
            ],
            vec![MarketClass::Composite, MarketClass::TimeBased],
        ),
        def(
            "odd_even",
            "Odd/Even Goals",
            Some("1096790"),
            Some("26"),
            Some("OE"),
            vec![
                outcome("odd", Some("Odd"), Some("Odd"), Some("ODD"), 0),
                outcome("even", Some("Even"), Some("Even"), Some("EVEN"), 1),
            ],
            vec![],
        ),
        def(
            "first_half_over_under",
            "First Half Total Goals Over/Under",
            Some("1096791"),
            Some("68"),
            Some("HTOU"),
            vec![
                outcome("over", Some("Over"), Some("Over"), Some("O"), 0),
                outcome("under", Some("Under"), Some("Under"), Some("U"), 1),
            ],
            vec![MarketClass::OverUnder, MarketClass::TimeBased],
        ),
        def(
            "first_half_1x2",
            "First Half Result",
            Some("1096792"),
            Some("3"),
            Some("HT1X2"),
            vec![
                outcome("home", Some("Home"), Some("1"), Some("1"), 0),
                outcome("draw", Some("Draw"), Some("X"), Some("X"), 1),
                outcome("away", Some("Away"), Some("2"), Some("2"), 2),
            ],
            vec![MarketClass::TimeBased],
        ),
        def(
            "team_total_over_under",
            "Team Total Goals Over/Under",
            Some("1096793"),
            Some("90"),
            Some("TTOU"),
            vec![
                outcome("over", Some("Over"), Some("Over"), Some("O"), 0),
                outcome("under", Some("Under"), Some("Under"), Some("U"), 1),
            ],
            vec![MarketClass::OverUnder, MarketClass::Variant],
        ),
        def(
            // sportybet-only market: no reference_market_id, no bet9ja key.
            "multiscores",
            "Multiscores",
            None,
            Some("223"),
            None,
            vec![
                outcome("home_by_2", Some("Home by 2+"), Some("Home by 2+"), None, 0),
                outcome("draw", Some("Draw"), Some("Draw"), None, 1),
                outcome("away_by_2", Some("Away by 2+"), Some("Away by 2+"), None, 2),
            ],
            vec![MarketClass::Variant],
        ),
        def(
            // bet9ja-only market: not carried by reference or sportybet.
            "corners_over_under",
            "Total Corners Over/Under",
            None,
            None,
            Some("CRN"),
            vec![
                outcome("over", None, None, Some("O"), 0),
                outcome("under", None, None, Some("U"), 1),
            ],
            vec![MarketClass::OverUnder],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_consistency_reference_sportybet_bet9ja() {
        // Property 1: for every definition with a non-null source id,
        // the matching find_by_* returns that exact definition.
        let registry = MarketRegistry::load();
        for def in registry.all() {
            if let Some(id) = &def.reference_market_id {
                assert_eq!(registry.find_by_reference_id(id).unwrap().canonical_id, def.canonical_id);
            }
            if let Some(id) = &def.sportybet_market_id {
                assert_eq!(registry.find_by_sportybet_id(id).unwrap().canonical_id, def.canonical_id);
            }
            if let Some(key) = &def.bet9ja_market_key {
                assert_eq!(registry.find_by_bet9ja_key(key).unwrap().canonical_id, def.canonical_id);
            }
        }
    }

    #[test]
    fn missing_source_id_skips_only_that_index() {
        let registry = MarketRegistry::load();
        let multiscores = registry.find_by_canonical_id("multiscores").unwrap();
        assert!(multiscores.reference_market_id.is_none());
        assert!(registry.find_by_sportybet_id("223").is_some());
    }

    #[test]
    fn classification_queries_match_flags() {
        let registry = MarketRegistry::load();
        assert!(registry.is_over_under("18"));
        assert!(registry.is_handicap("16"));
        assert!(registry.is_variant("52"));
        assert!(registry.is_time_based("68"));
        assert!(!registry.is_over_under("1"));
    }

    #[test]
    fn build_is_deterministic() {
        let a = MarketRegistry::load();
        let b = MarketRegistry::load();
        assert_eq!(a.all().len(), b.all().len());
        assert_eq!(
            a.all().iter().map(|d| d.canonical_id.clone()).collect::<Vec<_>>(),
            b.all().iter().map(|d| d.canonical_id.clone()).collect::<Vec<_>>()
        );
    }
}
