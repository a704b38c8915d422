//! Source Normalizers (spec §4.B) — convert each source's raw response into
//! a common `MappedMarket` sequence. Pure functions: normalizing the same
//! raw event twice yields equal output (spec §8 round-trip property).

pub mod bet9ja;
pub mod reference;
pub mod sportybet;

use crate::error::MappingError;
use crate::margin::compute_margin;
use crate::model::{MarketDefinition, MarketOdds, OutcomeOdds};

/// The normalized output of a single market, not yet attached to a
/// snapshot (that happens in [`crate::snapshot_store`]).
#[derive(Debug, Clone, PartialEq)]
pub struct MappedMarket {
    pub reference_market_id: String,
    pub reference_market_name: String,
    pub line: Option<f64>,
    pub outcomes: Vec<OutcomeOdds>,
    pub margin: f64,
}

impl MappedMarket {
    pub fn into_market_odds(self, snapshot_id: i64) -> MarketOdds {
        MarketOdds {
            snapshot_id,
            reference_market_id: self.reference_market_id,
            reference_market_name: self.reference_market_name,
            line: self.line,
            outcomes: self.outcomes,
            margin: self.margin,
        }
    }
}

/// Builds a [`MappedMarket`] from a definition, raw outcomes, and an
/// optional line, computing the margin at ingest (spec §3 MarketOdds).
fn finish_mapping(
    definition: &MarketDefinition,
    line: Option<f64>,
    outcomes: Vec<OutcomeOdds>,
) -> Result<MappedMarket, MappingError> {
    if outcomes.is_empty() {
        return Err(MappingError::NoMatchingOutcomes(definition.canonical_id.clone()));
    }
    let margin = compute_margin(&outcomes)?;
    Ok(MappedMarket {
        reference_market_id: definition
            .reference_market_id
            .clone()
            .unwrap_or_else(|| definition.canonical_id.clone()),
        reference_market_name: definition.display_name.clone(),
        line,
        outcomes,
        margin,
    })
}

/// The result of a batch normalization call: every market that normalized
/// cleanly, plus a parallel list of structured errors for the rest (spec
/// §4.B Partial batch success). The caller decides whether to persist the
/// successes even when `errors` is non-empty.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub markets: Vec<MappedMarket>,
    pub errors: Vec<MappingError>,
}

impl BatchResult {
    fn push_ok(&mut self, market: MappedMarket) {
        self.markets.push(market);
    }

    fn push_err(&mut self, error: MappingError) {
        self.errors.push(error);
    }
}
