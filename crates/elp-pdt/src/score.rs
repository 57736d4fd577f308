//! Priority score for queued day-trade requests.
//!
//! `score = confidence^wc × estimated_profit^wp × historical_success_rate^wh`
//!
//! With every weight at 1.0 (the default) this is exactly the plain product.
//! Weights are exponents so a factor can be emphasized (>1), flattened (<1) or
//! ignored (0) without changing the scale of the others.

use elp_schemas::TradeRequest;

use crate::PdtError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreWeights {
    pub confidence: f64,
    pub profit: f64,
    pub history: f64,
}

impl ScoreWeights {
    pub const UNIT: ScoreWeights = ScoreWeights {
        confidence: 1.0,
        profit: 1.0,
        history: 1.0,
    };

    pub fn is_valid(&self) -> bool {
        [self.confidence, self.profit, self.history]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }

    pub fn score(&self, req: &TradeRequest) -> f64 {
        weighted(req.confidence, self.confidence)
            * weighted(req.estimated_profit, self.profit)
            * weighted(req.historical_success_rate, self.history)
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::UNIT
    }
}

fn weighted(factor: f64, weight: f64) -> f64 {
    if weight == 1.0 {
        return factor;
    }
    // Estimated profit may be negative; keep its sign.
    factor.signum() * factor.abs().powf(weight)
}

/// Reject malformed requests before they can reach the queue.
pub fn validate_request(req: &TradeRequest) -> Result<(), PdtError> {
    if req.strategy_id.trim().is_empty() {
        return Err(PdtError::InvalidRequest("strategy_id is empty".to_string()));
    }
    if req.symbol.trim().is_empty() {
        return Err(PdtError::InvalidRequest("symbol is empty".to_string()));
    }
    if !unit_interval(req.confidence) {
        return Err(PdtError::InvalidRequest(format!(
            "confidence {} outside [0,1]",
            req.confidence
        )));
    }
    if !unit_interval(req.historical_success_rate) {
        return Err(PdtError::InvalidRequest(format!(
            "historical_success_rate {} outside [0,1]",
            req.historical_success_rate
        )));
    }
    if !req.estimated_profit.is_finite() {
        return Err(PdtError::InvalidRequest(
            "estimated_profit is not finite".to_string(),
        ));
    }
    Ok(())
}

fn unit_interval(x: f64) -> bool {
    x.is_finite() && (0.0..=1.0).contains(&x)
}
