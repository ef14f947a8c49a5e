//! Strategy engine: runs the active strategies and fuses their signals.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};
use trading_core::{
    error::StrategyError,
    traits::{Strategy, StrategyInput, StrategyPerformance},
    types::{SignalAction, StrategySignal},
};

/// Strategy id stamped on fused signals.
pub const ENSEMBLE_ID: &str = "ensemble";
/// Sides closer than this share of total weight fuse to hold.
const TIE_BREAK_RATIO: f64 = 0.2;
/// Confidence reported for an ambiguous consensus.
const AMBIGUOUS_CONFIDENCE: f64 = 0.3;

struct Slot {
    strategy: Box<dyn Strategy>,
    active: bool,
}

/// Status row for one registered strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub performance: StrategyPerformance,
    pub parameters: serde_json::Value,
}

/// Result of one `generate_signals` pass.
#[derive(Debug, Default)]
pub struct SignalBatch {
    pub signals: Vec<StrategySignal>,
    /// Strategies that failed, isolated from the rest
    pub failures: Vec<(String, StrategyError)>,
}

#[derive(Default)]
pub struct StrategyEngine {
    slots: Vec<Slot>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        strategy: Box<dyn Strategy>,
        active: bool,
    ) -> Result<(), StrategyError> {
        if self.slot(strategy.id()).is_some() {
            return Err(StrategyError::AlreadyRegistered(strategy.id().to_string()));
        }
        debug!(strategy = strategy.id(), active, "Registered strategy");
        self.slots.push(Slot { strategy, active });
        Ok(())
    }

    pub fn activate(&mut self, id: &str) -> Result<(), StrategyError> {
        self.set_active(id, true)
    }

    pub fn deactivate(&mut self, id: &str) -> Result<(), StrategyError> {
        self.set_active(id, false)
    }

    fn set_active(&mut self, id: &str, active: bool) -> Result<(), StrategyError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.strategy.id() == id)
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;
        slot.active = active;
        Ok(())
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.slot(id).is_some_and(|s| s.active)
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.strategy.id().to_string())
            .collect()
    }

    fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.strategy.id() == id)
    }

    /// Run every active strategy over `input`.
    ///
    /// A failing strategy never aborts the pass; its error lands in
    /// `failures`. Strategies without enough history are skipped quietly.
    pub fn generate_signals(&self, input: &StrategyInput<'_>) -> SignalBatch {
        let mut batch = SignalBatch::default();
        for slot in self.slots.iter().filter(|s| s.active) {
            let id = slot.strategy.id();
            match slot.strategy.analyze(input) {
                Ok(Some(signal)) => {
                    debug!(
                        strategy = id,
                        asset = %input.asset.id,
                        action = %signal.action,
                        confidence = signal.confidence,
                        "Strategy signal"
                    );
                    batch.signals.push(signal);
                }
                Ok(None) => {}
                Err(StrategyError::InsufficientData { required, available }) => {
                    debug!(strategy = id, required, available, "Not enough candles");
                }
                Err(e) => {
                    warn!(strategy = id, asset = %input.asset.id, error = %e, "Strategy failed");
                    batch.failures.push((id.to_string(), e));
                }
            }
        }
        batch
    }

    /// Performance-weighted fusion of per-strategy signals.
    ///
    /// Returns `None` when no directional signal carries any weight.
    pub fn fuse(&self, signals: &[StrategySignal]) -> Option<StrategySignal> {
        let default_performance = StrategyPerformance::default();
        let weighted: Vec<(&StrategySignal, f64)> = signals
            .iter()
            .filter(|s| s.action.is_directional())
            .map(|s| {
                let performance = self
                    .slot(&s.strategy_id)
                    .map(|slot| slot.strategy.performance())
                    .unwrap_or(&default_performance);
                (s, performance.weight() * s.confidence)
            })
            .collect();

        let side_weight = |action: SignalAction| -> f64 {
            weighted
                .iter()
                .filter(|(s, _)| s.action == action)
                .map(|(_, w)| w)
                .sum()
        };
        let buy_weight = side_weight(SignalAction::Buy);
        let sell_weight = side_weight(SignalAction::Sell);
        let total = buy_weight + sell_weight;
        if total <= 0.0 {
            return None;
        }

        let asset_id = weighted[0].0.asset_id.clone();
        if (buy_weight - sell_weight).abs() < TIE_BREAK_RATIO * total {
            debug!(asset = %asset_id, buy_weight, sell_weight, "Ambiguous consensus");
            return Some(
                StrategySignal::new(
                    ENSEMBLE_ID,
                    asset_id,
                    SignalAction::Hold,
                    AMBIGUOUS_CONFIDENCE,
                    Duration::minutes(1),
                )
                .with_reasoning(format!(
                    "Ambiguous consensus: buy {:.3} vs sell {:.3}",
                    buy_weight, sell_weight
                )),
            );
        }

        let (action, winning_weight) = if buy_weight > sell_weight {
            (SignalAction::Buy, buy_weight)
        } else {
            (SignalAction::Sell, sell_weight)
        };
        let winners: Vec<&StrategySignal> = weighted
            .iter()
            .filter(|(s, _)| s.action == action)
            .map(|(s, _)| *s)
            .collect();

        let strength = winners.iter().map(|s| s.strength).sum::<f64>() / winners.len() as f64;
        let expires_at = winners.iter().map(|s| s.expires_at).min()?;
        let reasoning = winners
            .iter()
            .map(|s| format!("[{}] {}", s.strategy_id, s.reasoning))
            .collect::<Vec<_>>()
            .join("; ");

        let mut fused = StrategySignal::new(
            ENSEMBLE_ID,
            asset_id,
            action,
            winning_weight / total,
            Duration::zero(),
        )
        .with_strength(strength)
        .with_levels(
            mean_level(winners.iter().map(|s| s.price)),
            mean_level(winners.iter().map(|s| s.stop_loss)),
            mean_level(winners.iter().map(|s| s.take_profit)),
        )
        .with_reasoning(reasoning);
        fused.expires_at = expires_at;
        Some(fused)
    }

    /// Feed a realised trade outcome back into one strategy.
    pub fn record_outcome(&mut self, id: &str, pnl: f64) -> Result<(), StrategyError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.strategy.id() == id)
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;
        slot.strategy.record_outcome(pnl);
        Ok(())
    }

    pub fn performance(&self, id: &str) -> Option<&StrategyPerformance> {
        self.slot(id).map(|s| s.strategy.performance())
    }

    pub fn list(&self) -> Vec<StrategyStatus> {
        self.slots
            .iter()
            .map(|s| StrategyStatus {
                id: s.strategy.id().to_string(),
                name: s.strategy.name().to_string(),
                description: s.strategy.description().to_string(),
                active: s.active,
                performance: s.strategy.performance().clone(),
                parameters: s.strategy.parameters(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Mean of the levels that are set.
fn mean_level(levels: impl Iterator<Item = Option<Decimal>>) -> Option<Decimal> {
    let set: Vec<Decimal> = levels.flatten().collect();
    if set.is_empty() {
        return None;
    }
    Some(set.iter().sum::<Decimal>() / Decimal::from(set.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures;
    use rust_decimal_macros::dec;

    /// Emits a fixed signal, or fails on demand.
    struct FixedStrategy {
        id: &'static str,
        action: SignalAction,
        confidence: f64,
        fail: bool,
        performance: StrategyPerformance,
    }

    impl FixedStrategy {
        fn new(id: &'static str, action: SignalAction, confidence: f64) -> Self {
            Self {
                id,
                action,
                confidence,
                fail: false,
                performance: StrategyPerformance::default(),
            }
        }
    }

    impl Strategy for FixedStrategy {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            self.id
        }

        fn min_candles(&self) -> usize {
            1
        }

        fn analyze(
            &self,
            input: &StrategyInput<'_>,
        ) -> Result<Option<StrategySignal>, StrategyError> {
            if self.fail {
                return Err(StrategyError::Internal("boom".into()));
            }
            let signal = signal(self.id, self.action, self.confidence);
            Ok(Some(signal.with_reasoning(input.asset.id.clone())))
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        fn performance(&self) -> &StrategyPerformance {
            &self.performance
        }

        fn record_outcome(&mut self, pnl: f64) {
            self.performance.record(pnl);
        }
    }

    fn signal(id: &str, action: SignalAction, confidence: f64) -> StrategySignal {
        StrategySignal::new(id, "AAPL", action, confidence, Duration::minutes(5))
    }

    #[test]
    fn test_equal_opposite_signals_fuse_to_hold() {
        let engine = StrategyEngine::new();
        let fused = engine
            .fuse(&[
                signal("a", SignalAction::Buy, 0.5),
                signal("b", SignalAction::Sell, 0.5),
            ])
            .unwrap();

        assert_eq!(fused.action, SignalAction::Hold);
        assert_eq!(fused.confidence, AMBIGUOUS_CONFIDENCE);
        assert_eq!(fused.strategy_id, ENSEMBLE_ID);
    }

    #[test]
    fn test_heavier_side_wins() {
        let engine = StrategyEngine::new();
        let fused = engine
            .fuse(&[
                signal("a", SignalAction::Buy, 0.9),
                signal("b", SignalAction::Buy, 0.6),
                signal("c", SignalAction::Sell, 0.3),
            ])
            .unwrap();

        assert_eq!(fused.action, SignalAction::Buy);
        // Equal performance weights cancel: 1.5 / 1.8
        assert!((fused.confidence - 1.5 / 1.8).abs() < 1e-9);
        assert!(fused.reasoning.contains("[a]"));
        assert!(!fused.reasoning.contains("[c]"));
    }

    #[test]
    fn test_levels_averaged_over_setters() {
        let engine = StrategyEngine::new();
        let fused = engine
            .fuse(&[
                signal("a", SignalAction::Sell, 0.8).with_levels(
                    Some(dec!(100)),
                    Some(dec!(104)),
                    None,
                ),
                signal("b", SignalAction::Sell, 0.8).with_levels(
                    Some(dec!(102)),
                    None,
                    Some(dec!(95)),
                ),
            ])
            .unwrap();

        assert_eq!(fused.price, Some(dec!(101)));
        assert_eq!(fused.stop_loss, Some(dec!(104)));
        assert_eq!(fused.take_profit, Some(dec!(95)));
    }

    #[test]
    fn test_holds_and_empty_input() {
        let engine = StrategyEngine::new();
        assert!(engine.fuse(&[]).is_none());
        assert!(engine.fuse(&[signal("a", SignalAction::Hold, 0.9)]).is_none());
    }

    #[test]
    fn test_performance_shifts_weight() {
        let mut engine = StrategyEngine::new();
        engine
            .register(Box::new(FixedStrategy::new("winner", SignalAction::Buy, 0.5)), true)
            .unwrap();
        engine
            .register(Box::new(FixedStrategy::new("loser", SignalAction::Sell, 0.5)), true)
            .unwrap();
        for _ in 0..10 {
            engine.record_outcome("winner", 100.0).unwrap();
            engine.record_outcome("loser", -100.0).unwrap();
        }

        let fused = engine
            .fuse(&[
                signal("winner", SignalAction::Buy, 0.5),
                signal("loser", SignalAction::Sell, 0.5),
            ])
            .unwrap();
        assert_eq!(fused.action, SignalAction::Buy);
    }

    #[test]
    fn test_failing_strategy_is_isolated() {
        let mut engine = StrategyEngine::new();
        let mut broken = FixedStrategy::new("broken", SignalAction::Sell, 0.9);
        broken.fail = true;
        engine.register(Box::new(broken), true).unwrap();
        engine
            .register(Box::new(FixedStrategy::new("steady", SignalAction::Buy, 0.7)), true)
            .unwrap();
        engine
            .register(Box::new(FixedStrategy::new("idle", SignalAction::Sell, 0.7)), false)
            .unwrap();

        let candles = fixtures::candles(60);
        let analysis = fixtures::analysis(&candles);
        let asset = fixtures::asset();
        let batch = engine.generate_signals(&fixtures::input(&asset, &candles, &analysis));

        assert_eq!(batch.signals.len(), 1);
        assert_eq!(batch.signals[0].strategy_id, "steady");
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, "broken");
    }

    #[test]
    fn test_registration_and_activation() {
        let mut engine = StrategyEngine::new();
        engine
            .register(Box::new(FixedStrategy::new("a", SignalAction::Buy, 0.5)), false)
            .unwrap();
        assert!(matches!(
            engine.register(Box::new(FixedStrategy::new("a", SignalAction::Buy, 0.5)), true),
            Err(StrategyError::AlreadyRegistered(_))
        ));

        assert!(!engine.is_active("a"));
        engine.activate("a").unwrap();
        assert!(engine.is_active("a"));
        assert_eq!(engine.active_ids(), vec!["a".to_string()]);
        assert!(matches!(engine.deactivate("zzz"), Err(StrategyError::NotFound(_))));
        assert_eq!(engine.list().len(), 1);
    }
}
