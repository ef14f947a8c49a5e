//! Correlation-risk heuristic over market clusters.

use std::collections::HashMap;
use trading_core::types::Position;

/// Assigns positions to correlated clusters.
pub trait MarketClassifier: Send + Sync {
    fn classify(&self, position: &Position) -> String;
}

/// Groups by the position's own market tag; untagged positions fall into
/// one `unclassified` bucket.
#[derive(Debug, Clone, Default)]
pub struct TagClassifier;

impl MarketClassifier for TagClassifier {
    fn classify(&self, position: &Position) -> String {
        if position.market.trim().is_empty() {
            "unclassified".to_string()
        } else {
            position.market.to_lowercase()
        }
    }
}

/// Explicit asset-to-market table with a fallback classifier.
pub struct TableClassifier {
    table: HashMap<String, String>,
    fallback: Box<dyn MarketClassifier>,
}

impl TableClassifier {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self {
            table,
            fallback: Box::new(TagClassifier),
        }
    }
}

impl MarketClassifier for TableClassifier {
    fn classify(&self, position: &Position) -> String {
        self.table
            .get(&position.asset_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.classify(position))
    }
}

/// Largest cluster share of the open positions, with that cluster's name.
pub fn largest_cluster<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    classifier: &dyn MarketClassifier,
) -> Option<(String, f64)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for position in positions.into_iter().filter(|p| !p.is_flat()) {
        *counts.entry(classifier.classify(position)).or_default() += 1;
        total += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(market, count)| (market, count as f64 / total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(id: &str, market: &str) -> Position {
        Position::new(id, dec!(10), dec!(100)).with_market(market)
    }

    #[test]
    fn test_largest_cluster_share() {
        let positions = vec![
            position("AAPL", "tech"),
            position("MSFT", "Tech"),
            position("NVDA", "tech"),
            position("XOM", "energy"),
        ];
        let (market, share) = largest_cluster(&positions, &TagClassifier).unwrap();
        assert_eq!(market, "tech");
        assert!((share - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_flat_positions_ignored() {
        let flat = Position::new("GLD", dec!(0), dec!(100)).with_market("metals");
        assert!(largest_cluster(&[flat], &TagClassifier).is_none());
    }

    #[test]
    fn test_table_classifier_overrides_tag() {
        let table = HashMap::from([("XOM".to_string(), "tech".to_string())]);
        let classifier = TableClassifier::new(table);
        let positions = vec![position("AAPL", "tech"), position("XOM", "energy")];
        let (market, share) = largest_cluster(&positions, &classifier).unwrap();
        assert_eq!(market, "tech");
        assert_eq!(share, 1.0);
    }
}
