//! Machine costs per tier, from fixed figures or recorded spot price history.

use std::cell::RefCell;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::TIER_COUNT;
use crate::error::PriceError;

/// Spot prices are dollars per hour; costs are integer units of 1/10000 dollar.
const PRICE_UNITS_PER_DOLLAR: f64 = 10_000.0;

pub trait PriceSource {
    /// One cost per tier, smallest tier first.
    fn cost_per_tier(&self) -> Result<[u64; TIER_COUNT], PriceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrices(pub [u64; TIER_COUNT]);

impl PriceSource for FixedPrices {
    fn cost_per_tier(&self) -> Result<[u64; TIER_COUNT], PriceError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPricePoint {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "SpotPrice", deserialize_with = "number_or_string")]
    pub price: f64,
}

impl SpotPricePoint {
    pub fn units(&self) -> Result<u64, PriceError> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(PriceError::InvalidPrice { price: self.price });
        }
        Ok((self.price * PRICE_UNITS_PER_DOLLAR).round() as u64)
    }
}

/// The `describe-spot-price-history` document of one instance type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotPriceHistory {
    #[serde(rename = "SpotPriceHistory")]
    pub points: Vec<SpotPricePoint>,
}

impl SpotPriceHistory {
    pub fn parse(json: &str) -> Result<Self, PriceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, PriceError> {
        let json = std::fs::read_to_string(path).map_err(|source| PriceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&json)
    }
}

/// Which recorded point to price every tier with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceSample {
    /// The first point of each history, which is the newest in AWS output.
    #[default]
    Latest,
    Index(usize),
    Random { seed: Option<u64> },
}

/// One history per tier. Every tier is sampled at the same position,
/// clamped to the length of its own history.
///
/// With [`PriceSample::Random`] every call draws a new position; a seed makes
/// the sequence of draws reproducible.
#[derive(Debug, Clone)]
pub struct HistoryPrices {
    pub histories: [SpotPriceHistory; TIER_COUNT],
    pub sample: PriceSample,
    rng: RefCell<StdRng>,
}

impl HistoryPrices {
    pub fn new(histories: [SpotPriceHistory; TIER_COUNT], sample: PriceSample) -> Self {
        let rng = match sample {
            PriceSample::Random { seed: Some(seed) } => StdRng::seed_from_u64(seed),
            _ => StdRng::from_entropy(),
        };
        HistoryPrices {
            histories,
            sample,
            rng: RefCell::new(rng),
        }
    }

    pub fn load<P: AsRef<Path>>(
        paths: &[P; TIER_COUNT],
        sample: PriceSample,
    ) -> Result<Self, PriceError> {
        let mut histories: [SpotPriceHistory; TIER_COUNT] = Default::default();
        for (history, path) in histories.iter_mut().zip(paths) {
            *history = SpotPriceHistory::load(path.as_ref())?;
        }
        Ok(Self::new(histories, sample))
    }

    fn position(&self) -> usize {
        match self.sample {
            PriceSample::Latest => 0,
            PriceSample::Index(i) => i,
            PriceSample::Random { .. } => {
                let len = self.histories[0].points.len().max(1);
                self.rng.borrow_mut().gen_range(0..len)
            }
        }
    }
}

impl PriceSource for HistoryPrices {
    fn cost_per_tier(&self) -> Result<[u64; TIER_COUNT], PriceError> {
        let position = self.position();
        let mut costs = [0; TIER_COUNT];
        for (tier, history) in self.histories.iter().enumerate() {
            let last = history
                .points
                .len()
                .checked_sub(1)
                .ok_or(PriceError::EmptyHistory { tier })?;
            costs[tier] = history.points[position.min(last)].units()?;
        }
        log::info!("cost per tier at sample {position}: {costs:?}");
        Ok(costs)
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    match Price::deserialize(deserializer)? {
        Price::Number(n) => Ok(n),
        Price::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HISTORY: &str = r#"{
        "SpotPriceHistory": [
            {"Timestamp": "2016-05-03T10:00:00.000Z", "SpotPrice": "0.1041", "InstanceType": "c4.large"},
            {"Timestamp": "2016-05-03T09:00:00.000Z", "SpotPrice": 0.0987, "InstanceType": "c4.large"}
        ]
    }"#;

    fn history(prices: &[f64]) -> SpotPriceHistory {
        SpotPriceHistory {
            points: prices
                .iter()
                .map(|&price| SpotPricePoint {
                    timestamp: "2016-05-03T10:00:00.000Z".to_string(),
                    price,
                })
                .collect(),
        }
    }

    #[test]
    fn parses_string_and_number_prices() {
        let history = SpotPriceHistory::parse(HISTORY).unwrap();
        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[0].units().unwrap(), 1041);
        assert_eq!(history.points[1].units().unwrap(), 987);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            SpotPriceHistory::parse(r#"{"SpotPriceHistory": [{"Timestamp": "t", "SpotPrice": "cheap"}]}"#),
            Err(PriceError::Json(_))
        ));
    }

    #[test]
    fn sample_position_is_clamped_per_tier() {
        let prices = HistoryPrices::new(
            [
                history(&[0.1, 0.2, 0.3]),
                history(&[0.2]),
                history(&[0.4, 0.5]),
                history(&[0.8, 0.9, 1.0]),
                history(&[1.6, 1.7, 1.8]),
            ],
            PriceSample::Index(2),
        );
        assert_eq!(
            prices.cost_per_tier().unwrap(),
            [3000, 2000, 5000, 10000, 18000]
        );
    }

    #[test]
    fn seeded_random_samples_form_a_reproducible_sequence() {
        let prices = |seed| {
            let ladder: Vec<f64> = (1..=50u32).map(|i| f64::from(i) / 100.0).collect();
            HistoryPrices::new(
                std::array::from_fn(|_| history(&ladder)),
                PriceSample::Random { seed: Some(seed) },
            )
        };
        let draws = |prices: &HistoryPrices| -> Vec<u64> {
            (0..8).map(|_| prices.cost_per_tier().unwrap()[0]).collect()
        };

        let first = draws(&prices(7));
        assert_eq!(first, draws(&prices(7)));

        // later draws are not pinned to the first one
        assert!(first.iter().any(|&cost| cost != first[0]), "{first:?}");
    }

    #[test]
    fn empty_history_is_an_error() {
        let mut histories: [SpotPriceHistory; TIER_COUNT] = Default::default();
        histories[0] = history(&[0.1]);
        let prices = HistoryPrices::new(histories, PriceSample::Latest);
        assert!(matches!(
            prices.cost_per_tier(),
            Err(PriceError::EmptyHistory { tier: 1 })
        ));
    }
}
