use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use super::{Card, CardFilter};
use crate::shared::AppError;

/// How many times we go back to the provider when it returns fewer unique
/// cards than requested.
const MAX_FETCH_ATTEMPTS: u32 = 4;

/// Trait for the external card catalog.
///
/// Best-effort: a fetch may return fewer cards than asked for, including
/// duplicates across calls. Gathering logic above this trait handles
/// retries and deduplication.
#[async_trait]
pub trait CardProvider {
    async fn fetch_candidates(
        &self,
        filter: &CardFilter,
        count: usize,
    ) -> Result<Vec<Card>, AppError>;
}

/// Gathers up to `count` unique cards for a new lobby.
///
/// Retries the provider up to the attempt budget, deduplicating by card
/// id. May return fewer than `count` cards when the pool is thin; the
/// lobby then simply plays fewer rounds.
#[instrument(skip(provider, filter))]
pub async fn gather_cards(
    provider: &(dyn CardProvider + Send + Sync),
    filter: &CardFilter,
    count: usize,
) -> Result<Vec<Card>, AppError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut gathered: Vec<Card> = Vec::with_capacity(count);

    for attempt in 1..=MAX_FETCH_ATTEMPTS {
        if gathered.len() >= count {
            break;
        }

        let needed = count - gathered.len();
        let batch = provider.fetch_candidates(filter, needed).await?;
        debug!(
            attempt = attempt,
            requested = needed,
            received = batch.len(),
            "Fetched candidate cards"
        );

        for card in batch {
            if gathered.len() >= count {
                break;
            }
            if seen.insert(card.id.clone()) {
                gathered.push(card);
            }
        }
    }

    if gathered.len() < count {
        warn!(
            gathered = gathered.len(),
            requested = count,
            "Card pool exhausted before reaching requested round count"
        );
    } else {
        info!(card_count = gathered.len(), "Gathered cards for lobby");
    }

    Ok(gathered)
}

/// In-memory card provider backed by a fixed catalog.
///
/// Samples randomly from the cards matching the filter, the same way the
/// remote catalog picks random cards from random sets.
pub struct StaticCardProvider {
    catalog: Vec<Card>,
}

impl StaticCardProvider {
    pub fn new(catalog: Vec<Card>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CardProvider for StaticCardProvider {
    async fn fetch_candidates(
        &self,
        filter: &CardFilter,
        count: usize,
    ) -> Result<Vec<Card>, AppError> {
        let matching: Vec<&Card> = self.catalog.iter().filter(|c| filter.allows(c)).collect();

        let sampled = matching
            .choose_multiple(&mut rand::thread_rng(), count)
            .map(|c| (*c).clone())
            .collect();

        Ok(sampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, set: &str) -> Card {
        Card {
            id: id.to_string(),
            display_name: format!("Card {}", id),
            full_image_ref: format!("https://img.example/{}/high.png", id),
            set_name: set.to_string(),
            rarity_label: "Rare".to_string(),
            partial_reveal: format!("crop-{}", id),
        }
    }

    fn all_filter() -> CardFilter {
        CardFilter {
            sets: vec!["all".to_string()],
            rare_only: false,
            rarities: None,
        }
    }

    /// Provider that always returns the same fixed batch, so repeated
    /// attempts never produce new unique ids.
    struct RepeatingProvider {
        batch: Vec<Card>,
    }

    #[async_trait]
    impl CardProvider for RepeatingProvider {
        async fn fetch_candidates(
            &self,
            _filter: &CardFilter,
            _count: usize,
        ) -> Result<Vec<Card>, AppError> {
            Ok(self.batch.clone())
        }
    }

    #[tokio::test]
    async fn gather_reaches_requested_count() {
        let provider = StaticCardProvider::new(vec![
            card("a", "base1"),
            card("b", "base1"),
            card("c", "base1"),
            card("d", "base1"),
        ]);

        let cards = gather_cards(&provider, &all_filter(), 3).await.unwrap();
        assert_eq!(cards.len(), 3);

        let ids: HashSet<_> = cards.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), 3, "gathered cards must be unique");
    }

    #[tokio::test]
    async fn gather_deduplicates_across_attempts() {
        let provider = RepeatingProvider {
            batch: vec![card("a", "base1"), card("a", "base1"), card("b", "base1")],
        };

        let cards = gather_cards(&provider, &all_filter(), 5).await.unwrap();
        // Budget exhausted with only two unique ids available.
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn gather_returns_short_when_pool_is_thin() {
        let provider = StaticCardProvider::new(vec![card("a", "base1"), card("b", "base1")]);

        let cards = gather_cards(&provider, &all_filter(), 3).await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn static_provider_respects_set_filter() {
        let provider =
            StaticCardProvider::new(vec![card("a", "base1"), card("b", "sv03.5")]);
        let filter = CardFilter {
            sets: vec!["base1".to_string()],
            rare_only: false,
            rarities: None,
        };

        let cards = provider.fetch_candidates(&filter, 10).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, "a");
    }

    #[tokio::test]
    async fn static_provider_enforces_rare_only() {
        let common = Card {
            rarity_label: "Common".to_string(),
            ..card("a", "base1")
        };
        let provider = StaticCardProvider::new(vec![common, card("b", "base1")]);
        let filter = CardFilter {
            sets: vec!["all".to_string()],
            rare_only: true,
            rarities: None,
        };

        let cards = provider.fetch_candidates(&filter, 10).await.unwrap();
        assert_eq!(cards.len(), 1, "rare_only must exclude common cards");
        assert_eq!(cards[0].id, "b");
    }
}
