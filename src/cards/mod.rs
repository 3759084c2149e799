pub mod provider;

use serde::{Deserialize, Serialize};

/// A single card a round can be built around.
///
/// Immutable once created. `partial_reveal` is the precomputed cropped
/// artwork handed to clients at round start; the full image reference is
/// withheld until the round is resolved for that player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: String,
    pub display_name: String,
    pub full_image_ref: String,
    pub set_name: String,
    pub rarity_label: String,
    /// Precomputed partial-reveal artifact (e.g. base64 crop). Never
    /// recomputed mid-round.
    pub partial_reveal: String,
}

/// Filter handed to the card provider when gathering a lobby's cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardFilter {
    /// Set ids to draw from; the "all" sentinel means no set restriction.
    pub sets: Vec<String>,
    pub rare_only: bool,
    pub rarities: Option<Vec<String>>,
}

impl CardFilter {
    /// Whether a card passes every restriction in the filter.
    pub fn allows(&self, card: &Card) -> bool {
        self.allows_set(&card.set_name)
            && self.allows_rarity(&card.rarity_label)
            && (!self.rare_only || is_rare_tier(&card.rarity_label))
    }

    /// Whether a set name passes the filter ("all" sentinel disables it).
    pub fn allows_set(&self, set: &str) -> bool {
        self.sets.iter().any(|s| s == "all") || self.sets.iter().any(|s| s == set)
    }

    pub fn allows_rarity(&self, rarity: &str) -> bool {
        match &self.rarities {
            Some(rarities) => rarities.iter().any(|r| r == rarity),
            None => true,
        }
    }
}

/// Anything above the two common tiers counts as rare. The catalog
/// labels those tiers in English or French depending on the set.
fn is_rare_tier(label: &str) -> bool {
    !matches!(
        label.to_lowercase().as_str(),
        "common" | "uncommon" | "commune" | "peu commune"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(sets: Vec<&str>, rarities: Option<Vec<&str>>) -> CardFilter {
        CardFilter {
            sets: sets.into_iter().map(String::from).collect(),
            rare_only: false,
            rarities: rarities.map(|r| r.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn all_sentinel_allows_any_set() {
        let f = filter(vec!["all"], None);
        assert!(f.allows_set("base1"));
        assert!(f.allows_set("sv03.5"));
    }

    #[test]
    fn explicit_sets_are_restrictive() {
        let f = filter(vec!["base1"], None);
        assert!(f.allows_set("base1"));
        assert!(!f.allows_set("sv03.5"));
    }

    #[test]
    fn missing_rarity_filter_allows_all() {
        let f = filter(vec!["all"], None);
        assert!(f.allows_rarity("Common"));

        let f = filter(vec!["all"], Some(vec!["Rare"]));
        assert!(f.allows_rarity("Rare"));
        assert!(!f.allows_rarity("Common"));
    }

    fn card_with_rarity(rarity: &str) -> Card {
        Card {
            id: "c1".to_string(),
            display_name: "Card".to_string(),
            full_image_ref: "ref".to_string(),
            set_name: "base1".to_string(),
            rarity_label: rarity.to_string(),
            partial_reveal: "crop".to_string(),
        }
    }

    #[test]
    fn rare_only_excludes_common_tiers() {
        let mut f = filter(vec!["all"], None);
        f.rare_only = true;

        assert!(!f.allows(&card_with_rarity("Common")));
        assert!(!f.allows(&card_with_rarity("Peu commune")));
        assert!(f.allows(&card_with_rarity("Rare")));
        assert!(f.allows(&card_with_rarity("Illustration rare")));
    }

    #[test]
    fn rare_only_off_admits_commons() {
        let f = filter(vec!["all"], None);
        assert!(f.allows(&card_with_rarity("Common")));
    }
}
