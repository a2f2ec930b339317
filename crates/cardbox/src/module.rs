//! Modules: named, ordered collections of cards.

use std::collections::{BTreeSet, HashSet};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::asset::AssetStore;
use crate::card::{Card, CardId, CardMigration, MigrationOutcome};
use crate::error::{Error, Result};

/// Topic filter value that selects every card.
pub const ALL_TOPICS: &str = "All Topics";

/// A named deck of cards in study order.
///
/// Cards are only reachable through accessors and explicit mutation
/// operations, so every card in a module carries the module's name.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    cards: Vec<Card>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cards: Vec::new(),
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the module has no cards.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Cards in study order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Card at `index`.
    pub fn card(&self, index: usize) -> Option<&Card> {
        self.cards.get(index)
    }

    /// Mutable card at `index`.
    pub fn card_mut(&mut self, index: usize) -> Option<&mut Card> {
        self.cards.get_mut(index)
    }

    /// Position of the card with `id`.
    pub fn position_of(&self, id: CardId) -> Option<usize> {
        self.cards.iter().position(|c| c.id() == id)
    }

    /// Mutable card with `id`.
    pub fn card_by_id_mut(&mut self, id: CardId) -> Option<&mut Card> {
        self.cards.iter_mut().find(|c| c.id() == id)
    }

    /// Append a card, claiming it for this module.
    pub fn add_card(&mut self, mut card: Card) {
        card.set_module_name(&self.name);
        self.cards.push(card);
    }

    /// Append a card exactly as it was read from disk.
    pub(crate) fn push_loaded(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Remove and return the card at `index`. Later cards shift down.
    pub fn remove_card_at(&mut self, index: usize) -> Result<Card> {
        if index >= self.cards.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.cards.remove(index))
    }

    /// Replace the card at `index`, returning the old one.
    pub fn replace_card_at(&mut self, index: usize, mut card: Card) -> Result<Card> {
        let name = self.name.clone();
        let slot = self
            .cards
            .get_mut(index)
            .ok_or_else(|| Error::CardIndexOutOfRange {
                module: name.clone(),
                index,
            })?;
        card.set_module_name(&name);
        Ok(std::mem::replace(slot, card))
    }

    /// Distinct topics across all cards, sorted.
    pub fn topics(&self) -> BTreeSet<String> {
        self.cards.iter().map(|c| c.topic().to_string()).collect()
    }

    /// Cards with the given topic, in order. `None` or [`ALL_TOPICS`]
    /// selects every card.
    pub fn cards_by_topic(&self, filter: Option<&str>) -> Vec<&Card> {
        match filter {
            None | Some(ALL_TOPICS) => self.cards.iter().collect(),
            Some(topic) => self.cards.iter().filter(|c| c.topic() == topic).collect(),
        }
    }

    /// Retag every card with topic `old` as `new`. Returns how many changed.
    ///
    /// The caller persists the module afterwards.
    pub fn rename_topic(&mut self, old: &str, new: &str) -> Result<usize> {
        if new.trim().is_empty() {
            return Err(Error::InvalidName(new.to_string()));
        }
        Ok(self.retag(old, new))
    }

    /// Move every card from topic `source` into `target`, after which
    /// `source` no longer appears in [`topics`](Self::topics).
    pub fn merge_topic(&mut self, source: &str, target: &str) -> Result<usize> {
        if target.trim().is_empty() {
            return Err(Error::InvalidName(target.to_string()));
        }
        Ok(self.retag(source, target))
    }

    fn retag(&mut self, from: &str, to: &str) -> usize {
        let mut changed = 0;
        for card in self.cards.iter_mut().filter(|c| c.topic() == from) {
            card.set_topic(to);
            changed += 1;
        }
        changed
    }

    /// Shuffle the in-memory card order.
    ///
    /// Nothing is written until the module is saved.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::rng());
    }

    /// Shuffle with a caller-supplied RNG.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    /// A shuffled copy of the filtered cards for a study session. The
    /// module's own order is untouched.
    pub fn study_order<R: Rng + ?Sized>(&self, filter: Option<&str>, rng: &mut R) -> Vec<&Card> {
        let mut order = self.cards_by_topic(filter);
        order.shuffle(rng);
        order
    }

    /// Migrate every card's image reference.
    pub fn migrate(&mut self, store: &AssetStore) -> MigrationSummary {
        let mut summary = MigrationSummary::default();
        for card in &mut self.cards {
            summary.record(&card.migrate(store));
        }
        summary
    }

    /// Rename the module and move every card, and its image, along with it.
    pub(crate) fn rehome(&mut self, store: &AssetStore, name: &str) -> MigrationSummary {
        self.name = name.to_string();
        let mut summary = MigrationSummary::default();
        for card in &mut self.cards {
            summary.record(&card.rehome(store, name));
        }
        summary
    }

    /// Make every card's module name match this module. Returns how many
    /// cards were corrected.
    pub(crate) fn sync_card_modules(&mut self) -> usize {
        let mut fixed = 0;
        for card in &mut self.cards {
            if card.module_name() != self.name {
                card.set_module_name(&self.name);
                fixed += 1;
            }
        }
        fixed
    }

    /// Give a fresh id to every card whose id is in `taken`.
    pub(crate) fn reassign_ids_in(&mut self, taken: &HashSet<CardId>) -> usize {
        let mut reassigned = 0;
        for card in self.cards.iter_mut().filter(|c| taken.contains(&c.id())) {
            card.reassign_id();
            reassigned += 1;
        }
        reassigned
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::CardIndexOutOfRange {
            module: self.name.clone(),
            index,
        }
    }
}

/// Totals from migrating many cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Cards examined.
    pub cards_checked: usize,
    /// Image files copied into their module directory.
    pub relocated: usize,
    /// References replaced with the missing sentinel.
    pub marked_missing: usize,
    /// Image cards whose file still cannot be found.
    pub unresolved: usize,
    /// Cards whose module name was filled in or corrected.
    pub module_names_fixed: usize,
}

impl MigrationSummary {
    /// Whether anything needs to be written back.
    pub fn changed(&self) -> bool {
        self.relocated + self.marked_missing + self.module_names_fixed > 0
    }

    /// Count one card's result.
    pub fn record(&mut self, result: &CardMigration) {
        self.cards_checked += 1;
        if result.defaulted_module {
            self.module_names_fixed += 1;
        }
        match result.outcome {
            MigrationOutcome::Relocated { .. } => self.relocated += 1,
            MigrationOutcome::MarkedMissing => self.marked_missing += 1,
            MigrationOutcome::Unresolved => self.unresolved += 1,
            MigrationOutcome::NotImage | MigrationOutcome::Current => {}
        }
    }

    /// Add another summary's totals.
    pub fn merge(&mut self, other: MigrationSummary) {
        self.cards_checked += other.cards_checked;
        self.relocated += other.relocated;
        self.marked_missing += other.marked_missing;
        self.unresolved += other.unresolved;
        self.module_names_fixed += other.module_names_fixed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample() -> Module {
        let mut module = Module::new("Spanish");
        module.add_card(Card::with_text("hola", "hello", "Greetings", ""));
        module.add_card(Card::with_text("correr", "to run", "Verbs", ""));
        module.add_card(Card::with_text("adiós", "bye", "Greetings", ""));
        module.add_card(Card::with_text("gato", "cat", "", ""));
        module
    }

    #[test]
    fn test_add_card_claims_module_name() {
        let module = sample();
        assert!(module.cards().iter().all(|c| c.module_name() == "Spanish"));
    }

    #[test]
    fn test_topics_sorted_and_distinct() {
        let topics: Vec<_> = sample().topics().into_iter().collect();
        assert_eq!(topics, vec!["General", "Greetings", "Verbs"]);
    }

    #[test]
    fn test_cards_by_topic() {
        let module = sample();
        assert_eq!(module.cards_by_topic(None).len(), 4);
        assert_eq!(module.cards_by_topic(Some(ALL_TOPICS)).len(), 4);

        let greetings: Vec<_> = module
            .cards_by_topic(Some("Greetings"))
            .iter()
            .map(|c| c.question())
            .collect();
        assert_eq!(greetings, vec!["hola", "adiós"]);
        assert!(module.cards_by_topic(Some("Nope")).is_empty());
    }

    #[test]
    fn test_rename_topic() {
        let mut module = sample();
        assert_eq!(module.rename_topic("Greetings", "Phrases").unwrap(), 2);
        assert!(!module.topics().contains("Greetings"));
        assert!(module.topics().contains("Phrases"));
        assert!(module.rename_topic("Verbs", " ").is_err());
    }

    #[test]
    fn test_merge_topic() {
        let mut module = sample();
        assert_eq!(module.merge_topic("Verbs", "General").unwrap(), 1);
        assert!(!module.topics().contains("Verbs"));
        assert_eq!(module.cards_by_topic(Some("General")).len(), 2);
    }

    #[test]
    fn test_remove_card_at() {
        let mut module = sample();
        let removed = module.remove_card_at(1).unwrap();
        assert_eq!(removed.question(), "correr");
        assert_eq!(module.len(), 3);
        assert_eq!(module.card(1).unwrap().question(), "adiós");
        assert!(matches!(
            module.remove_card_at(10),
            Err(Error::CardIndexOutOfRange { index: 10, .. })
        ));
    }

    #[test]
    fn test_replace_card_at() {
        let mut module = sample();
        let old = module
            .replace_card_at(0, Card::with_text("buenos días", "good morning", "Greetings", "Other"))
            .unwrap();
        assert_eq!(old.question(), "hola");
        assert_eq!(module.card(0).unwrap().module_name(), "Spanish");
        assert!(module.replace_card_at(9, Card::with_text("q", "a", "", "")).is_err());
    }

    #[test]
    fn test_position_of() {
        let module = sample();
        let id = module.card(2).unwrap().id();
        assert_eq!(module.position_of(id), Some(2));
        assert_eq!(module.position_of(CardId::new()), None);
    }

    #[test]
    fn test_shuffle_keeps_cards() {
        let mut module = sample();
        let mut before: Vec<_> = module.cards().iter().map(|c| c.id()).collect();
        module.shuffle_with(&mut StdRng::seed_from_u64(7));
        let mut after: Vec<_> = module.cards().iter().map(|c| c.id()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_study_order_leaves_module_order() {
        let module = sample();
        let original: Vec<_> = module.cards().iter().map(|c| c.id()).collect();
        let order = module.study_order(Some("Greetings"), &mut StdRng::seed_from_u64(1));
        assert_eq!(order.len(), 2);
        let now: Vec<_> = module.cards().iter().map(|c| c.id()).collect();
        assert_eq!(original, now);
    }

    #[test]
    fn test_sync_card_modules() {
        let json = r#"[
            {"question":"q1","text_answer":"a1","module_name":"Bio"},
            {"question":"q2","text_answer":"a2"},
            {"question":"q3","text_answer":"a3","module_name":"Old"}
        ]"#;
        let cards: Vec<Card> = serde_json::from_str(json).unwrap();
        let mut module = Module::new("Bio");
        for card in cards {
            module.push_loaded(card);
        }
        assert_eq!(module.sync_card_modules(), 2);
        assert_eq!(module.sync_card_modules(), 0);
    }

    #[test]
    fn test_summary_changed() {
        let mut summary = MigrationSummary::default();
        assert!(!summary.changed());
        summary.record(&CardMigration {
            outcome: MigrationOutcome::Current,
            defaulted_module: false,
        });
        assert!(!summary.changed());
        summary.record(&CardMigration {
            outcome: MigrationOutcome::MarkedMissing,
            defaulted_module: false,
        });
        assert!(summary.changed());
        assert_eq!(summary.cards_checked, 2);
    }
}
