//! Deterministic bingo card generation.
//!
//! A card is seeded from the configured prefix plus the player's identity, so
//! a player who reconnects is dealt the same card again.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of rows and columns on a card.
pub const CARD_SIZE: usize = 4;

/// Seed settings for card generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Prepended to the identity before seeding the generator
    pub prefix: String,
}

/// Game configuration: the seed prefix and the pool of candidate cell texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub seed: SeedConfig,
    /// Candidate cell texts, drawn without replacement
    #[serde(default)]
    pub bingo: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: SeedConfig {
                prefix: "bingo".to_string(),
            },
            bingo: Vec::new(),
        }
    }
}

/// A single square on a card.
///
/// `text` never changes after generation; `is_checked` is toggled through
/// the `updateCardState` operation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    text: String,
    pub is_checked: bool,
}

impl Cell {
    fn new(text: String) -> Self {
        Self {
            text,
            is_checked: false,
        }
    }

    /// A pre-satisfied cell used once the text pool runs dry.
    fn free() -> Self {
        Self {
            text: String::new(),
            is_checked: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A 4x4 grid of cells, addressed as `card[col][row]`.
///
/// Serializes as a nested array so clients can index it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Card {
    cells: [[Cell; CARD_SIZE]; CARD_SIZE],
}

impl Card {
    /// Generates the card for `identity`.
    ///
    /// Walks the grid in row-major order, each time removing a uniformly
    /// chosen entry from what is left of the pool. When the pool is exhausted
    /// the remaining cells are empty and already checked. Never fails.
    pub fn generate(config: &GameConfig, identity: &str) -> Self {
        let mut rng = seeded_rng(&config.seed.prefix, identity);
        let mut pool = config.bingo.clone();

        let cells = std::array::from_fn(|_| {
            std::array::from_fn(|_| {
                if pool.is_empty() {
                    Cell::free()
                } else {
                    let index = rng.gen_range(0..pool.len());
                    Cell::new(pool.remove(index))
                }
            })
        });

        Self { cells }
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        self.cells.get(col).and_then(|column| column.get(row))
    }

    /// Sets the checked flag of one cell.
    ///
    /// Returns `false` and leaves the card untouched when either index is
    /// out of range.
    pub fn set_checked(&mut self, col: usize, row: usize, is_checked: bool) -> bool {
        match self.cells.get_mut(col).and_then(|column| column.get_mut(row)) {
            Some(cell) => {
                cell.is_checked = is_checked;
                true
            }
            None => false,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten()
    }
}

fn seeded_rng(prefix: &str, identity: &str) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(identity.as_bytes());
    ChaCha8Rng::from_seed(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config_with_pool(size: usize) -> GameConfig {
        GameConfig {
            seed: SeedConfig {
                prefix: "test-prefix".to_string(),
            },
            bingo: (0..size).map(|i| format!("square {i}")).collect(),
        }
    }

    #[test]
    fn test_same_identity_yields_same_card() {
        let config = config_with_pool(30);
        assert_eq!(Card::generate(&config, "alice"), Card::generate(&config, "alice"));
    }

    #[test]
    fn test_prefix_and_identity_change_the_card() {
        let config = config_with_pool(30);
        let alice = Card::generate(&config, "alice");
        let bob = Card::generate(&config, "bob");
        assert_ne!(alice, bob);

        let mut other_prefix = config.clone();
        other_prefix.seed.prefix = "another-prefix".to_string();
        assert_ne!(alice, Card::generate(&other_prefix, "alice"));
    }

    #[test]
    fn test_full_pool_draws_without_replacement() {
        let config = config_with_pool(16);
        let card = Card::generate(&config, "carol");

        let texts: HashSet<&str> = card.cells().map(Cell::text).collect();
        assert_eq!(texts.len(), 16);
        assert!(card.cells().all(|cell| !cell.is_checked));
        assert!(texts.iter().all(|text| config.bingo.iter().any(|t| t == text)));
    }

    #[test]
    fn test_short_pool_fills_with_free_cells() {
        for size in [0, 1, 7, 15] {
            let config = config_with_pool(size);
            let card = Card::generate(&config, "dave");

            let free: Vec<&Cell> = card
                .cells()
                .filter(|cell| cell.text().is_empty())
                .collect();
            assert_eq!(free.len(), 16 - size, "pool size {size}");
            assert!(free.iter().all(|cell| cell.is_checked));

            let checked = card.cells().filter(|cell| cell.is_checked).count();
            assert_eq!(checked, 16 - size, "only free cells start checked");
        }
    }

    #[test]
    fn test_free_cells_come_last_in_row_major_order() {
        let config = config_with_pool(5);
        let card = Card::generate(&config, "erin");
        let texts: Vec<&str> = card.cells().map(Cell::text).collect();
        assert!(texts[..5].iter().all(|t| !t.is_empty()));
        assert!(texts[5..].iter().all(|t| t.is_empty()));
    }

    #[test]
    fn test_set_checked_bounds() {
        let mut card = Card::generate(&config_with_pool(16), "frank");
        let before = card.clone();

        assert!(!card.set_checked(5, 0, true));
        assert!(!card.set_checked(0, 4, true));
        assert_eq!(card, before);

        assert!(card.set_checked(3, 2, true));
        assert_eq!(card.cell(3, 2).map(|c| c.is_checked), Some(true));
    }

    #[test]
    fn test_card_serializes_as_nested_arrays() {
        let card = Card::generate(&config_with_pool(0), "gina");
        let value = serde_json::to_value(&card).unwrap();

        let columns = value.as_array().unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].as_array().unwrap().len(), 4);
        assert_eq!(columns[0][0], serde_json::json!({ "text": "", "isChecked": true }));
    }

    #[test]
    fn test_game_config_accepts_camel_case_keys() {
        let config: GameConfig = serde_json::from_value(serde_json::json!({
            "seed": { "prefix": "abc" },
            "bingo": ["one", "two"]
        }))
        .unwrap();
        assert_eq!(config.seed.prefix, "abc");
        assert_eq!(config.bingo, vec!["one", "two"]);
    }
}
