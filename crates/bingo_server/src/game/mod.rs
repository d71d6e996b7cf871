//! Cards and the operations that play them.

pub mod card;
pub mod operations;

pub use card::{Card, Cell, GameConfig, SeedConfig, CARD_SIZE};
pub use operations::BingoOperations;
