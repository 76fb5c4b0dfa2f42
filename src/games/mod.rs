//! Built-in games and the mapper registry.

pub mod types;
pub mod mapper;
pub mod dice;
pub mod crash;
pub mod mines;
pub mod coinflip;

pub use types::*;
pub use mapper::{mapper_for_rules, MapperRegistry, OutcomeMapper};
pub use dice::DiceMapper;
pub use crash::CrashMapper;
pub use mines::MinesMapper;
pub use coinflip::CoinFlipMapper;
