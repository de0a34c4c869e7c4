//! The real-time trading loop: tick scheduler, strategy components, exits,
//! settlement, and the single-owner state they all run on.

pub mod arb;
pub mod bets;
pub mod engine;
pub mod exits;
pub mod flash_crash;
pub mod leverage;
pub mod selector;
pub mod settlement;
pub mod state;

pub use arb::CompleteSetArbDetector;
pub use bets::{ArbPair, BinaryBet, PositionMeta};
pub use engine::{spawn_discovery, Engine, EngineHandle};
pub use exits::{BetExit, ExitPolicy};
pub use flash_crash::FlashCrashDetector;
pub use leverage::{LeverageExit, LeveragedPositionMgr};
pub use selector::BetSelector;
pub use settlement::{settle_due_arbs, settle_due_bets, Settlement};
pub use state::EngineState;
