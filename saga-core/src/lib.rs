//! Game-state engine for role-playing adventures narrated by an LLM.
//!
//! This crate provides:
//! - A typed world model (entities, statuses, quests, memories, party, rules)
//! - A lexer and reducer for the bracketed tags the narrator embeds in its story
//! - A context compiler that retrieves the relevant part of the world for each turn
//! - A tiered chronicle of summaries for long campaigns
//! - Save files, including older layouts
//!
//! # Quick Start
//!
//! ```ignore
//! use saga_core::{GameSession, SessionConfig, WorldData};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = WorldData::new("Wuxia", "Minh").with_goal(true);
//!     let mut session = GameSession::from_env(world, SessionConfig::new())?;
//!
//!     let opening = session.begin().await?;
//!     println!("{}", opening.story);
//!
//!     let turn = session.player_action("I follow the river downstream").await?;
//!     println!("{}", turn.story);
//!
//!     session.save("my_saga.json").await?;
//!     Ok(())
//! }
//! ```

pub mod archetype;
pub mod chronicle;
pub mod config;
pub mod entity;
mod lenient;
pub mod memory;
pub mod narrator;
pub mod persist;
pub mod quest;
pub mod rules;
pub mod session;
pub mod state;
pub mod status;
pub mod tags;
pub mod testing;
pub mod world;

// Primary public API
pub use config::{ActionLexicon, SessionConfig};
pub use narrator::ModelClient;
pub use persist::PersistError;
pub use rules::{CustomRule, RuleBook, RuleDiff};
pub use session::{FailedAction, GameSession, SessionError, TurnError, TurnOutcome, TurnPhase};
pub use state::GameState;
pub use testing::{MockModel, TestHarness};
pub use world::WorldData;
