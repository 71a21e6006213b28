//! Incremental RETE matching for Trellis.
//!
//! This crate provides:
//! - [`Rule`], [`Condition`] and [`Expr`] - Rule definitions and test expressions
//! - [`AlphaIndex`] - Shared single-fact condition memories
//! - [`BetaMemory`] and [`TokenArena`] - Hash-bucketed partial-match storage
//! - [`ReteNetwork`] - Network construction, propagation and rollback
//! - [`Agenda`] and [`ActivationList`] - Activation delivery
//! - [`check_stability`](ReteNetwork::check_stability) - Naive cross-checking
//! - [`Session`] - A fact store and network kept in step

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agenda;
pub mod alpha;
pub mod beta;
pub mod checker;
pub mod config;
mod drive;
pub mod expr;
pub mod join;
pub mod network;
pub mod pattern;
pub mod rule;
pub mod session;
pub mod token;

pub use agenda::{Activation, ActivationKey, ActivationList, Agenda, AgendaEvent};
pub use alpha::{AlphaId, AlphaIndex, AlphaNode, AlphaSignature};
pub use beta::BetaMemory;
pub use checker::{Divergence, MemoryLocation, StabilityReport};
pub use config::EngineConfig;
pub use expr::{BuiltinEvaluator, Evaluator, Expr, Op};
pub use join::{JoinId, JoinMode, JoinNode, Terminal};
pub use network::{NetworkStats, ReteNetwork, RuleHandle};
pub use pattern::{Bindings, Condition, ElementTest, SlotTest};
pub use rule::Rule;
pub use session::Session;
pub use token::{Side, Token, TokenArena, TokenId};
