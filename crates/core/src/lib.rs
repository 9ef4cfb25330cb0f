//! Clerky Core - conversation state and orchestration policy
//!
//! This crate holds the deterministic heart of the clerky retail assistant:
//! the conversation state model, the requirement/detail extractors, the
//! tolerant parsers for semi-structured agent output, and the normalizers
//! that turn raw specialist replies into customer-safe text.
//!
//! # Architecture
//!
//! Everything here is a pure function or a plain data type. The crate has no
//! async runtime and no network dependency; the agent transport and the
//! decision engine that drive these types live in `clerky-agents`.
//!
//! # Key Types
//!
//! - `ConversationState` / `IterationCounters` - per-session state threaded
//!   through every turn by the caller (see `state` module)
//! - `IntakePacket` / `OrchestratorResult` - the wire shapes exchanged with
//!   the opaque agents (see `exchange` module)
//! - `InventoryCheckResult` - the internal-inventory outcome, with best-effort
//!   synthesis from free text (see `inventory` module)
//!
//! # Safety Principle
//!
//! Agent output is never trusted to be well-formed. Every parser in this
//! crate is total: malformed input yields a default-filled value, never an
//! error that could abort a customer turn.

pub mod config;
pub mod errors;
pub mod exchange;
pub mod extract;
pub mod inventory;
pub mod metadata;
pub mod respond;
pub mod state;
pub mod trace;
