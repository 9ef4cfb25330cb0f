//! Agent transport, intake, and the turn decision engine.
//!
//! # Architecture
//!
//! A turn flows through three stages:
//!
//! 1. [`intake`] calls the customer-facing agent and packages its reply,
//!    the parsed state metadata, and the extracted requirements into an
//!    [`clerky_core::exchange::IntakePacket`].
//! 2. [`engine`] asks the orchestrator agent for a turn decision and falls
//!    back to deterministic routing whenever that reply is unusable. It
//!    enforces the inventory-first gate, the insurance preconditions, and
//!    the per-specialist call caps.
//! 3. [`session`] carries the resulting state and history across turns.
//!
//! All remote agents sit behind the [`channel::AgentChannel`] trait; the
//! HTTP implementation lives in [`gateway`] and a scripted one for tests in
//! [`stub`].
//!
//! # Safety Principle
//!
//! A turn never fails. Transport errors, malformed agent output, and policy
//! violations all degrade to System-labeled entries and a usable customer
//! reply.

pub mod channel;
pub mod engine;
pub mod gateway;
pub mod intake;
pub mod session;
pub mod specialists;
pub mod stub;
