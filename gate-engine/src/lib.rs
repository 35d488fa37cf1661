//! Gate Engine Library
//!
//! A short-horizon decision engine for A-shares: market snapshots, sector
//! metrics and bar series go in, an EXECUTE / PROBE / REJECT decision with a
//! full audit trail comes out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       gate-engine (Rust Service)                     │
//! │                                :4460                                 │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  macro_filter ─► rotation ─► selector ─► signal ─► risk ─► sentry     │
//! │        ▲             ▲           ▲          ▲        ▲        │      │
//! │        └─────────────┴───────────┴──── indicators ───┘        │      │
//! │                                                               ▼      │
//! │                         pipeline::Orchestrator ─► Decision          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Veto chain
//! - Every stage can end the evaluation with a `"{stage}:{condition}"` reason
//! - Stages 1-5 are pure functions of their inputs, safe to run in parallel
//! - The sentry is the only shared mutable state, behind one lock
//!
//! ## Sizing
//! - Risk-based share count, rounded to the 100-share lot
//! - PROBE (macro soft failure, low emotion score) and sector decay shrink it
//! - Position and portfolio exposure caps clamp it; zero shares is a rejection

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod error;
pub mod indicators;
pub mod macro_filter;
pub mod pipeline;
pub mod risk;
pub mod rotation;
pub mod routes;
pub mod selector;
pub mod sentry;
pub mod signal;

pub use error::{GateError, GateResult};
pub use pipeline::{Candidate, Decision, Evaluation, Orchestrator, Stage, TradeProposal};
pub use routes::{build_router, AppState};
pub use sentry::{Sentry, SentryCheck, SentrySessionState, SentryState, TradeOutcome};
