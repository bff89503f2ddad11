#![allow(unused_assignments)]

//! # swap-orchestrator
//!
//! Session and process orchestration for BTC/XMR atomic swaps.
//!
//! The swap protocol itself runs in an external engine. This crate starts,
//! watches and tears down the processes around it, keeps one session per
//! buyer swap plus a single maker session, turns the engine's events into
//! a forward-only status progression, and persists just enough to pick a
//! swap up again after a crash.
//!
//! ## Features
//!
//! - **Buyer sessions**: one wallet-RPC daemon and one engine call per swap, at most one swap at a time
//! - **Maker session**: singleton engine process with generated config, seed handling and self-restart
//! - **Error policy**: per-kind resume, warn or fail decisions for engine-reported failures
//! - **Crash cleanup**: every spawned pid is persisted and killed on the next start
//! - **Proxy gating**: nothing that talks to the network starts before the SOCKS proxy is reachable
//!
//! ## Quick Start
//!
//! ```no_run
//! use swap_orchestrator::{BuyRequest, BuyerSessionManager, CommandEngine, Context, Parser};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), swap_orchestrator::Error> {
//! let settings = Parser::new().load_or_default(Parser::default_settings_path())?;
//! let engine = Arc::new(CommandEngine::new(settings.binary(swap_orchestrator::engine::ENGINE_BINARY)));
//! let (ctx, _lock) = Context::open(settings)?;
//!
//! let buyer = BuyerSessionManager::new(ctx, engine);
//! let session = buyer
//!     .start_buy(BuyRequest {
//!         xmr_address: "4...".to_string(),
//!         counterparty: "/onion3/example:9939/p2p/12D3Koo...".to_string(),
//!         refund_address: "bc1q...".to_string(),
//!         account_index: 0,
//!     })
//!     .await?;
//! println!("started swap {}", session.swap_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - Engine calls block, so each buyer swap drives the engine on a blocking thread
//! - Engine events are applied by an async task per session
//! - Shared tables (pid table, registry, running sessions) are internally locked
//!   and never held across an await

pub mod buyer;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit;
pub mod maker;
pub mod price;
pub mod process;
pub mod proxy;
pub mod registry;
pub mod swap;

// Re-export commonly used types
pub use buyer::{BuyRequest, BuyerSessionManager, SessionReport};
pub use config::{Network, Parser, Settings};
pub use context::Context;
pub use engine::{CommandEngine, Engine};
pub use error::{Error, Result};
pub use exit::ExitAction;
pub use maker::{MakerSessionManager, MakerSnapshot, MakerUpdate};
pub use price::PriceFeed;
pub use process::{ProcessRole, Supervisor};
pub use swap::{ErrorKind, ErrorPolicy, Role, StateTracker, SwapSession, SwapStatus};
