//! Callbridge SDK - handles and host objects shared across the boundary
//!
//! This crate provides the minimal types native modules and hosts agree on
//! without depending on the dispatch engine:
//!
//! - [`Handle`] / [`HandleTable`]: opaque, generation-checked handles naming
//!   native state
//! - [`CallbackKind`]: the closed set of callback shapes
//! - host object traits ([`CommandSender`], [`Player`], [`Event`],
//!   [`CommandContext`], [`SuggestionSink`])
//! - [`NativeError`] / [`BridgeResult`]
//!
//! # Example
//!
//! ```ignore
//! use callbridge_sdk::{ArgumentMap, CommandContext};
//!
//! let args = ArgumentMap::new("/tp alice").with("target", "alice");
//! let ctx: &dyn CommandContext = &args;
//! assert_eq!(ctx.get_string("target")?, "alice");
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod handle;
pub mod host;
pub mod kind;
pub mod value;

pub use context::{ArgumentMap, CommandContext};
pub use error::{BridgeResult, NativeError};
pub use handle::{Handle, HandleTable};
pub use host::{CommandSender, Event, Player, Suggestion, SuggestionEntry, SuggestionSink};
pub use kind::CallbackKind;
pub use value::{ArgValue, FromArg};
