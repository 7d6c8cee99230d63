//! # dhcp6lease
//!
//! A DHCPv6 server library implementing RFC 3315 (DHCPv6) and RFC 3646
//! (DNS configuration options).
//!
//! ## Features
//!
//! - Full client/server exchange: SOLICIT, ADVERTISE, REQUEST, RENEW, REBIND,
//!   RELEASE, DECLINE, CONFIRM, INFORMATION-REQUEST, REPLY
//! - Rapid Commit (two-message exchange)
//! - Non-temporary (IA_NA) and temporary (IA_TA) address bindings
//! - Relay agent support (RELAY-FORW / RELAY-REPL, nested relays)
//! - Option Request filtering
//! - Pluggable address policy and vendor option decoders
//! - Rate limiting per source address
//! - Async/await with Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhcp6lease::{Config, Dhcp6Server};
//!
//! #[tokio::main]
//! async fn main() -> dhcp6lease::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let server = Dhcp6Server::new(config).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Config`] - Server configuration (DUID, address pool, lifetimes, DNS)
//! - [`Dhcp6Server`] - UDP listener on port 547
//! - [`Dhcp6Engine`] - Validates messages and builds replies
//! - [`LeaseManager`] - Lease operations over the IA_NA and IA_TA registries
//! - [`ClientBindingRegistry`] - Thread-safe DUID/IAID to address bindings
//! - [`Message`] - DHCPv6 message framing
//! - [`Dhcp6Option`] - DHCPv6 option types per RFC 3315 and RFC 3646
//! - [`OptionRegistry`] - Option stream decoding and vendor decoders

pub mod binding;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod lease;
pub mod message;
pub mod options;
pub mod server;

pub use binding::{ClientBinding, ClientBindingRegistry};
pub use codec::{OpaqueVendorDecoder, OptionRegistry, StandardVendorDecoder, VendorDecoder};
pub use config::Config;
pub use engine::{Dhcp6Engine, RequestContext, UnknownMessageHandler};
pub use error::{Error, Result};
pub use lease::{IaKind, LeaseManager, LeasePolicy, Lifetimes, LinearPool};
pub use message::{Framing, Message, MessageType};
pub use options::{Dhcp6Option, Duid, OptionContainer, StatusCode};
pub use server::Dhcp6Server;
