//! SkyMerge Environment Abstraction Layer
//!
//! This crate isolates the two things the fusion core needs from the outside
//! world so that the same pipeline runs in **Production** (system clock, HTTP)
//! and **Simulation** (virtual clock, scripted feed):
//!
//! - Time (`system_time()`, `unix_now()`) used for ages and cache TTLs
//! - The external military-aircraft data source (`lookup_hex()`, `fetch_list()`)
//!
//! # Example
//!
//! ```ignore
//! use skymerge_env::{FusionContext, MilitaryFeed, SystemContext, HttpMilitaryFeed};
//!
//! async fn classify<Ctx: FusionContext, Feed: MilitaryFeed>(ctx: &Ctx, feed: &Feed) {
//!     let now = ctx.unix_now();
//!     match feed.lookup_hex("AE1234").await {
//!         Ok(lookup) => println!("{} military={:?} at {}", lookup.hex, lookup.military, now),
//!         Err(e) => eprintln!("feed unavailable: {}", e),
//!     }
//! }
//! ```

mod context;
mod error;
mod feed;
mod http_impl;
mod system_impl;
mod types;

pub use context::FusionContext;
pub use error::EnvError;
pub use feed::MilitaryFeed;
pub use http_impl::HttpMilitaryFeed;
pub use system_impl::SystemContext;
pub use types::{HexLookup, HexResponse, ListResponse, MilitaryListing};
