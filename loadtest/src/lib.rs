//! This is a load generation library which runs simulated users against a product catalog
//! service.
//!
//! Every simulated user runs a [`Scenario`]: a weighted mix of [`Task`]s, optionally preceded by
//! a seeding step that writes baseline products. The predefined scenarios are listed in
//! [`ScenarioKind`]:
//!
//! - *mixed*: reads and writes at a ratio of 3:1, with seeding.
//! - *read_only*: reads of the seeded products only.
//! - *write_only*: writes with strictly increasing identifiers per user.
//! - *search*: product searches with an occasional health check, for the search service.
//!
//! Each response is classified into an [`Outcome`] by a total [`Check`], and
//! [`run`](runner::run) aggregates the outcomes per request name into a [`Report`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod healthcheck;
pub mod http;
pub mod observability;
pub mod product;
pub mod request;
pub mod runner;
pub mod scenario;
pub mod stats;

pub use crate::http::HttpRemote;
pub use crate::product::Product;
pub use crate::request::{Check, Outcome, Request};
pub use crate::runner::{Report, UserGroup, WaitTime, run};
pub use crate::scenario::{Scenario, ScenarioKind, Task};
