//! The train ticket reservation engine: domain model, persistence-backed
//! stores, the booking/query orchestrator, and the line-oriented command
//! dispatcher that drives them.

pub mod booking;
pub mod catalog;
pub mod cli;
pub mod dispatcher;
pub mod model;
pub mod orders;
pub mod planner;
pub mod seat;
pub mod users;

pub use booking::{BuyOutcome, Engine};
pub use cli::CliArgs;
pub use dispatcher::Dispatcher;
pub use planner::{SortBy, TicketInfo};
