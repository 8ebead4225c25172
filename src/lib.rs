//! Declarative data-access contracts.
//!
//! Routes and schemas are declared up front (usually from a manifest); each
//! route then becomes a validated, cached remote call whose response is mapped
//! into application state. [`contract::Contract`] is the entry point.

pub mod cache;
pub mod config;
pub mod contract;
pub mod error;
pub mod infra;
pub mod mock;
pub mod routing;
pub mod schema;
pub mod state;
pub mod transport;
