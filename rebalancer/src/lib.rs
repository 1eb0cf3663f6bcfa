//! kitebal-rebalancer: live portfolio rebalancer for Zerodha Kite.
//!
//! Reads a target basket from a JSON file, fetches holdings, positions and
//! prices from Kite Connect, computes the corrective orders, and drives the
//! portfolio toward target weights through repeated plan/execute iterations
//! bounded by NSE market hours, with an audit trail.

pub mod audit;
pub mod basket;
pub mod config;
pub mod confirm;
pub mod convergence;
pub mod error;
pub mod executor;
pub mod hours;
pub mod planner;
pub mod snapshot;
