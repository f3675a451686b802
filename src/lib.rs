//! Background engine of a multi-server monitoring system
//!
//! The engine samples host metrics of the local server on a schedule,
//! evaluates user-defined alert rules against the latest samples, notifies
//! through email, SMS and Slack, probes external services and sweeps old
//! data. Everything it persists goes through [`storage::StorageBackend`].

pub mod alerts;
pub mod collector;
pub mod config;
pub mod engine;
pub mod health;
pub mod notify;
pub mod remote;
pub mod retention;
pub mod scheduler;
pub mod storage;
pub mod util;
