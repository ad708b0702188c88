//! HTTP surface and process wiring for vaultlock (C9, spec §4, §6):
//! request dispatch to the bank orchestrator, state-query endpoints, the
//! backend switch endpoint, and the health/actuator contract.

pub mod api;
pub mod config;
pub mod error;
pub mod registry;
