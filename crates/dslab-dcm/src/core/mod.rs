//! Data center model, placement ledger, placement strategies and migration control.

pub mod application;
pub mod common;
pub mod config;
pub mod data_center;
pub mod events;
pub mod load_model;
pub mod migration_controller;
pub mod migration_stats;
pub mod performance_model;
pub mod physical_machine;
pub mod placement;
pub mod placement_strategies;
pub mod placement_strategy;
pub mod power_model;
pub mod resource;
pub mod vm;
