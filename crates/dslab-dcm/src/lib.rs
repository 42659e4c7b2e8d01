#![doc = include_str!("../readme.md")]

pub mod core;
pub mod data_center_manager;
pub mod solver;
