//! Supported solver backends.

pub mod ampl;
pub mod gams;
pub mod neos;
