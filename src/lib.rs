pub mod cashflow;
pub mod config;
pub mod finance;
pub mod loss;
pub mod sampling;
pub mod simulation;
pub mod stats;
