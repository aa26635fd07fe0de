#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Simulation and evaluation engine for pathway signal detection.
//!
//! A synthetic cohort carries a correlated expression shift in the genes of one
//! "truth" pathway. Every candidate pathway is then trained and scored on its own
//! gene subset so the truth pathway's detectability can be compared against the
//! background, across a range of cohort sizes.

pub mod auc;
pub mod catalog;
pub mod cohort;
pub mod config;
pub mod crossval;
pub mod detection;
pub mod evaluate;
pub mod logistic;
pub mod orchestrator;
pub mod output;
pub mod overlap;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod seeding;
pub mod standardize;
pub mod trainer;
pub mod types;
