//! Shared utilities for the transformer implementation
//!
//! This module provides random number generation, activation functions and
//! learning-rate schedules used across the layers and the training driver.

pub mod activations;
pub mod lr_scheduler;
pub mod rng;

pub use activations::{relu, relu_backward, softmax_rows, softmax_rows_backward};
pub use rng::SimpleRng;
