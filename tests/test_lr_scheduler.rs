//! Tests for learning rate schedulers
//!
//! This file tests all LRScheduler implementations:
//! - ConstantLR: fixed rate
//! - InverseTimeDecay: lr0 / (1 + decay * epoch)
//! - StepDecay: step-based decay with gamma factor
//! - ExponentialDecay: continuous exponential decay

use approx::assert_relative_eq;
use fashion_transformer::utils::lr_scheduler::{
    ConstantLR, ExponentialDecay, InverseTimeDecay, LRScheduler, StepDecay,
};

// ============================================================================
// ConstantLR Tests
// ============================================================================

#[cfg(test)]
mod constant_tests {
    use super::*;

    #[test]
    fn test_constant_never_changes() {
        let mut scheduler = ConstantLR::new(0.01);
        for epoch in 0..5 {
            assert_eq!(scheduler.epoch(), epoch);
            assert_eq!(scheduler.get_lr(), 0.01);
            scheduler.step();
        }
    }
}

// ============================================================================
// InverseTimeDecay Tests
// ============================================================================

#[cfg(test)]
mod inverse_time_tests {
    use super::*;

    #[test]
    fn test_inverse_time_formula() {
        let mut scheduler = InverseTimeDecay::new(0.001, 0.1);
        assert_eq!(scheduler.get_lr(), 0.001);

        for epoch in 1..=5 {
            scheduler.step();
            assert_relative_eq!(
                scheduler.get_lr(),
                0.001 / (1.0 + 0.1 * epoch as f64),
                epsilon = 1e-15
            );
        }
    }

    #[test]
    fn test_inverse_time_is_monotonic() {
        let mut scheduler = InverseTimeDecay::new(0.1, 0.5);
        let mut previous = scheduler.get_lr();
        for _ in 0..20 {
            scheduler.step();
            assert!(scheduler.get_lr() < previous);
            assert!(scheduler.get_lr() > 0.0);
            previous = scheduler.get_lr();
        }
    }

    #[test]
    fn test_inverse_time_reset() {
        let mut scheduler = InverseTimeDecay::new(0.01, 0.1);
        scheduler.step();
        scheduler.step();
        scheduler.reset();
        assert_eq!(scheduler.epoch(), 0);
        assert_eq!(scheduler.get_lr(), 0.01);
    }
}

// ============================================================================
// StepDecay Tests
// ============================================================================

#[cfg(test)]
mod step_decay_tests {
    use super::*;

    #[test]
    fn test_step_decay_before_first_step() {
        let mut scheduler = StepDecay::new(0.1, 3, 0.5);
        for _ in 0..2 {
            scheduler.step();
            assert_eq!(scheduler.get_lr(), 0.1);
        }
    }

    #[test]
    fn test_step_decay_multiple_steps() {
        let mut scheduler = StepDecay::new(0.1, 3, 0.5);
        for _ in 0..3 {
            scheduler.step();
        }
        assert_relative_eq!(scheduler.get_lr(), 0.05, epsilon = 1e-12);
        for _ in 0..3 {
            scheduler.step();
        }
        assert_relative_eq!(scheduler.get_lr(), 0.025, epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_step_decay_zero_step_size_panics() {
        StepDecay::new(0.1, 0, 0.5);
    }
}

// ============================================================================
// ExponentialDecay Tests
// ============================================================================

#[cfg(test)]
mod exponential_decay_tests {
    use super::*;

    #[test]
    fn test_exponential_decay_formula() {
        let mut scheduler = ExponentialDecay::new(0.1, 0.9);
        for epoch in 1..=4 {
            scheduler.step();
            assert_relative_eq!(scheduler.get_lr(), 0.1 * 0.9f64.powi(epoch), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_exponential_decay_reset() {
        let mut scheduler = ExponentialDecay::new(0.1, 0.5);
        scheduler.step();
        scheduler.reset();
        assert_eq!(scheduler.get_lr(), 0.1);
    }
}
