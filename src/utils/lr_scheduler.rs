//! Learning rate scheduler trait and implementations
//!
//! Schedulers adjust the learning rate once per epoch. The default for this
//! crate is [`InverseTimeDecay`], `lr = initial_lr / (1 + decay * epoch)`,
//! which decays quickly over the first few epochs and then flattens out.

/// Core trait for learning rate schedulers.
///
/// # Example
///
/// ```
/// use fashion_transformer::utils::lr_scheduler::{InverseTimeDecay, LRScheduler};
///
/// let mut scheduler = InverseTimeDecay::new(0.001, 0.1);
/// for _epoch in 0..3 {
///     let _lr = scheduler.get_lr();
///     // ... train one epoch with `_lr` ...
///     scheduler.step();
/// }
/// assert!(scheduler.get_lr() < 0.001);
/// ```
pub trait LRScheduler {
    /// Learning rate for the current epoch.
    fn get_lr(&self) -> f64;

    /// Advance the scheduler to the next epoch.
    ///
    /// Call once per epoch, at the end of the epoch.
    fn step(&mut self);

    /// Reset the scheduler to epoch 0.
    fn reset(&mut self);

    /// Zero-based index of the current epoch.
    fn epoch(&self) -> usize;
}

/// Constant learning rate.
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
    current_epoch: usize,
}

impl ConstantLR {
    pub fn new(lr: f64) -> Self {
        Self {
            lr,
            current_epoch: 0,
        }
    }
}

impl LRScheduler for ConstantLR {
    fn get_lr(&self) -> f64 {
        self.lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
    }

    fn epoch(&self) -> usize {
        self.current_epoch
    }
}

/// Inverse-time decay scheduler.
///
/// Formula: lr = initial_lr / (1 + decay * epoch)
///
/// With `decay = 0.1` the rate at epoch 10 is half the initial rate.
#[derive(Debug, Clone)]
pub struct InverseTimeDecay {
    initial_lr: f64,
    decay: f64,
    current_epoch: usize,
    current_lr: f64,
}

impl InverseTimeDecay {
    /// Creates a new inverse-time decay scheduler.
    ///
    /// # Arguments
    ///
    /// * `initial_lr` - Learning rate at epoch 0
    /// * `decay` - Decay coefficient (non-negative; 0 keeps the rate constant)
    pub fn new(initial_lr: f64, decay: f64) -> Self {
        Self {
            initial_lr,
            decay,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for InverseTimeDecay {
    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        self.current_lr = self.initial_lr / (1.0 + self.decay * self.current_epoch as f64);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }

    fn epoch(&self) -> usize {
        self.current_epoch
    }
}

/// Step decay learning rate scheduler.
///
/// Reduces the learning rate by `gamma` every `step_size` epochs.
///
/// Formula: lr = initial_lr * gamma^(epoch / step_size)
#[derive(Debug, Clone)]
pub struct StepDecay {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
    current_epoch: usize,
    current_lr: f64,
}

impl StepDecay {
    /// Creates a new step decay scheduler.
    ///
    /// # Panics
    ///
    /// Panics if `step_size` is zero.
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        assert!(step_size > 0, "step_size must be greater than zero");
        Self {
            initial_lr,
            step_size,
            gamma,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for StepDecay {
    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        let num_decays = self.current_epoch / self.step_size;
        self.current_lr = self.initial_lr * self.gamma.powi(num_decays as i32);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }

    fn epoch(&self) -> usize {
        self.current_epoch
    }
}

/// Exponential decay learning rate scheduler.
///
/// Formula: lr = initial_lr * gamma^epoch
#[derive(Debug, Clone)]
pub struct ExponentialDecay {
    initial_lr: f64,
    gamma: f64,
    current_epoch: usize,
    current_lr: f64,
}

impl ExponentialDecay {
    pub fn new(initial_lr: f64, gamma: f64) -> Self {
        Self {
            initial_lr,
            gamma,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for ExponentialDecay {
    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        self.current_lr = self.initial_lr * self.gamma.powi(self.current_epoch as i32);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }

    fn epoch(&self) -> usize {
        self.current_epoch
    }
}
