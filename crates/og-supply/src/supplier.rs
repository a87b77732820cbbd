//! Value suppliers
//!
//! A supplier produces one value each time it is asked. The variants form a
//! sealed set with a uniform `get` operation; composition happens in the
//! request producers, which thread the per-request context through.

use og_common::{Error, Result};
use rand::Rng;

/// A supplier of values of type `T`
#[derive(Debug, Clone)]
pub enum Supplier<T> {
    /// The same value forever
    Constant(T),
    /// Rotates deterministically through the list
    Cycle { values: Vec<T>, next: usize },
    /// Selects by cumulative weight
    Weighted { choices: Vec<(T, f64)>, total: f64 },
}

impl<T: Clone> Supplier<T> {
    pub fn constant(value: T) -> Self {
        Self::Constant(value)
    }

    /// A cycling supplier; the list must be non-empty
    pub fn cycle(values: Vec<T>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::configuration("cycle supplier needs at least one value"));
        }
        Ok(Self::Cycle { values, next: 0 })
    }

    /// A weighted random supplier; weights must be non-negative and sum to a
    /// positive value
    pub fn weighted(choices: Vec<(T, f64)>) -> Result<Self> {
        let mut total = 0.0;
        for (_, weight) in &choices {
            if *weight < 0.0 {
                return Err(Error::configuration("negative weight in weighted supplier"));
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(Error::configuration(
                "weighted supplier weights must sum to a positive value",
            ));
        }
        Ok(Self::Weighted { choices, total })
    }

    /// Produce the next value
    pub fn get(&mut self) -> T {
        self.get_with(&mut rand::thread_rng())
    }

    /// Produce the next value using the caller's RNG
    pub fn get_with<R: Rng>(&mut self, rng: &mut R) -> T {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Cycle { values, next } => {
                let value = values[*next].clone();
                *next = (*next + 1) % values.len();
                value
            }
            Self::Weighted { choices, total } => {
                let mut remaining = rng.gen_range(0.0..*total);
                for (value, weight) in choices.iter() {
                    if remaining < *weight {
                        return value.clone();
                    }
                    remaining -= weight;
                }
                // Floating-point accumulation can leave us a hair past the
                // final boundary.
                choices
                    .last()
                    .map(|(value, _)| value.clone())
                    .expect("weighted supplier has at least one choice")
            }
        }
    }
}

/// How a ranged supplier walks its interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    /// min, min+1, ..., max, min, ...
    Cycle,
    /// Uniformly random in [min, max]
    Random,
}

/// Integers in `[min, max]`, cycled or uniformly random
#[derive(Debug, Clone)]
pub struct RangedSupplier {
    min: u64,
    max: u64,
    mode: RangeMode,
    next: u64,
}

impl RangedSupplier {
    pub fn new(min: u64, max: u64, mode: RangeMode) -> Result<Self> {
        if min > max {
            return Err(Error::configuration(format!(
                "ranged supplier min {min} exceeds max {max}"
            )));
        }
        Ok(Self {
            min,
            max,
            mode,
            next: min,
        })
    }

    pub fn get(&mut self) -> u64 {
        self.get_with(&mut rand::thread_rng())
    }

    pub fn get_with<R: Rng>(&mut self, rng: &mut R) -> u64 {
        match self.mode {
            RangeMode::Cycle => {
                let value = self.next;
                self.next = if self.next == self.max {
                    self.min
                } else {
                    self.next + 1
                };
                value
            }
            RangeMode::Random => rng.gen_range(self.min..=self.max),
        }
    }
}
