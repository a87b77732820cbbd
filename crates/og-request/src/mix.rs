//! Weighted operation mix
//!
//! Combines the configured suppliers into one stream: each `get` samples the
//! weighted distribution and delegates to the chosen supplier. A population
//! miss falls through to the caller, which counts it as a skip.

use crate::RequestSupplier;
use async_trait::async_trait;
use og_common::{HttpRequest, Result};
use og_supply::Supplier;
use parking_lot::Mutex;
use std::sync::Arc;

/// Mix-weighted aggregate over the configured suppliers
pub struct MixSupplier {
    suppliers: Vec<Arc<dyn RequestSupplier>>,
    chooser: Mutex<Supplier<usize>>,
}

impl MixSupplier {
    /// Build from `(supplier, weight)` pairs; weights must sum to a
    /// positive value
    pub fn new(choices: Vec<(Arc<dyn RequestSupplier>, f64)>) -> Result<Self> {
        let weights: Vec<(usize, f64)> = choices
            .iter()
            .enumerate()
            .map(|(i, (_, weight))| (i, *weight))
            .collect();
        Ok(Self {
            suppliers: choices.into_iter().map(|(s, _)| s).collect(),
            chooser: Mutex::new(Supplier::weighted(weights)?),
        })
    }
}

#[async_trait]
impl RequestSupplier for MixSupplier {
    async fn get(&self) -> Result<HttpRequest> {
        let index = self.chooser.lock().get();
        self.suppliers[index].get().await
    }

    fn stop(&self) {
        for supplier in &self.suppliers {
            supplier.stop();
        }
    }
}
