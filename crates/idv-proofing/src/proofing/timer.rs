use std::collections::BTreeMap;
use std::future::Future;

use tokio::time::Instant;

/// Collects wall-clock milliseconds per named stage.
#[derive(Debug, Default, Clone)]
pub struct Timer {
    results: BTreeMap<String, f64>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn time<F, T>(&mut self, name: &str, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = future.await;
        self.record(name, started);
        output
    }

    pub fn record(&mut self, name: &str, started: Instant) {
        let millis = started.elapsed().as_secs_f64() * 1000.0;
        let rounded = (millis * 100.0).round() / 100.0;
        *self.results.entry(name.to_string()).or_insert(0.0) += rounded;
    }

    pub fn results(&self) -> &BTreeMap<String, f64> {
        &self.results
    }

    pub fn into_results(self) -> BTreeMap<String, f64> {
        self.results
    }
}
