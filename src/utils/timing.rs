//! Wall-clock timing for CLI operations.

use log::{debug, info};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("⏱️ Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        debug!(
            "📍 {} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
        self.checkpoints.push((checkpoint_name.to_string(), now));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the total and each checkpoint segment, returns the total.
    pub fn finish(self) -> Duration {
        let total = self.start_time.elapsed();
        info!("🕐 {} completed in {}ms", self.operation_name, total.as_millis());
        let mut last = self.start_time;
        for (name, at) in &self.checkpoints {
            info!("   └─ {}: {}ms", name, at.duration_since(last).as_millis());
            last = *at;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_covers_checkpoints() {
        let mut timer = Timer::start("sweep");
        std::thread::sleep(Duration::from_millis(5));
        timer.checkpoint("fetched");
        let total = timer.finish();
        assert!(total >= Duration::from_millis(5));
    }
}
