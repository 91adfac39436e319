//! Health vitals computed by diffing consecutive results of a cache.

use std::time::Duration;

use statwatch_types::MonitorConfig;

use crate::result::StatResult;

/// Computes a result's [`Vitals`](statwatch_types::Vitals) from the cache's
/// previous result.
///
/// Called by the batch processor only when a previous result exists. The
/// previous result may itself have carried an error.
pub trait VitalsCalculator: Send + Sync {
    fn compute(&self, current: &mut StatResult, previous: &StatResult, config: &MonitorConfig);
}

impl<F> VitalsCalculator for F
where
    F: Fn(&mut StatResult, &StatResult, &MonitorConfig) + Send + Sync,
{
    fn compute(&self, current: &mut StatResult, previous: &StatResult, config: &MonitorConfig) {
        self(current, previous, config)
    }
}

/// Leaves vitals untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVitals;

impl VitalsCalculator for NoVitals {
    fn compute(&self, _: &mut StatResult, _: &StatResult, _: &MonitorConfig) {}
}

/// Vitals from the byte counters and load average a cache reports.
///
/// `kbps_out` is the out-byte delta over the time between the two polls.
/// A counter that went backwards (cache restart) yields zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteCounterVitals;

/// Raw stat carrying the one-minute load average.
pub const LOAD_AVG_STAT: &str = "load_avg";

impl VitalsCalculator for ByteCounterVitals {
    fn compute(&self, current: &mut StatResult, previous: &StatResult, _: &MonitorConfig) {
        let bytes_out = current.precomputed.out_bytes;
        let previous_bytes = previous.precomputed.out_bytes;

        current.vitals.bytes_out = bytes_out;
        current.vitals.max_kbps_out = current.precomputed.max_kbps;
        if let Some(load) = current.stats.get(LOAD_AVG_STAT).and_then(|v| v.as_f64()) {
            current.vitals.load_avg = load;
        }

        let elapsed = current
            .time
            .duration_since(previous.time)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        current.vitals.kbps_out = if elapsed > 0.0 && previous_bytes > 0 {
            let bits = bytes_out.saturating_sub(previous_bytes) as f64 * 8.0;
            (bits / 1000.0 / elapsed) as u64
        } else {
            0
        };
    }
}
