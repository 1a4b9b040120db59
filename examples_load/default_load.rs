use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use secure_log_sink::fanout::FanOutSink;
use secure_log_sink::init::{install_tracing_bridge, LayerConfig};
use secure_log_sink::noop_sink::NoopSink;
use secure_log_sink::redaction::{RedactingSink, RedactionConfig};
use secure_log_sink::LogSink;

/// Pushes events through the bridge, redaction and fan-out with no I/O, to
/// measure the overhead of the pipeline itself.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let router: Arc<dyn LogSink> = Arc::new(FanOutSink::new(vec![Arc::new(NoopSink), Arc::new(NoopSink)]));
    let sink = Arc::new(RedactingSink::new(router, RedactionConfig::standard()?));
    let bridge = install_tracing_bridge(sink, LayerConfig::default())?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, api_token = "t0k3n", "default load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "default config: sent {} events in {:?} (~{:.0} ev/s), dropped {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        bridge.dropped_events.load(Ordering::Relaxed)
    );

    // Give background task a little time to drain the channel
    sleep(Duration::from_secs(2)).await;
    Ok(())
}
