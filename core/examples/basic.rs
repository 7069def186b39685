//! Basic circuit breaker, retry and stream usage example
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see the library logs.

use kb_resilience::{
    CircuitBreaker, CircuitBreakerRegistry, ResilientCaller, RetryPolicy, StreamEvent,
    StreamManager,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let registry = CircuitBreakerRegistry::new();
    let circuit = registry.get_or_build(
        CircuitBreaker::builder("payment_api")
            .max_failures(3)
            .open_timeout(Duration::from_secs(1))
            .max_half_open_requests(2)
            .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
            .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
            .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name)),
    );

    println!("Initial state: {}\n", circuit.state());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit
            .execute(|| async move { Ok::<_, String>(format!("Payment {}", i)) })
            .await
        {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit
            .execute(|| async move { Err::<String, _>(format!("Payment failed {}", i)) })
            .await
        {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state());

    println!("--- Attempting call while open ---");
    match circuit
        .execute(|| async { Ok::<_, String>("Should be rejected") })
        .await
    {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Waiting for recovery ---");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    for i in 1..=2 {
        let result = circuit
            .execute(|| async move { Ok::<_, String>(format!("Probe {}", i)) })
            .await;
        println!("{:?} -> state {}", result, circuit.state());
    }
    println!();

    println!("--- Retrying through the breaker ---");
    let caller = ResilientCaller::new(
        registry.get("inventory_api"),
        RetryPolicy {
            base_delay: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let cancel = CancellationToken::new();
    let result = caller
        .call(&cancel, |attempt| async move {
            if attempt < 2 {
                Err(format!("timeout on attempt {}", attempt))
            } else {
                Ok("inventory reserved")
            }
        })
        .await;
    println!("Result: {:?}\n", result);

    println!("--- Streaming events ---");
    let streams = StreamManager::new();
    streams.append_event("session-1", "msg-1", StreamEvent::new("thinking", "Looking up docs"));
    streams.append_event("session-1", "msg-1", StreamEvent::new("answer", "Found it").finished());

    let (events, next) = streams.get_events("session-1", "msg-1", 0);
    for event in &events {
        println!("[{}] {}", event.event_type, event.content);
    }
    println!("Resume from offset {}", next);
    println!("Stats: {:?}\n", streams.stats());
    streams.close().await;

    println!("--- Registry snapshot ---");
    for stats in registry.all_stats() {
        println!("{:?}", stats);
    }

    // Give the fire-and-forget observers a moment to print
    tokio::time::sleep(Duration::from_millis(50)).await;
}
