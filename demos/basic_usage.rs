//! Basic thread pool usage example
//!
//! Demonstrates round-robin and targeted assignment, failure capture,
//! cancellation and termination.
//!
//! Run with: cargo run --example basic_usage

use rust_job_system::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Rust Job System - Basic Usage Example ===\n");

    let pool = ThreadPool::with_config(ThreadPoolConfig::new(4).with_thread_name_prefix("demo"))?;
    println!("1. Started thread pool with {} threads", pool.num_threads());

    println!("\n2. Round-robin tasks:");
    for i in 0..8 {
        pool.assign_task(move || {
            println!(
                "  Task {} executing on {:?}",
                i,
                thread::current().name().unwrap_or("unnamed")
            );
            thread::sleep(Duration::from_millis(20));
        });
    }

    println!("\n3. Targeted tasks keep their order on worker 2:");
    for step in ["load", "decode", "upload"] {
        pool.assign_task_to(2, move || println!("  worker 2: {}", step));
    }

    println!("\n4. A failing task does not stop the pool:");
    pool.assign_task(|| panic!("missing material 'brick'"));
    pool.submit_job(ClosureJob::with_name(
        || Err(JobError::other("audio device busy")),
        "OpenAudio",
    ));

    // Let the earlier tasks finish so only the gated ones are pending
    thread::sleep(Duration::from_millis(100));

    println!("\n5. Cancelling work that has not started:");
    let gate = Arc::new(Barrier::new(2));
    let gate_clone = Arc::clone(&gate);
    pool.assign_task_to(0, move || {
        gate_clone.wait();
    });
    for _ in 0..5 {
        pool.assign_task_to(0, || println!("  this never prints"));
    }
    println!("   Cancelled {} tasks", pool.cancel_tasks());
    gate.wait();

    pool.terminate()?;

    println!("\n6. Captured failures:");
    for message in pool.drain_exceptions() {
        println!("   {}", message);
    }

    println!("\n7. Per-worker statistics:");
    for (i, stat) in pool.get_stats().iter().enumerate() {
        println!(
            "   Worker {}: {} assigned, {} processed, {} failed, {} panicked, {} cancelled, avg time: {:.2}μs",
            i,
            stat.get_tasks_assigned(),
            stat.get_jobs_processed(),
            stat.get_jobs_failed(),
            stat.get_jobs_panicked(),
            stat.get_jobs_cancelled(),
            stat.get_average_processing_time_us()
        );
    }

    println!("\n8. After termination tasks run on the caller:");
    pool.assign_task(|| println!("   ran on {:?}", thread::current().name()));

    println!("\n=== Example completed successfully ===");
    Ok(())
}
