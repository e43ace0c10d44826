//! Job system example
//!
//! Demonstrates the process-wide instance, typed futures and awaiting them
//! from async code.
//!
//! Run with: cargo run --example job_system

use rust_job_system::prelude::*;
use std::time::Duration;

struct BakeLightmap {
    texels: usize,
}

impl Job for BakeLightmap {
    fn execute(&mut self) -> Result<()> {
        std::thread::sleep(Duration::from_millis(self.texels as u64 / 1000));
        Ok(())
    }

    fn job_type(&self) -> &str {
        "BakeLightmap"
    }
}

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Rust Job System - Job System Example ===\n");

    let jobs = JobSystem::instantiate()?;
    println!(
        "1. Job system running with {} workers (main thread: {})",
        jobs.available_thread_count(),
        jobs.is_main_thread()
    );

    // Any code can reach the same instance while it is alive
    let same = JobSystem::instance(false).ok_or_else(|| JobError::other("no job system"))?;
    println!("   instance shared: {}", std::sync::Arc::ptr_eq(&jobs, &same));
    drop(same);

    println!("\n2. Typed results:");
    let chunks: Vec<_> = (0..6u64)
        .map(|chunk| jobs.submit(move || (chunk, (0..10_000u64).map(|i| i ^ chunk).sum::<u64>())))
        .collect();
    for future in chunks {
        let (chunk, checksum) = future.wait()?;
        println!("   chunk {} checksum {}", chunk, checksum);
    }

    println!("\n3. Jobs and failures:");
    jobs.submit_job(BakeLightmap { texels: 50_000 }).wait()?;
    println!("   lightmap baked");
    match jobs.submit::<_, ()>(|| panic!("navmesh has holes")).wait() {
        Ok(()) => println!("   unexpected success"),
        Err(e) => println!("   navmesh job: {}", e),
    }

    println!("\n4. Awaiting from async code:");
    let answer = jobs.submit(|| 6 * 7);
    let value = futures::executor::block_on(async { answer.await })?;
    println!("   answer = {}", value);

    println!("\n5. Timed wait:");
    let mut slow = jobs.submit(|| std::thread::sleep(Duration::from_millis(200)));
    match slow.wait_timeout(Duration::from_millis(10)) {
        Some(_) => println!("   finished early"),
        None => println!("   still running after 10ms"),
    }
    slow.wait()?;

    let last = JobSystem::destroy(jobs);
    println!("\n6. Destroyed last handle: {}", last);
    println!("   instance alive: {}", JobSystem::has_instance());

    println!("\n=== Example completed successfully ===");
    Ok(())
}
