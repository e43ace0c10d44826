//! Property-based tests for rust_job_system using proptest

use proptest::prelude::*;
use rust_job_system::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// ThreadPoolConfig Tests
// ============================================================================

proptest! {
    /// Any explicit thread count is kept and validates
    #[test]
    fn test_config_thread_count(threads in 1usize..64) {
        let config = ThreadPoolConfig::new(threads);
        prop_assert_eq!(config.num_threads, threads);
        prop_assert!(config.validate().is_ok());
    }

    /// Thread name prefixes survive a serde round trip with the rest of the config
    #[test]
    fn test_config_serde(threads in 1usize..16, prefix in "[a-z]{3,10}") {
        let config = ThreadPoolConfig::new(threads).with_thread_name_prefix(&prefix);
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: ThreadPoolConfig = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(parsed, config);
    }
}

// ============================================================================
// Queue Model Tests
// ============================================================================

#[derive(Debug, Clone)]
enum QueueOp {
    Push(u16),
    Pop,
    Clear,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        4 => any::<u16>().prop_map(QueueOp::Push),
        3 => Just(QueueOp::Pop),
        1 => Just(QueueOp::Clear),
    ]
}

proptest! {
    /// Single-threaded, the queue behaves exactly like a VecDeque
    #[test]
    fn test_queue_matches_model(ops in prop::collection::vec(queue_op(), 1..200)) {
        let queue = ThreadSafeQueue::new();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                QueueOp::Push(value) => {
                    prop_assert!(queue.try_push(value).is_ok());
                    model.push_back(value);
                }
                QueueOp::Pop => match queue.try_pop() {
                    TryPop::Popped(value) => prop_assert_eq!(Some(value), model.pop_front()),
                    TryPop::Empty => prop_assert!(model.is_empty()),
                    TryPop::Contended => prop_assert!(false, "no other thread holds the lock"),
                },
                QueueOp::Clear => {
                    prop_assert_eq!(queue.clear_all(), model.len());
                    model.clear();
                }
            }
            prop_assert_eq!(queue.len(), model.len());
        }

        prop_assert_eq!(queue.drain(), Vec::from(model));
    }
}

// ============================================================================
// Thread Pool Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every assigned task runs exactly once
    #[test]
    fn test_every_task_runs(threads in 1usize..6, task_count in 0usize..200) {
        let pool = ThreadPool::with_threads(threads).expect("Failed to create pool");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..task_count {
            let counter = Arc::clone(&counter);
            pool.assign_task(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.terminate().expect("Failed to terminate pool");
        prop_assert_eq!(counter.load(Ordering::SeqCst), task_count);
        prop_assert_eq!(pool.total_jobs_processed(), task_count as u64);
    }

    /// Round-robin assignment hands each worker the same number of tasks
    #[test]
    fn test_round_robin_counts(threads in 1usize..6, rounds in 1usize..20) {
        let pool = ThreadPool::with_threads(threads).expect("Failed to create pool");

        for _ in 0..threads * rounds {
            pool.assign_task(|| {});
        }
        pool.terminate().expect("Failed to terminate pool");

        for stats in pool.get_stats() {
            prop_assert_eq!(stats.get_tasks_assigned(), rounds as u64);
        }
    }

    /// Tasks targeted at one worker run in the order they were assigned
    #[test]
    fn test_per_worker_order(
        threads in 1usize..5,
        targets in prop::collection::vec(0usize..16, 1..120)
    ) {
        let pool = ThreadPool::with_threads(threads).expect("Failed to create pool");
        let logs: Vec<_> = (0..threads).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();

        for (sequence, target) in targets.iter().enumerate() {
            let log = Arc::clone(&logs[target % threads]);
            pool.assign_task_to(*target, move || {
                log.lock().expect("poisoned").push(sequence);
            });
        }
        pool.terminate().expect("Failed to terminate pool");

        for (worker, log) in logs.iter().enumerate() {
            let expected: Vec<_> = targets
                .iter()
                .enumerate()
                .filter(|(_, target)| *target % threads == worker)
                .map(|(sequence, _)| sequence)
                .collect();
            prop_assert_eq!(&*log.lock().expect("poisoned"), &expected);
        }
    }

    /// Panicking tasks never take a worker down with them
    #[test]
    fn test_panic_isolation(panic_count in 1usize..10, success_count in 1usize..10) {
        let pool = ThreadPool::with_threads(2).expect("Failed to create pool");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..panic_count {
            pool.assign_task(|| panic!("Intentional panic for testing"));
        }
        for _ in 0..success_count {
            let counter = Arc::clone(&counter);
            pool.assign_task(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.terminate().expect("Failed to terminate pool");
        prop_assert_eq!(counter.load(Ordering::SeqCst), success_count);
        prop_assert_eq!(pool.total_jobs_panicked(), panic_count as u64);
        prop_assert_eq!(pool.drain_exceptions().len(), panic_count);
    }

    /// Terminate is idempotent
    #[test]
    fn test_double_terminate_safe(threads in 1usize..4) {
        let pool = ThreadPool::with_threads(threads).expect("Failed to create pool");
        prop_assert!(pool.terminate().is_ok());
        prop_assert!(pool.terminate().is_ok());
        prop_assert!(!pool.is_alive());
    }
}
