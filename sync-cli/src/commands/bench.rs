//! Fan-out isolation benchmark.
//!
//! Every group gets the same number of slow subscribers. One push to a
//! single group gives the baseline; then every group is pushed at once.
//! When groups are isolated the second number stays close to the first
//! instead of growing with the group count.

use anyhow::{Context, Result};
use propsync_core::{callback, Config, InMemoryAuthority, SynchronizationAuthority};
use propsync_types::SyncKey;
use serde::Serialize;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Benchmark shape.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Groups pushed concurrently.
    pub groups: usize,
    /// Subscribers per group.
    pub subscribers: usize,
    /// Sleep inside each subscriber callback.
    pub delay_ms: u64,
}

/// Benchmark results.
#[derive(Debug, Serialize)]
pub struct BenchReport {
    groups: usize,
    subscribers: usize,
    delay_ms: u64,
    max_fanout_workers: usize,
    single_group_ms: f64,
    all_groups_ms: f64,
    /// `all_groups_ms` if every group had been pushed one after another.
    serial_estimate_ms: f64,
    notifications_delivered: u64,
}

fn group_key(group: usize, participant: &str) -> Result<SyncKey> {
    SyncKey::new("Bench", "value", format!("group-{group}"), participant)
        .context("Failed to build bench key")
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Run the bench command.
pub fn run(config: &Config, options: &BenchOptions, json: bool) -> Result<()> {
    anyhow::ensure!(options.groups > 0, "--groups must be at least 1");

    let authority = InMemoryAuthority::with_config(&config.authority);
    let delay = Duration::from_millis(options.delay_ms);

    for group in 0..options.groups {
        for sub in 0..options.subscribers {
            authority.subscribe(
                &group_key(group, &format!("sub-{sub}"))?,
                callback(move |_: &u64| {
                    thread::sleep(delay);
                    Ok(())
                }),
            )?;
        }
    }
    tracing::info!(
        "Subscribed {} x {} callbacks ({} ms each)",
        options.groups,
        options.subscribers,
        options.delay_ms
    );

    let pushers: Vec<SyncKey> = (0..options.groups)
        .map(|group| group_key(group, "pusher"))
        .collect::<Result<_>>()?;

    let started = Instant::now();
    authority.push(&pushers[0], 0u64)?;
    let single_group = started.elapsed();

    let barrier = Barrier::new(pushers.len());
    let started = Instant::now();
    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = pushers
            .iter()
            .map(|key| {
                let authority = &authority;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    authority.push(key, 1u64)
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("push thread panicked"),
            }
        }
        Ok(())
    })?;
    let all_groups = started.elapsed();

    let report = BenchReport {
        groups: options.groups,
        subscribers: options.subscribers,
        delay_ms: options.delay_ms,
        max_fanout_workers: authority.max_fanout_workers(),
        single_group_ms: millis(single_group),
        all_groups_ms: millis(all_groups),
        serial_estimate_ms: millis(single_group) * options.groups as f64,
        notifications_delivered: authority.stats().notifications_delivered,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &BenchReport) {
    println!("=== propsync bench ===");
    println!();
    println!(
        "Groups:        {} x {} subscribers, {} ms per callback",
        report.groups, report.subscribers, report.delay_ms
    );
    println!("Fan-out:       up to {} workers per push", report.max_fanout_workers);
    println!();
    println!("One group:     {:>9.1} ms", report.single_group_ms);
    println!("All groups:    {:>9.1} ms", report.all_groups_ms);
    println!("If serialized: {:>9.1} ms", report.serial_estimate_ms);
    println!("Notified:      {}", report.notifications_delivered);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_runs_small_shape() {
        let options = BenchOptions {
            groups: 2,
            subscribers: 2,
            delay_ms: 1,
        };
        run(&Config::default(), &options, true).unwrap();
    }

    #[test]
    fn bench_rejects_zero_groups() {
        let options = BenchOptions {
            groups: 0,
            subscribers: 1,
            delay_ms: 0,
        };
        assert!(run(&Config::default(), &options, false).is_err());
    }
}
