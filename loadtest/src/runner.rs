//! Run user groups concurrently against the service under test and print results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use yansi::Paint;

use crate::http::HttpRemote;
use crate::request::{Outcome, Request};
use crate::scenario::{Scenario, UserState};
use crate::stats::{RequestStats, Stats};

/// Pause between two tasks of the same user, drawn uniformly from `min..=max`.
///
/// The default of zero issues requests back-to-back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitTime {
    /// Shortest pause.
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    /// Longest pause.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl WaitTime {
    /// Draws the next pause.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        }
    }
}

/// A number of simulated users that all run the same scenario.
#[derive(Debug)]
pub struct UserGroup {
    /// The scenario run by every user of this group.
    pub scenario: Arc<Scenario>,
    /// Number of concurrent users.
    pub users: usize,
    /// Pause between two tasks of a user.
    pub wait_time: WaitTime,
}

/// Results of a finished run.
#[derive(Debug)]
pub struct Report {
    /// Results per user group, in the order the groups were given.
    pub groups: Vec<GroupReport>,
    /// Wall time from the first user starting until the last one finished.
    pub elapsed: Duration,
}

/// Results of a single [`UserGroup`].
#[derive(Debug)]
pub struct GroupReport {
    /// Name of the scenario.
    pub scenario: String,
    /// Number of users in the group.
    pub users: usize,
    /// Aggregated outcomes per request name.
    pub requests: BTreeMap<String, RequestStats>,
}

impl Report {
    /// Looks up the results for a request name, merged across all groups.
    pub fn request(&self, name: &str) -> Option<RequestStats> {
        let mut found = None;
        for stats in self.groups.iter().filter_map(|group| group.requests.get(name)) {
            found.get_or_insert_with(RequestStats::default).merge(stats);
        }
        found
    }

    /// Merges the results of all requests.
    pub fn total(&self) -> RequestStats {
        let mut total = RequestStats::default();
        for stats in self.groups.iter().flat_map(|group| group.requests.values()) {
            total.merge(stats);
        }
        total
    }

    /// Prints per-group and total results to stdout.
    pub fn print(&self) {
        for group in &self.groups {
            println!();
            println!(
                "{} {} (users: {})",
                "## Workload".bold(),
                group.scenario.bold().blue(),
                group.users.bold()
            );
            for (name, stats) in &group.requests {
                print_request(name, stats, self.elapsed);
            }
        }

        println!();
        println!("{}", "## TOTALS".bold());
        print_request("ALL", &self.total(), self.elapsed);

        let failures: Vec<_> = self
            .groups
            .iter()
            .flat_map(|group| &group.requests)
            .flat_map(|(name, stats)| {
                stats
                    .failures
                    .iter()
                    .map(move |(reason, count)| (name, reason, count))
            })
            .collect();

        if !failures.is_empty() {
            println!();
            println!("{}", "## FAILURES".bold().red());
            for (name, reason, count) in failures {
                println!("  {}x {}: {reason}", count.bold(), name.bold());
            }
        }
    }
}

/// Runs all user groups concurrently until `duration` elapses or `shutdown` is cancelled.
///
/// Users only check for the stop signal between tasks, so every in-flight request completes
/// or times out before its user exits.
pub async fn run(
    remote: HttpRemote,
    groups: Vec<UserGroup>,
    duration: Duration,
    shutdown: CancellationToken,
) -> Result<Report> {
    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message(format!("Running load test against {}:", remote.host()));
    bar.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let stop = shutdown.child_token();

    let timer = tokio::spawn({
        let stop = stop.clone();
        async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => tracing::debug!("run duration elapsed"),
                _ = stop.cancelled() => tracing::debug!("run stopped early"),
            }
            stop.cancel();
        }
    });

    let mut running = Vec::with_capacity(groups.len());
    for group in groups {
        tracing::info!(
            scenario = group.scenario.name(),
            users = group.users,
            "starting users"
        );

        let stats = Arc::new(Stats::default());
        let users: Vec<JoinHandle<()>> = (0..group.users)
            .map(|_| {
                let user = User {
                    remote: remote.clone(),
                    scenario: Arc::clone(&group.scenario),
                    wait_time: group.wait_time,
                    stats: Arc::clone(&stats),
                    stop: stop.clone(),
                };
                tokio::spawn(user.run(rand::random()))
            })
            .collect();

        running.push((group, stats, users));
    }

    let mut reports = Vec::with_capacity(running.len());
    for (group, stats, users) in running {
        futures::future::try_join_all(users).await?;
        reports.push(GroupReport {
            scenario: group.scenario.name().to_owned(),
            users: group.users,
            requests: stats.take(),
        });
    }

    stop.cancel();
    timer.await?;
    bar.finish_and_clear();

    Ok(Report {
        groups: reports,
        elapsed: start.elapsed(),
    })
}

/// A single simulated user.
struct User {
    remote: HttpRemote,
    scenario: Arc<Scenario>,
    wait_time: WaitTime,
    stats: Arc<Stats>,
    stop: CancellationToken,
}

impl User {
    async fn run(self, seed: u64) {
        let mut state = UserState::new(seed);

        for request in self.scenario.seed_requests(&mut state) {
            if self.stop.is_cancelled() {
                return;
            }
            if let Outcome::Failure(reason) = self.execute(&request).await {
                tracing::debug!(%reason, path = %request.path, "seeding request failed");
            }
        }

        while !self.stop.is_cancelled() {
            let request = self.scenario.next_request(&mut state);
            self.execute(&request).await;

            let wait = self.wait_time.sample(state.rng());
            if wait.is_zero() {
                // Requests that fail without I/O never suspend, leaving the timer no chance to run.
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.stop.cancelled() => {}
                }
            }
        }
    }

    async fn execute(&self, request: &Request) -> Outcome {
        let start = Instant::now();
        let outcome = self.remote.execute(request).await;
        self.stats.record(request.name, &outcome, start.elapsed());
        outcome
    }
}

fn print_request(name: &str, stats: &RequestStats, elapsed: Duration) {
    print!("{} ({} ops", format!("{name}:").bold().green(), stats.count().bold());
    let failures = stats.failure_count();
    if failures > 0 {
        print!(", {}", format!("{failures} FAILURES").bold().red());
    }
    println!(")");

    let ops_ps = stats.count() as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!("  {:.2} requests/s", ops_ps.bold());

    if let Some(p) = stats.percentiles() {
        println!(
            "  avg: {:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}",
            p.avg.bold(),
            p.p50,
            p.p90,
            p.p99
        );
    }
}
