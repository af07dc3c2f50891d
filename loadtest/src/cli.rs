//! Command line interface of the `loadtest` binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;
use yansi::Paint;

use crate::config::Config;
use crate::http::HttpRemote;
use crate::runner::{self, UserGroup};
use crate::scenario::ScenarioKind;
use crate::{healthcheck, observability};

/// Load generator for the product catalog and search services.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    List(ListCommand),
    Healthcheck(HealthcheckCommand),
    Version(VersionCommand),
}

/// run all configured user groups against the target host
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// base URL of the service under test, overrides the configuration
    #[argh(option)]
    host: Option<String>,

    /// how long to run, e.g. `30s` or `5m`, overrides the configuration
    #[argh(option, from_str_fn(parse_duration))]
    duration: Option<Duration>,
}

/// list all scenarios with their tasks and weights
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "list")]
struct ListCommand {}

/// check that the target host responds to `/health`
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "healthcheck")]
struct HealthcheckCommand {}

/// print the version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|err| err.to_string())
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    match args.command {
        Command::Version(_) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::List(_) => {
            print_scenarios();
            return Ok(());
        }
        _ => (),
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Command::Run(ref run) = args.command {
        if let Some(ref host) = run.host {
            config.host = host.clone();
        }
        if let Some(duration) = run.duration {
            config.duration = duration;
        }
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("loadtest-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(_) => run(config).await,
            Command::Healthcheck(_) => healthcheck::healthcheck(&config).await,
            Command::List(_) | Command::Version(_) => unreachable!(),
        }
    })
}

async fn run(config: Config) -> Result<()> {
    let remote = HttpRemote::new(&config.host, config.timeout)
        .with_context(|| format!("invalid host `{}`", config.host))?;

    let groups = config
        .users
        .iter()
        .map(|users| {
            tracing::debug!(%users, "configured user group");
            UserGroup {
                scenario: Arc::new(users.scenario.scenario()),
                users: users.count,
                wait_time: users.wait_time,
            }
        })
        .collect();

    // Signals only stop the users, in-flight requests still complete.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            elegant_departure::get_shutdown_guard().wait().await;
            tracing::info!("Stopping users ...");
            shutdown.cancel();
        }
    });
    tokio::spawn(async {
        elegant_departure::tokio::depart()
            .on_termination()
            .on_sigint()
            .await
    });

    tracing::info!(host = %remote.host(), duration = ?config.duration, "Starting load test");
    let report = runner::run(remote, groups, config.duration, shutdown).await?;
    report.print();

    Ok(())
}

fn print_scenarios() {
    for kind in ScenarioKind::ALL {
        let scenario = kind.scenario();
        let total = scenario.total_weight();

        println!(
            "{} {} (seeding: {})",
            "##".bold(),
            scenario.name().bold().blue(),
            if scenario.is_seeded() { "yes" } else { "no" }
        );
        for task in scenario.tasks() {
            let share = f64::from(task.weight) / f64::from(total) * 100.0;
            println!(
                "  weight {:>3} ({share:>5.1}%)  {}",
                task.weight.bold(),
                task.name
            );
        }
        println!();
    }
}
