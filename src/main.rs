// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

mod broadcast;
mod cli;
mod config;
mod delivery;
mod ingest;
mod model;
mod schedule;
mod selector;
mod service;
mod store;
mod subscriptions;
mod telegram;

use std::{
    io::{Read, stdin},
    path::Path,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context as _, Result};
use broadcast::Broadcaster;
use clap::Parser;
use cli::{Cli, Command};
use config::Configuration;
use env_logger::Env;
use schedule::Schedule;
use service::{Notifications, Request, Signals};
use store::Store;
use teloxide::{Bot, requests::Requester};
use telegram::Telegram;

/// A verified bot wired up with the store, not running yet.
struct Wiring {
    bot: Bot,
    context: telegram::Context,
    poll_timeout: Duration,
}

/// Connects to the Bot API and wires it up with the store.
async fn wire(
    configuration: &Configuration,
    store: Arc<dyn Store>,
    previous: Option<&Broadcaster>,
) -> Result<Wiring> {
    let settings = configuration.telegram()?;
    let bot = telegram::connect(&settings)?;
    let me = bot.get_me().await.context("failed to verify the bot token")?;
    log::info!("logged in as {} (@{}, {})", me.first_name, me.username(), me.id);

    let delivery = Arc::new(bot.clone());
    let broadcaster = match previous {
        Some(previous) => previous.reconfigure(delivery, configuration.broadcast()),
        None => Broadcaster::new(store.clone(), delivery, configuration.broadcast()),
    };

    Ok(Wiring {
        bot,
        context: telegram::Context { store, broadcaster },
        poll_timeout: settings.poll_timeout(),
    })
}

/// The broadcast loop and the bot, sharing one broadcaster.
struct Running {
    broadcaster: Broadcaster,
    schedule: Schedule,
    telegram: Telegram,
}

impl Running {
    fn start(wiring: Wiring) -> Self {
        let broadcaster = wiring.context.broadcaster.clone();

        Self {
            schedule: Schedule::spawn(broadcaster.clone()),
            telegram: Telegram::spawn(wiring.bot, wiring.context, wiring.poll_timeout),
            broadcaster,
        }
    }

    async fn stop(self) -> Result<()> {
        self.schedule.shutdown().await?;
        self.telegram.shutdown().await
    }
}

/// Wires up the reloaded configuration; keeps everything running as is if that fails.
async fn rewire(config_file: Option<&Path>, store: &Arc<dyn Store>, running: &Running) -> Result<Wiring> {
    let configuration = Configuration::load(config_file.map(Path::to_path_buf))?;
    wire(&configuration, store.clone(), Some(&running.broadcaster)).await
}

async fn run(config_file: Option<&Path>) -> Result<()> {
    Notifications::starting()?;
    let configuration = Configuration::load(config_file.map(Path::to_path_buf))?;
    let mut signals = Signals::new()?;

    let store = store::open(configuration.database())?;
    let mut running = Running::start(wire(&configuration, store.clone(), None).await?);
    log::info!("running");
    Notifications::ready()?;

    while let Some(request) = signals.next().await {
        match request {
            Request::Reload => {
                Notifications::reloading()?;
                log::info!("reloading");
                match rewire(config_file, &store, &running).await {
                    Ok(wiring) => {
                        running.stop().await?;
                        running = Running::start(wiring);
                    }
                    Err(err) => log::error!("reload failed, keeping the previous configuration: {err:#}"),
                }
                Notifications::ready()?;
            }
            Request::Shutdown => {
                Notifications::stopping()?;
                log::info!("shutting down");
                running.stop().await?;
                break;
            }
        }
    }

    Ok(())
}

fn read_input(file: &Path) -> Result<String> {
    let mut input = String::new();
    if file == Path::new("-") {
        stdin()
            .read_to_string(&mut input)
            .context("failed to read records from stdin")?;
    } else {
        input = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read records from {file:?}"))?;
    }

    Ok(input)
}

async fn process() -> Result<()> {
    let args = Cli::parse();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(args.config.as_deref()).await,
        Command::Migrate => {
            let configuration = Configuration::load(args.config)?;
            store::open(configuration.database())?;
            log::info!("database is up to date");
            Ok(())
        }
        Command::Import { file } => {
            let configuration = Configuration::load(args.config)?;
            let store = store::open(configuration.database())?;
            let input = tokio::task::spawn_blocking(move || read_input(&file)).await??;
            let report = ingest::import(store.as_ref(), &input).await;
            log::info!("import finished: {report}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match process().await {
        Ok(_) => {}
        Err(err) => {
            _ = Notifications::failed(1312, &err.to_string());
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::{io::Write, sync::Arc, time::Duration};

    use test_log::test;
    use tokio::time::{sleep, timeout};

    use super::wire;
    use crate::{
        broadcast::{
            Broadcaster,
            test::{Recorder, hd, settings},
        },
        config::{self, Configuration},
        schedule::Schedule,
        store::{Store, contract, sqlite::test::temporary},
    };

    #[test(tokio::test)]
    async fn failed_rewiring_leaves_the_running_schedule_alone() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/kept.jpg", true)).await);
        assert!(store.upsert_subscription(&contract::subscription(1)).await);
        let store: Arc<dyn Store> = Arc::new(store);
        let recorder = Arc::new(Recorder::default());
        let quick = config::Broadcast {
            cooldown: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            cycle_interval: Duration::from_millis(5),
            ..settings()
        };
        let broadcaster = Broadcaster::new(store.clone(), recorder.clone(), quick);
        let schedule = Schedule::spawn(broadcaster.clone());

        let mut token = tempfile::NamedTempFile::new().expect("temporary file");
        writeln!(token, "123:not-a-token").expect("token written");
        let configuration = Configuration::from_toml(&format!(
            "[telegram]\ntokenFile = {:?}\napiUrl = \"http://127.0.0.1:9\"\n",
            token.path()
        ))
        .expect("configuration parses");

        assert!(wire(&configuration, store.clone(), Some(&broadcaster)).await.is_err());

        let delivered = recorder.calls().len();
        timeout(Duration::from_secs(5), async {
            while recorder.calls().len() <= delivered {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("the previous schedule keeps broadcasting");
        schedule.shutdown().await.expect("loop exits cleanly");
    }
}
