// SPDX-FileCopyrightText: © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub(crate) struct Cli {
    /// configuration file (TOML), may be omitted if everything is set via the environment
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// run the bot and the broadcast schedule (default)
    Run,
    /// apply pending database migrations and exit
    Migrate,
    /// store normalized wallpaper records, one JSON object per line ("-" reads stdin)
    Import { file: PathBuf },
}
