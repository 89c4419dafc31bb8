// src/bin/main.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use dismec::cli::{run_predict, run_train, Cli, Command};

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => run_train(args).context("training failed"),
        Command::Predict(args) => run_predict(args).context("prediction failed"),
    }
}

fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(err) = run() {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}
