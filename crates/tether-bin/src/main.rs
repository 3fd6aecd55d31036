// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TETHER supervisor entry point.

use clap::Parser;
use tracing::error;

use tether_bin::cli::{Cli, Commands, RunArgs};
use tether_bin::logging::init_logging;
use tether_bin::runtime::RuntimeBuilder;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let command = cli.command.clone().unwrap_or(Commands::Run(RunArgs::default()));

    let result = match command {
        Commands::Run(args) => run(&cli, args).await,
        Commands::Validate => validate(&cli),
        Commands::Version => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli, args: RunArgs) -> tether_bin::BinResult<()> {
    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .dev_mode(args.dev)
        .skip_connect(args.skip_connect)
        .build()?;

    runtime.run().await
}

fn validate(cli: &Cli) -> tether_bin::BinResult<()> {
    let config = tether_config::load_config(&cli.config)?;
    println!(
        "Configuration OK: {} endpoint(s), retry strategy {}",
        config.endpoints.len(),
        config.retry.strategy
    );
    Ok(())
}
