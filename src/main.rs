// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use folio::audio;
use folio::config::Config;
use folio::controller::{chat, keyboard, Controller};
use folio::datachat;
use folio::proxy;
use folio::sampler::Sampler;
use folio::scheduler::TokioScheduler;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Drum sampler, DataChat and LLM proxy."
)]
struct Cli {
    /// The path to a YAML config. Every setting has a default, and FOLIO_*
    /// environment variables override the file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the LLM proxy HTTP server.
    Proxy {},
    /// Plays the drum pads from the keyboard.
    Sampler {},
    /// Asks DataChat questions about the sample database.
    Chat {},
    /// Lists the available audio output devices.
    Devices {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Proxy {} => proxy::run(&config.proxy()).await?,
        Commands::Sampler {} => {
            let scheduler = Arc::new(TokioScheduler::current()?);
            let sampler = Arc::new(Sampler::from_config(&config, scheduler)?);
            info!(
                pads = sampler.store().catalogue().len(),
                "Sampler ready, press pad letters then enter"
            );
            let mut controller =
                Controller::new(sampler.clone(), Arc::new(keyboard::Driver::new()));
            controller.join().await?;
            sampler.shutdown();
        }
        Commands::Chat {} => {
            let data_chat = datachat::from_config(&config.datachat()).await?;
            chat::converse(&data_chat, chat::stdin_lines()?, io::stdout()).await?;
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
    }

    Ok(())
}
