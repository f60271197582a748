// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! dmabuf CLI
//!
//! Probe a DMA-BUF surface socket, or serve a buffer on one for testing
//! consumers without a real screen grabber.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[cfg(not(target_os = "linux"))]
compile_error!("dmabuf-cli passes DMA-BUF descriptors over SCM_RIGHTS and only builds on Linux");

#[derive(Parser)]
#[command(name = "dmabuf")]
#[command(author, version, about = "DMA-BUF surface socket tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive one buffer from a producer and print its layout
    Probe {
        /// Producer's Unix socket
        #[arg(value_name = "SOCKPATH")]
        sockpath: PathBuf,

        /// Give up if nothing arrives within this many milliseconds
        #[arg(long, value_name = "N")]
        timeout_ms: Option<u64>,
    },

    /// Hand a file's descriptor and layout to every connecting consumer
    Serve {
        /// Socket path to listen on
        #[arg(value_name = "SOCKPATH")]
        sockpath: PathBuf,

        /// File (or /dev/dma_heap buffer) whose fd is sent
        #[arg(long, value_name = "PATH")]
        file: PathBuf,

        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// DRM fourcc as four characters, e.g. AR24
        #[arg(long, value_parser = commands::parse_fourcc)]
        fourcc: dmabuf_surface_client::Fourcc,

        #[arg(long, default_value = "0")]
        offset: u32,

        /// Row stride in bytes (default: width * 4)
        #[arg(long)]
        pitch: Option<u32>,

        /// Stop after this many consumers (default: serve forever)
        #[arg(long, value_name = "N")]
        count: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Probe {
            sockpath,
            timeout_ms,
        } => commands::probe::run(&sockpath, timeout_ms)?,
        Commands::Serve {
            sockpath,
            file,
            width,
            height,
            fourcc,
            offset,
            pitch,
            count,
        } => {
            let descriptor = dmabuf_surface_client::BufferDescriptor {
                width,
                height,
                fourcc,
                offset,
                pitch: pitch.unwrap_or(width.saturating_mul(4)),
            };
            commands::serve::run(&sockpath, &file, descriptor, count)?;
        }
    }

    Ok(())
}
