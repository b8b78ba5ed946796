// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Output formatting for `coordfab query` responses.
//!
//! - Pretty: human-readable with colors and alignment
//! - Json: compact JSON
//! - JsonPretty: pretty-printed JSON

use anyhow::Result;
use colored::*;
use serde::Serialize;

use coord_fabric_core::distributed::protocol::{
    HealthResponseDto, ListWorkersResponseDto, SeedsResponseDto,
};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable pretty output with colors.
    #[default]
    Pretty,
    /// Compact JSON output.
    Json,
    /// Pretty-printed JSON output.
    JsonPretty,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

/// Display `GET /api/admin/workers` in the given format.
pub fn display_workers(response: &ListWorkersResponseDto, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(response, false),
        OutputFormat::JsonPretty => print_json(response, true),
        OutputFormat::Pretty => {
            if response.workers.is_empty() {
                println!("{}", "No registered workers.".dimmed());
                return Ok(());
            }
            println!();
            println!(
                "{:<24} {:<8} {:<8} {:<12} {}",
                "WORKER ID".bright_cyan().bold(),
                "LOAD".bright_cyan().bold(),
                "GPU".bright_cyan().bold(),
                "LAST SEEN".bright_cyan().bold(),
                "SERVICES".bright_cyan().bold(),
            );
            for worker in &response.workers {
                println!(
                    "{:<24} {:<8.2} {:<8} {:<12} {}",
                    worker.worker_id,
                    worker.load,
                    if worker.capabilities.has_gpu { "yes" } else { "no" },
                    worker.last_seen,
                    worker.services.join(","),
                );
            }
            println!();
            Ok(())
        }
    }
}

/// Display `GET /health` in the given format.
pub fn display_health(response: &HealthResponseDto, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(response, false),
        OutputFormat::JsonPretty => print_json(response, true),
        OutputFormat::Pretty => {
            let status_colored = if response.status == "ok" {
                response.status.green().bold()
            } else {
                response.status.red().bold()
            };
            println!("{} {}", "Status:".bright_cyan(), status_colored);
            if let Some(counts) = &response.workers {
                println!("{} {}", "Total workers:".bright_cyan(), counts.total);
                println!("{} {}", "Healthy:".bright_cyan(), counts.healthy);
                for (tier, count) in &counts.by_tier {
                    println!("  {} {}", format!("{tier}:").dimmed(), count);
                }
            }
            Ok(())
        }
    }
}

/// Display `GET /api/dht/seeds` in the given format.
pub fn display_seeds(response: &SeedsResponseDto, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(response, false),
        OutputFormat::JsonPretty => print_json(response, true),
        OutputFormat::Pretty => {
            if response.seeds.is_empty() {
                println!("{}", "No DHT seeds advertised.".dimmed());
                return Ok(());
            }
            println!("{} {}s", "TTL:".bright_cyan(), response.ttl);
            for seed in &response.seeds {
                println!("  {} @ {}:{}", seed.node_id.dimmed(), seed.host, seed.dht_port);
            }
            Ok(())
        }
    }
}

/// Display an error in a user-friendly way.
pub fn display_error(error: &str, suggestion: Option<&str>) {
    eprintln!();
    eprintln!("{} {}", "Error:".red().bold(), error.red());
    if let Some(hint) = suggestion {
        eprintln!();
        eprintln!("{} {}", "Hint:".yellow().bold(), hint.yellow());
    }
    eprintln!();
}
