// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `coordfab query workers|health|seeds`.

use clap::{Args, Subcommand};

use coord_fabric_core::distributed::protocol::{
    HealthResponseDto, ListWorkersResponseDto, SeedsResponseDto,
};

use crate::error::CliError;
use crate::output::{self, OutputFormat};

/// `coordfab query` subcommands.
#[derive(Subcommand, Debug)]
pub enum QueryCommands {
    /// List every worker the coordinator currently tracks.
    Workers(QueryArgs),
    /// Fetch the coordinator's aggregate health summary.
    Health(QueryArgs),
    /// Fetch the coordinator's DHT bootstrap seed list.
    Seeds(QueryArgs),
}

/// Shared arguments for every `coordfab query` subcommand.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Coordinator base URL, e.g. `http://coordinator:8080`.
    #[arg(long, default_value = "http://localhost:8080")]
    coordinator_url: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

pub async fn execute(command: QueryCommands) -> Result<(), CliError> {
    match command {
        QueryCommands::Workers(args) => {
            let response: ListWorkersResponseDto =
                get(&args.coordinator_url, "/api/admin/workers").await?;
            output::display_workers(&response, args.format)
                .map_err(|e| CliError::invalid_input(&e.to_string(), "unexpected render failure"))
        }
        QueryCommands::Health(args) => {
            let response: HealthResponseDto = get(&args.coordinator_url, "/health").await?;
            output::display_health(&response, args.format)
                .map_err(|e| CliError::invalid_input(&e.to_string(), "unexpected render failure"))
        }
        QueryCommands::Seeds(args) => {
            let response: SeedsResponseDto = get(&args.coordinator_url, "/api/dht/seeds").await?;
            output::display_seeds(&response, args.format)
                .map_err(|e| CliError::invalid_input(&e.to_string(), "unexpected render failure"))
        }
    }
}

async fn get<T: serde::de::DeserializeOwned>(base_url: &str, path: &str) -> Result<T, CliError> {
    let url = format!("{base_url}{path}");
    let response = reqwest::get(&url)
        .await
        .map_err(|e| CliError::coordinator_unreachable(&e.to_string()))?;

    if !response.status().is_success() {
        return Err(CliError::coordinator_unreachable(&format!(
            "coordinator returned {}",
            response.status()
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| CliError::coordinator_unreachable(&e.to_string()))
}
