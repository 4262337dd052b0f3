// meteo_tracker - City weather tracker and Prometheus exporter for Open-Meteo
//
// Copyright 2025 meteo_tracker contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use meteo_tracker::client::OpenMeteoClient;
use meteo_tracker::http::{self, AppContext};
use meteo_tracker::poll::Poller;
use meteo_tracker::store::WeatherStore;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "https://api.open-meteo.com/";
const DEFAULT_DB_PATH: &str = "meteo_tracker.sqlite3";
const DEFAULT_POLL_ZONE: &str = "Europe/Budapest";

// Cron fields have minute resolution, so cycles run once a minute.
const POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[clap(name = "meteo_tracker", version = clap::crate_version!())]
struct MeteoTrackerApplication {
    /// Path to the sqlite database, created on first use if missing
    #[clap(long, default_value_t = DEFAULT_DB_PATH.into())]
    db: String,

    /// Base URL for the Open-Meteo API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for fetching current weather from the Open-Meteo API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// IANA name of the time zone that all cron schedules are evaluated in.
    #[clap(long, default_value_t = DEFAULT_POLL_ZONE.into())]
    poll_zone: String,

    /// Address to bind to. By default, meteo_tracker will bind to a public address since
    /// the purpose is to expose the city API and metrics to external systems
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = MeteoTrackerApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let zone: Tz = opts.poll_zone.parse().unwrap_or_else(|e| {
        tracing::error!(message = "invalid poll time zone", zone = %opts.poll_zone, error = %e);
        process::exit(1)
    });

    let base_url = Url::parse(&opts.api_url).unwrap_or_else(|e| {
        tracing::error!(message = "invalid API base URL", url = %opts.api_url, error = %e);
        process::exit(1)
    });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let store = match WeatherStore::open(&opts.db).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(message = "unable to open database", path = %opts.db, error = %e);
            process::exit(1)
        }
    };

    let client = OpenMeteoClient::new(http_client, base_url);
    let poller = Poller::new(store.clone(), client.clone());

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
        tracing::info!(message = "weather polling started", zone = %zone);

        loop {
            let _ = interval.tick().await;
            let now = Utc::now().with_timezone(&zone);
            poller.run_cycle(&now).await;
        }
    });

    let context = AppContext {
        store,
        weather: Arc::new(client),
    };

    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);
    server
        .serve(http::routes(context).into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
