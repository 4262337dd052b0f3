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

//! City weather tracker and Prometheus exporter for the [Open-Meteo] API.
//!
//! ## Features
//!
//! `meteo_tracker` keeps a registry of cities, each with its own cron schedule, polls the
//! Open-Meteo forecast API for the current temperature of every city whose schedule is due,
//! and stores the readings in a sqlite database. The history is served over a small JSON API
//! and the latest reading per city is exported as a Prometheus gauge.
//!
//! * `current_temperature_celsius{city=$CITY}` - Latest stored temperature, in degrees celsius.
//!
//! [Open-Meteo]: https://open-meteo.com/en/docs
//!
//! ## Build
//!
//! `meteo_tracker` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Registering a city
//!
//! Cities are registered over the JSON API with their OSM identifiers, coordinates, and an
//! optional 5-field cron schedule (default `0 * * * *`, hourly; an empty schedule disables
//! polling for that city). One reading is fetched immediately on registration.
//!
//! ```text
//! curl -sS -X POST localhost:9783/api/city \
//!     -H 'Content-Type: application/json' \
//!     -d '{"country_name": "Hungary", "country_osm_id": 21335,
//!          "city_name": "Debrecen", "city_osm_id": 20308,
//!          "latitude": 47.53, "longitude": 21.63, "frequency": "*/15 * * * *"}'
//! ```
//!
//! The schedule can be changed later with `PATCH /api/city/<id>`, the city removed with
//! `DELETE /api/city/<id>` (its readings go with it), and the full history fetched from
//! `GET /api/city/data`.
//!
//! ### Polling
//!
//! Schedules are evaluated once per minute against a single configured time zone
//! (`--poll-zone`, default `Europe/Budapest`). A failed fetch for one city is logged and
//! skipped; it never stops the rest of the cycle. There are no retries beyond the next
//! minute tick.
//!
//! ### Prometheus
//!
//! The latest reading per city is exposed in text exposition format at
//! `/api/city/metrics`. Add the host running `meteo_tracker` as a target under
//! the Prometheus `scrape_configs` section as described by the example below.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     60s
//!   evaluation_interval: 60s
//!
//! scrape_configs:
//! - job_name: meteo_tracker
//!   metrics_path: /api/city/metrics
//!   static_configs:
//!   - targets: ['example:9783']
//! ```
//!

pub mod client;
pub mod cron;
pub mod http;
pub mod metrics;
pub mod poll;
pub mod store;
pub mod validate;
