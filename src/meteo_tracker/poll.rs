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

use crate::client::CurrentWeather;
use crate::cron;
use crate::store::{City, WeatherStore};
use chrono::{DateTime, TimeZone};

/// Runs the fetch-and-store cycle over every registered city.
///
/// Collaborators are passed in explicitly; the poller owns no state beyond
/// them. One cycle is expected to be triggered once per minute so that
/// minute-resolution cron fields are honored. Running a second cycle within
/// the same matching minute inserts duplicate readings, there is no
/// deduplication.
#[derive(Debug)]
pub struct Poller<W> {
    store: WeatherStore,
    weather: W,
}

impl<W: CurrentWeather> Poller<W> {
    pub fn new(store: WeatherStore, weather: W) -> Self {
        Poller { store, weather }
    }

    /// Run one full cycle against the given reference time.
    ///
    /// Per-city failures (fetch or store) are logged and skipped; the cycle
    /// itself never aborts early and reports nothing back. The reference
    /// time must be in the configured poll time zone, the same zone for
    /// every city within one cycle.
    pub async fn run_cycle<Tz: TimeZone>(&self, now: &DateTime<Tz>) {
        tracing::info!(message = "poll cycle started");

        let cities = match self.store.cities().await {
            Ok(cities) => cities,
            Err(e) => {
                tracing::error!(message = "unable to load city list", error = %e);
                return;
            }
        };

        for city in &cities {
            if city.cron_expression.is_empty() {
                tracing::debug!(message = "no schedule configured, skipping", city = %city.city_name);
                continue;
            }

            if !cron::is_due(&city.cron_expression, now) {
                tracing::debug!(
                    message = "not due, skipping",
                    city = %city.city_name,
                    schedule = %city.cron_expression,
                );
                continue;
            }

            self.fetch_and_store(city).await;
        }

        tracing::info!(message = "poll cycle complete", cities = cities.len());
    }

    /// Unconditionally fetch and store one reading for a city, regardless of
    /// its schedule. Used for every due city within a cycle and for the
    /// immediate fetch right after registration. Never fails: both fetch and
    /// store problems are absorbed into log entries.
    pub async fn fetch_and_store(&self, city: &City) {
        tracing::info!(message = "fetching current temperature", city = %city.city_name);

        let temperature = match self.weather.current_temperature(city.latitude, city.longitude).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(message = "no temperature data for city", city = %city.city_name, error = %e);
                return;
            }
        };

        if let Err(e) = self.store.insert_reading(city.id, temperature).await {
            tracing::error!(message = "unable to store reading", city = %city.city_name, error = %e);
            return;
        }

        tracing::info!(
            message = "stored reading",
            city = %city.city_name,
            temperature = temperature,
        );
    }
}
