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

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::fmt;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CityLabels {
    pub city: String,
}

/// Holder for the per-city temperature gauge.
///
/// The gauge is created and registered upon call to `TemperatureMetrics::new()`
/// and carries a "city" label set to the registered city name, e.g.
/// `current_temperature_celsius{city="Debrecen"}`.
#[derive(Debug)]
pub struct TemperatureMetrics {
    temperature: Family<CityLabels, Gauge<f64, AtomicU64>>,
}

impl TemperatureMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let temperature = Family::<CityLabels, Gauge<f64, AtomicU64>>::default();
        registry.register(
            "current_temperature_celsius",
            "Current temperature in degrees celsius",
            temperature.clone(),
        );

        Self { temperature }
    }

    pub fn observe(&self, city: &str, temperature: f64) {
        self.temperature
            .get_or_create(&CityLabels { city: city.to_owned() })
            .set(temperature);
    }
}

/// Render the latest reading per city as Prometheus text format.
///
/// The registry is rebuilt from the given values on every call so the output
/// always reflects what is durably stored, including right after a restart.
pub fn render(latest: &[(String, f64)]) -> Result<String, fmt::Error> {
    let mut registry = Registry::default();
    let metrics = TemperatureMetrics::new(&mut registry);

    for (city, temperature) in latest {
        metrics.observe(city, *temperature);
    }

    let mut buf = String::new();
    encode(&mut buf, &registry)?;
    Ok(buf)
}
