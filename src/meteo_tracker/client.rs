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

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    MissingWeather(Url),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::MissingWeather(url) => write!(f, "no current weather in response for {}", url),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Source of the current temperature for a latitude/longitude pair.
///
/// The polling cycle and the registration flow only depend on this trait so
/// they can be exercised with stub implementations. Any error is treated by
/// callers as "no value for this city this cycle", never as fatal.
#[async_trait]
pub trait CurrentWeather {
    async fn current_temperature(&self, latitude: f64, longitude: f64) -> Result<f64, ClientError>;
}

#[async_trait]
impl<W: CurrentWeather + Send + Sync + ?Sized> CurrentWeather for Arc<W> {
    async fn current_temperature(&self, latitude: f64, longitude: f64) -> Result<f64, ClientError> {
        (**self).current_temperature(latitude, longitude).await
    }
}

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: Url,
}

impl OpenMeteoClient {
    const USER_AGENT: &'static str = "meteo_tracker (https://github.com/meteo-tracker/meteo_tracker)";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: Url) -> Self {
        OpenMeteoClient { client, base_url }
    }

    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<Forecast, ClientError> {
        let request_url = self.forecast_url(latitude, longitude);
        tracing::debug!(message = "making current weather request", url = %request_url);

        let res = self.make_request(request_url).await?;
        res.json::<Forecast>().await.map_err(ClientError::Internal)
    }

    async fn make_request(&self, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    fn forecast_url(&self, latitude: f64, longitude: f64) -> Url {
        let mut url = self.base_url.clone();
        {
            url.path_segments_mut()
                .map(|mut p| {
                    p.clear().push("v1").push("forecast");
                })
                .expect("unable to modify forecast URL path segments");
        }
        url.query_pairs_mut()
            .append_pair("latitude", &latitude.to_string())
            .append_pair("longitude", &longitude.to_string())
            .append_pair("current_weather", "true");

        url
    }
}

#[async_trait]
impl CurrentWeather for OpenMeteoClient {
    /// Fetch the instantaneous temperature in celsius for the given
    /// coordinates. At most one request is made per call, with no retry;
    /// a response without a current-weather temperature is an error.
    async fn current_temperature(&self, latitude: f64, longitude: f64) -> Result<f64, ClientError> {
        let forecast = self.forecast(latitude, longitude).await?;
        forecast
            .current_weather
            .and_then(|w| w.temperature)
            .ok_or_else(|| ClientError::MissingWeather(self.forecast_url(latitude, longitude)))
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Forecast {
    pub latitude: f64,
    pub longitude: f64,
    pub current_weather: Option<CurrentObservation>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CurrentObservation {
    pub temperature: Option<f64>,
    pub windspeed: Option<f64>,
    pub winddirection: Option<f64>,
    pub weathercode: Option<i64>,
    pub time: Option<String>,
}
