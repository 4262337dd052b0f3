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
use crate::metrics;
use crate::store::{City, NewCity, Reading, WeatherStore};
use crate::validate::{check_all, coordinate, Rule};
use axum::extract::{Path, State};
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Shared state for all handlers: the store and the weather client used for
/// the immediate fetch on registration.
#[derive(Clone)]
pub struct AppContext {
    pub store: WeatherStore,
    pub weather: Arc<dyn CurrentWeather + Send + Sync>,
}

/// Standard envelope for every JSON response:
/// `{"success": bool, "data": ..., "message": "..."}`.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: T,
    pub message: String,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
        }
    }
}

fn ok<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::success(data, message))).into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ApiResponse {
        success: false,
        data: Value::Null,
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

fn db_error(e: sqlx::Error) -> Response {
    tracing::error!(message = "database error", error = %e);
    fail(StatusCode::INTERNAL_SERVER_ERROR, "database error")
}

pub fn routes(context: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/city", post(create_city))
        .route("/api/city/data", get(city_data))
        .route("/api/city/metrics", get(city_metrics))
        .route("/api/city/:id", patch(update_city).delete(delete_city))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn health() -> impl IntoResponse {
    Json(ApiResponse::success("OK", "service is up"))
}

#[derive(Debug, Deserialize)]
struct CreateCityRequest {
    country_name: String,
    country_osm_id: i64,
    city_name: String,
    city_osm_id: i64,
    latitude: f64,
    longitude: f64,
    #[serde(default = "default_frequency")]
    frequency: String,
}

fn default_frequency() -> String {
    "0 * * * *".to_owned()
}

#[derive(Serialize)]
struct CreatedCity {
    id: i64,
}

/// POST /api/city
///
/// Registers a city and immediately fetches one reading for it so the data
/// endpoint has at least one point right away. The immediate fetch is best
/// effort: registration succeeds even when Open-Meteo has nothing for us.
async fn create_city(State(context): State<AppContext>, Json(req): Json<CreateCityRequest>) -> Response {
    let checks = [
        check_all("country_name", &req.country_name, &[Rule::Required, Rule::Text]),
        check_all("city_name", &req.city_name, &[Rule::Required, Rule::Text]),
        check_all("frequency", &req.frequency, &[Rule::CronExpression]),
        coordinate("latitude", req.latitude, -90.0, 90.0),
        coordinate("longitude", req.longitude, -180.0, 180.0),
    ];
    if let Some(Err(e)) = checks.into_iter().find(|c| c.is_err()) {
        return fail(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    // Duplicate check happens before any write so a repeated registration
    // leaves no trace.
    match context.store.city_exists(req.city_osm_id).await {
        Ok(true) => {
            tracing::info!(message = "city already registered", city = %req.city_name, osm_id = req.city_osm_id);
            return fail(StatusCode::CONFLICT, "city has already been registered");
        }
        Ok(false) => {}
        Err(e) => return db_error(e),
    }

    let new_city = NewCity {
        country_name: req.country_name,
        country_osm_id: req.country_osm_id,
        city_name: req.city_name,
        city_osm_id: req.city_osm_id,
        latitude: req.latitude,
        longitude: req.longitude,
        cron_expression: req.frequency,
    };

    let id = match context.store.create_city(&new_city).await {
        Ok(id) => id,
        Err(e) => return db_error(e),
    };
    tracing::info!(message = "city registered", city = %new_city.city_name, country = %new_city.country_name, id = id);

    match context.weather.current_temperature(new_city.latitude, new_city.longitude).await {
        Ok(temperature) => {
            if let Err(e) = context.store.insert_reading(id, temperature).await {
                tracing::error!(message = "unable to store initial reading", city = %new_city.city_name, error = %e);
            }
        }
        Err(e) => {
            tracing::warn!(message = "no initial temperature data for city", city = %new_city.city_name, error = %e);
        }
    }

    ok(StatusCode::CREATED, CreatedCity { id }, "city registered")
}

#[derive(Serialize)]
struct CityHistory {
    id: i64,
    city: String,
    country: String,
    data: Vec<Reading>,
}

/// GET /api/city/data
///
/// Every registered city with its full reading history in recorded order.
async fn city_data(State(context): State<AppContext>) -> Response {
    let cities = match context.store.cities().await {
        Ok(cities) => cities,
        Err(e) => return db_error(e),
    };

    let mut result = Vec::with_capacity(cities.len());
    for city in cities {
        let data = match context.store.readings(city.id).await {
            Ok(data) => data,
            Err(e) => return db_error(e),
        };
        result.push(CityHistory {
            id: city.id,
            city: city.city_name,
            country: city.country_name,
            data,
        });
    }

    ok(StatusCode::OK, result, "city data")
}

/// GET /api/city/metrics
///
/// The latest reading per city as a Prometheus gauge,
/// `current_temperature_celsius{city="<name>"} <value>`, in a scrapeable
/// text exposition rather than a JSON wrapper. Cities without any reading
/// yet are left out.
async fn city_metrics(State(context): State<AppContext>) -> Response {
    let cities = match context.store.cities().await {
        Ok(cities) => cities,
        Err(e) => return db_error(e),
    };

    let mut latest = Vec::with_capacity(cities.len());
    for City { id, city_name, .. } in cities {
        match context.store.latest_reading(id).await {
            Ok(Some(reading)) => latest.push((city_name, reading.temperature)),
            Ok(None) => {}
            Err(e) => return db_error(e),
        }
    }

    match metrics::render(&latest) {
        Ok(body) => ([(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            fail(StatusCode::SERVICE_UNAVAILABLE, "error encoding metrics")
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateCityRequest {
    frequency: String,
}

/// PATCH /api/city/:id
///
/// The cron schedule is the only mutable attribute of a city. An empty
/// frequency disables polling for the city.
async fn update_city(
    State(context): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCityRequest>,
) -> Response {
    if let Err(e) = check_all("frequency", &req.frequency, &[Rule::CronExpression]) {
        return fail(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    match context.store.set_schedule(id, &req.frequency).await {
        Ok(true) => {
            tracing::info!(message = "city schedule updated", id = id, schedule = %req.frequency);
            ok(StatusCode::OK, Value::Null, "city updated")
        }
        Ok(false) => fail(StatusCode::NOT_FOUND, "no city with the given id"),
        Err(e) => db_error(e),
    }
}

/// DELETE /api/city/:id
///
/// Removes the city along with its reading history.
async fn delete_city(State(context): State<AppContext>, Path(id): Path<i64>) -> Response {
    match context.store.delete_city(id).await {
        Ok(true) => {
            tracing::info!(message = "city deleted", id = id);
            ok(StatusCode::OK, Value::Null, "city deleted")
        }
        Ok(false) => fail(StatusCode::NOT_FOUND, "no city with the given id"),
        Err(e) => db_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::{routes, AppContext};
    use crate::client::{ClientError, CurrentWeather};
    use crate::store::WeatherStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use axum::Router;
    use reqwest::Url;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StubWeather(Option<f64>);

    #[async_trait]
    impl CurrentWeather for StubWeather {
        async fn current_temperature(&self, _latitude: f64, _longitude: f64) -> Result<f64, ClientError> {
            match self.0 {
                Some(t) => Ok(t),
                None => Err(ClientError::MissingWeather(
                    Url::parse("https://api.open-meteo.com/v1/forecast").unwrap(),
                )),
            }
        }
    }

    async fn app(weather: StubWeather) -> (Router, WeatherStore) {
        let store = WeatherStore::open_in_memory().await.unwrap();
        let context = AppContext {
            store: store.clone(),
            weather: Arc::new(weather),
        };
        (routes(context), store)
    }

    fn debrecen_body() -> Value {
        json!({
            "country_name": "Hungary",
            "country_osm_id": 21335,
            "city_name": "Debrecen",
            "city_osm_id": 20308,
            "latitude": 47.53,
            "longitude": 21.63,
            "frequency": "*/15 * * * *"
        })
    }

    fn post_city(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/city")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_success() {
        let (app, _store) = app(StubWeather(None)).await;
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], "OK");
    }

    #[tokio::test]
    async fn register_city_stores_an_immediate_reading() {
        let (app, store) = app(StubWeather(Some(21.0))).await;

        let res = app.oneshot(post_city(&debrecen_body())).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let json = body_json(res).await;
        assert_eq!(json["success"], true);
        let id = json["data"]["id"].as_i64().unwrap();

        let history = store.readings(id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].temperature, 21.0);
    }

    #[tokio::test]
    async fn register_city_succeeds_without_weather_data() {
        let (app, store) = app(StubWeather(None)).await;

        let res = app.oneshot(post_city(&debrecen_body())).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let json = body_json(res).await;
        let id = json["data"]["id"].as_i64().unwrap();

        assert!(store.readings(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_before_any_write() {
        let (app, store) = app(StubWeather(Some(21.0))).await;

        let res = app.clone().oneshot(post_city(&debrecen_body())).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app.oneshot(post_city(&debrecen_body())).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let json = body_json(res).await;
        assert_eq!(json["success"], false);

        assert_eq!(store.cities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let (app, store) = app(StubWeather(Some(21.0))).await;

        let mut body = debrecen_body();
        body["city_name"] = json!("Debrecen;DROP TABLE");
        let res = app.clone().oneshot(post_city(&body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let mut body = debrecen_body();
        body["frequency"] = json!("* * *");
        let res = app.clone().oneshot(post_city(&body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let mut body = debrecen_body();
        body["latitude"] = json!(123.4);
        let res = app.oneshot(post_city(&body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert!(store.cities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn city_data_lists_history_per_city() {
        let (app, store) = app(StubWeather(Some(21.0))).await;
        let res = app.clone().oneshot(post_city(&debrecen_body())).await.unwrap();
        let id = body_json(res).await["data"]["id"].as_i64().unwrap();
        store.insert_reading(id, 22.5).await.unwrap();

        let res = app
            .oneshot(Request::builder().uri("/api/city/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;

        let cities = json["data"].as_array().unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0]["city"], "Debrecen");
        assert_eq!(cities[0]["country"], "Hungary");
        let data = cities[0]["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["temperature"], 21.0);
        assert_eq!(data[1]["temperature"], 22.5);
        assert!(data[0]["recorded_at"].is_string());
    }

    #[tokio::test]
    async fn metrics_exposes_latest_reading_per_city() {
        let (app, store) = app(StubWeather(Some(21.0))).await;
        let res = app.clone().oneshot(post_city(&debrecen_body())).await.unwrap();
        let id = body_json(res).await["data"]["id"].as_i64().unwrap();
        store.insert_reading(id, 23.5).await.unwrap();

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/city/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let content_type = res.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap().to_owned();
        assert!(content_type.starts_with("application/openmetrics-text"));

        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("current_temperature_celsius{city=\"Debrecen\"} 23.5"));
    }

    #[tokio::test]
    async fn update_changes_only_the_schedule() {
        let (app, store) = app(StubWeather(Some(21.0))).await;
        let res = app.clone().oneshot(post_city(&debrecen_body())).await.unwrap();
        let id = body_json(res).await["data"]["id"].as_i64().unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/city/{}", id))
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"frequency": "5 * * * *"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(store.city(id).await.unwrap().unwrap().cron_expression, "5 * * * *");

        let res = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/city/{}", id + 1))
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"frequency": "5 * * * *"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_rejects_a_bad_schedule() {
        let (app, store) = app(StubWeather(Some(21.0))).await;
        let res = app.clone().oneshot(post_city(&debrecen_body())).await.unwrap();
        let id = body_json(res).await["data"]["id"].as_i64().unwrap();

        let res = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/city/{}", id))
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"frequency": "often"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(store.city(id).await.unwrap().unwrap().cron_expression, "*/15 * * * *");
    }

    #[tokio::test]
    async fn delete_removes_the_city() {
        let (app, store) = app(StubWeather(Some(21.0))).await;
        let res = app.clone().oneshot(post_city(&debrecen_body())).await.unwrap();
        let id = body_json(res).await["data"]["id"].as_i64().unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/city/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(store.city(id).await.unwrap().is_none());

        let res = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/city/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
