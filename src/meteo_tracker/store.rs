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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// A monitored location. `city_osm_id` is unique across all cities; the
/// `cron_expression` is a 5-field cron schedule, empty meaning "never poll".
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct City {
    pub id: i64,
    pub country_name: String,
    pub country_osm_id: i64,
    pub city_name: String,
    pub city_osm_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub cron_expression: String,
}

/// Input for registering a city. Constructed in one shot with named fields,
/// there is no partially-initialized state.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCity {
    pub country_name: String,
    pub country_osm_id: i64,
    pub city_name: String,
    pub city_osm_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub cron_expression: String,
}

/// One observed temperature sample. Immutable once written; `recorded_at` is
/// assigned by the store at insert time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reading {
    pub recorded_at: DateTime<Utc>,
    pub temperature: f64,
}

const CREATE_CITIES: &str = "\
CREATE TABLE IF NOT EXISTS cities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    country_name TEXT NOT NULL,
    country_osm_id INTEGER NOT NULL,
    city_name TEXT NOT NULL,
    city_osm_id INTEGER NOT NULL UNIQUE,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    cron_expression TEXT NOT NULL DEFAULT '0 * * * *'
)";

const CREATE_READINGS: &str = "\
CREATE TABLE IF NOT EXISTS weather_data (
    city_id INTEGER NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
    temperature REAL NOT NULL,
    recorded_at TEXT NOT NULL
)";

/// Sqlite-backed storage for cities and their temperature readings.
///
/// Cloning is cheap, all clones share one connection pool. Deleting a city
/// cascades to its readings so no orphaned rows are left behind.
#[derive(Debug, Clone)]
pub struct WeatherStore {
    pool: SqlitePool,
}

impl WeatherStore {
    /// Open (and create if missing) the database at the given path and run
    /// the schema setup.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Self::from_pool(pool).await
    }

    /// Open a private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let opts = "sqlite::memory:".parse::<SqliteConnectOptions>()?.foreign_keys(true);

        // A second connection would see a different empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(CREATE_CITIES).execute(&pool).await?;
        sqlx::query(CREATE_READINGS).execute(&pool).await?;
        Ok(WeatherStore { pool })
    }

    pub async fn create_city(&self, city: &NewCity) -> Result<i64, sqlx::Error> {
        let res = sqlx::query(
            "INSERT INTO cities (country_name, country_osm_id, city_name, city_osm_id, latitude, longitude, cron_expression) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&city.country_name)
        .bind(city.country_osm_id)
        .bind(&city.city_name)
        .bind(city.city_osm_id)
        .bind(city.latitude)
        .bind(city.longitude)
        .bind(&city.cron_expression)
        .execute(&self.pool)
        .await?;

        Ok(res.last_insert_rowid())
    }

    pub async fn city(&self, id: i64) -> Result<Option<City>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM cities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// All cities ordered by country name, then city name. The order only
    /// affects iteration and log order, not correctness.
    pub async fn cities(&self) -> Result<Vec<City>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM cities ORDER BY country_name, city_name")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn city_exists(&self, city_osm_id: i64) -> Result<bool, sqlx::Error> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM cities WHERE city_osm_id = ?")
            .bind(city_osm_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(existing.is_some())
    }

    /// Change a city's cron schedule, the only mutable attribute. Returns
    /// false when no city with the given id exists.
    pub async fn set_schedule(&self, id: i64, cron_expression: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("UPDATE cities SET cron_expression = ? WHERE id = ?")
            .bind(cron_expression)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_city(&self, id: i64) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM cities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    /// Append a reading for a city. `recorded_at` is assigned here, not by
    /// the caller, so readings for a city are non-decreasing regardless of
    /// clock skew between the poller and the store.
    pub async fn insert_reading(&self, city_id: i64, temperature: f64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO weather_data (city_id, temperature, recorded_at) VALUES (?, ?, ?)")
            .bind(city_id)
            .bind(temperature)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Full reading history for a city in ascending recorded order.
    pub async fn readings(&self, city_id: i64) -> Result<Vec<Reading>, sqlx::Error> {
        sqlx::query_as("SELECT recorded_at, temperature FROM weather_data WHERE city_id = ? ORDER BY recorded_at ASC, rowid ASC")
            .bind(city_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn latest_reading(&self, city_id: i64) -> Result<Option<Reading>, sqlx::Error> {
        sqlx::query_as(
            "SELECT recorded_at, temperature FROM weather_data WHERE city_id = ? ORDER BY recorded_at DESC, rowid DESC LIMIT 1",
        )
        .bind(city_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Drop the readings table, used by tests to provoke persistence errors.
    #[cfg(test)]
    pub(crate) async fn break_readings(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE weather_data").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn debrecen() -> NewCity {
    NewCity {
        country_name: "Hungary".to_owned(),
        country_osm_id: 21335,
        city_name: "Debrecen".to_owned(),
        city_osm_id: 20308,
        latitude: 47.53,
        longitude: 21.63,
        cron_expression: "*/15 * * * *".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{debrecen, NewCity, WeatherStore};

    fn szeged() -> NewCity {
        NewCity {
            country_name: "Hungary".to_owned(),
            country_osm_id: 21335,
            city_name: "Szeged".to_owned(),
            city_osm_id: 20747,
            latitude: 46.25,
            longitude: 20.14,
            cron_expression: "0 * * * *".to_owned(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_city() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        let id = store.create_city(&debrecen()).await.unwrap();

        let city = store.city(id).await.unwrap().unwrap();
        assert_eq!(city.city_name, "Debrecen");
        assert_eq!(city.country_name, "Hungary");
        assert_eq!(city.cron_expression, "*/15 * * * *");
        assert!(store.city_exists(20308).await.unwrap());
        assert!(!store.city_exists(99999).await.unwrap());
    }

    #[tokio::test]
    async fn cities_are_ordered_by_country_then_city() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        store.create_city(&szeged()).await.unwrap();
        store.create_city(&debrecen()).await.unwrap();
        store
            .create_city(&NewCity {
                country_name: "Austria".to_owned(),
                country_osm_id: 16239,
                city_name: "Wien".to_owned(),
                city_osm_id: 17183,
                latitude: 48.21,
                longitude: 16.37,
                cron_expression: String::new(),
            })
            .await
            .unwrap();

        let names: Vec<String> = store
            .cities()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.city_name)
            .collect();
        assert_eq!(names, vec!["Wien", "Debrecen", "Szeged"]);
    }

    #[tokio::test]
    async fn duplicate_osm_id_is_rejected_by_schema() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        store.create_city(&debrecen()).await.unwrap();
        assert!(store.create_city(&debrecen()).await.is_err());
    }

    #[tokio::test]
    async fn readings_round_trip_in_recorded_order() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        let id = store.create_city(&debrecen()).await.unwrap();

        store.insert_reading(id, 21.0).await.unwrap();
        store.insert_reading(id, 22.5).await.unwrap();
        store.insert_reading(id, -3.25).await.unwrap();

        let history = store.readings(id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].temperature, 21.0);
        assert_eq!(history[2].temperature, -3.25);
        assert!(history.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));

        let latest = store.latest_reading(id).await.unwrap().unwrap();
        assert_eq!(latest.temperature, -3.25);
    }

    #[tokio::test]
    async fn latest_reading_is_none_without_data() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        let id = store.create_city(&debrecen()).await.unwrap();
        assert!(store.latest_reading(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn schedule_update_only_touches_existing_rows() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        let id = store.create_city(&debrecen()).await.unwrap();

        assert!(store.set_schedule(id, "5 * * * *").await.unwrap());
        assert_eq!(store.city(id).await.unwrap().unwrap().cron_expression, "5 * * * *");
        assert!(!store.set_schedule(id + 1, "5 * * * *").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_city_cascades_to_readings() {
        let store = WeatherStore::open_in_memory().await.unwrap();
        let keep = store.create_city(&szeged()).await.unwrap();
        let gone = store.create_city(&debrecen()).await.unwrap();
        store.insert_reading(keep, 18.0).await.unwrap();
        store.insert_reading(gone, 21.0).await.unwrap();

        assert!(store.delete_city(gone).await.unwrap());
        assert!(store.city(gone).await.unwrap().is_none());
        assert!(store.readings(gone).await.unwrap().is_empty());
        assert_eq!(store.readings(keep).await.unwrap().len(), 1);
        assert!(!store.delete_city(gone).await.unwrap());
    }
}
