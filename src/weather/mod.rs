//! Current-conditions lookup against the OpenWeatherMap API.
//!
//! Stateless request/response with a bounded client timeout; no
//! caching. Every failure mode collapses into [`WeatherError`] since
//! the pipeline treats them all the same way.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::WeatherError;
use crate::location::Coordinates;

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub temperature_c: f64,
    pub label: String,
    pub place: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    main: String,
}

fn to_current(payload: WeatherResponse) -> CurrentWeather {
    CurrentWeather {
        temperature_c: payload.main.temp,
        label: payload
            .weather
            .first()
            .map(|condition| condition.main.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        place: payload.name,
    }
}

#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn current(&self, coordinates: Coordinates) -> Result<CurrentWeather, WeatherError>;
}

#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: OPENWEATHER_URL.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl WeatherApi for WeatherClient {
    async fn current(&self, coordinates: Coordinates) -> Result<CurrentWeather, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
                ("units", "metric".to_string()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status()));
        }

        let payload: WeatherResponse = response.json().await?;
        Ok(to_current(payload))
    }
}
