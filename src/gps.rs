//! Live vehicle positions and track history from the telemetry vendor.
//!
//! Two provider accounts are queried concurrently; one failing never hides the
//! other's vehicles.

use std::fmt;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::fetch::{Fallback, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Primary,
    Secondary,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Primary => "primary",
            Provider::Secondary => "secondary",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("primary") {
            Provider::Primary
        } else {
            Provider::Secondary
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One vendor vehicle object, passed through untouched and tagged with its provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveVehicle {
    pub provider: Provider,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LiveVehicle {
    fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Registration shown to users, commas replaced so it is safe in flat exports.
    pub fn vehicle_no(&self) -> String {
        ["name", "vehicle_no", "vehicleNo"]
            .iter()
            .find_map(|k| self.text(k).filter(|v| !v.is_empty()))
            .unwrap_or_default()
            .replace(',', " ")
    }

    pub fn log_row(&self, timestamp: DateTime<Utc>) -> GpsLogRow {
        GpsLogRow {
            timestamp: timestamp.to_rfc3339(),
            vehicle_no: self.vehicle_no(),
            provider: self.provider.name().to_string(),
            lat: self.text("lat").unwrap_or_default(),
            lng: self.text("lng").unwrap_or_default(),
            speed: self.text("speed").unwrap_or_default(),
        }
    }
}

/// Daily position log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsLogRow {
    pub timestamp: String,
    pub vehicle_no: String,
    pub provider: String,
    pub lat: String,
    pub lng: String,
    pub speed: String,
}

/// Track history: parsed JSON when the vendor sends JSON, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryPayload {
    Json(Value),
    Text(String),
}

/// Parses a live-positions body. Anything unusable yields an empty list.
pub fn parse_live_body(body: &str, provider: Provider) -> Vec<LiveVehicle> {
    let cleaned = body.trim_start_matches('\u{feff}').trim();
    let json: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Provider returned invalid JSON");
            return Vec::new();
        }
    };

    let items = match json {
        Value::Object(ref obj) if obj.get("success") == Some(&Value::Bool(false)) => {
            debug!(provider = %provider, "Provider reported success=false");
            return Vec::new();
        }
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(fields) => Some(LiveVehicle { provider, fields }),
            _ => None,
        })
        .collect()
}

pub struct GpsProxy<D, R> {
    routes: Fallback<D, R>,
    base_url: String,
    primary_key: Option<String>,
    secondary_key: Option<String>,
}

impl<D: Transport, R: Transport> GpsProxy<D, R> {
    pub fn new(config: &AppConfig, direct: D, relay: R) -> Result<Self> {
        let base_url = config
            .gps_base_url
            .clone()
            .context("GPS_BASE_URL must be set")?;
        Ok(GpsProxy {
            routes: Fallback {
                direct,
                relay,
                relay_prefix: config.relay_prefix.clone(),
                direct_timeout: config.direct_timeout,
                relay_timeout: config.relay_timeout,
            },
            base_url,
            primary_key: config.gps_primary_key.clone(),
            secondary_key: config.gps_secondary_key.clone(),
        })
    }

    fn key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Primary => self.primary_key.as_deref(),
            Provider::Secondary => self.secondary_key.as_deref(),
        }
    }

    fn target_url(&self, key: &str, cmd: &str) -> Result<String> {
        let url = Url::parse_with_params(&self.base_url, &[("key", key), ("cmd", cmd)])
            .with_context(|| format!("Invalid GPS base URL {}", self.base_url))?;
        Ok(url.to_string())
    }

    async fn fetch_source(&self, provider: Provider) -> Vec<LiveVehicle> {
        let Some(key) = self.key(provider) else {
            debug!(provider = %provider, "No key configured, skipping provider");
            return Vec::new();
        };
        let url = match self.target_url(key, "ALL,*") {
            Ok(url) => url,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Cannot build provider URL");
                return Vec::new();
            }
        };
        match self.routes.fetch(&url, provider.name()).await {
            Ok(body) => {
                let vehicles = parse_live_body(&body, provider);
                info!(provider = %provider, count = vehicles.len(), "Fetched live vehicles");
                vehicles
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "Provider unavailable");
                Vec::new()
            }
        }
    }

    /// Live vehicles from both providers, primary first.
    #[tracing::instrument(skip(self))]
    pub async fn live(&self) -> Vec<LiveVehicle> {
        let (primary, secondary) = tokio::join!(
            self.fetch_source(Provider::Primary),
            self.fetch_source(Provider::Secondary)
        );
        let mut all = primary;
        all.extend(secondary);
        all
    }

    /// Track history for one device between two vendor timestamps.
    #[tracing::instrument(skip(self))]
    pub async fn history(
        &self,
        device_id: &str,
        from: &str,
        to: &str,
        provider: Provider,
    ) -> Result<HistoryPayload> {
        if device_id.trim().is_empty() || from.trim().is_empty() || to.trim().is_empty() {
            bail!("device id, from and to are required");
        }
        let Some(key) = self.key(provider) else {
            bail!("no key configured for provider {provider}");
        };
        let url = self.target_url(key, &format!("TRACK,{device_id},{from},{to}"))?;
        let body = self.routes.fetch(&url, provider.name()).await?;

        let cleaned = body.trim_start_matches('\u{feff}').trim();
        Ok(match serde_json::from_str::<Value>(cleaned) {
            Ok(json) => HistoryPayload::Json(json),
            Err(_) => HistoryPayload::Text(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockTransport;

    const BASE: &str = "https://vendor.test/api.php";

    fn config(secondary: Option<&str>) -> AppConfig {
        AppConfig {
            gps_base_url: Some(BASE.to_string()),
            gps_primary_key: Some("PKEY".to_string()),
            gps_secondary_key: secondary.map(String::from),
            relay_prefix: "https://relay.test/fetch/".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_live_body_shapes() {
        let arr = parse_live_body(
            "\u{feff}[{\"name\":\"UP85, AB 1\",\"lat\":27.5}]",
            Provider::Primary,
        );
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0].vehicle_no(), "UP85  AB 1");

        let wrapped = parse_live_body("{\"data\":[{\"vehicle_no\":\"X\"},3]}", Provider::Secondary);
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].provider, Provider::Secondary);

        assert!(parse_live_body("{\"success\":false,\"data\":[{}]}", Provider::Primary).is_empty());
        assert!(parse_live_body("<html>busy</html>", Provider::Primary).is_empty());
    }

    #[test]
    fn test_vehicle_serializes_with_provider_tag() {
        let v = &parse_live_body("[{\"name\":\"V1\",\"speed\":12}]", Provider::Primary)[0];
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["provider"], "primary");
        assert_eq!(json["name"], "V1");

        let row = v.log_row(Utc::now());
        assert_eq!(row.speed, "12");
        assert_eq!(row.lat, "");
    }

    #[tokio::test]
    async fn test_one_provider_failing_keeps_the_other() {
        let direct =
            MockTransport::default().with(&format!("{BASE}?key=PKEY"), "[{\"name\":\"V1\"}]");
        let proxy = GpsProxy::new(&config(Some("SKEY")), direct, MockTransport::default()).unwrap();

        let vehicles = proxy.live().await;
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].provider, Provider::Primary);
    }

    #[tokio::test]
    async fn test_relay_serves_provider_when_direct_fails() {
        let relay = MockTransport::default().with(
            &format!("https://relay.test/fetch/{BASE}?key=SKEY"),
            "{\"data\":[{\"name\":\"V2\"}]}",
        );
        let proxy = GpsProxy::new(&config(Some("SKEY")), MockTransport::default(), relay).unwrap();

        let vehicles = proxy.live().await;
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].provider, Provider::Secondary);
    }

    #[tokio::test]
    async fn test_missing_key_skips_provider() {
        let direct = MockTransport::default().with(BASE, "[{\"name\":\"V\"}]");
        let proxy = GpsProxy::new(&config(None), direct, MockTransport::default()).unwrap();
        let vehicles = proxy.live().await;
        assert_eq!(vehicles.len(), 1);
        assert_eq!(proxy.routes.direct.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_history_json_or_text() {
        let direct = MockTransport::default().with(BASE, "time,lat\n1,2\n");
        let proxy = GpsProxy::new(&config(None), direct, MockTransport::default()).unwrap();
        let text = proxy
            .history("D1", "2025-01-01 06:00", "2025-01-01 14:00", Provider::Primary)
            .await
            .unwrap();
        assert_eq!(text, HistoryPayload::Text("time,lat\n1,2\n".to_string()));

        let direct = MockTransport::default().with(BASE, "{\"points\":[]}");
        let proxy = GpsProxy::new(&config(None), direct, MockTransport::default()).unwrap();
        let json = proxy.history("D1", "a", "b", Provider::Primary).await.unwrap();
        assert!(matches!(json, HistoryPayload::Json(_)));

        assert!(proxy.history("D1", "a", "b", Provider::Secondary).await.is_err());
        assert!(proxy.history("", "a", "b", Provider::Primary).await.is_err());
    }
}
