//! Weather tool server operations.
//!
//! Backed by a fixed table of observations; lookups are case-insensitive and
//! answer with the canonical location name.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result, ToolErrorKind};
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::tools::{parse_args, Tool, ToolRegistry};

/// Name of the lookup operation.
pub const GET_CURRENT_WEATHER: &str = "get_current_weather";
/// Name of the listing operation.
pub const LIST_LOCATIONS: &str = "list_locations";

/// One observation in the backing table.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub temperature_f: f64,
    pub conditions: String,
    pub humidity_pct: u8,
    pub wind_mph: u8,
}

/// Current weather for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature_f: f64,
    pub temperature_c: f64,
    pub conditions: String,
    pub humidity_pct: u8,
    pub wind_mph: u8,
    pub observed_at: DateTime<Utc>,
}

impl WeatherReport {
    /// One-line human readable form.
    pub fn summary(&self) -> String {
        format!(
            "Weather in {}: {:.0}°F ({:.0}°C), {}, humidity {}%, wind {} mph",
            self.location,
            self.temperature_f,
            self.temperature_c,
            self.conditions,
            self.humidity_pct,
            self.wind_mph
        )
    }
}

/// Backing store of known locations.
#[derive(Debug, Clone)]
pub struct WeatherBackend {
    /// Lowercased name -> (canonical name, conditions).
    entries: HashMap<String, (String, Conditions)>,
}

impl WeatherBackend {
    /// Create an empty backend.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace a location.
    pub fn insert(&mut self, name: impl Into<String>, conditions: Conditions) {
        let name = name.into();
        self.entries.insert(name.to_lowercase(), (name, conditions));
    }

    /// Look up a location by name, ignoring case and surrounding whitespace.
    pub fn lookup(&self, location: &str) -> Result<WeatherReport> {
        let key = location.trim().to_lowercase();
        let (name, c) = self.entries.get(&key).ok_or_else(|| {
            Error::tool(
                GET_CURRENT_WEATHER,
                ToolErrorKind::LocationNotFound,
                format!("location not found: {}", location.trim()),
            )
        })?;

        Ok(WeatherReport {
            location: name.clone(),
            temperature_f: c.temperature_f,
            temperature_c: (c.temperature_f - 32.0) * 5.0 / 9.0,
            conditions: c.conditions.clone(),
            humidity_pct: c.humidity_pct,
            wind_mph: c.wind_mph,
            observed_at: Utc::now(),
        })
    }

    /// Canonical names of every known location, sorted.
    pub fn locations(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.values().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }
}

impl Default for WeatherBackend {
    fn default() -> Self {
        let mut backend = Self::empty();
        let table: [(&str, f64, &str, u8, u8); 8] = [
            ("Seattle", 57.0, "light rain", 82, 9),
            ("San Francisco", 63.0, "fog", 75, 12),
            ("New York", 68.0, "partly cloudy", 60, 8),
            ("London", 55.0, "overcast", 78, 11),
            ("Paris", 61.0, "clear", 58, 6),
            ("Berlin", 52.0, "showers", 80, 14),
            ("Tokyo", 72.0, "sunny", 55, 5),
            ("Sydney", 77.0, "sunny", 48, 10),
        ];
        for (name, temperature_f, conditions, humidity_pct, wind_mph) in table {
            backend.insert(
                name,
                Conditions {
                    temperature_f,
                    conditions: conditions.into(),
                    humidity_pct,
                    wind_mph,
                },
            );
        }
        backend
    }
}

/// Registry for the weather server.
pub fn registry(backend: WeatherBackend) -> ToolRegistry {
    let backend = Arc::new(backend);
    ToolRegistry::new()
        .with(Arc::new(GetWeatherTool {
            backend: backend.clone(),
        }))
        .with(Arc::new(ListLocationsTool { backend }))
}

/// Current weather for a named location.
pub struct GetWeatherTool {
    backend: Arc<WeatherBackend>,
}

#[derive(Debug, Deserialize)]
struct GetWeatherArgs {
    location: String,
}

#[async_trait::async_trait]
impl Tool for GetWeatherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GET_CURRENT_WEATHER.into(),
            description: "Get the current weather for a location.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City name, e.g. Seattle"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let args: GetWeatherArgs = parse_args(GET_CURRENT_WEATHER, arguments)?;
        let report = self.backend.lookup(&args.location)?;
        Ok(ToolCallResult::structured(
            report.summary(),
            serde_json::to_value(&report)?,
        ))
    }
}

/// Known location names.
pub struct ListLocationsTool {
    backend: Arc<WeatherBackend>,
}

#[async_trait::async_trait]
impl Tool for ListLocationsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: LIST_LOCATIONS.into(),
            description: "List the locations with weather data.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolCallResult> {
        let locations = self.backend.locations();
        Ok(ToolCallResult::structured(
            locations.join(", "),
            json!({ "locations": locations }),
        ))
    }
}
