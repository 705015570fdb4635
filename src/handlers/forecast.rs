//! `get_forecast` tool.

use crate::error::ToolError;
use crate::handlers::{CITIES, City, find_city};
use crate::protocol::{CallToolResult, Tool};
use crate::registry::ToolExecutor;
use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// Days returned when the caller does not ask for a specific count.
pub const DEFAULT_DAYS: u8 = 3;
pub const MAX_DAYS: u8 = 7;

const CONDITIONS: &[&str] = &[
    "Sunny",
    "Partly cloudy",
    "Overcast",
    "Light rain",
    "Showers",
    "Windy",
];

#[derive(Debug, Deserialize)]
pub struct ForecastArgs {
    pub city: String,
    #[serde(default)]
    pub days: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub conditions: &'static str,
    pub high_c: i32,
    pub low_c: i32,
    pub precipitation_pct: u32,
}

pub struct ForecastTool {
    start_date: Option<NaiveDate>,
}

impl ForecastTool {
    pub fn new() -> Self {
        Self { start_date: None }
    }

    /// Pin the first forecast day instead of using today.
    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn forecast(&self, city: &City, days: u8) -> Vec<DailyForecast> {
        let start = self
            .start_date
            .unwrap_or_else(|| Local::now().date_naive());
        let seed: u32 = city.name.bytes().map(u32::from).sum();

        (0..u32::from(days))
            .filter_map(|day| {
                let date = start.checked_add_days(Days::new(u64::from(day)))?;
                let swing = ((seed + day * 7) % 5) as i32 - 2;
                let high_c = city.base_high_c + swing;
                Some(DailyForecast {
                    date,
                    conditions: CONDITIONS[((seed + day * 3) as usize) % CONDITIONS.len()],
                    high_c,
                    low_c: high_c - 6 - ((seed + day) % 3) as i32,
                    precipitation_pct: (seed * 13 + day * 29) % 100,
                })
            })
            .collect()
    }
}

impl Default for ForecastTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ForecastTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "get_forecast",
            description: "Get the weather forecast for a city. Returns one line per day \
                with conditions, temperatures in Celsius and chance of precipitation.",
            schema: {
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "City name, e.g. \"Tokyo\"",
                        "minLength": 1
                    },
                    "days": {
                        "type": "integer",
                        "description": "Number of days to forecast (default: 3)",
                        "minimum": 1,
                        "maximum": 7
                    }
                },
                "required": ["city"]
            }
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "get_forecast"))]
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let args: ForecastArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let days = args.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);

        let Some(city) = find_city(&args.city) else {
            let known: Vec<_> = CITIES.iter().map(|c| c.name).collect();
            return Err(ToolError::Domain(format!(
                "No forecast data for '{}'. Known cities: {}",
                args.city,
                known.join(", ")
            )));
        };

        debug!("Forecasting {} days for {}", days, city.name);

        let mut text = format!(
            "Forecast for {}, {} ({:.2}, {:.2}):\n",
            city.name, city.country, city.latitude, city.longitude
        );
        for day in self.forecast(city, days) {
            text.push_str(&format!(
                "\n{}: {}, high {}°C / low {}°C, precipitation {}%",
                day.date, day.conditions, day.high_c, day.low_c, day.precipitation_pct
            ));
        }

        Ok(CallToolResult::text(text))
    }
}
