//! Demo handler set: a weather service backed by synthetic data.

pub mod alerts;
pub mod cities;
pub mod forecast;

pub use alerts::AlertsTool;
pub use cities::CitiesResource;
pub use forecast::ForecastTool;

use crate::error::RegistryError;
use crate::registry::CapabilityRegistry;
use serde::Serialize;
use std::sync::Arc;

/// A city the synthetic backend knows about.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub name: &'static str,
    pub country: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip)]
    base_high_c: i32,
}

const fn city(
    name: &'static str,
    country: &'static str,
    latitude: f64,
    longitude: f64,
    base_high_c: i32,
) -> City {
    City {
        name,
        country,
        latitude,
        longitude,
        base_high_c,
    }
}

pub const CITIES: &[City] = &[
    city("Tokyo", "JP", 35.68, 139.69, 21),
    city("London", "GB", 51.51, -0.13, 14),
    city("New York", "US", 40.71, -74.01, 17),
    city("San Francisco", "US", 37.77, -122.42, 19),
    city("Sydney", "AU", -33.87, 151.21, 23),
    city("Nairobi", "KE", -1.29, 36.82, 25),
    city("Lima", "PE", -12.05, -77.04, 20),
    city("Oslo", "NO", 59.91, 10.75, 8),
];

/// Case-insensitive city lookup.
pub fn find_city(name: &str) -> Option<&'static City> {
    let name = name.trim();
    CITIES.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Register every demo tool and resource.
pub fn create_registry() -> Result<CapabilityRegistry, RegistryError> {
    let mut registry = CapabilityRegistry::new();

    registry.register_tool(ForecastTool::new())?;
    registry.register_tool(AlertsTool::new())?;
    registry.register_resource(cities::resource(), Arc::new(CitiesResource))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_city() {
        assert_eq!(find_city("tokyo").unwrap().country, "JP");
        assert_eq!(find_city("  New York ").unwrap().name, "New York");
        assert!(find_city("Atlantis").is_none());
    }

    #[test]
    fn test_create_registry() {
        let registry = create_registry().unwrap();
        let names: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["get_forecast", "get_alerts"]);
        assert_eq!(registry.list_resources()[0].uri, cities::CITIES_URI);
    }

    async fn ready_dispatcher() -> crate::protocol::Dispatcher {
        use crate::protocol::{Dispatcher, HandshakeCoordinator, JsonRpcRequest, ServerInfo};

        let registry = Arc::new(create_registry().unwrap());
        let handshake = Arc::new(HandshakeCoordinator::new(registry.capabilities()));
        handshake.open();
        let dispatcher = Dispatcher::new(
            registry,
            Arc::clone(&handshake),
            ServerInfo {
                name: "weather".into(),
                version: "0.1.0".into(),
            },
        );

        let init = JsonRpcRequest::new(0, "initialize").with_params(serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "host", "version": "1.0"}
        }));
        dispatcher.dispatch(init).await.unwrap();
        handshake.complete().unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn test_forecast_through_dispatcher() {
        use crate::protocol::JsonRpcRequest;

        let dispatcher = ready_dispatcher().await;
        let request = JsonRpcRequest::new(2, "tools/call").with_params(serde_json::json!({
            "name": "get_forecast",
            "arguments": {"city": "Tokyo"}
        }));
        let response = dispatcher.dispatch(request).await.unwrap();

        let text = response.result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Forecast for Tokyo"));
        assert_eq!(text.lines().filter(|l| l.contains("°C")).count(), 3);
        assert!(response.result.get("isError").is_none());
    }

    #[tokio::test]
    async fn test_missing_city_is_invalid_params() {
        use crate::protocol::JsonRpcRequest;

        let dispatcher = ready_dispatcher().await;
        let request = JsonRpcRequest::new(3, "tools/call").with_params(serde_json::json!({
            "name": "get_forecast",
            "arguments": {"days": 3}
        }));
        let error = dispatcher.dispatch(request).await.unwrap_err();
        assert_eq!(error.error.code, -32602);

        let request = JsonRpcRequest::new(4, "tools/call").with_params(serde_json::json!({
            "name": "get_forecast",
            "arguments": {"city": "Atlantis"}
        }));
        let response = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(response.result["isError"], true);
    }
}
