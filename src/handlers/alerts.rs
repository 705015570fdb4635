//! `get_alerts` tool.

use crate::error::ToolError;
use crate::protocol::{CallToolResult, Tool};
use crate::registry::ToolExecutor;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

const STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

const ACTIVE_ALERTS: &[(&str, &[&str])] = &[
    (
        "CA",
        &[
            "Red Flag Warning: critical fire weather in the Sierra foothills until 8 PM",
            "Wind Advisory: gusts to 50 mph along the coastal ranges",
        ],
    ),
    (
        "FL",
        &["Rip Current Statement: high risk of rip currents on Atlantic beaches"],
    ),
    (
        "TX",
        &["Heat Advisory: heat index values up to 110 in the Rio Grande valley"],
    ),
];

#[derive(Debug, Deserialize)]
pub struct AlertsArgs {
    pub state: String,
}

#[derive(Default)]
pub struct AlertsTool;

impl AlertsTool {
    pub fn new() -> Self {
        Self
    }

    pub fn alerts_for(&self, state: &str) -> &'static [&'static str] {
        ACTIVE_ALERTS
            .iter()
            .find(|(code, _)| *code == state)
            .map(|(_, alerts)| *alerts)
            .unwrap_or(&[])
    }
}

#[async_trait]
impl ToolExecutor for AlertsTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "get_alerts",
            description: "Get active weather alerts for a US state.",
            schema: {
                "type": "object",
                "properties": {
                    "state": {
                        "type": "string",
                        "description": "Two-letter US state code (e.g. CA, NY)",
                        "pattern": "^[A-Z]{2}$"
                    }
                },
                "required": ["state"]
            }
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "get_alerts"))]
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let args: AlertsArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if !STATE_CODES.contains(&args.state.as_str()) {
            return Err(ToolError::Domain(format!(
                "'{}' is not a US state code",
                args.state
            )));
        }

        let alerts = self.alerts_for(&args.state);
        if alerts.is_empty() {
            return Ok(CallToolResult::text(format!(
                "No active alerts for {}",
                args.state
            )));
        }

        let lines: Vec<_> = alerts.iter().map(|a| format!("- {}", a)).collect();
        Ok(CallToolResult::text(format!(
            "Active alerts for {}:\n{}",
            args.state,
            lines.join("\n")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolContent;

    #[tokio::test]
    async fn test_alerts() {
        let result = AlertsTool::new()
            .call(serde_json::json!({"state": "CA"}))
            .await
            .unwrap();
        let ToolContent::Text { text } = &result.content[0] else {
            panic!("expected text");
        };
        assert!(text.contains("Red Flag Warning"));

        let result = AlertsTool::new()
            .call(serde_json::json!({"state": "VT"}))
            .await
            .unwrap();
        assert_eq!(result, CallToolResult::text("No active alerts for VT"));
    }

    #[tokio::test]
    async fn test_unknown_state_is_domain_error() {
        let err = AlertsTool::new()
            .call(serde_json::json!({"state": "ZZ"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Domain(_)));
    }
}
