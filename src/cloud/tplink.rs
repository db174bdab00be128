//! JSON-RPC client for the TP-Link (Kasa) cloud.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{CloudClient, CloudError, EmeterStatus};
use crate::models::CloudCredentials;

/// Only energy-metering plugs are of interest.
const EMETER_MODEL_PREFIX: &str = "HS110";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDevice {
    pub device_id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub app_server_url: Option<String>,
    #[serde(default)]
    pub device_model: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    error_code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct TpLinkCloud {
    http: reqwest::Client,
    default_url: String,
}

impl TpLinkCloud {
    pub fn new(default_url: impl Into<String>, timeout: Duration) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            default_url: default_url.into(),
        })
    }

    async fn request(
        &self,
        credentials: &CloudCredentials,
        method: &str,
        params: Value,
    ) -> Result<Value, CloudError> {
        let token = credentials.token.as_deref().filter(|t| !t.is_empty());
        if token.is_none() && method != "login" {
            return Err(CloudError::MissingToken);
        }

        let url = credentials
            .app_server_url
            .as_deref()
            .unwrap_or(&self.default_url);

        let mut request = self
            .http
            .post(url)
            .json(&json!({ "method": method, "params": params }));
        if method != "login" {
            if let Some(token) = token {
                request = request.query(&[("token", token)]);
            }
        }

        debug!(method, url, "TP-Link cloud request");
        let response: ApiResponse = request.send().await?.error_for_status()?.json().await?;

        if response.error_code != 0 {
            return Err(CloudError::from_api(
                response.error_code,
                response.msg.unwrap_or_default(),
            ));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Relay a `{module: {action: {}}}` command to the device itself.
    pub async fn passthrough(
        &self,
        credentials: &CloudCredentials,
        module: &str,
        action: &str,
    ) -> Result<Value, CloudError> {
        let device_id = credentials
            .device_id
            .as_deref()
            .ok_or_else(|| CloudError::Decode("no device id configured".into()))?;

        let request_data = json!({ module: { action: {} } }).to_string();
        let result = self
            .request(
                credentials,
                "passthrough",
                json!({ "deviceId": device_id, "requestData": request_data }),
            )
            .await?;

        decode_passthrough(&result, module, action)
    }
}

#[async_trait]
impl CloudClient for TpLinkCloud {
    async fn login(&self, credentials: &CloudCredentials) -> Result<String, CloudError> {
        let (Some(email), Some(password)) = (&credentials.email, &credentials.password) else {
            return Err(CloudError::Auth("email and password are required".into()));
        };

        let result = self
            .request(
                credentials,
                "login",
                json!({
                    "appType": "Kasa_Android",
                    "cloudUserName": email,
                    "cloudPassword": password,
                    "terminalUUID": "",
                }),
            )
            .await
            .map_err(|e| match e {
                CloudError::Api { code, msg } => {
                    CloudError::Auth(format!("login rejected ({}): {}", code, msg))
                }
                other => other,
            })?;

        result
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CloudError::Auth("login returned no token".into()))
    }

    async fn get_emeter_status(
        &self,
        credentials: &CloudCredentials,
    ) -> Result<EmeterStatus, CloudError> {
        let realtime = self.passthrough(credentials, "emeter", "get_realtime").await?;
        parse_emeter(&realtime)
    }

    async fn get_device_list(
        &self,
        credentials: &CloudCredentials,
    ) -> Result<Vec<CloudDevice>, CloudError> {
        let result = self.request(credentials, "getDeviceList", json!({})).await?;
        let devices = result
            .get("deviceList")
            .cloned()
            .ok_or_else(|| CloudError::Decode("missing deviceList".into()))?;
        let devices: Vec<CloudDevice> =
            serde_json::from_value(devices).map_err(|e| CloudError::Decode(e.to_string()))?;

        Ok(devices
            .into_iter()
            .filter(|d| d.device_model.starts_with(EMETER_MODEL_PREFIX))
            .collect())
    }
}

fn decode_passthrough(result: &Value, module: &str, action: &str) -> Result<Value, CloudError> {
    let raw = result
        .get("responseData")
        .and_then(Value::as_str)
        .ok_or_else(|| CloudError::Decode("result does not contain responseData".into()))?;
    let response: Value =
        serde_json::from_str(raw).map_err(|e| CloudError::Decode(e.to_string()))?;

    response
        .get(module)
        .ok_or_else(|| CloudError::Decode(format!("responseData does not contain {}", module)))?
        .get(action)
        .cloned()
        .ok_or_else(|| {
            CloudError::Decode(format!("responseData.{} does not contain {}", module, action))
        })
}

/// Older firmware reports `power` (W) and `total` (kWh); newer reports
/// `power_mw` and `total_wh`.
fn parse_emeter(realtime: &Value) -> Result<EmeterStatus, CloudError> {
    if !realtime.is_object() {
        return Err(CloudError::Decode("emeter status is not an object".into()));
    }

    let err_code = realtime.get("err_code").and_then(Value::as_i64).unwrap_or(0);
    if err_code != 0 {
        let msg = realtime
            .get("err_msg")
            .and_then(Value::as_str)
            .unwrap_or("emeter error");
        return Err(CloudError::Api {
            code: err_code,
            msg: msg.to_string(),
        });
    }

    let field = |name: &str, scaled: &str, divisor: f64| {
        realtime
            .get(name)
            .and_then(Value::as_f64)
            .or_else(|| realtime.get(scaled).and_then(Value::as_f64).map(|v| v / divisor))
    };

    let power = field("power", "power_mw", 1000.0)
        .ok_or_else(|| CloudError::Decode("emeter status has no power".into()))?;
    let total = field("total", "total_wh", 1000.0)
        .ok_or_else(|| CloudError::Decode("emeter status has no total".into()))?;

    Ok(EmeterStatus { power, total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_emeter() {
        let status = parse_emeter(&json!({
            "current": 0.7, "voltage": 231.2, "power": 158.4, "total": 12.5, "err_code": 0
        }))
        .unwrap();
        assert_eq!(status, EmeterStatus { power: 158.4, total: 12.5 });
    }

    #[test]
    fn test_parse_milli_unit_emeter() {
        let status = parse_emeter(&json!({
            "voltage_mv": 231200, "power_mw": 2500, "total_wh": 12500, "err_code": 0
        }))
        .unwrap();
        assert_eq!(status, EmeterStatus { power: 2.5, total: 12.5 });
    }

    #[test]
    fn test_parse_emeter_error_code() {
        let err = parse_emeter(&json!({ "err_code": -1, "err_msg": "module not support" }))
            .unwrap_err();
        assert!(matches!(err, CloudError::Api { code: -1, .. }));
    }

    #[test]
    fn test_parse_emeter_rejects_non_object() {
        assert!(matches!(
            parse_emeter(&json!("nope")),
            Err(CloudError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_passthrough() {
        let result = json!({
            "responseData": "{\"emeter\":{\"get_realtime\":{\"power\":3.1,\"total\":0.5,\"err_code\":0}}}"
        });
        let realtime = decode_passthrough(&result, "emeter", "get_realtime").unwrap();
        assert_eq!(realtime["power"], json!(3.1));
    }

    #[test]
    fn test_decode_passthrough_missing_action() {
        let result = json!({ "responseData": "{\"emeter\":{}}" });
        let err = decode_passthrough(&result, "emeter", "get_realtime").unwrap_err();
        assert!(err.to_string().contains("get_realtime"));
    }

    #[tokio::test]
    async fn test_requests_without_token_fail_fast() {
        let cloud = TpLinkCloud::new("http://127.0.0.1:9/", Duration::from_millis(50)).unwrap();
        let credentials = CloudCredentials {
            device_id: Some("8006".into()),
            ..CloudCredentials::default()
        };
        let err = cloud.get_emeter_status(&credentials).await.unwrap_err();
        assert!(matches!(err, CloudError::MissingToken));
    }

    #[tokio::test]
    async fn test_login_requires_email_and_password() {
        let cloud = TpLinkCloud::new("http://127.0.0.1:9/", Duration::from_millis(50)).unwrap();
        let err = cloud.login(&CloudCredentials::default()).await.unwrap_err();
        assert!(matches!(err, CloudError::Auth(_)));
    }
}
