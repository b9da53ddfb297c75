//! API Gateway REST proxy integration.
//!
//! Translates proxy events into [`ApiRequest`]s and [`ApiResponse`]s back
//! into proxy responses. Only the fields the ride API reads are modelled;
//! everything else in the event is ignored.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use wildrydes_lib::{ApiRequest, ApiResponse, Dispatch, Outcome, ProblemDetails, RideApi};

/// Inbound REST proxy event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: Option<ProxyRequestContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequestContext {
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Outbound REST proxy response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl From<ApiResponse> for ProxyResponse {
    fn from(response: ApiResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            status_code: response.status.as_u16(),
            headers,
            body: String::from_utf8_lossy(&response.body).into_owned(),
            is_base64_encoded: false,
        }
    }
}

impl ProxyRequest {
    /// The API Gateway request id, if the event carries one.
    pub fn request_id(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.request_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Convert into an [`ApiRequest`].
    ///
    /// Single-value headers win over multi-value ones of the same name.
    pub fn into_api_request(self, request_id: &str) -> Result<ApiRequest, String> {
        let method = Method::from_bytes(self.http_method.as_bytes())
            .map_err(|_| format!("invalid HTTP method {:?}", self.http_method))?;

        let body = match self.body {
            Some(body) if self.is_base64_encoded => STANDARD
                .decode(body.as_bytes())
                .map_err(|e| format!("body is not valid base64: {}", e))?,
            Some(body) => body.into_bytes(),
            None => Vec::new(),
        };

        let mut request = ApiRequest::new(method, self.path)
            .with_body(body)
            .with_request_id(request_id);

        let single = self.headers.unwrap_or_default();
        for (name, value) in &single {
            request = request.with_header(name, value);
        }
        for (name, values) in self.multi_value_headers.unwrap_or_default() {
            if single.keys().any(|k| k.eq_ignore_ascii_case(&name)) {
                continue;
            }
            for value in &values {
                request = request.with_header(&name, value);
            }
        }

        Ok(request)
    }
}

/// Handle one proxy event.
///
/// Events that cannot be read as a proxy request get a 400 problem response.
/// `invocation_id` is used as the request id when the event has none.
pub async fn handle_proxy_event(api: &RideApi, event: Value, invocation_id: &str) -> ProxyResponse {
    let proxy: ProxyRequest = match serde_json::from_value(event) {
        Ok(proxy) => proxy,
        Err(e) => {
            warn!(request_id = invocation_id, error = %e, "unreadable proxy event");
            return reject(api, invocation_id, "event is not an API Gateway proxy request");
        }
    };

    let request_id = proxy.request_id().unwrap_or(invocation_id).to_string();
    let request = match proxy.into_api_request(&request_id) {
        Ok(request) => request,
        Err(detail) => {
            warn!(request_id = %request_id, error = %detail, "invalid proxy request");
            return reject(api, &request_id, detail);
        }
    };

    let Dispatch { response, .. } = api.dispatch(request).await;
    response.into()
}

fn reject(api: &RideApi, request_id: &str, detail: impl Into<String>) -> ProxyResponse {
    let dispatch = api.reject(
        ProblemDetails::bad_request(detail, request_id),
        Outcome::BadPayload,
    );
    dispatch.response.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_fields_are_read() {
        let proxy: ProxyRequest = serde_json::from_value(json!({
            "httpMethod": "POST",
            "path": "/ride",
            "headers": {"Authorization": "Bearer abc"},
            "body": "{}",
            "isBase64Encoded": false,
            "requestContext": {"requestId": "gw-1", "stage": "prod"}
        }))
        .unwrap();

        assert_eq!(proxy.request_id(), Some("gw-1"));
        let request = proxy.into_api_request("gw-1").unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.authorization(), Some("Bearer abc"));
        assert_eq!(request.body, b"{}");
    }

    #[test]
    fn null_headers_and_body_are_accepted() {
        let proxy: ProxyRequest = serde_json::from_value(json!({
            "httpMethod": "OPTIONS",
            "path": "/ride",
            "headers": null,
            "body": null
        }))
        .unwrap();

        assert!(proxy.request_id().is_none());
        let request = proxy.into_api_request("inv-1").unwrap();
        assert!(request.body.is_empty());
        assert!(request.headers.is_empty());
        assert_eq!(request.request_id, "inv-1");
    }

    #[test]
    fn base64_body_is_decoded() {
        let proxy = ProxyRequest {
            http_method: "POST".to_string(),
            path: "/ride".to_string(),
            body: Some(STANDARD.encode(b"{\"a\":1}")),
            is_base64_encoded: true,
            ..ProxyRequest::default()
        };

        assert_eq!(proxy.into_api_request("r").unwrap().body, b"{\"a\":1}");
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let proxy = ProxyRequest {
            http_method: "POST".to_string(),
            path: "/ride".to_string(),
            body: Some("!!not base64!!".to_string()),
            is_base64_encoded: true,
            ..ProxyRequest::default()
        };

        assert!(proxy.into_api_request("r").unwrap_err().contains("base64"));
    }

    #[test]
    fn multi_value_headers_fill_gaps() {
        let proxy: ProxyRequest = serde_json::from_value(json!({
            "httpMethod": "POST",
            "path": "/ride",
            "headers": {"authorization": "Bearer single"},
            "multiValueHeaders": {
                "Authorization": ["Bearer multi"],
                "Content-Type": ["application/json"]
            }
        }))
        .unwrap();

        let request = proxy.into_api_request("r").unwrap();
        assert_eq!(request.authorization(), Some("Bearer single"));
        assert_eq!(request.headers.get_all("authorization").iter().count(), 1);
        assert_eq!(
            request.headers.get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn response_serializes_in_proxy_shape() {
        let mut api_response = ApiResponse::empty(http::StatusCode::NO_CONTENT);
        api_response.headers.insert(
            "access-control-allow-origin",
            http::HeaderValue::from_static("*"),
        );

        let json = serde_json::to_value(ProxyResponse::from(api_response)).unwrap();

        assert_eq!(json["statusCode"], 204);
        assert_eq!(json["headers"]["access-control-allow-origin"], "*");
        assert_eq!(json["body"], "");
        assert_eq!(json["isBase64Encoded"], false);
    }
}
