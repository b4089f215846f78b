use async_trait::async_trait;
use loomcore::{ConfigFieldError, Node, NodeConfig, NodeContext, NodeError, NodeOutput, Value};
use loomruntime::{NodeDefinition, NodeFactory};
use reqwest::{Method, Url};
use serde_json::json;
use std::collections::HashMap;

const METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// HTTP request node.
///
/// Transport errors and non-2xx statuses do not fail the run; they come back
/// as `success: false` outputs for a downstream condition to inspect.
pub struct HttpRequestNode {
    client: reqwest::Client,
    config: NodeConfig,
}

impl HttpRequestNode {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> Result<Url, String> {
        let raw = self
            .config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| "is required".to_string())?;
        let url = Url::parse(raw).map_err(|e| format!("is not a valid URL: {}", e))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(format!("scheme must be http or https, got {}", other)),
        }
    }

    fn method(&self) -> Result<Method, String> {
        let raw = match self.config.get("method") {
            None => return Ok(Method::GET),
            Some(value) => value.as_str().ok_or_else(|| "must be a string".to_string())?,
        };
        let upper = raw.to_uppercase();
        if !METHODS.contains(&upper.as_str()) {
            return Err(format!("unsupported method: {}", raw));
        }
        Method::from_bytes(upper.as_bytes()).map_err(|e| e.to_string())
    }

    fn failure(message: String) -> NodeOutput {
        NodeOutput::new()
            .with_output("success", false)
            .with_output("status", 0.0)
            .with_output("error", message)
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    fn node_type(&self) -> &str {
        "http_request"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let url = self.url().map_err(|e| NodeError::Configuration(format!("url {}", e)))?;
        let method = self
            .method()
            .map_err(|e| NodeError::Configuration(format!("method {}", e)))?;

        tracing::info!(node_id = %ctx.node_id, %method, %url, "Sending HTTP request");

        let mut request = self.client.request(method.clone(), url);

        if let Some(Value::Object(headers)) = self.config.get("headers") {
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    request = request.header(key, val_str);
                }
            }
        }

        if method != Method::GET && method != Method::HEAD {
            let body = self.config.get("body").or_else(|| ctx.find_input("body"));
            request = match body {
                Some(Value::String(text)) => request.body(text.clone()),
                Some(value) if !value.is_null() => request.json(value),
                _ => request,
            };
        }

        let response = tokio::select! {
            sent = request.send() => sent,
            _ = ctx.cancellation.cancelled() => {
                return Ok(Self::failure("request cancelled".to_string()));
            }
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(node_id = %ctx.node_id, "HTTP request failed: {}", e);
                return Ok(Self::failure(format!("HTTP request failed: {}", e)));
            }
        };

        let status = response.status();
        let headers_map: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Ok(Self::failure(format!("Failed to read response: {}", e))),
        };
        let data = serde_json::from_str::<serde_json::Value>(&body_text)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(body_text.clone()));

        tracing::info!(node_id = %ctx.node_id, status = status.as_u16(), "Response received");

        let mut output = NodeOutput::new()
            .with_output("success", status.is_success())
            .with_output("status", status.as_u16() as f64)
            .with_output("body", body_text)
            .with_output("headers", Value::Object(headers_map))
            .with_output("data", data);
        if !status.is_success() {
            output = output.with_output("error", format!("HTTP status {}", status));
        }
        Ok(output)
    }

    fn validate_config(&self) -> Vec<ConfigFieldError> {
        let mut errors = Vec::new();
        if let Err(e) = self.url() {
            errors.push(ConfigFieldError::new("url", e));
        }
        if let Err(e) = self.method() {
            errors.push(ConfigFieldError::new("method", e));
        }
        if matches!(self.config.get("headers"), Some(v) if v.as_object().is_none()) {
            errors.push(ConfigFieldError::new("headers", "must be an object"));
        }
        errors
    }
}

pub struct HttpRequestNodeFactory;

impl NodeFactory for HttpRequestNodeFactory {
    fn create(&self, node: &NodeConfig) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(HttpRequestNode::new(node.clone())))
    }

    fn node_type(&self) -> &str {
        "http_request"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: "http_request".to_string(),
            display_name: "HTTP Request".to_string(),
            description: "Make HTTP requests".to_string(),
            category: "http_request".to_string(),
            input_schema: json!({"body": "any"}),
            output_schema: json!({
                "success": "boolean",
                "status": "number",
                "body": "string",
                "headers": "object",
                "data": "any",
            }),
            icon: Some("globe".to_string()),
            color: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(pairs: &[(&str, Value)]) -> HttpRequestNode {
        let config = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        HttpRequestNode::new(NodeConfig::new("fetch", "http_request", config).unwrap())
    }

    #[test]
    fn test_validates_url_and_method() {
        assert_eq!(node(&[]).validate_config()[0].field, "url");
        assert_eq!(node(&[("url", Value::from("ftp://example.com"))]).validate_config().len(), 1);
        assert_eq!(node(&[("url", Value::from("not a url"))]).validate_config().len(), 1);

        let bad_method = node(&[
            ("url", Value::from("https://example.com")),
            ("method", Value::from("TRACE")),
        ]);
        let errors = bad_method.validate_config();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "method");

        let ok = node(&[
            ("url", Value::from("https://example.com/api")),
            ("method", Value::from("patch")),
        ]);
        assert!(ok.validate_config().is_empty());
        assert_eq!(ok.method().unwrap(), Method::PATCH);
    }
}
