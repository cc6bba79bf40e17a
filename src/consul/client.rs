//! Consul HTTP API client.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use super::{ConsulBackend, ConsulError};
use crate::config::ConsulConfig;
use crate::models::{
    AgentService, CatalogService, KvEntry, Node, RawKvPair, ServiceEntry, ServiceRegistration,
};
use crate::utils::HttpClient;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Client for the Consul HTTP API
///
/// Holds one pooled HTTP client; safe to share between sessions.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: HttpClient,
    base_url: String,
    datacenter: Option<String>,
}

impl ConsulClient {
    /// Create a client from configuration. No request is made.
    pub fn new(config: &ConsulConfig) -> Result<Self, ConsulError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| ConsulError::InvalidConfig("token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }

        let http = HttpClient::with_options(config.timeout(), headers)
            .map_err(|e| ConsulError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            datacenter: config.datacenter.clone(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Datacenter for a call: the explicit one, else the configured default
    fn datacenter<'a>(&'a self, dc: Option<&'a str>) -> Option<&'a str> {
        dc.or(self.datacenter.as_deref())
    }

    fn with_dc(&self, request: RequestBuilder, dc: Option<&str>) -> RequestBuilder {
        match self.datacenter(dc) {
            Some(dc) => request.query(&[("dc", dc)]),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ConsulError> {
        request
            .send()
            .await
            .map_err(|source| ConsulError::Request { operation, source })
    }

    async fn check_status(
        operation: &'static str,
        response: Response,
    ) -> Result<Response, ConsulError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(operation, status = status.as_u16(), "Consul request rejected");
        Err(ConsulError::Status {
            operation,
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, ConsulError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ConsulError::Request { operation, source })?;
        serde_json::from_slice(&bytes).map_err(|e| ConsulError::Decode {
            operation,
            message: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        dc: Option<&str>,
    ) -> Result<T, ConsulError> {
        tracing::debug!(operation, path, "Consul GET");
        let request = self.with_dc(self.http.client().get(self.url(path)), dc);
        let response = self.send(operation, request).await?;
        let response = Self::check_status(operation, response).await?;
        Self::decode(operation, response).await
    }
}

/// Percent-encode each segment of a key or name, keeping `/` separators.
fn encode_path(raw: &str) -> String {
    raw.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ConsulBackend for ConsulClient {
    async fn is_connected(&self) -> bool {
        let request = self.http.client().get(self.url("/v1/agent/self"));
        match self.send("agent_self", request).await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = response.status().as_u16(), "Consul agent check failed");
                false
            }
            Err(e) => {
                tracing::warn!("Consul agent unreachable: {}", e);
                false
            }
        }
    }

    async fn list_services(&self, dc: Option<&str>) -> Result<Vec<String>, ConsulError> {
        let services: HashMap<String, serde_json::Value> = self
            .get_json("list_services", "/v1/catalog/services", dc)
            .await?;
        let mut names: Vec<String> = services.into_keys().collect();
        names.sort();
        tracing::info!("Found {} services", names.len());
        Ok(names)
    }

    async fn service_instances(
        &self,
        name: &str,
        dc: Option<&str>,
    ) -> Result<Vec<CatalogService>, ConsulError> {
        let path = format!("/v1/catalog/service/{}", encode_path(name));
        let instances: Vec<CatalogService> = self.get_json("get_service", &path, dc).await?;
        tracing::debug!("Found {} instances for service '{}'", instances.len(), name);
        Ok(instances)
    }

    async fn register_service(&self, registration: &ServiceRegistration) -> Result<(), ConsulError> {
        let operation = "register_service";
        tracing::info!(
            "Registering service '{}' (id={}) at {}:{}",
            registration.name,
            registration.id,
            registration.address,
            registration.port
        );
        let request = self
            .http
            .client()
            .put(self.url("/v1/agent/service/register"))
            .json(registration);
        let response = self.send(operation, request).await?;
        Self::check_status(operation, response).await?;
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), ConsulError> {
        let operation = "deregister_service";
        tracing::info!("Deregistering service '{}'", service_id);
        let path = format!("/v1/agent/service/deregister/{}", encode_path(service_id));
        let request = self.http.client().put(self.url(&path));
        let response = self.send(operation, request).await?;
        Self::check_status(operation, response).await?;
        Ok(())
    }

    async fn get_kv(&self, key: &str, dc: Option<&str>) -> Result<Option<KvEntry>, ConsulError> {
        let operation = "get_kv";
        let path = format!("/v1/kv/{}", encode_path(key));
        let request = self.with_dc(self.http.client().get(self.url(&path)), dc);
        let response = self.send(operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("KV key '{}' not found", key);
            return Ok(None);
        }
        let response = Self::check_status(operation, response).await?;
        let pairs: Vec<RawKvPair> = Self::decode(operation, response).await?;

        let Some(pair) = pairs.into_iter().next() else {
            return Ok(None);
        };
        let value = match pair.value {
            Some(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| ConsulError::Decode {
                        operation,
                        message: format!("value is not base64: {}", e),
                    })?;
                let text = String::from_utf8(bytes).map_err(|e| ConsulError::Decode {
                    operation,
                    message: format!("value is not valid UTF-8: {}", e),
                })?;
                Some(text)
            }
            None => None,
        };

        Ok(Some(KvEntry {
            key: pair.key,
            value,
            flags: pair.flags,
            create_index: pair.create_index,
            modify_index: pair.modify_index,
        }))
    }

    async fn put_kv(&self, key: &str, value: &str, dc: Option<&str>) -> Result<bool, ConsulError> {
        let operation = "put_kv";
        tracing::info!("Storing KV key '{}' (value length: {})", key, value.len());
        let path = format!("/v1/kv/{}", encode_path(key));
        let request = self.with_dc(
            self.http.client().put(self.url(&path)).body(value.to_string()),
            dc,
        );
        let response = self.send(operation, request).await?;
        let response = Self::check_status(operation, response).await?;
        Self::decode(operation, response).await
    }

    async fn delete_kv(&self, key: &str, dc: Option<&str>) -> Result<bool, ConsulError> {
        let operation = "delete_kv";
        tracing::info!("Deleting KV key '{}'", key);
        let path = format!("/v1/kv/{}", encode_path(key));
        let request = self.with_dc(self.http.client().delete(self.url(&path)), dc);
        let response = self.send(operation, request).await?;
        let response = Self::check_status(operation, response).await?;
        Self::decode(operation, response).await
    }

    async fn list_kv(&self, prefix: &str, dc: Option<&str>) -> Result<Vec<String>, ConsulError> {
        let operation = "list_kv";
        let path = format!("/v1/kv/{}?keys", encode_path(prefix));
        let request = self.with_dc(self.http.client().get(self.url(&path)), dc);
        let response = self.send(operation, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = Self::check_status(operation, response).await?;
        let keys: Vec<String> = Self::decode(operation, response).await?;
        tracing::info!("Found {} KV keys with prefix '{}'", keys.len(), prefix);
        Ok(keys)
    }

    async fn nodes(&self, dc: Option<&str>) -> Result<Vec<Node>, ConsulError> {
        self.get_json("get_nodes", "/v1/catalog/nodes", dc).await
    }

    async fn service_health(
        &self,
        name: &str,
        dc: Option<&str>,
    ) -> Result<Vec<ServiceEntry>, ConsulError> {
        let path = format!("/v1/health/service/{}", encode_path(name));
        self.get_json("get_service_health", &path, dc).await
    }

    async fn agent_services(&self) -> Result<HashMap<String, AgentService>, ConsulError> {
        self.get_json("agent_services", "/v1/agent/services", None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard, token: Option<&str>) -> ConsulClient {
        let url = url::Url::parse(&server.url()).unwrap();
        let config = ConsulConfig {
            host: url.host_str().unwrap().to_string(),
            port: url.port().unwrap(),
            token: token.map(str::to_string),
            ..ConsulConfig::default()
        };
        ConsulClient::new(&config).unwrap()
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("app/config key"), "app/config%20key");
        assert_eq!(encode_path(""), "");
    }

    #[tokio::test]
    async fn test_list_services_sends_token_and_sorts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/catalog/services")
            .match_header("x-consul-token", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"web": ["v1"], "consul": [], "cache": []}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("secret"));
        let services = client.list_services(None).await.unwrap();

        assert_eq!(services, vec!["cache", "consul", "web"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_datacenter_is_passed_as_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/catalog/nodes")
            .match_query(Matcher::UrlEncoded("dc".into(), "eu-west".into()))
            .with_status(200)
            .with_body(r#"[{"ID": "n1", "Node": "node-1", "Address": "10.0.0.1", "Datacenter": "eu-west"}]"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let nodes = client.nodes(Some("eu-west")).await.unwrap();

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node, "node-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_kv_decodes_base64() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/kv/app/config")
            .with_status(200)
            .with_body(
                r#"[{"Key": "app/config", "Value": "aGVsbG8=", "Flags": 0, "CreateIndex": 10, "ModifyIndex": 12}]"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, None);
        let entry = client.get_kv("app/config", None).await.unwrap().unwrap();

        assert_eq!(entry.key, "app/config");
        assert_eq!(entry.value.as_deref(), Some("hello"));
        assert_eq!(entry.create_index, 10);
        assert_eq!(entry.modify_index, 12);
    }

    #[tokio::test]
    async fn test_get_kv_missing_key_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/kv/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.get_kv("missing", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_kv_rejects_non_utf8_value() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/kv/blob")
            .with_status(200)
            .with_body(r#"[{"Key": "blob", "Value": "//4=", "Flags": 0, "CreateIndex": 3, "ModifyIndex": 3}]"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.get_kv("blob", None).await.unwrap_err();

        assert!(matches!(err, ConsulError::Decode { operation: "get_kv", .. }));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_delete_kv() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v1/kv/app/old")
            .with_status(200)
            .with_body("true")
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.delete_kv("app/old", None).await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deregister_service() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/agent/service/deregister/web-1")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server, None);
        client.deregister_service("web-1").await.unwrap();
        mock.assert_async().await;

        server
            .mock("PUT", "/v1/agent/service/deregister/ghost")
            .with_status(404)
            .with_body("Unknown service ID \"ghost\". Ensure that the service ID is passed, not the service name.")
            .create_async()
            .await;
        let err = client.deregister_service("ghost").await.unwrap_err();
        assert_eq!(err.operation(), Some("deregister_service"));
    }

    #[tokio::test]
    async fn test_service_health_decodes_entries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/health/service/web")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                  {
                    "Node": {"ID": "40e4a748", "Node": "node-1", "Address": "10.0.0.1",
                             "Datacenter": "dc1", "TaggedAddresses": {"lan": "10.0.0.1"},
                             "Meta": {"consul-network-segment": ""},
                             "CreateIndex": 5, "ModifyIndex": 5},
                    "Service": {"ID": "web-1", "Service": "web", "Tags": ["v1"],
                                "Address": "10.0.0.1", "Meta": {"version": "1.2"}, "Port": 8080,
                                "Weights": {"Passing": 1, "Warning": 1},
                                "EnableTagOverride": false, "CreateIndex": 7, "ModifyIndex": 7},
                    "Checks": [
                      {"Node": "node-1", "CheckID": "serfHealth", "Name": "Serf Health Status",
                       "Status": "passing", "Notes": "", "Output": "Agent alive and reachable",
                       "ServiceID": "", "ServiceName": "", "ServiceTags": [], "Type": "",
                       "CreateIndex": 5, "ModifyIndex": 5},
                      {"Node": "node-1", "CheckID": "service:web-1", "Name": "Service 'web' check",
                       "Status": "critical", "Notes": "", "Output": "connection refused",
                       "ServiceID": "web-1", "ServiceName": "web", "ServiceTags": ["v1"],
                       "Type": "http", "Interval": "10s", "CreateIndex": 8, "ModifyIndex": 9}
                    ]
                  }
                ]"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, None);
        let entries = client.service_health("web", None).await.unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.node.node, "node-1");
        assert_eq!(entry.service.id, "web-1");
        assert_eq!(entry.service.port, 8080);
        assert_eq!(entry.service.meta["version"], "1.2");
        assert_eq!(entry.checks.len(), 2);
        assert_eq!(entry.checks[1].check_id, "service:web-1");
        assert_eq!(entry.status(), "critical");
        assert_eq!(entry.checks[1].extra["Type"], "http");
    }

    #[tokio::test]
    async fn test_agent_services_decodes_map() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/agent/services")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "api-1": {"Kind": "", "ID": "api-1", "Service": "api", "Tags": ["v1", "blue"],
                            "Meta": {"owner": "team-a"}, "Port": 9000, "Address": "10.0.0.5",
                            "TaggedAddresses": {"lan_ipv4": {"Address": "10.0.0.5", "Port": 9000}},
                            "Weights": {"Passing": 1, "Warning": 1},
                            "EnableTagOverride": true, "Datacenter": "dc1"},
                  "cache": {"ID": "cache", "Service": "cache", "Tags": [], "Meta": {},
                            "Port": 6379, "Address": "", "EnableTagOverride": false,
                            "Datacenter": "dc1"}
                }"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, None);
        let services = client.agent_services().await.unwrap();
        mock.assert_async().await;

        assert_eq!(services.len(), 2);
        let api = &services["api-1"];
        assert_eq!(api.service, "api");
        assert_eq!(api.tags, vec!["v1", "blue"]);
        assert_eq!(api.meta["owner"], "team-a");
        assert_eq!(api.port, 9000);
        assert!(api.enable_tag_override);
        assert_eq!(api.datacenter.as_deref(), Some("dc1"));
        assert!(api.extra.contains_key("Weights"));

        let registration = ServiceRegistration::from_agent(api);
        assert_eq!(registration.name, "api");
        assert_eq!(registration.address, "10.0.0.5");
        assert!(registration.enable_tag_override);
    }

    #[tokio::test]
    async fn test_put_kv_sends_raw_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/kv/k")
            .match_body("v")
            .with_status(200)
            .with_body("true")
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.put_kv("k", "v", None).await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_kv_without_matches_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/kv/nothing/")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.list_kv("nothing/", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_service_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/agent/service/register")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "ID": "web-1",
                "Name": "web",
                "Port": 8080,
                "Check": {"HTTP": "http://10.0.0.1:8080/health", "Interval": "10s"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let registration = ServiceRegistration::new("web", "10.0.0.1", 8080)
            .with_id(Some("web-1".to_string()))
            .with_http_check(Some("http://10.0.0.1:8080/health".to_string()), None);
        client.register_service(&registration).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_error_names_operation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/catalog/service/web")
            .with_status(500)
            .with_body("rpc error: No cluster leader")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.service_instances("web", None).await.unwrap_err();

        assert_eq!(err.operation(), Some("get_service"));
        let message = err.to_string();
        assert!(message.contains("get_service"));
        assert!(message.contains("No cluster leader"));
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_not_connected() {
        let config = ConsulConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            timeout_secs: 1,
            ..ConsulConfig::default()
        };
        let client = ConsulClient::new(&config).unwrap();
        assert!(!client.is_connected().await);

        let err = client.list_services(None).await.unwrap_err();
        assert!(matches!(err, ConsulError::Request { operation: "list_services", .. }));
    }
}
