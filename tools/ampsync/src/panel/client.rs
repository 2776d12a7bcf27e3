//! HTTP client for the AMP panel API
//!
//! Every call is a JSON POST to `<url>/API/<Module>/<Method>` carrying the
//! session id in the body. Calls against a specific instance are proxied by
//! the controller through `ADSModule/Servers/<InstanceId>/API/...`, each
//! instance holding its own session. Instance sessions are opened once per
//! client and closed together with the controller session.

use async_trait::async_trait;
use errors::{PanelError, PanelResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::api::PanelApi;
use super::types::{
    ApplicationStatus, InstanceHandle, InstanceMeta, InstanceStatus, InstanceStatusEntry,
    IntervalSpec, ScheduleData, SettingSpec, TimeIntervalTrigger,
};
use crate::params::{serialize_value, ParameterMapping};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Strip the panel's envelope and surface error documents as errors
///
/// - `{"Title", "Message", ...}` is an API error
/// - `{"result": x}` unwraps to `x`
/// - an action result with `"Status": false` is a failed action
fn unwrap_response(value: JsonValue) -> PanelResult<JsonValue> {
    let value = match value {
        JsonValue::Object(mut map) => {
            if let (Some(title), Some(message)) = (map.get("Title"), map.get("Message")) {
                return Err(PanelError::Api {
                    title: serialize_value(title),
                    message: serialize_value(message),
                });
            }
            match map.remove("result") {
                Some(inner) => inner,
                None => JsonValue::Object(map),
            }
        },
        other => other,
    };

    if let Some(false) = value.get("Status").and_then(JsonValue::as_bool) {
        let reason = value.get("Reason").map(serialize_value).unwrap_or_default();
        return Err(PanelError::action_failed(reason));
    }
    Ok(value)
}

/// Flatten `GetInstances`: a list of controller targets, each carrying
/// `AvailableInstances`, or a plain list of instances
fn flatten_instances(value: JsonValue) -> PanelResult<Vec<InstanceMeta>> {
    let items = match value {
        JsonValue::Array(items) => items,
        other => return Err(PanelError::action_failed(format!("unexpected instance list: {}", other))),
    };

    let mut instances = Vec::new();
    for item in items {
        match item.get("AvailableInstances") {
            Some(JsonValue::Array(nested)) => {
                for inst in nested {
                    instances.push(serde_json::from_value(inst.clone())?);
                }
            },
            _ => instances.push(serde_json::from_value(item)?),
        }
    }
    Ok(instances)
}

/// AMP panel client
pub struct AmpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    session_id: Option<String>,
    /// Instance id -> instance session id
    instance_sessions: Mutex<HashMap<String, String>>,
}

impl AmpClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> PanelResult<Self> {
        let base_url = base_url.trim_end_matches('/');
        let invalid = |reason: String| PanelError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = reqwest::Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            session_id: None,
            instance_sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_logged_in(&self) -> bool {
        self.session_id.is_some()
    }

    /// Log into the controller
    pub async fn login(&mut self) -> PanelResult<()> {
        let session = self.login_at("").await?;
        self.session_id = Some(session);
        Ok(())
    }

    /// End every instance session, then the controller session
    ///
    /// Instance logout failures are logged and do not stop the controller
    /// logout.
    pub async fn logout(&mut self) -> PanelResult<()> {
        let instance_sessions: Vec<(String, String)> =
            self.instance_sessions.get_mut().drain().collect();
        for (instance_id, session) in instance_sessions {
            let endpoint = format!("{}Core/Logout", instance_prefix(&instance_id));
            if let Err(e) = self.post(&endpoint, &session, json!({})).await {
                warn!("Instance {} logout failed: {}", instance_id, e);
            }
        }
        if let Some(session) = self.session_id.take() {
            self.post("Core/Logout", &session, json!({})).await?;
        }
        Ok(())
    }

    /// Log in at an API prefix ("" for the controller, or an instance proxy path)
    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn login_at(&self, prefix: &str) -> PanelResult<String> {
        let endpoint = format!("{}Core/Login", prefix);
        let value = self
            .post(
                &endpoint,
                "",
                json!({
                    "username": self.username,
                    "password": self.password,
                    "token": "",
                    "rememberMe": false
                }),
            )
            .await?;

        let success = value
            .get("success")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        let session = value
            .get("sessionID")
            .map(serialize_value)
            .unwrap_or_default();
        if !success || session.is_empty() {
            let reason = value
                .get("resultReason")
                .map(serialize_value)
                .unwrap_or_else(|| "login rejected".to_string());
            return Err(PanelError::action_failed(reason));
        }
        Ok(session)
    }

    async fn post(&self, endpoint: &str, session: &str, params: JsonValue) -> PanelResult<JsonValue> {
        let mut body = match params {
            JsonValue::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("SESSIONID".to_string(), JsonValue::String(session.to_string()));

        debug!("POST {}", endpoint);
        let response = self
            .client
            .post(format!("{}/API/{}", self.base_url, endpoint))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        unwrap_response(serde_json::from_str(&text)?)
    }

    /// Session for `instance_id`, logging in on first use
    async fn instance_session(&self, instance_id: &str) -> PanelResult<String> {
        if let Some(session) = self.instance_sessions.lock().await.get(instance_id) {
            return Ok(session.clone());
        }
        let session = self.login_at(&instance_prefix(instance_id)).await?;
        Ok(self
            .instance_sessions
            .lock()
            .await
            .entry(instance_id.to_string())
            .or_insert(session)
            .clone())
    }

    fn controller_session(&self) -> PanelResult<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| PanelError::NoSession("controller".to_string()))
    }

    async fn call(&self, method: &str, params: JsonValue) -> PanelResult<JsonValue> {
        let session = self.controller_session()?;
        self.post(method, session, params).await
    }

    async fn call_instance(
        &self,
        target: &InstanceHandle,
        method: &str,
        params: JsonValue,
    ) -> PanelResult<JsonValue> {
        if target.session_id.is_empty() {
            return Err(PanelError::NoSession(target.name().to_string()));
        }
        let endpoint = format!("{}{}", instance_prefix(target.id()), method);
        self.post(&endpoint, &target.session_id, params).await
    }

    async fn fetch_instance<T: DeserializeOwned>(
        &self,
        target: &InstanceHandle,
        method: &str,
        params: JsonValue,
    ) -> PanelResult<T> {
        let value = self.call_instance(target, method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn instance_prefix(instance_id: &str) -> String {
    format!("ADSModule/Servers/{}/API/", instance_id)
}

#[async_trait]
impl PanelApi for AmpClient {
    async fn list_instances(&self) -> PanelResult<Vec<InstanceMeta>> {
        flatten_instances(self.call("ADSModule/GetInstances", json!({})).await?)
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn get_instance(&self, meta: &InstanceMeta) -> PanelResult<InstanceHandle> {
        let value = self
            .call("ADSModule/GetInstance", json!({ "InstanceId": meta.instance_id }))
            .await?;
        if value.is_null() {
            return Err(PanelError::not_found(format!("instance {}", meta.instance_id)));
        }
        let loaded: InstanceMeta = serde_json::from_value(value)?;
        let session_id = self.instance_session(&meta.instance_id).await?;
        Ok(InstanceHandle {
            meta: loaded,
            session_id,
        })
    }

    async fn controller_status(&self) -> PanelResult<ApplicationStatus> {
        Ok(serde_json::from_value(self.call("Core/GetStatus", json!({})).await?)?)
    }

    async fn instance_statuses(&self) -> PanelResult<Vec<InstanceStatusEntry>> {
        Ok(serde_json::from_value(
            self.call("ADSModule/GetInstanceStatuses", json!({})).await?,
        )?)
    }

    async fn schedule(&self, target: &InstanceHandle) -> PanelResult<ScheduleData> {
        self.fetch_instance(target, "Core/GetScheduleData", json!({})).await
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn delete_trigger(&self, target: &InstanceHandle, trigger_id: &str) -> PanelResult<()> {
        self.call_instance(target, "Core/DeleteTrigger", json!({ "Id": trigger_id }))
            .await
            .map(|_| ())
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn delete_task(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        task_id: &str,
    ) -> PanelResult<()> {
        self.call_instance(
            target,
            "Core/DeleteTask",
            json!({ "TriggerID": trigger_id, "TaskID": task_id }),
        )
        .await
        .map(|_| ())
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn add_event_trigger(
        &self,
        target: &InstanceHandle,
        source_trigger_id: &str,
    ) -> PanelResult<()> {
        self.call_instance(
            target,
            "Core/AddEventTrigger",
            json!({ "triggerId": source_trigger_id }),
        )
        .await
        .map(|_| ())
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn add_interval_trigger(
        &self,
        target: &InstanceHandle,
        spec: &IntervalSpec,
    ) -> PanelResult<()> {
        self.call_instance(
            target,
            "Core/AddIntervalTrigger",
            json!({
                "months": [spec.months],
                "days": [spec.days],
                "hours": [spec.hours],
                "minutes": [spec.minutes],
                "daysOfMonth": [spec.days_of_month],
                "description": spec.description,
            }),
        )
        .await
        .map(|_| ())
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn interval_trigger(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
    ) -> PanelResult<TimeIntervalTrigger> {
        self.fetch_instance(target, "Core/GetTimeIntervalTrigger", json!({ "Id": trigger_id }))
            .await
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn add_task(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        method_id: &str,
        mapping: &ParameterMapping,
    ) -> PanelResult<()> {
        self.call_instance(
            target,
            "Core/AddTask",
            json!({
                "TriggerID": trigger_id,
                "MethodID": method_id,
                "ParameterMapping": mapping,
            }),
        )
        .await
        .map(|_| ())
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn set_trigger_enabled(
        &self,
        target: &InstanceHandle,
        trigger_id: &str,
        enabled: bool,
    ) -> PanelResult<()> {
        self.call_instance(
            target,
            "Core/SetTriggerEnabled",
            json!({ "Id": trigger_id, "Enabled": enabled }),
        )
        .await
        .map(|_| ())
    }

    async fn setting_spec(&self, target: &InstanceHandle) -> PanelResult<SettingSpec> {
        self.fetch_instance(target, "Core/GetSettingsSpec", json!({})).await
    }

    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    async fn set_configs(
        &self,
        target: &InstanceHandle,
        values: &BTreeMap<String, String>,
    ) -> PanelResult<()> {
        self.call_instance(target, "Core/SetConfigs", json!({ "data": values }))
            .await
            .map(|_| ())
    }

    async fn stop_application(&self, target: &InstanceHandle) -> PanelResult<()> {
        self.call_instance(target, "Core/Stop", json!({}))
            .await
            .map(|_| ())
    }

    async fn start_application(&self, target: &InstanceHandle) -> PanelResult<()> {
        self.call_instance(target, "Core/Start", json!({}))
            .await
            .map(|_| ())
    }

    async fn instance_status(&self, target: &InstanceHandle) -> PanelResult<InstanceStatus> {
        let status = self.application_status(target).await?;
        Ok(InstanceStatus {
            running: status.state.is_running(),
        })
    }

    async fn application_status(&self, target: &InstanceHandle) -> PanelResult<ApplicationStatus> {
        self.fetch_instance(target, "Core/GetStatus", json!({})).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_unwrap_result_envelope() {
        let value = unwrap_response(json!({"result": {"Status": true}})).unwrap();
        assert_eq!(value, json!({"Status": true}));
    }

    #[test]
    fn test_failed_action_result_is_error() {
        let err = unwrap_response(json!({"Status": false, "Reason": "Trigger not found"})).unwrap_err();
        assert!(matches!(err, PanelError::ActionFailed(ref r) if r == "Trigger not found"));

        let wrapped = unwrap_response(json!({"result": {"Status": false, "Reason": "x"}}));
        assert!(wrapped.is_err());
    }

    #[test]
    fn test_error_document_is_api_error() {
        let err = unwrap_response(json!({
            "Title": "Unauthorized Access",
            "Message": "Session expired",
            "StackTrace": ""
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "API error: Unauthorized Access: Session expired");
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(unwrap_response(json!([1, 2])).unwrap(), json!([1, 2]));
        assert_eq!(unwrap_response(JsonValue::Null).unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_flatten_instances_from_controller_targets() {
        let instances = flatten_instances(json!([
            {
                "FriendlyName": "Local",
                "AvailableInstances": [
                    {"InstanceID": "1", "InstanceName": "ADS01", "Module": "ADS"},
                    {"InstanceID": "2", "InstanceName": "ARK01", "Module": "GenericModule"}
                ]
            },
            {"InstanceID": "3", "InstanceName": "ARK02"}
        ]))
        .unwrap();
        let names: Vec<_> = instances.iter().map(|i| i.instance_name.as_str()).collect();
        assert_eq!(names, vec!["ADS01", "ARK01", "ARK02"]);
    }

    #[test]
    fn test_flatten_instances_rejects_non_list() {
        assert!(flatten_instances(json!({"x": 1})).is_err());
    }

    #[test]
    fn test_instance_prefix_routes_through_controller() {
        assert_eq!(instance_prefix("abc"), "ADSModule/Servers/abc/API/");
    }

    #[test]
    fn test_new_rejects_unusable_base_url() {
        for url in ["amp.example.com", "ftp://amp.example.com"] {
            let err = AmpClient::new(url, "u", "p").err().unwrap();
            assert!(matches!(err, PanelError::InvalidUrl { .. }), "{url}");
        }
    }

    #[tokio::test]
    async fn test_calls_without_session_are_rejected() {
        let client = AmpClient::new("http://127.0.0.1:1/", "u", "p").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:1");
        assert!(!client.is_logged_in());
        let err = client.list_instances().await.unwrap_err();
        assert!(matches!(err, PanelError::NoSession(_)));

        let handle = InstanceHandle::default();
        let err = client.schedule(&handle).await.unwrap_err();
        assert!(matches!(err, PanelError::NoSession(_)));
    }

    async fn mount_json(server: &MockServer, route: &str, body: JsonValue, times: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/API/{}", route)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_instance_session_reused_and_closed_on_logout() {
        let server = MockServer::start().await;
        mount_json(&server, "Core/Login", json!({"success": true, "sessionID": "ctl"}), 1).await;
        mount_json(
            &server,
            "ADSModule/GetInstance",
            json!({"InstanceID": "i1", "InstanceName": "ARK01"}),
            2,
        )
        .await;
        mount_json(
            &server,
            "ADSModule/Servers/i1/API/Core/Login",
            json!({"success": true, "sessionID": "inst"}),
            1,
        )
        .await;
        mount_json(&server, "ADSModule/Servers/i1/API/Core/Logout", JsonValue::Null, 1).await;
        mount_json(&server, "Core/Logout", JsonValue::Null, 1).await;

        let mut client = AmpClient::new(&server.uri(), "u", "p").unwrap();
        client.login().await.unwrap();

        let meta = InstanceMeta {
            instance_id: "i1".to_string(),
            ..Default::default()
        };
        let first = client.get_instance(&meta).await.unwrap();
        let second = client.get_instance(&meta).await.unwrap();
        assert_eq!(first.session_id, "inst");
        assert_eq!(second.session_id, "inst");
        assert_eq!(second.name(), "ARK01");

        client.logout().await.unwrap();
        assert!(!client.is_logged_in());
        // Expectations are verified when the server drops
    }
}
