use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDateTime;
use http::{header, Method, Request};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{default_base_url, ClientIdentity, ConsolePrompt, TokenProvider};
use crate::error::{Error, Result};
use crate::objects::{
    Function, GetThermostatSummaryRequest, GetThermostatSummaryResponse, GetThermostatsRequest,
    GetThermostatsResponse, ResumeProgramParams, Selection, SendMessageParams, SetHoldParams,
    Status, Thermostat, ThermostatSummary, UpdateThermostatRequest,
};
use crate::transport::{HyperTransport, Transport, TransportError};

const THERMOSTAT_PATH: &str = "1/thermostat";
const SUMMARY_PATH: &str = "1/thermostatSummary";
const THERMOSTAT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Authenticated client for the ecobee thermostat API.
pub struct Client {
    auth: TokenProvider,
    transport: Arc<dyn Transport>,
    base_url: Url,
}

#[derive(Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    status: Status,
}

impl Client {
    /// Create a client for `app_id` that caches tokens in `auth_cache` and
    /// asks for the PIN on the console.
    pub fn new(app_id: impl Into<String>, auth_cache: impl Into<PathBuf>) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HyperTransport::new()?);
        let identity = ClientIdentity {
            application_id: app_id.into(),
            storage_location: auth_cache.into(),
        };
        let auth = TokenProvider::new(identity, transport.clone(), Arc::new(ConsolePrompt));
        Ok(Self::with_parts(auth, transport))
    }

    pub fn with_parts(auth: TokenProvider, transport: Arc<dyn Transport>) -> Self {
        Self {
            auth,
            transport,
            base_url: default_base_url(),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn auth(&self) -> &TokenProvider {
        &self.auth
    }

    /// Error from a failed token cache save during an earlier call. The call
    /// itself went through with the fresh token.
    pub fn take_persist_error(&self) -> Option<Error> {
        self.auth.take_persist_error()
    }

    pub async fn get_thermostats(&self, selection: Selection) -> Result<Vec<Thermostat>> {
        let request = GetThermostatsRequest {
            selection,
            page: None,
        };
        let response: GetThermostatsResponse = self.get(THERMOSTAT_PATH, &request).await?;
        tracing::debug!(
            count = response.thermostat_list.len(),
            total_pages = response.page.total_pages,
            "fetched thermostats"
        );
        Ok(response.thermostat_list)
    }

    /// Fetch one thermostat with its runtime, events, program and sensors.
    pub async fn get_thermostat(&self, id: &str) -> Result<Thermostat> {
        let selection = Selection::thermostats(id)
            .include_events(true)
            .include_program(true)
            .include_runtime(true)
            .include_sensors(true);
        let mut thermostats = self.get_thermostats(selection).await?;
        if thermostats.len() != 1 {
            return Err(Error::ThermostatCount {
                id: id.to_string(),
                found: thermostats.len(),
            });
        }
        Ok(thermostats.remove(0))
    }

    pub async fn get_thermostat_summary(
        &self,
        selection: Selection,
    ) -> Result<HashMap<String, ThermostatSummary>> {
        let request = GetThermostatSummaryRequest { selection };
        let response: GetThermostatSummaryResponse = self.get(SUMMARY_PATH, &request).await?;
        tracing::debug!(count = response.thermostat_count, "fetched thermostat summary");
        Ok(response.summaries())
    }

    pub async fn update_thermostat(&self, request: &UpdateThermostatRequest) -> Result<()> {
        self.post::<serde::de::IgnoredAny>(THERMOSTAT_PATH, request)
            .await?;
        Ok(())
    }

    /// Hold `heat`..`cool` (°F) from the thermostat's current time for `duration`.
    pub async fn hold_temp(
        &self,
        id: &str,
        heat: f64,
        cool: f64,
        duration: std::time::Duration,
    ) -> Result<()> {
        let thermostat = self.get_thermostat(id).await?;
        let params = SetHoldParams {
            heat_hold_temp: Some(to_tenths(heat)),
            cool_hold_temp: Some(to_tenths(cool)),
            ..hold_window(&thermostat, duration)?
        };
        self.update_functions(id, Function::SetHold(params)).await
    }

    /// Run the fan for `duration`, keeping the current setpoints.
    pub async fn run_fan(&self, id: &str, duration: std::time::Duration) -> Result<()> {
        let thermostat = self.get_thermostat(id).await?;
        let params = SetHoldParams {
            heat_hold_temp: Some(thermostat.runtime.desired_heat),
            cool_hold_temp: Some(thermostat.runtime.desired_cool),
            fan: Some("on".into()),
            is_temperature_absolute: Some(false),
            is_temperature_relative: Some(false),
            ..hold_window(&thermostat, duration)?
        };
        self.update_functions(id, Function::SetHold(params)).await
    }

    pub async fn send_message(&self, id: &str, text: &str) -> Result<()> {
        let params = SendMessageParams {
            text: text.to_string(),
        };
        self.update_functions(id, Function::SendMessage(params))
            .await
    }

    pub async fn resume_program(&self, id: &str, resume_all: bool) -> Result<()> {
        self.update_functions(id, Function::ResumeProgram(ResumeProgramParams { resume_all }))
            .await
    }

    async fn update_functions(&self, id: &str, function: Function) -> Result<()> {
        let request = UpdateThermostatRequest {
            selection: Selection::thermostats(id),
            functions: vec![function],
        };
        self.update_thermostat(&request).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, request: &impl Serialize) -> Result<T> {
        let json = serde_json::to_string(request).map_err(Error::Encode)?;
        let mut url = self.endpoint(path);
        url.query_pairs_mut().append_pair("json", &json);
        tracing::debug!(%path, request = %json, "GET");
        self.send(Method::GET, url, Bytes::new()).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, request: &impl Serialize) -> Result<T> {
        let json = serde_json::to_vec(request).map_err(Error::Encode)?;
        tracing::debug!(%path, request = %String::from_utf8_lossy(&json), "POST");
        self.send(Method::POST, self.endpoint(path), Bytes::from(json))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, url: Url, body: Bytes) -> Result<T> {
        let credential = self.auth.get_credential().await?;
        let request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .header(header::AUTHORIZATION, credential.authorization())
            .header(header::CONTENT_TYPE, "application/json;charset=UTF-8")
            .body(Full::new(body))
            .map_err(TransportError::from)?;

        let response = self.transport.send(request).await?;
        let (parts, body) = response.into_parts();
        decode_envelope(parts.status, &body)
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }
}

/// Decode an API response, surfacing a non-zero embedded status as
/// [`Error::Api`] whatever the HTTP status was.
pub fn decode_envelope<T: DeserializeOwned>(status: http::StatusCode, body: &[u8]) -> Result<T> {
    if let Ok(envelope) = serde_json::from_slice::<StatusEnvelope>(body) {
        if envelope.status.code != 0 {
            return Err(Error::Api {
                code: envelope.status.code,
                message: envelope.status.message,
            });
        }
    }
    if !status.is_success() {
        return Err(Error::UnexpectedStatus {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
    serde_json::from_slice(body).map_err(Error::Decode)
}

fn to_tenths(degrees: f64) -> i64 {
    (degrees * 10.0).round() as i64
}

/// Start and end of a `dateTime` hold beginning at the thermostat's clock.
fn hold_window(thermostat: &Thermostat, duration: std::time::Duration) -> Result<SetHoldParams> {
    let start = NaiveDateTime::parse_from_str(&thermostat.thermostat_time, THERMOSTAT_TIME_FORMAT)
        .map_err(|_| Error::ThermostatTime {
            value: thermostat.thermostat_time.clone(),
        })?;
    let length =
        chrono::Duration::from_std(duration).map_err(|e| Error::Duration(e.to_string()))?;
    let end = start
        .checked_add_signed(length)
        .ok_or_else(|| Error::Duration(format!("{duration:?} is out of range")))?;

    Ok(SetHoldParams {
        hold_type: Some("dateTime".into()),
        start_date: Some(start.format("%Y-%m-%d").to_string()),
        start_time: Some(start.format("%H:%M:%S").to_string()),
        end_date: Some(end.format("%Y-%m-%d").to_string()),
        end_time: Some(end.format("%H:%M:%S").to_string()),
        ..SetHoldParams::default()
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use http::StatusCode;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use super::*;
    use crate::auth::{PinPrompt, PinResponse};
    use crate::credential::Credential;
    use crate::error::ExchangeError;
    use crate::store::TokenStore;
    use crate::transport::stub::StubTransport;

    struct NoPrompt;

    #[async_trait::async_trait]
    impl PinPrompt for NoPrompt {
        async fn acknowledge(&self, _pin: &PinResponse) -> std::io::Result<()> {
            Err(std::io::ErrorKind::Unsupported.into())
        }
    }

    struct Fixture {
        dir: TempDir,
        transport: Arc<StubTransport>,
        client: Client,
    }

    fn fixture(expiry: chrono::Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("authcache");
        TokenStore::new(&cache)
            .save(&Credential {
                access_token: "tok1".into(),
                token_type: "Bearer".into(),
                refresh_token: "ref1".into(),
                expiry: Some(Utc::now() + expiry),
            })
            .unwrap();

        let transport = Arc::new(StubTransport::new());
        let auth = TokenProvider::new(
            ClientIdentity {
                application_id: "app123".into(),
                storage_location: cache,
            },
            transport.clone(),
            Arc::new(NoPrompt),
        );
        let client = Client::with_parts(auth, transport.clone());
        Fixture {
            dir,
            transport,
            client,
        }
    }

    fn valid() -> Fixture {
        fixture(chrono::Duration::hours(1))
    }

    fn ok_status() -> Value {
        json!({"code": 0, "message": ""})
    }

    fn thermostat_json() -> Value {
        json!({
            "thermostatList": [{
                "identifier": "318324702718",
                "name": "Home",
                "thermostatTime": "2017-10-08 20:13:45",
                "runtime": {"desiredHeat": 680, "desiredCool": 760, "actualTemperature": 701}
            }],
            "page": {"page": 1, "totalPages": 1, "pageSize": 1, "total": 1},
            "status": ok_status()
        })
    }

    fn json_query(uri: &http::Uri) -> Value {
        let json = url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
            .find(|(k, _)| k == "json")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn embedded_error_wins_over_http_success() {
        let body = json!({"status": {"code": 14, "message": "Authentication token has expired."}});
        let err = decode_envelope::<Value>(StatusCode::OK, body.to_string().as_bytes()).unwrap_err();
        match err {
            Error::Api { code, message } => {
                assert_eq!(code, 14);
                assert_eq!(message, "Authentication token has expired.");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn embedded_error_reported_on_http_failure() {
        let body = json!({"status": {"code": 3, "message": "Invalid selection."}});
        let err = decode_envelope::<Value>(StatusCode::INTERNAL_SERVER_ERROR, body.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, Error::Api { code: 3, .. }));
    }

    #[test]
    fn http_failure_without_envelope() {
        let err = decode_envelope::<Value>(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { .. }));
    }

    #[test]
    fn malformed_success_body_is_a_decode_error() {
        let err = decode_envelope::<GetThermostatsResponse>(StatusCode::OK, b"not json").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn get_thermostat_sends_selection_and_token() {
        let fx = valid();
        fx.transport.push_json(thermostat_json());

        let thermostat = fx.client.get_thermostat("318324702718").await.unwrap();
        assert_eq!(thermostat.name, "Home");
        assert_eq!(thermostat.runtime.desired_cool, 760);

        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].uri.path(), "/1/thermostat");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok1"));
        let selection = &json_query(&requests[0].uri)["selection"];
        assert_eq!(selection["selectionType"], "thermostats");
        assert_eq!(selection["selectionMatch"], "318324702718");
        assert_eq!(selection["includeRuntime"], true);
        assert_eq!(selection["includeSensors"], true);
        assert_eq!(selection["includeAlerts"], false);
    }

    #[tokio::test]
    async fn get_thermostat_requires_exactly_one() {
        let fx = valid();
        fx.transport
            .push_json(json!({"thermostatList": [], "status": ok_status()}));
        let err = fx.client.get_thermostat("nope").await.unwrap_err();
        assert!(matches!(err, Error::ThermostatCount { found: 0, .. }));
    }

    #[tokio::test]
    async fn api_error_in_ok_response_is_surfaced() {
        let fx = valid();
        fx.transport.push_json(
            json!({"status": {"code": 2, "message": "Authentication failed."}}),
        );
        let err = fx.client.get_thermostats(Selection::registered()).await.unwrap_err();
        assert!(matches!(err, Error::Api { code: 2, .. }));
    }

    #[tokio::test]
    async fn summary_is_keyed_by_identifier() {
        let fx = valid();
        fx.transport.push_json(json!({
            "thermostatCount": 1,
            "revisionList": ["318324702718:Home:true:171008201345:171008201345:171008201345:171008201000"],
            "statusList": ["318324702718:fan,auxHeat1"],
            "status": ok_status()
        }));

        let summaries = fx
            .client
            .get_thermostat_summary(
                Selection::thermostats("318324702718").include_equipment_status(true),
            )
            .await
            .unwrap();
        let summary = &summaries["318324702718"];
        assert!(summary.connected);
        assert!(summary.equipment_status.fan);
        assert!(summary.equipment_status.aux_heat1);

        let requests = fx.transport.requests();
        assert_eq!(requests[0].uri.path(), "/1/thermostatSummary");
        assert_eq!(
            json_query(&requests[0].uri)["selection"]["includeEquipmentStatus"],
            true
        );
    }

    #[tokio::test]
    async fn hold_temp_posts_date_time_hold() {
        let fx = valid();
        fx.transport
            .push_json(thermostat_json())
            .push_json(json!({"status": ok_status()}));

        fx.client
            .hold_temp("318324702718", 68.0, 74.5, Duration::from_secs(90 * 60))
            .await
            .unwrap();

        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].uri.path(), "/1/thermostat");
        let body: Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(
            body["functions"][0],
            json!({
                "type": "setHold",
                "params": {
                    "holdType": "dateTime",
                    "heatHoldTemp": 680,
                    "coolHoldTemp": 745,
                    "startDate": "2017-10-08",
                    "startTime": "20:13:45",
                    "endDate": "2017-10-08",
                    "endTime": "21:43:45"
                }
            })
        );
        assert_eq!(body["selection"]["selectionMatch"], "318324702718");
    }

    #[tokio::test]
    async fn run_fan_keeps_current_setpoints() {
        let fx = valid();
        fx.transport
            .push_json(thermostat_json())
            .push_json(json!({"status": ok_status()}));

        fx.client
            .run_fan("318324702718", Duration::from_secs(4 * 3600))
            .await
            .unwrap();

        let body: Value = serde_json::from_slice(&fx.transport.requests()[1].body).unwrap();
        let params = &body["functions"][0]["params"];
        assert_eq!(params["fan"], "on");
        assert_eq!(params["heatHoldTemp"], 680);
        assert_eq!(params["coolHoldTemp"], 760);
        assert_eq!(params["endDate"], "2017-10-09");
        assert_eq!(params["endTime"], "00:13:45");
    }

    #[tokio::test]
    async fn send_message_and_resume_program() {
        let fx = valid();
        fx.transport
            .push_json(json!({"status": ok_status()}))
            .push_json(json!({"status": ok_status()}));

        fx.client.send_message("123", "hello there").await.unwrap();
        fx.client.resume_program("123", true).await.unwrap();

        let requests = fx.transport.requests();
        let message: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            message["functions"][0],
            json!({"type": "sendMessage", "params": {"text": "hello there"}})
        );
        let resume: Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(
            resume["functions"][0],
            json!({"type": "resumeProgram", "params": {"resumeAll": true}})
        );
    }

    #[tokio::test]
    async fn bad_thermostat_time_fails_hold() {
        let fx = valid();
        fx.transport.push_json(json!({
            "thermostatList": [{"identifier": "1", "thermostatTime": "yesterday"}],
            "status": ok_status()
        }));
        let err = fx
            .client
            .hold_temp("1", 68.0, 74.0, Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ThermostatTime { .. }));
        assert_eq!(fx.transport.calls(), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_api_call() {
        let fx = fixture(chrono::Duration::minutes(-1));
        fx.transport
            .push_json(json!({"access_token": "tok2", "refresh_token": "ref2", "expires_in": 3600, "token_type": "Bearer"}))
            .push_json(json!({"thermostatList": [], "status": ok_status()}))
            .push_json(json!({"thermostatList": [], "status": ok_status()}));

        fx.client.get_thermostats(Selection::registered()).await.unwrap();
        fx.client.get_thermostats(Selection::registered()).await.unwrap();

        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].uri.path(), "/token");
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer tok2"));
        assert_eq!(requests[2].authorization.as_deref(), Some("Bearer tok2"));
    }

    #[tokio::test]
    async fn refresh_failure_stops_api_call() {
        let fx = fixture(chrono::Duration::minutes(-1));
        fx.transport.push(400, json!({"error": "invalid_grant"}).to_string());

        let err = fx
            .client
            .get_thermostats(Selection::registered())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Refresh(ExchangeError::Status { .. })));
        assert_eq!(fx.transport.calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let fx = valid();
        fx.transport.push_failure();

        let err = fx
            .client
            .get_thermostats(Selection::registered())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(fx.transport.calls(), 1);
    }

    #[tokio::test]
    async fn unsaved_refresh_still_serves_the_call() {
        let fx = fixture(chrono::Duration::minutes(-1));
        // Replace the cache directory with a file so the save cannot succeed.
        let dir = fx.dir.path();
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::write(dir, "x").unwrap();
        fx.transport
            .push_json(json!({"access_token": "tok2", "refresh_token": "ref2", "expires_in": 3600, "token_type": "Bearer"}))
            .push_json(json!({"thermostatList": [], "status": ok_status()}));

        fx.client.get_thermostats(Selection::registered()).await.unwrap();
        assert_eq!(
            fx.transport.requests()[1].authorization.as_deref(),
            Some("Bearer tok2")
        );
        assert!(matches!(
            fx.client.take_persist_error(),
            Some(Error::CachePersist { .. })
        ));
        std::fs::remove_file(dir).unwrap();
    }
}
