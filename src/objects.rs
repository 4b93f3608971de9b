//! Request and response shapes of the ecobee thermostat API.
//!
//! Temperatures are tenths of a degree Fahrenheit throughout.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_type: String,
    pub selection_match: String,
    pub include_runtime: bool,
    pub include_extended_runtime: bool,
    pub include_electricity: bool,
    pub include_settings: bool,
    pub include_location: bool,
    pub include_program: bool,
    pub include_events: bool,
    pub include_device: bool,
    pub include_technician: bool,
    pub include_utility: bool,
    pub include_management: bool,
    pub include_alerts: bool,
    pub include_weather: bool,
    pub include_house_details: bool,
    pub include_oem_cfg: bool,
    pub include_equipment_status: bool,
    pub include_notification_settings: bool,
    pub include_privacy: bool,
    pub include_version: bool,
    pub include_security_settings: bool,
    pub include_sensors: bool,
}

impl Selection {
    /// Every thermostat registered to the account.
    pub fn registered() -> Self {
        Self {
            selection_type: "registered".into(),
            ..Self::default()
        }
    }

    /// The thermostats with the given identifiers (comma separated).
    pub fn thermostats(id: impl Into<String>) -> Self {
        Self {
            selection_type: "thermostats".into(),
            selection_match: id.into(),
            ..Self::default()
        }
    }

    pub fn include_runtime(mut self, value: bool) -> Self {
        self.include_runtime = value;
        self
    }

    pub fn include_events(mut self, value: bool) -> Self {
        self.include_events = value;
        self
    }

    pub fn include_program(mut self, value: bool) -> Self {
        self.include_program = value;
        self
    }

    pub fn include_sensors(mut self, value: bool) -> Self {
        self.include_sensors = value;
        self
    }

    pub fn include_settings(mut self, value: bool) -> Self {
        self.include_settings = value;
        self
    }

    pub fn include_alerts(mut self, value: bool) -> Self {
        self.include_alerts = value;
        self
    }

    pub fn include_equipment_status(mut self, value: bool) -> Self {
        self.include_equipment_status = value;
        self
    }

    pub fn include_weather(mut self, value: bool) -> Self {
        self.include_weather = value;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Page {
    pub page: i64,
    pub total_pages: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Application status embedded in every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Status {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetThermostatsRequest {
    pub selection: Selection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetThermostatsResponse {
    pub page: Page,
    pub thermostat_list: Vec<Thermostat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateThermostatRequest {
    pub selection: Selection,
    pub functions: Vec<Function>,
}

/// A thermostat function call, serialized as `{"type": ..., "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum Function {
    SetHold(SetHoldParams),
    SendMessage(SendMessageParams),
    ResumeProgram(ResumeProgramParams),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetHoldParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cool_hold_temp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_hold_temp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_climate_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_hours: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_temperature_absolute: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_temperature_relative: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageParams {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeProgramParams {
    pub resume_all: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thermostat {
    pub identifier: String,
    pub name: String,
    pub thermostat_rev: String,
    pub is_registered: bool,
    pub model_number: String,
    pub brand: String,
    pub features: String,
    pub last_modified: String,
    /// Local time at the thermostat, `YYYY-MM-DD HH:MM:SS`.
    pub thermostat_time: String,
    pub utc_time: String,
    pub runtime: Runtime,
    pub events: Vec<Event>,
    pub program: Program,
    pub remote_sensors: Vec<RemoteSensor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Runtime {
    pub runtime_rev: String,
    pub connected: bool,
    pub first_connected: String,
    pub connect_date_time: String,
    pub disconnect_date_time: String,
    pub last_modified: String,
    pub last_status_modified: String,
    pub runtime_date: String,
    pub runtime_interval: i64,
    pub actual_temperature: i64,
    pub actual_humidity: i64,
    pub desired_heat: i64,
    pub desired_cool: i64,
    pub desired_humidity: i64,
    pub desired_dehumidity: i64,
    pub desired_fan_mode: String,
    pub desired_heat_range: Vec<i64>,
    pub desired_cool_range: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub running: bool,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub is_occupied: bool,
    pub is_cool_off: bool,
    pub is_heat_off: bool,
    pub cool_hold_temp: i64,
    pub heat_hold_temp: i64,
    pub fan: String,
    pub vent: String,
    pub ventilator_min_on_time: i64,
    pub is_optional: bool,
    pub is_temperature_relative: bool,
    pub cool_relative_temp: i64,
    pub heat_relative_temp: i64,
    pub is_temperature_absolute: bool,
    pub duty_cycle_percentage: i64,
    pub fan_min_on_time: i64,
    pub occupied_sensor_active: bool,
    pub unoccupied_sensor_active: bool,
    pub dr_ramp_up_temp: i64,
    pub dr_ramp_up_time: i64,
    pub link_ref: String,
    pub hold_climate_ref: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Program {
    pub schedule: Vec<Vec<String>>,
    pub climates: Vec<Climate>,
    pub current_climate_ref: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Climate {
    pub name: String,
    pub climate_ref: String,
    pub is_occupied: bool,
    pub is_optimized: bool,
    pub cool_fan: String,
    pub heat_fan: String,
    pub vent: String,
    pub ventilator_min_on_time: i64,
    pub owner: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub colour: i64,
    pub cool_temp: i64,
    pub heat_temp: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSensor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub in_use: bool,
    pub capability: Vec<RemoteSensorCapability>,
}

impl RemoteSensor {
    /// Temperature reading in degrees, if the sensor reports a numeric one.
    pub fn temperature(&self) -> Option<f64> {
        self.capability("temperature")
            .and_then(|value| value.parse::<f64>().ok())
            .map(|tenths| tenths / 10.0)
    }

    /// Occupancy reading, if the sensor has that capability.
    pub fn occupied(&self) -> Option<bool> {
        self.capability("occupancy").map(|value| value == "true")
    }

    fn capability(&self, kind: &str) -> Option<&str> {
        self.capability
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSensorCapability {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetThermostatSummaryRequest {
    pub selection: Selection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetThermostatSummaryResponse {
    pub thermostat_count: i64,
    pub revision_list: Vec<String>,
    pub status_list: Vec<String>,
}

/// One thermostat's entry in the summary endpoint's colon-separated lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThermostatSummary {
    pub identifier: String,
    pub name: String,
    pub connected: bool,
    pub thermostat_revision: String,
    pub alerts_revision: String,
    pub runtime_revision: String,
    pub interval_revision: String,
    pub equipment_status: EquipmentStatus,
}

/// Equipment currently running, from the summary `statusList`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EquipmentStatus {
    pub heat_pump: bool,
    pub heat_pump2: bool,
    pub heat_pump3: bool,
    pub comp_cool1: bool,
    pub comp_cool2: bool,
    pub aux_heat1: bool,
    pub aux_heat2: bool,
    pub aux_heat3: bool,
    pub fan: bool,
    pub humidifier: bool,
    pub dehumidifier: bool,
    pub ventilator: bool,
    pub economizer: bool,
    pub comp_hot_water: bool,
    pub aux_hot_water: bool,
}

impl EquipmentStatus {
    /// Parse a comma-separated equipment list. Unknown names are ignored.
    pub fn parse(list: &str) -> Self {
        let mut status = Self::default();
        for name in list.split(',').map(str::trim) {
            let flag = match name {
                "heatPump" => &mut status.heat_pump,
                "heatPump2" => &mut status.heat_pump2,
                "heatPump3" => &mut status.heat_pump3,
                "compCool1" => &mut status.comp_cool1,
                "compCool2" => &mut status.comp_cool2,
                "auxHeat1" => &mut status.aux_heat1,
                "auxHeat2" => &mut status.aux_heat2,
                "auxHeat3" => &mut status.aux_heat3,
                "fan" => &mut status.fan,
                "humidifier" => &mut status.humidifier,
                "dehumidifier" => &mut status.dehumidifier,
                "ventilator" => &mut status.ventilator,
                "economizer" => &mut status.economizer,
                "compHotWater" => &mut status.comp_hot_water,
                "auxHotWater" => &mut status.aux_hot_water,
                _ => continue,
            };
            *flag = true;
        }
        status
    }
}

impl GetThermostatSummaryResponse {
    /// Join `revisionList` and `statusList` by thermostat identifier.
    pub fn summaries(&self) -> std::collections::HashMap<String, ThermostatSummary> {
        let mut summaries = std::collections::HashMap::new();
        for revision in &self.revision_list {
            let mut fields = revision.split(':');
            let Some(identifier) = fields.next().filter(|id| !id.is_empty()) else {
                continue;
            };
            let mut field = || fields.next().unwrap_or_default().to_string();
            let summary = ThermostatSummary {
                identifier: identifier.to_string(),
                name: field(),
                connected: field() == "true",
                thermostat_revision: field(),
                alerts_revision: field(),
                runtime_revision: field(),
                interval_revision: field(),
                equipment_status: EquipmentStatus::default(),
            };
            summaries.insert(summary.identifier.clone(), summary);
        }

        for status in &self.status_list {
            let (identifier, equipment) = status.split_once(':').unwrap_or((status.as_str(), ""));
            summaries
                .entry(identifier.to_string())
                .or_insert_with(|| ThermostatSummary {
                    identifier: identifier.to_string(),
                    ..ThermostatSummary::default()
                })
                .equipment_status = EquipmentStatus::parse(equipment);
        }
        summaries
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn functions_serialize_with_type_and_params() {
        let request = UpdateThermostatRequest {
            selection: Selection::thermostats("123"),
            functions: vec![
                Function::SendMessage(SendMessageParams { text: "hi".into() }),
                Function::ResumeProgram(ResumeProgramParams { resume_all: true }),
                Function::SetHold(SetHoldParams {
                    heat_hold_temp: Some(680),
                    cool_hold_temp: Some(740),
                    hold_type: Some("dateTime".into()),
                    ..SetHoldParams::default()
                }),
            ],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["selection"]["selectionType"], "thermostats");
        assert_eq!(value["selection"]["selectionMatch"], "123");
        assert_eq!(
            value["functions"],
            json!([
                {"type": "sendMessage", "params": {"text": "hi"}},
                {"type": "resumeProgram", "params": {"resumeAll": true}},
                {"type": "setHold", "params": {"coolHoldTemp": 740, "heatHoldTemp": 680, "holdType": "dateTime"}},
            ])
        );
    }

    #[test]
    fn thermostat_tolerates_missing_fields() {
        let thermostat: Thermostat = serde_json::from_value(json!({
            "identifier": "318324702718",
            "name": "Home",
            "runtime": {"actualTemperature": 701, "desiredHeat": 680, "desiredCool": 760},
            "remoteSensors": [{
                "name": "Bedroom",
                "inUse": true,
                "capability": [
                    {"type": "temperature", "value": "688"},
                    {"type": "occupancy", "value": "true"}
                ]
            }]
        }))
        .unwrap();
        assert_eq!(thermostat.runtime.desired_heat, 680);
        assert!(thermostat.events.is_empty());
        let sensor = &thermostat.remote_sensors[0];
        assert_eq!(sensor.temperature(), Some(68.8));
        assert_eq!(sensor.occupied(), Some(true));
    }

    #[test]
    fn sensor_with_unknown_temperature() {
        let sensor: RemoteSensor = serde_json::from_value(json!({
            "name": "Porch",
            "capability": [{"type": "temperature", "value": "unknown"}]
        }))
        .unwrap();
        assert_eq!(sensor.temperature(), None);
        assert_eq!(sensor.occupied(), None);
    }

    #[test]
    fn summary_lists_are_joined_by_identifier() {
        let response = GetThermostatSummaryResponse {
            thermostat_count: 2,
            revision_list: vec![
                "111:Upstairs:true:170101:170102:170103:170104".into(),
                "222:Downstairs:false:1:2:3:4".into(),
            ],
            status_list: vec!["111:fan,compCool1,bogus".into(), "222:".into()],
        };
        let summaries = response.summaries();
        assert_eq!(summaries.len(), 2);

        let up = &summaries["111"];
        assert_eq!(up.name, "Upstairs");
        assert!(up.connected);
        assert_eq!(up.runtime_revision, "170103");
        assert!(up.equipment_status.fan);
        assert!(up.equipment_status.comp_cool1);
        assert!(!up.equipment_status.aux_heat1);

        let down = &summaries["222"];
        assert!(!down.connected);
        assert_eq!(down.equipment_status, EquipmentStatus::default());
    }
}
