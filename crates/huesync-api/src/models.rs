// CLIP v2 wire types and the domain snapshots derived from them.
//
// Every CLIP v2 response uses the `{ "errors": [...], "data": [...] }`
// envelope. Only the fields the streaming engine needs are typed; the
// rest travel as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClipResponse<T> {
    #[serde(default)]
    pub errors: Vec<ClipError>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClipError {
    pub description: String,
}

/// Descriptions from the envelope's `errors[]`, if the payload has one.
pub fn clip_errors(payload: &Value) -> Vec<String> {
    payload
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("description").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

// ── Entertainment areas ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AreaStatus {
    Active,
    Inactive,
}

/// Position of a channel in the area's normalized 3-D space.
///
/// `x` runs left to right, `y` back to front, `z` floor to ceiling, each
/// nominally in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: u8,
    pub position: Position,
}

/// A bridge-defined group of lights eligible for streaming.
///
/// Channel order is the order the bridge returned and is used as-is for
/// frame channel order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntertainmentArea {
    pub id: String,
    pub name: String,
    pub status: AreaStatus,
    pub channels: Vec<Channel>,
}

impl EntertainmentArea {
    pub fn is_active(&self) -> bool {
        self.status == AreaStatus::Active
    }
}

/// Raw `entertainment_configuration` resource.
#[derive(Debug, Deserialize)]
pub struct EntertainmentConfiguration {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    pub status: AreaStatus,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
pub struct Metadata {
    pub name: String,
}

impl From<EntertainmentConfiguration> for EntertainmentArea {
    fn from(raw: EntertainmentConfiguration) -> Self {
        Self {
            name: raw.metadata.map(|m| m.name).unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            status: raw.status,
            channels: raw.channels,
        }
    }
}

/// Parse an `entertainment_configuration` listing into areas.
pub fn parse_areas(payload: &Value) -> Result<Vec<EntertainmentArea>, serde_json::Error> {
    let envelope: ClipResponse<EntertainmentConfiguration> =
        serde_json::from_value(payload.clone())?;
    Ok(envelope.data.into_iter().map(EntertainmentArea::from).collect())
}

// ── Event stream ─────────────────────────────────────────────────────

/// One element of a `data:` record's JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBatch {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Vec<ResourceChange>,
}

/// One changed resource inside an [`EventBatch`].
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceChange {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource-specific status (`"inactive"` for stopped areas). Some
    /// resource types report an object here, so it stays untyped.
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Decode the batches of one event-stream payload, skipping malformed ones.
pub fn event_batches(payload: &Value) -> Vec<EventBatch> {
    payload
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Ids of entertainment areas this payload reports as inactive.
pub fn inactive_areas(payload: &Value) -> Vec<String> {
    event_batches(payload)
        .into_iter()
        .flat_map(|batch| batch.data)
        .filter(|change| {
            change.kind == "entertainment_configuration"
                && change.status.as_ref().and_then(Value::as_str) == Some("inactive")
        })
        .map(|change| change.id)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn area_listing() -> Value {
        json!({
            "errors": [],
            "data": [{
                "id": "1a8d99cc-967b-44f2-9202-43f976c0fa6b",
                "type": "entertainment_configuration",
                "metadata": { "name": "TV area" },
                "status": "inactive",
                "channels": [
                    { "channel_id": 0, "position": { "x": -1.0, "y": 0.8, "z": 0.0 }, "members": [] },
                    { "channel_id": 1, "position": { "x": 1.0, "y": 0.8, "z": 0.0 }, "members": [] }
                ]
            }]
        })
    }

    #[test]
    fn parses_entertainment_areas_in_bridge_order() {
        let areas = parse_areas(&area_listing()).unwrap();
        assert_eq!(areas.len(), 1);
        let area = &areas[0];
        assert_eq!(area.name, "TV area");
        assert_eq!(area.status, AreaStatus::Inactive);
        assert!(!area.is_active());
        let ids: Vec<u8> = area.channels.iter().map(|c| c.channel_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!((area.channels[0].position.x + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_metadata_falls_back_to_id() {
        let payload = json!({ "data": [{ "id": "abc", "status": "active" }] });
        let areas = parse_areas(&payload).unwrap();
        assert_eq!(areas[0].name, "abc");
        assert!(areas[0].channels.is_empty());
    }

    #[test]
    fn clip_errors_are_collected() {
        let payload = json!({ "errors": [{ "description": "unauthorized user" }], "data": [] });
        assert_eq!(clip_errors(&payload), vec!["unauthorized user".to_string()]);
        assert!(clip_errors(&json!([1, 2])).is_empty());
    }

    #[test]
    fn detects_inactive_areas_in_event_payload() {
        let payload = json!([{
            "creationtime": "2024-01-01T00:00:00Z",
            "id": "evt-1",
            "type": "update",
            "data": [
                { "id": "area-1", "type": "entertainment_configuration", "status": "inactive" },
                { "id": "light-1", "type": "light", "on": { "on": true } },
                { "id": "zb-1", "type": "zigbee_connectivity", "status": "connected" }
            ]
        }]);

        assert_eq!(inactive_areas(&payload), vec!["area-1".to_string()]);
        let batches = event_batches(&payload);
        assert_eq!(batches[0].data[1].extra["on"]["on"], true);
    }

    #[test]
    fn non_array_payload_has_no_batches() {
        assert!(event_batches(&json!({ "a": 1 })).is_empty());
    }
}
