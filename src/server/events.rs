use serde::{Deserialize, Serialize};

use crate::interaction::{MapEvent, MapEventKind, SelectedPoint};

// SSE Event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: String,
    pub data: StreamData,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamData {
    pub points: Option<Vec<SelectedPoint>>,
    pub message: Option<String>,
}

impl StreamEvent {
    pub fn from_map_event(event: &MapEvent) -> Self {
        let event_type = match event.kind {
            MapEventKind::Click => "map_click",
            MapEventKind::Select => "map_select",
            MapEventKind::Hover => "map_hover",
        };
        StreamEvent {
            event_type: event_type.to_string(),
            data: StreamData {
                points: Some(event.points.clone()),
                ..Default::default()
            },
        }
    }

    pub fn heartbeat() -> Self {
        StreamEvent {
            event_type: "heartbeat".to_string(),
            data: StreamData {
                message: Some("SSE connection alive".to_string()),
                ..Default::default()
            },
        }
    }
}
