use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants::HEIGHT_RANGE;
use crate::figure::MapFigure;

/// Which map events the page reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSubscriptions {
    pub click: bool,
    pub select: bool,
    /// Off: hover traffic is too noisy to ship to the server.
    pub hover: bool,
    pub override_height: u32,
}

impl Default for EventSubscriptions {
    fn default() -> Self {
        Self {
            click: true,
            select: true,
            hover: false,
            override_height: HEIGHT_RANGE.2,
        }
    }
}

impl EventSubscriptions {
    pub fn for_figure(figure: &MapFigure) -> Self {
        Self {
            override_height: figure.layout.height,
            ..Self::default()
        }
    }

    pub fn accepts(&self, kind: MapEventKind) -> bool {
        match kind {
            MapEventKind::Click => self.click,
            MapEventKind::Select => self.select,
            MapEventKind::Hover => self.hover,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapEventKind {
    Click,
    Select,
    Hover,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPoint {
    pub site: String,
    pub lat: f64,
    pub lon: f64,
}

/// A click or box selection reported by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEvent {
    pub kind: MapEventKind,
    #[serde(default)]
    pub points: Vec<SelectedPoint>,
}

#[derive(Debug, Error, PartialEq)]
pub enum InteractionError {
    #[error("'{0:?}' events are not subscribed")]
    NotSubscribed(MapEventKind),
}

/// Hook for reacting to map events.
pub trait PointSelectionHandler: Send + Sync {
    fn on_point_clicked(&self, points: &[SelectedPoint]);
    fn on_points_selected(&self, points: &[SelectedPoint]);
}

/// Default handler: records the event and does nothing else.
#[derive(Debug, Default)]
pub struct LoggingHandler;

impl PointSelectionHandler for LoggingHandler {
    fn on_point_clicked(&self, points: &[SelectedPoint]) {
        debug!(count = points.len(), sites = ?site_names(points), "Map click");
    }

    fn on_points_selected(&self, points: &[SelectedPoint]) {
        debug!(count = points.len(), sites = ?site_names(points), "Map selection");
    }
}

fn site_names(points: &[SelectedPoint]) -> Vec<&str> {
    points.iter().map(|p| p.site.as_str()).collect()
}

/// Routes an event to the handler if its kind is subscribed.
pub fn dispatch(
    subscriptions: &EventSubscriptions,
    handler: &dyn PointSelectionHandler,
    event: &MapEvent,
) -> Result<(), InteractionError> {
    if !subscriptions.accepts(event.kind) {
        return Err(InteractionError::NotSubscribed(event.kind));
    }
    match event.kind {
        MapEventKind::Click => handler.on_point_clicked(&event.points),
        MapEventKind::Select => handler.on_points_selected(&event.points),
        MapEventKind::Hover => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::uk_france;
    use crate::figure::{build_figure, DisplayConfig};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(MapEventKind, usize)>>,
    }

    impl PointSelectionHandler for Recorder {
        fn on_point_clicked(&self, points: &[SelectedPoint]) {
            self.calls.lock().unwrap().push((MapEventKind::Click, points.len()));
        }

        fn on_points_selected(&self, points: &[SelectedPoint]) {
            self.calls.lock().unwrap().push((MapEventKind::Select, points.len()));
        }
    }

    fn subscriptions() -> EventSubscriptions {
        let display = DisplayConfig::new(Some(800), None).unwrap();
        EventSubscriptions::for_figure(&build_figure(&uk_france(), display).unwrap())
    }

    fn point(site: &str) -> SelectedPoint {
        SelectedPoint {
            site: site.to_string(),
            lat: 52.0,
            lon: -1.0,
        }
    }

    #[test]
    fn subscriptions_follow_figure_height() {
        let subs = subscriptions();
        assert!(subs.click && subs.select);
        assert!(!subs.hover);
        assert_eq!(subs.override_height, 800);
    }

    #[test]
    fn click_and_select_reach_the_handler() {
        let recorder = Recorder::default();
        let subs = subscriptions();
        let click = MapEvent {
            kind: MapEventKind::Click,
            points: vec![point("A")],
        };
        let select = MapEvent {
            kind: MapEventKind::Select,
            points: vec![point("A"), point("B")],
        };

        dispatch(&subs, &recorder, &click).unwrap();
        dispatch(&subs, &recorder, &select).unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(MapEventKind::Click, 1), (MapEventKind::Select, 2)]
        );
    }

    #[test]
    fn hover_is_rejected() {
        let recorder = Recorder::default();
        let hover = MapEvent {
            kind: MapEventKind::Hover,
            points: vec![point("A")],
        };
        let err = dispatch(&subscriptions(), &recorder, &hover).unwrap_err();
        assert_eq!(err, InteractionError::NotSubscribed(MapEventKind::Hover));
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn event_payload_parses_from_json() {
        let event: MapEvent = serde_json::from_str(
            r#"{"kind":"select","points":[{"site":"A","lat":52.0,"lon":-1.0}]}"#,
        )
        .unwrap();
        assert_eq!(event.kind, MapEventKind::Select);
        assert_eq!(event.points, vec![point("A")]);
    }
}
