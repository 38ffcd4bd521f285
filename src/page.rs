use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{HEIGHT_RANGE, MARKER_SIZE_RANGE, PAGE_LAYOUT, PAGE_TITLE, SIDEBAR_HEADER};
use crate::dataset::MineTable;
use crate::figure::{build_figure, DisplayConfig, DisplayError, FigureError, MapFigure};
use crate::filter;
use crate::interaction::EventSubscriptions;

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error(transparent)]
    Figure(#[from] FigureError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Widget {
    MultiSelect {
        key: &'static str,
        label: &'static str,
        options: Vec<String>,
        default: Vec<String>,
        value: Vec<String>,
    },
    Slider {
        key: &'static str,
        label: &'static str,
        min: u32,
        max: u32,
        step: u32,
        default: u32,
        value: u32,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Sidebar {
    pub header: &'static str,
    pub widgets: Vec<Widget>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageConfig {
    pub title: &'static str,
    pub layout: &'static str,
    pub sidebar: Sidebar,
}

/// Current widget values sent by the page. Absent fields take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewRequest {
    #[serde(default)]
    pub countries: Option<Vec<String>>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub marker_size: Option<u32>,
}

/// One full recompute of the page.
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub page: PageConfig,
    pub figure: MapFigure,
    pub events: EventSubscriptions,
    pub display: DisplayConfig,
    pub warnings: Vec<String>,
    pub total_rows: usize,
    pub shown_rows: usize,
    pub loaded_at: DateTime<Utc>,
}

fn slider(
    key: &'static str,
    label: &'static str,
    (min, max, default, step): (u32, u32, u32, u32),
    value: u32,
) -> Widget {
    Widget::Slider {
        key,
        label,
        min,
        max,
        step,
        default,
        value,
    }
}

/// Page chrome and sidebar widgets for the loaded table.
pub fn page_config(
    table: &MineTable,
    selection: Option<&[String]>,
    display: DisplayConfig,
) -> PageConfig {
    let mut widgets = Vec::with_capacity(3);
    let warning = match filter::country_options(table) {
        Some(options) => {
            let value = selection.map_or_else(|| options.clone(), <[String]>::to_vec);
            widgets.push(Widget::MultiSelect {
                key: "countries",
                label: "Country",
                default: options.clone(),
                options,
                value,
            });
            None
        }
        None => Some(filter::MISSING_COUNTRY_WARNING.to_string()),
    };
    widgets.push(slider("height", "Map height", HEIGHT_RANGE, display.height));
    widgets.push(slider(
        "marker_size",
        "Marker size",
        MARKER_SIZE_RANGE,
        display.marker_size,
    ));

    PageConfig {
        title: PAGE_TITLE,
        layout: PAGE_LAYOUT,
        sidebar: Sidebar {
            header: SIDEBAR_HEADER,
            widgets,
            warning,
        },
    }
}

/// Recomputes the whole page from the table and the current widget values.
pub fn render_view(table: &MineTable, request: &ViewRequest) -> Result<PageView, PageError> {
    let display = DisplayConfig::new(request.height, request.marker_size)?;
    let selection = request.countries.as_deref();

    let outcome = filter::apply(table, selection);
    let figure = build_figure(&outcome.table, display)?;
    let events = EventSubscriptions::for_figure(&figure);

    let mut warnings: Vec<String> = outcome.warning.into_iter().collect();
    warnings.extend(table.warnings.iter().cloned());

    Ok(PageView {
        page: page_config(table, selection, display),
        shown_rows: outcome.table.len(),
        total_rows: table.len(),
        loaded_at: table.loaded_at,
        figure,
        events,
        display,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{header, num, text, uk_france, without_country};
    use crate::dataset::CellValue;

    fn request(countries: Option<Vec<&str>>, height: Option<u32>, marker_size: Option<u32>) -> ViewRequest {
        ViewRequest {
            countries: countries.map(|c| c.iter().map(|s| s.to_string()).collect()),
            height,
            marker_size,
        }
    }

    #[test]
    fn default_view_shows_everything() {
        let view = render_view(&uk_france(), &ViewRequest::default()).unwrap();
        assert_eq!(view.page.title, "Uranium Mine Map");
        assert_eq!(view.page.layout, "wide");
        assert_eq!(view.total_rows, 2);
        assert_eq!(view.shown_rows, 2);
        assert_eq!(view.display, DisplayConfig::default());
        assert!(view.warnings.is_empty());
        assert!(view.figure.layout.bounds.is_some());
    }

    #[test]
    fn sidebar_widgets_match_slider_ranges() {
        let view = render_view(&uk_france(), &request(Some(vec!["UK"]), Some(900), Some(18))).unwrap();
        let widgets = &view.page.sidebar.widgets;
        assert_eq!(widgets.len(), 3);
        assert_eq!(
            widgets[0],
            Widget::MultiSelect {
                key: "countries",
                label: "Country",
                options: vec!["France".into(), "UK".into()],
                default: vec!["France".into(), "UK".into()],
                value: vec!["UK".into()],
            }
        );
        assert_eq!(
            widgets[1],
            Widget::Slider {
                key: "height",
                label: "Map height",
                min: 400,
                max: 900,
                step: 50,
                default: 650,
                value: 900,
            }
        );
        assert!(matches!(
            widgets[2],
            Widget::Slider { min: 6, max: 18, step: 1, default: 10, value: 18, .. }
        ));
        assert_eq!(view.figure.layout.height, 900);
        assert_eq!(view.events.override_height, 900);
        assert_eq!(view.shown_rows, 1);
    }

    #[test]
    fn missing_country_column_warns_and_drops_multiselect() {
        let table = without_country();
        let view = render_view(&table, &request(Some(vec!["UK"]), None, None)).unwrap();
        assert_eq!(view.shown_rows, table.len());
        assert_eq!(view.warnings, vec![filter::MISSING_COUNTRY_WARNING.to_string()]);
        assert_eq!(view.page.sidebar.warning.as_deref(), Some(filter::MISSING_COUNTRY_WARNING));
        assert_eq!(view.page.sidebar.widgets.len(), 2);
    }

    #[test]
    fn empty_selection_is_not_an_error() {
        let view = render_view(&uk_france(), &request(Some(vec![]), None, None)).unwrap();
        assert_eq!(view.shown_rows, 0);
        assert!(view.figure.layout.bounds.is_none());
        assert_eq!(view.figure.layout.zoom, 5.5);
    }

    #[test]
    fn out_of_range_slider_is_rejected() {
        let err = render_view(&uk_france(), &request(None, Some(1200), None)).unwrap_err();
        assert!(matches!(err, PageError::Display(_)));
    }

    #[test]
    fn first_view_matches_multiselect_default() {
        let header = header(&["Site", "Country", "Latitude", "Longitude"]);
        let rows = vec![
            vec![text("A"), text("UK"), num(52.0), num(-1.0)],
            vec![text("B"), CellValue::Empty, num(48.0), num(2.0)],
        ];
        let table = MineTable::from_rows("Mines", &header, rows, 1).unwrap();

        let initial = render_view(&table, &ViewRequest::default()).unwrap();
        let default = match &initial.page.sidebar.widgets[0] {
            Widget::MultiSelect { default, .. } => default.clone(),
            other => panic!("expected country multiselect, got {:?}", other),
        };
        let explicit = render_view(
            &table,
            &ViewRequest { countries: Some(default), ..ViewRequest::default() },
        )
        .unwrap();

        assert_eq!(initial.shown_rows, 1);
        assert_eq!(explicit.shown_rows, initial.shown_rows);
        assert_eq!(explicit.figure.points().count(), initial.figure.points().count());
    }

    #[test]
    fn view_serializes_for_the_frontend() {
        let view = render_view(&uk_france(), &ViewRequest::default()).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["page"]["layout"], "wide");
        assert_eq!(json["page"]["sidebar"]["widgets"][0]["type"], "multi_select");
        assert_eq!(json["figure"]["data"][0]["type"], "scattermap");
        assert_eq!(json["figure"]["data"][0]["marker"]["color"], "red");
        assert_eq!(json["events"]["hover"], false);
    }
}
