use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    BASEMAP_STYLE, DEFAULT_ZOOM, HEIGHT_RANGE, MARKER_COLOR, MARKER_OPACITY, MARKER_SIZE_RANGE,
    OSM_ATTRIBUTION, OSM_TILE_URL,
};
use crate::dataset::{CellValue, Column, MineTable};

/// Columns surfaced in the marker tooltip, in display order.
const HOVER_COLUMNS: [Column; 4] = [
    Column::Country,
    Column::ClosedYear,
    Column::TillNow,
    Column::Status,
];

#[derive(Debug, Error, PartialEq)]
pub enum DisplayError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum FigureError {
    #[error("Row {row} ('{site}') has no valid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinate {
        row: usize,
        site: String,
        lat: f64,
        lon: f64,
    },
}

/// Slider-driven display parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub height: u32,
    pub marker_size: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            height: HEIGHT_RANGE.2,
            marker_size: MARKER_SIZE_RANGE.2,
        }
    }
}

impl DisplayConfig {
    /// Missing values take the slider default; values inside the range snap to the slider step.
    pub fn new(height: Option<u32>, marker_size: Option<u32>) -> Result<Self, DisplayError> {
        Ok(Self {
            height: slider_value("height", height, HEIGHT_RANGE)?,
            marker_size: slider_value("marker_size", marker_size, MARKER_SIZE_RANGE)?,
        })
    }
}

fn slider_value(
    name: &'static str,
    value: Option<u32>,
    (min, max, default, step): (u32, u32, u32, u32),
) -> Result<u32, DisplayError> {
    let value = value.unwrap_or(default);
    if value < min || value > max {
        return Err(DisplayError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    let snapped = min + (value - min + step / 2) / step * step;
    Ok(snapped.min(max))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Viewport rectangle, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Bounds {
    /// Tight box around the points. `None` for fewer than two points, where
    /// the box would be empty or degenerate.
    pub fn enclosing(points: &[MapPoint]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let init = Bounds {
            west: f64::INFINITY,
            east: f64::NEG_INFINITY,
            south: f64::INFINITY,
            north: f64::NEG_INFINITY,
        };
        Some(points.iter().fold(init, |b, p| Bounds {
            west: b.west.min(p.lon),
            east: b.east.max(p.lon),
            south: b.south.min(p.lat),
            north: b.north.max(p.lat),
        }))
    }

    #[cfg(test)]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.west..=self.east).contains(&lon) && (self.south..=self.north).contains(&lat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoverField {
    pub label: &'static str,
    pub value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
    pub hover_name: String,
    pub hover_data: Vec<HoverField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub size: u32,
    pub color: &'static str,
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScatterMapTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub points: Vec<MapPoint>,
    pub marker: MarkerStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margin {
    pub r: u32,
    pub t: u32,
    pub l: u32,
    pub b: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Basemap {
    pub style: &'static str,
    pub tile_url: &'static str,
    pub attribution: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapLayout {
    pub height: u32,
    pub zoom: f64,
    pub center: Option<LatLon>,
    pub bounds: Option<Bounds>,
    pub basemap: Basemap,
    pub margin: Margin,
}

/// Everything the page needs to draw the map.
#[derive(Debug, Clone, Serialize)]
pub struct MapFigure {
    pub data: Vec<ScatterMapTrace>,
    pub layout: MapLayout,
}

impl MapFigure {
    pub fn points(&self) -> impl Iterator<Item = &MapPoint> {
        self.data.iter().flat_map(|trace| trace.points.iter())
    }
}

/// Builds the scatter map for `table`. Styling never depends on the data.
pub fn build_figure(table: &MineTable, display: DisplayConfig) -> Result<MapFigure, FigureError> {
    let hover_columns: Vec<Column> = HOVER_COLUMNS
        .into_iter()
        .filter(|column| table.has_column(*column))
        .collect();

    let points = table
        .records
        .iter()
        .map(|record| {
            if !record.latitude.is_finite() || !record.longitude.is_finite() {
                return Err(FigureError::InvalidCoordinate {
                    row: record.row,
                    site: record.site.clone(),
                    lat: record.latitude,
                    lon: record.longitude,
                });
            }
            Ok(MapPoint {
                lat: record.latitude,
                lon: record.longitude,
                hover_name: record.site.clone(),
                hover_data: hover_columns
                    .iter()
                    .map(|column| HoverField {
                        label: column.label(),
                        value: record.value(*column),
                    })
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bounds = Bounds::enclosing(&points);
    let center = mean_center(&points);

    Ok(MapFigure {
        data: vec![ScatterMapTrace {
            kind: "scattermap",
            mode: "markers",
            points,
            marker: MarkerStyle {
                size: display.marker_size,
                color: MARKER_COLOR,
                opacity: MARKER_OPACITY,
            },
        }],
        layout: MapLayout {
            height: display.height,
            zoom: DEFAULT_ZOOM,
            center,
            bounds,
            basemap: Basemap {
                style: BASEMAP_STYLE,
                tile_url: OSM_TILE_URL,
                attribution: OSM_ATTRIBUTION,
            },
            margin: Margin {
                r: 0,
                t: 0,
                l: 0,
                b: 0,
            },
        },
    })
}

fn mean_center(points: &[MapPoint]) -> Option<LatLon> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    Some(LatLon {
        lat: lat / n,
        lon: lon / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{from_coords, header, num, text, uk_france, COUNTRIES};
    use crate::filter;
    use proptest::prelude::*;

    fn coords(rows: std::ops::RangeInclusive<usize>) -> impl Strategy<Value = Vec<(usize, f64, f64)>> {
        prop::collection::vec(
            (0..COUNTRIES.len(), -90.0f64..=90.0, -180.0f64..=180.0),
            rows,
        )
    }

    fn scattered_table() -> MineTable {
        let header = header(&["Site", "Country", "Latitude", "Longitude"]);
        let coords = [
            (60.1, -3.2),
            (37.9, 23.7),
            (52.0, -1.0),
            (48.0, 2.0),
            (41.4, -8.6),
            (50.3, 12.9),
        ];
        let rows = coords
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| vec![text(&format!("S{}", i)), text("X"), num(*lat), num(*lon)])
            .collect::<Vec<_>>();
        MineTable::from_rows("Mines", &header, rows, 1).unwrap()
    }

    #[test]
    fn bounds_enclose_every_point() {
        let table = scattered_table();
        let figure = build_figure(&table, DisplayConfig::default()).unwrap();
        let bounds = figure.layout.bounds.expect("bounds for six points");
        for record in &table.records {
            assert!(bounds.contains(record.latitude, record.longitude));
        }
        assert_eq!(bounds.west, -8.6);
        assert_eq!(bounds.north, 60.1);
    }

    #[test]
    fn single_country_has_no_bounds() {
        let table = uk_france();
        let selection = vec!["UK".to_string()];
        let filtered = filter::apply(&table, Some(selection.as_slice())).table;
        let figure = build_figure(&filtered, DisplayConfig::default()).unwrap();

        let points: Vec<_> = figure.points().collect();
        assert_eq!(points.len(), 1);
        assert_eq!((points[0].lat, points[0].lon), (52.0, -1.0));
        assert_eq!(points[0].hover_name, "A");
        assert!(figure.layout.bounds.is_none());
        assert_eq!(figure.layout.zoom, 5.5);
        assert_eq!(figure.layout.center, Some(LatLon { lat: 52.0, lon: -1.0 }));
    }

    #[test]
    fn both_countries_fit_bounds() {
        let figure = build_figure(&uk_france(), DisplayConfig::default()).unwrap();
        assert_eq!(figure.points().count(), 2);
        assert_eq!(
            figure.layout.bounds,
            Some(Bounds {
                west: -1.0,
                east: 2.0,
                south: 48.0,
                north: 52.0,
            })
        );
    }

    #[test]
    fn empty_table_renders_empty_map() {
        let table = uk_france().with_records(Vec::new());
        let figure = build_figure(&table, DisplayConfig::default()).unwrap();
        assert_eq!(figure.points().count(), 0);
        assert!(figure.layout.bounds.is_none());
        assert!(figure.layout.center.is_none());
    }

    #[test]
    fn sliders_drive_height_and_marker_size() {
        let display = DisplayConfig::new(Some(900), Some(18)).unwrap();
        let figure = build_figure(&scattered_table(), display).unwrap();
        assert_eq!(figure.layout.height, 900);
        assert!(figure.data.iter().all(|trace| trace.marker.size == 18));
    }

    #[test]
    fn marker_style_is_constant() {
        let a = build_figure(&uk_france(), DisplayConfig::default()).unwrap();
        let b = build_figure(&scattered_table(), DisplayConfig::default()).unwrap();
        let expected = MarkerStyle {
            size: 10,
            color: "red",
            opacity: 0.85,
        };
        assert_eq!(a.data.len(), 1);
        assert_eq!(a.data[0].marker, expected);
        assert_eq!(b.data[0].marker, expected);
    }

    #[test]
    fn tooltip_excludes_coordinates() {
        let figure = build_figure(&uk_france(), DisplayConfig::default()).unwrap();
        let point = figure.points().next().unwrap();
        let labels: Vec<_> = point.hover_data.iter().map(|f| f.label).collect();
        assert_eq!(
            labels,
            vec!["Country", "Closed year (numeric)", "Till Now (Years)", "Status"]
        );
        assert_eq!(figure.layout.margin, Margin { r: 0, t: 0, l: 0, b: 0 });
        assert_eq!(figure.layout.basemap.style, "open-street-map");
    }

    #[test]
    fn non_finite_coordinates_fail_loudly() {
        let mut table = uk_france();
        table.records[1].longitude = f64::NAN;
        let err = build_figure(&table, DisplayConfig::default()).unwrap_err();
        assert!(matches!(err, FigureError::InvalidCoordinate { row: 3, .. }));
    }

    #[test]
    fn display_config_bounds_and_snapping() {
        assert_eq!(
            DisplayConfig::new(None, None).unwrap(),
            DisplayConfig {
                height: 650,
                marker_size: 10
            }
        );
        assert_eq!(DisplayConfig::new(Some(676), None).unwrap().height, 700);
        assert_eq!(DisplayConfig::new(Some(420), None).unwrap().height, 400);
        assert!(matches!(
            DisplayConfig::new(Some(950), None),
            Err(DisplayError::OutOfRange { name: "height", .. })
        ));
        assert!(DisplayConfig::new(None, Some(5)).is_err());
    }

    proptest! {
        #[test]
        fn bounds_contain_all_points(rows in coords(2..=40)) {
            let table = from_coords(&rows);
            let figure = build_figure(&table, DisplayConfig::default()).unwrap();
            let bounds = figure.layout.bounds.unwrap();
            for record in &table.records {
                prop_assert!(bounds.contains(record.latitude, record.longitude));
            }
        }

        #[test]
        fn no_bounds_below_two_points(rows in coords(0..=1)) {
            let figure = build_figure(&from_coords(&rows), DisplayConfig::default()).unwrap();
            prop_assert!(figure.layout.bounds.is_none());
        }

        #[test]
        fn marker_style_ignores_data(
            rows in coords(0..=40),
            height in 400u32..=900,
            marker_size in 6u32..=18,
        ) {
            let display = DisplayConfig::new(Some(height), Some(marker_size)).unwrap();
            let figure = build_figure(&from_coords(&rows), display).unwrap();
            let expected = MarkerStyle {
                size: display.marker_size,
                color: "red",
                opacity: 0.85,
            };
            prop_assert_eq!(figure.data.len(), 1);
            prop_assert_eq!(figure.data[0].marker, expected);
            prop_assert_eq!(figure.layout.height, display.height);
        }
    }
}
