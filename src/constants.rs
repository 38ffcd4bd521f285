// Server configuration
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8501;

// Input workbook
pub const DEFAULT_DATA_FILE: &str = "uranium_mines_uk_europe_locations.xlsx";
pub const DEFAULT_SHEET: &str = "Mines";

// Page
pub const PAGE_TITLE: &str = "Uranium Mine Map";
pub const PAGE_LAYOUT: &str = "wide";
pub const SIDEBAR_HEADER: &str = "Filter";

// Sliders: (min, max, default, step)
pub const HEIGHT_RANGE: (u32, u32, u32, u32) = (400, 900, 650, 50);
pub const MARKER_SIZE_RANGE: (u32, u32, u32, u32) = (6, 18, 10, 1);

// Markers are never data-driven
pub const MARKER_COLOR: &str = "red";
pub const MARKER_OPACITY: f64 = 0.85;

// Basemap
pub const DEFAULT_ZOOM: f64 = 5.5;
pub const BASEMAP_STYLE: &str = "open-street-map";
pub const OSM_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const OSM_ATTRIBUTION: &str =
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";

// SSE
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
pub const HEARTBEAT_SECS: u64 = 30;
pub const KEEPALIVE_SECS: u64 = 15;
