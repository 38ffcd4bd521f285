use std::sync::Arc;
use tokio::sync::broadcast;

use super::events::StreamEvent;
use crate::dataset::DatasetStore;
use crate::interaction::{EventSubscriptions, PointSelectionHandler};

// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: DatasetStore,
    pub subscriptions: EventSubscriptions,
    pub selection_handler: Arc<dyn PointSelectionHandler>,
    pub event_sender: broadcast::Sender<StreamEvent>,
}
