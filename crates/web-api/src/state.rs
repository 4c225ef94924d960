use application::{HistoryService, HubHandle};

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub history: HistoryService,
}

impl AppState {
    pub fn new(hub: HubHandle, history: HistoryService) -> Self {
        Self { hub, history }
    }
}
