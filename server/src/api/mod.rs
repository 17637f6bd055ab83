pub mod rest;

use crate::config::Config;
use crate::service::FileManagerService;

#[derive(Clone)]
pub struct AppState {
    pub service: FileManagerService,
    pub config: Config,
}

impl AppState {
    pub fn new(service: FileManagerService, config: Config) -> Self {
        Self { service, config }
    }
}
