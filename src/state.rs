use std::sync::Arc;

use crate::config::Config;
use crate::document_store::DocumentStore;
use crate::principal::PrincipalDecoder;
use crate::todo_service::TodoService;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub todos: TodoService<dyn DocumentStore>,
    pub decoder: PrincipalDecoder,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        let todos = TodoService::with_page_size(store, config.page_size);
        let decoder = PrincipalDecoder::new().require_principal_id(config.require_principal_id);

        Arc::new(Self {
            config,
            todos,
            decoder,
        })
    }
}
