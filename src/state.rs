//! Shared application state for all routes. Everything here is read-only after wiring.

use crate::case::NamingPolicy;
use crate::delta::DeltaConverter;
use crate::handlers::HandlerRegistry;
use crate::metadata::ResolvedModel;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub model: Arc<ResolvedModel>,
    pub converter: Arc<DeltaConverter>,
    pub handlers: Arc<HandlerRegistry>,
    pub naming: NamingPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, model: ResolvedModel, handlers: HandlerRegistry, naming: NamingPolicy) -> Self {
        let converter = DeltaConverter::new(store.schema().clone(), naming);
        AppState {
            store,
            model: Arc::new(model),
            converter: Arc::new(converter),
            handlers: Arc::new(handlers),
            naming,
        }
    }
}
