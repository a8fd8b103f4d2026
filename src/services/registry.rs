use crate::models::{BatchError, RawBatch, UploadBatch};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Input type published by the bundled bridge script.
pub const UPPY_FILES: &str = "uppy.files";

static HANDLERS: OnceLock<InputHandlers> = OnceLock::new();

/// Converts the raw value sent by a client into an upload batch.
pub trait InputHandler: Send + Sync {
    fn input_type(&self) -> &'static str;

    fn parse(&self, value: Value) -> Result<UploadBatch, BatchError>;
}

/// Handler for `uppy.files`: `{batchId?, files: [...]}` or a bare array of entries.
pub struct UppyFilesHandler;

impl InputHandler for UppyFilesHandler {
    fn input_type(&self) -> &'static str {
        UPPY_FILES
    }

    fn parse(&self, value: Value) -> Result<UploadBatch, BatchError> {
        let raw = match value {
            Value::Array(files) => RawBatch {
                batch_id: None,
                files,
            },
            Value::Null => RawBatch {
                batch_id: None,
                files: Vec::new(),
            },
            other => serde_json::from_value::<RawBatch>(other)
                .map_err(|e| BatchError::NotABatch(e.to_string()))?,
        };
        Ok(UploadBatch::from_raw(raw))
    }
}

pub struct InputHandlers {
    handlers: HashMap<&'static str, Box<dyn InputHandler>>,
}

impl InputHandlers {
    fn with_defaults() -> Self {
        let mut handlers = Self {
            handlers: HashMap::new(),
        };
        handlers.register(Box::new(UppyFilesHandler));
        handlers
    }

    fn register(&mut self, handler: Box<dyn InputHandler>) {
        tracing::debug!("Registered input handler '{}'", handler.input_type());
        self.handlers.insert(handler.input_type(), handler);
    }

    pub fn get(&self, input_type: &str) -> Option<&dyn InputHandler> {
        self.handlers.get(input_type).map(|h| h.as_ref())
    }

    pub fn parse(&self, input_type: &str, value: Value) -> Result<UploadBatch, BatchError> {
        self.get(input_type)
            .ok_or_else(|| BatchError::UnknownInputType(input_type.to_string()))?
            .parse(value)
    }

    pub fn input_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

/// Registers the built-in input handlers. Runs once per process; later calls
/// return the same registry.
pub fn init() -> &'static InputHandlers {
    HANDLERS.get_or_init(|| {
        let handlers = InputHandlers::with_defaults();
        tracing::info!("Input handlers registered: {:?}", handlers.input_types());
        handlers
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_is_idempotent() {
        let first = init();
        let second = init();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.input_types(), vec![UPPY_FILES]);
    }

    #[test]
    fn test_parse_envelope_and_bare_array() {
        let handlers = init();
        let entry = json!({"name": "a.txt", "size": 1, "data": "data:text/plain;base64,YQ=="});

        let batch = handlers
            .parse(UPPY_FILES, json!({"files": [entry.clone()]}))
            .unwrap();
        assert_eq!(batch.len(), 1);

        let batch = handlers.parse(UPPY_FILES, json!([entry])).unwrap();
        assert_eq!(batch.len(), 1);

        let batch = handlers.parse(UPPY_FILES, Value::Null).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_batches() {
        let handlers = init();
        assert!(matches!(
            handlers.parse(UPPY_FILES, json!("hello")),
            Err(BatchError::NotABatch(_))
        ));
        assert!(matches!(
            handlers.parse("shiny.file", json!([])),
            Err(BatchError::UnknownInputType(_))
        ));
    }
}
