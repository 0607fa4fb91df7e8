use std::collections::BTreeMap;
use tracing::{debug, error, info, trace, warn};

/// Fields attached to every message of a component logger
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name ("controller", "heaters", "web", ...)
    pub component: String,
    /// Phase the messages relate to, when there is one
    pub phase: Option<u8>,
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            phase: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_phase(mut self, phase: u8) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }

    fn render(&self) -> String {
        let mut fields = vec![format!("component={}", self.component)];
        if let Some(phase) = self.phase {
            fields.push(format!("phase={}", phase));
        }
        fields.extend(
            self.extra_fields
                .iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
        fields.join(",")
    }
}

/// Component-scoped logger
///
/// The context is rendered once; every message carries it as a `fields` value.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
    fields: String,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        let fields = context.render();
        Self { context, fields }
    }

    /// Same component, scoped to one phase
    pub fn for_phase(&self, phase: u8) -> Self {
        Self::new(self.context.clone().with_phase(phase))
    }

    pub fn info(&self, message: &str) {
        info!(fields = %self.fields, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(fields = %self.fields, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(fields = %self.fields, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        debug!(fields = %self.fields, "{}", message);
    }

    pub fn trace(&self, message: &str) {
        trace!(fields = %self.fields, "{}", message);
    }

    pub fn fields(&self) -> &str {
        &self.fields
    }
}

/// Logger for a component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Logger with a prepared context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let context = LogContext::new("test")
            .with_phase(2)
            .with_field("key", "value".to_string());

        assert_eq!(context.component, "test");
        assert_eq!(context.phase, Some(2));
        assert_eq!(context.extra_fields.get("key"), Some(&"value".to_string()));
    }

    #[test]
    fn fields_are_rendered_once_in_order() {
        let logger = get_logger_with_context(
            LogContext::new("teleinfo").with_field("device", "/dev/ttyAMA0".to_string()),
        );
        assert_eq!(logger.fields(), "component=teleinfo,device=/dev/ttyAMA0");
    }

    #[test]
    fn phase_scoped_logger_keeps_component() {
        let logger = get_logger("controller").for_phase(3);
        assert_eq!(logger.fields(), "component=controller,phase=3");
        assert_eq!(logger.context.component, "controller");
    }
}
