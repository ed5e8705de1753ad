//! User-facing notices.

/// Shows non-blocking notices to the user (deprecations, degraded config loads).
///
/// Confirming an `Ask` outcome is the caller's business and not part of this trait.
pub trait UiPrompt: Send + Sync {
    /// Display a warning; must not block
    fn warn(&self, message: &str);
}

/// [`UiPrompt`] that forwards notices to `tracing::warn!`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPrompt;

impl UiPrompt for TracingPrompt {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "claw_guard::prompt", "{}", message);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::UiPrompt;
    use std::sync::Mutex;

    /// Records every warning for assertions
    #[derive(Debug, Default)]
    pub(crate) struct RecordingPrompt {
        pub(crate) messages: Mutex<Vec<String>>,
    }

    impl RecordingPrompt {
        pub(crate) fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl UiPrompt for RecordingPrompt {
        fn warn(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}
