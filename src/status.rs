//! Latest human-readable outcome, for whatever refreshes the display.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReporter {
    message: String,
}

impl StatusReporter {
    pub fn set(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The line shown on screen: sign-in state followed by the message.
    pub fn display_line(&self, authenticated: bool) -> String {
        let prefix = if authenticated {
            "Authenticated"
        } else {
            "Not Authenticated"
        };
        if self.message.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix} {}", self.message)
        }
    }
}
