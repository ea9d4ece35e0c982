use std::fmt;

/// A shell command bound for the VPS, paired with the form that may be logged.
///
/// Most commands carry nothing sensitive and log verbatim. Commands built with
/// [`RemoteCommand::redacted`] keep their plaintext private: `Debug` and `Display`
/// only ever show the redacted form.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    text: String,
    display: Option<String>,
}

impl RemoteCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), display: None }
    }

    pub fn redacted(text: impl Into<String>, display: impl Into<String>) -> Self {
        Self { text: text.into(), display: Some(display.into()) }
    }

    /// The exact text sent to the remote shell.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The text that is safe to write to logs.
    pub fn display(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.text)
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteCommand").field(&self.display()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_command_hides_text_in_formatting() {
        let cmd = RemoteCommand::redacted("login --password s3cret", "login --password ********");
        assert_eq!(cmd.text(), "login --password s3cret");
        assert!(!format!("{cmd}").contains("s3cret"));
        assert!(!format!("{cmd:?}").contains("s3cret"));
    }

    #[test]
    fn plain_command_displays_verbatim() {
        let cmd = RemoteCommand::new("docker ps");
        assert_eq!(cmd.display(), "docker ps");
        assert_eq!(cmd.to_string(), "docker ps");
    }
}
