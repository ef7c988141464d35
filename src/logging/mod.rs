//! Logging and output control
//!
//! This module provides the [`Logger`] handed to clients and image sources.
//! Messages are emitted as `tracing` events so the embedding application
//! decides where they go; the verbosity flags only gate what is emitted.

/// Logger responsible for all diagnostic output of a component
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }

    // Structured logging levels
    pub fn trace(&self, message: &str) {
        if self.verbose && !self.quiet {
            tracing::trace!("{}", message);
        }
    }

    pub fn debug(&self, message: &str) {
        if !self.quiet {
            tracing::debug!("{}", message);
        }
    }

    /// Detailed information (only emitted in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            tracing::debug!(verbose = true, "{}", message);
        }
    }

    /// Information message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            tracing::info!("{}", message);
        }
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            tracing::warn!("{}", message);
        }
    }

    /// Error message, emitted even in quiet mode
    pub fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    /// Request-level event with the method and path as fields
    pub fn request(&self, method: &str, path: &str) {
        if !self.quiet {
            tracing::debug!(method, path, "metadata API request");
        }
    }

    /// Whether verbose-only messages are emitted
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_disables_verbose() {
        let logger = Logger::new_quiet();
        assert!(!logger.is_verbose());
        assert!(Logger::new(true).is_verbose());
        assert!(!Logger::default().is_verbose());
    }
}
