//! Diagnostic stream
//!
//! A keyword-filtered text sink. Code that wants to narrate its work tags
//! each burst of output with a keyword (`bytecode/opcode`,
//! `planning/countcachelines`, ...); the stream emits the burst only when
//! one of the enabled prefixes is a prefix of that keyword. Enabling the
//! empty prefix enables everything.

use std::io::Write;

pub struct DiagnosticStream {
    out: Box<dyn Write + Send>,
    prefixes: Vec<String>,
}

impl DiagnosticStream {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            prefixes: Vec::new(),
        }
    }

    /// A stream that writes to standard output.
    pub fn to_stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// A stream that discards everything it is handed.
    pub fn to_sink() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Add a keyword prefix to the enabled set.
    pub fn enable(&mut self, prefix: &str) {
        if !self.prefixes.iter().any(|p| p == prefix) {
            self.prefixes.push(prefix.to_string());
        }
    }

    /// Remove a keyword prefix from the enabled set.
    pub fn disable(&mut self, prefix: &str) {
        self.prefixes.retain(|p| p != prefix);
    }

    /// True when output tagged with `keyword` should be emitted.
    pub fn is_enabled(&self, keyword: &str) -> bool {
        self.prefixes.iter().any(|p| keyword.starts_with(p.as_str()))
    }

    /// The underlying sink. Callers check [`is_enabled`](Self::is_enabled)
    /// first; write failures on a diagnostic sink are ignored by convention.
    pub fn stream(&mut self) -> &mut dyn Write {
        &mut *self.out
    }
}

impl std::fmt::Debug for DiagnosticStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticStream")
            .field("prefixes", &self.prefixes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::DiagnosticStream;

    #[test]
    fn prefix_filtering() {
        let mut diag = DiagnosticStream::to_sink();
        assert!(!diag.is_enabled("bytecode/opcode"));

        diag.enable("bytecode");
        assert!(diag.is_enabled("bytecode/opcode"));
        assert!(diag.is_enabled("bytecode/loadrow"));
        assert!(!diag.is_enabled("planning/countcachelines"));

        diag.disable("bytecode");
        assert!(!diag.is_enabled("bytecode/opcode"));
    }

    #[test]
    fn empty_prefix_enables_everything() {
        let mut diag = DiagnosticStream::to_sink();
        diag.enable("");
        assert!(diag.is_enabled("bytecode/opcode"));
        assert!(diag.is_enabled("anything"));
    }

    #[test]
    fn enable_is_idempotent() {
        let mut diag = DiagnosticStream::to_sink();
        diag.enable("planning");
        diag.enable("planning");
        diag.disable("planning");
        assert!(!diag.is_enabled("planning/countcachelines"));
    }
}
