use std::fmt;

/// Collects every validation failure of a resource so that a single
/// admission response can report all of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Errors(Vec<SectionError>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionError {
    pub section: &'static str,
    pub message: String,
}

// === impl Errors ===

impl Errors {
    pub fn push(&mut self, section: &'static str, message: impl fmt::Display) {
        self.0.push(SectionError {
            section,
            message: message.to_string(),
        });
    }

    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionError> {
        self.0.iter()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.message.as_str())
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            1 => writeln!(f, "1 error occurred:")?,
            n => writeln!(f, "{n} errors occurred:")?,
        }
        for e in &self.0 {
            writeln!(f, "\t* {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.section, self.message)
    }
}
