//! The built-in summarizer used by `/sleep`: joins the folded entries into a
//! single line.  Hosts with a language model plug in their own
//! [`Summarizer`] instead.

use std::error::Error;

use verity_memory::Summarizer;
use verity_types::EntityId;

#[derive(Debug, Clone)]
pub struct ConcatSummarizer {
    separator: String,
}

impl ConcatSummarizer {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for ConcatSummarizer {
    fn default() -> Self {
        Self::new("; ")
    }
}

impl Summarizer for ConcatSummarizer {
    fn summarize(
        &self,
        subject: &EntityId,
        entries: &[String],
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        if entries.is_empty() {
            return Err(format!("nothing to summarize for '{subject}'").into());
        }
        Ok(format!(
            "{} entries for {}: {}",
            entries.len(),
            subject,
            entries.join(&self.separator)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_entries_in_order() {
        let summary = ConcatSummarizer::default()
            .summarize(
                &EntityId::new("user"),
                &["opened app".to_string(), "clicked save".to_string()],
            )
            .unwrap();
        assert_eq!(summary, "2 entries for user: opened app; clicked save");
    }

    #[test]
    fn empty_group_is_an_error() {
        assert!(
            ConcatSummarizer::new(" | ")
                .summarize(&EntityId::new("user"), &[])
                .is_err()
        );
    }
}
