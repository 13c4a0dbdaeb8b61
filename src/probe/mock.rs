//! Mock probe that always succeeds without any network I/O.

use super::{Check, ProbeError, ProbeTarget};

#[derive(Debug, Default)]
pub struct MockProbe;

impl Check for MockProbe {
    fn validate(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn describe(&self) -> Vec<String> {
        vec!["Always up".to_string()]
    }

    async fn test(&mut self, _target: ProbeTarget<'_>) -> Result<String, ProbeError> {
        Ok(String::new())
    }
}
