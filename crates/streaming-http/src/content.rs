/// Pulls the text content out of a message fragment.
///
/// Fragments are JSON documents; each configured JSON pointer is tried in
/// order and the first string found wins.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentExtractor {
    pointers: Vec<String>,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self {
            pointers: vec!["/content".into(), "/choices/0/delta/content".into()],
        }
    }
}

impl ContentExtractor {
    /// Creates an extractor that tries exactly `pointers`.
    pub fn with_pointers<I, S>(pointers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pointers: pointers.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends another pointer to try after the existing ones.
    pub fn pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointers.push(pointer.into());
        self
    }

    pub fn pointers(&self) -> &[String] {
        &self.pointers
    }

    /// Returns the content of `data`, or `None` for non-JSON fragments and
    /// fragments without a string at any pointer.
    pub fn extract(&self, data: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        self.extract_value(&value)
    }

    pub fn extract_value(&self, value: &serde_json::Value) -> Option<String> {
        self.pointers
            .iter()
            .find_map(|pointer| value.pointer(pointer).and_then(|v| v.as_str()))
            .map(ToOwned::to_owned)
    }
}
