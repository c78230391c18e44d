use std::fmt;
use std::sync::Arc;

/// A string transformation applied to tag names, attribute names, or values.
///
/// Processors of a slot run in sequence, each one receiving the output of
/// the previous one.
#[derive(Clone)]
pub struct Processor {
    name: &'static str,
    function: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl Processor {
    /// Creates a named processor.
    pub fn new<F>(name: &'static str, function: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name,
            function: Arc::new(function),
        }
    }

    /// The processor removing namespace prefixes, see [`strip_prefix`].
    pub fn strip_prefix() -> Self {
        Self::new("strip_prefix", |value| strip_prefix(value).to_string())
    }

    /// The processor name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Applies the processor.
    pub fn apply(&self, value: &str) -> String {
        (self.function)(value)
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Processor").field(&self.name).finish()
    }
}

/// Removes the namespace prefix of a qualified name.
///
/// Only strings shaped like `prefix:local`, where both parts are XML names,
/// are stripped; `xmlns` declarations, URLs, timestamps and free text are
/// returned unchanged.
///
/// ```rust
/// use ews_client::strip_prefix;
///
/// assert_eq!(strip_prefix("m:ItemId"), "ItemId");
/// assert_eq!(strip_prefix("ItemId"), "ItemId");
/// assert_eq!(strip_prefix("xmlns:m"), "xmlns:m");
/// assert_eq!(strip_prefix("2024-05-01T10:00:00Z"), "2024-05-01T10:00:00Z");
/// assert_eq!(strip_prefix("https://example.com"), "https://example.com");
/// ```
pub fn strip_prefix(value: &str) -> &str {
    match value.split_once(':') {
        Some((prefix, local)) if prefix != "xmlns" && is_name(prefix) && is_name(local) => local,
        _ => value,
    }
}

fn is_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|next| next.is_alphanumeric() || matches!(next, '_' | '-' | '.'))
}

/// Options of the response normalizer.
///
/// The four processor slots default to [`Processor::strip_prefix`]. Setting
/// a slot replaces its default; the other slots are unaffected.
///
/// Attribute value processors skip `xmlns` and `xmlns:*` attributes, whose
/// namespace URIs are kept verbatim.
///
/// # Example
///
/// ```rust
/// use ews_client::{ParserOptions, Processor, normalize};
/// use serde_json::json;
///
/// let options = ParserOptions::default()
///     .with_value_processors([])
///     .with_tag_name_processors([
///         Processor::strip_prefix(),
///         Processor::new("lower", str::to_lowercase),
///     ]);
///
/// let tree = normalize("<m:Size>t:Large</m:Size>", &options)?;
/// assert_eq!(tree, json!({ "size": "t:Large" }));
/// # Ok::<(), ews_client::ParseError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub(super) tag_name_processors: Vec<Processor>,
    pub(super) attr_name_processors: Vec<Processor>,
    pub(super) value_processors: Vec<Processor>,
    pub(super) attr_value_processors: Vec<Processor>,
    pub(super) explicit_root: bool,
    pub(super) explicit_array: bool,
    pub(super) attr_key: String,
    pub(super) char_key: String,
    pub(super) trim: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            tag_name_processors: vec![Processor::strip_prefix()],
            attr_name_processors: vec![Processor::strip_prefix()],
            value_processors: vec![Processor::strip_prefix()],
            attr_value_processors: vec![Processor::strip_prefix()],
            explicit_root: true,
            explicit_array: true,
            attr_key: "$".to_string(),
            char_key: "_".to_string(),
            trim: false,
        }
    }
}

impl ParserOptions {
    /// Options without any processor: names and values are kept verbatim.
    pub fn verbatim() -> Self {
        Self::default()
            .with_tag_name_processors([])
            .with_attr_name_processors([])
            .with_value_processors([])
            .with_attr_value_processors([])
    }

    /// Replaces the element name processors.
    #[must_use]
    pub fn with_tag_name_processors(
        mut self,
        processors: impl IntoIterator<Item = Processor>,
    ) -> Self {
        self.tag_name_processors = processors.into_iter().collect();
        self
    }

    /// Replaces the attribute name processors.
    #[must_use]
    pub fn with_attr_name_processors(
        mut self,
        processors: impl IntoIterator<Item = Processor>,
    ) -> Self {
        self.attr_name_processors = processors.into_iter().collect();
        self
    }

    /// Replaces the element text processors.
    #[must_use]
    pub fn with_value_processors(
        mut self,
        processors: impl IntoIterator<Item = Processor>,
    ) -> Self {
        self.value_processors = processors.into_iter().collect();
        self
    }

    /// Replaces the attribute value processors.
    #[must_use]
    pub fn with_attr_value_processors(
        mut self,
        processors: impl IntoIterator<Item = Processor>,
    ) -> Self {
        self.attr_value_processors = processors.into_iter().collect();
        self
    }

    /// Whether the root element name is kept as the single top-level key (default `true`).
    #[must_use]
    pub fn with_explicit_root(mut self, explicit_root: bool) -> Self {
        self.explicit_root = explicit_root;
        self
    }

    /// Whether child elements are always arrays (default `true`).
    ///
    /// When `false`, a single child is stored as is and repeated children as an array.
    #[must_use]
    pub fn with_explicit_array(mut self, explicit_array: bool) -> Self {
        self.explicit_array = explicit_array;
        self
    }

    /// The key holding attributes (default `$`).
    #[must_use]
    pub fn with_attr_key(mut self, attr_key: impl Into<String>) -> Self {
        self.attr_key = attr_key.into();
        self
    }

    /// The key holding text when an element also has attributes or children (default `_`).
    #[must_use]
    pub fn with_char_key(mut self, char_key: impl Into<String>) -> Self {
        self.char_key = char_key.into();
        self
    }

    /// Whether text content is trimmed (default `false`).
    #[must_use]
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }
}

pub(super) fn apply(processors: &[Processor], value: &str) -> String {
    processors
        .iter()
        .fold(value.to_string(), |acc, processor| processor.apply(&acc))
}
