//! Attribute definitions: enumerated value lists and default values.

/// Definition of one signal or frame attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDefine {
    /// Labels of an enumerated attribute, indexed by raw value.
    pub values: Option<Vec<String>>,
    /// Value used when an object does not set the attribute.
    pub default: Option<String>,
}

impl AttributeDefine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enumeration<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributeDefine {
            values: Some(labels.into_iter().map(Into::into).collect()),
            default: None,
        }
    }

    /// Set the default, stripping one pair of surrounding double quotes.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        let default = default.into();
        let default = match default.strip_prefix('"').and_then(|d| d.strip_suffix('"')) {
            Some(unquoted) => unquoted.to_owned(),
            None => default,
        };
        self.default = Some(default);
        self
    }

    pub fn is_enum(&self) -> bool {
        self.values.is_some()
    }

    /// Label for an enum index, if this is an enum and the index is in range.
    pub fn enum_label(&self, raw: usize) -> Option<&str> {
        self.values.as_ref()?.get(raw).map(String::as_str)
    }

    /// Index of an enum label.
    pub fn enum_index(&self, label: &str) -> Option<usize> {
        self.values.as_ref()?.iter().position(|v| v == label)
    }
}
