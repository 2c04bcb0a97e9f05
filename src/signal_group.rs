//! Named sets of signals inside one frame.

/// A named group of signals, referenced by their frame-unique names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalGroup {
    pub name: String,
    pub id: u32,
    signals: Vec<String>,
}

impl SignalGroup {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        SignalGroup {
            name: name.into(),
            id,
            signals: Vec::new(),
        }
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    /// Add a signal name; duplicates are ignored.
    pub fn add_signal(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.signals.push(name);
        }
    }

    pub fn del_signal(&mut self, name: &str) -> bool {
        let before = self.signals.len();
        self.signals.retain(|s| s != name);
        self.signals.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.iter().any(|s| s == name)
    }
}
