//! Variables captured from step output, threaded into later steps.

/// One captured `name=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub value: String,
}

/// Ordered, append-only bindings for one repetition.
///
/// Lookups return the first binding with a non-empty value, so an earlier
/// capture is never shadowed by a later one with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    bindings: Vec<Binding>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bindings.push(Binding {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Append bindings produced elsewhere (e.g. by one node result of a step).
    pub fn extend_from(&mut self, bindings: &[Binding]) {
        self.bindings.extend_from_slice(bindings);
    }

    /// First non-empty value bound to `name`.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|binding| binding.name == name && !binding.value.is_empty())
            .map(|binding| binding.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.iter().any(|binding| binding.name == name)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Bindings appended after `mark` (a previous `len()`).
    pub fn bindings_since(&self, mark: usize) -> &[Binding] {
        self.bindings.get(mark..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Render as a shell prefix: `A="1" B="two" && `, or `""` when empty.
    pub fn shell_prefix(&self) -> String {
        if self.bindings.is_empty() {
            return String::new();
        }
        let mut prefix = String::new();
        for binding in &self.bindings {
            prefix.push_str(&binding.name);
            prefix.push('=');
            prefix.push_str(&double_quote(&binding.value));
            prefix.push(' ');
        }
        prefix.push_str("&& ");
        prefix
    }
}

/// Quote for a double-quoted shell word; `\`, `"`, `$` and backticks are escaped.
fn double_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
