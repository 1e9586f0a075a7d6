// ── Resource path rules ──
//
// A resource name may carry a slash-separated namespace ("admin/user").
// Every endpoint for that resource hangs off a single base path.

use std::fmt;

/// Endpoint layout for one named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    name: String,
    base: String,
}

impl ResourcePath {
    /// Resolve a resource name into its base path.
    ///
    /// `"task"` maps to `/task`, `"admin/user"` to `/admin/user`.
    /// Empty segments from stray slashes are dropped.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        let base = format!("/{}", segments.join("/"));
        Self { name, base }
    }

    /// The resource name as given (namespace included).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last segment of the name, without its namespace.
    pub fn short_name(&self) -> &str {
        self.name
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }

    /// `/<ns/>name`
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `/<ns/>name/<id>`
    pub fn item(&self, id: impl fmt::Display) -> String {
        format!("{}/{id}", self.base)
    }

    /// `/<ns/>name/update/<id>`
    pub fn update(&self, id: impl fmt::Display) -> String {
        format!("{}/update/{id}", self.base)
    }

    /// `/<ns/>name/create/`
    pub fn create(&self) -> String {
        format!("{}/create/", self.base)
    }

    /// `/<ns/>name/delete/?id=<id>`
    pub fn delete(&self, id: impl fmt::Display) -> String {
        format!("{}/delete/?id={id}", self.base)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}
