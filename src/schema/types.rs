//! Field declarations: the schema table each record type supplies once, at startup.

/// Declared value type of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Text,
    Integer,
    Bool,
    DateTime,
    Float,
    /// Another registered record type, referenced by type name. Never a column itself.
    Record(String),
    /// Composite whose fields are flattened into the parent, in place.
    Embedded(Vec<FieldDecl>),
    /// Anything else (stored as JSON, left untyped in the presentation schema).
    Other,
}

/// Presentation and behaviour annotations understood by the extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Hidden,
    Optional,
    Block,
    ChartData,
    Tags,
    ShortSpan,
    Sensitive,
    Unique,
    MasterSelector(String),
    Href(String),
    Enum(Vec<String>),
}

impl Annotation {
    /// Parse a comma-separated annotation list such as `"optional,enum:Admin|Scraper"`.
    /// Unknown tokens and empty prefixed values are ignored.
    pub fn parse_list(s: &str) -> Vec<Annotation> {
        s.split(',').filter_map(|token| Annotation::parse(token.trim())).collect()
    }

    fn parse(token: &str) -> Option<Annotation> {
        if let Some(v) = token.strip_prefix("masterSelector:") {
            return non_empty(v).map(Annotation::MasterSelector);
        }
        if let Some(v) = token.strip_prefix("href:") {
            return non_empty(v).map(Annotation::Href);
        }
        if let Some(v) = token.strip_prefix("enum:") {
            let values: Vec<String> = v.split('|').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            return (!values.is_empty()).then_some(Annotation::Enum(values));
        }
        match token {
            "hidden" => Some(Annotation::Hidden),
            "optional" => Some(Annotation::Optional),
            "block" => Some(Annotation::Block),
            "chartData" => Some(Annotation::ChartData),
            "tags" => Some(Annotation::Tags),
            "short-span" => Some(Annotation::ShortSpan),
            "sensitive" => Some(Annotation::Sensitive),
            "unique" => Some(Annotation::Unique),
            _ => None,
        }
    }
}

fn non_empty(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// One declared field of a record type.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    /// Declared field name; used as the display label.
    pub name: String,
    /// Serialization name. `None` or `"-"` falls back to the lower-cased declared name.
    pub serde_name: Option<String>,
    pub ty: FieldType,
    pub annotations: Vec<Annotation>,
    /// Foreign-key column holding the referenced record's id (relation fields only).
    pub foreign_key: Option<String>,
    /// SQL default expression, e.g. `NOW()`. Null values are omitted on insert so it applies.
    pub db_default: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        FieldDecl {
            name: name.into(),
            serde_name: None,
            ty,
            annotations: Vec::new(),
            foreign_key: None,
            db_default: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Other)
    }

    /// Relation to another record type whose id is stored in `foreign_key`.
    pub fn relation(name: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        let mut decl = Self::new(name, FieldType::Record(target.into()));
        decl.foreign_key = Some(foreign_key.into());
        decl
    }

    pub fn embedded(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self::new(name, FieldType::Embedded(fields))
    }

    pub fn json(mut self, name: impl Into<String>) -> Self {
        self.serde_name = Some(name.into());
        self
    }

    pub fn ignore_json(mut self) -> Self {
        self.serde_name = Some("-".into());
        self
    }

    /// Append annotations from a comma-separated list (lenient, see [`Annotation::parse_list`]).
    pub fn extras(mut self, extras: &str) -> Self {
        self.annotations.extend(Annotation::parse_list(extras));
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn hidden(self) -> Self {
        self.annotate(Annotation::Hidden)
    }

    pub fn optional(self) -> Self {
        self.annotate(Annotation::Optional)
    }

    pub fn sensitive(self) -> Self {
        self.annotate(Annotation::Sensitive)
    }

    pub fn unique(self) -> Self {
        self.annotate(Annotation::Unique)
    }

    pub fn enumeration(self, values: &[&str]) -> Self {
        self.annotate(Annotation::Enum(values.iter().map(|v| v.to_string()).collect()))
    }

    pub fn db_default(mut self, expression: impl Into<String>) -> Self {
        self.db_default = Some(expression.into());
        self
    }

    pub fn has(&self, annotation: &Annotation) -> bool {
        self.annotations.contains(annotation)
    }

    pub fn is_hidden(&self) -> bool {
        self.has(&Annotation::Hidden)
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Enum(values) => Some(values.as_slice()),
            _ => None,
        })
    }

    pub fn master_selector(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::MasterSelector(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn href(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Href(v) => Some(v.as_str()),
            _ => None,
        })
    }

    /// Wire name: serialization name up to the first comma, else the lower-cased declared name.
    pub fn wire_name(&self) -> String {
        match self.serde_name.as_deref().map(|n| n.split(',').next().unwrap_or("").trim()) {
            Some(n) if !n.is_empty() && n != "-" => n.to_string(),
            _ => self.name.to_lowercase(),
        }
    }
}
