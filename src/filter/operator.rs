/// Raw comparison operator, accepted as-is from the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    pub fn parse(s: &str) -> Option<Comparator> {
        match s {
            "=" => Some(Comparator::Eq),
            "<>" | "!=" => Some(Comparator::Ne),
            ">" => Some(Comparator::Gt),
            ">=" => Some(Comparator::Ge),
            "<" => Some(Comparator::Lt),
            "<=" => Some(Comparator::Le),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
        }
    }

    pub fn matches(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparator::Eq => ord == Equal,
            Comparator::Ne => ord != Equal,
            Comparator::Gt => ord == Greater,
            Comparator::Ge => ord != Less,
            Comparator::Lt => ord == Less,
            Comparator::Le => ord != Greater,
        }
    }
}

/// The fixed operator vocabulary of list filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    In,
    Blank,
    NotBlank,
    Between,
    Compare(Comparator),
}

impl FilterOperator {
    /// `None` for anything outside the vocabulary.
    pub fn parse(s: &str) -> Option<FilterOperator> {
        match s.trim() {
            "contains" => Some(FilterOperator::Contains),
            "notContains" => Some(FilterOperator::NotContains),
            "equals" => Some(FilterOperator::Equals),
            "notEquals" => Some(FilterOperator::NotEquals),
            "in" => Some(FilterOperator::In),
            "blank" => Some(FilterOperator::Blank),
            "notBlank" => Some(FilterOperator::NotBlank),
            "between" => Some(FilterOperator::Between),
            other => Comparator::parse(other).map(FilterOperator::Compare),
        }
    }

    /// Operators with text semantics (text, password, untyped and select fields).
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FilterOperator::Contains
                | FilterOperator::NotContains
                | FilterOperator::Equals
                | FilterOperator::NotEquals
                | FilterOperator::In
                | FilterOperator::Blank
                | FilterOperator::NotBlank
        )
    }
}
