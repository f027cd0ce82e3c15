use crate::ids::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar-or-string-array metadata value, the leaf type for both library
/// and chunk metadata maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StrArray(Vec<String>),
}

pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// A single metadata predicate, evaluated against one chunk's metadata map
/// and, for `DocumentIs`, its document grouping id (§3: Document is purely
/// a grouping attribute on chunks, with no storage of its own — this is
/// the one predicate that reaches past the metadata map to support
/// "chunks of document X").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    Eq { key: String, value: MetadataValue },
    Ne { key: String, value: MetadataValue },
    In { key: String, values: Vec<MetadataValue> },
    Range { key: String, gte: Option<f64>, lte: Option<f64> },
    Prefix { key: String, prefix: String },
    DocumentIs(DocumentId),
}

/// A boolean combination of predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Filter {
    Pred(Predicate),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// The per-chunk context a filter is evaluated against: its metadata map
/// plus its (optional) document grouping id.
pub struct FilterContext<'a> {
    pub metadata: &'a MetadataMap,
    pub document_id: Option<DocumentId>,
}

impl Filter {
    pub fn matches(&self, ctx: &FilterContext<'_>) -> bool {
        match self {
            Filter::Pred(p) => p.matches(ctx),
            Filter::And(fs) => fs.iter().all(|f| f.matches(ctx)),
            Filter::Or(fs) => fs.iter().any(|f| f.matches(ctx)),
            Filter::Not(f) => !f.matches(ctx),
        }
    }
}

impl Predicate {
    fn matches(&self, ctx: &FilterContext<'_>) -> bool {
        match self {
            Predicate::Eq { key, value } => ctx.metadata.get(key) == Some(value),
            Predicate::Ne { key, value } => ctx.metadata.get(key) != Some(value),
            Predicate::In { key, values } => {
                ctx.metadata.get(key).is_some_and(|v| values.contains(v))
            }
            Predicate::Range { key, gte, lte } => match ctx.metadata.get(key) {
                Some(MetadataValue::Float(f)) => in_range(*f, *gte, *lte),
                Some(MetadataValue::Int(i)) => in_range(*i as f64, *gte, *lte),
                _ => false,
            },
            Predicate::Prefix { key, prefix } => match ctx.metadata.get(key) {
                Some(MetadataValue::Str(s)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            Predicate::DocumentIs(expected) => ctx.document_id == Some(*expected),
        }
    }
}

fn in_range(v: f64, gte: Option<f64>, lte: Option<f64>) -> bool {
    let above = match gte {
        Some(lo) => v >= lo,
        None => true,
    };
    let below = match lte {
        Some(hi) => v <= hi,
        None => true,
    };
    above && below
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DocumentId;
    use uuid::Uuid;

    fn ctx(metadata: &MetadataMap, document_id: Option<DocumentId>) -> FilterContext<'_> {
        FilterContext { metadata, document_id }
    }

    #[test]
    fn document_is_matches_only_the_named_document() {
        let doc_a = DocumentId(Uuid::new_v4());
        let doc_b = DocumentId(Uuid::new_v4());
        let metadata = MetadataMap::new();
        let filter = Filter::Pred(Predicate::DocumentIs(doc_a));

        assert!(filter.matches(&ctx(&metadata, Some(doc_a))));
        assert!(!filter.matches(&ctx(&metadata, Some(doc_b))));
        assert!(!filter.matches(&ctx(&metadata, None)));
    }

    #[test]
    fn document_is_combines_with_metadata_predicates() {
        let doc_a = DocumentId(Uuid::new_v4());
        let mut metadata = MetadataMap::new();
        metadata.insert("lang".to_string(), MetadataValue::Str("en".into()));

        let filter = Filter::And(vec![
            Filter::Pred(Predicate::DocumentIs(doc_a)),
            Filter::Pred(Predicate::Eq { key: "lang".into(), value: MetadataValue::Str("en".into()) }),
        ]);

        assert!(filter.matches(&ctx(&metadata, Some(doc_a))));

        let mut wrong_lang = MetadataMap::new();
        wrong_lang.insert("lang".to_string(), MetadataValue::Str("fr".into()));
        assert!(!filter.matches(&ctx(&wrong_lang, Some(doc_a))));
    }

    #[test]
    fn range_predicate_handles_int_and_float_and_missing_key() {
        let mut metadata = MetadataMap::new();
        metadata.insert("score".to_string(), MetadataValue::Int(7));
        let filter = Filter::Pred(Predicate::Range { key: "score".into(), gte: Some(5.0), lte: Some(10.0) });
        assert!(filter.matches(&ctx(&metadata, None)));

        let out_of_range = Filter::Pred(Predicate::Range { key: "score".into(), gte: Some(8.0), lte: None });
        assert!(!out_of_range.matches(&ctx(&metadata, None)));

        let missing_key = Filter::Pred(Predicate::Range { key: "absent".into(), gte: None, lte: None });
        assert!(!missing_key.matches(&ctx(&metadata, None)));
    }
}
