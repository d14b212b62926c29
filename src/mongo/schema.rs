use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::{Bson, Document};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCount {
    pub name: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    /// Dot-notation path; array elements contribute under `path[]`.
    pub path: String,
    /// Observed BSON types with value counts, sorted by type name.
    pub types: Vec<TypeCount>,
    /// In how many sampled documents the path occurred at least once.
    pub present_in: usize,
}

/// Field-level digest of a document sample, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSummary {
    pub sampled: usize,
    pub fields: Vec<FieldSummary>,
}

pub fn summarize(documents: &[Document]) -> SchemaSummary {
    let mut type_counts: BTreeMap<String, BTreeMap<&'static str, usize>> = BTreeMap::new();
    let mut presence: BTreeMap<String, usize> = BTreeMap::new();

    for document in documents {
        let mut seen = BTreeSet::new();
        walk_document(document, "", &mut type_counts, &mut seen);
        for path in seen {
            *presence.entry(path).or_insert(0) += 1;
        }
    }

    let fields = type_counts
        .into_iter()
        .map(|(path, types)| {
            let present_in = presence.get(&path).copied().unwrap_or(0);
            let types =
                types.into_iter().map(|(name, count)| TypeCount { name, count }).collect();
            FieldSummary { path, types, present_in }
        })
        .collect();

    SchemaSummary { sampled: documents.len(), fields }
}

fn walk_document(
    document: &Document,
    prefix: &str,
    type_counts: &mut BTreeMap<String, BTreeMap<&'static str, usize>>,
    seen: &mut BTreeSet<String>,
) {
    for (key, value) in document {
        let path =
            if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        record_value(path, value, type_counts, seen);
    }
}

fn record_value(
    path: String,
    value: &Bson,
    type_counts: &mut BTreeMap<String, BTreeMap<&'static str, usize>>,
    seen: &mut BTreeSet<String>,
) {
    seen.insert(path.clone());
    *type_counts.entry(path.clone()).or_default().entry(bson_type_name(value)).or_insert(0) += 1;

    match value {
        Bson::Document(nested) => walk_document(nested, &path, type_counts, seen),
        Bson::Array(items) => {
            let element_path = format!("{path}[]");
            for item in items {
                record_value(element_path.clone(), item, type_counts, seen);
            }
        }
        _ => {}
    }
}

pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Document(_) => "Document",
        Bson::Array(_) => "Array",
        Bson::String(_) => "String",
        Bson::Boolean(_) => "Boolean",
        Bson::Int32(_) => "Int32",
        Bson::Int64(_) => "Int64",
        Bson::Double(_) => "Double",
        Bson::Decimal128(_) => "Decimal128",
        Bson::DateTime(_) => "DateTime",
        Bson::ObjectId(_) => "ObjectId",
        Bson::Binary(_) => "Binary",
        Bson::RegularExpression(_) => "Regex",
        Bson::Timestamp(_) => "Timestamp",
        Bson::JavaScriptCode(_) => "JavaScriptCode",
        Bson::JavaScriptCodeWithScope(_) => "JavaScriptCodeWithScope",
        Bson::Symbol(_) => "Symbol",
        Bson::DbPointer(_) => "DbPointer",
        Bson::Undefined => "Undefined",
        Bson::Null => "Null",
        Bson::MinKey => "MinKey",
        Bson::MaxKey => "MaxKey",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn field<'a>(summary: &'a SchemaSummary, path: &str) -> &'a FieldSummary {
        summary
            .fields
            .iter()
            .find(|candidate| candidate.path == path)
            .unwrap_or_else(|| panic!("missing path {path}"))
    }

    #[test]
    fn nested_documents_yield_dot_paths() {
        let documents =
            vec![doc! { "address": { "city": "Oslo", "geo": { "lat": 59.9 } } }];
        let summary = summarize(&documents);

        assert_eq!(field(&summary, "address").types, vec![TypeCount { name: "Document", count: 1 }]);
        assert_eq!(field(&summary, "address.city").present_in, 1);
        assert_eq!(
            field(&summary, "address.geo.lat").types,
            vec![TypeCount { name: "Double", count: 1 }]
        );
    }

    #[test]
    fn mixed_types_accumulate_per_type_counts() {
        let documents = vec![
            doc! { "value": 1 },
            doc! { "value": "one" },
            doc! { "value": 2 },
        ];
        let summary = summarize(&documents);

        let value_field = field(&summary, "value");
        assert_eq!(
            value_field.types,
            vec![TypeCount { name: "Int32", count: 2 }, TypeCount { name: "String", count: 1 }]
        );
        assert_eq!(value_field.present_in, 3);
    }

    #[test]
    fn presence_counts_documents_not_values() {
        let documents = vec![doc! { "tags": ["a", "b", "c"] }, doc! { "other": 1 }];
        let summary = summarize(&documents);

        let elements = field(&summary, "tags[]");
        assert_eq!(elements.types, vec![TypeCount { name: "String", count: 3 }]);
        assert_eq!(elements.present_in, 1);
    }

    #[test]
    fn array_of_documents_contributes_element_fields() {
        let documents = vec![doc! { "items": [ { "sku": "a" }, { "sku": "b", "qty": 2 } ] }];
        let summary = summarize(&documents);

        assert_eq!(field(&summary, "items[].sku").present_in, 1);
        assert_eq!(
            field(&summary, "items[].sku").types,
            vec![TypeCount { name: "String", count: 2 }]
        );
        assert_eq!(
            field(&summary, "items[].qty").types,
            vec![TypeCount { name: "Int32", count: 1 }]
        );
    }

    #[test]
    fn empty_sample_produces_an_empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary, SchemaSummary::default());
    }

    #[test]
    fn fields_are_sorted_by_path() {
        let documents = vec![doc! { "b": 1, "a": 1, "a_nested": { "z": 1 } }];
        let summary = summarize(&documents);

        let paths: Vec<&str> = summary.fields.iter().map(|f| f.path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort_unstable();
        assert_eq!(paths, sorted);
    }
}
