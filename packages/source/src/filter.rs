//! Record filtering by a configured field rule.

use parking_map_parking_models::report::ReportSink;
use parking_map_source_models::FilterRule;

use crate::RawRecord;
use crate::fields::{lookup, value_to_string};

/// Keeps the records whose `rule.field` matches `rule.pattern`.
///
/// Records without the field are dropped. When no record has the field at
/// all, the rule probably names the wrong column, so a warning is reported
/// under `source_id`. With no rule every record is kept.
#[must_use]
pub fn apply_filter(
    source_id: &str,
    records: Vec<RawRecord>,
    rule: Option<&FilterRule>,
    sink: &dyn ReportSink,
) -> Vec<RawRecord> {
    let Some(rule) = rule else {
        return records;
    };

    let total = records.len();
    let mut field_seen = false;

    let kept: Vec<RawRecord> = records
        .into_iter()
        .filter(|record| {
            lookup(&record.attributes, &rule.field).is_some_and(|value| {
                field_seen = true;
                rule.matches(&value_to_string(value))
            })
        })
        .collect();

    if total > 0 && !field_seen {
        sink.warn(
            source_id,
            &format!(
                "Filter field '{}' not found in any of {total} records",
                rule.field
            ),
        );
    }

    log::debug!(
        "[{source_id}] Filter {}: kept {} of {total} records",
        rule.field,
        kept.len()
    );
    kept
}

#[cfg(test)]
mod tests {
    use parking_map_parking_models::report::{MemorySink, Severity};
    use parking_map_source_models::FilterMatch;
    use serde_json::{Value, json};

    use super::*;

    fn record(index: usize, attributes: Value) -> RawRecord {
        let Value::Object(attributes) = attributes else {
            unreachable!()
        };
        RawRecord {
            index,
            attributes,
            geometry: None,
        }
    }

    fn rule(field: &str, pattern: &str, mode: FilterMatch) -> FilterRule {
        FilterRule {
            field: field.to_string(),
            pattern: pattern.to_string(),
            mode,
        }
    }

    #[test]
    fn equals_keeps_exact_matches() {
        let sink = MemorySink::new();
        let records = vec![
            record(0, json!({"pktype": "03"})),
            record(1, json!({"pktype": "01"})),
            record(2, json!({"PKTYPE": " 03 "})),
            record(3, json!({"other": "03"})),
        ];
        let kept = apply_filter(
            "taipei",
            records,
            Some(&rule("pktype", "03", FilterMatch::Equals)),
            &sink,
        );
        let indices: Vec<usize> = kept.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(sink.with_severity(Severity::Warning).is_empty());
    }

    #[test]
    fn contains_matches_substrings() {
        let sink = MemorySink::new();
        let records = vec![
            record(0, json!({"charged": "身汽,身機"})),
            record(1, json!({"charged": "汽車"})),
            record(2, json!({"charged": null})),
        ];
        let kept = apply_filter(
            "new_taipei",
            records,
            Some(&rule("charged", "身汽", FilterMatch::Contains)),
            &sink,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].index, 0);
    }

    #[test]
    fn missing_field_everywhere_warns() {
        let sink = MemorySink::new();
        let records = vec![record(0, json!({"a": 1})), record(1, json!({"b": 2}))];
        let kept = apply_filter(
            "src",
            records,
            Some(&rule("pktype", "03", FilterMatch::Equals)),
            &sink,
        );
        assert!(kept.is_empty());
        let warnings = sink.with_severity(Severity::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("pktype"));
    }

    #[test]
    fn no_rule_keeps_everything() {
        let sink = MemorySink::new();
        let records = vec![record(0, json!({})), record(1, json!({}))];
        assert_eq!(apply_filter("src", records, None, &sink).len(), 2);
    }
}
