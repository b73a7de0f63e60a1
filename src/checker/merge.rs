use crate::model::{QueryEnvelope, ReportEntry};

/// Flattens per-batch envelopes into one entry list, in the order given.
///
/// A successful envelope contributes its findings in their returned order;
/// a failed one contributes exactly one error entry. Merging never fails.
pub fn merge_envelopes<I>(envelopes: I) -> Vec<ReportEntry>
where
    I: IntoIterator<Item = QueryEnvelope>,
{
    let mut entries = Vec::new();
    for envelope in envelopes {
        match envelope {
            QueryEnvelope::Findings(findings) => {
                entries.extend(findings.into_iter().map(ReportEntry::Finding));
            }
            QueryEnvelope::Failed(error) => entries.push(ReportEntry::Error(error)),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Finding;

    fn finding(coordinates: &str) -> Finding {
        Finding {
            coordinates: coordinates.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_preserves_batch_order() {
        let envelopes = vec![
            QueryEnvelope::Findings(vec![finding("a"), finding("b")]),
            QueryEnvelope::status(503),
            QueryEnvelope::Findings(vec![finding("c")]),
        ];

        let merged = merge_envelopes(envelopes);
        assert_eq!(merged.len(), 4);
        assert!(matches!(&merged[0], ReportEntry::Finding(f) if f.coordinates == "a"));
        assert!(matches!(&merged[1], ReportEntry::Finding(f) if f.coordinates == "b"));
        assert!(
            matches!(&merged[2], ReportEntry::Error(e) if e.error == "Received response code 503")
        );
        assert!(matches!(&merged[3], ReportEntry::Finding(f) if f.coordinates == "c"));
    }

    #[test]
    fn test_merge_length_invariant() {
        let envelopes = vec![
            QueryEnvelope::Findings(Vec::new()),
            QueryEnvelope::transport("connection reset"),
            QueryEnvelope::Findings(vec![finding("x"); 5]),
            QueryEnvelope::status(429),
        ];
        let expected: usize = envelopes.iter().map(QueryEnvelope::contribution).sum();

        let merged = merge_envelopes(envelopes);
        assert_eq!(merged.len(), expected);
        assert_eq!(merged.len(), 7);
    }

    #[test]
    fn test_merge_nothing() {
        assert!(merge_envelopes(Vec::new()).is_empty());
    }
}
