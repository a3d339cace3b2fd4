//! Dual-mention selection.

use litscreen_common::MatchRecord;

/// Keep the records where both topics matched, in input order.
pub fn select_dual_mentions<I>(records: I) -> Vec<MatchRecord>
where
    I: IntoIterator<Item = MatchRecord>,
{
    records.into_iter().filter(MatchRecord::is_dual_mention).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, a: bool, b: bool) -> MatchRecord {
        MatchRecord {
            document_id: id.to_string(),
            matched_topic_a: a,
            matched_topic_b: b,
            terms_a: vec![],
            terms_b: vec![],
        }
    }

    #[test]
    fn test_output_is_exactly_the_intersection() {
        let input = vec![
            rec("1", true, false),
            rec("2", true, true),
            rec("3", false, true),
            rec("4", false, false),
            rec("5", true, true),
        ];
        let a: std::collections::HashSet<_> =
            input.iter().filter(|r| r.matched_topic_a).map(|r| r.document_id.clone()).collect();
        let b: std::collections::HashSet<_> =
            input.iter().filter(|r| r.matched_topic_b).map(|r| r.document_id.clone()).collect();

        let out = select_dual_mentions(input);
        let ids: Vec<_> = out.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "5"]);

        let mut expected: Vec<_> = a.intersection(&b).cloned().collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_empty_input() {
        assert!(select_dual_mentions(Vec::new()).is_empty());
    }
}
