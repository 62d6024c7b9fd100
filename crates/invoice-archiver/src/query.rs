//! Gmail search query construction.

/// Search constraints for one scan of the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub senders: Vec<String>,
    pub subject_keywords: Vec<String>,
    pub window_days: u32,
}

impl SearchQuery {
    pub fn new(senders: Vec<String>, subject_keywords: Vec<String>, window_days: u32) -> Self {
        Self {
            senders,
            subject_keywords,
            window_days,
        }
    }

    /// Render the query in Gmail search syntax.
    ///
    /// Terms within the sender and keyword groups are OR-joined; the groups,
    /// the time window and `has:attachment` are AND-joined. An empty group
    /// is left out rather than rendered as `()`.
    pub fn to_query_string(&self) -> String {
        let mut clauses = vec![format!("newer_than:{}d", self.window_days)];

        if let Some(group) = Self::or_group("from", &self.senders) {
            clauses.push(group);
        }
        if let Some(group) = Self::or_group("subject", &self.subject_keywords) {
            clauses.push(group);
        }

        clauses.push("has:attachment".to_string());
        clauses.join(" AND ")
    }

    fn or_group(operator: &str, values: &[String]) -> Option<String> {
        let terms: Vec<String> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| format!("{}:{}", operator, v))
            .collect();

        if terms.is_empty() {
            None
        } else {
            Some(format!("({})", terms.join(" OR ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_groups_joined_with_and_terms_with_or() {
        let query = SearchQuery::new(
            strings(&["billing@render.com", "*@anthemwelderssupply.com"]),
            strings(&["invoice", "receipt"]),
            1,
        );

        assert_eq!(
            query.to_query_string(),
            "newer_than:1d AND (from:billing@render.com OR from:*@anthemwelderssupply.com) \
             AND (subject:invoice OR subject:receipt) AND has:attachment"
        );
    }

    #[test]
    fn test_every_sender_and_keyword_present() {
        let config = crate::config::Config::default();
        let rendered = config.search_query().to_query_string();

        for sender in &config.senders {
            assert!(rendered.contains(&format!("from:{}", sender)));
        }
        for keyword in &config.subject_keywords {
            assert!(rendered.contains(&format!("subject:{}", keyword)));
        }
        assert!(rendered.starts_with("newer_than:1d AND "));
        assert!(rendered.ends_with(" AND has:attachment"));
    }

    #[test]
    fn test_empty_group_omitted() {
        let query = SearchQuery::new(vec![], strings(&["invoice", " "]), 3);
        assert_eq!(
            query.to_query_string(),
            "newer_than:3d AND (subject:invoice) AND has:attachment"
        );
    }
}
