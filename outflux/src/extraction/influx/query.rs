use chrono::{DateTime, SecondsFormat, Utc};

/// Quotes an InfluxQL identifier, escaping backslashes and double quotes.
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');

    quoted
}

/// Quotes an InfluxQL string literal, escaping backslashes and single quotes.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');

    quoted
}

/// Returns the `FROM` target of a measure, qualified with its retention policy when given.
pub fn qualified_measure(measure: &str, retention_policy: Option<&str>) -> String {
    match retention_policy {
        Some(rp) => format!("{}.{}", quote_identifier(rp), quote_identifier(measure)),
        None => quote_identifier(measure),
    }
}

/// A bounded `SELECT` over one measure.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery<'a> {
    pub measure: &'a str,
    pub retention_policy: Option<&'a str>,
    pub tags: &'a [String],
    pub fields: &'a [String],
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl SelectQuery<'_> {
    /// Renders the query.
    ///
    /// Tags and fields are projected explicitly with their `::tag`/`::field` casts; InfluxDB
    /// always returns the time column first.
    pub fn build(&self) -> String {
        let projection = self
            .tags
            .iter()
            .map(|tag| format!("{}::tag", quote_identifier(tag)))
            .chain(
                self.fields
                    .iter()
                    .map(|field| format!("{}::field", quote_identifier(field))),
            )
            .collect::<Vec<_>>();
        let projection = if projection.is_empty() {
            "*".to_string()
        } else {
            projection.join(", ")
        };

        let mut query = format!(
            "SELECT {projection} FROM {}",
            qualified_measure(self.measure, self.retention_policy)
        );

        let mut conditions = Vec::with_capacity(2);
        if let Some(from) = self.from {
            conditions.push(format!("time >= {}", time_literal(from)));
        }
        if let Some(to) = self.to {
            conditions.push(format!("time <= {}", time_literal(to)));
        }
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        if let Some(limit) = self.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        query
    }
}

fn time_literal(ts: DateTime<Utc>) -> String {
    quote_literal(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_identifiers_and_literals() {
        assert_eq!(quote_identifier("cpu"), "\"cpu\"");
        assert_eq!(quote_identifier("we\"ird\\name"), "\"we\\\"ird\\\\name\"");
        assert_eq!(quote_literal("it's"), "'it\\'s'");
    }

    #[test]
    fn builds_unbounded_query() {
        let tags = vec!["host".to_string()];
        let fields = vec!["usage".to_string()];
        let query = SelectQuery {
            measure: "cpu",
            tags: &tags,
            fields: &fields,
            ..Default::default()
        };

        assert_eq!(
            query.build(),
            "SELECT \"host\"::tag, \"usage\"::field FROM \"cpu\""
        );
    }

    #[test]
    fn builds_bounded_query_with_retention_policy() {
        let fields = vec!["value".to_string()];
        let from = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let to = DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let query = SelectQuery {
            measure: "mem",
            retention_policy: Some("autogen"),
            tags: &[],
            fields: &fields,
            from: Some(from),
            to: Some(to),
            limit: Some(10),
        };

        assert_eq!(
            query.build(),
            "SELECT \"value\"::field FROM \"autogen\".\"mem\" \
             WHERE time >= '2024-01-01T00:00:00Z' AND time <= '2024-01-02T00:00:00Z' LIMIT 10"
        );
    }
}
