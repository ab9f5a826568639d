//! The closed set of parameterized aggregate queries, one template per
//! analytical category, selected by tag.
//!
//! Every user-derived value is passed as a bind parameter. The SQL text only
//! varies in the number of placeholders, never in content spliced from the
//! question.

use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::ToSql;

use crate::types::{AnalyticalCategory, StructuredQuery};

/// A bind value for a parameterized query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => Ok(ToSqlOutput::Owned(Value::Text(s.clone()))),
            SqlParam::Integer(i) => Ok(ToSqlOutput::Owned(Value::Integer(*i))),
        }
    }
}

/// A fully-bound analytical query, ready for execution.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    pub category: AnalyticalCategory,
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Build the query for `category` if the StructuredQuery populates it.
/// Returns `None` for unpopulated categories — the retriever issues no call.
pub fn bound_query_for(
    category: AnalyticalCategory,
    query: &StructuredQuery,
    row_cap: usize,
) -> Option<BoundQuery> {
    match category {
        AnalyticalCategory::TopDonorsByKeyword => top_donors_by_keyword(query, row_cap),
        AnalyticalCategory::PoliticianVotes => politician_votes(query, row_cap),
        AnalyticalCategory::BillSponsorDonors => bill_sponsor_donors(query, row_cap),
    }
}

/// Top donors whose name or industry matches any donor keyword, by total
/// amount donated.
fn top_donors_by_keyword(query: &StructuredQuery, row_cap: usize) -> Option<BoundQuery> {
    if query.donor_keywords.is_empty() {
        return None;
    }

    let mut params: Vec<SqlParam> = Vec::new();
    let mut clauses: Vec<String> = Vec::new();
    for keyword in &query.donor_keywords {
        params.push(SqlParam::Text(keyword.clone()));
        let i = params.len();
        clauses.push(format!(
            "(LOWER(donors.name) LIKE '%' || LOWER(?{i}) || '%' \
             OR LOWER(donors.industry) LIKE '%' || LOWER(?{i}) || '%')"
        ));
    }
    params.push(SqlParam::Integer(row_cap as i64));
    let limit = params.len();

    let sql = format!(
        "SELECT donors.name AS donor_name, \
                donors.donor_type, \
                donors.industry, \
                COUNT(donations.donation_id) AS num_donations, \
                SUM(donations.amount) AS total_amount \
         FROM donations \
         JOIN donors ON donations.donor_id = donors.donor_id \
         WHERE {} \
         GROUP BY donors.donor_id \
         ORDER BY total_amount DESC \
         LIMIT ?{limit}",
        clauses.join(" OR ")
    );

    Some(BoundQuery {
        category: AnalyticalCategory::TopDonorsByKeyword,
        sql,
        params,
    })
}

/// Voting record for the first extracted politician, newest votes first,
/// optionally narrowed by the bill search terms.
fn politician_votes(query: &StructuredQuery, row_cap: usize) -> Option<BoundQuery> {
    let name = query.politician_names.iter().next()?;

    let mut params: Vec<SqlParam> = vec![SqlParam::Text(name.clone())];
    let mut keyword_filter = String::new();
    if !query.bill_search_terms.is_empty() {
        let mut clauses: Vec<String> = Vec::new();
        for term in &query.bill_search_terms {
            params.push(SqlParam::Text(term.clone()));
            let i = params.len();
            clauses.push(format!("LOWER(bills.title) LIKE '%' || LOWER(?{i}) || '%'"));
        }
        keyword_filter = format!(" AND ({})", clauses.join(" OR "));
    }
    params.push(SqlParam::Integer(row_cap as i64));
    let limit = params.len();

    let sql = format!(
        "SELECT politicians.first_name || ' ' || politicians.last_name AS politician, \
                bills.official_bill_number AS bill_number, \
                bills.title AS bill_title, \
                votes.vote_position, \
                votes.vote_category, \
                votes.date AS vote_date \
         FROM votes \
         JOIN politicians ON votes.politician_id = politicians.politician_id \
         JOIN bills ON votes.bill_id = bills.bill_id \
         WHERE LOWER(politicians.first_name || ' ' || politicians.last_name) \
               LIKE '%' || LOWER(?1) || '%'{keyword_filter} \
         ORDER BY votes.date DESC \
         LIMIT ?{limit}"
    );

    Some(BoundQuery {
        category: AnalyticalCategory::PoliticianVotes,
        sql,
        params,
    })
}

/// Top donors to the sponsor of the named bill, by total amount donated.
/// Bill numbers are compared with punctuation and whitespace stripped so
/// "H.R. 1" and "HR1" resolve to the same bill.
fn bill_sponsor_donors(query: &StructuredQuery, row_cap: usize) -> Option<BoundQuery> {
    let bill_number = query.bill_number.as_deref()?.trim();
    if bill_number.is_empty() {
        return None;
    }

    let params = vec![
        SqlParam::Text(bill_number.to_string()),
        SqlParam::Integer(row_cap as i64),
    ];

    let sql = "WITH bill_sponsor AS ( \
                   SELECT sponsor_id FROM bills \
                   WHERE REPLACE(REPLACE(LOWER(official_bill_number), '.', ''), ' ', '') \
                         = REPLACE(REPLACE(LOWER(?1), '.', ''), ' ', '') \
               ) \
               SELECT donors.name AS donor_name, \
                      donors.donor_type, \
                      donors.industry, \
                      COUNT(donations.donation_id) AS num_donations, \
                      SUM(donations.amount) AS total_amount \
               FROM donations \
               JOIN donors ON donations.donor_id = donors.donor_id \
               WHERE donations.politician_id IN (SELECT sponsor_id FROM bill_sponsor) \
               GROUP BY donors.donor_id \
               ORDER BY total_amount DESC \
               LIMIT ?2"
        .to_string();

    Some(BoundQuery {
        category: AnalyticalCategory::BillSponsorDonors,
        sql,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_with(donors: &[&str], politicians: &[&str], terms: &[&str]) -> StructuredQuery {
        let mut q = StructuredQuery::default();
        for d in donors {
            q.donor_keywords.insert(d.to_string());
        }
        for p in politicians {
            q.politician_names.insert(p.to_string());
        }
        for t in terms {
            q.bill_search_terms.insert(t.to_string());
        }
        q
    }

    #[test]
    fn unpopulated_categories_build_no_query() {
        let q = StructuredQuery::fallback("some question");
        assert!(bound_query_for(AnalyticalCategory::TopDonorsByKeyword, &q, 10).is_none());
        assert!(bound_query_for(AnalyticalCategory::PoliticianVotes, &q, 10).is_none());
        assert!(bound_query_for(AnalyticalCategory::BillSponsorDonors, &q, 10).is_none());
    }

    #[test]
    fn donor_query_binds_every_keyword() {
        let q = query_with(&["oil", "pharma"], &[], &[]);
        let bound = bound_query_for(AnalyticalCategory::TopDonorsByKeyword, &q, 10).unwrap();

        // Two keywords plus the row cap.
        assert_eq!(bound.params.len(), 3);
        assert_eq!(bound.params[0], SqlParam::Text("oil".into()));
        assert_eq!(bound.params[1], SqlParam::Text("pharma".into()));
        assert_eq!(bound.params[2], SqlParam::Integer(10));

        // User text never appears in the SQL itself.
        assert!(!bound.sql.contains("oil"));
        assert!(!bound.sql.contains("pharma"));
        assert!(bound.sql.contains("ORDER BY total_amount DESC"));
    }

    #[test]
    fn votes_query_uses_first_name_and_filters_by_terms() {
        let q = query_with(&[], &["Senator X"], &["clean energy"]);
        let bound = bound_query_for(AnalyticalCategory::PoliticianVotes, &q, 5).unwrap();

        assert_eq!(bound.params[0], SqlParam::Text("Senator X".into()));
        assert_eq!(bound.params[1], SqlParam::Text("clean energy".into()));
        assert_eq!(*bound.params.last().unwrap(), SqlParam::Integer(5));
        assert!(!bound.sql.contains("Senator X"));
        assert!(bound.sql.contains("ORDER BY votes.date DESC"));
    }

    #[test]
    fn votes_query_without_terms_has_no_title_filter() {
        let q = query_with(&[], &["Senator X"], &[]);
        let bound = bound_query_for(AnalyticalCategory::PoliticianVotes, &q, 5).unwrap();
        assert_eq!(bound.params.len(), 2);
        // The title filter only appears when search terms are present.
        assert!(!bound.sql.contains("LOWER(bills.title)"));
    }

    #[test]
    fn sponsor_query_requires_a_bill_number() {
        let mut q = StructuredQuery::default();
        q.bill_number = Some("  ".into());
        assert!(bound_query_for(AnalyticalCategory::BillSponsorDonors, &q, 10).is_none());

        q.bill_number = Some("H.R. 2468".into());
        let bound = bound_query_for(AnalyticalCategory::BillSponsorDonors, &q, 10).unwrap();
        assert_eq!(bound.params[0], SqlParam::Text("H.R. 2468".into()));
        assert!(!bound.sql.contains("2468"));
    }
}
