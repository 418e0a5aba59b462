//! Query template rendering, one function per provider query language

use crate::config::QueryTemplate;
use serde_json::{json, Value};

/// PatentsView-style JSON criteria
///
/// `_or` of title/abstract phrase matches, AND-ed with one `_or` group each
/// for CPC prefixes, IPC prefixes and applicants; excluded applicants as `_not`.
pub fn office_a_criteria(query: &QueryTemplate) -> Value {
    let mut text_clauses = Vec::new();
    for phrase in query.phrases() {
        text_clauses.push(json!({"_text_phrase": {"patent_title": phrase}}));
        text_clauses.push(json!({"_text_phrase": {"patent_abstract": phrase}}));
    }

    let mut base = if text_clauses.is_empty() {
        json!({"_text_all": {"patent_title": "mRNA"}})
    } else {
        json!({ "_or": text_clauses })
    };

    let groups: Vec<Vec<Value>> = vec![
        query
            .cpc_prefixes
            .iter()
            .map(|p| json!({"_begins": {"cpc_subgroup_id": p}}))
            .collect(),
        query
            .ipc_prefixes
            .iter()
            .map(|p| json!({"_begins": {"ipc_subclass": p}}))
            .collect(),
        query
            .applicants
            .iter()
            .map(|a| json!({"_text_phrase": {"assignee_organization": a}}))
            .collect(),
    ];
    let augments: Vec<Value> = groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| json!({ "_or": g }))
        .collect();
    if !augments.is_empty() {
        let mut all = vec![base];
        all.extend(augments);
        base = json!({ "_and": all });
    }

    if !query.exclude_applicants.is_empty() {
        let excluded: Vec<Value> = query
            .exclude_applicants
            .iter()
            .map(|a| json!({"_text_phrase": {"assignee_organization": a}}))
            .collect();
        base = json!({"_and": [base, {"_not": {"_or": excluded}}]});
    }

    base
}

/// PATENTSCOPE-style query string
pub fn office_b_query(query: &QueryTemplate) -> String {
    let mut terms: Vec<String> = Vec::new();
    for phrase in query.phrases() {
        terms.push(format!("TTL:\"{}\"", phrase));
        terms.push(format!("AB:\"{}\"", phrase));
    }
    terms.extend(query.cpc_prefixes.iter().map(|p| format!("CPC:{}*", p)));
    terms.extend(query.ipc_prefixes.iter().map(|p| format!("IPC:{}*", p)));
    terms.extend(query.applicants.iter().map(|a| format!("PA:\"{}\"", a)));

    let include = terms.join(" OR ");
    with_exclusions(include, query, |a| format!("NOT PA:\"{}\"", a))
}

/// OPS-style CQL
pub fn office_c_cql(query: &QueryTemplate) -> String {
    let phrases = query.phrases();
    let mut terms: Vec<String> = Vec::new();
    terms.extend(phrases.iter().map(|p| format!("ti=\"{}\"", p)));
    terms.extend(phrases.iter().map(|p| format!("ab=\"{}\"", p)));
    terms.extend(query.cpc_prefixes.iter().map(|p| format!("cpc={}*", p)));
    terms.extend(query.ipc_prefixes.iter().map(|p| format!("ipc={}*", p)));
    terms.extend(query.applicants.iter().map(|a| format!("ap=\"{}\"", a)));

    let include = if terms.is_empty() {
        "ti=mRNA".to_string()
    } else {
        terms.join(" OR ")
    };
    with_exclusions(include, query, |a| format!("NOT ap=\"{}\"", a))
}

fn with_exclusions<F>(include: String, query: &QueryTemplate, render: F) -> String
where
    F: Fn(&String) -> String,
{
    if query.exclude_applicants.is_empty() {
        return include;
    }
    let excluded: Vec<String> = query.exclude_applicants.iter().map(render).collect();
    format!("({}) {}", include, excluded.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_query() -> QueryTemplate {
        QueryTemplate {
            keywords: vec!["\"mRNA display\"".into()],
            synonyms: vec![],
            cpc_prefixes: vec!["C07K".into()],
            ipc_prefixes: vec![],
            applicants: vec!["PeptiDream".into()],
            exclude_applicants: vec!["Acme".into()],
        }
    }

    #[test]
    fn test_office_a_criteria_shape() {
        let criteria = office_a_criteria(&small_query());
        let outer = criteria["_and"].as_array().unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[1]["_not"]["_or"][0]["_text_phrase"]["assignee_organization"], "Acme");

        let inner = outer[0]["_and"].as_array().unwrap();
        assert_eq!(inner[0]["_or"][0]["_text_phrase"]["patent_title"], "mRNA display");
        assert_eq!(inner[0]["_or"][1]["_text_phrase"]["patent_abstract"], "mRNA display");
        assert_eq!(inner[1]["_or"][0]["_begins"]["cpc_subgroup_id"], "C07K");
        assert_eq!(inner.len(), 3, "empty IPC group is omitted");
    }

    #[test]
    fn test_office_b_query() {
        assert_eq!(
            office_b_query(&small_query()),
            "(TTL:\"mRNA display\" OR AB:\"mRNA display\" OR CPC:C07K* OR PA:\"PeptiDream\") NOT PA:\"Acme\""
        );
    }

    #[test]
    fn test_office_c_cql() {
        let mut query = small_query();
        query.exclude_applicants.clear();
        assert_eq!(
            office_c_cql(&query),
            "ti=\"mRNA display\" OR ab=\"mRNA display\" OR cpc=C07K* OR ap=\"PeptiDream\""
        );
    }

    #[test]
    fn test_office_c_cql_empty_falls_back() {
        let query = QueryTemplate {
            keywords: vec![],
            synonyms: vec![],
            cpc_prefixes: vec![],
            ipc_prefixes: vec![],
            applicants: vec![],
            exclude_applicants: vec![],
        };
        assert_eq!(office_c_cql(&query), "ti=mRNA");
    }
}
