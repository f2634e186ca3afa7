//! Inbound query parsing and the per-request `OutboundQuery`.
//!
//! Parameters are kept in encounter order because filter clauses are emitted
//! in that order. A repeated key keeps its first position and its last value.
use crate::core::{
    error::{ProxyError, ProxyResult},
    registry::{DatasetDescriptor, RESERVED_PARAMS},
};

/// Values that make a boolean field filter `true` (compared lower-cased).
const TRUTHY: [&str; 4] = ["true", "t", "on", "1"];

pub fn is_truthy(value: &str) -> bool {
    TRUTHY.contains(&value.to_lowercase().as_str())
}

/// Ordered, last-value-wins view of a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut params = Self::default();
        if let Some(raw) = raw {
            for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
                params.set(key.into_owned(), value.into_owned());
            }
        }
        params
    }

    fn set(&mut self, key: String, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the caller asked for a CSV export: any non-empty `export`
    /// value counts, `export=false` included.
    pub fn export_requested(&self) -> bool {
        self.get("export").is_some_and(|value| !value.is_empty())
    }

    /// 1-based page number, defaulting to 1.
    pub fn page(&self) -> ProxyResult<u32> {
        match self.get("page") {
            None => Ok(1),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(page) if page >= 1 => Ok(page),
                _ => Err(ProxyError::BadRequest("Invalid page number.".to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    /// OData `$orderby` item.
    pub fn to_clause(&self) -> String {
        match self.direction {
            SortDirection::Ascending => self.field.clone(),
            SortDirection::Descending => format!("{} desc", self.field),
        }
    }
}

/// Parse `a,-b` into ordered sort fields. Empty segments are skipped.
pub fn parse_sort(raw: &str) -> Vec<SortField> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && *entry != "-")
        .map(|entry| match entry.strip_prefix('-') {
            Some(field) => SortField {
                field: field.to_string(),
                direction: SortDirection::Descending,
            },
            None => SortField {
                field: entry.to_string(),
                direction: SortDirection::Ascending,
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: FilterValue,
}

impl Filter {
    /// OData equality clause; single quotes in text values are doubled.
    pub fn to_clause(&self) -> String {
        match &self.value {
            FilterValue::Bool(true) => format!("{} eq true", self.field),
            FilterValue::Bool(false) => format!("{} eq false", self.field),
            FilterValue::Text(text) => format!("{} eq '{}'", self.field, text.replace('\'', "''")),
        }
    }
}

/// Translated query, built fresh per request and consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundQuery {
    pub search: Option<String>,
    pub page: u32,
    pub sort: Vec<SortField>,
    pub filters: Vec<Filter>,
    pub facets: Vec<String>,
}

impl OutboundQuery {
    /// Build the general filtered/sorted/paginated query for a dataset.
    pub fn from_params(params: &QueryParams, dataset: &DatasetDescriptor) -> ProxyResult<Self> {
        let page = params.page()?;
        let sort = params.get("sort").map(parse_sort).unwrap_or_default();

        let filters: Vec<Filter> = params
            .iter()
            .filter(|(key, _)| !RESERVED_PARAMS.contains(key))
            .map(|(key, value)| Filter {
                field: key.to_string(),
                value: if dataset.is_boolean_field(key) {
                    FilterValue::Bool(is_truthy(value))
                } else {
                    FilterValue::Text(value.to_string())
                },
            })
            .collect();

        let facets = dataset
            .facets
            .iter()
            .filter(|facet| !filters.iter().any(|f| &f.field == *facet))
            .cloned()
            .collect();

        Ok(Self {
            search: None,
            page,
            sort,
            filters,
            facets,
        })
    }

    pub fn skip(&self, page_size: u32) -> u64 {
        u64::from(self.page - 1) * u64::from(page_size)
    }

    /// Comma-joined ordering clause; empty when no sort was requested.
    pub fn order_by(&self) -> String {
        self.sort
            .iter()
            .map(SortField::to_clause)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// ` and `-joined filter expression; empty when there are no filters.
    pub fn filter_expression(&self) -> String {
        self.filters
            .iter()
            .map(Filter::to_clause)
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::models::default_datasets, core::registry::DatasetRegistry};

    fn registry() -> DatasetRegistry {
        DatasetRegistry::from_configs(&default_datasets()).unwrap()
    }

    #[test]
    fn test_params_keep_order_and_last_value() {
        let params = QueryParams::parse(Some("b=1&a=2&b=3&c=%27x%27"));
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("b", "3"), ("a", "2"), ("c", "'x'")]);
    }

    #[test]
    fn test_page_numbers() {
        for page in [1u32, 2, 4, 17] {
            let params = QueryParams::parse(Some(&format!("page={page}")));
            let query = OutboundQuery::from_params(&params, registry().lookup("bag").unwrap())
                .unwrap();
            assert_eq!(query.skip(100), u64::from(page - 1) * 100);
        }
        assert_eq!(QueryParams::parse(None).page().unwrap(), 1);
    }

    #[test]
    fn test_invalid_page_is_bad_request() {
        for raw in ["page=0", "page=-1", "page=abc", "page="] {
            let err = QueryParams::parse(Some(raw)).page().unwrap_err();
            assert!(matches!(err, ProxyError::BadRequest(_)), "{raw}");
        }
    }

    #[test]
    fn test_sort_parameters() {
        let sort = parse_sort("param1,-param2");
        let query = OutboundQuery {
            search: None,
            page: 1,
            sort,
            filters: vec![],
            facets: vec![],
        };
        assert_eq!(query.order_by(), "param1,param2 desc");
        assert_eq!(parse_sort("").len(), 0);
        assert_eq!(
            parse_sort("-a,b,-c")
                .iter()
                .map(SortField::to_clause)
                .collect::<Vec<_>>(),
            vec!["a desc", "b", "c desc"]
        );
    }

    #[test]
    fn test_filters_and_facets() {
        let params = QueryParams::parse(Some(
            "postcode=1000AA&woonplaatsNaam=Amsterdam&huisnummer=10\
             &huisnummerToevoeging=A&openbareruimteNaam=%27s-Gravelandse+Veer",
        ));
        let query =
            OutboundQuery::from_params(&params, registry().lookup("bag").unwrap()).unwrap();

        assert_eq!(
            query.filter_expression(),
            "postcode eq '1000AA' and woonplaatsNaam eq 'Amsterdam' \
             and huisnummer eq '10' and huisnummerToevoeging eq 'A' \
             and openbareruimteNaam eq '''s-Gravelandse Veer'"
        );
        for used in ["postcode", "woonplaatsNaam", "openbareruimteNaam"] {
            assert!(!query.facets.iter().any(|f| f == used));
        }
        assert!(query.facets.iter().any(|f| f == "gebiedenBuurtNaam"));
    }

    #[test]
    fn test_every_quote_is_doubled() {
        let params = QueryParams::parse(Some("openbareruimteNaam=a%27b%27%27c%27"));
        let query =
            OutboundQuery::from_params(&params, registry().lookup("bag").unwrap()).unwrap();
        assert_eq!(
            query.filter_expression(),
            "openbareruimteNaam eq 'a''b''''c'''"
        );
    }

    #[test]
    fn test_boolean_filters() {
        let registry = registry();
        let brk = registry.lookup("brk").unwrap();
        for value in ["True", "true", "1", "on", "t", "ON"] {
            let params = QueryParams::parse(Some(&format!("grondeigenaar={value}")));
            let query = OutboundQuery::from_params(&params, brk).unwrap();
            assert_eq!(query.filter_expression(), "grondeigenaar eq true");
        }
        for value in ["false", "0", "yes", "", "'"] {
            let params = QueryParams::parse(Some(&format!("grondeigenaar={value}")));
            let query = OutboundQuery::from_params(&params, brk).unwrap();
            assert_eq!(query.filter_expression(), "grondeigenaar eq false");
        }
    }

    #[test]
    fn test_reserved_names_are_never_filters() {
        let params = QueryParams::parse(Some("sort=-postcode&page=2&export=&postcode=1011"));
        let query =
            OutboundQuery::from_params(&params, registry().lookup("bag").unwrap()).unwrap();
        assert_eq!(query.filter_expression(), "postcode eq '1011'");
        assert_eq!(query.order_by(), "postcode desc");
        assert_eq!(query.page, 2);
    }

    #[test]
    fn test_export_flag() {
        assert!(QueryParams::parse(Some("export=true")).export_requested());
        assert!(QueryParams::parse(Some("export=csv")).export_requested());
        assert!(QueryParams::parse(Some("export=false")).export_requested());
        assert!(QueryParams::parse(Some("export=0")).export_requested());
        assert!(!QueryParams::parse(Some("export=")).export_requested());
        assert!(!QueryParams::parse(Some("postcode=1011")).export_requested());
    }
}
