//! Request translation.
//!
//! Turns an inbound request plus a dataset descriptor into the concrete call
//! for one of the two backends. The backend is chosen once per request through
//! [`Mode`] and threaded through as a value.
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, header};
use serde::Serialize;
use url::Url;

use crate::{
    config::models::{ExportBackendConfig, SearchBackendConfig},
    core::{
        error::{ProxyError, ProxyResult},
        headers,
        query::{OutboundQuery, QueryParams},
        registry::DatasetDescriptor,
    },
};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const ADDRESS_FIELDS: &str =
    "openbareruimteNaam,postcode,huisnummerStr,huisletter,huisnummertoevoeging";
const ADDRESS_SELECT: &str = "identificatie,openbareruimteNaam,postcode,huisnummer,huisletter,\
                              huisnummertoevoeging,woonplaatsNaam,latitude,longitude";
const ADDRESS_ORDER_BY: &str = "search.score() desc,openbareruimteNaam,woonplaatsNaam,\
                                huisnummer,huisletter,huisnummertoevoeging asc";
const ADDRESS_FACETS: [&str; 2] = [
    "openbareruimteNaam,count:10,sort:count",
    "postcode,count:20,sort:value",
];

/// Which query shape / backend a request is translated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// General filtered search against the search backend
    Search,
    /// Fixed wildcard address lookup against the search backend
    AddressSearch,
    /// CSV export streamed from the export backend
    Export,
}

impl Mode {
    /// Mode for the generic dataset endpoint, driven by the `export` flag.
    pub fn for_dataset_request(params: &QueryParams) -> Self {
        if params.export_requested() {
            Mode::Export
        } else {
            Mode::Search
        }
    }

    pub fn backend(self) -> Backend {
        match self {
            Mode::Search | Mode::AddressSearch => Backend::Search,
            Mode::Export => Backend::Export,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Search => "search",
            Mode::AddressSearch => "address_search",
            Mode::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Search,
    Export,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Search => "search",
            Backend::Export => "export",
        }
    }

    /// Export responses are streamed through, search responses are buffered.
    pub fn is_streaming(self) -> bool {
        matches!(self, Backend::Export)
    }
}

/// How the outbound call is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// The invoker attaches a freshly fetched backend bearer token
    BackendToken,
    /// The caller's own `Authorization` header is already in the header set
    Forwarded,
}

/// The inbound request as seen by the translator.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub params: QueryParams,
    pub headers: HeaderMap,
    /// Absolute URL the caller used, rebuilt from the proxy's point of view
    pub absolute_url: String,
}

/// Fully built backend request.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub backend: Backend,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub credential: Credential,
}

/// JSON body of a `docs/search` request.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub count: bool,
    pub facets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_post_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_pre_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_fields: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_statistics: Option<String>,
    pub skip: u64,
    pub top: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Builds backend calls; holds only immutable backend settings.
#[derive(Debug, Clone)]
pub struct Translator {
    search_base_url: String,
    api_version: String,
    page_size: u32,
    facet_limit: u32,
    export_base_url: String,
}

impl Translator {
    pub fn new(search: &SearchBackendConfig, export: &ExportBackendConfig) -> Self {
        Self {
            search_base_url: search.base_url.trim_end_matches('/').to_string(),
            api_version: search.api_version.clone(),
            page_size: search.page_size,
            facet_limit: search.facet_limit,
            export_base_url: export.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn translate(
        &self,
        inbound: &InboundRequest,
        dataset: &DatasetDescriptor,
        mode: Mode,
    ) -> ProxyResult<OutboundCall> {
        match mode {
            Mode::Search => {
                let query = OutboundQuery::from_params(&inbound.params, dataset)?;
                self.search_call(dataset, &self.search_body(&query))
            }
            Mode::AddressSearch => {
                let body = self.address_body(&inbound.params)?;
                self.search_call(dataset, &body)
            }
            Mode::Export => self.export_call(inbound, dataset),
        }
    }

    /// Body for the general filtered search.
    pub fn search_body(&self, query: &OutboundQuery) -> SearchRequest {
        SearchRequest {
            search: query.search.clone(),
            count: true,
            facets: query
                .facets
                .iter()
                .map(|facet| format!("{facet},count:{},sort:value", self.facet_limit))
                .collect(),
            orderby: non_empty(query.order_by()),
            filter: non_empty(query.filter_expression()),
            skip: query.skip(self.page_size),
            top: self.page_size,
            ..SearchRequest::default()
        }
    }

    /// Body for the fixed address lookup; only `q` and `page` are read.
    pub fn address_body(&self, params: &QueryParams) -> ProxyResult<SearchRequest> {
        let page = params.page()?;
        let term = params.get("q").unwrap_or_default();

        Ok(SearchRequest {
            search: Some(format!("{term}*")),
            count: true,
            facets: ADDRESS_FACETS.iter().map(|f| f.to_string()).collect(),
            highlight: Some(ADDRESS_FIELDS.to_string()),
            highlight_post_tag: Some("</em>".to_string()),
            highlight_pre_tag: Some("<em>".to_string()),
            minimum_coverage: None,
            select: Some(ADDRESS_SELECT.to_string()),
            orderby: Some(ADDRESS_ORDER_BY.to_string()),
            query_type: Some("simple".to_string()),
            search_fields: Some(ADDRESS_FIELDS.to_string()),
            search_mode: Some("all".to_string()),
            scoring_profile: Some("search_address".to_string()),
            scoring_statistics: Some("global".to_string()),
            skip: u64::from(page - 1) * u64::from(self.page_size),
            top: self.page_size,
            filter: None,
        })
    }

    fn search_call(
        &self,
        dataset: &DatasetDescriptor,
        body: &SearchRequest,
    ) -> ProxyResult<OutboundCall> {
        let mut url = parse_url(&format!(
            "{}/{}/docs/search",
            self.search_base_url, dataset.index_name
        ))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);

        let body = serde_json::to_vec(body)
            .map_err(|e| ProxyError::Internal(format!("Failed to encode search body: {e}")))?;

        // Caller headers are dropped entirely; the token is added by the invoker
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );

        Ok(OutboundCall {
            backend: Backend::Search,
            method: Method::POST,
            url,
            headers,
            body: Some(Bytes::from(body)),
            credential: Credential::BackendToken,
        })
    }

    fn export_call(
        &self,
        inbound: &InboundRequest,
        dataset: &DatasetDescriptor,
    ) -> ProxyResult<OutboundCall> {
        let mut url = parse_url(&format!(
            "{}/v1/{}",
            self.export_base_url, dataset.export_path
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in inbound.params.iter() {
                if key != "export" && key != "_format" {
                    pairs.append_pair(key, value);
                }
            }
            pairs.append_pair("_format", "csv");
        }

        Ok(OutboundCall {
            backend: Backend::Export,
            method: Method::GET,
            url,
            headers: headers::retain_only(&inbound.headers, &[header::AUTHORIZATION]),
            body: None,
            credential: Credential::Forwarded,
        })
    }
}

fn parse_url(raw: &str) -> ProxyResult<Url> {
    Url::parse(raw).map_err(|e| ProxyError::Internal(format!("Invalid backend URL '{raw}': {e}")))
}
