use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use url::Url;

use crate::error::{Result, ScrapingError};

pub const DEFAULT_LOCATION: &str = "Worldwide";
pub const DEFAULT_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelevanceFilter {
    Relevant,
    Recent,
}

impl RelevanceFilter {
    pub fn param(self) -> &'static str {
        match self {
            RelevanceFilter::Relevant => "R",
            RelevanceFilter::Recent => "DD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFilter {
    Any,
    Day,
    Week,
    Month,
}

impl TimeFilter {
    pub fn param(self) -> &'static str {
        match self {
            TimeFilter::Any => "",
            TimeFilter::Day => "r86400",
            TimeFilter::Week => "r604800",
            TimeFilter::Month => "r2592000",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeFilter {
    FullTime,
    PartTime,
    Temporary,
    Contract,
    Internship,
    Volunteer,
    Other,
}

impl TypeFilter {
    pub fn param(self) -> &'static str {
        match self {
            TypeFilter::FullTime => "F",
            TypeFilter::PartTime => "P",
            TypeFilter::Temporary => "T",
            TypeFilter::Contract => "C",
            TypeFilter::Internship => "I",
            TypeFilter::Volunteer => "V",
            TypeFilter::Other => "O",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperienceLevelFilter {
    Internship,
    EntryLevel,
    Associate,
    MidSenior,
    Director,
    Executive,
}

impl ExperienceLevelFilter {
    pub fn param(self) -> &'static str {
        match self {
            ExperienceLevelFilter::Internship => "1",
            ExperienceLevelFilter::EntryLevel => "2",
            ExperienceLevelFilter::Associate => "3",
            ExperienceLevelFilter::MidSenior => "4",
            ExperienceLevelFilter::Director => "5",
            ExperienceLevelFilter::Executive => "6",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// A company jobs page URL; its `f_C` parameter restricts results to those companies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_jobs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<RelevanceFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeFilter>,
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience: Vec<ExperienceLevelFilter>,
}

/// Query options as written in configuration; unset fields fall back to the
/// global defaults when the query is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<QueryFilters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub query: String,
    #[serde(default)]
    pub options: QueryOptionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub locations: Vec<String>,
    pub limit: usize,
    pub optimize: bool,
    pub filters: QueryFilters,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            locations: vec![DEFAULT_LOCATION.to_string()],
            limit: DEFAULT_LIMIT,
            optimize: false,
            filters: QueryFilters::default(),
        }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            return Err(ScrapingError::ConfigError("Query options must name at least one location".to_string()).into());
        }
        if self.locations.iter().any(|l| l.trim().is_empty()) {
            return Err(ScrapingError::ConfigError("Locations cannot be empty strings".to_string()).into());
        }
        if self.limit == 0 {
            return Err(ScrapingError::ConfigError("limit must be greater than 0".to_string()).into());
        }
        if let Some(ref company_url) = self.filters.company_jobs_url {
            Url::parse(company_url).map_err(|e| {
                ScrapingError::ConfigError(format!("Invalid company_jobs_url '{}': {}", company_url, e))
            })?;
        }
        Ok(())
    }
}

/// A search term with fully resolved options. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub query: String,
    pub options: QueryOptions,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query(query={:?}, locations={:?}, limit={}, optimize={})",
            self.query, self.options.locations, self.options.limit, self.options.optimize
        )
    }
}

impl QueryConfig {
    /// Fill unset options from `defaults` and validate the result.
    pub fn resolve(&self, defaults: &QueryOptions) -> Result<Query> {
        let options = QueryOptions {
            locations: self
                .options
                .locations
                .clone()
                .unwrap_or_else(|| defaults.locations.clone()),
            limit: self.options.limit.unwrap_or(defaults.limit),
            optimize: self.options.optimize.unwrap_or(defaults.optimize),
            filters: self
                .options
                .filters
                .clone()
                .unwrap_or_else(|| defaults.filters.clone()),
        };
        options.validate()?;

        Ok(Query {
            query: self.query.clone(),
            options,
        })
    }
}

impl Query {
    pub fn new(query: impl Into<String>, options: QueryOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            query: query.into(),
            options,
        })
    }

    /// Build the listing search URL for one location.
    pub fn search_url(&self, base: &Url, location: &str) -> Result<Url> {
        let tag = format!("[{}][{}]", self.query, location);
        let filters = &self.options.filters;
        let mut url = base.clone();

        {
            let mut params = url.query_pairs_mut();
            params.clear();

            if !self.query.is_empty() {
                params.append_pair("keywords", &self.query);
            }
            if !location.is_empty() {
                params.append_pair("location", location);
            }

            if let Some(ref company_url) = filters.company_jobs_url {
                let company_url = Url::parse(company_url).map_err(ScrapingError::from)?;
                if let Some((_, companies)) = company_url.query_pairs().find(|(k, _)| k == "f_C") {
                    params.append_pair("f_C", &companies);
                    debug!("{} Applied company filter {}", tag, companies);
                }
            }

            if let Some(relevance) = filters.relevance {
                params.append_pair("sortBy", relevance.param());
                debug!("{} Applied relevance filter {:?}", tag, relevance);
            }

            if let Some(time) = filters.time {
                params.append_pair("f_TPR", time.param());
                debug!("{} Applied time filter {:?}", tag, time);
            }

            if !filters.types.is_empty() {
                let codes: Vec<&str> = filters.types.iter().map(|t| t.param()).collect();
                params.append_pair("f_JT", &codes.join(","));
                debug!("{} Applied type filters {:?}", tag, filters.types);
            }

            if !filters.experience.is_empty() {
                let codes: Vec<&str> = filters.experience.iter().map(|e| e.param()).collect();
                params.append_pair("f_E", &codes.join(","));
                debug!("{} Applied experience filters {:?}", tag, filters.experience);
            }
        }

        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}
