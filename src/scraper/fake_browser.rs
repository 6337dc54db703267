//! In-memory stand-in for a browser showing a paginated listing site.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use url::Url;

use crate::browser::BrowserCapability;
use crate::error::{Result, ScrapingError};
use crate::scraper::pagination::DEFAULT_PAGE_SIZE;
use crate::scraper::scripts;
use crate::scraper::selectors::SelectorSet;

pub const LANDING_URL: &str = "https://www.linkedin.com";
pub const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search";

#[derive(Debug, Clone)]
pub struct FakeListing {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub place: String,
    pub date: String,
    pub href: String,
    /// `None` models a detail pane that never populates.
    pub description: Option<String>,
    pub criteria: Vec<(String, String)>,
}

impl FakeListing {
    pub fn new(id: usize) -> Self {
        Self {
            job_id: id.to_string(),
            title: format!("Engineer {}", id),
            company: format!("Company {}", id),
            place: "Casablanca".to_string(),
            date: "2024-03-01".to_string(),
            href: format!("/jobs/view/{}", id),
            description: Some(format!("Description {}", id)),
            criteria: vec![
                ("Seniority Level".to_string(), "Mid".to_string()),
                ("Employment Type".to_string(), "Full-time".to_string()),
            ],
        }
    }

    pub fn without_detail(mut self) -> Self {
        self.description = None;
        self
    }
}

pub fn page(ids: std::ops::Range<usize>) -> Vec<FakeListing> {
    ids.map(FakeListing::new).collect()
}

#[derive(Debug, Clone)]
pub struct FakeSite {
    pub pages: Vec<Vec<FakeListing>>,
    pub container_present: bool,
    /// Session cookie is already set when the run starts.
    pub cookie_preset: bool,
    pub reject_injection: bool,
    /// Injection is accepted but the cookie never shows up.
    pub drop_injected_cookie: bool,
    /// Clear the cookie once this many listings have been opened.
    pub expire_session_after_opens: Option<usize>,
    /// Listings on the first page hidden until the count is read a second time.
    pub lazy_loaded: usize,
    /// Navigating to this page index fails.
    pub fail_navigation_to_page: Option<usize>,
    /// The results container check throws instead of answering.
    pub fail_container_check: bool,
    /// Pages render without a paginator even when more pages exist.
    pub hide_paginator: bool,
}

impl FakeSite {
    pub fn with_pages(pages: Vec<Vec<FakeListing>>) -> Self {
        Self {
            pages,
            container_present: true,
            cookie_preset: false,
            reject_injection: false,
            drop_injected_cookie: false,
            expire_session_after_opens: None,
            lazy_loaded: 0,
            fail_navigation_to_page: None,
            fail_container_check: false,
            hide_paginator: false,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    url: String,
    page: Option<usize>,
    cookie: Option<String>,
    opened: Option<usize>,
    opens: usize,
    first_page_counts: usize,
    navigations: Vec<String>,
}

pub struct FakeBrowser {
    site: FakeSite,
    selectors: SelectorSet,
    state: Mutex<FakeState>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        let cookie = site.cookie_preset.then(|| "preset".to_string());
        Self {
            site,
            selectors: SelectorSet::default(),
            state: Mutex::new(FakeState {
                cookie,
                ..Default::default()
            }),
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    fn listings(&self, page: Option<usize>) -> &[FakeListing] {
        page.and_then(|p| self.site.pages.get(p))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn arg_str(args: &[Value], i: usize) -> String {
        args.get(i).and_then(Value::as_str).unwrap_or_default().to_string()
    }

    fn arg_index(args: &[Value], i: usize) -> usize {
        args.get(i).and_then(Value::as_u64).unwrap_or_default() as usize
    }
}

#[async_trait]
impl BrowserCapability for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        state.opened = None;

        let parsed = Url::parse(url).map_err(ScrapingError::from)?;
        if parsed.path().starts_with("/jobs/search") {
            let start = parsed
                .query_pairs()
                .find(|(k, _)| k == "start")
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0);
            let page = start / DEFAULT_PAGE_SIZE;
            if self.site.fail_navigation_to_page == Some(page) {
                return Err(ScrapingError::BrowserError("net::ERR_CONNECTION_RESET".to_string()).into());
            }
            state.page = Some(page);
        } else {
            state.page = None;
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        let selectors = &self.selectors;

        let value = if script == scripts::ELEMENT_PRESENT {
            let selector = Self::arg_str(args, 0);
            if selector == selectors.container {
                if self.site.fail_container_check {
                    return Err(ScrapingError::ScriptError("Execution context was destroyed".to_string()).into());
                }
                json!(state.page.is_some() && self.site.container_present)
            } else if selector == selectors.pagination {
                json!(state.page.is_some() && self.site.pages.len() > 1 && !self.site.hide_paginator)
            } else if selector == selectors.pagination_next_button {
                json!(state.page.map_or(false, |p| p + 1 < self.site.pages.len()))
            } else {
                json!(false)
            }
        } else if script == scripts::COUNT_ELEMENTS || script == scripts::LISTINGS_PRESENT {
            let mut total = self.listings(state.page).len();
            if state.page == Some(0) {
                state.first_page_counts += 1;
                if state.first_page_counts == 1 {
                    total = total.saturating_sub(self.site.lazy_loaded);
                }
            }
            if script == scripts::COUNT_ELEMENTS {
                json!(total)
            } else {
                json!(total > 0)
            }
        } else if script == scripts::CURRENT_URL {
            json!(state.url)
        } else if script == scripts::ACCEPT_COOKIES || script == scripts::HIDE_OVERLAY {
            json!(false)
        } else if script == scripts::LISTING_SUMMARY {
            match self.listings(state.page).get(Self::arg_index(args, 0)) {
                Some(l) => json!({
                    "job_id": l.job_id,
                    "title": l.title,
                    "company": l.company,
                    "place": l.place,
                    "date": l.date,
                }),
                None => json!({ "job_id": "", "title": "", "company": "", "place": "", "date": "" }),
            }
        } else if script == scripts::OPEN_LISTING {
            let index = Self::arg_index(args, 0);
            match self.listings(state.page).get(index) {
                Some(l) => {
                    let href = l.href.clone();
                    state.opened = Some(index);
                    state.opens += 1;
                    if self.site.expire_session_after_opens == Some(state.opens) {
                        state.cookie = None;
                    }
                    json!(href)
                }
                None => Value::Null,
            }
        } else if script == scripts::DETAIL_LOADED {
            let opened = state.opened.and_then(|i| self.listings(state.page).get(i));
            json!(opened.map_or(false, |l| l.description.is_some()))
        } else if script == scripts::DESCRIPTION {
            let opened = state.opened.and_then(|i| self.listings(state.page).get(i));
            match opened.and_then(|l| l.description.clone()) {
                Some(text) => json!({ "text": text, "html": format!("<div>{}</div>", text) }),
                None => Value::Null,
            }
        } else if script == scripts::CRITERIA_ENTRIES {
            let opened = state.opened.and_then(|i| self.listings(state.page).get(i));
            let entries: Vec<Value> = opened
                .map(|l| {
                    l.criteria
                        .iter()
                        .map(|(label, value)| json!({ "label": label, "value": value }))
                        .collect()
                })
                .unwrap_or_default();
            Value::Array(entries)
        } else {
            return Err(ScrapingError::ScriptError("unknown script".to_string()).into());
        };

        Ok(value)
    }

    async fn get_cookie(&self, _name: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().cookie.clone())
    }

    async fn set_cookie(&self, _name: &str, value: &str, _domain: &str) -> Result<()> {
        if self.site.reject_injection {
            return Err(ScrapingError::BrowserError("cookie rejected".to_string()).into());
        }
        if !self.site.drop_injected_cookie {
            self.state.lock().unwrap().cookie = Some(value.to_string());
        }
        Ok(())
    }
}
