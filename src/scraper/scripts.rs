//! Script bodies evaluated in the page. Each one reads positional arguments
//! from `args` and returns a JSON-compatible value.

/// `args`: selector. Returns whether at least one element matches.
pub const ELEMENT_PRESENT: &str = r#"
return document.querySelector(args[0]) !== null;
"#;

/// `args`: selector. Returns the number of matching elements.
pub const COUNT_ELEMENTS: &str = r#"
return document.querySelectorAll(args[0]).length;
"#;

/// `args`: selector. Returns whether listing links are present.
pub const LISTINGS_PRESENT: &str = r#"
return document.querySelectorAll(args[0]).length > 0;
"#;

pub const CURRENT_URL: &str = r#"
return window.location.href;
"#;

/// `args`: button text. Clicks the first button whose text contains it.
pub const ACCEPT_COOKIES: &str = r#"
const buttons = Array.from(document.querySelectorAll('button'));
const cookieButton = buttons.find(e => e.innerText.includes(args[0]));
if (cookieButton) {
    cookieButton.click();
}
return cookieButton !== undefined;
"#;

/// `args`: overlay selector. Hides the overlay if present.
pub const HIDE_OVERLAY: &str = r#"
const div = document.querySelector(args[0]);
if (div) {
    div.style.display = "none";
}
return div !== null;
"#;

/// `args`: index, jobs, links, companies, places, dates selectors.
pub const LISTING_SUMMARY: &str = r#"
const nth = (selector) => document.querySelectorAll(selector)[args[0]];
const job = nth(args[1]);
const link = nth(args[2]);
const company = nth(args[3]);
const place = nth(args[4]);
const date = nth(args[5]);
return {
    job_id: job ? (job.getAttribute("data-job-id") || "") : "",
    title: link ? link.innerText : "",
    company: company ? company.innerText : "",
    place: place ? place.innerText : "",
    date: date ? (date.getAttribute("datetime") || "") : "",
};
"#;

/// `args`: index, links selector. Scrolls to and opens the listing, returns its href.
pub const OPEN_LISTING: &str = r#"
const linkElem = document.querySelectorAll(args[1])[args[0]];
if (!linkElem) {
    return null;
}
linkElem.scrollIntoView();
linkElem.click();
return linkElem.getAttribute("href");
"#;

/// `args`: description selector. Returns whether the detail pane has text.
pub const DETAIL_LOADED: &str = r#"
const description = document.querySelector(args[0]);
return !!description && description.innerText.length > 0;
"#;

/// `args`: description selector. Returns `{ text, html }` or null.
pub const DESCRIPTION: &str = r#"
const el = document.querySelector(args[0]);
if (!el) {
    return null;
}
return { text: el.innerText, html: el.outerHTML };
"#;

/// `args`: criteria label selector. Returns every label with the text of its next sibling.
pub const CRITERIA_ENTRIES: &str = r#"
return Array.from(document.querySelectorAll(args[0]))
    .filter(node => node.nextElementSibling)
    .map(node => ({
        label: node.innerText.trim(),
        value: node.nextElementSibling.innerText,
    }));
"#;
