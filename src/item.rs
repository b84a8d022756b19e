// src/item.rs
//! Listing snapshots as returned by an item source.
//!
//! Items are never persisted; only their ids survive as a tracker's seen set.

use serde::{Deserialize, Serialize};
use url::Url;

/// One listing as seen on a search-result page at fetch time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    /// Derived from `url` (see [`item_id_from_url`]); sole de-duplication key.
    pub id: String,
    pub description: String,
    pub price: String,
    pub thumbnail_url: String,
    pub url: String,
    #[serde(default)]
    pub condition: Option<String>,
}

impl Item {
    /// Build an item, deriving its id from `url`.
    /// Returns `None` when the url has no usable final path segment.
    pub fn new(
        description: impl Into<String>,
        price: impl Into<String>,
        thumbnail_url: impl Into<String>,
        url: impl Into<String>,
    ) -> Option<Self> {
        let url = url.into();
        let id = item_id_from_url(&url)?;
        Some(Self {
            id,
            description: description.into(),
            price: price.into(),
            thumbnail_url: thumbnail_url.into(),
            url,
            condition: None,
        })
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Final path segment of a listing url, query string and fragment stripped.
///
/// `https://host/items/123-shoes?referrer=catalog` -> `123-shoes`
pub fn item_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next()?.trim();
    if segment.is_empty() || segment.contains(':') {
        return None;
    }
    Some(segment.to_string())
}

/// A result-grid tile as extracted by the render service: anchor href,
/// image alt text and image src, in page order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawListing {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
}

const NO_TITLE: &str = "No title";
const NO_PRICE: &str = "No price";

const BRAND_LABELS: &[&str] = &["marca:", "brand:"];
const MODEL_LABELS: &[&str] = &["modelo:", "model:"];
const CONDITION_LABELS: &[&str] = &["estado:", "condition:"];

fn find_labelled<'a>(parts: &[&'a str], labels: &[&str]) -> Option<&'a str> {
    parts.iter().copied().find(|p| {
        let lower = p.to_lowercase();
        labels.iter().any(|l| lower.contains(l))
    })
}

impl RawListing {
    /// Convert a raw tile into an [`Item`].
    ///
    /// The marketplace packs everything into the image alt text as
    /// `"<title>, marca: X, modelo: Y, estado: Z, 12,00 €, ..."`.
    /// Tiles without a link or without a derivable id are dropped.
    pub fn into_item(self, base: &Url) -> Option<Item> {
        let href = self.href.filter(|h| !h.trim().is_empty())?;
        let url = base
            .join(href.trim())
            .map(|u| u.to_string())
            .unwrap_or(href);

        let title = self
            .alt
            .map(|a| html_escape::decode_html_entities(&a).trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| NO_TITLE.to_string());
        let parts: Vec<&str> = title.split(", ").collect();

        let mut description = parts.first().copied().unwrap_or_default().to_string();
        for extra in [
            find_labelled(&parts, BRAND_LABELS),
            find_labelled(&parts, MODEL_LABELS),
        ]
        .into_iter()
        .flatten()
        {
            description.push_str(", ");
            description.push_str(extra);
        }

        let price = parts
            .iter()
            .find(|p| p.contains('€'))
            .map(|p| p.to_string())
            .unwrap_or_else(|| NO_PRICE.to_string());

        let item = Item::new(description, price, self.src.unwrap_or_default(), url)?;
        Some(match find_labelled(&parts, CONDITION_LABELS) {
            Some(c) => item.with_condition(c),
            None => item,
        })
    }
}
