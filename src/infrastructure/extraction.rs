//! Structured data extraction from product pages.
//!
//! Scans `<script type="application/ld+json">` blocks for schema.org
//! `Product` and `Review` entities (handling top-level arrays and `@graph`
//! containers), plus `schema.org/Review` microdata and the fabric-details
//! section of the page body. Everything is duck-typed and tolerant: a missing
//! field is `None`, a malformed block is skipped, and a page with no product
//! markup yields an empty result rather than an error.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use tracing::debug;

use crate::domain::product::{ReviewRecord, VariantRecord};
use crate::infrastructure::materials::squash_ws;

/// A JSON-LD node classified by its declared `@type`.
#[derive(Debug)]
pub enum JsonLdEntity {
    Product(Value),
    Review(Value),
    Unrecognized(Value),
}

impl JsonLdEntity {
    pub fn classify(node: Value) -> Self {
        if type_matches(&node, "Product") {
            Self::Product(node)
        } else if type_matches(&node, "Review") {
            Self::Review(node)
        } else {
            Self::Unrecognized(node)
        }
    }
}

/// `@type` may be a plain string or an array of strings.
fn type_matches(node: &Value, expected: &str) -> bool {
    match node.get("@type") {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(items)) => items.iter().any(|t| t.as_str() == Some(expected)),
        _ => false,
    }
}

/// Product data lifted out of a JSON-LD `Product` node.
#[derive(Debug, Default, Clone)]
pub struct ExtractedProduct {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<VariantRecord>,
    /// Raw `material` strings from the node.
    pub materials: Vec<String>,
    /// `additionalProperty` name/value pairs that look material-related.
    pub extra_properties: BTreeMap<String, String>,
    pub raw: Value,
}

/// Free-text fabric/materials section found in the page body.
#[derive(Debug, Default, Clone)]
pub struct FabricSection {
    pub text: Option<String>,
    pub bullets: Vec<String>,
}

/// Everything extracted from one fetched page.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub product: Option<ExtractedProduct>,
    pub reviews: Vec<ReviewRecord>,
    pub fabric: Option<FabricSection>,
}

impl ExtractedPage {
    /// JSON object persisted into `products.materials`.
    pub fn materials_payload(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(fabric) = &self.fabric {
            if let Some(text) = &fabric.text {
                obj.insert("fabric_details_text".to_string(), json!(text));
            }
            if !fabric.bullets.is_empty() {
                obj.insert("bullets".to_string(), json!(fabric.bullets));
            }
        }
        if let Some(product) = &self.product {
            if !product.materials.is_empty() {
                obj.insert("jsonld_material".to_string(), json!(product.materials));
            }
            if !product.extra_properties.is_empty() {
                obj.insert("extra_properties".to_string(), json!(product.extra_properties));
            }
        }
        Value::Object(obj)
    }

    /// Mention texts for composition parsing, tagged with provenance
    /// ("html", "jsonld", "extra").
    pub fn material_mentions(&self) -> Vec<(String, &'static str)> {
        let mut out = Vec::new();
        if let Some(fabric) = &self.fabric {
            if let Some(text) = &fabric.text {
                out.push((text.clone(), "html"));
            }
            for bullet in &fabric.bullets {
                out.push((bullet.clone(), "html"));
            }
        }
        if let Some(product) = &self.product {
            for material in &product.materials {
                out.push((material.clone(), "jsonld"));
            }
            for (name, value) in &product.extra_properties {
                out.push((name.clone(), "extra"));
                if !value.is_empty() {
                    out.push((value.clone(), "extra"));
                }
            }
        }
        out
    }
}

/// Parses fetched HTML into an `ExtractedPage`.
pub struct PageExtractor {
    script_selector: Selector,
    microdata_review_selector: Selector,
    heading_selector: Selector,
    title_like_selector: Selector,
    list_item_selector: Selector,
    fabric_head: regex::Regex,
    fabric_hint: regex::Regex,
}

impl PageExtractor {
    pub fn new() -> Result<Self> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| anyhow!("Invalid selector {s}: {e}"))
        };
        Ok(Self {
            script_selector: parse(r#"script[type="application/ld+json"]"#)?,
            microdata_review_selector: parse(r#"[itemtype*="schema.org/Review"]"#)?,
            heading_selector: parse("h1, h2, h3, h4, h5, h6")?,
            title_like_selector: parse("strong, span, div")?,
            list_item_selector: parse("li")?,
            fabric_head: regex::Regex::new(
                r"(?i)^(fabric details|material details|materials?|fabric|dettagli del tessuto|tessuto|materiali|detalles del tejido|tejido|materiales|détails du tissu|tissu|mati(è|e)res?|materialien)$",
            )?,
            fabric_hint: regex::Regex::new(r"(?i)(fabric|tessut|material|tissu|tejid|composition|shell|lining)")?,
        })
    }

    /// Extract product, reviews, and fabric details from one page.
    pub fn extract(&self, html: &str, page_url: &str) -> ExtractedPage {
        let doc = Html::parse_document(html);

        let mut nodes = Vec::new();
        for script in doc.select(&self.script_selector) {
            let text: String = script.text().collect();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => flatten_nodes(value, &mut nodes),
                Err(e) => debug!("Skipping malformed JSON-LD block on {page_url}: {e}"),
            }
        }

        let mut page = ExtractedPage::default();
        for node in nodes {
            match JsonLdEntity::classify(node) {
                JsonLdEntity::Product(value) => {
                    for review_node in member_list(value.get("review")) {
                        page.reviews.push(map_review(review_node, "jsonld"));
                    }
                    if page.product.is_none() {
                        page.product = Some(self.map_product(&value));
                    }
                }
                JsonLdEntity::Review(value) => {
                    page.reviews.push(map_review(&value, "jsonld"));
                }
                JsonLdEntity::Unrecognized(_) => {}
            }
        }

        page.reviews.extend(self.microdata_reviews(&doc));
        page.fabric = self.fabric_section(&doc);
        page
    }

    fn map_product(&self, node: &Value) -> ExtractedProduct {
        let sku = string_field(node, "sku");
        let variants = member_list(node.get("offers"))
            .into_iter()
            .map(|offer| map_offer(offer, sku.as_deref()))
            .collect();

        ExtractedProduct {
            name: string_field(node, "name"),
            brand: name_of(node.get("brand")),
            description: string_field(node, "description"),
            category: string_field(node, "category"),
            images: image_list(node.get("image")),
            variants,
            materials: material_strings(node.get("material")),
            extra_properties: self.extra_properties(node),
            raw: node.clone(),
            sku,
        }
    }

    /// Keep `additionalProperty` pairs that either carry a value or whose
    /// name looks material-related.
    fn extra_properties(&self, node: &Value) -> BTreeMap<String, String> {
        let props = node
            .get("additionalProperty")
            .or_else(|| node.get("additionalProperties"));
        let mut out = BTreeMap::new();
        for prop in member_list(props) {
            let Some(name) = string_field(prop, "name") else {
                continue;
            };
            let value = string_field(prop, "value").unwrap_or_default();
            if !value.is_empty() || self.fabric_hint.is_match(&name) {
                out.insert(squash_ws(&name), squash_ws(&value));
            }
        }
        out
    }

    fn microdata_reviews(&self, doc: &Html) -> Vec<ReviewRecord> {
        doc.select(&self.microdata_review_selector)
            .map(|el| ReviewRecord {
                rating: itemprop_text(el, "ratingValue").and_then(|t| t.trim().parse().ok()),
                title: itemprop_text(el, "name"),
                body: itemprop_text(el, "reviewBody")
                    .or_else(|| itemprop_text(el, "description")),
                author: itemprop_text(el, "author"),
                lang: None,
                published_at: itemprop_text(el, "datePublished"),
                source: "microdata".to_string(),
                raw: Value::String(el.html()),
            })
            .collect()
    }

    /// Locate a fabric/materials heading and collect the section after it,
    /// stopping at the next heading or section break.
    fn fabric_section(&self, doc: &Html) -> Option<FabricSection> {
        let mut found = doc
            .select(&self.heading_selector)
            .find(|el| {
                let text = element_text(*el);
                self.fabric_head.is_match(&text) || self.fabric_hint.is_match(&text)
            });
        if found.is_none() {
            found = doc
                .select(&self.title_like_selector)
                .find(|el| self.fabric_head.is_match(&element_text(*el)));
        }
        let found = found?;

        let mut text_parts = Vec::new();
        let mut bullets = Vec::new();
        for sibling in found.next_siblings() {
            let Some(el) = ElementRef::wrap(sibling) else {
                continue;
            };
            let name = el.value().name();
            if matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section" | "hr") {
                break;
            }
            if name == "ul" || name == "ol" {
                for li in el.select(&self.list_item_selector) {
                    let text = element_text(li);
                    if !text.is_empty() && !bullets.contains(&text) {
                        bullets.push(text);
                    }
                }
            } else {
                let text = element_text(el);
                if !text.is_empty() {
                    text_parts.push(text);
                }
            }
        }

        let text = (!text_parts.is_empty()).then(|| squash_ws(&text_parts.join(" ")));
        if text.is_none() && bullets.is_empty() {
            None
        } else {
            Some(FabricSection { text, bullets })
        }
    }
}

/// Flatten top-level arrays and `@graph` containers into individual nodes.
fn flatten_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_nodes(item, out);
            }
        }
        Value::Object(mut obj) => {
            if let Some(graph) = obj.remove("@graph") {
                flatten_nodes(graph, out);
            }
            out.push(Value::Object(obj));
        }
        _ => {}
    }
}

/// A member that schema.org allows as a single object or an array of them.
fn member_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => Vec::new(),
    }
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A value that may be a plain string or an object with a `name`.
fn name_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        obj @ Value::Object(_) => string_field(obj, "name"),
        _ => None,
    }
}

/// Numbers arrive as JSON numbers or as strings; accept both.
fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn image_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items.iter().filter_map(image_url).collect(),
        Some(obj @ Value::Object(_)) => image_url(obj).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        obj @ Value::Object(_) => string_field(obj, "url"),
        _ => None,
    }
}

fn material_strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => {
            let t = squash_ws(s);
            if t.is_empty() { Vec::new() } else { vec![t] }
        }
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(squash_ws)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn map_offer(offer: &Value, product_sku: Option<&str>) -> VariantRecord {
    VariantRecord {
        variant_sku: string_field(offer, "sku").or_else(|| product_sku.map(str::to_string)),
        color: string_field(offer, "color"),
        size: string_field(offer, "size"),
        upc: string_field(offer, "gtin12"),
        ean: string_field(offer, "gtin13"),
        gtin: string_field(offer, "gtin").or_else(|| string_field(offer, "gtin14")),
        price: lenient_f64(offer.get("price")),
        currency: string_field(offer, "priceCurrency"),
        availability: string_field(offer, "availability"),
        raw: offer.clone(),
    }
}

fn map_review(node: &Value, source: &str) -> ReviewRecord {
    ReviewRecord {
        rating: lenient_f64(
            node.get("reviewRating")
                .and_then(|r| r.get("ratingValue"))
                .or_else(|| node.get("ratingValue")),
        ),
        title: string_field(node, "name"),
        body: string_field(node, "reviewBody").or_else(|| string_field(node, "description")),
        author: name_of(node.get("author")),
        lang: string_field(node, "inLanguage"),
        published_at: string_field(node, "datePublished"),
        source: source.to_string(),
        raw: node.clone(),
    }
}

fn itemprop_text(el: ElementRef<'_>, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"[itemprop="{prop}"]"#)).ok()?;
    let target = el.select(&selector).next()?;
    let content = target
        .value()
        .attr("content")
        .map(str::to_string)
        .unwrap_or_else(|| element_text(target));
    let content = squash_ws(&content);
    (!content.is_empty()).then_some(content)
}

fn element_text(el: ElementRef<'_>) -> String {
    squash_ws(&el.text().collect::<Vec<_>>().join(" "))
}
