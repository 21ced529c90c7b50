//! Turns GOGDB JSON documents into chat embeds
//!
//! Nothing here talks to the network; every function maps a JSON value onto
//! an [`Embed`].

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_COLOR: u32 = 0x78387b;

/// Placeholder for values the API left out
const NOT_AVAILABLE: &str = "N/A";

/// Longest text a single embed field value may carry
const FIELD_VALUE_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footer {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl Footer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            icon_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A rich chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Embed {
    /// Bare embed without author or footer
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            color: DEFAULT_COLOR,
            timestamp: Utc::now(),
            author: None,
            footer: None,
            fields: Vec::new(),
            image: None,
            thumbnail: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        let mut value: String = value.into();
        if value.is_empty() {
            value = NOT_AVAILABLE.to_string();
        }
        if value.chars().count() > FIELD_VALUE_LIMIT {
            value = value.chars().take(FIELD_VALUE_LIMIT - 3).collect::<String>() + "...";
        }
        self.fields.push(EmbedField {
            name: name.into(),
            value,
            inline,
        });
    }
}

#[cfg(test)]
impl Embed {
    pub fn field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// `isAvailableForSale` -> `Is Available For Sale`
pub fn key_to_words(key: &str) -> String {
    static CAPITAL: OnceLock<Regex> = OnceLock::new();
    let re = CAPITAL.get_or_init(|| Regex::new(r"([A-Z][A-Za-z0-9])").unwrap());
    let spaced = re.replace_all(key, " $1");

    // Title-case: first letter of each alphabetic run upper, the rest lower
    let mut out = String::with_capacity(spaced.len());
    let mut prev_letter = false;
    for c in spaced.trim().chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Render a JSON value the way it should read in a field
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => NOT_AVAILABLE.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn str_at<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Builds embeds carrying the bot's author and footer
#[derive(Debug, Clone)]
pub struct Printer {
    author: Option<Author>,
    footer: Footer,
}

impl Printer {
    pub fn new(footer: Footer) -> Self {
        Self {
            author: None,
            footer,
        }
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    pub fn embed(&self, title: impl Into<String>, description: Option<String>) -> Embed {
        let mut embed = Embed::new(title);
        embed.description = description;
        embed.author = self.author.clone();
        embed.footer = Some(self.footer.clone());
        embed
    }

    /// One field per key of `data`. A non-empty `only` restricts the keys,
    /// otherwise a non-empty `exclude` removes keys.
    pub fn generic_fields(&self, embed: &mut Embed, data: &Value, only: &[&str], exclude: &[&str]) {
        let Some(map) = data.as_object() else {
            return;
        };
        for (key, value) in map {
            let wanted = if !only.is_empty() {
                only.contains(&key.as_str())
            } else {
                !exclude.contains(&key.as_str())
            };
            if wanted {
                embed.add_field(key_to_words(key), value_text(value), true);
            }
        }
    }

    /// One field per listed key holding a non-empty list, items joined with ` | `
    pub fn list_fields(&self, embed: &mut Embed, data: &Value, keys: &[&str]) {
        let Some(map) = data.as_object() else {
            return;
        };
        for (key, value) in map {
            if !keys.contains(&key.as_str()) {
                continue;
            }
            let Some(items) = value.as_array().filter(|items| !items.is_empty()) else {
                continue;
            };
            let joined = items.iter().map(value_text).collect::<Vec<_>>().join(" | ");
            embed.add_field(key_to_words(key), joined, true);
        }
    }

    pub fn query_result(&self, data: &Value) -> Embed {
        let count = data.get("count").map(value_text).unwrap_or_else(|| "0".to_string());
        let mut embed = self.embed(
            "Query Result",
            Some(format!("**{}** productions found", count)),
        );

        let products = data.get("products").and_then(Value::as_array);
        for product in products.into_iter().flatten() {
            let title = str_at(product, "title").unwrap_or(NOT_AVAILABLE);
            let id = product.get("id").map(value_text).unwrap_or_default();
            embed.add_field(title, id, false);
        }
        embed
    }

    /// Store, forum and support links as markdown
    pub fn links_markdown(&self, data: &Value) -> String {
        let Some(links) = data.get("links") else {
            return String::new();
        };

        let mut md = String::new();
        for (key, label) in [("store", "Store"), ("forum", "Forum"), ("support", "Support")] {
            if let Some(url) = str_at(links, key) {
                md.push_str(&format!("[[{}]({})] ", label, url));
            }
        }
        md
    }

    /// Cover image from the `image` template and box art thumbnail
    pub fn attach_images(&self, embed: &mut Embed, data: &Value) {
        if let Some(image) = data.get("image") {
            if let Some(href) = str_at(image, "href") {
                let formatter = image
                    .get("formatters")
                    .and_then(Value::as_array)
                    .and_then(|f| f.last())
                    .and_then(Value::as_str)
                    .map(|f| f.replace("_2x", ""))
                    .unwrap_or_default();
                embed.image = Some(href.replace("{formatter}", &formatter));
            }
        }

        if let Some(box_art) = data.get("links").and_then(|links| str_at(links, "boxArtImage")) {
            embed.thumbnail = Some(box_art.to_string());
        }
    }

    /// Languages grouped by localization type (audio, text, ...)
    pub fn localization_fields(&self, embed: &mut Embed, data: &Value) {
        let Some(localizations) = data.get("localizations").and_then(Value::as_array) else {
            return;
        };

        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for loc in localizations {
            let kind = str_at(loc, "type").unwrap_or("other").to_string();
            let Some(name) = str_at(loc, "name").or_else(|| str_at(loc, "code")) else {
                continue;
            };
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, names)) => names.push(name.to_string()),
                None => groups.push((kind, vec![name.to_string()])),
            }
        }

        for (kind, names) in groups {
            embed.add_field(
                format!("{} Localizations", key_to_words(&kind)),
                names.join(" | "),
                false,
            );
        }
    }

    /// Base prices gathered from one or more price documents
    pub fn price_result(&self, documents: &[Value]) -> Embed {
        let title = documents
            .iter()
            .find_map(|doc| str_at(doc, "title"))
            .unwrap_or("Price");
        let mut embed = self.embed(title, None);

        for doc in documents {
            let entries = doc.get("baseprice").and_then(Value::as_array);
            for entry in entries.into_iter().flatten() {
                let country = str_at(entry, "country").unwrap_or(NOT_AVAILABLE);
                let price = entry.get("price").map(value_text).unwrap_or_default();
                let currency = str_at(entry, "currency").unwrap_or_default();
                embed.add_field(country, format!("{} {}", price, currency).trim().to_string(), true);
            }
        }

        if embed.fields.is_empty() {
            embed.description = Some("No price data".to_string());
        }
        embed
    }
}
