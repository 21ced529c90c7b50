//! Chat command parsing and dispatch
//!
//! A message like `!detail 1207658924` is parsed into a [`Command`], run
//! against the GOGDB API and answered with an [`Embed`].

use serde_json::Value;
use tracing::{debug, info};

use super::printer::{Embed, Printer};
use crate::gogdb::{GogdbApi, is_empty_result};

/// Keys shown as plain fields on the detail embed
const DETAIL_FIELDS: &[&str] = &[
    "inDevelopment",
    "averageRating",
    "isAvailableForSale",
    "isPreorder",
    "productType",
    "id",
    "globalReleaseDate",
];

/// Keys shown as ` | ` joined lists on the detail embed
const DETAIL_LIST_FIELDS: &[&str] = &["tags", "features", "developers", "publishers", "supportedOS"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// Free text search; everything after the command name
    Query(Option<String>),
    Detail(Option<String>),
    Price {
        id: Option<String>,
        countries: Vec<String>,
    },
    Discount(Option<String>),
    Changes(Option<String>),
}

impl Command {
    /// Parse a chat message. Returns `None` for anything that is not a known command.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        let mut words = rest.split_whitespace().map(str::to_string);

        let command = match name.to_lowercase().as_str() {
            "help" => Command::Help,
            "query" => Command::Query(Some(rest.to_string()).filter(|s| !s.is_empty())),
            "detail" => Command::Detail(words.next()),
            "price" => Command::Price {
                id: words.next(),
                countries: words.map(|w| w.to_lowercase()).collect(),
            },
            "discount" => Command::Discount(words.next()),
            "changes" => Command::Changes(words.next()),
            _ => return None,
        };
        Some(command)
    }
}

pub struct Dispatcher {
    api: GogdbApi,
    printer: Printer,
    prefix: String,
}

impl Dispatcher {
    pub fn new(api: GogdbApi, printer: Printer, prefix: impl Into<String>) -> Self {
        Self {
            api,
            printer,
            prefix: prefix.into(),
        }
    }

    /// Answer a chat message, or `None` when it is not addressed to the bot
    pub async fn handle(&self, content: &str) -> Option<Embed> {
        let Some(command) = Command::parse(&self.prefix, content) else {
            debug!(content, "Ignoring message");
            return None;
        };
        info!(?command, "Handling command");

        let embed = match command {
            Command::Help => self.help(),
            Command::Query(None) => self.lack_of_args("query [string]"),
            Command::Query(Some(text)) => self.query(&text).await,
            Command::Detail(None) => self.lack_of_args("detail [product id]"),
            Command::Detail(Some(id)) => self.detail(&id).await,
            Command::Price { id: None, .. } => self.lack_of_args("price [product id] [country code...]"),
            Command::Price {
                id: Some(id),
                countries,
            } => self.price(&id, &countries).await,
            Command::Discount(None) => self.lack_of_args("discount [product id]"),
            Command::Discount(Some(id)) => {
                let data = self.api.product_discount(&id).await;
                self.raw_document("Discount", &id, &data)
            }
            Command::Changes(None) => self.lack_of_args("changes [product id]"),
            Command::Changes(Some(id)) => {
                let data = self.api.product_changes(&id).await;
                self.raw_document("Changes", &id, &data)
            }
        };
        Some(embed)
    }

    fn lack_of_args(&self, usage: &str) -> Embed {
        Embed::new("Lack of Args!").with_description(format!("use **{}{}**", self.prefix, usage))
    }

    fn not_found(&self, what: &str) -> Embed {
        Embed::new(format!("Oops, something wrong, please check {}", what))
    }

    fn help(&self) -> Embed {
        let p = &self.prefix;
        let mut embed = self.printer.embed(
            "GOGDB Discord Bot",
            Some("Discord Bot powered by **GOG DataBase**\n\u{200b}".to_string()),
        );
        embed.add_field(format!("{}help", p), "Show this message\n\u{200b}", true);
        embed.add_field(
            format!("{}query [string]", p),
            "Query products with [string] in their names on GOG, the result format is as follows: \
             \n\u{200b}\n**[Product Name]**\n[product id]\n\u{200b}",
            false,
        );
        embed.add_field(format!("{}detail [product id]", p), "Display product detail\n\u{200b}", false);
        embed.add_field(
            format!("{}price [product id] [country code...]", p),
            "Display base prices, for every region or only the given ones\n\u{200b}",
            false,
        );
        embed.add_field(format!("{}discount [product id]", p), "Display discount data\n\u{200b}", false);
        embed.add_field(format!("{}changes [product id]", p), "Display change history\n\u{200b}", false);
        embed
    }

    async fn query(&self, text: &str) -> Embed {
        let result = self.api.query_products(text).await;
        if is_empty_result(&result) {
            return self.not_found("your input");
        }
        self.printer.query_result(&result)
    }

    async fn detail(&self, id: &str) -> Embed {
        let result = self.api.product_detail(id).await;
        if is_empty_result(&result) {
            return self.not_found("product id");
        }

        let title = result
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        let description = self.printer.links_markdown(&result);
        let mut embed = self.printer.embed(title, Some(description).filter(|d| !d.is_empty()));
        self.printer.generic_fields(&mut embed, &result, DETAIL_FIELDS, &[]);
        self.printer.list_fields(&mut embed, &result, DETAIL_LIST_FIELDS);
        self.printer.localization_fields(&mut embed, &result);
        self.printer.attach_images(&mut embed, &result);
        embed
    }

    async fn price(&self, id: &str, countries: &[String]) -> Embed {
        let documents = if countries.is_empty() {
            vec![self.api.product_price(id, "").await]
        } else {
            let countries: Vec<&str> = countries.iter().map(String::as_str).collect();
            self.api.product_prices(id, &countries).await
        };

        if documents.iter().all(is_empty_result) {
            return self.not_found("product id");
        }
        self.printer.price_result(&documents)
    }

    fn raw_document(&self, title: &str, id: &str, data: &Value) -> Embed {
        if is_empty_result(data) {
            return self.not_found("product id");
        }
        let mut embed = self.printer.embed(format!("{} for {}", title, id), None);
        match data {
            Value::Object(_) => self.printer.generic_fields(&mut embed, data, &[], &[]),
            Value::Array(items) if items.is_empty() => {
                embed.description = Some("Nothing recorded".to_string());
            }
            other => embed.description = Some(format!("```json\n{}\n```", other)),
        }
        embed
    }
}
