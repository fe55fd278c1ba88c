//! Message rendering shared by notification channels.

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::config::HashtagRule;
use crate::filters::FilterError;

/// Marker appended to a truncated product name.
pub const TRUNCATION_MARKER: char = '…';

/// Smallest compact message budget accepted from configuration. Shop, price
/// and URL have to fit without touching them.
pub const MIN_COMPACT_LENGTH: usize = 100;

/// Renders a price the way shoppers read it: `999.99€`, `$999.99`, `CHF999.99`.
pub fn format_price(value: f64, currency: &str) -> String {
    match currency {
        "EUR" => format!("{:.2}€", value),
        "USD" => format!("${:.2}", value),
        other => format!("{}{:.2}", other, value),
    }
}

/// Compact `1h2m3s` rendering, truncated to whole seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m{}s", minutes, seconds),
        _ => format!("{}h{}m{}s", hours, minutes, seconds),
    }
}

/// Hex SHA-256 of a rendered message.
pub fn content_hash(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Ordered hashtag rules matched against the lowercased product name.
#[derive(Debug, Default, Clone)]
pub struct Hashtags {
    rules: Vec<(Regex, String)>,
}

impl Hashtags {
    pub fn new(rules: &[HashtagRule]) -> Result<Self, FilterError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| (regex, rule.value.clone()))
                    .map_err(|source| FilterError {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// First matching rule's value, or an empty string.
    pub fn for_product(&self, product_name: &str) -> &str {
        let name = product_name.to_lowercase();
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(&name))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }
}

/// Fields every "available" announcement is rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement<'a> {
    pub shop_name: &'a str,
    pub product_name: &'a str,
    pub price: f64,
    pub currency: &'a str,
    pub url: &'a str,
}

fn compact_line(a: &Announcement<'_>, name: &str, hashtags: &str, counter: i32) -> String {
    let mut message = format!(
        "{}: {} for {} is available at {}",
        a.shop_name,
        name,
        format_price(a.price, a.currency),
        a.url
    );
    if !hashtags.is_empty() {
        message.push(' ');
        message.push_str(hashtags);
    }
    if counter > 1 {
        message.push_str(&format!(" ({})", counter));
    }
    message
}

/// Single-line announcement fitted into `max_length` characters.
///
/// Only the product name is shortened; the rest of the line is kept intact.
/// Lengths count Unicode scalar values.
pub fn render_compact(
    announcement: &Announcement<'_>,
    hashtags: &str,
    counter: i32,
    max_length: usize,
) -> String {
    let message = compact_line(announcement, announcement.product_name, hashtags, counter);
    if message.chars().count() <= max_length {
        return message;
    }

    let fixed = compact_line(announcement, "", hashtags, counter).chars().count();
    // Without room for the name the rest of the line stays whole, even if
    // that overshoots the budget
    let budget = max_length.saturating_sub(fixed + 1);

    let mut name: String = announcement.product_name.chars().take(budget).collect();
    name.push(TRUNCATION_MARKER);
    compact_line(announcement, &name, hashtags, counter)
}

/// Multi-line Markdown announcement used by Telegram.
pub fn render_telegram(announcement: &Announcement<'_>, at: DateTime<Utc>) -> String {
    format!(
        "*Name:* {}\n*Retailer:* {}\n*Price:* {}\n*URL*: [go to website]({})\n*Date/Time:* {}",
        announcement.product_name,
        announcement.shop_name,
        format_price(announcement.price, announcement.currency),
        announcement.url,
        at.format("%Y-%m-%d %H:%M:%S (%z)")
    )
}

/// Reply closing a thread.
pub fn render_gone(elapsed: Duration) -> String {
    format!("And it's gone ({})", format_elapsed(elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn announcement<'a>(name: &'a str) -> Announcement<'a> {
        Announcement {
            shop_name: "ldlc.com",
            product_name: name,
            price: 699.99,
            currency: "EUR",
            url: "https://www.ldlc.com/fiche/PB00385181.html",
        }
    }

    #[test]
    fn formats_prices_per_currency() {
        assert_eq!(format_price(999.99, "EUR"), "999.99€");
        assert_eq!(format_price(999.99, "USD"), "$999.99");
        assert_eq!(format_price(999.99, "CHF"), "CHF999.99");
        assert_eq!(format_price(999.0, ""), "999.00");
    }

    #[test]
    fn formats_elapsed_compactly() {
        assert_eq!(format_elapsed(Duration::from_millis(4_900)), "4s");
        assert_eq!(format_elapsed(Duration::from_secs(62)), "1m2s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_elapsed(Duration::from_secs(90_000)), "25h0m0s");
    }

    #[test]
    fn hashtags_use_first_matching_rule() {
        let hashtags = Hashtags::new(&[
            HashtagRule {
                pattern: "rtx 3080 ti".to_string(),
                value: "#nvidia #rtx3080ti".to_string(),
            },
            HashtagRule {
                pattern: "rtx 3080".to_string(),
                value: "#nvidia #rtx3080".to_string(),
            },
        ])
        .unwrap();

        assert_eq!(hashtags.for_product("MSI RTX 3080 Ti"), "#nvidia #rtx3080ti");
        assert_eq!(hashtags.for_product("MSI RTX 3080"), "#nvidia #rtx3080");
        assert_eq!(hashtags.for_product("RX 6800"), "");
    }

    #[test]
    fn renders_compact_message_with_counter() {
        let a = announcement("MSI RTX 3080 GAMING X TRIO");
        assert_eq!(
            render_compact(&a, "#rtx3080", 0, 280),
            "ldlc.com: MSI RTX 3080 GAMING X TRIO for 699.99€ is available at https://www.ldlc.com/fiche/PB00385181.html #rtx3080"
        );
        assert!(render_compact(&a, "", 3, 280).ends_with(".html (3)"));
    }

    #[test]
    fn truncates_only_the_product_name() {
        let long_name = "Gigabyte GeForce RTX 3080 ".repeat(20);
        let a = announcement(&long_name);

        let message = render_compact(&a, "#rtx3080", 2, 280);

        assert_eq!(message.chars().count(), 280);
        assert!(message.starts_with("ldlc.com: Gigabyte GeForce"));
        assert!(message.contains("… for 699.99€ is available at"));
        assert!(message.ends_with("#rtx3080 (2)"));
    }

    #[test]
    fn truncation_keeps_fixed_parts_stable() {
        let base = "é".repeat(400);
        let shorter = "é".repeat(399);
        let long = render_compact(&announcement(&base), "", 0, 120);
        let short = render_compact(&announcement(&shorter), "", 0, 120);

        assert_eq!(long, short);
        assert!(long.chars().count() <= 120);
        assert_eq!(long, render_compact(&announcement(&base), "", 0, 120));
    }

    #[test]
    fn tiny_budget_never_cuts_the_url() {
        let a = announcement("MSI GeForce RTX 3080 Gaming X Trio");

        let message = render_compact(&a, "#rtx3080", 2, 40);

        assert_eq!(
            message,
            "ldlc.com: … for 699.99€ is available at https://www.ldlc.com/fiche/PB00385181.html #rtx3080 (2)"
        );
    }

    #[test]
    fn renders_telegram_template() {
        let at = Utc.with_ymd_and_hms(2021, 5, 22, 10, 30, 0).unwrap();
        let message = render_telegram(&announcement("RTX 3080"), at);

        assert_eq!(
            message,
            "*Name:* RTX 3080\n*Retailer:* ldlc.com\n*Price:* 699.99€\n*URL*: [go to website](https://www.ldlc.com/fiche/PB00385181.html)\n*Date/Time:* 2021-05-22 10:30:00 (+0000)"
        );
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        let hash = content_hash("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
