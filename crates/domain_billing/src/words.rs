//! Amount-in-words rendering for printed bills
//!
//! Totals are spelled out in the configured locale and wrapped in a
//! localized message carrying the currency name, for example
//! `Hai trăm mười nghìn tám trăm tám mươi đồng`.

use fluent::concurrent::FluentBundle;
use fluent::{FluentArgs, FluentResource};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use unic_langid::LanguageIdentifier;

use core_kernel::Money;

const VI_MESSAGES: &str = r#"
total-cost-text = { $words } { $currency ->
        [VND] đồng
        [USD] đô la Mỹ
        [EUR] euro
       *[other] { $currency }
    }
"#;

const EN_MESSAGES: &str = r#"
total-cost-text = { $words } { $currency ->
        [VND] dong
        [USD] US dollars
        [EUR] euros
       *[other] { $currency }
    }
"#;

type Bundle = FluentBundle<FluentResource>;

/// Parsed bundles, built on first use and shared afterwards
static VI_BUNDLE: OnceLock<Result<Bundle, String>> = OnceLock::new();
static EN_BUNDLE: OnceLock<Result<Bundle, String>> = OnceLock::new();

/// Language used for presentational text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Vi,
    En,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Locale::Vi => "vi",
            Locale::En => "en",
        }
    }

    fn messages(&self) -> &'static str {
        match self {
            Locale::Vi => VI_MESSAGES,
            Locale::En => EN_MESSAGES,
        }
    }

    fn bundle(&self) -> Result<&'static Bundle, String> {
        let cell = match self {
            Locale::Vi => &VI_BUNDLE,
            Locale::En => &EN_BUNDLE,
        };
        cell.get_or_init(|| build_bundle(*self)).as_ref().map_err(Clone::clone)
    }
}

fn build_bundle(locale: Locale) -> Result<Bundle, String> {
    let langid: LanguageIdentifier = locale
        .code()
        .parse()
        .map_err(|e| format!("invalid language identifier: {:?}", e))?;

    let resource = FluentResource::try_new(locale.messages().to_string())
        .map_err(|(_, errors)| format!("{:?}", errors))?;

    let mut bundle = FluentBundle::new_concurrent(vec![langid]);
    bundle.set_use_isolating(false);
    bundle
        .add_resource(resource)
        .map_err(|errors| format!("{:?}", errors))?;
    tracing::debug!(locale = %locale, "message bundle loaded");
    Ok(bundle)
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vi" | "vi-vn" => Ok(Locale::Vi),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            other => Err(format!("Unsupported locale: {}", other)),
        }
    }
}

/// Renders `amount` as capitalized words followed by the currency name
///
/// Only the whole part of the amount is spelled out.
pub fn total_cost_text(amount: &Money, locale: Locale) -> String {
    let whole = amount.round_to_currency().amount().trunc();
    let words = match whole.to_u64() {
        Some(value) => match locale {
            Locale::Vi => vietnamese_words(value),
            Locale::En => english_words(value),
        },
        None => whole.to_string(),
    };

    let text = match localize(locale, &words, amount.currency().code()) {
        Ok(text) => text,
        Err(message) => {
            tracing::error!(locale = %locale, error = %message, "failed to render amount in words");
            format!("{} {}", words, amount.currency().code())
        }
    };
    capitalize_first(&text)
}

fn localize(locale: Locale, words: &str, currency: &str) -> Result<String, String> {
    let bundle = locale.bundle()?;

    let pattern = bundle
        .get_message("total-cost-text")
        .and_then(|message| message.value())
        .ok_or_else(|| "message total-cost-text is missing".to_string())?;

    let mut args = FluentArgs::new();
    args.set("words", words.to_string());
    args.set("currency", currency.to_string());

    let mut errors = Vec::new();
    let text = bundle.format_pattern(pattern, Some(&args), &mut errors).into_owned();
    if !errors.is_empty() {
        return Err(format!("{:?}", errors));
    }
    Ok(text)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const VI_DIGITS: [&str; 10] = ["không", "một", "hai", "ba", "bốn", "năm", "sáu", "bảy", "tám", "chín"];

/// Vietnamese cardinal reading of `value`
pub fn vietnamese_words(value: u64) -> String {
    if value == 0 {
        return VI_DIGITS[0].to_string();
    }

    let groups = split_thousands(value);
    let mut parts: Vec<String> = Vec::new();

    for (index, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        // Once a higher group has been read, lower groups are read in full
        // ("một nghìn không trăm lẻ năm").
        let full = !parts.is_empty();
        parts.push(vietnamese_group(*group, full));
        let scale = vietnamese_scale(index);
        if !scale.is_empty() {
            parts.push(scale);
        }
    }

    parts.join(" ")
}

fn vietnamese_group(group: u64, full: bool) -> String {
    let hundreds = (group / 100) as usize;
    let tens = ((group / 10) % 10) as usize;
    let units = (group % 10) as usize;
    let mut words: Vec<&str> = Vec::new();

    let read_hundreds = hundreds > 0 || full;
    if read_hundreds {
        words.push(VI_DIGITS[hundreds]);
        words.push("trăm");
    }

    match tens {
        0 => {
            if units > 0 {
                if read_hundreds {
                    words.push("lẻ");
                }
                words.push(VI_DIGITS[units]);
            }
        }
        1 => {
            words.push("mười");
            match units {
                0 => {}
                5 => words.push("lăm"),
                _ => words.push(VI_DIGITS[units]),
            }
        }
        _ => {
            words.push(VI_DIGITS[tens]);
            words.push("mươi");
            match units {
                0 => {}
                1 => words.push("mốt"),
                4 => words.push("tư"),
                5 => words.push("lăm"),
                _ => words.push(VI_DIGITS[units]),
            }
        }
    }

    words.join(" ")
}

fn vietnamese_scale(index: usize) -> String {
    let base = match index % 3 {
        1 => "nghìn",
        2 => "triệu",
        _ => "",
    };
    let billions = vec!["tỷ"; index / 3];
    std::iter::once(base)
        .filter(|word| !word.is_empty())
        .chain(billions)
        .collect::<Vec<_>>()
        .join(" ")
}

const EN_ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const EN_TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const EN_SCALES: [&str; 7] = [
    "", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion",
];

/// English cardinal reading of `value`
pub fn english_words(value: u64) -> String {
    if value == 0 {
        return EN_ONES[0].to_string();
    }

    let groups = split_thousands(value);
    let mut parts: Vec<String> = Vec::new();
    for (index, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        parts.push(english_group(*group));
        if !EN_SCALES[index].is_empty() {
            parts.push(EN_SCALES[index].to_string());
        }
    }
    parts.join(" ")
}

fn english_group(group: u64) -> String {
    let hundreds = (group / 100) as usize;
    let rest = (group % 100) as usize;
    let mut words = Vec::new();

    if hundreds > 0 {
        words.push(format!("{} hundred", EN_ONES[hundreds]));
    }
    if rest > 0 {
        if rest < 20 {
            words.push(EN_ONES[rest].to_string());
        } else if rest % 10 == 0 {
            words.push(EN_TENS[rest / 10].to_string());
        } else {
            words.push(format!("{}-{}", EN_TENS[rest / 10], EN_ONES[rest % 10]));
        }
    }
    words.join(" ")
}

/// Splits into base-1000 groups, least significant first
fn split_thousands(mut value: u64) -> Vec<u64> {
    let mut groups = Vec::new();
    while value > 0 {
        groups.push(value % 1000);
        value /= 1000;
    }
    groups
}
