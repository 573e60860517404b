// Column-name and label helpers shared by the loader and the planner

use nom::{
    bytes::complete::take_till,
    character::complete::digit1,
    combinator::map_res,
    sequence::preceded,
    IResult,
};
use std::cmp::Ordering;

/// Turn a column name into a display label: underscores become spaces and
/// every word is capitalized ("conversion_rate" -> "Conversion Rate").
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_cased = false;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}

fn ordinal_token(input: &str) -> IResult<&str, u64> {
    preceded(
        take_till(|c: char| c.is_ascii_digit()),
        map_res(digit1, |digits: &str| digits.parse::<u64>()),
    )(input)
}

/// Extract the first run of digits embedded in a label ("Week 12" -> 12).
pub fn embedded_ordinal(label: &str) -> Option<u64> {
    ordinal_token(label).ok().map(|(_, n)| n)
}

/// Compare two labels by their embedded ordinal; labels without one sort last.
pub fn cmp_ordinal(a: &str, b: &str) -> Ordering {
    match (embedded_ordinal(a), embedded_ordinal(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Whether a group-by column name refers to week labels.
pub fn is_week_column(name: &str) -> bool {
    name.eq_ignore_ascii_case("week")
}

/// Whether a column name carries a standalone `date` word
/// ("order_date", "Date", "shipDate"; not "candidate").
pub fn has_date_token(name: &str) -> bool {
    name_tokens(name).iter().any(|t| t == "date")
}

fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
