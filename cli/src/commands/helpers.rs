use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutrify_core::models::{FoodRecord, PortionUnit};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Timestamp for a new record: the given date at the current wall-clock time.
pub(crate) fn logged_at(date_str: Option<String>) -> Result<NaiveDateTime> {
    let now = Local::now().naive_local();
    let date = parse_date(date_str)?;
    Ok(date.and_time(now.time()))
}

/// Parse an amount like "150g", "2 cups" or "1" into a quantity and unit.
/// A bare number counts as grams.
pub(crate) fn parse_amount(s: &str) -> Result<(f64, PortionUnit)> {
    let s = s.trim();
    let idx = s
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount '{s}'. Use '150g', '2 cups', '1 slice', etc."))?;
    if qty <= 0.0 {
        bail!("Amount must be greater than 0");
    }
    let unit = if unit_part.trim().is_empty() {
        PortionUnit::Gram
    } else {
        unit_part.parse()?
    };
    Ok((qty, unit))
}

pub(crate) fn print_records_table(records: &[FoodRecord]) {
    #[derive(Tabled)]
    struct RecordRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<RecordRow> = records
        .iter()
        .map(|r| RecordRow {
            id: short_id(&r.id),
            when: r.logged_at.format("%Y-%m-%d %H:%M").to_string(),
            meal: r.meal_type.clone(),
            description: truncate(&r.description(), 30),
            calories: format!("{:.0}", no_neg_zero(r.calories())),
            protein: format!("{:.1}g", no_neg_zero(r.protein())),
            carbs: format!("{:.1}g", no_neg_zero(r.carbs())),
            fat: format!("{:.1}g", no_neg_zero(r.fat())),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// First 8 characters of a UUID, enough to pass back to `delete`.
pub(crate) fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
