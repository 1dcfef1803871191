use anyhow::{Context, Result};
use std::path::Path;
use std::process;

use nutrify_core::analysis::SimulatedAnalyzer;
use nutrify_core::models::{FoodCategory, FoodPortion, FoodRecord, RecordKind};
use nutrify_core::service::NutrifyService;

use super::helpers::{json_error, logged_at, parse_amount, print_records_table, short_id};

/// Nutrients for one unit of the logged amount (per gram for "150g").
pub(crate) struct PortionArgs {
    pub description: String,
    pub amount: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub category: Option<FoodCategory>,
}

pub(crate) fn cmd_log(
    svc: &NutrifyService,
    portion: PortionArgs,
    meal: &str,
    notes: Option<&str>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let (quantity, unit) = parse_amount(&portion.amount)?;
    let portion = FoodPortion {
        description: portion.description,
        quantity,
        unit,
        category: portion.category,
        calories_per_unit: portion.calories,
        protein_per_unit: portion.protein,
        carbs_per_unit: portion.carbs,
        fat_per_unit: portion.fat,
        fiber_per_unit: portion.fiber,
    };
    let record = svc.log_manual(meal, vec![portion], notes.unwrap_or(""), logged_at(date)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_logged(&record);
    }
    Ok(())
}

pub(crate) fn cmd_analyze(
    svc: &NutrifyService,
    image: &Path,
    meal: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    let record = svc.analyze_and_log(&SimulatedAnalyzer, &bytes, meal, logged_at(date)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    print_logged(&record);
    if let RecordKind::Ai { analysis, .. } = &record.kind {
        println!("  {}", record.summary_line());
        if analysis.is_low_confidence() {
            eprintln!("Note: low confidence estimate. Consider logging this meal manually.");
        }
    }
    Ok(())
}

fn print_logged(record: &FoodRecord) {
    println!(
        "Logged [{}] {} for {}: {:.0} kcal | P:{:.1}g C:{:.1}g F:{:.1}g Fiber:{:.1}g",
        short_id(&record.id),
        record.description(),
        record.meal_type,
        record.calories(),
        record.protein(),
        record.carbs(),
        record.fat(),
        record.fiber(),
    );
}

pub(crate) fn cmd_delete(svc: &NutrifyService, id: &str, json: bool) -> Result<()> {
    if let Some(full_id) = svc.resolve_record_id(id)? {
        if svc.delete_record(&full_id)? {
            if json {
                println!("{}", serde_json::json!({ "deleted": full_id }));
            } else {
                println!("Deleted record {}", short_id(&full_id));
            }
            return Ok(());
        }
    }

    if json {
        println!("{}", json_error(&format!("Record {id} not found")));
    } else {
        eprintln!("Record {id} not found");
    }
    process::exit(2);
}

pub(crate) fn cmd_recent(
    svc: &NutrifyService,
    limit: usize,
    meal: Option<&str>,
    json: bool,
) -> Result<()> {
    let records = match meal {
        Some(meal) => {
            let mut records = svc.records_by_meal_type(meal)?;
            records.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
            records.truncate(limit);
            records
        }
        None => svc.recent_records(limit)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        eprintln!("No records yet. Use `nutrify log` or `nutrify analyze` to add one.");
        process::exit(2);
    }
    print_records_table(&records);
    Ok(())
}
