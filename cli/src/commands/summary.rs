use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutrify_core::service::NutrifyService;

use super::helpers::{no_neg_zero, parse_date, short_id};

pub(crate) fn cmd_summary(svc: &NutrifyService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let summary = svc.daily_summary(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.records.is_empty() {
        let date = &summary.date;
        eprintln!("No records for {date}");
        process::exit(2);
    }

    let date = &summary.date;
    println!("=== {date} ===\n");

    for meal in nutrify_core::models::MEAL_TYPES {
        let records: Vec<_> = summary
            .records
            .iter()
            .filter(|r| r.meal_type == *meal)
            .collect();
        if records.is_empty() {
            continue;
        }
        let sub_cal: f64 = records.iter().map(|r| r.calories()).sum();
        let meal_label = meal.to_uppercase();
        println!("  {meal_label} ({sub_cal:.0} kcal)");
        for r in records {
            let id = short_id(&r.id);
            let time = r.logged_at.format("%H:%M");
            let desc = r.description();
            let cal = r.calories();
            let protein = r.protein();
            let carbs = r.carbs();
            let fat = r.fat();
            println!(
                "    [{id}] {time} {desc}: {cal:.0} kcal | P:{protein:.0}g C:{carbs:.0}g F:{fat:.0}g"
            );
        }
        println!();
    }

    let t = &summary.totals;
    let g = &summary.targets;
    println!(
        "  TOTAL: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g Fiber:{:.0}g",
        t.calories, t.protein, t.carbs, t.fat, t.fiber
    );
    println!(
        "  TARGET: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        g.calories, g.protein_g, g.carbs_g, g.fat_g
    );
    println!(
        "  REMAINING: {:.0} kcal ({:.0}% of target eaten)",
        summary.calories_remaining, summary.percent_of_calorie_target
    );
    let mark = |ok: bool| if ok { "met" } else { "not met" };
    println!(
        "  Calorie goal {}, protein goal {}",
        mark(summary.meets_calorie_goal),
        mark(summary.meets_protein_goal)
    );

    Ok(())
}

pub(crate) fn cmd_history(svc: &NutrifyService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Records")]
        records: usize,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let today = Local::now().date_naive();
    let mut history = svc.history(days, today)?;
    history.reverse();

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.iter().all(|d| d.record_count == 0) {
        eprintln!("No records in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|d| HistoryRow {
            date: d.date.to_string(),
            records: d.record_count,
            calories: format!("{:.0}", no_neg_zero(d.totals.calories)),
            protein: format!("{:.0}g", no_neg_zero(d.totals.protein)),
            carbs: format!("{:.0}g", no_neg_zero(d.totals.carbs)),
            fat: format!("{:.0}g", no_neg_zero(d.totals.fat)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_stats(svc: &NutrifyService, json: bool) -> Result<()> {
    let stats = svc.user_stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if stats.total_records == 0 {
        eprintln!("No records yet");
        process::exit(2);
    }

    println!("Records:         {}", stats.total_records);
    println!("Days logged:     {}", stats.days_with_records);
    println!("Total calories:  {:.0} kcal", stats.total_calories);
    println!("Total protein:   {:.0} g", stats.total_protein);
    println!("Total fiber:     {:.0} g", stats.total_fiber);
    println!(
        "Daily average:   {:.0} kcal per logged day",
        stats.average_daily_calories
    );
    Ok(())
}
