use anyhow::{Result, bail};
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutrify_core::calculator::{MacroSplit, Trend, goal_macro_split};
use nutrify_core::models::Goal;
use nutrify_core::service::NutrifyService;

pub(crate) fn cmd_bmi(svc: &NutrifyService, json: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let report = svc.bmi_report(today)?;
    let body_fat = svc.body_fat(today)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "report": report, "body_fat_pct": body_fat })
        );
        return Ok(());
    }

    println!("BMI:          {:.2} ({})", report.bmi, report.category);
    println!("Health risk:  {}", report.risk.label());
    println!(
        "Ideal weight: {:.1} to {:.1} kg",
        report.ideal_min_kg, report.ideal_max_kg
    );
    if report.kg_below_range > 0.0 {
        println!("              {:.1} kg below the range", report.kg_below_range);
    } else if report.kg_above_range > 0.0 {
        println!("              {:.1} kg above the range", report.kg_above_range);
    }
    println!("Body fat:     {body_fat:.1}% (estimated)");
    Ok(())
}

pub(crate) fn cmd_bmi_history(svc: &NutrifyService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct BmiRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        weight: String,
        #[tabled(rename = "BMI")]
        bmi: String,
        #[tabled(rename = "Category")]
        category: String,
    }

    let history = svc.bmi_history()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        eprintln!("No BMI history. It is recorded when your weight or height changes.");
        process::exit(2);
    }

    let rows: Vec<BmiRow> = history
        .iter()
        .map(|e| BmiRow {
            date: e.date.to_string(),
            weight: format!("{:.1}", e.weight_kg),
            bmi: format!("{:.2}", e.bmi),
            category: e.category.clone(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_bmr(svc: &NutrifyService, body_fat: Option<f64>, json: bool) -> Result<()> {
    if let Some(bf) = body_fat {
        if !(0.0..100.0).contains(&bf) {
            bail!("Body fat must be between 0 and 100");
        }
    }
    let today = Local::now().date_naive();
    let summary = svc.bmr_summary(body_fat, today);
    let daily = svc.daily_calories(today);

    if json {
        println!(
            "{}",
            serde_json::json!({ "bmr": summary, "daily_calories": daily })
        );
        return Ok(());
    }

    println!("Mifflin-St Jeor:  {:.0} kcal", summary.mifflin_st_jeor);
    println!("Harris-Benedict:  {:.0} kcal", summary.harris_benedict);
    if let Some(k) = summary.katch_mcardle {
        println!("Katch-McArdle:    {k:.0} kcal");
    }
    println!("Average:          {:.0} kcal", summary.average);
    println!("Recommended BMR:  {:.0} kcal", summary.recommended);
    println!("Daily calories:   {daily:.0} kcal (activity and goal adjusted)");
    Ok(())
}

pub(crate) fn cmd_targets(svc: &NutrifyService, split: Option<MacroSplit>, json: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let (targets, ratio) = match split {
        Some(s) => (svc.macro_targets(s, today), s.ratio()),
        None => (
            svc.goal_macro_targets(today),
            goal_macro_split(svc.current_user().goal),
        ),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    let label = split.map_or_else(
        || format!("for goal: {}", svc.current_user().goal),
        |s| format!("{s:?} split"),
    );
    println!("Daily targets ({label}):");
    println!("  Calories: {:.0} kcal", targets.calories);
    println!(
        "  Protein:  {:.0} g ({:.0}%)",
        targets.protein_g,
        ratio.protein * 100.0
    );
    println!(
        "  Carbs:    {:.0} g ({:.0}%)",
        targets.carbs_g,
        ratio.carbs * 100.0
    );
    println!("  Fat:      {:.0} g ({:.0}%)", targets.fat_g, ratio.fat * 100.0);
    Ok(())
}

pub(crate) fn cmd_goal_calories(svc: &NutrifyService, goal: Goal, rate: f64, json: bool) -> Result<()> {
    let calories = svc.goal_calories(goal, rate, Local::now().date_naive())?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "goal": goal, "rate_kg_per_week": rate, "calories": calories })
        );
    } else if goal == Goal::MaintainWeight {
        println!("{calories:.0} kcal/day to maintain weight");
    } else {
        println!("{calories:.0} kcal/day to {goal} at {rate} kg/week");
    }
    Ok(())
}

pub(crate) fn cmd_water(svc: &NutrifyService, hot: bool, json: bool) -> Result<()> {
    let water = svc.water(hot);
    if json {
        println!("{}", serde_json::to_string_pretty(&water)?);
    } else {
        println!("Base intake:        {:.2} L/day", water.base_liters);
        let climate = if hot { ", hot climate" } else { "" };
        println!(
            "Recommended intake: {:.2} L/day ({}{climate})",
            water.recommended_liters,
            svc.current_user().activity_level
        );
    }
    Ok(())
}

pub(crate) fn cmd_progress(svc: &NutrifyService, days: u32, json: bool) -> Result<()> {
    let report = match svc.progress(days, Local::now().date_naive()) {
        Ok(r) => r,
        Err(e) if svc.recent_records(1)?.is_empty() => {
            log::debug!("progress unavailable: {e:#}");
            eprintln!("No records to analyze yet");
            process::exit(2);
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== Last {} days ===\n", report.days);
    println!(
        "  Calories:    {:.0} kcal/day ({:.0}% of target)",
        report.average_calories, report.calories_pct_of_target
    );
    println!(
        "  Protein:     {:.0} g/day ({:.0}% of target)",
        report.average_protein, report.protein_pct_of_target
    );
    println!("  Consistency: {:.0}% of days logged", report.consistency_pct);
    println!("  Variety:     {} distinct foods", report.food_variety);

    if let Some(trends) = &report.trends {
        let trend = match trends.trend {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
            Trend::InsufficientData => "not enough data",
        };
        println!("  Trend:       {trend}");
        println!("  Variation:   {:.0}% day to day", trends.variation_pct);
    }

    println!();
    for rec in &report.recommendations {
        println!("  - {rec}");
    }
    Ok(())
}
