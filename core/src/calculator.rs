//! Closed-form nutrition formulas.
//!
//! Everything here is pure: no storage, no clock. Callers pass `today` when
//! an age has to be derived from a birth date.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{ActivityLevel, FoodRecord, Goal, MacronutrientTargets, Sex, User};

pub const KCAL_PER_G_PROTEIN: f64 = 4.0;
pub const KCAL_PER_G_CARBS: f64 = 4.0;
pub const KCAL_PER_G_FAT: f64 = 9.0;
pub const KCAL_PER_KG_FAT: f64 = 7700.0;
pub const DEFAULT_AGE: u32 = 30;
const WATER_ML_PER_KG: f64 = 35.0;
const TREND_WINDOW: usize = 7;

#[must_use]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Inputs shared by the energy formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyProfile {
    pub weight_kg: f64,
    pub height_m: f64,
    pub age: u32,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
}

impl BodyProfile {
    /// Snapshot of a user's body data, aged as of `today`.
    #[must_use]
    pub fn from_user(user: &User, today: NaiveDate) -> Self {
        Self {
            weight_kg: user.weight_kg,
            height_m: user.height_m,
            age: user.birth_date.map_or(DEFAULT_AGE, |b| age_on(b, today)),
            sex: user.sex,
            activity_level: user.activity_level,
            goal: user.goal,
        }
    }
}

/// Whole years between `birth` and `today`, 0 when `birth` is in the future.
#[must_use]
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    today.years_since(birth).unwrap_or(0)
}

#[must_use]
pub fn activity_factor(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Intense => 1.725,
        ActivityLevel::VeryIntense => 1.9,
    }
}

#[must_use]
pub fn goal_adjustment(goal: Goal) -> f64 {
    match goal {
        Goal::LoseWeight => 0.85,
        Goal::MaintainWeight => 1.0,
        Goal::GainWeight => 1.15,
    }
}

// --- Basal metabolic rate ---

#[must_use]
pub fn bmr_mifflin_st_jeor(weight_kg: f64, height_m: f64, age: u32, sex: Sex) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * (height_m * 100.0) - 5.0 * f64::from(age);
    match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
        Sex::Other => base + (5.0 - 161.0) / 2.0,
    }
}

#[must_use]
pub fn bmr_harris_benedict(weight_kg: f64, height_m: f64, age: u32, sex: Sex) -> f64 {
    let height_cm = height_m * 100.0;
    let age = f64::from(age);
    let male = 88.362 + 13.397 * weight_kg + 4.799 * height_cm - 5.677 * age;
    let female = 447.593 + 9.247 * weight_kg + 3.098 * height_cm - 4.330 * age;
    match sex {
        Sex::Male => male,
        Sex::Female => female,
        Sex::Other => f64::midpoint(male, female),
    }
}

#[must_use]
pub fn bmr_katch_mcardle(weight_kg: f64, body_fat_pct: f64) -> f64 {
    let lean_mass = weight_kg * (1.0 - body_fat_pct / 100.0);
    370.0 + 21.6 * lean_mass
}

#[must_use]
pub fn daily_calories(profile: &BodyProfile) -> f64 {
    let bmr = bmr_mifflin_st_jeor(profile.weight_kg, profile.height_m, profile.age, profile.sex);
    round2(bmr * activity_factor(profile.activity_level) * goal_adjustment(profile.goal))
}

#[must_use]
pub fn daily_calories_katch_mcardle(
    weight_kg: f64,
    body_fat_pct: f64,
    activity: ActivityLevel,
    goal: Goal,
) -> f64 {
    let bmr = bmr_katch_mcardle(weight_kg, body_fat_pct);
    round2(bmr * activity_factor(activity) * goal_adjustment(goal))
}

/// Maintenance calories shifted by a weekly rate of change in kg.
#[must_use]
pub fn goal_calories(profile: &BodyProfile, goal: Goal, rate_kg_per_week: f64) -> f64 {
    let maintenance = daily_calories(&BodyProfile {
        goal: Goal::MaintainWeight,
        ..*profile
    });
    let daily_delta = rate_kg_per_week * KCAL_PER_KG_FAT / 7.0;
    match goal {
        Goal::LoseWeight => round2(maintenance - daily_delta),
        Goal::MaintainWeight => maintenance,
        Goal::GainWeight => round2(maintenance + daily_delta),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BmrSummary {
    pub mifflin_st_jeor: f64,
    pub harris_benedict: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub katch_mcardle: Option<f64>,
    pub average: f64,
    pub recommended: f64,
}

#[must_use]
pub fn bmr_summary(profile: &BodyProfile, body_fat_pct: Option<f64>) -> BmrSummary {
    let mifflin =
        bmr_mifflin_st_jeor(profile.weight_kg, profile.height_m, profile.age, profile.sex);
    let harris =
        bmr_harris_benedict(profile.weight_kg, profile.height_m, profile.age, profile.sex);
    let average = f64::midpoint(mifflin, harris);
    let katch = body_fat_pct.map(|bf| bmr_katch_mcardle(profile.weight_kg, bf));
    BmrSummary {
        mifflin_st_jeor: round2(mifflin),
        harris_benedict: round2(harris),
        katch_mcardle: katch.map(round2),
        average: round2(average),
        recommended: round2(katch.unwrap_or(average)),
    }
}

// --- BMI ---

pub fn bmi(weight_kg: f64, height_m: f64) -> Result<f64> {
    if height_m <= 0.0 {
        bail!("Height must be greater than 0");
    }
    if weight_kg <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    Ok(round2(weight_kg / (height_m * height_m)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    SevereThinness,
    ModerateThinness,
    MildThinness,
    Normal,
    Overweight,
    ObesityI,
    ObesityII,
    ObesityIII,
}

impl BmiCategory {
    #[must_use]
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 16.0 {
            Self::SevereThinness
        } else if bmi < 17.0 {
            Self::ModerateThinness
        } else if bmi < 18.5 {
            Self::MildThinness
        } else if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Overweight
        } else if bmi < 35.0 {
            Self::ObesityI
        } else if bmi < 40.0 {
            Self::ObesityII
        } else {
            Self::ObesityIII
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SevereThinness => "Severe thinness",
            Self::ModerateThinness => "Moderate thinness",
            Self::MildThinness => "Mild thinness",
            Self::Normal => "Normal",
            Self::Overweight => "Overweight",
            Self::ObesityI => "Obesity class I",
            Self::ObesityII => "Obesity class II",
            Self::ObesityIII => "Obesity class III",
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthRisk {
    /// Underweight: risk comes from other clinical conditions.
    Moderate,
    Average,
    Increased,
    High,
    VeryHigh,
    Extreme,
}

impl HealthRisk {
    #[must_use]
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            Self::Moderate
        } else if bmi < 25.0 {
            Self::Average
        } else if bmi < 30.0 {
            Self::Increased
        } else if bmi < 35.0 {
            Self::High
        } else if bmi < 40.0 {
            Self::VeryHigh
        } else {
            Self::Extreme
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Moderate => "Moderate (other clinical conditions)",
            Self::Average => "Average",
            Self::Increased => "Increased",
            Self::High => "High",
            Self::VeryHigh => "Very high",
            Self::Extreme => "Extreme",
        }
    }
}

/// Healthy weight bounds (BMI 18.5 to 24.9) for a height.
#[must_use]
pub fn ideal_weight_range(height_m: f64) -> (f64, f64) {
    let h2 = height_m * height_m;
    (round2(18.5 * h2), round2(24.9 * h2))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BmiReport {
    pub bmi: f64,
    pub category: BmiCategory,
    pub risk: HealthRisk,
    pub ideal_min_kg: f64,
    pub ideal_max_kg: f64,
    pub kg_below_range: f64,
    pub kg_above_range: f64,
}

pub fn bmi_report(profile: &BodyProfile) -> Result<BmiReport> {
    let value = bmi(profile.weight_kg, profile.height_m)?;
    let (min, max) = ideal_weight_range(profile.height_m);
    Ok(BmiReport {
        bmi: value,
        category: BmiCategory::from_bmi(value),
        risk: HealthRisk::from_bmi(value),
        ideal_min_kg: min,
        ideal_max_kg: max,
        kg_below_range: round2((min - profile.weight_kg).max(0.0)),
        kg_above_range: round2((profile.weight_kg - max).max(0.0)),
    })
}

/// Deurenberg estimate of body fat percentage from BMI.
#[must_use]
pub fn body_fat_deurenberg(bmi: f64, age: u32, sex: Sex) -> f64 {
    let k = match sex {
        Sex::Male => 16.2,
        Sex::Female => 5.4,
        Sex::Other => 10.8,
    };
    (1.20 * bmi + 0.23 * f64::from(age) - k).clamp(5.0, 60.0)
}

// --- Water ---

#[must_use]
pub fn daily_water_liters(weight_kg: f64) -> f64 {
    round2(weight_kg * WATER_ML_PER_KG / 1000.0)
}

#[must_use]
pub fn recommended_water_liters(weight_kg: f64, activity: ActivityLevel, hot_climate: bool) -> f64 {
    let activity_mult = match activity {
        ActivityLevel::Sedentary => 1.0,
        ActivityLevel::Light => 1.1,
        ActivityLevel::Moderate => 1.2,
        ActivityLevel::Intense => 1.3,
        ActivityLevel::VeryIntense => 1.4,
    };
    let climate_mult = if hot_climate { 1.2 } else { 1.0 };
    round2(weight_kg * WATER_ML_PER_KG * activity_mult * climate_mult / 1000.0)
}

// --- Macronutrient splits ---

/// Fractions of daily calories going to protein, carbs and fat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroRatio {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroSplit {
    Standard,
    HighProtein,
    LowCarb,
    Balanced,
    Athlete,
}

impl MacroSplit {
    #[must_use]
    pub fn ratio(self) -> MacroRatio {
        let (protein, carbs, fat) = match self {
            Self::Standard | Self::Balanced => (0.25, 0.45, 0.30),
            Self::HighProtein => (0.35, 0.40, 0.25),
            Self::LowCarb => (0.30, 0.25, 0.45),
            Self::Athlete => (0.30, 0.50, 0.20),
        };
        MacroRatio {
            protein,
            carbs,
            fat,
        }
    }
}

impl FromStr for MacroSplit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "standard" => Ok(Self::Standard),
            "high_protein" | "protein" => Ok(Self::HighProtein),
            "low_carb" | "lowcarb" => Ok(Self::LowCarb),
            "balanced" => Ok(Self::Balanced),
            "athlete" => Ok(Self::Athlete),
            _ => bail!(
                "Unknown macro split '{s}'. Must be one of: standard, high_protein, low_carb, balanced, athlete"
            ),
        }
    }
}

#[must_use]
pub fn goal_macro_split(goal: Goal) -> MacroRatio {
    let (protein, carbs, fat) = match goal {
        Goal::LoseWeight => (0.30, 0.40, 0.30),
        Goal::MaintainWeight => (0.25, 0.45, 0.30),
        Goal::GainWeight => (0.25, 0.50, 0.25),
    };
    MacroRatio {
        protein,
        carbs,
        fat,
    }
}

#[must_use]
pub fn macro_targets_for(calories: f64, ratio: MacroRatio) -> MacronutrientTargets {
    MacronutrientTargets {
        calories,
        protein_g: calories * ratio.protein / KCAL_PER_G_PROTEIN,
        carbs_g: calories * ratio.carbs / KCAL_PER_G_CARBS,
        fat_g: calories * ratio.fat / KCAL_PER_G_FAT,
    }
}

#[must_use]
pub fn macro_targets(profile: &BodyProfile, split: MacroSplit) -> MacronutrientTargets {
    macro_targets_for(daily_calories(profile), split.ratio())
}

// --- Progress ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCalories {
    pub date: NaiveDate,
    pub calories: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalorieTrends {
    pub daily: Vec<DayCalories>,
    pub moving_averages: Vec<f64>,
    pub trend: Trend,
    pub variation_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub days: u32,
    pub average_calories: f64,
    pub average_protein: f64,
    pub calories_pct_of_target: f64,
    pub protein_pct_of_target: f64,
    pub consistency_pct: f64,
    pub food_variety: usize,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<CalorieTrends>,
}

pub fn progress_report(
    records: &[FoodRecord],
    targets: &MacronutrientTargets,
    days: u32,
) -> Result<ProgressReport> {
    if records.is_empty() {
        bail!("No records to analyze");
    }
    if days == 0 {
        bail!("Days must be greater than 0");
    }
    if targets.calories <= 0.0 || targets.protein_g <= 0.0 {
        bail!("Calorie and protein targets must be greater than 0");
    }

    let span = f64::from(days);
    let total_calories: f64 = records.iter().map(FoodRecord::calories).sum();
    let total_protein: f64 = records.iter().map(FoodRecord::protein).sum();
    let average_calories = total_calories / span;
    let average_protein = total_protein / span;
    let calories_pct = average_calories / targets.calories * 100.0;
    let protein_pct = average_protein / targets.protein_g * 100.0;

    let per_day = calories_by_date(records);
    #[allow(clippy::cast_precision_loss)]
    let consistency_pct = per_day.len() as f64 / span * 100.0;

    // "Rice" and " rice " count once; blank descriptions do not count.
    let food_variety = records
        .iter()
        .flat_map(FoodRecord::food_descriptions)
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect::<HashSet<_>>()
        .len();

    let mut recommendations = Vec::new();
    if calories_pct > 115.0 {
        recommendations.push("Reduce calorie intake to reach your target".to_string());
    } else if calories_pct < 85.0 {
        recommendations.push("Increase calorie intake to reach your target".to_string());
    } else {
        recommendations.push("Calorie intake is adequate".to_string());
    }
    if protein_pct > 120.0 {
        recommendations.push("Protein intake is too high".to_string());
    } else if protein_pct < 80.0 {
        recommendations.push("Increase protein intake".to_string());
    } else {
        recommendations.push("Protein intake is adequate".to_string());
    }
    if consistency_pct < 70.0 {
        recommendations.push("Log your meals more consistently".to_string());
    }
    if food_variety < 10 {
        recommendations.push("Add more variety to your diet".to_string());
    }

    let trends = (days >= 7).then(|| calorie_trends(&per_day));

    Ok(ProgressReport {
        days,
        average_calories: round2(average_calories),
        average_protein: round2(average_protein),
        calories_pct_of_target: round2(calories_pct),
        protein_pct_of_target: round2(protein_pct),
        consistency_pct: round2(consistency_pct),
        food_variety,
        recommendations,
        trends,
    })
}

fn calories_by_date(records: &[FoodRecord]) -> Vec<DayCalories> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for r in records {
        *by_date.entry(r.date()).or_default() += r.calories();
    }
    by_date
        .into_iter()
        .map(|(date, calories)| DayCalories { date, calories })
        .collect()
}

fn calorie_trends(daily: &[DayCalories]) -> CalorieTrends {
    #[allow(clippy::cast_precision_loss)]
    let moving_averages: Vec<f64> = daily
        .windows(TREND_WINDOW)
        .map(|w| w.iter().map(|d| d.calories).sum::<f64>() / TREND_WINDOW as f64)
        .collect();

    let trend = match moving_averages.as_slice() {
        [.., prev, last] => {
            if *last > prev * 1.05 {
                Trend::Rising
            } else if *last < prev * 0.95 {
                Trend::Falling
            } else {
                Trend::Stable
            }
        }
        _ => Trend::InsufficientData,
    };

    let changes: Vec<f64> = daily
        .windows(2)
        .filter(|pair| pair[0].calories > 0.0)
        .map(|pair| ((pair[1].calories - pair[0].calories) / pair[0].calories).abs() * 100.0)
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let variation_pct = if changes.is_empty() {
        0.0
    } else {
        changes.iter().sum::<f64>() / changes.len() as f64
    };

    CalorieTrends {
        daily: daily.to_vec(),
        moving_averages: moving_averages.into_iter().map(round2).collect(),
        trend,
        variation_pct: round2(variation_pct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NutritionAnalysis, RecordKind};

    fn reference_profile() -> BodyProfile {
        BodyProfile {
            weight_kg: 70.0,
            height_m: 1.70,
            age: 30,
            sex: Sex::Male,
            activity_level: ActivityLevel::Sedentary,
            goal: Goal::MaintainWeight,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn record_on(date: NaiveDate, description: &str, calories: f64, protein: f64) -> FoodRecord {
        FoodRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".to_string(),
            logged_at: date.and_hms_opt(12, 0, 0).unwrap(),
            meal_type: "lunch".to_string(),
            kind: RecordKind::Ai {
                analysis: NutritionAnalysis {
                    description: Some(description.to_string()),
                    calories,
                    protein,
                    fiber: 0.0,
                    carbs: None,
                    fat: None,
                    confidence: Some(0.9),
                    source: None,
                },
                image_hash: None,
            },
        }
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, n).unwrap()
    }

    #[test]
    fn test_reference_values() {
        let p = reference_profile();
        assert!(close(bmr_mifflin_st_jeor(70.0, 1.70, 30, Sex::Male), 1617.5));
        assert!(close(daily_calories(&p), 1941.0));
        assert!(close(bmr_harris_benedict(70.0, 1.70, 30, Sex::Male), 1671.672));
        assert!(close(bmi(70.0, 1.70).unwrap(), 24.22));
        assert_eq!(BmiCategory::from_bmi(24.22), BmiCategory::Normal);
    }

    #[test]
    fn test_mifflin_sex_variants() {
        let female = bmr_mifflin_st_jeor(70.0, 1.70, 30, Sex::Female);
        let male = bmr_mifflin_st_jeor(70.0, 1.70, 30, Sex::Male);
        let other = bmr_mifflin_st_jeor(70.0, 1.70, 30, Sex::Other);
        assert!(close(female, 1451.5));
        assert!(close(other, f64::midpoint(male, female)));
    }

    #[test]
    fn test_harris_other_is_mean() {
        let male = bmr_harris_benedict(60.0, 1.65, 40, Sex::Male);
        let female = bmr_harris_benedict(60.0, 1.65, 40, Sex::Female);
        let other = bmr_harris_benedict(60.0, 1.65, 40, Sex::Other);
        assert!(close(other, (male + female) / 2.0));
    }

    #[test]
    fn test_katch_mcardle() {
        // lean mass 56 kg
        assert!(close(bmr_katch_mcardle(70.0, 20.0), 1579.6));
        assert!(close(
            daily_calories_katch_mcardle(70.0, 20.0, ActivityLevel::Sedentary, Goal::MaintainWeight),
            1895.52
        ));
    }

    #[test]
    fn test_goal_adjusted_calories() {
        let mut p = reference_profile();
        p.goal = Goal::LoseWeight;
        assert!(close(daily_calories(&p), 1649.85));
        p.goal = Goal::GainWeight;
        assert!(close(daily_calories(&p), 2232.15));
    }

    #[test]
    fn test_goal_calories_rate() {
        let p = reference_profile();
        assert!(close(goal_calories(&p, Goal::LoseWeight, 0.5), 1391.0));
        assert!(close(goal_calories(&p, Goal::GainWeight, 0.5), 2491.0));
        assert!(close(goal_calories(&p, Goal::MaintainWeight, 0.5), 1941.0));
    }

    #[test]
    fn test_age_on() {
        let birth = NaiveDate::from_ymd_opt(1994, 6, 15).unwrap();
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()), 29);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), 30);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()), 0);
    }

    #[test]
    fn test_bmi_rejects_non_positive() {
        assert!(bmi(70.0, 0.0).is_err());
        assert!(bmi(0.0, 1.70).is_err());
        assert!(bmi(70.0, -1.0).is_err());
    }

    #[test]
    fn test_bmi_category_boundaries() {
        assert_eq!(BmiCategory::from_bmi(15.99), BmiCategory::SevereThinness);
        assert_eq!(BmiCategory::from_bmi(16.0), BmiCategory::ModerateThinness);
        assert_eq!(BmiCategory::from_bmi(17.0), BmiCategory::MildThinness);
        assert_eq!(BmiCategory::from_bmi(18.5), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(25.0), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(30.0), BmiCategory::ObesityI);
        assert_eq!(BmiCategory::from_bmi(35.0), BmiCategory::ObesityII);
        assert_eq!(BmiCategory::from_bmi(40.0), BmiCategory::ObesityIII);
    }

    #[test]
    fn test_health_risk_tiers() {
        assert_eq!(HealthRisk::from_bmi(17.0), HealthRisk::Moderate);
        assert_eq!(HealthRisk::from_bmi(22.0), HealthRisk::Average);
        assert_eq!(HealthRisk::from_bmi(27.0), HealthRisk::Increased);
        assert_eq!(HealthRisk::from_bmi(32.0), HealthRisk::High);
        assert_eq!(HealthRisk::from_bmi(37.0), HealthRisk::VeryHigh);
        assert_eq!(HealthRisk::from_bmi(45.0), HealthRisk::Extreme);
    }

    #[test]
    fn test_bmi_report_distance_to_range() {
        let mut p = reference_profile();
        let report = bmi_report(&p).unwrap();
        assert!(close(report.ideal_min_kg, 53.47));
        assert!(close(report.ideal_max_kg, 71.96));
        assert!(close(report.kg_below_range, 0.0));
        assert!(close(report.kg_above_range, 0.0));

        p.weight_kg = 80.0;
        let report = bmi_report(&p).unwrap();
        assert!(close(report.kg_above_range, 8.04));
        assert_eq!(report.category, BmiCategory::Overweight);
    }

    #[test]
    fn test_body_fat_is_clamped() {
        assert!(close(body_fat_deurenberg(24.22, 30, Sex::Male), 19.764));
        assert!(close(body_fat_deurenberg(10.0, 0, Sex::Male), 5.0));
        assert!(close(body_fat_deurenberg(60.0, 80, Sex::Female), 60.0));
    }

    #[test]
    fn test_water() {
        assert!(close(daily_water_liters(70.0), 2.45));
        assert!(close(
            recommended_water_liters(70.0, ActivityLevel::Sedentary, false),
            2.45
        ));
        assert!(close(
            recommended_water_liters(70.0, ActivityLevel::VeryIntense, true),
            4.12
        ));
    }

    #[test]
    fn test_bmr_summary_prefers_katch_when_body_fat_known() {
        let p = reference_profile();
        let without = bmr_summary(&p, None);
        assert!(without.katch_mcardle.is_none());
        assert!(close(without.recommended, without.average));
        assert!(close(without.average, 1644.59));

        let with = bmr_summary(&p, Some(20.0));
        assert!(close(with.katch_mcardle.unwrap(), 1579.6));
        assert!(close(with.recommended, 1579.6));
    }

    #[test]
    fn test_standard_macro_targets() {
        let t = macro_targets(&reference_profile(), MacroSplit::Standard);
        assert!(close(t.calories, 1941.0));
        assert!(close(t.protein_g, 121.3125));
        assert!(close(t.carbs_g, 218.3625));
        assert!(close(t.fat_g, 64.7));
    }

    #[test]
    fn test_macro_split_ratios_sum_to_one() {
        for split in [
            MacroSplit::Standard,
            MacroSplit::HighProtein,
            MacroSplit::LowCarb,
            MacroSplit::Balanced,
            MacroSplit::Athlete,
        ] {
            let r = split.ratio();
            assert!(close(r.protein + r.carbs + r.fat, 1.0), "{split:?}");
        }
        for goal in [Goal::LoseWeight, Goal::MaintainWeight, Goal::GainWeight] {
            let r = goal_macro_split(goal);
            assert!(close(r.protein + r.carbs + r.fat, 1.0), "{goal:?}");
        }
        assert_eq!("high-protein".parse::<MacroSplit>().unwrap(), MacroSplit::HighProtein);
        assert!("keto".parse::<MacroSplit>().is_err());
    }

    #[test]
    fn test_progress_report_errors() {
        let targets = macro_targets(&reference_profile(), MacroSplit::Standard);
        assert!(progress_report(&[], &targets, 7).is_err());

        let records = vec![record_on(day(1), "Rice", 500.0, 20.0)];
        assert!(progress_report(&records, &targets, 0).is_err());

        let zero = MacronutrientTargets {
            calories: 0.0,
            ..targets
        };
        assert!(progress_report(&records, &zero, 7).is_err());
    }

    #[test]
    fn test_food_variety_ignores_case_and_padding() {
        let targets = MacronutrientTargets {
            calories: 2000.0,
            protein_g: 100.0,
            carbs_g: 200.0,
            fat_g: 60.0,
        };
        let records = vec![
            record_on(day(1), "Rice", 500.0, 10.0),
            record_on(day(1), " rice ", 500.0, 10.0),
            record_on(day(2), "RICE", 500.0, 10.0),
            record_on(day(2), "   ", 500.0, 10.0),
            record_on(day(2), "Lentils", 500.0, 10.0),
        ];
        let report = progress_report(&records, &targets, 2).unwrap();
        assert_eq!(report.food_variety, 2);
    }

    #[test]
    fn test_progress_report_short_window_has_no_trends() {
        let targets = MacronutrientTargets {
            calories: 2000.0,
            protein_g: 100.0,
            carbs_g: 200.0,
            fat_g: 60.0,
        };
        let records = vec![
            record_on(day(1), "Rice", 1000.0, 50.0),
            record_on(day(1), "Beans", 1000.0, 50.0),
            record_on(day(2), "Rice", 2000.0, 100.0),
        ];
        let report = progress_report(&records, &targets, 2).unwrap();
        assert!(close(report.average_calories, 2000.0));
        assert!(close(report.calories_pct_of_target, 100.0));
        assert!(close(report.consistency_pct, 100.0));
        assert_eq!(report.food_variety, 2);
        assert!(report.trends.is_none());
        assert_eq!(
            report.recommendations,
            vec![
                "Calorie intake is adequate",
                "Protein intake is adequate",
                "Add more variety to your diet",
            ]
        );
    }

    #[test]
    fn test_progress_report_low_intake_recommendations() {
        let targets = MacronutrientTargets {
            calories: 2000.0,
            protein_g: 100.0,
            carbs_g: 200.0,
            fat_g: 60.0,
        };
        let records = vec![record_on(day(1), "Apple", 500.0, 10.0)];
        let report = progress_report(&records, &targets, 4).unwrap();
        assert!(close(report.consistency_pct, 25.0));
        assert!(report.recommendations.contains(&"Increase calorie intake to reach your target".to_string()));
        assert!(report.recommendations.contains(&"Increase protein intake".to_string()));
        assert!(report.recommendations.contains(&"Log your meals more consistently".to_string()));
    }

    #[test]
    fn test_progress_trends_rising() {
        let targets = MacronutrientTargets {
            calories: 2000.0,
            protein_g: 100.0,
            carbs_g: 200.0,
            fat_g: 60.0,
        };
        // 8 days: flat 1000 then a jump to 2000 on the last day
        let mut records: Vec<FoodRecord> = (1..=7)
            .map(|d| record_on(day(d), "Oats", 1000.0, 50.0))
            .collect();
        records.push(record_on(day(8), "Oats", 2000.0, 50.0));

        let report = progress_report(&records, &targets, 8).unwrap();
        let trends = report.trends.unwrap();
        assert_eq!(trends.daily.len(), 8);
        assert_eq!(trends.moving_averages.len(), 2);
        assert!(close(trends.moving_averages[0], 1000.0));
        assert!(close(trends.moving_averages[1], 1142.86));
        assert_eq!(trends.trend, Trend::Rising);
        // six 0% changes and one 100% change
        assert!(close(trends.variation_pct, 14.29));
    }

    #[test]
    fn test_progress_trends_insufficient_data() {
        let targets = MacronutrientTargets {
            calories: 2000.0,
            protein_g: 100.0,
            carbs_g: 200.0,
            fat_g: 60.0,
        };
        let records = vec![
            record_on(day(1), "Eggs", 0.0, 0.0),
            record_on(day(2), "Eggs", 800.0, 40.0),
            record_on(day(3), "Eggs", 400.0, 40.0),
        ];
        let trends = progress_report(&records, &targets, 7).unwrap().trends.unwrap();
        assert_eq!(trends.trend, Trend::InsufficientData);
        assert!(trends.moving_averages.is_empty());
        // the 0 -> 800 pair is skipped
        assert!(close(trends.variation_pct, 50.0));
    }
}
