use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// --- Enumerations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Intense,
    VeryIntense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    LoseWeight,
    MaintainWeight,
    GainWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortionUnit {
    Gram,
    Milliliter,
    Unit,
    Cup,
    Tablespoon,
    Teaspoon,
    Slice,
    Serving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodCategory {
    Fruit,
    Vegetable,
    Grain,
    Protein,
    Dairy,
    Fat,
    Sweet,
    Beverage,
    Other,
}

impl FromStr for Sex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            "other" | "o" => Ok(Self::Other),
            _ => bail!("Invalid sex '{s}'. Must be one of: male, female, other"),
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "sedentary" => Ok(Self::Sedentary),
            "light" | "lightly_active" => Ok(Self::Light),
            "moderate" | "moderately_active" => Ok(Self::Moderate),
            "intense" | "very_active" => Ok(Self::Intense),
            "very_intense" | "extra_active" => Ok(Self::VeryIntense),
            _ => bail!(
                "Invalid activity level '{s}'. Must be one of: sedentary, light, moderate, intense, very_intense"
            ),
        }
    }
}

impl FromStr for Goal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "lose" | "lose_weight" => Ok(Self::LoseWeight),
            "maintain" | "maintain_weight" => Ok(Self::MaintainWeight),
            "gain" | "gain_weight" => Ok(Self::GainWeight),
            _ => bail!("Invalid goal '{s}'. Must be one of: lose, maintain, gain"),
        }
    }
}

impl FromStr for PortionUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "g" | "gram" | "grams" => Ok(Self::Gram),
            "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
                Ok(Self::Milliliter)
            }
            "unit" | "units" | "u" | "piece" | "pieces" => Ok(Self::Unit),
            "cup" | "cups" => Ok(Self::Cup),
            "tbsp" | "tablespoon" | "tablespoons" => Ok(Self::Tablespoon),
            "tsp" | "teaspoon" | "teaspoons" => Ok(Self::Teaspoon),
            "slice" | "slices" => Ok(Self::Slice),
            "serving" | "servings" => Ok(Self::Serving),
            _ => bail!(
                "Unknown unit '{s}'. Supported: g, ml, unit, cup, tbsp, tsp, slice, serving"
            ),
        }
    }
}

impl FromStr for FoodCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fruit" => Ok(Self::Fruit),
            "vegetable" => Ok(Self::Vegetable),
            "grain" => Ok(Self::Grain),
            "protein" => Ok(Self::Protein),
            "dairy" => Ok(Self::Dairy),
            "fat" => Ok(Self::Fat),
            "sweet" => Ok(Self::Sweet),
            "beverage" => Ok(Self::Beverage),
            "other" => Ok(Self::Other),
            _ => bail!("Unknown food category '{s}'"),
        }
    }
}

impl fmt::Display for PortionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Gram => "g",
            Self::Milliliter => "ml",
            Self::Unit => "unit",
            Self::Cup => "cup",
            Self::Tablespoon => "tbsp",
            Self::Teaspoon => "tsp",
            Self::Slice => "slice",
            Self::Serving => "serving",
        };
        f.write_str(label)
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        })
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoseWeight => "lose weight",
            Self::MaintainWeight => "maintain weight",
            Self::GainWeight => "gain weight",
        })
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sedentary => "sedentary",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Intense => "intense",
            Self::VeryIntense => "very intense",
        })
    }
}

// --- Users ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default = "default_sex")]
    pub sex: Sex,
    #[serde(default = "default_weight")]
    pub weight_kg: f64,
    /// Height in metres.
    #[serde(default = "default_height")]
    pub height_m: f64,
    #[serde(default = "default_activity")]
    pub activity_level: ActivityLevel,
    #[serde(default = "default_goal")]
    pub goal: Goal,
    #[serde(default)]
    pub is_guest: bool,
}

fn default_sex() -> Sex {
    Sex::Other
}

fn default_weight() -> f64 {
    70.0
}

fn default_height() -> f64 {
    1.70
}

fn default_activity() -> ActivityLevel {
    ActivityLevel::Sedentary
}

fn default_goal() -> Goal {
    Goal::MaintainWeight
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub birth_date: Option<NaiveDate>,
    pub sex: Sex,
    pub weight_kg: f64,
    pub height_m: f64,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
}

/// Partial profile edit. `birth_date: Some(None)` clears the stored date.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(clippy::option_option)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub birth_date: Option<Option<NaiveDate>>,
    pub sex: Option<Sex>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<Goal>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.birth_date.is_none()
            && self.sex.is_none()
            && self.weight_kg.is_none()
            && self.height_m.is_none()
            && self.activity_level.is_none()
            && self.goal.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub email: String,
    pub weight_kg: f64,
    pub height_m: f64,
    pub sex: Sex,
    pub goal: Goal,
    pub activity_level: ActivityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub is_guest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmiHistoryEntry {
    pub user_id: String,
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub bmi: f64,
    pub category: String,
}

// --- Food records ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodPortion {
    pub description: String,
    pub quantity: f64,
    pub unit: PortionUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FoodCategory>,
    #[serde(default)]
    pub calories_per_unit: f64,
    #[serde(default)]
    pub protein_per_unit: f64,
    #[serde(default)]
    pub carbs_per_unit: f64,
    #[serde(default)]
    pub fat_per_unit: f64,
    #[serde(default)]
    pub fiber_per_unit: f64,
}

impl FoodPortion {
    #[must_use]
    pub fn calories(&self) -> f64 {
        self.quantity * self.calories_per_unit
    }

    #[must_use]
    pub fn protein(&self) -> f64 {
        self.quantity * self.protein_per_unit
    }

    #[must_use]
    pub fn carbs(&self) -> f64 {
        self.quantity * self.carbs_per_unit
    }

    #[must_use]
    pub fn fat(&self) -> f64 {
        self.quantity * self.fat_per_unit
    }

    #[must_use]
    pub fn fiber(&self) -> f64 {
        self.quantity * self.fiber_per_unit
    }

    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            bail!("Portion description must not be empty");
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            bail!("Portion quantity must be greater than 0");
        }
        for (label, value) in [
            ("calories", self.calories_per_unit),
            ("protein", self.protein_per_unit),
            ("carbs", self.carbs_per_unit),
            ("fat", self.fat_per_unit),
            ("fiber", self.fiber_per_unit),
        ] {
            if !is_non_negative(value) {
                bail!("{label} per unit must be a non-negative number");
            }
            if !(self.quantity * value).is_finite() {
                bail!("{label} total for '{}' is too large", self.description);
            }
        }
        Ok(())
    }
}

/// Nutrition estimate produced by an image analyzer.
///
/// Accepts the Spanish keys older analyzer prompts asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionAnalysis {
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(default, alias = "calorias")]
    pub calories: f64,
    #[serde(default, alias = "proteinas")]
    pub protein: f64,
    #[serde(default, alias = "fibra")]
    pub fiber: f64,
    #[serde(default, alias = "carbohidratos")]
    pub carbs: Option<f64>,
    #[serde(default, alias = "grasas")]
    pub fat: Option<f64>,
    #[serde(default, alias = "confianza")]
    pub confidence: Option<f64>,
    #[serde(default, alias = "fuente")]
    pub source: Option<String>,
}

pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.4;

impl NutritionAnalysis {
    #[must_use]
    pub fn is_low_confidence(&self) -> bool {
        self.confidence.unwrap_or(0.0) <= LOW_CONFIDENCE_THRESHOLD
    }

    pub fn validate(&self) -> Result<()> {
        let required = [self.calories, self.protein, self.fiber];
        let optional = [self.carbs, self.fat];
        if !required.into_iter().all(is_non_negative)
            || !optional.into_iter().flatten().all(is_non_negative)
        {
            bail!("Analysis values must be non-negative numbers");
        }
        if self.confidence.is_some_and(|c| !c.is_finite()) {
            bail!("Analysis confidence must be a number");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    Manual {
        portions: Vec<FoodPortion>,
        #[serde(default)]
        notes: String,
    },
    Ai {
        analysis: NutritionAnalysis,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_hash: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodRecord {
    pub id: String,
    pub user_id: String,
    pub logged_at: NaiveDateTime,
    pub meal_type: String,
    #[serde(flatten)]
    pub kind: RecordKind,
}

impl FoodRecord {
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.logged_at.date()
    }

    #[must_use]
    pub fn calories(&self) -> f64 {
        match &self.kind {
            RecordKind::Manual { portions, .. } => portions.iter().map(FoodPortion::calories).sum(),
            RecordKind::Ai { analysis, .. } => analysis.calories,
        }
    }

    #[must_use]
    pub fn protein(&self) -> f64 {
        match &self.kind {
            RecordKind::Manual { portions, .. } => portions.iter().map(FoodPortion::protein).sum(),
            RecordKind::Ai { analysis, .. } => analysis.protein,
        }
    }

    #[must_use]
    pub fn carbs(&self) -> f64 {
        match &self.kind {
            RecordKind::Manual { portions, .. } => portions.iter().map(FoodPortion::carbs).sum(),
            RecordKind::Ai { analysis, .. } => analysis.carbs.unwrap_or(0.0),
        }
    }

    #[must_use]
    pub fn fat(&self) -> f64 {
        match &self.kind {
            RecordKind::Manual { portions, .. } => portions.iter().map(FoodPortion::fat).sum(),
            RecordKind::Ai { analysis, .. } => analysis.fat.unwrap_or(0.0),
        }
    }

    #[must_use]
    pub fn fiber(&self) -> f64 {
        match &self.kind {
            RecordKind::Manual { portions, .. } => portions.iter().map(FoodPortion::fiber).sum(),
            RecordKind::Ai { analysis, .. } => analysis.fiber,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        [
            self.calories(),
            self.protein(),
            self.carbs(),
            self.fat(),
            self.fiber(),
        ]
        .into_iter()
        .all(is_non_negative)
    }

    /// Food descriptions contributing to this record, used for variety counts.
    #[must_use]
    pub fn food_descriptions(&self) -> Vec<String> {
        match &self.kind {
            RecordKind::Manual { portions, .. } => {
                portions.iter().map(|p| p.description.clone()).collect()
            }
            RecordKind::Ai { analysis, .. } => {
                vec![analysis.description.clone().unwrap_or_default()]
            }
        }
    }

    #[must_use]
    pub fn description(&self) -> String {
        match &self.kind {
            RecordKind::Manual { .. } => format!("{} logged manually", self.meal_type),
            RecordKind::Ai { analysis, .. } => analysis
                .description
                .clone()
                .unwrap_or_else(|| "Analyzed meal".to_string()),
        }
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        match &self.kind {
            RecordKind::Manual { portions, notes } => {
                let n = portions.len();
                if notes.is_empty() {
                    format!("Manual entry with {n} portion(s)")
                } else {
                    format!("Manual entry with {n} portion(s). {notes}")
                }
            }
            RecordKind::Ai { analysis, .. } => {
                let pct = (analysis.confidence.unwrap_or(0.0) * 100.0).floor();
                format!("AI analysis with {pct:.0}% confidence")
            }
        }
    }
}

// --- Totals and targets ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
}

impl DailyTotals {
    pub fn add(&mut self, record: &FoodRecord) {
        self.calories += record.calories();
        self.protein += record.protein();
        self.carbs += record.carbs();
        self.fat += record.fat();
        self.fiber += record.fiber();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn percent_of_target(&self, target_calories: f64) -> f64 {
        if target_calories > 0.0 {
            self.calories / target_calories * 100.0
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FoodRecord>) -> Self {
        let mut totals = Self::default();
        for r in records {
            totals.add(r);
        }
        totals
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacronutrientTargets {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroPercentages {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacronutrientTargets {
    pub fn validate(&self) -> Result<()> {
        if !is_non_negative(self.calories) {
            bail!("Calories must be a non-negative number");
        }
        if ![self.protein_g, self.carbs_g, self.fat_g]
            .into_iter()
            .all(is_non_negative)
        {
            bail!("Macronutrient targets must be non-negative numbers");
        }
        Ok(())
    }

    /// Share of each macro in total grams, `None` when no grams are set.
    #[must_use]
    pub fn percentages(&self) -> Option<MacroPercentages> {
        let total = self.protein_g + self.carbs_g + self.fat_g;
        if total > 0.0 {
            Some(MacroPercentages {
                protein: self.protein_g / total * 100.0,
                carbs: self.carbs_g / total * 100.0,
                fat: self.fat_g / total * 100.0,
            })
        } else {
            None
        }
    }

    #[must_use]
    pub fn meets_calories(&self, consumed: f64) -> bool {
        consumed <= self.calories
    }

    #[must_use]
    pub fn meets_protein(&self, consumed: f64) -> bool {
        consumed >= self.protein_g
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub records: Vec<FoodRecord>,
    pub totals: DailyTotals,
    pub targets: MacronutrientTargets,
    pub percent_of_calorie_target: f64,
    pub calories_remaining: f64,
    pub meets_calorie_goal: bool,
    pub meets_protein_goal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub total_records: usize,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_fiber: f64,
    pub days_with_records: usize,
    pub average_daily_calories: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub record_count: usize,
    pub totals: DailyTotals,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WaterRecommendation {
    pub base_liters: f64,
    pub recommended_liters: f64,
    pub hot_climate: bool,
}

// --- Validation ---

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.trim().to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

/// Trim and lower-case an email, rejecting anything without an `@`.
pub fn validate_email(email: &str) -> Result<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        bail!("Invalid email '{email}'");
    }
    Ok(normalized)
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("Password must be at least {MIN_PASSWORD_LEN} characters");
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Name must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn validate_birth_date(birth: NaiveDate, today: NaiveDate) -> Result<()> {
    if birth >= today {
        bail!("Birth date must be in the past");
    }
    Ok(())
}

/// Finite and `>= 0`. NaN and infinities serialize as `null` and would
/// make the data files unreadable.
fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

pub fn validate_positive(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{label} must be greater than 0");
    }
    Ok(())
}
