use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::analysis::{self, ImageAnalyzer};
use crate::calculator::{
    self, BmiReport, BmrSummary, BodyProfile, MacroSplit, ProgressReport,
};
use crate::models::{
    ActivityLevel, BmiHistoryEntry, DailySummary, DailyTotals, FoodPortion, FoodRecord, Goal,
    HistoryDay, MacronutrientTargets, NewUser, NutritionAnalysis, ProfileSummary, ProfileUpdate,
    RecordKind, Sex, User, UserStats, WaterRecommendation, validate_birth_date, validate_email,
    validate_meal_type, validate_name, validate_password, validate_positive,
};
use crate::store::Store;

pub const GUEST_EMAIL: &str = "guest@nutrify.local";

/// Longest history or progress window, in days.
pub const MAX_WINDOW_DAYS: u32 = 366;

pub struct NutrifyService {
    store: Store,
    user: User,
}

impl NutrifyService {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Self::with_store(Store::open(data_dir)?)
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::with_store(Store::open_in_memory()?)
    }

    /// Restore the saved session, falling back to the guest account.
    fn with_store(store: Store) -> Result<Self> {
        let restored = match store.session_email()? {
            Some(email) => {
                let user = store.get_user_by_email(&email)?;
                if user.is_none() {
                    log::warn!("session refers to unknown user {email}, continuing as guest");
                }
                user
            }
            None => None,
        };
        let user = match restored {
            Some(user) => user,
            None => guest_user(&store)?,
        };
        Ok(Self { store, user })
    }

    // --- Session ---

    #[must_use]
    pub fn current_user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.user.is_guest
    }

    pub fn register(&mut self, new: NewUser, today: NaiveDate) -> Result<User> {
        let email = validate_email(&new.email)?;
        validate_password(&new.password)?;
        let name = validate_name(&new.name)?;
        validate_positive("Weight", new.weight_kg)?;
        validate_positive("Height", new.height_m)?;
        if let Some(birth) = new.birth_date {
            validate_birth_date(birth, today)?;
        }
        if email == GUEST_EMAIL || self.store.user_exists(&email)? {
            bail!("An account with email '{email}' already exists");
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            password_hash: hash_password(&new.password),
            birth_date: new.birth_date,
            sex: new.sex,
            weight_kg: new.weight_kg,
            height_m: new.height_m,
            activity_level: new.activity_level,
            goal: new.goal,
            is_guest: false,
        };
        self.store.save_user(&user)?;
        self.record_bmi(&user, today)?;
        self.store.set_session_email(Some(&user.email))?;
        log::info!("registered {}", user.email);
        self.user = user.clone();
        Ok(user)
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<User> {
        let email = validate_email(email)?;
        let user = self
            .store
            .get_user_by_email(&email)?
            .filter(|u| !u.is_guest && verify_password(password, &u.password_hash));
        let Some(user) = user else {
            log::info!("failed login for {email}");
            bail!("Invalid email or password");
        };
        self.store.set_session_email(Some(&user.email))?;
        log::info!("logged in {}", user.email);
        self.user = user.clone();
        Ok(user)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.store.set_session_email(None)?;
        log::info!("logged out {}", self.user.email);
        self.user = guest_user(&self.store)?;
        Ok(())
    }

    // --- Profile ---

    pub fn update_profile(&mut self, update: &ProfileUpdate, today: NaiveDate) -> Result<User> {
        if update.is_empty() {
            bail!("Nothing to update");
        }
        let mut user = self.user.clone();
        if let Some(name) = &update.name {
            user.name = validate_name(name)?;
        }
        if let Some(birth) = update.birth_date {
            if let Some(date) = birth {
                validate_birth_date(date, today)?;
            }
            user.birth_date = birth;
        }
        if let Some(sex) = update.sex {
            user.sex = sex;
        }
        if let Some(weight) = update.weight_kg {
            validate_positive("Weight", weight)?;
            user.weight_kg = weight;
        }
        if let Some(height) = update.height_m {
            validate_positive("Height", height)?;
            user.height_m = height;
        }
        if let Some(level) = update.activity_level {
            user.activity_level = level;
        }
        if let Some(goal) = update.goal {
            user.goal = goal;
        }

        let body_changed = (user.weight_kg - self.user.weight_kg).abs() > f64::EPSILON
            || (user.height_m - self.user.height_m).abs() > f64::EPSILON;
        self.store.save_user(&user)?;
        if body_changed {
            self.record_bmi(&user, today)?;
        }
        self.user = user.clone();
        Ok(user)
    }

    pub fn update_weight(&mut self, weight_kg: f64, today: NaiveDate) -> Result<User> {
        self.update_profile(
            &ProfileUpdate {
                weight_kg: Some(weight_kg),
                ..ProfileUpdate::default()
            },
            today,
        )
    }

    #[must_use]
    pub fn profile_summary(&self, today: NaiveDate) -> ProfileSummary {
        let u = &self.user;
        ProfileSummary {
            name: u.name.clone(),
            email: u.email.clone(),
            weight_kg: u.weight_kg,
            height_m: u.height_m,
            sex: u.sex,
            goal: u.goal,
            activity_level: u.activity_level,
            age: u.birth_date.map(|b| calculator::age_on(b, today)),
            is_guest: u.is_guest,
        }
    }

    fn record_bmi(&self, user: &User, today: NaiveDate) -> Result<()> {
        let bmi = calculator::bmi(user.weight_kg, user.height_m)?;
        self.store.append_bmi_history(&BmiHistoryEntry {
            user_id: user.id.clone(),
            date: today,
            weight_kg: user.weight_kg,
            bmi,
            category: calculator::BmiCategory::from_bmi(bmi).label().to_string(),
        })
    }

    fn profile(&self, today: NaiveDate) -> BodyProfile {
        BodyProfile::from_user(&self.user, today)
    }

    // --- Records ---

    pub fn log_manual(
        &self,
        meal_type: &str,
        portions: Vec<FoodPortion>,
        notes: &str,
        at: NaiveDateTime,
    ) -> Result<FoodRecord> {
        let meal_type = validate_meal_type(meal_type)?;
        if portions.is_empty() {
            bail!("A manual entry needs at least one portion");
        }
        for p in &portions {
            p.validate()?;
        }
        self.insert_record(
            meal_type,
            RecordKind::Manual {
                portions,
                notes: notes.trim().to_string(),
            },
            at,
        )
    }

    pub fn log_analysis(
        &self,
        meal_type: &str,
        analysis: NutritionAnalysis,
        image_hash: Option<String>,
        at: NaiveDateTime,
    ) -> Result<FoodRecord> {
        let meal_type = validate_meal_type(meal_type)?;
        analysis.validate()?;
        self.insert_record(
            meal_type,
            RecordKind::Ai {
                analysis,
                image_hash,
            },
            at,
        )
    }

    pub fn analyze_and_log(
        &self,
        analyzer: &dyn ImageAnalyzer,
        image: &[u8],
        meal_type: &str,
        at: NaiveDateTime,
    ) -> Result<FoodRecord> {
        let meal_type = validate_meal_type(meal_type)?;
        let result = analyzer.analyze(image).context("Image analysis failed")?;
        if result.is_low_confidence() {
            log::warn!("low confidence analysis ({:?})", result.confidence);
        }
        self.log_analysis(&meal_type, result, Some(analysis::image_hash(image)), at)
    }

    fn insert_record(
        &self,
        meal_type: String,
        kind: RecordKind,
        at: NaiveDateTime,
    ) -> Result<FoodRecord> {
        let record = FoodRecord {
            id: Uuid::new_v4().to_string(),
            user_id: self.user.id.clone(),
            logged_at: at,
            meal_type,
            kind,
        };
        if !record.is_valid() {
            bail!("Record totals must not be negative");
        }
        self.store.save_record(&record)?;
        Ok(record)
    }

    pub fn records_for_date(&self, date: NaiveDate) -> Result<Vec<FoodRecord>> {
        self.store.records_for_date(&self.user.id, date)
    }

    pub fn daily_totals(&self, date: NaiveDate) -> Result<DailyTotals> {
        Ok(DailyTotals::from_records(&self.records_for_date(date)?))
    }

    pub fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let records = self.records_for_date(date)?;
        let totals = DailyTotals::from_records(&records);
        let targets = self.goal_macro_targets(date);
        Ok(DailySummary {
            date: date.to_string(),
            records,
            percent_of_calorie_target: totals.percent_of_target(targets.calories),
            calories_remaining: targets.calories - totals.calories,
            meets_calorie_goal: targets.meets_calories(totals.calories),
            meets_protein_goal: targets.meets_protein(totals.protein),
            totals,
            targets,
        })
    }

    /// One entry per calendar day in the window ending at `today`, oldest first.
    pub fn history(&self, days: u32, today: NaiveDate) -> Result<Vec<HistoryDay>> {
        let from = window_start(days, today)?;
        let mut by_date: BTreeMap<NaiveDate, HistoryDay> = BTreeMap::new();
        for offset in 0..i64::from(days) {
            let date = from + Duration::days(offset);
            by_date.insert(
                date,
                HistoryDay {
                    date,
                    record_count: 0,
                    totals: DailyTotals::default(),
                },
            );
        }
        for record in self.store.records_between(&self.user.id, from, today)? {
            if let Some(day) = by_date.get_mut(&record.date()) {
                day.record_count += 1;
                day.totals.add(&record);
            }
        }
        Ok(by_date.into_values().collect())
    }

    /// Delete one of the current user's records. Returns false if no such record.
    pub fn delete_record(&self, id: &str) -> Result<bool> {
        let owned = self
            .store
            .records_for_user(&self.user.id)?
            .iter()
            .any(|r| r.id == id);
        if !owned {
            return Ok(false);
        }
        self.store.delete_record(id)
    }

    /// Expand an id prefix to the full id of one of the current user's records.
    pub fn resolve_record_id(&self, prefix: &str) -> Result<Option<String>> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            bail!("Record id must not be empty");
        }
        let matches: Vec<String> = self
            .store
            .records_for_user(&self.user.id)?
            .into_iter()
            .filter(|r| r.id.starts_with(prefix))
            .map(|r| r.id)
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(id.clone())),
            _ => bail!("Record id '{prefix}' is ambiguous ({} matches)", matches.len()),
        }
    }

    pub fn recent_records(&self, limit: usize) -> Result<Vec<FoodRecord>> {
        self.store.latest_records(&self.user.id, limit)
    }

    pub fn records_by_meal_type(&self, meal_type: &str) -> Result<Vec<FoodRecord>> {
        let meal_type = validate_meal_type(meal_type)?;
        self.store.records_by_meal_type(&self.user.id, &meal_type)
    }

    pub fn user_stats(&self) -> Result<UserStats> {
        self.store.user_stats(&self.user.id)
    }

    // --- Metrics ---

    pub fn bmi_report(&self, today: NaiveDate) -> Result<BmiReport> {
        calculator::bmi_report(&self.profile(today))
    }

    #[must_use]
    pub fn bmr_summary(&self, body_fat_pct: Option<f64>, today: NaiveDate) -> BmrSummary {
        calculator::bmr_summary(&self.profile(today), body_fat_pct)
    }

    #[must_use]
    pub fn daily_calories(&self, today: NaiveDate) -> f64 {
        calculator::daily_calories(&self.profile(today))
    }

    #[must_use]
    pub fn macro_targets(&self, split: MacroSplit, today: NaiveDate) -> MacronutrientTargets {
        calculator::macro_targets(&self.profile(today), split)
    }

    /// Targets using the split recommended for the user's goal.
    #[must_use]
    pub fn goal_macro_targets(&self, today: NaiveDate) -> MacronutrientTargets {
        calculator::macro_targets_for(
            self.daily_calories(today),
            calculator::goal_macro_split(self.user.goal),
        )
    }

    pub fn goal_calories(&self, goal: Goal, rate_kg_per_week: f64, today: NaiveDate) -> Result<f64> {
        if !rate_kg_per_week.is_finite() || rate_kg_per_week < 0.0 {
            bail!("Rate must be a non-negative number");
        }
        Ok(calculator::goal_calories(
            &self.profile(today),
            goal,
            rate_kg_per_week,
        ))
    }

    #[must_use]
    pub fn water(&self, hot_climate: bool) -> WaterRecommendation {
        WaterRecommendation {
            base_liters: calculator::daily_water_liters(self.user.weight_kg),
            recommended_liters: calculator::recommended_water_liters(
                self.user.weight_kg,
                self.user.activity_level,
                hot_climate,
            ),
            hot_climate,
        }
    }

    pub fn body_fat(&self, today: NaiveDate) -> Result<f64> {
        let profile = self.profile(today);
        let bmi = calculator::bmi(profile.weight_kg, profile.height_m)?;
        Ok(calculator::round2(calculator::body_fat_deurenberg(
            bmi,
            profile.age,
            profile.sex,
        )))
    }

    pub fn progress(&self, days: u32, today: NaiveDate) -> Result<ProgressReport> {
        let from = window_start(days, today)?;
        let records = self.store.records_between(&self.user.id, from, today)?;
        calculator::progress_report(&records, &self.goal_macro_targets(today), days)
    }

    pub fn bmi_history(&self) -> Result<Vec<BmiHistoryEntry>> {
        self.store.bmi_history_for_user(&self.user.id)
    }
}

/// First day of a `days`-long window ending at `today`.
fn window_start(days: u32, today: NaiveDate) -> Result<NaiveDate> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        bail!("Days must be between 1 and {MAX_WINDOW_DAYS}");
    }
    today
        .checked_sub_signed(Duration::days(i64::from(days) - 1))
        .with_context(|| format!("{days} days before {today} is out of range"))
}

/// The shared guest account, created on first use.
fn guest_user(store: &Store) -> Result<User> {
    if let Some(user) = store.get_user_by_email(GUEST_EMAIL)? {
        return Ok(user);
    }
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: "Guest".to_string(),
        email: GUEST_EMAIL.to_string(),
        password_hash: String::new(),
        birth_date: NaiveDate::from_ymd_opt(2000, 1, 1),
        sex: Sex::Other,
        weight_kg: 70.0,
        height_m: 1.70,
        activity_level: ActivityLevel::Sedentary,
        goal: Goal::MaintainWeight,
        is_guest: true,
    };
    store.save_user(&user)?;
    log::debug!("created guest account");
    Ok(user)
}

// Stored as "<salt hex>$<sha256(salt || password) hex>".
fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::rng().random();
    let salt_hex = analysis::to_hex(&salt);
    format!("{salt_hex}${}", salted_digest(&salt_hex, password))
}

fn verify_password(password: &str, stored: &str) -> bool {
    stored
        .split_once('$')
        .is_some_and(|(salt, digest)| salted_digest(salt, password) == digest)
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    analysis::to_hex(&hasher.finalize())
}
