use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{BmiHistoryEntry, FoodRecord, User, UserStats, validate_positive};

const USERS_FILE: &str = "users.json";
const RECORDS_FILE: &str = "food_records.json";
const SESSION_FILE: &str = "session.json";
const BMI_HISTORY_FILE: &str = "bmi_history.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Session {
    #[serde(default)]
    email: Option<String>,
}

enum Backend {
    Dir(PathBuf),
    Memory(RefCell<HashMap<&'static str, String>>),
}

/// Whole-file JSON persistence. Every write rewrites the file it touches.
pub struct Store {
    backend: Backend,
}

impl Store {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        Ok(Self {
            backend: Backend::Dir(dir.to_path_buf()),
        })
    }

    #[allow(clippy::unnecessary_wraps)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            backend: Backend::Memory(RefCell::new(HashMap::new())),
        })
    }

    fn read_raw(&self, file: &'static str) -> Result<Option<String>> {
        match &self.backend {
            Backend::Dir(dir) => {
                let path = dir.join(file);
                if !path.exists() {
                    return Ok(None);
                }
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Some(text))
            }
            Backend::Memory(map) => Ok(map.borrow().get(file).cloned()),
        }
    }

    fn write_raw(&self, file: &'static str, text: String) -> Result<()> {
        match &self.backend {
            Backend::Dir(dir) => {
                let path = dir.join(file);
                let tmp = dir.join(format!("{file}.tmp"));
                fs::write(&tmp, text)
                    .with_context(|| format!("Failed to write {}", tmp.display()))?;
                fs::rename(&tmp, &path)
                    .with_context(|| format!("Failed to replace {}", path.display()))?;
                log::debug!("wrote {}", path.display());
            }
            Backend::Memory(map) => {
                map.borrow_mut().insert(file, text);
            }
        }
        Ok(())
    }

    fn load<T: DeserializeOwned + Default>(&self, file: &'static str) -> Result<T> {
        let Some(text) = self.read_raw(file)? else {
            return Ok(T::default());
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(T::default());
        }
        // Older builds wrote an empty object where a list was expected.
        if trimmed == "{}" {
            if let Ok(value) = serde_json::from_str::<T>(trimmed) {
                return Ok(value);
            }
            log::warn!("{file} holds an empty object, treating it as empty");
            return Ok(T::default());
        }
        serde_json::from_str(trimmed).with_context(|| format!("Corrupt data file: {file}"))
    }

    fn save<T: Serialize + ?Sized>(&self, file: &'static str, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {file}"))?;
        self.write_raw(file, text)
    }

    // --- Users ---

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.load(USERS_FILE)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self.list_users()?.into_iter().find(|u| u.email == email))
    }

    pub fn user_exists(&self, email: &str) -> Result<bool> {
        Ok(self.get_user_by_email(email)?.is_some())
    }

    /// Insert or replace the user with the same email.
    pub fn save_user(&self, user: &User) -> Result<()> {
        validate_positive("Weight", user.weight_kg)?;
        validate_positive("Height", user.height_m)?;
        let mut users = self.list_users()?;
        match users.iter_mut().find(|u| u.email == user.email) {
            Some(existing) => *existing = user.clone(),
            None => users.push(user.clone()),
        }
        self.save(USERS_FILE, &users)
    }

    // --- Session ---

    pub fn session_email(&self) -> Result<Option<String>> {
        let session: Session = self.load(SESSION_FILE)?;
        Ok(session.email)
    }

    pub fn set_session_email(&self, email: Option<&str>) -> Result<()> {
        self.save(
            SESSION_FILE,
            &Session {
                email: email.map(str::to_string),
            },
        )
    }

    // --- Food records ---

    pub fn list_records(&self) -> Result<Vec<FoodRecord>> {
        self.load(RECORDS_FILE)
    }

    /// Insert or replace the record with the same id.
    pub fn save_record(&self, record: &FoodRecord) -> Result<()> {
        if !record.is_valid() {
            bail!("Record {} has totals that are negative or not numbers", record.id);
        }
        let mut records = self.list_records()?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.save(RECORDS_FILE, &records)
    }

    pub fn records_for_user(&self, user_id: &str) -> Result<Vec<FoodRecord>> {
        Ok(self
            .list_records()?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect())
    }

    pub fn records_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<FoodRecord>> {
        let mut records: Vec<FoodRecord> = self
            .records_for_user(user_id)?
            .into_iter()
            .filter(|r| r.date() == date)
            .collect();
        records.sort_by_key(|r| r.logged_at);
        Ok(records)
    }

    pub fn records_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FoodRecord>> {
        let mut records: Vec<FoodRecord> = self
            .records_for_user(user_id)?
            .into_iter()
            .filter(|r| (from..=to).contains(&r.date()))
            .collect();
        records.sort_by_key(|r| r.logged_at);
        Ok(records)
    }

    pub fn records_by_meal_type(&self, user_id: &str, meal_type: &str) -> Result<Vec<FoodRecord>> {
        Ok(self
            .records_for_user(user_id)?
            .into_iter()
            .filter(|r| r.meal_type == meal_type)
            .collect())
    }

    /// Newest first.
    pub fn latest_records(&self, user_id: &str, limit: usize) -> Result<Vec<FoodRecord>> {
        let mut records = self.records_for_user(user_id)?;
        records.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
        records.truncate(limit);
        Ok(records)
    }

    pub fn delete_record(&self, id: &str) -> Result<bool> {
        let mut records = self.list_records()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(RECORDS_FILE, &records)?;
        Ok(true)
    }

    pub fn clear_records(&self) -> Result<()> {
        self.save(RECORDS_FILE, &Vec::<FoodRecord>::new())
    }

    pub fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        let records = self.records_for_user(user_id)?;
        let total_calories: f64 = records.iter().map(FoodRecord::calories).sum();
        let days = records.iter().map(FoodRecord::date).collect::<HashSet<_>>().len();
        #[allow(clippy::cast_precision_loss)]
        let average_daily_calories = if days == 0 {
            0.0
        } else {
            total_calories / days as f64
        };
        Ok(UserStats {
            total_records: records.len(),
            total_calories,
            total_protein: records.iter().map(FoodRecord::protein).sum(),
            total_fiber: records.iter().map(FoodRecord::fiber).sum(),
            days_with_records: days,
            average_daily_calories,
        })
    }

    // --- BMI history ---

    pub fn append_bmi_history(&self, entry: &BmiHistoryEntry) -> Result<()> {
        validate_positive("Weight", entry.weight_kg)?;
        validate_positive("BMI", entry.bmi)?;
        let mut history: Vec<BmiHistoryEntry> = self.load(BMI_HISTORY_FILE)?;
        history.push(entry.clone());
        self.save(BMI_HISTORY_FILE, &history)
    }

    pub fn bmi_history_for_user(&self, user_id: &str) -> Result<Vec<BmiHistoryEntry>> {
        let history: Vec<BmiHistoryEntry> = self.load(BMI_HISTORY_FILE)?;
        Ok(history.into_iter().filter(|e| e.user_id == user_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityLevel, FoodPortion, Goal, NutritionAnalysis, PortionUnit, RecordKind, Sex,
    };

    fn sample_user(email: &str) -> User {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Ana".to_string(),
            email: email.to_string(),
            password_hash: String::new(),
            birth_date: None,
            sex: Sex::Female,
            weight_kg: 60.0,
            height_m: 1.65,
            activity_level: ActivityLevel::Light,
            goal: Goal::MaintainWeight,
            is_guest: false,
        }
    }

    fn sample_record(id: &str, user_id: &str, date: &str, hour: u32, kcal: f64) -> FoodRecord {
        FoodRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            logged_at: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            meal_type: if hour < 11 { "breakfast" } else { "dinner" }.to_string(),
            kind: RecordKind::Manual {
                portions: vec![FoodPortion {
                    description: "Bread".to_string(),
                    quantity: 1.0,
                    unit: PortionUnit::Slice,
                    category: None,
                    calories_per_unit: kcal,
                    protein_per_unit: 3.0,
                    carbs_per_unit: 0.0,
                    fat_per_unit: 0.0,
                    fiber_per_unit: 1.0,
                }],
                notes: String::new(),
            },
        }
    }

    #[test]
    fn test_empty_store_reads_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_users().unwrap().is_empty());
        assert!(store.list_records().unwrap().is_empty());
        assert!(store.session_email().unwrap().is_none());
    }

    #[test]
    fn test_save_user_upserts_by_email() {
        let store = Store::open_in_memory().unwrap();
        let mut user = sample_user("ana@example.com");
        store.save_user(&user).unwrap();
        user.weight_kg = 62.0;
        store.save_user(&user).unwrap();
        store.save_user(&sample_user("bo@example.com")).unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 2);
        let ana = store.get_user_by_email(" ANA@example.com").unwrap().unwrap();
        assert!((ana.weight_kg - 62.0).abs() < f64::EPSILON);
        assert!(store.user_exists("bo@example.com").unwrap());
        assert!(!store.user_exists("cy@example.com").unwrap());
    }

    #[test]
    fn test_session_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store.set_session_email(Some("ana@example.com")).unwrap();
        assert_eq!(store.session_email().unwrap().as_deref(), Some("ana@example.com"));
        store.set_session_email(None).unwrap();
        assert!(store.session_email().unwrap().is_none());
    }

    #[test]
    fn test_records_queries() {
        let store = Store::open_in_memory().unwrap();
        store.save_record(&sample_record("a", "u1", "2024-06-15", 8, 100.0)).unwrap();
        store.save_record(&sample_record("b", "u1", "2024-06-15", 19, 300.0)).unwrap();
        store.save_record(&sample_record("c", "u1", "2024-06-16", 8, 200.0)).unwrap();
        store.save_record(&sample_record("d", "u2", "2024-06-15", 8, 999.0)).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let on_day = store.records_for_date("u1", day).unwrap();
        assert_eq!(on_day.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        let latest = store.latest_records("u1", 2).unwrap();
        assert_eq!(latest.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["c", "b"]);

        let breakfasts = store.records_by_meal_type("u1", "breakfast").unwrap();
        assert_eq!(breakfasts.len(), 2);

        let stats = store.user_stats("u1").unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.days_with_records, 2);
        assert!((stats.total_calories - 600.0).abs() < 1e-9);
        assert!((stats.average_daily_calories - 300.0).abs() < 1e-9);
        assert!((stats.total_protein - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_record_replaces_same_id() {
        let store = Store::open_in_memory().unwrap();
        store.save_record(&sample_record("a", "u1", "2024-06-15", 8, 100.0)).unwrap();
        store.save_record(&sample_record("a", "u1", "2024-06-15", 8, 250.0)).unwrap();
        let records = store.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].calories() - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_delete_and_clear_records() {
        let store = Store::open_in_memory().unwrap();
        store.save_record(&sample_record("a", "u1", "2024-06-15", 8, 100.0)).unwrap();
        store.save_record(&sample_record("b", "u1", "2024-06-15", 9, 100.0)).unwrap();
        assert!(store.delete_record("a").unwrap());
        assert!(!store.delete_record("a").unwrap());
        assert_eq!(store.list_records().unwrap().len(), 1);
        store.clear_records().unwrap();
        assert!(store.list_records().unwrap().is_empty());
    }

    #[test]
    fn test_on_disk_persistence() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.save_user(&sample_user("ana@example.com")).unwrap();
            store.save_record(&sample_record("a", "u1", "2024-06-15", 8, 100.0)).unwrap();
        }
        assert!(dir.path().join("users.json").exists());
        assert!(!dir.path().join("users.json.tmp").exists());

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.list_users().unwrap().len(), 1);
        assert_eq!(store.list_records().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_and_legacy_object_files_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("users.json"), "   \n").unwrap();
        fs::write(dir.path().join("food_records.json"), "{}").unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(store.list_users().unwrap().is_empty());
        assert!(store.list_records().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("food_records.json"), "[{not json").unwrap();
        let store = Store::open(dir.path()).unwrap();
        let err = store.list_records().unwrap_err();
        assert!(format!("{err:#}").contains("food_records.json"));
    }

    #[test]
    fn test_rejected_writes_leave_files_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save_user(&sample_user("ana@example.com")).unwrap();
        store.save_record(&sample_record("a", "u1", "2024-06-15", 8, 100.0)).unwrap();

        let mut user = sample_user("bo@example.com");
        user.weight_kg = f64::INFINITY;
        assert!(store.save_user(&user).is_err());
        user.weight_kg = 60.0;
        user.height_m = f64::NAN;
        assert!(store.save_user(&user).is_err());

        assert!(
            store
                .save_record(&sample_record("b", "u1", "2024-06-15", 9, f64::INFINITY))
                .is_err()
        );
        let mut negative_fat = sample_record("c", "u1", "2024-06-15", 10, 100.0);
        if let RecordKind::Manual { portions, .. } = &mut negative_fat.kind {
            portions[0].fat_per_unit = -1.0;
        }
        assert!(store.save_record(&negative_fat).is_err());

        assert!(
            store
                .append_bmi_history(&BmiHistoryEntry {
                    user_id: "u1".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
                    weight_kg: 60.0,
                    bmi: f64::NAN,
                    category: String::new(),
                })
                .is_err()
        );

        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.list_users().unwrap().len(), 1);
        assert_eq!(reopened.list_records().unwrap().len(), 1);
        assert!(reopened.bmi_history_for_user("u1").unwrap().is_empty());
    }

    #[test]
    fn test_bmi_history_filtered_by_user() {
        let store = Store::open_in_memory().unwrap();
        for (user, bmi) in [("u1", 22.0), ("u2", 30.0), ("u1", 22.5)] {
            store
                .append_bmi_history(&BmiHistoryEntry {
                    user_id: user.to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
                    weight_kg: 60.0,
                    bmi,
                    category: "Normal".to_string(),
                })
                .unwrap();
        }
        let history = store.bmi_history_for_user("u1").unwrap();
        assert_eq!(history.len(), 2);
        assert!((history[1].bmi - 22.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ai_record_persists_kind() {
        let store = Store::open_in_memory().unwrap();
        let mut record = sample_record("x", "u1", "2024-06-15", 12, 0.0);
        record.kind = RecordKind::Ai {
            analysis: NutritionAnalysis {
                description: Some("Salad".to_string()),
                calories: 320.0,
                protein: 12.0,
                fiber: 6.0,
                carbs: None,
                fat: None,
                confidence: Some(0.7),
                source: None,
            },
            image_hash: Some("abc".to_string()),
        };
        store.save_record(&record).unwrap();
        let loaded = &store.list_records().unwrap()[0];
        assert!(matches!(
            &loaded.kind,
            RecordKind::Ai { image_hash: Some(h), .. } if h == "abc"
        ));
    }
}
