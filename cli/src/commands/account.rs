use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use std::io::{self, BufRead, Write};

use nutrify_core::models::{ActivityLevel, Goal, NewUser, ProfileSummary, ProfileUpdate, Sex};
use nutrify_core::service::NutrifyService;

pub(crate) struct RegisterArgs {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub birth_date: Option<String>,
    pub sex: Sex,
    pub weight_kg: f64,
    pub height_m: f64,
    pub activity: ActivityLevel,
    pub goal: Goal,
}

/// Read a password from stdin when it was not given on the command line.
fn read_password(given: Option<String>) -> Result<String> {
    if let Some(p) = given {
        return Ok(p);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let line = io::stdin()
        .lock()
        .lines()
        .next()
        .context("No password given")??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn parse_birth_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid birth date '{s}'. Use YYYY-MM-DD"))
}

pub(crate) fn cmd_register(svc: &mut NutrifyService, args: RegisterArgs, json: bool) -> Result<()> {
    let password = read_password(args.password)?;
    let birth_date = args.birth_date.as_deref().map(parse_birth_date).transpose()?;
    let today = Local::now().date_naive();
    let user = svc.register(
        NewUser {
            name: args.name,
            email: args.email,
            password,
            birth_date,
            sex: args.sex,
            weight_kg: args.weight_kg,
            height_m: args.height_m,
            activity_level: args.activity,
            goal: args.goal,
        },
        today,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&svc.profile_summary(today))?);
    } else {
        println!("Registered and logged in as {} <{}>", user.name, user.email);
    }
    Ok(())
}

pub(crate) fn cmd_login(
    svc: &mut NutrifyService,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = read_password(password)?;
    let user = svc.login(email, &password)?;
    if json {
        println!("{}", serde_json::json!({ "logged_in": user.email }));
    } else {
        println!("Logged in as {} <{}>", user.name, user.email);
    }
    Ok(())
}

pub(crate) fn cmd_logout(svc: &mut NutrifyService, json: bool) -> Result<()> {
    if svc.is_guest() {
        if json {
            println!("{}", serde_json::json!({ "logged_out": false }));
        } else {
            eprintln!("Not logged in (guest mode)");
        }
        return Ok(());
    }
    svc.logout()?;
    if json {
        println!("{}", serde_json::json!({ "logged_out": true }));
    } else {
        println!("Logged out. Continuing in guest mode.");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(svc: &NutrifyService, json: bool) -> Result<()> {
    let user = svc.current_user();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "name": user.name,
                "email": user.email,
                "is_guest": user.is_guest,
            })
        );
    } else if user.is_guest {
        println!("Guest (not logged in)");
    } else {
        println!("{} <{}>", user.name, user.email);
    }
    Ok(())
}

pub(crate) fn cmd_profile_show(svc: &NutrifyService, json: bool) -> Result<()> {
    let summary = svc.profile_summary(Local::now().date_naive());
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_profile(&summary);
    }
    Ok(())
}

fn print_profile(p: &ProfileSummary) {
    let guest = if p.is_guest { " (guest)" } else { "" };
    println!("{}{guest} <{}>", p.name, p.email);
    println!("  Weight:   {:.1} kg", p.weight_kg);
    println!("  Height:   {:.2} m", p.height_m);
    match p.age {
        Some(age) => println!("  Age:      {age}"),
        None => println!("  Age:      unknown"),
    }
    println!("  Sex:      {}", p.sex);
    println!("  Activity: {}", p.activity_level);
    println!("  Goal:     {}", p.goal);
}

pub(crate) struct ProfileArgs {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub clear_birth_date: bool,
    pub sex: Option<Sex>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub activity: Option<ActivityLevel>,
    pub goal: Option<Goal>,
}

pub(crate) fn cmd_profile_set(svc: &mut NutrifyService, args: ProfileArgs, json: bool) -> Result<()> {
    let birth_date = match (args.birth_date, args.clear_birth_date) {
        (Some(_), true) => bail!("--birth-date and --clear-birth-date are mutually exclusive"),
        (Some(s), false) => Some(Some(parse_birth_date(&s)?)),
        (None, true) => Some(None),
        (None, false) => None,
    };
    let update = ProfileUpdate {
        name: args.name,
        birth_date,
        sex: args.sex,
        weight_kg: args.weight_kg,
        height_m: args.height_m,
        activity_level: args.activity,
        goal: args.goal,
    };
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one of --name, --weight, --height, ...");
    }

    let today = Local::now().date_naive();
    svc.update_profile(&update, today)?;
    let summary = svc.profile_summary(today);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Profile updated");
        print_profile(&summary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_birth_date() {
        assert_eq!(
            parse_birth_date(" 1990-05-01 ").unwrap(),
            NaiveDate::from_ymd_opt(1990, 5, 1).unwrap()
        );
        assert!(parse_birth_date("01/05/1990").is_err());
    }

    #[test]
    fn test_read_password_prefers_argument() {
        assert_eq!(read_password(Some("secret1".to_string())).unwrap(), "secret1");
    }

    #[test]
    fn test_profile_set_conflicting_birth_flags() {
        let mut svc = NutrifyService::new_in_memory().unwrap();
        let args = ProfileArgs {
            name: None,
            birth_date: Some("1990-01-01".to_string()),
            clear_birth_date: true,
            sex: None,
            weight_kg: None,
            height_m: None,
            activity: None,
            goal: None,
        };
        assert!(cmd_profile_set(&mut svc, args, true).is_err());
    }

    #[test]
    fn test_profile_set_updates_weight() {
        let mut svc = NutrifyService::new_in_memory().unwrap();
        let args = ProfileArgs {
            name: None,
            birth_date: None,
            clear_birth_date: false,
            sex: None,
            weight_kg: Some(72.5),
            height_m: None,
            activity: None,
            goal: None,
        };
        cmd_profile_set(&mut svc, args, true).unwrap();
        assert!((svc.current_user().weight_kg - 72.5).abs() < f64::EPSILON);
    }
}
