mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::process;

use crate::commands::{
    PortionArgs, ProfileArgs, RegisterArgs, cmd_analyze, cmd_bmi, cmd_bmi_history, cmd_bmr,
    cmd_delete, cmd_goal_calories, cmd_history, cmd_log, cmd_login, cmd_logout, cmd_profile_set,
    cmd_profile_show, cmd_progress, cmd_recent, cmd_register, cmd_stats, cmd_summary, cmd_targets,
    cmd_water, cmd_whoami,
};
use crate::config::Config;
use nutrify_core::calculator::MacroSplit;
use nutrify_core::models::{ActivityLevel, FoodCategory, Goal, Sex};
use nutrify_core::service::{MAX_WINDOW_DAYS, NutrifyService};

#[derive(Parser)]
#[command(
    name = "nutrify",
    version,
    about = "A simple, local-first nutrition tracker",
    long_about = "Log meals, track calories and macronutrients against your goals, \
                  and keep an eye on BMI.\n\nData lives in flat JSON files in the \
                  data directory (override with NUTRIFY_DATA_DIR)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and log in
    Register {
        /// Display name
        #[arg(long)]
        name: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// Password (min 6 characters; read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<String>,
        /// Sex: male, female, other
        #[arg(long, default_value = "other")]
        sex: Sex,
        /// Weight in kg
        #[arg(long)]
        weight: f64,
        /// Height in metres (e.g. 1.75)
        #[arg(long)]
        height: f64,
        /// Activity: sedentary, light, moderate, intense, very_intense
        #[arg(long, default_value = "sedentary")]
        activity: ActivityLevel,
        /// Goal: lose, maintain, gain
        #[arg(long, default_value = "maintain")]
        goal: Goal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log in to an existing account
    Login {
        /// Email address
        email: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log out and return to guest mode
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show who is logged in
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Log a food portion manually
    Log {
        /// Food description
        food: String,
        /// Amount eaten (e.g. "150g", "2 cups", "1 slice")
        amount: String,
        /// Calories per unit of the amount (per gram for "150g")
        #[arg(long)]
        calories: f64,
        /// Protein grams per unit
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbohydrate grams per unit
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat grams per unit
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Fiber grams per unit
        #[arg(long, default_value = "0")]
        fiber: f64,
        /// Food category (fruit, vegetable, grain, protein, dairy, fat, sweet, beverage, other)
        #[arg(long)]
        category: Option<FoodCategory>,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Estimate a meal's nutrition from a photo and log it
    Analyze {
        /// Path to the image file
        image: PathBuf,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a record by ID (a unique prefix is enough)
    Delete {
        /// Record ID or prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent records
    Recent {
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only show this meal type
        #[arg(short, long)]
        meal: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily summary (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show totals for the last N days
    History {
        /// Number of days to show
        #[arg(
            short,
            long,
            default_value = "7",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS))
        )]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show all-time logging statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show BMI, health risk, ideal weight range and estimated body fat
    Bmi {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show BMI changes over time
    BmiHistory {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show basal metabolic rate by several formulas
    Bmr {
        /// Body fat percentage, enables Katch-McArdle
        #[arg(long)]
        body_fat: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily calorie and macronutrient targets
    Targets {
        /// Split: standard, high_protein, low_carb, balanced, athlete (default: by goal)
        #[arg(long)]
        split: Option<MacroSplit>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Calories per day to lose or gain weight at a given rate
    GoalCalories {
        /// Goal: lose, maintain, gain
        #[arg(long)]
        goal: Goal,
        /// Rate of change in kg per week
        #[arg(long, default_value = "0.5")]
        rate: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recommended daily water intake
    Water {
        /// Adjust for a hot climate
        #[arg(long)]
        hot: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyze intake against targets over the last N days
    Progress {
        /// Number of days to analyze
        #[arg(
            short,
            long,
            default_value = "7",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS))
        )]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update profile fields
    Set {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<String>,
        /// Forget the stored birth date
        #[arg(long)]
        clear_birth_date: bool,
        /// Sex: male, female, other
        #[arg(long)]
        sex: Option<Sex>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Height in metres
        #[arg(long)]
        height: Option<f64>,
        /// Activity: sedentary, light, moderate, intense, very_intense
        #[arg(long)]
        activity: Option<ActivityLevel>,
        /// Goal: lose, maintain, gain
        #[arg(long)]
        goal: Option<Goal>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut svc = NutrifyService::new(&config.data_dir)?;

    match cli.command {
        Commands::Register {
            name,
            email,
            password,
            birth_date,
            sex,
            weight,
            height,
            activity,
            goal,
            json,
        } => cmd_register(
            &mut svc,
            RegisterArgs {
                name,
                email,
                password,
                birth_date,
                sex,
                weight_kg: weight,
                height_m: height,
                activity,
                goal,
            },
            json,
        ),
        Commands::Login {
            email,
            password,
            json,
        } => cmd_login(&mut svc, &email, password, json),
        Commands::Logout { json } => cmd_logout(&mut svc, json),
        Commands::Whoami { json } => cmd_whoami(&svc, json),
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&svc, json),
            ProfileCommands::Set {
                name,
                birth_date,
                clear_birth_date,
                sex,
                weight,
                height,
                activity,
                goal,
                json,
            } => cmd_profile_set(
                &mut svc,
                ProfileArgs {
                    name,
                    birth_date,
                    clear_birth_date,
                    sex,
                    weight_kg: weight,
                    height_m: height,
                    activity,
                    goal,
                },
                json,
            ),
        },
        Commands::Log {
            food,
            amount,
            calories,
            protein,
            carbs,
            fat,
            fiber,
            category,
            meal,
            notes,
            date,
            json,
        } => cmd_log(
            &svc,
            PortionArgs {
                description: food,
                amount,
                calories,
                protein,
                carbs,
                fat,
                fiber,
                category,
            },
            &meal,
            notes.as_deref(),
            date,
            json,
        ),
        Commands::Analyze {
            image,
            meal,
            date,
            json,
        } => cmd_analyze(&svc, &image, &meal, date, json),
        Commands::Delete { id, json } => cmd_delete(&svc, &id, json),
        Commands::Recent { limit, meal, json } => cmd_recent(&svc, limit, meal.as_deref(), json),
        Commands::Summary { date, json } => cmd_summary(&svc, date, json),
        Commands::History { days, json } => cmd_history(&svc, days, json),
        Commands::Stats { json } => cmd_stats(&svc, json),
        Commands::Bmi { json } => cmd_bmi(&svc, json),
        Commands::BmiHistory { json } => cmd_bmi_history(&svc, json),
        Commands::Bmr { body_fat, json } => cmd_bmr(&svc, body_fat, json),
        Commands::Targets { split, json } => cmd_targets(&svc, split, json),
        Commands::GoalCalories { goal, rate, json } => cmd_goal_calories(&svc, goal, rate, json),
        Commands::Water { hot, json } => cmd_water(&svc, hot, json),
        Commands::Progress { days, json } => cmd_progress(&svc, days, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            server::start_server(svc, port, &bind, api_key, new_api_key).await
        }
    }
}
