mod account;
mod helpers;
mod metrics;
mod records;
mod summary;

pub(crate) use account::{
    ProfileArgs, RegisterArgs, cmd_login, cmd_logout, cmd_profile_set, cmd_profile_show,
    cmd_register, cmd_whoami,
};
pub(crate) use metrics::{
    cmd_bmi, cmd_bmi_history, cmd_bmr, cmd_goal_calories, cmd_progress, cmd_targets, cmd_water,
};
pub(crate) use records::{PortionArgs, cmd_analyze, cmd_delete, cmd_log, cmd_recent};
pub(crate) use summary::{cmd_history, cmd_stats, cmd_summary};
