mod helpers;
mod import;
mod log;
mod recommend;
mod summary;
mod target;

pub(crate) use import::{cmd_export, cmd_import, export_path};
pub(crate) use log::{cmd_log, cmd_recent};
pub(crate) use recommend::{PlannerOverrides, cmd_recommend, cmd_recommendations};
pub(crate) use summary::{cmd_dashboard, cmd_stats};
pub(crate) use target::{cmd_profile_set, cmd_profile_show, cmd_target_set, cmd_target_show};
