//! 安全运营：活动调度、提案审批与服务装配

pub mod catalog;
pub mod prompts;
pub mod proposal;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod types;

pub use prompts::{build_activity_prompt, ActivityKind};
pub use proposal::{ProposalNotifications, ProposalStore, NOTIFICATION_CAPACITY};
pub use schedule::{parse_schedule, DEFAULT_INTERVAL, MAX_INTERVAL};
pub use scheduler::{ActivityScheduler, ActivitySnapshot, SECOPS_CHANNEL};
pub use service::SecOpsService;
pub use types::{
    ActionKind, Activity, ActivityMode, Param, ParamType, Proposal, ProposalAction,
    ProposalStatus,
};
