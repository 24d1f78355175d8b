pub mod dive;
pub mod notification;

pub use dive::divers_for_day;
pub use notification::{actively_traded, build_candidates, select_for_notification};
