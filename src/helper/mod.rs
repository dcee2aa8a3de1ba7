pub mod activity_helpers;
pub mod approval_helpers;
pub mod auth_helpers;
pub mod category_helpers;
pub mod notification_helpers;
pub mod post_helpers;
pub mod rss_helpers;
pub mod sanitization_helpers;
pub mod scheduler_helpers;
pub mod user_helpers;
pub mod workflow;
