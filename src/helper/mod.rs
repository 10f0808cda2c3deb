pub mod admin_helpers;
pub mod auth_helpers;
pub mod file_helpers;
pub mod form_helpers;
pub mod i18n;
pub mod language;
pub mod mail_helpers;
pub mod mailchimp_helpers;
pub mod public_helpers;
pub mod render_helpers;
pub mod sanitization_helpers;
pub mod session_helpers;
pub mod sitemap_helpers;
pub mod slug_helpers;
pub mod static_helpers;
