mod login;
mod renew;
mod status;

pub use login::login_command;
pub use renew::renew_command;
pub use status::status_command;

use crate::credentials::Credentials;

/// Human description of how long the stored token has left.
pub fn describe_expiry(credentials: &Credentials, now: i64) -> String {
    if credentials.access_token.is_none() {
        return "No access token".to_string();
    }

    match credentials.expires_at_epoch() {
        None => "No expiration information available".to_string(),
        Some(expires_at) if expires_at > now => {
            let remaining = expires_at - now;
            let hours = remaining / 3600;
            let minutes = (remaining % 3600) / 60;
            let at = chrono::DateTime::from_timestamp(expires_at, 0)
                .map(|t| t.with_timezone(&chrono::Local).format(" (at %Y-%m-%d %H:%M)").to_string())
                .unwrap_or_default();
            if hours > 0 {
                format!("Token expires in {hours}h {minutes}m{at}")
            } else {
                format!("Token expires in {minutes}m{at}")
            }
        }
        Some(_) => "Token is expired".to_string(),
    }
}
