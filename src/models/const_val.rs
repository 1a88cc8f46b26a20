pub const API_KEY_HEADER: &str = "x-api-key";
pub const REQUEST_ID_HEADER: &str = "x-invitee-request";
pub const DB_CLOSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);
