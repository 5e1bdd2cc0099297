use chrono::Local;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct List {
    pub id: i64,
    pub name_of_list: Option<String>,
    pub user_id: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub description: String,
    pub is_done: bool,
    pub star: bool,
    pub user_id: i64,
    pub list_id: i64,
}

/// Fields for a user that has not been stored yet. `password` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Date label for a list created now, e.g. `2024-05-01`.
pub fn today_label() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// URL value for a flag, matching how flags are stored.
pub fn flag_value(flag: bool) -> u8 {
    u8::from(flag)
}
