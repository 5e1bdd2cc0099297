use std::sync::Arc;

use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::AppError;
use crate::models::{List, Task, User, flag_value};

pub const INDEX: &str = "index.html";
pub const LOGIN: &str = "login.html";
pub const SIGN_UP: &str = "sign_up.html";

#[derive(Clone)]
pub struct Templates {
    tera: Arc<Tera>,
}

impl Templates {
    pub fn new() -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            (INDEX, include_str!("../templates/index.html")),
            (LOGIN, include_str!("../templates/login.html")),
            (SIGN_UP, include_str!("../templates/sign_up.html")),
        ])?;

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    pub fn render<T: Serialize>(&self, name: &str, page: &T) -> Result<Html<String>, AppError> {
        let context = Context::from_serialize(page)?;
        Ok(Html(self.tera.render(name, &context)?))
    }
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: i64,
    pub description: String,
    pub is_done: bool,
    pub star: bool,
    pub done_flag: u8,
    pub star_flag: u8,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            done_flag: flag_value(task.is_done),
            star_flag: flag_value(task.star),
            description: task.description,
            is_done: task.is_done,
            star: task.star,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct IndexPage {
    pub logged_in: bool,
    pub user: Option<User>,
    pub user_list: Option<List>,
    pub tasks: Vec<TaskView>,
    pub task: String,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct LoginPage {
    pub email: String,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SignUpPage {
    pub email: String,
    pub name: String,
    pub error: Option<String>,
}
