use axum::extract::{Extension, Form, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::auth::{
    AuthUser, Session, hash_password, new_session_token, removal_cookie, session_cookie,
    set_cookie, verify_password,
};
use crate::db::is_unique_violation;
use crate::error::AppError;
use crate::models::{NewUser, Task, User, today_label};
use crate::state::AppState;
use crate::views::{INDEX, IndexPage, LOGIN, LoginPage, SIGN_UP, SignUpPage};

#[derive(Debug, Default, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub task: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignUpForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

fn home_redirect() -> Response {
    Redirect::to("/").into_response()
}

fn invalid(page: Html<String>) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, page).into_response()
}

async fn index_page(state: &AppState, user: Option<&User>) -> Result<IndexPage, AppError> {
    let Some(user) = user else {
        return Ok(IndexPage::default());
    };

    let user_list = state.db.ensure_current_list(user.id, &today_label()).await?;
    let tasks = state.db.tasks_for_user(user.id).await?;

    Ok(IndexPage {
        logged_in: true,
        user: Some(user.clone()),
        user_list: Some(user_list),
        tasks: tasks.into_iter().map(Into::into).collect(),
        ..IndexPage::default()
    })
}

async fn start_session(state: &AppState, user: &User) -> Result<Response, AppError> {
    let token = new_session_token();
    state.db.create_session(&token, user.id).await?;

    set_cookie(home_redirect(), &session_cookie(&state.key, &token))
}

async fn owned_task(state: &AppState, user: &User, task_id: i64) -> Result<Task, AppError> {
    let task = state
        .db
        .find_task(task_id)
        .await?
        .ok_or_else(|| AppError::not_found("task", task_id))?;

    if task.user_id != user.id {
        return Err(AppError::forbidden("task", task_id));
    }

    Ok(task)
}

pub async fn home(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    let page = index_page(&state, session.user.as_ref()).await?;
    state.templates.render(INDEX, &page)
}

pub async fn add_task(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<TaskForm>,
) -> Result<Response, AppError> {
    let user = session.user.ok_or(AppError::Unauthenticated)?;

    let description = form.task.trim();
    if description.is_empty() {
        let mut page = index_page(&state, Some(&user)).await?;
        page.error = Some("Task description is required.".to_string());
        return Ok(invalid(state.templates.render(INDEX, &page)?));
    }

    let list = state.db.ensure_current_list(user.id, &today_label()).await?;
    let task_id = state.db.create_task(description, user.id, list.id).await?;
    tracing::info!(user_id = user.id, task_id, "task created");

    Ok(home_redirect())
}

pub async fn login_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    state.templates.render(LOGIN, &LoginPage::default())
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        let page = LoginPage {
            email: email.to_string(),
            error: Some("Email and password are required.".to_string()),
        };
        return Ok(invalid(state.templates.render(LOGIN, &page)?));
    }

    if let Some(user) = state.db.find_user_by_email(email).await? {
        let password = form.password.clone();
        let hash = user.password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(anyhow::Error::from)?;

        if matches {
            tracing::info!(user_id = user.id, "user logged in");
            return start_session(&state, &user).await;
        }
    }

    tracing::info!("login rejected");
    let page = LoginPage {
        email: email.to_string(),
        error: Some("Invalid email or password.".to_string()),
    };
    Ok(state.templates.render(LOGIN, &page)?.into_response())
}

pub async fn sign_up_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    state.templates.render(SIGN_UP, &SignUpPage::default())
}

pub async fn sign_up(
    State(state): State<AppState>,
    Form(form): Form<SignUpForm>,
) -> Result<Response, AppError> {
    let email = form.email.trim();
    let name = form.name.trim();
    let mut page = SignUpPage {
        email: email.to_string(),
        name: name.to_string(),
        error: None,
    };

    if email.is_empty() || name.is_empty() || form.password.is_empty() {
        page.error = Some("Email, name and password are required.".to_string());
        return Ok(invalid(state.templates.render(SIGN_UP, &page)?));
    }

    if state.db.find_user_by_email(email).await?.is_some() {
        page.error = Some("An account with that email already exists.".to_string());
        return Ok(invalid(state.templates.render(SIGN_UP, &page)?));
    }

    let password = form.password.clone();
    let password = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)??;

    let registered = state
        .db
        .register_user(
            &NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password,
            },
            &today_label(),
        )
        .await;

    // A concurrent sign-up can claim the email between the check above and the insert.
    let user = match registered {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            page.error = Some("An account with that email already exists.".to_string());
            return Ok(invalid(state.templates.render(SIGN_UP, &page)?));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = user.id, "user signed up");

    start_session(&state, &user).await
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    if let Some(token) = &session.token {
        state.db.delete_session(token).await?;
    }
    if let Some(user) = &session.user {
        tracing::info!(user_id = user.id, "user logged out");
    }

    set_cookie(home_redirect(), &removal_cookie())
}

pub async fn create_new_list(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    if user_id != user.id {
        return Err(AppError::forbidden("list", user_id));
    }

    let list = state.db.roll_over_list(user.id, &today_label()).await?;
    tracing::info!(user_id, list_id = list.id, "list rolled over");

    Ok(home_redirect())
}

/// `is_done` is the flag value the client saw; the task gets the opposite.
pub async fn done_task(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path((task_id, is_done)): Path<(i64, u8)>,
) -> Result<Response, AppError> {
    let task = owned_task(&state, &user, task_id).await?;
    state.db.set_task_done(task.id, is_done == 0).await?;
    tracing::debug!(task_id, done = is_done == 0, "task completion toggled");

    Ok(home_redirect())
}

pub async fn star(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path((task_id, is_star)): Path<(i64, u8)>,
) -> Result<Response, AppError> {
    let task = owned_task(&state, &user, task_id).await?;
    state.db.set_task_star(task.id, is_star == 0).await?;
    tracing::debug!(task_id, star = is_star == 0, "task star toggled");

    Ok(home_redirect())
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(task_id): Path<i64>,
) -> Result<Response, AppError> {
    let task = owned_task(&state, &user, task_id).await?;
    state.db.delete_task(task.id).await?;
    tracing::info!(task_id, "task deleted");

    Ok(home_redirect())
}
