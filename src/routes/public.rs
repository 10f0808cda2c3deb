use crate::errors::AppError;
use crate::helper::auth_helpers::{confirm_password, hash_password, new_user, normalize_email, random_password, require_names, AuthError};
use crate::helper::language::Locale;
use crate::helper::mail_helpers::{password_reset, subscription_notice, Mailer, OutgoingMail};
use crate::helper::public_helpers::{navigation, side_lists, verify_credentials, Listing, Navigation};
use crate::middleware::{MaybeUser, RequestLocale};
use crate::models::db_operations::content_db_operations::{self, ContentFilter};
use crate::models::db_operations::{topics_db_operations, users_db_operations, DbError};
use crate::models::{HydratedContent, Role, Topic};
use crate::routes::{render_page, see_other, PageQuery};
use crate::{AppState, DbPool};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use redb::Database;
use serde::{Deserialize, Serialize};

const RESTORED_PASSWORD_LEN: usize = 9;

pub fn config_public(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(index))
        .route("/", web::get().to(index))
        .route("/search", web::get().to(search))
        .route("/signup", web::get().to(signup_form))
        .route("/signup", web::post().to(signup))
        .route("/login", web::get().to(login_form))
        .route("/login", web::post().to(login))
        .route("/logout", web::get().to(logout))
        .route("/restore", web::get().to(restore_form))
        .route("/restore", web::post().to(restore))
        .route("/mailchimp", web::get().to(mailchimp))
        .route("/{topic}", web::get().to(topic_page))
        .route("/{topic}/{content}", web::get().to(content_page));
}

/// `/` goes to the front page of the visitor's language.
pub async fn root_redirect(RequestLocale(lang): RequestLocale) -> HttpResponse {
    see_other(format!("/{}/", lang.code()))
}

pub(crate) async fn deliver(mailer: Mailer, mail: OutgoingMail) -> Result<(), AppError> {
    web::block(move || mailer.send(&mail)).await??;
    Ok(())
}

fn index_url(lang: Locale) -> String {
    format!("/{}/", lang.code())
}

// --- Listings ---

async fn index(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let conn = pool.get()?;
    let now = Utc::now();
    let filter = ContentFilter::published(lang.code(), now).main_thread();
    let slice = content_db_operations::list_by_page(&db, &conn, &filter, state.config.per_page, query.page())?;

    let listing = Listing::paged(
        navigation(&db, &conn, lang.code(), now)?,
        side_lists(&db, &conn, lang.code(), now)?,
        None,
        slice,
    );
    Ok(render_page(&state, "index.html", lang, user, listing))
}

async fn topic_page(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    path: web::Path<(String, String)>,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (_, topic_slug) = path.into_inner();
    let topic = topics_db_operations::get_topic_by_slug(&db, lang.code(), &topic_slug)?;
    if !topic.public {
        return Err(AppError::NotFound(format!("topic '{}'", topic_slug)));
    }

    let conn = pool.get()?;
    let now = Utc::now();
    let filter = ContentFilter::published(lang.code(), now).topic_uuid(topic.id).main_thread();
    let slice = content_db_operations::list_by_page(&db, &conn, &filter, state.config.per_page, query.page())?;

    let listing = Listing::paged(
        navigation(&db, &conn, lang.code(), now)?,
        side_lists(&db, &conn, lang.code(), now)?,
        Some(topic),
        slice,
    );
    Ok(render_page(&state, "index.html", lang, user, listing))
}

#[derive(Serialize)]
struct Material {
    #[serde(flatten)]
    navigation: Navigation,
    topic: Topic,
    content: HydratedContent,
}

async fn content_page(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    path: web::Path<(String, String, String)>,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (_, topic_slug, content_slug) = path.into_inner();
    let topic = topics_db_operations::get_topic_by_slug(&db, lang.code(), &topic_slug)?;
    let now = Utc::now();
    let content = content_db_operations::get_content_by_slug(&db, topic.id, &content_slug, now)?;

    let conn = pool.get()?;
    let material = Material {
        navigation: navigation(&db, &conn, lang.code(), now)?,
        content: content_db_operations::hydrate_full(&db, &conn, content, now, None)?,
        topic,
    };
    Ok(render_page(&state, "material.html", lang, user, material))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn search(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    query: web::Query<SearchQuery>,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err(AppError::BadRequest("empty search query".to_string()));
    }

    let conn = pool.get()?;
    let now = Utc::now();
    let results = content_db_operations::search(&db, &conn, &ContentFilter::published(lang.code(), now), q, None)?;
    log::debug!("Search '{}' ({}) found {} items", q, lang, results.len());

    let listing = Listing::search_results(navigation(&db, &conn, lang.code(), now)?, q, results);
    Ok(render_page(&state, "index.html", lang, user, listing))
}

// --- Accounts ---

#[derive(Serialize)]
struct FormPage {
    #[serde(flatten)]
    navigation: Navigation,
    csrf_token: String,
}

fn form_page(db: &Database, pool: &DbPool, lang: Locale, token: &CsrfToken) -> Result<FormPage, AppError> {
    let conn = pool.get()?;
    Ok(FormPage {
        navigation: navigation(db, &conn, lang.code(), Utc::now())?,
        csrf_token: token.get().to_string(),
    })
}

#[derive(Deserialize)]
struct SignupForm {
    csrf_token: CsrfToken,
    email: String,
    first_name: String,
    last_name: String,
    password: String,
    password_confirm: String,
}

impl CsrfGuarded for SignupForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

async fn signup_form(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    token: CsrfToken,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    if user.is_some() {
        return Ok(see_other(index_url(lang)));
    }
    let page = form_page(&db, &pool, lang, &token)?;
    Ok(render_page(&state, "signup.html", lang, None, page))
}

async fn signup(
    RequestLocale(lang): RequestLocale,
    form: Csrf<web::Form<SignupForm>>,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner().into_inner();
    confirm_password(&form.password, &form.password_confirm)?;
    require_names(&form.first_name, &form.last_name)?;
    let user = new_user(
        &form.password,
        &form.email,
        &form.first_name,
        &form.last_name,
        &[Role::Visitor],
        state.password_secret(),
    )?;

    let conn = pool.get()?;
    users_db_operations::insert_user(&conn, &user)?;
    log::info!("New visitor account {} ({})", user.id, user.email);

    let cookie = state.sessions.issue(&user)?;
    let mut response = see_other(index_url(lang));
    response.add_cookie(&cookie).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(response)
}

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    email: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

async fn login_form(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    token: CsrfToken,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    if user.is_some() {
        return Ok(see_other(index_url(lang)));
    }
    let page = form_page(&db, &pool, lang, &token)?;
    Ok(render_page(&state, "login.html", lang, None, page))
}

async fn login(
    RequestLocale(lang): RequestLocale,
    form: Csrf<web::Form<LoginForm>>,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner().into_inner();
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".to_string()));
    }

    let conn = pool.get()?;
    let Some(user) = verify_credentials(&conn, &form.email, &form.password, state.password_secret())? else {
        log::warn!("Failed login for '{}'", form.email.trim());
        return Err(AuthError::WrongPassword.into());
    };

    let cookie = state.sessions.issue(&user)?;
    log::info!("User {} logged in", user.id);
    let mut response = see_other(index_url(lang));
    response.add_cookie(&cookie).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(response)
}

async fn logout(RequestLocale(lang): RequestLocale, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let mut response = see_other(index_url(lang));
    response
        .add_cookie(&state.sessions.logout_cookie())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(response)
}

#[derive(Deserialize)]
struct RestoreForm {
    csrf_token: CsrfToken,
    email: String,
}

impl CsrfGuarded for RestoreForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

async fn restore_form(
    RequestLocale(lang): RequestLocale,
    token: CsrfToken,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let page = form_page(&db, &pool, lang, &token)?;
    Ok(render_page(&state, "restore_access.html", lang, None, page))
}

/// Mails a random password to the account owner and stores it once the
/// mail is out. A failed delivery leaves the old password in place.
async fn restore(
    RequestLocale(lang): RequestLocale,
    form: Csrf<web::Form<RestoreForm>>,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let email = normalize_email(&form.into_inner().into_inner().email)?;

    let conn = pool.get()?;
    let user = users_db_operations::find_user_by_email(&conn, &email)?
        .ok_or_else(|| DbError::NotFound(format!("user '{}'", email)))?;

    let password = random_password(RESTORED_PASSWORD_LEN);
    let password_hash = hash_password(&password, state.password_secret())?;
    deliver(state.mailer.clone(), password_reset(&user, &password)).await?;
    users_db_operations::update_password_hash(&conn, &user.id, &password_hash)?;
    log::info!("Password restored for user {}", user.id);

    Ok(see_other(format!("/{}/login", lang.code())))
}

// --- Mailing list ---

#[derive(Deserialize)]
struct SubscribeQuery {
    email: Option<String>,
}

async fn mailchimp(
    RequestLocale(lang): RequestLocale,
    MaybeUser(user): MaybeUser,
    query: web::Query<SubscribeQuery>,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let raw = query.email.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(see_other(index_url(lang)));
    }
    let email = normalize_email(raw)?;

    let reply = state.mailchimp.subscribe(&email, lang.code()).await?;
    let recipients = &state.config.mail.subscription_recipients;
    if recipients.is_empty() {
        log::info!("New subscriber {}; no one to notify", email);
    } else {
        deliver(state.mailer.clone(), subscription_notice(&email, lang.code(), &reply, recipients)).await?;
    }

    let conn = pool.get()?;
    let page = navigation(&db, &conn, lang.code(), Utc::now())?;
    Ok(render_page(&state, "subscription_done.html", lang, user, page))
}
