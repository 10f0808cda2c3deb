use crate::errors::AppError;
use crate::helper::admin_helpers::{
    apply_content_form, apply_user_form, content_from_form, set_notification, take_notification, topic_from_form, touch,
    user_from_form,
};
use crate::helper::auth_helpers::change_password;
use crate::helper::file_helpers::{self, read_upload};
use crate::helper::form_helpers::{format_datetime_local, FormFields};
use crate::helper::language::Locale;
use crate::middleware::{AdminUser, RequestLocale};
use crate::models::db_operations::content_db_operations::{self, ContentFilter, ContentOrder};
use crate::models::db_operations::{
    files_db_operations, parse_id, topics_db_operations, users_db_operations, PageSlice,
};
use crate::models::{Content, ContentType, FileRecord, HydratedContent, Role, Topic, TopicWithCount, User};
use crate::routes::{page_view, see_other, PageQuery};
use crate::{AppState, DbPool};
use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::{web, HttpResponse};
use redb::Database;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(dashboard))
        .route("/", web::get().to(dashboard))
        .route("/topics/", web::get().to(topics_list))
        .route("/topics/", web::post().to(topic_save))
        .route("/topics/new", web::get().to(topic_new))
        .route("/topics/edit/{id}", web::get().to(topic_edit))
        .route("/content/", web::get().to(content_list))
        .route("/content/", web::post().to(content_create))
        .route("/content/filter", web::post().to(content_filter))
        .route("/content/new", web::get().to(content_new))
        .route("/content/edit/{id}", web::get().to(content_edit))
        .route("/content/edit/{id}", web::post().to(content_update))
        .route("/users/", web::get().to(users_list))
        .route("/users/", web::post().to(user_create))
        .route("/users/new", web::get().to(user_new))
        .route("/users/edit/{id}", web::get().to(user_edit))
        .route("/users/edit/{id}", web::post().to(user_update))
        .route("/users/passchange/{id}", web::get().to(password_form))
        .route("/users/passchange/{id}", web::post().to(password_change))
        .route("/files/", web::get().to(files_list))
        .route("/files/", web::post().to(file_upload))
        .route("/files/edit/{id}", web::get().to(file_edit))
        .route("/files/edit/{id}", web::post().to(file_update))
        .route("/{collection}/delete/{id}", web::post().to(delete));
}

fn admin_url(lang: Locale, rest: &str) -> String {
    format!("/{}/admin/{}", lang.code(), rest)
}

/// Renders an admin page, consuming the pending flash notification.
fn render_admin<T: Serialize>(
    state: &AppState,
    session: &Session,
    template: &str,
    lang: Locale,
    user: User,
    data: T,
) -> HttpResponse {
    let page = page_view(state, lang, Some(user), data).with_notification(take_notification(session));
    state.renderer.render(template, &page)
}

fn form(body: &web::Bytes) -> Result<FormFields, AppError> {
    Ok(FormFields::parse(body)?)
}

async fn dashboard(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
) -> HttpResponse {
    render_admin(&state, &session, "admin/index.html", lang, user, ())
}

// --- Topics ---

#[derive(Serialize)]
struct TopicsPage {
    topics: Vec<TopicWithCount>,
}

#[derive(Serialize)]
struct TopicForm {
    topic: Option<Topic>,
}

async fn topics_list(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
) -> Result<HttpResponse, AppError> {
    let topics = topics_db_operations::list_topics(&db)?
        .into_iter()
        .map(|topic| {
            let content_count = content_db_operations::count_by_topic(&db, topic.id)?;
            Ok(TopicWithCount { topic, content_count })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(render_admin(&state, &session, "admin/topics.html", lang, user, TopicsPage { topics }))
}

async fn topic_new(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
) -> HttpResponse {
    render_admin(&state, &session, "admin/topic_edit.html", lang, user, TopicForm { topic: None })
}

async fn topic_edit(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let topic = topics_db_operations::get_topic(&db, &id)?;
    Ok(render_admin(&state, &session, "admin/topic_edit.html", lang, user, TopicForm { topic: Some(topic) }))
}

/// Creates a topic, or replaces the one named by the form's `id`.
async fn topic_save(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    db: web::Data<Database>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let topic = topic_from_form(&form(&body)?)?;
    topics_db_operations::save_topic(&db, &topic)?;
    log::info!("Topic '{}' saved by {}", topic.title, user.email);
    set_notification(&session, &format!("Topic '{}' saved.", topic.title), "success");
    Ok(see_other(admin_url(lang, "topics/")))
}

// --- Content ---

#[derive(Debug, Default, Deserialize)]
struct ContentQuery {
    p: Option<String>,
    topic: Option<String>,
    content_type: Option<String>,
    language: Option<String>,
}

impl ContentQuery {
    fn page(&self) -> u32 {
        PageQuery { p: self.p.clone() }.page()
    }

    fn filter(&self) -> Result<ContentFilter, AppError> {
        let mut filter = ContentFilter::default();
        if let Some(topic) = non_empty(&self.topic) {
            filter = filter.topic(topic)?;
        }
        if let Some(content_type) = non_empty(&self.content_type) {
            filter = filter.types(&[content_type.parse::<ContentType>()?]);
        }
        if let Some(language) = non_empty(&self.language) {
            filter.language = Some(language.parse::<Locale>()?.code().to_string());
        }
        Ok(filter)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Choices offered by the content form and filter.
#[derive(Serialize)]
struct ContentChoices {
    topics: Vec<Topic>,
    authors: Vec<User>,
    series: Vec<Content>,
    content_types: Vec<&'static str>,
}

fn content_choices(db: &Database, conn: &Connection) -> Result<ContentChoices, AppError> {
    let series_filter = ContentFilter::default().types(&[ContentType::ArticleSeries]);
    Ok(ContentChoices {
        topics: topics_db_operations::list_topics(db)?,
        authors: users_db_operations::list_users(conn)?,
        series: content_db_operations::list_contents(db, &series_filter, ContentOrder::WeightPublished)?,
        content_types: ContentType::ALL.iter().map(ContentType::as_str).collect(),
    })
}

#[derive(Serialize)]
struct ContentListPage {
    #[serde(flatten)]
    choices: ContentChoices,
    contents: PageSlice<HydratedContent>,
    topic: Option<String>,
    content_type: Option<String>,
    language: Option<String>,
}

async fn content_list(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    query: web::Query<ContentQuery>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let filter = query.filter()?;
    let conn = pool.get()?;
    let contents = content_db_operations::list_by_page(&db, &conn, &filter, state.config.per_page, query.page())?;
    let query = query.into_inner();
    let page = ContentListPage {
        choices: content_choices(&db, &conn)?,
        contents,
        topic: query.topic,
        content_type: query.content_type,
        language: query.language,
    };
    Ok(render_admin(&state, &session, "admin/contents.html", lang, user, page))
}

/// Turns the filter form into a bookmarkable listing URL.
async fn content_filter(
    RequestLocale(lang): RequestLocale,
    _admin: AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let fields = form(&body)?;
    let mut query = form_urlencoded::Serializer::new(String::new());
    for name in ["topic", "content_type", "language"] {
        let value = fields.text(name);
        if !value.is_empty() {
            query.append_pair(name, &value);
        }
    }
    let query = query.finish();
    let location = if query.is_empty() {
        admin_url(lang, "content/")
    } else {
        format!("{}?{}", admin_url(lang, "content/"), query)
    };
    Ok(see_other(location))
}

#[derive(Serialize)]
struct ContentFormPage {
    #[serde(flatten)]
    choices: ContentChoices,
    content: Content,
    is_new: bool,
    created_local: String,
    scheduled_local: String,
    event_start_local: String,
}

async fn content_new(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let page = ContentFormPage {
        choices: content_choices(&db, &*pool.get()?)?,
        content: Content::new(lang.code(), ContentType::Article, ""),
        is_new: true,
        created_local: String::new(),
        scheduled_local: String::new(),
        event_start_local: String::new(),
    };
    Ok(render_admin(&state, &session, "admin/content_edit.html", lang, user, page))
}

async fn content_edit(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let content = content_db_operations::get_content(&db, &id)?;
    let offset = state.form_offset;
    let page = ContentFormPage {
        choices: content_choices(&db, &*pool.get()?)?,
        created_local: format_datetime_local(Some(content.created), offset),
        scheduled_local: format_datetime_local(content.scheduled, offset),
        event_start_local: format_datetime_local(content.event_start, offset),
        content,
        is_new: false,
    };
    Ok(render_admin(&state, &session, "admin/content_edit.html", lang, user, page))
}

async fn content_create(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let content = content_from_form(&form(&body)?, state.form_offset)?;
    content_db_operations::create_content(&db, &content)?;
    log::info!("Content '{}' ({}) created by {}", content.title, content.id, user.email);
    set_notification(&session, &format!("'{}' created.", content.title), "success");
    Ok(see_other(admin_url(lang, &format!("content/edit/{}", content.id))))
}

async fn content_update(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let mut content = content_db_operations::get_content(&db, &id)?;
    apply_content_form(&mut content, &form(&body)?, state.form_offset)?;
    touch(&mut content);
    content_db_operations::update_content(&db, &content)?;
    log::info!("Content '{}' ({}) updated by {}", content.title, content.id, user.email);
    set_notification(&session, &format!("'{}' saved.", content.title), "success");
    Ok(see_other(admin_url(lang, &format!("content/edit/{}", content.id))))
}

// --- Users ---

#[derive(Serialize)]
struct UsersPage {
    users: Vec<User>,
}

#[derive(Serialize)]
struct UserForm {
    edited: Option<User>,
    roles: Vec<&'static str>,
}

impl UserForm {
    fn new(edited: Option<User>) -> Self {
        UserForm { edited, roles: Role::ALL.iter().map(Role::as_str).collect() }
    }
}

async fn users_list(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let users = users_db_operations::list_users(&*pool.get()?)?;
    Ok(render_admin(&state, &session, "admin/users.html", lang, user, UsersPage { users }))
}

async fn user_new(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    session: Session,
    state: web::Data<AppState>,
) -> HttpResponse {
    render_admin(&state, &session, "admin/user_edit.html", lang, user, UserForm::new(None))
}

async fn user_create(
    RequestLocale(lang): RequestLocale,
    AdminUser(admin): AdminUser,
    session: Session,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let user = user_from_form(&form(&body)?, state.password_secret())?;
    users_db_operations::insert_user(&*pool.get()?, &user)?;
    log::info!("User {} created by {}", user.email, admin.email);
    set_notification(&session, &format!("User {} created.", user.email), "success");
    Ok(see_other(admin_url(lang, "users/")))
}

async fn user_edit(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let edited = users_db_operations::get_user(&*pool.get()?, &id)?;
    Ok(render_admin(&state, &session, "admin/user_edit.html", lang, user, UserForm::new(Some(edited))))
}

async fn user_update(
    RequestLocale(lang): RequestLocale,
    AdminUser(admin): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    pool: web::Data<DbPool>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let conn = pool.get()?;
    let mut user = users_db_operations::get_user(&conn, &id)?;
    apply_user_form(&mut user, &form(&body)?)?;
    users_db_operations::update_user(&conn, &user)?;
    log::info!("User {} updated by {}", user.email, admin.email);
    set_notification(&session, &format!("User {} saved.", user.email), "success");
    Ok(see_other(admin_url(lang, "users/")))
}

async fn password_form(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let edited = users_db_operations::get_user(&*pool.get()?, &id)?;
    Ok(render_admin(&state, &session, "admin/passchange.html", lang, user, UserForm::new(Some(edited))))
}

async fn password_change(
    RequestLocale(lang): RequestLocale,
    AdminUser(admin): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    pool: web::Data<DbPool>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let fields = form(&body)?;
    let conn = pool.get()?;
    let user = users_db_operations::get_user(&conn, &id)?;
    let password_hash = change_password(
        &user,
        fields.get("old_password").unwrap_or_default(),
        fields.get("password").unwrap_or_default(),
        fields.get("password_confirm").unwrap_or_default(),
        state.password_secret(),
    )?;
    users_db_operations::update_password_hash(&conn, &user.id, &password_hash)?;
    log::info!("Password of {} changed by {}", user.email, admin.email);
    set_notification(&session, &format!("Password of {} changed.", user.email), "success");
    Ok(see_other(admin_url(lang, "users/")))
}

// --- Files ---

#[derive(Serialize)]
struct FilesPage {
    files: PageSlice<FileRecord>,
    max_upload_mb: u64,
}

#[derive(Serialize)]
struct FileForm {
    file: FileRecord,
}

async fn files_list(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    query: web::Query<PageQuery>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
) -> Result<HttpResponse, AppError> {
    let files = files_db_operations::list_files_by_page(&db, state.config.files_per_page, query.page())?;
    let page = FilesPage { files, max_upload_mb: state.config.max_upload_size_mb };
    Ok(render_admin(&state, &session, "admin/files.html", lang, user, page))
}

async fn file_upload(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    payload: Multipart,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
) -> Result<HttpResponse, AppError> {
    let max_bytes = state.config.max_upload_bytes();
    let upload = read_upload(payload, max_bytes).await?;
    let files_dir = state.config.files_dir();
    let optimizer = state.optimizer.clone();
    let db = db.into_inner();
    let record = web::block(move || file_helpers::upload(&db, &upload, &files_dir, optimizer.as_ref(), max_bytes)).await??;

    log::info!("File {} uploaded by {}", record.url, user.email);
    set_notification(&session, &format!("Uploaded {}.", record.url), "success");
    Ok(see_other(admin_url(lang, "files/")))
}

async fn file_edit(
    RequestLocale(lang): RequestLocale,
    AdminUser(user): AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let file = files_db_operations::get_file(&db, &id)?;
    Ok(render_admin(&state, &session, "admin/file_edit.html", lang, user, FileForm { file }))
}

async fn file_update(
    RequestLocale(lang): RequestLocale,
    _admin: AdminUser,
    path: web::Path<(String, String)>,
    session: Session,
    db: web::Data<Database>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (_, id) = path.into_inner();
    let fields = form(&body)?;
    let file = files_db_operations::update_file_meta(&db, &id, &fields.text("title"), &fields.text("credits"))?;
    set_notification(&session, &format!("{} saved.", file.url), "success");
    Ok(see_other(admin_url(lang, "files/")))
}

// --- Deletion ---

/// `/{collection}/delete/{id}` for topics, content, users and files.
async fn delete(
    RequestLocale(lang): RequestLocale,
    AdminUser(admin): AdminUser,
    path: web::Path<(String, String, String)>,
    session: Session,
    state: web::Data<AppState>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (_, collection, id) = path.into_inner();
    parse_id(&id)?;
    match collection.as_str() {
        "topics" => topics_db_operations::delete_topic(&db, &id)?,
        "content" => content_db_operations::delete_content(&db, &id)?,
        "users" => users_db_operations::delete_user(&*pool.get()?, &db, &id)?,
        "files" => {
            let files_dir = state.config.files_dir();
            let db = db.clone().into_inner();
            let delete_id = id.clone();
            web::block(move || file_helpers::delete_file(&db, &delete_id, &files_dir)).await??;
        }
        other => return Err(AppError::NotFound(format!("collection '{}'", other))),
    }
    log::info!("Deleted {} {} by {}", collection, id, admin.email);
    set_notification(&session, "Deleted.", "success");
    Ok(see_other(admin_url(lang, &format!("{}/", collection))))
}
