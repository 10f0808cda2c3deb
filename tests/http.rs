mod common;

use actix_csrf::CsrfMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::http::{header, Method, StatusCode};
use actix_web::{test, web, App};
use common::{content, topic, FailingMailer, Harness, RecordingMailer, SECRET};
use magazine_backend::helper::public_helpers::verify_credentials;
use magazine_backend::helper::session_helpers::AUTH_COOKIE;
use magazine_backend::middleware::{Authenticate, ReportErrors, RequireAdmin, SameOrigin};
use magazine_backend::models::db_operations::content_db_operations::create_content;
use magazine_backend::models::db_operations::topics_db_operations::{get_topic, list_topics, save_topic};
use magazine_backend::models::db_operations::users_db_operations::find_user_by_email;
use magazine_backend::models::{ContentType, Role};
use magazine_backend::routes;
use rand::prelude::StdRng;
use std::fs;
use std::sync::Arc;

const LANG_SCOPE: &str = "/{lang:en|be|ru}";
const SITE: &str = "https://example.org";

macro_rules! test_app {
    ($h:expr) => {{
        let key = Key::from($h.state.config.cookie_key_bytes().as_slice());
        test::init_service(
            App::new()
                .wrap(ReportErrors)
                .wrap(Authenticate)
                .wrap(SessionMiddleware::builder(CookieSessionStore::default(), key).cookie_secure(false).build())
                .app_data($h.state.clone())
                .app_data($h.db.clone())
                .app_data($h.pool.clone())
                .configure(routes::static_files::config_static)
                .route("/", web::get().to(routes::public::root_redirect))
                .service(
                    web::scope(LANG_SCOPE)
                        .wrap(
                            CsrfMiddleware::<StdRng>::new()
                                .set_cookie(Method::GET, format!("{}/login", LANG_SCOPE))
                                .set_cookie(Method::GET, format!("{}/signup", LANG_SCOPE))
                                .set_cookie(Method::GET, format!("{}/restore", LANG_SCOPE)),
                        )
                        .service(
                            web::scope("/admin")
                                .wrap(SameOrigin)
                                .wrap(RequireAdmin)
                                .configure(routes::admin::config_admin),
                        )
                        .configure(routes::public::config_public),
                ),
        )
        .await
    }};
}

/// GETs a form page and returns its CSRF cookie with the token embedded in
/// the form.
macro_rules! csrf_form {
    ($app:expr, $uri:expr) => {{
        let res = test::call_service(&$app, test::TestRequest::get().uri($uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res
            .response()
            .cookies()
            .find(|c| c.name().ends_with("Csrf-Token"))
            .expect("form page sets the CSRF cookie")
            .into_owned();
        let body = String::from_utf8(test::read_body(res).await.to_vec()).unwrap();
        let token = body
            .split("name=\"csrf_token\" value=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .expect("form carries the CSRF token")
            .to_string();
        assert_eq!(cookie.value(), token);
        (cookie, token)
    }};
}

fn form_post(uri: &str, body: String) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
        .set_payload(body)
}

fn auth_cookie<B>(res: &actix_web::dev::ServiceResponse<B>) -> Option<actix_web::cookie::Cookie<'static>> {
    res.response().cookies().find(|c| c.name() == AUTH_COOKIE).map(|c| c.into_owned())
}

fn location<B>(res: &actix_web::dev::ServiceResponse<B>) -> String {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[actix_web::test]
async fn root_redirects_to_the_visitors_language() {
    let h = Harness::new();
    let app = test_app!(h);

    let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/en/");

    let req = test::TestRequest::get()
        .uri("/")
        .insert_header((header::ACCEPT_LANGUAGE, "be-BY,be;q=0.9,en;q=0.5"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(location(&res), "/be/");
}

#[actix_web::test]
async fn admin_area_requires_an_admin_role() {
    let h = Harness::new();
    let admin = h.add_user("admin@example.org", "admin-pass", &[Role::Administrator]);
    let visitor = h.add_user("visitor@example.org", "visitor-pass", &[Role::Visitor]);
    let app = test_app!(h);

    let res = test::call_service(&app, test::TestRequest::get().uri("/en/admin/").to_request()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let cookie = h.state.sessions.issue(&visitor).unwrap();
    let req = test::TestRequest::get().uri("/en/admin/").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let cookie = h.state.sessions.issue(&admin).unwrap();
    let req = test::TestRequest::get().uri("/en/admin/topics/").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn public_pages_show_visible_content() {
    let h = Harness::new();
    let news = topic("News", "en");
    save_topic(&h.db, &news).unwrap();
    let mut item = content("en", ContentType::Article, "Harbour reopens", news.id);
    item.body = "The *harbour* is open again.".into();
    create_content(&h.db, &item).unwrap();
    let app = test_app!(h);

    let res = test::call_service(&app, test::TestRequest::get().uri("/en/").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert!(String::from_utf8_lossy(&body).contains("Harbour reopens"));

    let req = test::TestRequest::get().uri("/en/news/harbour-reopens").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    assert!(body.contains("<em>harbour</em>"));

    let req = test::TestRequest::get().uri("/en/news/missing").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/en/search?q=%20").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/en/search?q=harbour").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn static_files_answer_not_modified_for_a_known_etag() {
    let h = Harness::new();
    fs::write(h.state.config.static_dir().join("site.css"), "body { margin: 0 }").unwrap();
    let app = test_app!(h);

    let res = test::call_service(&app, test::TestRequest::get().uri("/static/site.css").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let etag = res.headers().get(header::ETAG).unwrap().to_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/static/site.css")
        .insert_header((header::IF_NONE_MATCH, etag))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_MODIFIED);

    let req = test::TestRequest::get().uri("/static/missing.css").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admin_saves_topics_and_refuses_to_delete_authors_with_content() {
    let h = Harness::new();
    let admin = h.add_user("admin@example.org", "admin-pass", &[Role::Administrator]);
    let app = test_app!(h);

    let req = form_post("/en/admin/topics/", "title=Culture&language=en&weight=2&public=on".into())
        .cookie(h.state.sessions.issue(&admin).unwrap())
        .insert_header((header::ORIGIN, SITE))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/en/admin/topics/");

    let topics = list_topics(&h.db).unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!((topics[0].slug.as_str(), topics[0].weight, topics[0].public), ("culture", 2, true));

    let mut item = content("en", ContentType::Article, "Signed", topics[0].id);
    item.author_ids = vec![admin.id];
    create_content(&h.db, &item).unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/en/admin/users/delete/{}", admin.id))
        .cookie(h.state.sessions.issue(&admin).unwrap())
        .insert_header((header::ORIGIN, SITE))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri(&format!("/en/admin/widgets/delete/{}", admin.id))
        .cookie(h.state.sessions.issue(&admin).unwrap())
        .insert_header((header::ORIGIN, SITE))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admin_deletes_need_a_same_origin_post() {
    let h = Harness::new();
    let admin = h.add_user("admin@example.org", "admin-pass", &[Role::Administrator]);
    let culture = topic("Culture", "en");
    save_topic(&h.db, &culture).unwrap();
    let app = test_app!(h);
    let uri = format!("/en/admin/topics/delete/{}", culture.id);

    let req = test::TestRequest::get().uri(&uri).cookie(h.state.sessions.issue(&admin).unwrap()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::METHOD_NOT_ALLOWED);

    let req = test::TestRequest::post().uri(&uri).cookie(h.state.sessions.issue(&admin).unwrap()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&uri)
        .cookie(h.state.sessions.issue(&admin).unwrap())
        .insert_header((header::ORIGIN, "https://elsewhere.example"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    assert!(get_topic(&h.db, &culture.id.to_string()).is_ok());

    let req = test::TestRequest::post()
        .uri(&uri)
        .cookie(h.state.sessions.issue(&admin).unwrap())
        .insert_header((header::HOST, "mag.example:8080"))
        .insert_header((header::REFERER, "http://mag.example:8080/en/admin/topics/"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/en/admin/topics/");
    assert!(get_topic(&h.db, &culture.id.to_string()).is_err());
}

#[actix_web::test]
async fn admin_pages_render_and_treat_a_malformed_page_as_the_first() {
    let h = Harness::new();
    let admin = h.add_user("admin@example.org", "admin-pass", &[Role::Administrator]);
    let app = test_app!(h);

    let uris = [
        "/en/admin/content/?p=abc",
        "/en/admin/content/?p=-2",
        "/en/admin/files/?p=",
        "/en/admin/content/new",
        "/en/admin/users/",
    ];
    for uri in uris {
        let req = test::TestRequest::get().uri(uri).cookie(h.state.sessions.issue(&admin).unwrap()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK, "{}", uri);
    }
}

#[actix_web::test]
async fn login_accepts_the_token_from_its_form() {
    let h = Harness::new();
    h.add_user("reader@example.org", "open-sesame", &[Role::Visitor]);
    let app = test_app!(h);

    let (csrf, token) = csrf_form!(app, "/en/login");
    let req = form_post("/en/login", format!("csrf_token={}&email=reader%40example.org&password=open-sesame", token))
        .cookie(csrf.clone())
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/en/");
    let session = auth_cookie(&res).expect("login sets the session cookie");

    // The session opens the front page as a logged-in user.
    let req = test::TestRequest::get().uri("/en/login").cookie(session).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let req = form_post("/en/login", format!("csrf_token={}&email=reader%40example.org&password=wrong", token))
        .cookie(csrf)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(auth_cookie(&res).is_none());
}

#[actix_web::test]
async fn login_without_the_csrf_cookie_is_refused() {
    let h = Harness::new();
    h.add_user("reader@example.org", "open-sesame", &[Role::Visitor]);
    let app = test_app!(h);

    let (_, token) = csrf_form!(app, "/be/login");
    let req = form_post("/be/login", format!("csrf_token={}&email=reader%40example.org&password=open-sesame", token))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_client_error());
    assert!(auth_cookie(&res).is_none());

    let (csrf, _) = csrf_form!(app, "/be/login");
    let req = form_post("/be/login", "csrf_token=forged&email=reader%40example.org&password=open-sesame".into())
        .cookie(csrf)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_client_error());
    assert!(auth_cookie(&res).is_none());
}

#[actix_web::test]
async fn signup_creates_a_visitor_and_logs_them_in() {
    let h = Harness::new();
    let app = test_app!(h);

    let (csrf, token) = csrf_form!(app, "/ru/signup");
    let body = format!(
        "csrf_token={}&email=New%40Example.org&first_name=Ann&last_name=Lee&password=pass-1234&password_confirm=pass-1234",
        token
    );
    let res = test::call_service(&app, form_post("/ru/signup", body).cookie(csrf).to_request()).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/ru/");
    let session = auth_cookie(&res).expect("signup sets the session cookie");

    let conn = h.pool.get().unwrap();
    let user = find_user_by_email(&conn, "new@example.org").unwrap().expect("account stored");
    assert_eq!(user.roles, vec![Role::Visitor]);
    assert_eq!(h.state.sessions.resolve(session.value()).unwrap().id, user.id);

    let (csrf, token) = csrf_form!(app, "/ru/signup");
    let body = format!(
        "csrf_token={}&email=new%40example.org&first_name=Ann&last_name=Lee&password=pass-1234&password_confirm=pass-1234",
        token
    );
    let res = test::call_service(&app, form_post("/ru/signup", body).cookie(csrf).to_request()).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn restore_mails_a_new_password() {
    let h = Harness::new();
    h.add_user("reader@example.org", "forgotten", &[Role::Visitor]);
    let app = test_app!(h);

    let (csrf, token) = csrf_form!(app, "/en/restore");
    let req = form_post("/en/restore", format!("csrf_token={}&email=Reader%40example.org", token))
        .cookie(csrf)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/en/login");

    let sent = h.mails.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["reader@example.org".to_string()]);
    let password = sent[0]
        .body
        .split("The new password is:\n\n")
        .nth(1)
        .and_then(|rest| rest.lines().next())
        .unwrap()
        .to_string();

    let conn = h.pool.get().unwrap();
    let secret = SECRET.as_bytes();
    assert!(verify_credentials(&conn, "reader@example.org", &password, secret).unwrap().is_some());
    assert!(verify_credentials(&conn, "reader@example.org", "forgotten", secret).unwrap().is_none());
}

#[actix_web::test]
async fn restore_keeps_the_old_password_when_mail_fails() {
    let h = Harness::with_mailer(Arc::new(FailingMailer), Arc::new(RecordingMailer::default()));
    h.add_user("reader@example.org", "still-valid", &[Role::Visitor]);
    let app = test_app!(h);

    let (csrf, token) = csrf_form!(app, "/en/restore");
    let req = form_post("/en/restore", format!("csrf_token={}&email=reader%40example.org", token))
        .cookie(csrf)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let conn = h.pool.get().unwrap();
    let found = verify_credentials(&conn, "reader@example.org", "still-valid", SECRET.as_bytes()).unwrap();
    assert!(found.is_some());
}
