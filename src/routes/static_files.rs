use crate::helper::static_helpers::serve;
use crate::AppState;
use actix_web::{web, HttpRequest, HttpResponse};

pub fn config_static(cfg: &mut web::ServiceConfig) {
    cfg.route("/static/{path:.*}", web::get().to(static_file))
        .route("/files/{path:.*}", web::get().to(uploaded_file))
        .route("/sitemap.xml", web::get().to(sitemap))
        .route("/robots.txt", web::get().to(robots));
}

async fn static_file(req: HttpRequest, path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    serve(&req, &state.config.static_dir(), &path, state.config.static_max_age).await
}

async fn uploaded_file(req: HttpRequest, path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    serve(&req, &state.config.files_dir(), &path, state.config.static_max_age).await
}

async fn sitemap(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    serve(&req, &state.config.static_dir(), "sitemap.xml", state.config.static_max_age).await
}

async fn robots(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    serve(&req, &state.config.static_dir(), "robots.txt", state.config.static_max_age).await
}
