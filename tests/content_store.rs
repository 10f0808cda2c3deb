mod common;

use chrono::{Duration, Utc};
use common::{content, topic, Harness};
use magazine_backend::models::db_operations::content_db_operations::{
    self, create_content, delete_content, get_content, get_content_by_slug, list_by_page, list_series, search,
    update_content, ContentFilter,
};
use magazine_backend::models::db_operations::topics_db_operations::save_topic;
use magazine_backend::models::db_operations::DbError;
use magazine_backend::models::ContentType;

#[test]
fn scheduled_items_stay_hidden_until_their_time() {
    let h = Harness::new();
    let news = topic("News", "en");
    save_topic(&h.db, &news).unwrap();

    let mut later = content("en", ContentType::Article, "Tomorrow's story", news.id);
    later.scheduled = Some(Utc::now() + Duration::days(1));
    later.refresh_published();
    create_content(&h.db, &later).unwrap();
    create_content(&h.db, &content("en", ContentType::Article, "Today's story", news.id)).unwrap();

    let conn = h.pool.get().unwrap();
    let now = Utc::now();
    let listing = list_by_page(&h.db, &conn, &ContentFilter::published("en", now), 20, 1).unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.items[0].content.title, "Today's story");

    assert!(matches!(
        get_content_by_slug(&h.db, news.id, &later.slug, now),
        Err(DbError::NotFound(_))
    ));
    let in_two_days = now + Duration::days(2);
    assert_eq!(get_content_by_slug(&h.db, news.id, &later.slug, in_two_days).unwrap().id, later.id);
}

#[test]
fn listings_order_by_weight_then_published_and_paginate() {
    let h = Harness::new();
    let news = topic("News", "en");
    save_topic(&h.db, &news).unwrap();

    let base = Utc::now() - Duration::days(10);
    for i in 0..5 {
        let mut item = content("en", ContentType::Article, &format!("Story {}", i), news.id);
        item.created = base + Duration::days(i);
        item.refresh_published();
        create_content(&h.db, &item).unwrap();
    }
    let mut pinned = content("en", ContentType::Banner, "Pinned", news.id);
    pinned.created = base - Duration::days(30);
    pinned.weight = 10;
    pinned.refresh_published();
    create_content(&h.db, &pinned).unwrap();

    let conn = h.pool.get().unwrap();
    let filter = ContentFilter::published("en", Utc::now());
    let first = list_by_page(&h.db, &conn, &filter, 4, 1).unwrap();
    let titles: Vec<&str> = first.items.iter().map(|c| c.content.title.as_str()).collect();
    assert_eq!(titles, vec!["Pinned", "Story 4", "Story 3", "Story 2"]);
    assert_eq!((first.prev, first.next, first.total), (None, Some(2), 6));

    let second = list_by_page(&h.db, &conn, &filter, 4, 2).unwrap();
    assert_eq!(second.items.len(), 2);
    assert_eq!((second.prev, second.next), (Some(1), None));

    let clamped = list_by_page(&h.db, &conn, &filter, 4, 0).unwrap();
    assert_eq!(clamped.current, 1);
    assert!(list_by_page(&h.db, &conn, &filter, 4, 9).unwrap().items.is_empty());
}

#[test]
fn search_prefers_title_matches_and_skips_private_items() {
    let h = Harness::new();
    let news = topic("News", "en");
    save_topic(&h.db, &news).unwrap();

    let mut in_body = content("en", ContentType::Article, "Weekly digest", news.id);
    in_body.body = "A note about lighthouses along the coast.".into();
    create_content(&h.db, &in_body).unwrap();
    let in_title = content("en", ContentType::Article, "Lighthouses of the north", news.id);
    create_content(&h.db, &in_title).unwrap();
    let mut private = content("en", ContentType::Article, "Lighthouses draft", news.id);
    private.public = false;
    create_content(&h.db, &private).unwrap();

    let conn = h.pool.get().unwrap();
    let filter = ContentFilter::published("en", Utc::now());
    let hits = search(&h.db, &conn, &filter, "lighthouses", None).unwrap();
    let ids: Vec<_> = hits.iter().map(|c| c.content.id).collect();
    assert_eq!(ids, vec![in_title.id, in_body.id]);

    assert!(search(&h.db, &conn, &filter, "the of", None).unwrap().is_empty());
    assert_eq!(search(&h.db, &conn, &filter, "lighthouses", Some(1)).unwrap().len(), 1);
}

#[test]
fn belarusian_is_indexed_through_its_override() {
    let h = Harness::new();
    let topic_be = topic("Навіны", "be");
    save_topic(&h.db, &topic_be).unwrap();

    let item = content("be", ContentType::Article, "Кнігі і часопісы", topic_be.id);
    assert_eq!(item.language_override.as_deref(), Some("ru"));
    create_content(&h.db, &item).unwrap();

    let conn = h.pool.get().unwrap();
    let hits = search(&h.db, &conn, &ContentFilter::published("be", Utc::now()), "часопісы", None).unwrap();
    assert_eq!(hits.len(), 1);

    let mut no_override = content("be", ContentType::Article, "Без пераключэння", topic_be.id);
    no_override.language_override = None;
    assert!(matches!(
        create_content(&h.db, &no_override),
        Err(DbError::UnsupportedTextLanguage(l)) if l == "be"
    ));
    assert!(matches!(get_content(&h.db, &no_override.id.to_string()), Err(DbError::NotFound(_))));
}

#[test]
fn series_carry_a_limited_number_of_children() {
    let h = Harness::new();
    let news = topic("News", "en");
    save_topic(&h.db, &news).unwrap();

    let series = content("en", ContentType::ArticleSeries, "Long read", news.id);
    create_content(&h.db, &series).unwrap();
    for i in 0..4 {
        let mut part = content("en", ContentType::Article, &format!("Part {}", i), news.id);
        part.parent_id = Some(series.id);
        create_content(&h.db, &part).unwrap();
    }

    let conn = h.pool.get().unwrap();
    let listed = list_series(&h.db, &conn, "en", Utc::now(), 3).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].children.len(), 3);
    assert!(list_series(&h.db, &conn, "ru", Utc::now(), 3).unwrap().is_empty());

    let full = content_db_operations::hydrate_full(&h.db, &conn, series, Utc::now(), None).unwrap();
    assert_eq!(full.children.len(), 4);
    assert_eq!(full.topics[0].id, news.id);
}

#[test]
fn updates_reindex_and_deletes_report_missing_items() {
    let h = Harness::new();
    let news = topic("News", "en");
    save_topic(&h.db, &news).unwrap();

    let mut item = content("en", ContentType::Article, "Harbour report", news.id);
    create_content(&h.db, &item).unwrap();
    assert!(matches!(create_content(&h.db, &item), Err(DbError::Duplicate(_))));

    item.title = "Airport report".into();
    update_content(&h.db, &item).unwrap();

    let conn = h.pool.get().unwrap();
    let filter = ContentFilter::published("en", Utc::now());
    assert!(search(&h.db, &conn, &filter, "harbour", None).unwrap().is_empty());
    assert_eq!(search(&h.db, &conn, &filter, "airport", None).unwrap().len(), 1);

    let id = item.id.to_string();
    delete_content(&h.db, &id).unwrap();
    assert!(search(&h.db, &conn, &filter, "airport", None).unwrap().is_empty());
    assert!(matches!(delete_content(&h.db, &id), Err(DbError::NotFound(_))));
    assert!(matches!(delete_content(&h.db, "not-an-id"), Err(DbError::InvalidId(_))));
}
