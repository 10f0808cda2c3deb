//! `sitemap.xml` generation for public topics and content.

use crate::helper::sanitization_helpers::escape_xml;
use crate::models::db_operations::content_db_operations::{self, ContentFilter, ContentOrder};
use crate::models::db_operations::{topics_db_operations, DbError};
use crate::models::{Content, Topic};
use chrono::{DateTime, Utc};
use redb::Database;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const SITEMAP_XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const LASTMOD_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum SitemapError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapItem {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<&'static str>,
}

pub fn topic_item(prefix: &str, topic: &Topic) -> SitemapItem {
    SitemapItem {
        loc: format!("{}/{}/{}", prefix, topic.language, topic.slug),
        lastmod: None,
        changefreq: Some("daily"),
    }
}

/// One entry per topic the content is filed under.
pub fn content_items(prefix: &str, content: &Content, topics: &[Topic]) -> Vec<SitemapItem> {
    topics
        .iter()
        .map(|t| SitemapItem {
            loc: format!("{}/{}/{}/{}", prefix, content.language, t.slug, content.slug),
            lastmod: Some(content.published.format(LASTMOD_FORMAT).to_string()),
            changefreq: None,
        })
        .collect()
}

/// Public topics first, then every visible item under each of its topics.
pub fn collect_items(db: &Database, prefix: &str, now: DateTime<Utc>) -> Result<Vec<SitemapItem>, SitemapError> {
    let prefix = prefix.trim_end_matches('/');
    let topics: Vec<Topic> = topics_db_operations::list_topics(db)?
        .into_iter()
        .filter(|t| t.public)
        .collect();

    let mut items: Vec<SitemapItem> = topics.iter().map(|t| topic_item(prefix, t)).collect();

    let filter = ContentFilter::visible(now);
    for content in content_db_operations::list_contents(db, &filter, ContentOrder::WeightPublished)? {
        let filed_under: Vec<Topic> = content
            .topic_ids
            .iter()
            .filter_map(|id| topics.iter().find(|t| &t.id == id).cloned())
            .collect();
        items.extend(content_items(prefix, &content, &filed_under));
    }
    Ok(items)
}

pub fn render(items: &[SitemapItem]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{}\">", SITEMAP_XMLNS));
    for item in items {
        xml.push_str(&format!("<url><loc>{}</loc>", escape_xml(&item.loc)));
        if let Some(lastmod) = &item.lastmod {
            xml.push_str(&format!("<lastmod>{}</lastmod>", lastmod));
        }
        if let Some(changefreq) = item.changefreq {
            xml.push_str(&format!("<changefreq>{}</changefreq>", changefreq));
        }
        xml.push_str("</url>");
    }
    xml.push_str("</urlset>\n");
    xml
}

pub fn save(path: &Path, items: &[SitemapItem]) -> Result<(), SitemapError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render(items))?;
    log::info!("Wrote {} sitemap entries to '{}'", items.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn topic(slug: &str) -> Topic {
        Topic {
            id: Uuid::new_v4(),
            title: slug.to_string(),
            slug: slug.to_string(),
            language: "en".to_string(),
            language_override: None,
            weight: 0,
            public: true,
            page: false,
        }
    }

    #[test]
    fn lists_topics_and_content_with_lastmod() {
        let news = topic("news");
        let mut content = Content::new("en", ContentType::Article, "Hello");
        content.slug = "hello".to_string();
        content.published = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();

        let mut items = vec![topic_item("https://mag.example", &news)];
        items.extend(content_items("https://mag.example", &content, &[news.clone()]));
        let xml = render(&items);

        assert!(xml.contains(&format!("<urlset xmlns=\"{}\">", SITEMAP_XMLNS)));
        assert!(xml.contains("<url><loc>https://mag.example/en/news</loc><changefreq>daily</changefreq></url>"));
        assert!(xml.contains("<url><loc>https://mag.example/en/news/hello</loc><lastmod>2024-02-01</lastmod></url>"));
        assert!(xml.ends_with("</urlset>\n"));
    }

    #[test]
    fn empty_sitemap_is_still_a_document() {
        assert_eq!(
            render(&[]),
            format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"{}\"></urlset>\n", SITEMAP_XMLNS)
        );
    }
}
