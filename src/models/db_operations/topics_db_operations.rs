use crate::models::db_operations::{parse_id, DbError};
use crate::models::Topic;
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

pub const TOPICS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("topics");
// Unique index: normalized title -> topic id
pub const TOPIC_TITLES: TableDefinition<&str, &[u8; 16]> = TableDefinition::new("topic_titles");

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn sort_topics(topics: &mut [Topic]) {
    topics.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.title.cmp(&b.title)));
}

pub fn get_topic(db: &Database, id: &str) -> Result<Topic, DbError> {
    get_topic_by_uuid(db, &parse_id(id)?)
}

pub fn get_topic_by_uuid(db: &Database, id: &Uuid) -> Result<Topic, DbError> {
    find_topic(db, id)?.ok_or_else(|| DbError::NotFound(format!("topic {}", id)))
}

/// Like [`get_topic_by_uuid`] but a missing topic is `None`.
pub fn find_topic(db: &Database, id: &Uuid) -> Result<Option<Topic>, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TOPICS)?;
    let result = match table.get(id.as_bytes())? {
        Some(guard) => Some(serde_json::from_str(guard.value())?),
        None => None,
    };
    Ok(result)
}

pub fn list_topics(db: &Database) -> Result<Vec<Topic>, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TOPICS)?;
    let mut topics = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        topics.push(serde_json::from_str::<Topic>(value.value())?);
    }
    sort_topics(&mut topics);
    Ok(topics)
}

/// Public, non-page topics of one language, as shown in site navigation.
pub fn list_public_topics(db: &Database, language: &str) -> Result<Vec<Topic>, DbError> {
    Ok(list_topics(db)?
        .into_iter()
        .filter(|t| t.public && !t.page && t.language == language)
        .collect())
}

pub fn get_topic_by_slug(db: &Database, language: &str, slug: &str) -> Result<Topic, DbError> {
    list_topics(db)?
        .into_iter()
        .find(|t| t.language == language && t.slug == slug)
        .ok_or_else(|| DbError::NotFound(format!("topic '{}' ({})", slug, language)))
}

/// Inserts or replaces a topic. Titles are unique across all languages and
/// slugs are unique within one.
pub fn save_topic(db: &Database, topic: &Topic) -> Result<(), DbError> {
    let json = serde_json::to_string(topic)?;
    let id_bytes = topic.id.into_bytes();
    let new_key = title_key(&topic.title);

    let write_txn = db.begin_write()?;
    {
        let mut topics = write_txn.open_table(TOPICS)?;
        let mut titles = write_txn.open_table(TOPIC_TITLES)?;

        let owner = titles.get(new_key.as_str())?.map(|g| *g.value());
        if let Some(owner) = owner {
            if owner != id_bytes {
                return Err(DbError::Duplicate(format!("topic title '{}'", topic.title)));
            }
        }

        for entry in topics.iter()? {
            let (key, value) = entry?;
            if *key.value() == id_bytes {
                continue;
            }
            let other: Topic = serde_json::from_str(value.value())?;
            if other.language == topic.language && other.slug == topic.slug {
                return Err(DbError::Duplicate(format!("topic slug '{}' ({})", topic.slug, topic.language)));
            }
        }

        let previous: Option<Topic> = match topics.get(&id_bytes)? {
            Some(guard) => Some(serde_json::from_str(guard.value())?),
            None => None,
        };
        if let Some(previous) = previous {
            let old_key = title_key(&previous.title);
            if old_key != new_key {
                titles.remove(old_key.as_str())?;
            }
        }

        topics.insert(&id_bytes, json.as_str())?;
        titles.insert(new_key.as_str(), &id_bytes)?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Deletes a topic. Content referencing it is left untouched.
pub fn delete_topic(db: &Database, id: &str) -> Result<(), DbError> {
    let id_bytes = parse_id(id)?.into_bytes();

    let write_txn = db.begin_write()?;
    {
        let mut topics = write_txn.open_table(TOPICS)?;
        let mut titles = write_txn.open_table(TOPIC_TITLES)?;

        let removed: Topic = match topics.remove(&id_bytes)? {
            Some(guard) => serde_json::from_str(guard.value())?,
            None => return Err(DbError::NotFound(format!("topic {}", id))),
        };
        titles.remove(title_key(&removed.title).as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}
